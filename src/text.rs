// 🧹 Text Preprocessor & Section Locator
// Turns the per-page text layer of an EGRUL extract into one normalized line
// and cuts out the participants/founders section.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

// ============================================================================
// ANCHORS
// ============================================================================

/// Heading that opens the participants/founders section
pub const FOUNDERS_START_ANCHOR: &str = "Сведения об участниках / учредителях юридического лица";

/// Heading of the section that follows the founders
pub const FOUNDERS_END_ANCHOR: &str = "Сведения о видах экономической деятельности";

// ============================================================================
// PREPROCESSOR
// ============================================================================

static PAGE_NUMBER_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static ROW_NUMBER_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static PAGE_FOOTER_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static WHITESPACE_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

/// A page number alone on the first line of the page
fn get_page_number_regex() -> Option<&'static Regex> {
    PAGE_NUMBER_REGEX
        .get_or_init(|| Regex::new(r"\A\s*\d{1,3}[ \t]*(?:\r?\n|\z)").ok())
        .as_ref()
}

/// Row numbers are short tokens followed by the row text; 13-digit GRNs,
/// dates, "10 000" and values alone on their line never match.
fn get_row_number_regex() -> Option<&'static Regex> {
    ROW_NUMBER_REGEX
        .get_or_init(|| Regex::new(r"(?m)^[ \t]*\d{1,3}[ \t]+(?P<rest>[^\s\d])").ok())
        .as_ref()
}

fn get_page_footer_regex() -> Option<&'static Regex> {
    PAGE_FOOTER_REGEX
        .get_or_init(|| Regex::new(r"Страница\s+\d+\s+из\s+\d+").ok())
        .as_ref()
}

fn get_whitespace_regex() -> Option<&'static Regex> {
    WHITESPACE_REGEX
        .get_or_init(|| Regex::new(r"\s+").ok())
        .as_ref()
}

fn replace_with<'t>(regex: Option<&Regex>, text: Cow<'t, str>, rep: &str) -> Cow<'t, str> {
    match regex {
        Some(re) => Cow::Owned(re.replace_all(&text, rep).into_owned()),
        None => text,
    }
}

/// Normalize the raw text of one page
///
/// - drops the page number standing alone on the first line
/// - strips the row number at the start of every line
/// - removes the "Страница N из M" footer
/// - collapses every whitespace run (newlines included) to a single space
pub fn preprocess_page(raw: &str) -> String {
    let text = match get_page_number_regex() {
        Some(re) => re.replace(raw, ""),
        None => Cow::Borrowed(raw),
    };
    let text = replace_with(get_row_number_regex(), text, "$rest");
    let text = replace_with(get_page_footer_regex(), text, " ");
    let text = match get_whitespace_regex() {
        Some(re) => re.replace_all(&text, " ").into_owned(),
        None => text.split_whitespace().collect::<Vec<_>>().join(" "),
    };
    text.trim().to_string()
}

/// Normalize all pages of a document and join them into one string
pub fn normalize_pages<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .map(|page| preprocess_page(page.as_ref()))
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// SECTION LOCATOR
// ============================================================================

/// Cut out the founders section of a normalized document
///
/// Returns an empty slice when the start anchor is missing. When the end
/// anchor is missing the section runs to the end of the document.
pub fn locate_founders_section(document: &str) -> &str {
    locate_section(document, FOUNDERS_START_ANCHOR, FOUNDERS_END_ANCHOR)
}

/// Everything before the founders section (the whole document without one)
///
/// Company-level fields such as the company's own INN live here, away from
/// the founders' INNs.
pub fn document_header(document: &str) -> &str {
    match document.find(FOUNDERS_START_ANCHOR) {
        Some(start) => &document[..start],
        None => document,
    }
}

fn locate_section<'a>(document: &'a str, start_anchor: &str, end_anchor: &str) -> &'a str {
    let Some(start) = document.find(start_anchor) else {
        return "";
    };

    let body = &document[start + start_anchor.len()..];
    match body.find(end_anchor) {
        Some(end) => &body[..end],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_collapses_whitespace() {
        let raw = "  Фамилия\n\nИванов \t Имя\r\nИван  ";
        assert_eq!(preprocess_page(raw), "Фамилия Иванов Имя Иван");
    }

    #[test]
    fn test_preprocess_strips_leading_row_numbers() {
        let raw = "1 Полное наименование\n23 Фамилия Иванов\n145 ИНН 1234567890";
        assert_eq!(
            preprocess_page(raw),
            "Полное наименование Фамилия Иванов ИНН 1234567890"
        );
    }

    #[test]
    fn test_preprocess_strips_page_number_only_on_first_line() {
        let raw = "3\nРазмер доли (в процентах)\n50";
        assert_eq!(preprocess_page(raw), "Размер доли (в процентах) 50");
    }

    #[test]
    fn test_preprocess_keeps_values_alone_on_their_line() {
        let raw = "Размер доли (в процентах)\n50 \nНоминальная стоимость доли (в рублях)\n10 000";
        assert_eq!(
            preprocess_page(raw),
            "Размер доли (в процентах) 50 Номинальная стоимость доли (в рублях) 10 000"
        );
    }

    #[test]
    fn test_preprocess_keeps_grn_and_dates_at_line_start() {
        let raw = "6027754033281\n15.03.2021 запись";
        assert_eq!(preprocess_page(raw), "6027754033281 15.03.2021 запись");
    }

    #[test]
    fn test_preprocess_removes_page_footer() {
        let raw = "Фамилия Иванов\nСтраница 2 из 7\nИмя Иван";
        assert_eq!(preprocess_page(raw), "Фамилия Иванов Имя Иван");
    }

    #[test]
    fn test_preprocess_empty() {
        assert_eq!(preprocess_page(""), "");
        assert_eq!(preprocess_page(" \n\t "), "");
    }

    #[test]
    fn test_normalize_pages_joins_with_space() {
        let pages = vec!["Первая\nстраница".to_string(), "".to_string(), "Вторая".to_string()];
        assert_eq!(normalize_pages(&pages), "Первая страница Вторая");
    }

    #[test]
    fn test_locate_section_between_anchors() {
        let doc = format!(
            "Шапка {} Фамилия Иванов {} ОКВЭД",
            FOUNDERS_START_ANCHOR, FOUNDERS_END_ANCHOR
        );
        assert_eq!(locate_founders_section(&doc).trim(), "Фамилия Иванов");
    }

    #[test]
    fn test_locate_section_without_start_anchor_is_empty() {
        let doc = format!("Шапка Фамилия Иванов {}", FOUNDERS_END_ANCHOR);
        assert_eq!(locate_founders_section(&doc), "");
    }

    #[test]
    fn test_document_header_stops_at_founders_section() {
        let doc = format!("ИНН 7704256957 {} Фамилия Иванов ИНН 1234567890", FOUNDERS_START_ANCHOR);
        assert_eq!(document_header(&doc).trim(), "ИНН 7704256957");
        assert_eq!(document_header("ИНН 7704256957"), "ИНН 7704256957");
    }

    #[test]
    fn test_static_regexes_compile() {
        assert!(get_page_number_regex().is_some());
        assert!(get_row_number_regex().is_some());
        assert!(get_page_footer_regex().is_some());
        assert!(get_whitespace_regex().is_some());
    }

    #[test]
    fn test_locate_section_without_end_anchor_runs_to_end() {
        let doc = format!("{} Фамилия Иванов", FOUNDERS_START_ANCHOR);
        assert_eq!(locate_founders_section(&doc).trim(), "Фамилия Иванов");
    }
}
