// 🔎 Pattern Matcher
// Compiled patterns for the pieces of an EGRUL extract we care about:
// company names, founder blocks, registration entries (GRN + date) and the
// nominal value / share figures of a participation.

use anyhow::{Context, Result};
use regex::Regex;

// ============================================================================
// PATTERN SOURCES
// ============================================================================

/// Canonical legal-form prefix every full name is re-wrapped in
pub const LLC_FULL_PREFIX: &str = "ОБЩЕСТВО С ОГРАНИЧЕННОЙ ОТВЕТСТВЕННОСТЬЮ";

/// One name token: capitalized word, Cyrillic or Latin, hyphenated allowed
const NAME: &str = r"[А-ЯЁA-Z][А-ЯЁа-яёA-Za-z'’-]*";

const COMPANY_NAME: &str = r#"(?is)(?:ОБЩЕСТВО\s+С\s+ОГРАНИЧЕННОЙ\s+ОТВЕТСТВЕННОСТЬЮ|Полное\s+наименование\s+на\s+русском\s+языке)\s*["«]([^"»]+)["»]"#;

const SHORT_NAME: &str = r#"(?is)Сокращенное\s+наименование.*?(?:на\s+русском\s+языке)?\s*:?\s*((?:ООО|ОАО|ЗАО)\s*["«][^"»\n]+["»])"#;

const REGISTRATION: &str = r"\b(?P<number>\d{13})\s+(?P<date>\d{2}\.\d{2}\.\d{4})\b";

/// Amount with optional thousands groups ("10 000", "10000,50")
const AMOUNT: &str = r"\d{1,3}(?:[ \x{A0}]\d{3}\b)+(?:[.,]\d+)?|\d+(?:[.,]\d+)?";

/// Company's own INN as printed in the header or the tax registration block
const COMPANY_TAX_ID: &str =
    r"(?i)ИНН(?:/КПП)?(?:\s+юридического\s+лица)?\s*:?\s*(?P<inn>\d{10})\b";

fn nominal_value_pattern() -> String {
    format!(
        r"(?i)Номинальная\s+стоимость\s+доли\s*\(в\s+рублях\)\s*:?\s*(?P<value>{})",
        AMOUNT
    )
}

fn share_percentage_pattern() -> String {
    format!(
        r"(?i)Размер\s+доли\s*\(в\s+процентах\)\s*:?\s*(?P<value>{})",
        AMOUNT
    )
}

/// Capture-group suffixes of the founder head alternatives, in match order
const HEAD_VARIANTS: [&str; 4] = ["i3", "i2", "g3", "g2"];

/// Founder head: labelled name followed by the INN.
///
/// Interleaved rows (`Фамилия <S> Имя <G> [Отчество <P>] ИНН`) come first,
/// three-part before two-part. Grouped rows put all labels in one cell and
/// all values in the next (`Фамилия Имя Отчество <S> <G> <P> ИНН`); there the
/// patronymic is only taken when its label is present.
fn founder_pattern() -> String {
    let interleaved_three = format!(
        r"(?i:фамилия)\s+(?P<surname_i3>{n})\s+(?i:имя)\s+(?P<given_i3>{n})\s+(?i:отчество)\s+(?P<patronymic_i3>{n})\s+(?i:инн)\s+(?P<inn_i3>\d{{10,12}})\b",
        n = NAME
    );
    let interleaved_two = format!(
        r"(?i:фамилия)\s+(?P<surname_i2>{n})\s+(?i:имя)\s+(?P<given_i2>{n})\s+(?i:инн)\s+(?P<inn_i2>\d{{10,12}})\b",
        n = NAME
    );
    let grouped_three = format!(
        r"(?i:фамилия)\s+(?i:имя)\s+(?i:отчество)\s+(?P<surname_g3>{n})\s+(?P<given_g3>{n})(?:\s+(?P<patronymic_g3>{n}))?\s+(?i:инн)\s+(?P<inn_g3>\d{{10,12}})\b",
        n = NAME
    );
    let grouped_two = format!(
        r"(?i:фамилия)\s+(?i:имя)\s+(?P<surname_g2>{n})\s+(?P<given_g2>{n})\s+(?i:инн)\s+(?P<inn_g2>\d{{10,12}})\b",
        n = NAME
    );
    [interleaved_three, interleaved_two, grouped_three, grouped_two].join("|")
}

// ============================================================================
// MATCH TYPES
// ============================================================================

/// Which name shape a founder head matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameShape {
    /// Surname, given name and patronymic
    ThreePart,
    /// Surname and given name only
    TwoPart,
}

/// Raw founder match: name as captured plus the INN and its byte span
#[derive(Debug, Clone, PartialEq)]
pub struct FounderHead {
    pub shape: NameShape,
    pub raw_name: String,
    pub tax_id: String,
    pub start: usize,
    pub end: usize,
}

/// GRN and the date of the registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationEntry {
    pub number: String,
    pub date: String,
}

// ============================================================================
// PATTERN SET
// ============================================================================

pub struct PatternSet {
    company_name: Regex,
    short_name: Regex,
    founder: Regex,
    registration: Regex,
    company_tax_id: Regex,
    nominal_value: Regex,
    share_percentage: Regex,
}

impl PatternSet {
    pub fn new() -> Result<Self> {
        Ok(PatternSet {
            company_name: Regex::new(COMPANY_NAME).context("Invalid company name pattern")?,
            short_name: Regex::new(SHORT_NAME).context("Invalid short name pattern")?,
            founder: Regex::new(&founder_pattern()).context("Invalid founder pattern")?,
            registration: Regex::new(REGISTRATION).context("Invalid registration pattern")?,
            company_tax_id: Regex::new(COMPANY_TAX_ID).context("Invalid company INN pattern")?,
            nominal_value: Regex::new(&nominal_value_pattern())
                .context("Invalid nominal value pattern")?,
            share_percentage: Regex::new(&share_percentage_pattern())
                .context("Invalid share percentage pattern")?,
        })
    }

    /// Full company name, always re-wrapped in the canonical LLC prefix
    /// whichever label the document used
    pub fn full_name(&self, text: &str) -> Option<String> {
        let caps = self.company_name.captures(text)?;
        let name = caps.get(1)?.as_str().trim();
        if name.is_empty() {
            return None;
        }
        Some(format!("{} \"{}\"", LLC_FULL_PREFIX, name))
    }

    /// Short name (abbreviation + quoted name) exactly as found
    pub fn short_name(&self, text: &str) -> Option<String> {
        let caps = self.short_name.captures(text)?;
        Some(caps.get(1)?.as_str().trim().to_string())
    }

    /// All founder heads in document order (non-overlapping)
    pub fn founder_heads(&self, section: &str) -> Vec<FounderHead> {
        self.founder
            .captures_iter(section)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let variant = HEAD_VARIANTS
                    .iter()
                    .find(|v| caps.name(&format!("inn_{}", v)).is_some())?;
                let group = |part: &str| caps.name(&format!("{}_{}", part, variant));

                let tax_id = group("inn")?.as_str();
                let parts = [group("surname"), group("given"), group("patronymic")];
                let shape = if parts[2].is_some() {
                    NameShape::ThreePart
                } else {
                    NameShape::TwoPart
                };

                let raw_name = parts
                    .iter()
                    .flatten()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");

                Some(FounderHead {
                    shape,
                    raw_name,
                    tax_id: tax_id.to_string(),
                    start: whole.start(),
                    end: whole.end(),
                })
            })
            .collect()
    }

    /// All GRN/date pairs in the given text, in document order
    pub fn registration_entries(&self, text: &str) -> Vec<RegistrationEntry> {
        self.registration
            .captures_iter(text)
            .filter_map(|caps| {
                Some(RegistrationEntry {
                    number: caps.name("number")?.as_str().to_string(),
                    date: caps.name("date")?.as_str().to_string(),
                })
            })
            .collect()
    }

    /// Closest (last) GRN/date pair in the given text
    pub fn last_registration_entry(&self, text: &str) -> Option<RegistrationEntry> {
        self.registration_entries(text).pop()
    }

    /// The company's own INN, first one printed in the given text
    pub fn company_tax_id(&self, text: &str) -> Option<String> {
        self.company_tax_id
            .captures(text)
            .and_then(|caps| caps.name("inn"))
            .map(|m| m.as_str().to_string())
    }

    pub fn nominal_value(&self, span: &str) -> Option<String> {
        first_value(&self.nominal_value, span)
    }

    pub fn share_percentage(&self, span: &str) -> Option<String> {
        first_value(&self.share_percentage, span)
    }
}

fn first_value(re: &Regex, span: &str) -> Option<String> {
    re.captures(span)
        .and_then(|caps| caps.name("value"))
        .map(|m| strip_group_separators(m.as_str()))
}

/// "10 000" -> "10000"
fn strip_group_separators(raw: &str) -> String {
    raw.chars().filter(|c| !matches!(c, ' ' | '\u{A0}')).collect()
}
