// 🏗️ Document Extractor
// Polymorphic extractor over text backends. Every backend produces pages of
// raw text; the shared core turns them into one CompanyExtract.

use crate::founders::{assemble_founders, latest_change_date, FounderRecord, ReduceError};
use crate::patterns::PatternSet;
use crate::text::{document_header, locate_founders_section, normalize_pages};
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Text layer a document is read with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractorBackend {
    /// PDF text layer, one string per page
    Pdf,
    /// Already extracted text, pages separated by form feeds
    PlainText,
}

impl ExtractorBackend {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            ExtractorBackend::Pdf => "PDF text layer",
            ExtractorBackend::PlainText => "Plain text",
        }
    }

    /// Short code for internal use
    pub fn code(&self) -> &str {
        match self {
            ExtractorBackend::Pdf => "pdf",
            ExtractorBackend::PlainText => "txt",
        }
    }
}

/// CompanyExtract - output of one parsed registry extract
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyExtract {
    pub full_name: String,
    pub short_name: String,
    /// INN the document itself is issued for, from the header
    pub company_tax_id: Option<String>,
    pub founders: Vec<FounderRecord>,
    pub latest_change_date: Option<NaiveDate>,

    // Provenance
    pub source_file: String,
    pub source_hash: String,
}

impl CompanyExtract {
    /// Nothing usable came out of the document
    pub fn is_empty(&self) -> bool {
        self.full_name.is_empty() && self.short_name.is_empty() && self.founders.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid change date in {path}: {source}")]
    Date {
        path: String,
        #[source]
        source: ReduceError,
    },
}

// ============================================================================
// EXTRACTOR TRAIT
// ============================================================================

/// DocumentExtractor - one registry extract in, one CompanyExtract out
///
/// Backends only differ in how they obtain page text; patterns and the
/// founder schema are shared.
pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<CompanyExtract, ExtractError>;

    fn backend(&self) -> ExtractorBackend;

    /// Extractor version (for provenance tracking)
    fn version(&self) -> &str {
        "1.0.0"
    }
}

/// Parse page texts into a CompanyExtract (provenance left empty)
///
/// A missing founders section is not an error, it only yields no founders
/// and no change date. A date that is not a real calendar date is.
pub fn extract_from_pages<S: AsRef<str>>(
    patterns: &PatternSet,
    pages: &[S],
) -> Result<CompanyExtract, ReduceError> {
    let document = normalize_pages(pages);

    let full_name = patterns.full_name(&document).unwrap_or_else(|| {
        warn!("Full company name not found");
        String::new()
    });
    let short_name = patterns.short_name(&document).unwrap_or_else(|| {
        warn!("Short company name not found");
        String::new()
    });

    let company_tax_id = patterns.company_tax_id(document_header(&document));
    if company_tax_id.is_none() {
        warn!("Company INN not found in document header");
    }

    let section = locate_founders_section(&document);
    let founders = assemble_founders(patterns, section);

    let latest_change_date = match latest_change_date(&founders) {
        Ok(date) => Some(date),
        Err(ReduceError::NoFounders) => {
            warn!("No founders found");
            None
        }
        Err(ReduceError::NoDates) => {
            warn!("No founder carries a registration date");
            None
        }
        Err(e) => return Err(e),
    };

    debug!(
        "Extracted {:?} / {:?} with {} founders",
        full_name,
        short_name,
        founders.len()
    );

    Ok(CompanyExtract {
        full_name,
        short_name,
        company_tax_id,
        founders,
        latest_change_date,
        source_file: String::new(),
        source_hash: String::new(),
    })
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ExtractError> {
    std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn finish(
    patterns: &PatternSet,
    path: &Path,
    bytes: &[u8],
    pages: &[String],
) -> Result<CompanyExtract, ExtractError> {
    let mut extract = extract_from_pages(patterns, pages).map_err(|source| ExtractError::Date {
        path: path.display().to_string(),
        source,
    })?;
    extract.source_file = path.display().to_string();
    extract.source_hash = fingerprint(bytes);

    info!(
        "Extracted {} founders from {}",
        extract.founders.len(),
        path.display()
    );
    Ok(extract)
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Pick a backend from the file extension
pub fn detect_backend(path: &Path) -> Result<ExtractorBackend> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => Ok(ExtractorBackend::Pdf),
        "txt" => Ok(ExtractorBackend::PlainText),
        _ => Err(anyhow!(
            "Could not detect document backend from filename: {}",
            path.display()
        )),
    }
}

pub fn get_extractor(backend: ExtractorBackend, patterns: Arc<PatternSet>) -> Box<dyn DocumentExtractor> {
    match backend {
        ExtractorBackend::Pdf => Box::new(PdfExtractor::new(patterns)),
        ExtractorBackend::PlainText => Box::new(PlainTextExtractor::new(patterns)),
    }
}

// ============================================================================
// BACKENDS
// ============================================================================

/// Reads the PDF text layer page by page
pub struct PdfExtractor {
    patterns: Arc<PatternSet>,
}

impl PdfExtractor {
    pub fn new(patterns: Arc<PatternSet>) -> Self {
        PdfExtractor { patterns }
    }
}

impl DocumentExtractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<CompanyExtract, ExtractError> {
        let bytes = read_bytes(path)?;

        // A PDF without a usable text layer degrades to an empty extract
        let pages = match pdf_extract::extract_text_from_mem_by_pages(&bytes) {
            Ok(pages) => pages,
            Err(e) => {
                warn!("No parseable text in {}: {}", path.display(), e);
                Vec::new()
            }
        };

        finish(&self.patterns, path, &bytes, &pages)
    }

    fn backend(&self) -> ExtractorBackend {
        ExtractorBackend::Pdf
    }
}

/// Reads text that was extracted beforehand; form feeds separate pages
pub struct PlainTextExtractor {
    patterns: Arc<PatternSet>,
}

impl PlainTextExtractor {
    pub fn new(patterns: Arc<PatternSet>) -> Self {
        PlainTextExtractor { patterns }
    }
}

impl DocumentExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<CompanyExtract, ExtractError> {
        let bytes = read_bytes(path)?;
        let text = String::from_utf8_lossy(&bytes);
        let pages: Vec<String> = text.split('\x0C').map(str::to_string).collect();

        finish(&self.patterns, path, &bytes, &pages)
    }

    fn backend(&self) -> ExtractorBackend {
        ExtractorBackend::PlainText
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{FOUNDERS_END_ANCHOR, FOUNDERS_START_ANCHOR};
    use std::fs;
    use tempfile::tempdir;

    fn patterns() -> Arc<PatternSet> {
        Arc::new(PatternSet::new().unwrap())
    }

    fn sample_pages() -> Vec<String> {
        vec![
            "1 Полное наименование на русском языке\n\
             ОБЩЕСТВО С ОГРАНИЧЕННОЙ ОТВЕТСТВЕННОСТЬЮ \"РОМАШКА\"\n\
             2 Сокращенное наименование на русском языке\n\
             ООО \"РОМАШКА\"\n\
             3 ИНН юридического лица\n7704256957\n\
             Страница 1 из 2"
                .to_string(),
            format!(
                "{}\n\
                 10 ГРН и дата внесения в ЕГРЮЛ записи, содержащей указанные сведения\n\
                 6027754033281\n15.03.2021\n\
                 11 Фамилия\nИмя\nОтчество\nИВАНОВ\nИВАН\nИВАНОВИЧ\n14 ИНН\n1234567890\n\
                 15 Номинальная стоимость доли (в рублях)\n10 000\n\
                 16 Размер доли (в процентах)\n50\n\
                 17 ГРН и дата внесения в ЕГРЮЛ записи\n2227700000017 01.01.2022\n\
                 18 Фамилия\nПетров\n19 Имя\nПётр\n20 ИНН\n500123456750\n\
                 {}\nпо ОКВЭД",
                FOUNDERS_START_ANCHOR, FOUNDERS_END_ANCHOR
            ),
        ]
    }

    #[test]
    fn test_extract_from_pages() {
        let extract = extract_from_pages(&patterns(), &sample_pages()).unwrap();

        assert_eq!(extract.full_name, "ОБЩЕСТВО С ОГРАНИЧЕННОЙ ОТВЕТСТВЕННОСТЬЮ \"РОМАШКА\"");
        assert_eq!(extract.short_name, "ООО \"РОМАШКА\"");
        assert_eq!(extract.founders.len(), 2);
        assert_eq!(extract.company_tax_id.as_deref(), Some("7704256957"));
        assert_eq!(extract.founders[0].name, vec!["ИВАНОВ", "ИВАН", "ИВАНОВИЧ"]);
        assert_eq!(extract.founders[0].nominal_value.as_deref(), Some("10000"));
        assert_eq!(extract.founders[0].latest_registration_date.as_deref(), Some("15.03.2021"));
        assert_eq!(extract.founders[1].tax_id, "500123456750");
        assert_eq!(
            extract.latest_change_date,
            NaiveDate::from_ymd_opt(2022, 1, 1)
        );
    }

    #[test]
    fn test_extract_without_founders_section() {
        let pages = vec!["ОБЩЕСТВО С ОГРАНИЧЕННОЙ ОТВЕТСТВЕННОСТЬЮ \"ЛУЧ\"".to_string()];
        let extract = extract_from_pages(&patterns(), &pages).unwrap();

        assert!(extract.founders.is_empty());
        assert_eq!(extract.latest_change_date, None);
        assert_eq!(extract.company_tax_id, None);
        assert_eq!(extract.full_name, "ОБЩЕСТВО С ОГРАНИЧЕННОЙ ОТВЕТСТВЕННОСТЬЮ \"ЛУЧ\"");
    }

    #[test]
    fn test_extract_with_impossible_date_fails() {
        let pages = vec![format!(
            "{} 6027754033281 31.02.2021 Фамилия Иванов Имя Иван ИНН 1234567890",
            FOUNDERS_START_ANCHOR
        )];
        let result = extract_from_pages(&patterns(), &pages);
        assert!(matches!(result, Err(ReduceError::MalformedDate { .. })));
    }

    #[test]
    fn test_plain_text_extractor_reads_form_feed_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("7704256957.txt");
        fs::write(&path, sample_pages().join("\x0C")).unwrap();

        let extractor = get_extractor(detect_backend(&path).unwrap(), patterns());
        assert_eq!(extractor.backend(), ExtractorBackend::PlainText);

        let extract = extractor.extract(&path).unwrap();
        assert_eq!(extract.founders.len(), 2);
        assert_eq!(extract.source_file, path.display().to_string());
        assert_eq!(extract.source_hash.len(), 64);
    }

    #[test]
    fn test_pdf_extractor_degrades_on_unparseable_pdf() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("7704256957.pdf");
        fs::write(&path, b"not a pdf at all").unwrap();

        let extract = PdfExtractor::new(patterns()).extract(&path).unwrap();
        assert!(extract.is_empty());
        assert_eq!(extract.latest_change_date, None);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let result = PlainTextExtractor::new(patterns()).extract(&path);
        assert!(matches!(result, Err(ExtractError::Io { .. })));
    }

    #[test]
    fn test_detect_backend() {
        assert_eq!(detect_backend(Path::new("a/7704256957.PDF")).unwrap(), ExtractorBackend::Pdf);
        assert_eq!(detect_backend(Path::new("dump.txt")).unwrap(), ExtractorBackend::PlainText);
        assert!(detect_backend(Path::new("sheet.xlsx")).is_err());
    }
}
