// ✅ Extract Quality Engine - Sanity checks on a parsed registry extract
//
// Nothing here blocks reconciliation except a missing founder list, which the
// reconciler already treats as "keep what is stored". The report is logged
// and explains why a cycle produced what it produced.

use crate::extractor::CompanyExtract;
use crate::founders::is_valid_tax_id;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Shares may not add up to more than this (rounding in the registry)
const SHARE_TOLERANCE: f64 = 0.01;

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub rule_name: String,
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationResult {
    pub fn pass(rule_name: &str, field: &str, message: &str) -> Self {
        ValidationResult {
            passed: true,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            severity: Severity::Info,
        }
    }

    pub fn fail(rule_name: &str, field: &str, message: &str, severity: Severity) -> Self {
        ValidationResult {
            passed: false,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            severity,
        }
    }
}

// ============================================================================
// QUALITY REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub source_file: String,
    pub validations: Vec<ValidationResult>,
    pub issues: Vec<QualityIssue>,
    pub passed_count: usize,
    pub failed_count: usize,
}

impl QualityReport {
    pub fn summary(&self) -> String {
        format!(
            "Quality of {}: {}/{} checks passed, Issues: {} ({} critical)",
            if self.source_file.is_empty() { "<memory>" } else { &self.source_file },
            self.passed_count,
            self.validations.len(),
            self.issues.len(),
            self.issues
                .iter()
                .filter(|i| i.severity == Severity::Critical)
                .count()
        )
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_critical_issues(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == Severity::Critical)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Extract is unusable for reconciliation
    Warning,  // Extract is questionable or incomplete
    Info,
}

// ============================================================================
// INN CHECKSUM
// ============================================================================

const INN10_WEIGHTS: [u32; 9] = [2, 4, 10, 3, 5, 9, 4, 6, 8];
const INN12_WEIGHTS_11: [u32; 10] = [7, 2, 4, 10, 3, 5, 9, 4, 6, 8];
const INN12_WEIGHTS_12: [u32; 11] = [3, 7, 2, 4, 10, 3, 5, 9, 4, 6, 8];

fn control_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    sum % 11 % 10
}

/// Check digits of a 10-digit (organization) or 12-digit (individual) INN
pub fn inn_checksum_valid(inn: &str) -> bool {
    let digits: Vec<u32> = match inn.chars().map(|c| c.to_digit(10)).collect::<Option<Vec<_>>>() {
        Some(d) => d,
        None => return false,
    };

    match digits.len() {
        10 => control_digit(&digits[..9], &INN10_WEIGHTS) == digits[9],
        12 => {
            control_digit(&digits[..10], &INN12_WEIGHTS_11) == digits[10]
                && control_digit(&digits[..11], &INN12_WEIGHTS_12) == digits[11]
        }
        _ => false,
    }
}

// ============================================================================
// QUALITY ENGINE
// ============================================================================

pub struct ExtractQualityEngine {
    /// Verify INN check digits of founders
    check_inn_checksums: bool,
}

impl ExtractQualityEngine {
    pub fn new() -> Self {
        ExtractQualityEngine {
            check_inn_checksums: true,
        }
    }

    /// Builder pattern: skip check digits (test documents use made-up INNs)
    pub fn without_checksums(mut self) -> Self {
        self.check_inn_checksums = false;
        self
    }

    /// Validate an extract and generate quality report
    pub fn check(&self, extract: &CompanyExtract) -> QualityReport {
        let mut validations = Vec::new();

        // Rule 1: Full name present
        validations.push(if extract.full_name.trim().is_empty() {
            ValidationResult::fail("full_name_present", "full_name", "Full company name not found", Severity::Warning)
        } else {
            ValidationResult::pass("full_name_present", "full_name", "Full company name found")
        });

        // Rule 2: Short name present (the stored name is kept otherwise)
        validations.push(if extract.short_name.trim().is_empty() {
            ValidationResult::fail("short_name_present", "short_name", "Short company name not found", Severity::Warning)
        } else {
            ValidationResult::pass("short_name_present", "short_name", "Short company name found")
        });

        // Rule 3: At least one founder
        validations.push(if extract.founders.is_empty() {
            ValidationResult::fail("founders_present", "founders", "No founders found", Severity::Critical)
        } else {
            ValidationResult::pass(
                "founders_present",
                "founders",
                &format!("{} founders found", extract.founders.len()),
            )
        });

        // Rule 4: Every founder carries a registration date
        for founder in &extract.founders {
            if founder.latest_registration_date.is_none() {
                validations.push(ValidationResult::fail(
                    "founder_dated",
                    "founders",
                    &format!("Founder {} ({}) has no registration date", founder.full_name(), founder.tax_id),
                    Severity::Warning,
                ));
            }
        }

        // Rule 5: Founder INNs are well formed and pass the checksum
        for founder in &extract.founders {
            if !is_valid_tax_id(&founder.tax_id) {
                validations.push(ValidationResult::fail(
                    "founder_inn_format",
                    "founders",
                    &format!("Founder {} has malformed INN {:?}", founder.full_name(), founder.tax_id),
                    Severity::Critical,
                ));
            } else if self.check_inn_checksums && !inn_checksum_valid(&founder.tax_id) {
                validations.push(ValidationResult::fail(
                    "founder_inn_checksum",
                    "founders",
                    &format!("Founder {} has INN {} with wrong check digits", founder.full_name(), founder.tax_id),
                    Severity::Warning,
                ));
            }
        }

        // Rule 6: No founder listed twice
        let mut seen = HashSet::new();
        for founder in &extract.founders {
            if !seen.insert(founder.tax_id.as_str()) {
                validations.push(ValidationResult::fail(
                    "founder_unique",
                    "founders",
                    &format!("INN {} appears more than once", founder.tax_id),
                    Severity::Warning,
                ));
            }
        }

        // Rule 7: Shares do not exceed 100%
        validations.push(self.validate_share_total(extract));

        // Rule 8: Provenance
        validations.push(if extract.source_file.is_empty() || extract.source_hash.is_empty() {
            ValidationResult::fail("provenance", "source", "Source file or hash missing", Severity::Info)
        } else {
            ValidationResult::pass("provenance", "source", "Source recorded")
        });

        let issues: Vec<QualityIssue> = validations
            .iter()
            .filter(|v| !v.passed)
            .map(|v| QualityIssue {
                severity: v.severity.clone(),
                field: v.field.clone(),
                issue: v.message.clone(),
                recommendation: recommendation_for(&v.rule_name).to_string(),
            })
            .collect();

        let passed_count = validations.iter().filter(|v| v.passed).count();
        let failed_count = validations.len() - passed_count;

        QualityReport {
            source_file: extract.source_file.clone(),
            validations,
            issues,
            passed_count,
            failed_count,
        }
    }

    fn validate_share_total(&self, extract: &CompanyExtract) -> ValidationResult {
        let total: f64 = extract
            .founders
            .iter()
            .filter_map(|f| f.share_percentage.as_deref())
            .filter_map(parse_share)
            .sum();

        if total > 100.0 + SHARE_TOLERANCE {
            ValidationResult::fail(
                "share_total",
                "share_percentage",
                &format!("Founder shares add up to {:.2}%", total),
                Severity::Warning,
            )
        } else {
            ValidationResult::pass("share_total", "share_percentage", "Founder shares within 100%")
        }
    }
}

impl Default for ExtractQualityEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry figures use a decimal comma
fn parse_share(raw: &str) -> Option<f64> {
    raw.trim().replace(',', ".").parse().ok()
}

fn recommendation_for(rule_name: &str) -> &'static str {
    match rule_name {
        "full_name_present" | "short_name_present" => "Check the document is an EGRUL extract for an LLC",
        "founders_present" => "Check the founders section anchors and the text layer of the document",
        "founder_dated" => "Check the registration entry precedes the founder block",
        "founder_inn_format" | "founder_inn_checksum" => "Compare the founder INN with the document",
        "founder_unique" => "Check for a founder block split across pages",
        "share_total" => "Check that nominal value and share were matched to the right founder",
        _ => "Re-download the extract",
    }
}

// ============================================================================
// TESTS
// ============================================================================
