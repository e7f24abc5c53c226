// 👥 Founder records - Record Assembler & Latest-Date Reducer
// Builds structured founder records from pattern matches and picks the
// document's overall change date.

use crate::patterns::{FounderHead, PatternSet};
use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Registry dates are written day.month.year
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// How far back (in characters) we look for the GRN/date of a founder
pub const LOOKBACK_CHARS: usize = 600;

/// Names are surname, given name and an optional patronymic
pub const MAX_NAME_TOKENS: usize = 3;

// ============================================================================
// FOUNDER RECORD
// ============================================================================

/// One registered owner of the company at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FounderRecord {
    pub name: Vec<String>,
    pub tax_id: String,
    pub nominal_value: Option<String>,
    pub share_percentage: Option<String>,
    pub latest_registration_number: Option<String>,
    pub latest_registration_date: Option<String>,
}

impl FounderRecord {
    pub fn new(name: Vec<String>, tax_id: String) -> Self {
        FounderRecord {
            name,
            tax_id,
            nominal_value: None,
            share_percentage: None,
            latest_registration_number: None,
            latest_registration_date: None,
        }
    }

    /// Builder pattern: add nominal value and share
    pub fn with_share(mut self, nominal_value: Option<String>, share_percentage: Option<String>) -> Self {
        self.nominal_value = nominal_value;
        self.share_percentage = share_percentage;
        self
    }

    /// Builder pattern: add latest registry entry
    pub fn with_registration(mut self, number: String, date: String) -> Self {
        self.latest_registration_number = Some(number);
        self.latest_registration_date = Some(date);
        self
    }

    pub fn full_name(&self) -> String {
        self.name.join(" ")
    }

    /// INN must be 10 to 12 ASCII digits
    pub fn has_valid_tax_id(&self) -> bool {
        is_valid_tax_id(&self.tax_id)
    }
}

pub fn is_valid_tax_id(tax_id: &str) -> bool {
    (10..=12).contains(&tax_id.len()) && tax_id.bytes().all(|b| b.is_ascii_digit())
}

// ============================================================================
// RECORD ASSEMBLER
// ============================================================================

/// Turn founder matches in the founders section into records
///
/// Nominal value and share are looked up between a founder head and the next
/// one. The registration entry is the closest one inside the lookback window
/// before the head.
pub fn assemble_founders(patterns: &PatternSet, section: &str) -> Vec<FounderRecord> {
    let heads = patterns.founder_heads(section);
    let mut founders = Vec::with_capacity(heads.len());

    for (i, head) in heads.iter().enumerate() {
        let tail_end = heads.get(i + 1).map_or(section.len(), |next| next.start);
        let tail = &section[head.end..tail_end];

        match assemble_one(patterns, section, head, tail) {
            Some(record) => founders.push(record),
            None => warn!("Skipping malformed founder record with tax id {:?}", head.tax_id),
        }
    }

    debug!("Assembled {} founder records", founders.len());
    founders
}

fn assemble_one(
    patterns: &PatternSet,
    section: &str,
    head: &FounderHead,
    tail: &str,
) -> Option<FounderRecord> {
    let name = name_tokens(&head.raw_name);
    let tax_id = head.tax_id.trim().to_string();
    if name.is_empty() || !is_valid_tax_id(&tax_id) {
        return None;
    }

    let record = FounderRecord::new(name, tax_id).with_share(
        patterns.nominal_value(tail),
        patterns.share_percentage(tail),
    );

    let window = lookback_window(section, head.start, LOOKBACK_CHARS);
    match patterns.last_registration_entry(window) {
        Some(entry) => Some(record.with_registration(entry.number, entry.date)),
        None => {
            warn!(
                "No registration entry found before founder {} ({})",
                record.full_name(),
                record.tax_id
            );
            Some(record)
        }
    }
}

/// Split on whitespace and keep at most three tokens
pub fn name_tokens(raw: &str) -> Vec<String> {
    raw.split_whitespace()
        .take(MAX_NAME_TOKENS)
        .map(str::to_string)
        .collect()
}

/// At most `max_chars` characters of `text` ending at byte offset `end`
pub fn lookback_window(text: &str, end: usize, max_chars: usize) -> &str {
    let before = &text[..end];
    let start = before
        .char_indices()
        .rev()
        .nth(max_chars.saturating_sub(1))
        .map_or(0, |(idx, _)| idx);
    &before[start..]
}

// ============================================================================
// LATEST-DATE REDUCER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReduceError {
    #[error("no founders to take a change date from")]
    NoFounders,

    #[error("no founder carries a registration date")]
    NoDates,

    #[error("malformed registration date {date:?} for founder {tax_id}")]
    MalformedDate { date: String, tax_id: String },
}

/// Most recent registration date among the founders
///
/// Founders without a date are skipped; a date that is not a real calendar
/// date fails the whole reduction.
pub fn latest_change_date(founders: &[FounderRecord]) -> Result<NaiveDate, ReduceError> {
    if founders.is_empty() {
        return Err(ReduceError::NoFounders);
    }

    let mut latest: Option<NaiveDate> = None;
    for founder in founders {
        let Some(raw) = founder.latest_registration_date.as_deref() else {
            continue;
        };
        let date = parse_registry_date(raw).ok_or_else(|| ReduceError::MalformedDate {
            date: raw.to_string(),
            tax_id: founder.tax_id.clone(),
        })?;
        latest = Some(latest.map_or(date, |current| current.max(date)));
    }

    latest.ok_or(ReduceError::NoDates)
}

pub fn parse_registry_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

pub fn format_registry_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
