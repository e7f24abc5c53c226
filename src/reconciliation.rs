// ⚖️ Reconciliation Engine - Merge a fresh extract into the stored record
//
// Following the rules:
//   name             = fresh short name, else stored name
//   current founders = the full new snapshot
//   former founders  = FormerFoundersPolicy
//   change date      = latest registration date, else stored value
//
// An extract without founders never wipes the stored founder columns, and any
// error returns the previous record untouched.

use crate::db::PersistedRecord;
use crate::differ::{diff_founders, FounderDiff, FounderSet};
use crate::extractor::CompanyExtract;
use crate::founders::{format_registry_date, is_valid_tax_id};
use anyhow::{bail, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// FORMER FOUNDERS POLICY
// ============================================================================

/// What the "former founders" column holds after a cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormerFoundersPolicy {
    /// Every founder ever removed, minus those who are current again
    #[default]
    Accumulate,

    /// Only the founders removed by the latest transition
    LatestTransition,
}

impl FormerFoundersPolicy {
    pub fn code(&self) -> &str {
        match self {
            FormerFoundersPolicy::Accumulate => "accumulate",
            FormerFoundersPolicy::LatestTransition => "latest",
        }
    }

    /// Next former set given the stored one, the removals and the new current set
    pub fn apply(&self, old_former: &FounderSet, removed: &FounderSet, current: &FounderSet) -> FounderSet {
        match self {
            FormerFoundersPolicy::Accumulate => old_former
                .union(removed)
                .difference(current)
                .without_keys(&current.keys()),
            FormerFoundersPolicy::LatestTransition => removed.clone(),
        }
    }
}

impl FromStr for FormerFoundersPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "accumulate" => Ok(FormerFoundersPolicy::Accumulate),
            "latest" | "latest_transition" => Ok(FormerFoundersPolicy::LatestTransition),
            other => bail!(
                "Unknown former founders policy {:?} (expected \"accumulate\" or \"latest\")",
                other
            ),
        }
    }
}

impl fmt::Display for FormerFoundersPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationOutcome {
    /// The next record differs from the stored one
    Updated,

    /// Nothing new in the extract
    Unchanged,

    /// Reconciliation failed; the stored record is returned as is
    FellBack { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub inn: String,
    /// Record to persist
    pub record: PersistedRecord,
    pub diff: FounderDiff,
    pub outcome: ReconciliationOutcome,
}

impl Reconciliation {
    pub fn is_updated(&self) -> bool {
        matches!(self.outcome, ReconciliationOutcome::Updated)
    }

    pub fn fell_back(&self) -> bool {
        matches!(self.outcome, ReconciliationOutcome::FellBack { .. })
    }

    pub fn summary(&self) -> String {
        match &self.outcome {
            ReconciliationOutcome::FellBack { reason } => {
                format!("Reconciliation for {} fell back to the stored record: {}", self.inn, reason)
            }
            _ => format!(
                "Reconciliation for {}: {} current, {} former, +{} added, -{} removed, {} changed, change date {:?}",
                self.inn,
                FounderSet::parse(&self.record.current_founders).len(),
                FounderSet::parse(&self.record.former_founders).len(),
                self.diff.added.len(),
                self.diff.removed.len(),
                self.diff.changed().len(),
                self.record.change_date
            ),
        }
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    pub policy: FormerFoundersPolicy,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            policy: FormerFoundersPolicy::default(),
        }
    }

    pub fn with_policy(policy: FormerFoundersPolicy) -> Self {
        ReconciliationEngine { policy }
    }

    /// Produce the next persisted record for `inn`
    ///
    /// Never fails: errors are logged and the previous record comes back
    /// unchanged with a `FellBack` outcome.
    ///
    /// Example:
    /// ```
    /// use egrul_founders::{CompanyExtract, PersistedRecord, ReconciliationEngine};
    ///
    /// let engine = ReconciliationEngine::new();
    /// let previous = PersistedRecord::empty("7704256957");
    /// let result = engine.reconcile("7704256957", &CompanyExtract::default(), &previous);
    /// assert_eq!(result.record, previous);
    /// ```
    pub fn reconcile(&self, inn: &str, extract: &CompanyExtract, previous: &PersistedRecord) -> Reconciliation {
        match self.try_reconcile(inn, extract, previous) {
            Ok(reconciliation) => {
                debug!("{}", reconciliation.summary());
                reconciliation
            }
            Err(e) => {
                error!("Failed to reconcile founders for INN {}: {:#}", inn, e);
                Reconciliation {
                    inn: inn.to_string(),
                    record: previous.clone(),
                    diff: FounderDiff::default(),
                    outcome: ReconciliationOutcome::FellBack {
                        reason: format!("{:#}", e),
                    },
                }
            }
        }
    }

    /// Same as `reconcile` but surfaces the error instead of falling back
    pub fn try_reconcile(
        &self,
        inn: &str,
        extract: &CompanyExtract,
        previous: &PersistedRecord,
    ) -> Result<Reconciliation> {
        if !is_valid_tax_id(inn) {
            bail!("Not a valid INN: {:?}", inn);
        }
        if !previous.inn.is_empty() && previous.inn != inn {
            bail!("Stored record belongs to INN {}, not {}", previous.inn, inn);
        }

        let name = if extract.short_name.trim().is_empty() {
            previous.name.clone()
        } else {
            extract.short_name.trim().to_string()
        };

        let change_date = extract
            .latest_change_date
            .map(format_registry_date)
            .unwrap_or_else(|| previous.change_date.clone());

        let old_current = FounderSet::parse(&previous.current_founders);
        let old_former = FounderSet::parse(&previous.former_founders);

        let (current, former, diff) = if extract.founders.is_empty() {
            // Extraction failure: keep stored founder columns
            (old_current, old_former, FounderDiff::default())
        } else {
            let current = FounderSet::from_records(&extract.founders);
            let diff = diff_founders(&old_current, &current);
            let former = self.policy.apply(&old_former, &diff.removed, &current);
            (current, former, diff)
        };

        let record = PersistedRecord {
            inn: inn.to_string(),
            name,
            current_founders: current.serialize(),
            former_founders: former.serialize(),
            change_date,
        };

        let outcome = if record == *previous {
            ReconciliationOutcome::Unchanged
        } else {
            ReconciliationOutcome::Updated
        };

        Ok(Reconciliation {
            inn: inn.to_string(),
            record,
            diff,
            outcome,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::founders::FounderRecord;
    use chrono::NaiveDate;

    const INN: &str = "7704256957";

    fn founder(name: &str, tax_id: &str, date: &str) -> FounderRecord {
        FounderRecord::new(vec![name.to_string()], tax_id.to_string())
            .with_registration("6027754033281".to_string(), date.to_string())
    }

    fn extract(short_name: &str, founders: Vec<FounderRecord>, date: Option<(i32, u32, u32)>) -> CompanyExtract {
        CompanyExtract {
            short_name: short_name.to_string(),
            founders,
            latest_change_date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            ..Default::default()
        }
    }

    fn stored(name: &str, current: &str, former: &str, date: &str) -> PersistedRecord {
        PersistedRecord {
            inn: INN.to_string(),
            name: name.to_string(),
            current_founders: current.to_string(),
            former_founders: former.to_string(),
            change_date: date.to_string(),
        }
    }

    #[test]
    fn test_replaced_founder() {
        let engine = ReconciliationEngine::new();
        let previous = stored("ООО \"РОМАШКА\"", "A - 111 - 01.01.2020", "", "01.01.2020");
        let fresh = extract("ООО \"РОМАШКА\"", vec![founder("B", "222", "02.02.2020")], Some((2020, 2, 2)));

        let result = engine.reconcile(INN, &fresh, &previous);

        assert!(result.is_updated());
        assert_eq!(result.diff.added, FounderSet::parse("B - 222 - 02.02.2020"));
        assert_eq!(result.diff.removed, FounderSet::parse("A - 111 - 01.01.2020"));
        assert_eq!(result.record.current_founders, "B - 222 - 02.02.2020");
        assert_eq!(result.record.former_founders, "A - 111 - 01.01.2020");
        assert_eq!(result.record.change_date, "02.02.2020");
    }

    #[test]
    fn test_current_is_full_snapshot_not_delta() {
        let engine = ReconciliationEngine::new();
        let previous = stored("X", "A - 111 - 01.01.2020", "", "");
        let fresh = extract(
            "X",
            vec![founder("A", "111", "01.01.2020"), founder("B", "222", "02.02.2020")],
            Some((2020, 2, 2)),
        );

        let result = engine.reconcile(INN, &fresh, &previous);
        assert_eq!(
            result.record.current_founders,
            "A - 111 - 01.01.2020\nB - 222 - 02.02.2020"
        );
        assert!(result.record.former_founders.is_empty());
    }

    #[test]
    fn test_accumulate_keeps_history() {
        let engine = ReconciliationEngine::with_policy(FormerFoundersPolicy::Accumulate);
        let previous = stored("X", "B - 222 - 02.02.2020", "A - 111 - 01.01.2020", "02.02.2020");
        let fresh = extract("X", vec![founder("C", "333", "03.03.2021")], Some((2021, 3, 3)));

        let result = engine.reconcile(INN, &fresh, &previous);
        assert_eq!(
            result.record.former_founders,
            "A - 111 - 01.01.2020\nB - 222 - 02.02.2020"
        );
    }

    #[test]
    fn test_latest_transition_overwrites_history() {
        let engine = ReconciliationEngine::with_policy(FormerFoundersPolicy::LatestTransition);
        let previous = stored("X", "B - 222 - 02.02.2020", "A - 111 - 01.01.2020", "02.02.2020");
        let fresh = extract("X", vec![founder("C", "333", "03.03.2021")], Some((2021, 3, 3)));

        let result = engine.reconcile(INN, &fresh, &previous);
        assert_eq!(result.record.former_founders, "B - 222 - 02.02.2020");
    }

    #[test]
    fn test_returning_founder_leaves_former() {
        let engine = ReconciliationEngine::new();
        let previous = stored("X", "B - 222 - 02.02.2020", "A - 111 - 01.01.2020", "");
        let fresh = extract(
            "X",
            vec![founder("A", "111", "05.05.2022"), founder("B", "222", "02.02.2020")],
            Some((2022, 5, 5)),
        );

        let result = engine.reconcile(INN, &fresh, &previous);
        assert!(result.record.former_founders.is_empty());
    }

    #[test]
    fn test_date_change_reported_as_change() {
        let engine = ReconciliationEngine::new();
        let previous = stored("X", "A - 111 - 01.01.2020", "", "01.01.2020");
        let fresh = extract("X", vec![founder("A", "111", "05.05.2022")], Some((2022, 5, 5)));

        let result = engine.reconcile(INN, &fresh, &previous);
        assert_eq!(result.diff.changed().len(), 1);
        // same founder, not a former one
        assert!(result.record.former_founders.is_empty());
    }

    #[test]
    fn test_empty_extract_keeps_stored_fields() {
        let engine = ReconciliationEngine::new();
        let previous = stored("ООО \"РОМАШКА\"", "A - 111 - 01.01.2020", "Z - 999 - 01.01.2019", "01.01.2020");

        let result = engine.reconcile(INN, &CompanyExtract::default(), &previous);
        assert_eq!(result.outcome, ReconciliationOutcome::Unchanged);
        assert_eq!(result.record, previous);
        assert!(result.diff.is_empty());
    }

    #[test]
    fn test_undated_extract_keeps_stored_change_date() {
        let engine = ReconciliationEngine::new();
        let previous = stored("ООО \"РОМАШКА\"", "A - 111 - 01.01.2020", "", "01.01.2020");
        let undated = FounderRecord::new(vec!["B".to_string()], "222".to_string());
        let fresh = extract("ООО \"РОМАШКА\"", vec![undated], None);

        let result = engine.reconcile(INN, &fresh, &previous);
        assert_eq!(result.outcome, ReconciliationOutcome::Updated);
        assert_eq!(result.record.current_founders, "B - 222");
        // no date in the document never blanks a known one
        assert_eq!(result.record.change_date, "01.01.2020");
    }

    #[test]
    fn test_first_cycle_on_blank_record() {
        let engine = ReconciliationEngine::new();
        let fresh = extract("ООО \"ЛУЧ\"", vec![founder("A", "111", "01.01.2020")], Some((2020, 1, 1)));

        let result = engine.reconcile(INN, &fresh, &PersistedRecord::empty(INN));
        assert_eq!(result.record.name, "ООО \"ЛУЧ\"");
        assert_eq!(result.record.current_founders, "A - 111 - 01.01.2020");
        assert!(result.record.former_founders.is_empty());
    }

    #[test]
    fn test_inn_mismatch_falls_back() {
        let engine = ReconciliationEngine::new();
        let mut previous = stored("X", "A - 111 - 01.01.2020", "", "");
        previous.inn = "7707083893".to_string();
        let fresh = extract("Y", vec![founder("B", "222", "02.02.2020")], None);

        let result = engine.reconcile(INN, &fresh, &previous);
        assert!(result.fell_back());
        assert_eq!(result.record, previous);
        assert!(engine.try_reconcile(INN, &fresh, &previous).is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("accumulate".parse::<FormerFoundersPolicy>().unwrap(), FormerFoundersPolicy::Accumulate);
        assert_eq!(" Latest ".parse::<FormerFoundersPolicy>().unwrap(), FormerFoundersPolicy::LatestTransition);
        assert!("sometimes".parse::<FormerFoundersPolicy>().is_err());
        assert_eq!(FormerFoundersPolicy::LatestTransition.to_string(), "latest");
    }
}
