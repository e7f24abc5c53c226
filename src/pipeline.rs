// 🔄 Batch Pipeline
// One tracked INN at a time: fetch document → extract → quality check →
// reconcile → persist → audit events. Per-company failures are logged and
// counted, they never stop the batch.

use crate::db::{Event, PersistedRecord, StateStore};
use crate::differ::FounderKey;
use crate::extractor::{detect_backend, get_extractor, CompanyExtract};
use crate::patterns::PatternSet;
use crate::quality::ExtractQualityEngine;
use crate::reconciliation::{Reconciliation, ReconciliationEngine, ReconciliationOutcome};
use crate::source::DocumentSource;
use anyhow::{Context, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_ACTOR: &str = "egrul-founders";

// ============================================================================
// RETRY POLICY
// ============================================================================

/// Bounded retries with a constant delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it yields a value or attempts run out
    ///
    /// `Ok(None)` and `Err` both count as a failed attempt. After the last
    /// attempt the last error is returned, or `Ok(None)` if it was a miss.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<Option<T>>
    where
        F: FnMut(u32) -> Result<Option<T>>,
    {
        let mut last = Ok(None);

        for attempt in 1..=self.max_attempts {
            info!("Attempt {}/{}: {}", attempt, self.max_attempts, what);

            match op(attempt) {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {
                    warn!("Attempt {} of {} found nothing", attempt, what);
                    last = Ok(None);
                }
                Err(e) => {
                    warn!("Attempt {} of {} failed: {:#}", attempt, what, e);
                    last = Err(e);
                }
            }

            if attempt < self.max_attempts && !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
        }

        last
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(3, Duration::from_secs(5))
    }
}

// ============================================================================
// BATCH SUMMARY
// ============================================================================

/// How one company fared in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyOutcome {
    Updated,
    Unchanged,
    /// No document could be obtained
    Skipped,
    /// The document was issued for another INN
    Misfiled,
    /// Reconciliation fell back to the stored record
    FellBack,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn count(&mut self, outcome: &Result<CompanyOutcome>) {
        self.total += 1;
        match outcome {
            Ok(CompanyOutcome::Updated) => self.updated += 1,
            Ok(CompanyOutcome::Unchanged) => self.unchanged += 1,
            Ok(CompanyOutcome::Skipped) | Ok(CompanyOutcome::Misfiled) => self.skipped += 1,
            Ok(CompanyOutcome::FellBack) | Err(_) => self.failed += 1,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Processed {} companies: {} updated, {} unchanged, {} skipped, {} failed",
            self.total, self.updated, self.unchanged, self.skipped, self.failed
        )
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline<D: DocumentSource, S: StateStore> {
    source: D,
    store: S,
    patterns: Arc<PatternSet>,
    quality: ExtractQualityEngine,
    engine: ReconciliationEngine,
    retry: RetryPolicy,
    actor: String,
}

impl<D: DocumentSource, S: StateStore> Pipeline<D, S> {
    pub fn new(source: D, store: S, patterns: Arc<PatternSet>) -> Self {
        Pipeline {
            source,
            store,
            patterns,
            quality: ExtractQualityEngine::new(),
            engine: ReconciliationEngine::new(),
            retry: RetryPolicy::default(),
            actor: DEFAULT_ACTOR.to_string(),
        }
    }

    /// Builder pattern: set retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder pattern: set reconciliation engine
    pub fn with_engine(mut self, engine: ReconciliationEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Builder pattern: set quality engine
    pub fn with_quality(mut self, quality: ExtractQualityEngine) -> Self {
        self.quality = quality;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Process every tracked INN once
    ///
    /// Only failing to list the tracked INNs fails the batch.
    pub fn process_companies(&mut self) -> Result<BatchSummary> {
        let inns = self
            .store
            .list_tracked_ids()
            .context("Failed to list tracked INNs")?;
        info!("Starting batch for {} companies", inns.len());

        let mut summary = BatchSummary::default();
        for inn in &inns {
            let outcome = self.process_company(inn);
            match &outcome {
                Ok(result) => info!("INN {}: {:?}", inn, result),
                Err(e) => error!("INN {} failed: {:#}", inn, e),
            }
            summary.count(&outcome);
        }

        info!("{}", summary.summary());
        Ok(summary)
    }

    pub fn process_company(&mut self, inn: &str) -> Result<CompanyOutcome> {
        let previous = self
            .store
            .get_record(inn)
            .with_context(|| format!("Failed to read stored record for {}", inn))?
            .unwrap_or_else(|| PersistedRecord::empty(inn));

        let source = &mut self.source;
        let fetched = self
            .retry
            .run(&format!("fetch document for {}", inn), |_| source.fetch(inn));
        let path = match fetched {
            Ok(Some(path)) => path,
            Ok(None) => {
                warn!("No document for INN {}, skipping", inn);
                return Ok(CompanyOutcome::Skipped);
            }
            Err(e) => {
                warn!("Giving up on document for INN {}: {:#}", inn, e);
                return Ok(CompanyOutcome::Skipped);
            }
        };

        let extractor = get_extractor(detect_backend(&path)?, Arc::clone(&self.patterns));
        let extract = extractor.extract(&path)?;

        // A leftover download for another company must not land in this row
        if let Some(owner) = extract.company_tax_id.as_deref().filter(|owner| *owner != inn) {
            warn!("{} is issued for INN {}, not {}", path.display(), owner, inn);
            if let Err(e) = self.source.refile(&path, owner) {
                warn!("Failed to refile {}: {:#}", path.display(), e);
            }
            return Ok(CompanyOutcome::Misfiled);
        }

        let report = self.quality.check(&extract);
        if report.is_clean() {
            info!("{}", report.summary());
        } else {
            warn!("{}", report.summary());
            for issue in &report.issues {
                warn!("  {:?} {}: {}", issue.severity, issue.field, issue.issue);
            }
        }

        let reconciliation = self.engine.reconcile(inn, &extract, &previous);
        if reconciliation.fell_back() {
            return Ok(CompanyOutcome::FellBack);
        }

        self.store
            .put_record(inn, &reconciliation.record)
            .with_context(|| format!("Failed to store record for {}", inn))?;

        let events = build_events(&reconciliation, &extract, &self.actor);
        if let Err(e) = self.store.record_events(&events) {
            warn!("Failed to record {} events for {}: {:#}", events.len(), inn, e);
        }

        Ok(match reconciliation.outcome {
            ReconciliationOutcome::Updated => CompanyOutcome::Updated,
            _ => CompanyOutcome::Unchanged,
        })
    }
}

/// Audit events for one reconciliation
///
/// Added/removed lines that share a founder key are reported once as
/// `founder_changed`.
pub fn build_events(reconciliation: &Reconciliation, extract: &CompanyExtract, actor: &str) -> Vec<Event> {
    let inn = reconciliation.inn.as_str();
    let mut events = Vec::new();

    let changes = reconciliation.diff.changed();
    let changed_keys: BTreeSet<FounderKey> = changes.iter().map(|c| c.key.clone()).collect();
    let is_changed = |line: &str| {
        FounderKey::from_line(line).map_or(false, |key| changed_keys.contains(&key))
    };

    for line in reconciliation.diff.added.iter().filter(|l| !is_changed(l.as_str())) {
        events.push(Event::company("founder_added", inn, json!({ "founder": line }), actor));
    }

    for line in reconciliation.diff.removed.iter().filter(|l| !is_changed(l.as_str())) {
        events.push(Event::company("founder_removed", inn, json!({ "founder": line }), actor));
    }

    for change in &changes {
        events.push(Event::company(
            "founder_changed",
            inn,
            json!({ "tax_id": change.key.tax_id, "before": change.before, "after": change.after }),
            actor,
        ));
    }

    if reconciliation.is_updated() {
        events.push(Event::company(
            "record_updated",
            inn,
            json!({
                "name": reconciliation.record.name,
                "change_date": reconciliation.record.change_date,
                "source_file": extract.source_file,
                "source_hash": extract.source_hash,
            }),
            actor,
        ));
    }

    events
}
