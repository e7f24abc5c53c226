// EGRUL Founder Tracker - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod text;           // Text Preprocessor + Section Locator
pub mod patterns;       // Pattern Matcher
pub mod founders;       // Record Assembler + Latest-Date Reducer
pub mod differ;         // Founder Set Differ
pub mod extractor;      // DocumentExtractor backends
pub mod quality;        // Extract quality checks
pub mod reconciliation; // State Reconciler
pub mod db;             // State store (SQLite) + audit events
pub mod source;         // Document source (download directory)
pub mod pipeline;       // Batch pipeline + retry policy
pub mod scheduler;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use text::{document_header, locate_founders_section, normalize_pages, preprocess_page};
pub use patterns::{FounderHead, NameShape, PatternSet, RegistrationEntry};
pub use founders::{
    assemble_founders, latest_change_date, is_valid_tax_id,
    FounderRecord, ReduceError,
};
pub use differ::{diff_founders, FounderChange, FounderDiff, FounderKey, FounderSet};
pub use extractor::{
    detect_backend, extract_from_pages, get_extractor,
    CompanyExtract, DocumentExtractor, ExtractError, ExtractorBackend,
    PdfExtractor, PlainTextExtractor,
};
pub use quality::{
    inn_checksum_valid, ExtractQualityEngine, QualityIssue, QualityReport, Severity,
};
pub use reconciliation::{
    FormerFoundersPolicy, Reconciliation, ReconciliationEngine, ReconciliationOutcome,
};
pub use db::{
    get_events_for_entity, insert_event, setup_database,
    Event, PersistedRecord, SqliteStore, StateStore,
};
pub use source::{DocumentSource, DownloadDirSource};
pub use pipeline::{BatchSummary, CompanyOutcome, Pipeline, RetryPolicy};
pub use scheduler::Scheduler;
pub use config::{Config, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
