//! Rich diagnostic error types for the maat engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains. The coarse taxonomy
//! (validation, not-found, conflict, timeout) lives as variants of the owning
//! subsystem's enum rather than as a separate generic layer.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the maat engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source spans) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum MaatError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Consult(#[from] ConsultError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Knowledge store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("invalid entry: {message}")]
    #[diagnostic(
        code(maat::store::validation),
        help(
            "Entries need a non-empty title, non-empty content within the size \
             limit, and a category from the known taxonomy. \
             List valid categories with `maat categories`."
        )
    )]
    Validation { message: String },

    #[error("knowledge entry not found: {id}")]
    #[diagnostic(
        code(maat::store::not_found),
        help("No active entry with this id exists. It may have been deactivated.")
    )]
    NotFound { id: u64 },

    #[error("version conflict on entry {id}: expected {expected}, current {current}")]
    #[diagnostic(
        code(maat::store::conflict),
        help(
            "Another writer updated this entry first. Re-fetch the entry, \
             reapply your change against the current version, and retry."
        )
    )]
    Conflict {
        id: u64,
        expected: u64,
        current: u64,
    },

    #[error("entry id space exhausted")]
    #[diagnostic(
        code(maat::store::ids_exhausted),
        help(
            "The entry id allocator ran out of ids. This requires 2^64 - 1 \
             allocations and indicates an allocation loop."
        )
    )]
    IdsExhausted,

    #[error("I/O error: {source}")]
    #[diagnostic(
        code(maat::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(maat::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption — try running with a fresh data directory."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(maat::store::serde),
        help(
            "Failed to serialize or deserialize stored data. This usually means \
             the stored data format changed between versions. Re-import your data."
        )
    )]
    Serialization { message: String },
}

// ---------------------------------------------------------------------------
// Relation graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("self-loop relation rejected on entry {id}")]
    #[diagnostic(
        code(maat::graph::self_loop),
        help("A knowledge entry cannot relate to itself. Use two distinct entry ids.")
    )]
    SelfLoop { id: u64 },

    #[error("relation endpoint does not exist: {id}")]
    #[diagnostic(
        code(maat::graph::unknown_endpoint),
        help("Both endpoints of a relation must reference existing knowledge entries.")
    )]
    UnknownEndpoint { id: u64 },

    #[error("duplicate relation: {source_id} -[{relation_type}]-> {target}")]
    #[diagnostic(
        code(maat::graph::duplicate),
        help(
            "A relation with this (source, target, type) triple already exists. \
             Multiple relation types between the same pair are allowed; exact \
             duplicates are not."
        )
    )]
    DuplicateRelation {
        source_id: u64,
        target: u64,
        relation_type: String,
    },

    #[error("relation confidence out of range: {confidence}")]
    #[diagnostic(
        code(maat::graph::confidence),
        help("Relation confidence must lie in [0.0, 1.0].")
    )]
    InvalidConfidence { confidence: f32 },
}

// ---------------------------------------------------------------------------
// Indexer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum IndexError {
    #[error("failed to spawn index refresh worker: {message}")]
    #[diagnostic(
        code(maat::index::worker_spawn),
        help("The OS refused to create the worker thread. Check resource limits.")
    )]
    WorkerSpawn { message: String },

    #[error("index refresh queue disconnected")]
    #[diagnostic(
        code(maat::index::queue_closed),
        help(
            "The index refresh worker is no longer running. This happens when \
             the engine is shutting down; no further refreshes will be applied."
        )
    )]
    QueueClosed,
}

// ---------------------------------------------------------------------------
// Search errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SearchError {
    #[error("empty search query")]
    #[diagnostic(
        code(maat::search::empty_query),
        help("Provide a non-empty query containing at least one indexable term.")
    )]
    EmptyQuery,

    #[error("search query too long: {length} chars (max {max})")]
    #[diagnostic(
        code(maat::search::query_too_long),
        help("Shorten the query. Long inputs belong in a consultation, not a search.")
    )]
    QueryTooLong { length: usize, max: usize },
}

// ---------------------------------------------------------------------------
// Classifier errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ClassifyError {
    #[error("empty classification input")]
    #[diagnostic(
        code(maat::classify::empty_input),
        help("The classifier needs a non-empty question text.")
    )]
    EmptyInput,

    #[error("classification input too long: {length} chars (max {max})")]
    #[diagnostic(
        code(maat::classify::input_too_long),
        help("Shorten the question to at most the configured maximum length.")
    )]
    InputTooLong { length: usize, max: usize },
}

// ---------------------------------------------------------------------------
// Consultation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConsultError {
    #[error("invalid question: {message}")]
    #[diagnostic(
        code(maat::consult::invalid_question),
        help("Questions must be non-empty and within the configured length limit.")
    )]
    InvalidQuestion { message: String },

    #[error("consultation exceeded its deadline of {deadline_ms} ms")]
    #[diagnostic(
        code(maat::consult::timeout),
        help(
            "The consultation did not finish within its deadline and was recorded \
             as failed. Retry the question; it is never retried automatically."
        )
    )]
    Timeout { deadline_ms: u64 },

    #[error("answer composition failed: {message}")]
    #[diagnostic(
        code(maat::consult::compose),
        help(
            "The answer composer returned an error after all retries. \
             If a remote composer is configured, check that it is reachable."
        )
    )]
    Compose { message: String },

    #[error("consultation cancelled by caller")]
    #[diagnostic(
        code(maat::consult::cancelled),
        help("The cancellation token was triggered before composition began.")
    )]
    Cancelled,

    #[error("duplicate consultation record: {id}")]
    #[diagnostic(
        code(maat::consult::duplicate_record),
        help("Consultation ids are allocated once; appending the same id twice is a bug.")
    )]
    DuplicateRecord { id: u64 },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the answer composer. Distinguishes transient failures
/// (retried with backoff by the orchestrator) from permanent ones.
#[derive(Debug, Error, Diagnostic)]
pub enum ComposeError {
    #[error("composer unreachable at {url}")]
    #[diagnostic(
        code(maat::compose::unreachable),
        help("Check that the remote composition service is running and the URL is correct.")
    )]
    Unreachable { url: String },

    #[error("composer request failed: {message}")]
    #[diagnostic(
        code(maat::compose::request_failed),
        help("The composition request was rejected or the connection dropped.")
    )]
    RequestFailed { message: String },

    #[error("composer response malformed: {message}")]
    #[diagnostic(
        code(maat::compose::parse_error),
        help("The composition service returned an unexpected response format.")
    )]
    ParseError { message: String },

    #[error("composer timed out after {timeout_ms} ms")]
    #[diagnostic(
        code(maat::compose::timeout),
        help("Increase the consultation deadline or use the template composer.")
    )]
    Timeout { timeout_ms: u64 },
}

impl ComposeError {
    /// Whether the orchestrator should retry this failure with backoff.
    ///
    /// Timeouts are never retried (the deadline is already spent) and parse
    /// errors are permanent; connection-level failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ComposeError::Unreachable { .. } | ComposeError::RequestFailed { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Import errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ImportError {
    #[error("unsupported import format: \"{format}\"")]
    #[diagnostic(
        code(maat::import::unsupported_format),
        help(
            "Supported formats are: plain text, html, pdf, and csv. \
             Word documents are not parsed; convert them to text or PDF first."
        )
    )]
    UnsupportedFormat { format: String },

    #[error("parse error in {format} document: {message}")]
    #[diagnostic(
        code(maat::import::parse_error),
        help("The document could not be parsed. Verify the file is valid {format}.")
    )]
    ParseError { format: String, message: String },

    #[error("empty document: no content extracted from \"{origin}\"")]
    #[diagnostic(
        code(maat::import::empty_document),
        help(
            "The parser could not extract any text from the source. \
             The file may be empty or contain only non-text elements."
        )
    )]
    EmptyDocument { origin: String },

    #[error("I/O error: {source}")]
    #[diagnostic(
        code(maat::import::io),
        help("A filesystem operation failed. Check file paths and permissions.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(maat::engine::invalid_config),
        help("Check the EngineConfig fields. {message}")
    )]
    InvalidConfig { message: String },

    #[error("data directory error: {path}")]
    #[diagnostic(
        code(maat::engine::data_dir),
        help(
            "The data directory could not be accessed. \
             Ensure the path exists and has read/write permissions."
        )
    )]
    DataDir { path: String },

    #[error("failed to read config file: {path}")]
    #[diagnostic(
        code(maat::engine::config_read),
        help("Ensure the config file exists and is readable.")
    )]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {path}")]
    #[diagnostic(
        code(maat::engine::config_parse),
        help("Check the TOML syntax in the config file.")
    )]
    ConfigParse { path: String, message: String },
}

/// Convenience alias for functions returning maat results.
pub type MaatResult<T> = std::result::Result<T, MaatError>;
