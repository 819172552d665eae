use thiserror::Error;

/// Failure taxonomy for the retrieval & synchronization engine.
///
/// Permission denial is not represented here: the evaluator returns a plain
/// boolean and callers turn it into a user-visible message. Absence of a
/// record is `Ok(None)` at the lookup site, not an error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration. Fatal at startup, never raised per call.
    #[error("configuration error: {0}")]
    Config(String),

    /// The cache backend could not be reached. Callers must fall back to the
    /// source-of-truth store instead of treating this as "no data".
    #[error("cache backend unavailable: {0}")]
    CacheUnavailable(String),

    /// An embedding, generation, or store call failed. Aborts only the
    /// current item's batch or the current command.
    #[error("upstream provider failure: {0}")]
    Upstream(String),

    /// A detectable gap in the document store, e.g. an edit whose delete
    /// succeeded but whose re-insert failed. Logged, never papered over.
    #[error("consistency violation for parent {parent_id}: {detail}")]
    Consistency { parent_id: String, detail: String },
}

impl EngineError {
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::Upstream(err.to_string())
    }
}
