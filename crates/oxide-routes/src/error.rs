//! Error types for route table construction and dispatch.

use thiserror::Error;

/// Boxed error produced by a route handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Router-specific errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A route source failed the structural checks.
    #[error("invalid route source `{route}`: {reason}")]
    InvalidSource {
        /// The offending source string.
        route: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A terminal route source names more than one target.
    #[error("route `{route}` declares more than one target")]
    MultipleTargets {
        /// The offending source string.
        route: String,
    },

    /// A declaration uses a stage name the profile does not support.
    #[error("stage `{stage}` is not allowed in {profile} route declarations")]
    ReservedStage {
        /// The stage key that was found.
        stage: String,
        /// The profile being normalized.
        profile: &'static str,
    },

    /// A declaration could not be understood.
    #[error("invalid route declaration: {0}")]
    InvalidDeclaration(String),

    /// Slot-addressed access after the merge queue was compacted.
    #[error("merge queue has been compacted")]
    QueueCompacted,

    /// Plugin index outside the merge queue.
    #[error("plugin slot {index} out of range for {len} plugins")]
    SlotOutOfRange {
        /// Requested plugin index.
        index: usize,
        /// Number of plugin slots.
        len: usize,
    },

    /// Append on a route index that has already been frozen.
    #[error("route index is frozen")]
    Frozen,

    /// A required parameter was not supplied when building a path.
    #[error("missing path parameter: {0}")]
    MissingParameter(String),

    /// A parameter value does not satisfy the parameter's pattern.
    #[error("invalid value `{value}` for path parameter `{name}`")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Rejected value.
        value: String,
    },

    /// No terminal route is registered under the given source.
    #[error("route not found: {0}")]
    RouteNotFound(String),

    /// A custom parameter pattern was rejected by the regex engine.
    #[error("invalid path pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Configuration or declaration JSON could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// A handler failed during dispatch.
    #[error("handler for `{route}` failed: {source}")]
    Handler {
        /// Source string of the route whose handler failed.
        route: String,
        /// The handler's error.
        #[source]
        source: HandlerError,
    },
}

impl RouterError {
    pub(crate) fn invalid_source(source: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            route: source.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;
