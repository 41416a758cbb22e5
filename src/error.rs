//! Error types shared by the registry, the action pipeline and scope resolution.

/// Errors surfaced by store resolution and the mutation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A store that declares a containing scope was resolved outside of it.
    #[error("store '{store}' must be contained by a '{container}' container")]
    NotContained { store: String, container: String },

    /// A partial update could not be merged into the current state.
    #[error("cannot merge patch into state of store '{store}': {reason}")]
    InvalidPatch { store: String, reason: String },

    /// State or patch failed to (de)serialize.
    #[error("state serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A bound action was looked up by a name the definition does not declare.
    #[error("store '{store}' has no action named '{action}'")]
    UnknownAction { store: String, action: String },

    /// The shared registry backing a scope has been dropped.
    #[error("the runtime owning this scope has been dropped")]
    RegistryDropped,

    /// A composite key already holds a store of a different state type.
    #[error("registry entry '{key}' holds a different state type")]
    TypeMismatch { key: String },

    /// Failure raised by user action code.
    #[error(transparent)]
    Action(#[from] anyhow::Error),
}

/// Failures reported by an external devtools connection.
///
/// These never leave the instrumentation boundary; they are logged and dropped.
#[derive(Debug, thiserror::Error)]
pub enum DevtoolsError {
    #[error("devtools connection closed")]
    Disconnected,

    #[error("devtools rejected message: {0}")]
    Rejected(String),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
