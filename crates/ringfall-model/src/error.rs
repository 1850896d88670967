//! Error types for the model layer.

/// Errors that can occur while interpreting model values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// An item identifier that no [`ItemKind`](crate::ItemKind) matches.
    ///
    /// Configuration tables carry items as strings; an identifier the
    /// host does not know ends up here.
    #[error("unknown item identifier: {0}")]
    UnknownItem(String),
}
