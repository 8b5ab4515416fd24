//! Intent engine error types.

use thiserror::Error;

/// Errors from the intent engine's configuration surface.
#[derive(Debug, Error)]
pub enum IntentError {
    /// The sensitive vocabulary could not be loaded or compiled.
    #[error("vocabulary error: {0}")]
    Vocabulary(String),

    /// A hot-config update was invalid.
    #[error("invalid intent configuration: {0}")]
    InvalidConfig(String),
}
