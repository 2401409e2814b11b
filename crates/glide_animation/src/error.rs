//! Error types for glide_animation

use glide_core::{CoreError, PropertyKey};
use std::any::Any;
use thiserror::Error;

/// Failure inside a transition handler
#[derive(Error, Debug)]
pub enum TransitionError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The handler panicked; the payload message is kept
    #[error("transition handler panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for TransitionError {
    fn from(err: anyhow::Error) -> Self {
        TransitionError::Other(err.to_string())
    }
}

/// Failure while discovering or resolving transition handlers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no transition handler registered for {type_name}")]
    NotFound { type_name: &'static str },

    #[error("provider {provider} declared a handler for {type_name} more than once")]
    DuplicateDeclaration {
        provider: String,
        type_name: &'static str,
    },

    #[error("handler provider {provider} failed: {reason}")]
    ProviderFailed { provider: String, reason: String },
}

/// Errors surfaced by animations and the animator
#[derive(Error, Debug)]
pub enum AnimationError {
    /// A transition handler failed under the `Throw` policy
    #[error("transition failed for {property}: {source}")]
    Transition {
        property: PropertyKey,
        #[source]
        source: TransitionError,
    },

    /// An update callback failed under the `Throw` policy
    #[error("update callback failed for {property}: {message}")]
    Callback {
        property: PropertyKey,
        message: String,
    },

    #[error("invalid animator configuration: {0}")]
    Config(String),

    #[error("global animator is already set")]
    GlobalAlreadySet,
}

/// Result type for glide_animation operations
pub type Result<T> = std::result::Result<T, AnimationError>;

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let caught = std::panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "boom 7");

        let caught = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "static");
    }

    #[test]
    fn test_transition_error_from_anyhow() {
        let err: TransitionError = anyhow::anyhow!("bad frame").into();
        assert_eq!(err.to_string(), "bad frame");
    }
}
