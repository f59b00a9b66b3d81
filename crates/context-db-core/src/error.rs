//! Error taxonomy shared by every layer of Context DB.
//!
//! Application code propagates [`anyhow::Error`]; these typed variants travel
//! inside it and are recovered with `downcast_ref::<ContextError>()` wherever
//! a caller has to branch on the failure kind (for example, mapping an add
//! failure to `status: collision`).

use thiserror::Error;

use crate::models::PipelineKind;

/// Errors with a meaning the caller can act on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// The computed URI is already bound to a different origin.
    #[error("name collision: {uri} is already bound to {existing}")]
    Collision { uri: String, existing: String },

    /// Directories, unknown URL schemes, or names that sanitize to nothing.
    #[error("unsupported origin: {0}")]
    UnsupportedOrigin(String),

    /// Lookup of an absent URI or an unproduced content level.
    #[error("not found: {0}")]
    NotFound(String),

    /// A pipeline exhausted its retry budget for a resource.
    #[error("{pipeline} pipeline failed for {uri}: {message}")]
    PipelineFailure {
        pipeline: PipelineKind,
        uri: String,
        message: String,
    },

    /// A string that does not parse as `<scheme>://resources[/seg]*`.
    #[error("invalid uri: {0}")]
    InvalidUri(String),

    /// A provider answered, but not in the shape the contract requires.
    #[error("provider error: {0}")]
    Provider(String),
}

impl ContextError {
    /// Extract a [`ContextError`] from an `anyhow` chain, if one is present.
    pub fn find(err: &anyhow::Error) -> Option<&ContextError> {
        err.chain().find_map(|e| e.downcast_ref::<ContextError>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_display() {
        let err = ContextError::Collision {
            uri: "ctx://resources/readme.md".to_string(),
            existing: "/a/readme.md".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "name collision: ctx://resources/readme.md is already bound to /a/readme.md"
        );
    }

    #[test]
    fn test_pipeline_failure_display() {
        let err = ContextError::PipelineFailure {
            pipeline: PipelineKind::Embed,
            uri: "ctx://resources/x".to_string(),
            message: "timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "embed pipeline failed for ctx://resources/x: timeout"
        );
    }

    #[test]
    fn test_find_through_context_chain() {
        let err = anyhow::Error::new(ContextError::NotFound("ctx://resources/a".into()))
            .context("reading abstract");
        assert!(matches!(
            ContextError::find(&err),
            Some(ContextError::NotFound(_))
        ));
    }

    #[test]
    fn test_find_absent() {
        let err = anyhow::anyhow!("plain failure");
        assert!(ContextError::find(&err).is_none());
    }
}
