//! Hard failures of a synchronization pass.
//!
//! Anything else that goes wrong during a pass is soft: it is logged, kept in
//! the pass report as a warning, and processing continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The same module exists both as a Composer package and in custom storage.
    #[error("{kind} conflict: {} exist both as Composer packages and as custom modules", names.join(", "))]
    Conflict { kind: String, names: Vec<String> },

    /// WP-CLI produced output that could not be interpreted.
    #[error("Cannot parse output of `wp {command}`: {reason}")]
    UnparseableOutput { command: String, reason: String },

    /// WP-CLI exited with an error where its answer is required.
    #[error("`wp {command}` failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl ReconcileError {
    /// Conflicts and unreadable WP-CLI answers abort a pass without touching anything.
    pub fn is_hard_failure(&self) -> bool {
        !matches!(self, ReconcileError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_display_lists_names() {
        let err = ReconcileError::Conflict {
            kind: "plugin".into(),
            names: vec!["akismet".into(), "seo-tool".into()],
        };
        let message = err.to_string();
        assert!(message.starts_with("plugin conflict"));
        assert!(message.contains("akismet, seo-tool"));
        assert!(err.is_hard_failure());
    }

    #[test]
    fn test_unparseable_output_display() {
        let err = ReconcileError::UnparseableOutput {
            command: "plugin list".into(),
            reason: "missing 'version' column".into(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot parse output of `wp plugin list`: missing 'version' column"
        );
    }

    #[test]
    fn test_io_wraps_anyhow() {
        let err: ReconcileError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.to_string(), "disk full");
        assert!(!err.is_hard_failure());
    }
}
