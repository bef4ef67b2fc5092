use std::fmt;
use thiserror::Error;

/// Which kind of input a source error or status refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Microphone,
    AudioFile,
    LocalCamera,
    RemoteStream,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Microphone => "microphone",
            SourceKind::AudioFile => "audio file",
            SourceKind::LocalCamera => "local camera",
            SourceKind::RemoteStream => "remote stream",
        };
        f.write_str(name)
    }
}

/// Failures while acquiring or reading an input source.
///
/// None of these are fatal: callers keep the render loop running with
/// neutral feature values and surface the failure as a status flag.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{kind} unavailable: {reason}")]
    Unavailable { kind: SourceKind, reason: String },

    #[error("{kind} permission denied")]
    PermissionDenied { kind: SourceKind },

    #[error("{kind} did not become ready within {after_ms} ms")]
    Timeout { kind: SourceKind, after_ms: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("frame decode failed: {0}")]
    Decode(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn unavailable(kind: SourceKind, reason: impl Into<String>) -> Self {
        SourceError::Unavailable {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

/// Whether a connected source can be analysed or only displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Full,
    DisplayOnly,
}

/// Connection state reported for each source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceStatus {
    #[default]
    Disconnected,
    Active(Capability),
    Unavailable(String),
}

impl SourceStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SourceStatus::Active(_))
    }

    pub fn can_analyze(&self) -> bool {
        matches!(self, SourceStatus::Active(Capability::Full))
    }

    pub fn from_error(err: &SourceError) -> Self {
        SourceStatus::Unavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_source() {
        let err = SourceError::Timeout {
            kind: SourceKind::LocalCamera,
            after_ms: 5000,
        };
        assert_eq!(err.to_string(), "local camera did not become ready within 5000 ms");

        let err = SourceError::unavailable(SourceKind::Microphone, "no input device");
        assert_eq!(err.to_string(), "microphone unavailable: no input device");
    }

    #[test]
    fn test_status_flags() {
        assert!(!SourceStatus::Disconnected.is_active());
        assert!(SourceStatus::Active(Capability::DisplayOnly).is_active());
        assert!(!SourceStatus::Active(Capability::DisplayOnly).can_analyze());
        assert!(SourceStatus::Active(Capability::Full).can_analyze());

        let status = SourceStatus::from_error(&SourceError::PermissionDenied {
            kind: SourceKind::Microphone,
        });
        assert_eq!(status, SourceStatus::Unavailable("microphone permission denied".to_string()));
    }
}
