use crate::error::StorageError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The path already exists; treated as restored by an earlier attempt.
    Conflict,
    /// 5xx or throttling; drives backoff.
    Server,
    Other,
}

/// Maps a failed restore call to a [`FailureKind`].
///
/// The service error code wins, then the HTTP status. The substring tables
/// are consulted only when the error carries neither, which in practice means
/// a transport failure whose text is all we have.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    pub conflict_codes: Vec<String>,
    pub server_codes: Vec<String>,
    pub conflict_patterns: Vec<String>,
    pub server_patterns: Vec<String>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            conflict_codes: owned(&["BlobAlreadyExists", "PathAlreadyExists"]),
            server_codes: owned(&["ServerBusy", "InternalError", "OperationTimedOut"]),
            conflict_patterns: owned(&["BlobAlreadyExists"]),
            server_patterns: owned(&[
                "500 Server Error",
                "502 Bad Gateway",
                "503 Service Unavailable",
                "504 Gateway Timeout",
                "ServerBusy",
                "ThrottlingError",
            ]),
        }
    }
}

impl ErrorClassifier {
    pub fn classify(&self, err: &StorageError) -> FailureKind {
        if let Some(code) = err.code.as_deref() {
            if self.conflict_codes.iter().any(|c| c == code) {
                return FailureKind::Conflict;
            }
            if self.server_codes.iter().any(|c| c == code) {
                return FailureKind::Server;
            }
        }

        if let Some(status) = err.status {
            return match status {
                429 | 500..=599 => FailureKind::Server,
                409 if err.code.is_none() => FailureKind::Conflict,
                _ => FailureKind::Other,
            };
        }
        if err.code.is_some() {
            return FailureKind::Other;
        }

        let text = err.message.as_str();
        if self.conflict_patterns.iter().any(|p| text.contains(p.as_str())) {
            FailureKind::Conflict
        } else if self.server_patterns.iter().any(|p| text.contains(p.as_str())) {
            FailureKind::Server
        } else {
            FailureKind::Other
        }
    }
}
