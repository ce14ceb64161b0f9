use std::fmt;

/// Fatal errors that end a run before any batch executes.
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("listing deleted paths failed: {0}")]
    Listing(#[source] StorageError),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// A failed call against the storage service.
///
/// `status` and `code` carry the structured signal when the service answered;
/// transport failures only have a `message`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct StorageError {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl StorageError {
    pub fn new(status: Option<u16>, code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, None, message)
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            code: None,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_service_code() {
        let err = StorageError::new(
            Some(503),
            Some("ServerBusy"),
            "503 Service Unavailable: busy",
        );
        assert_eq!(err.to_string(), "503 Service Unavailable: busy (ServerBusy)");
        assert_eq!(StorageError::transport("reset").to_string(), "reset");
    }
}
