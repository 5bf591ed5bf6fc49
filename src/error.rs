/// Error types for the uilex core
#[derive(Debug)]
pub enum UilexError {
    /// Error writing an export or index file
    ExportWriteError(String),
    /// Error starting or driving the dictionary file watcher
    WatchError(String),
    /// Underlying filesystem error with the path it occurred on
    Io(String, std::io::Error),
    /// General error with context
    Other(String),
}

impl std::fmt::Display for UilexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UilexError::ExportWriteError(msg) => write!(f, "Export write error: {}", msg),
            UilexError::WatchError(msg) => write!(f, "Watch error: {}", msg),
            UilexError::Io(path, err) => write!(f, "I/O error on {}: {}", path, err),
            UilexError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for UilexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UilexError::Io(_, err) => Some(err),
            _ => None,
        }
    }
}

impl UilexError {
    /// Wrap a filesystem error together with the path being touched
    pub fn io(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        UilexError::Io(path.as_ref().display().to_string(), err)
    }
}

/// Result type for uilex operations
pub type UilexResult<T> = Result<T, UilexError>;
