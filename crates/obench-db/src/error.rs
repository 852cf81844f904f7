//! Error types for result log storage

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem I/O errors
    #[error("Filesystem error: {path}: {source}")]
    Filesystem {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding or decoding errors
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// A results file name that does not follow the `results[-name].csv` pattern
    #[error("Invalid results file name: {name}")]
    InvalidFileName { name: String },

    /// Remote store errors
    #[error("Remote store error: {message}")]
    Remote {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A blocking storage task panicked or was cancelled
    #[error("Storage task failed: {message}")]
    Task { message: String },
}

impl StoreError {
    /// Create a new filesystem error
    pub fn filesystem<P: Into<String>>(path: P, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Create a new CSV error
    pub fn csv<P: Into<String>>(path: P, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    /// Create a new remote error
    pub fn remote<S: Into<String>>(message: S) -> Self {
        Self::Remote {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new remote error with source
    pub fn remote_with_source<
        S: Into<String>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    >(
        message: S,
        source: E,
    ) -> Self {
        Self::Remote {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn task<S: Into<String>>(message: S) -> Self {
        Self::Task {
            message: message.into(),
        }
    }
}
