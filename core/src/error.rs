use thiserror::Error;

/// Error type for adventure persistence and import.
///
/// Every variant carries a message rather than the source error so the type
/// can cross the FFI boundary in both directions (host byte stores raise it).
#[derive(Error, Debug, Clone, PartialEq, uniffi::Error)]
pub enum StoreError {
    #[error("serialization failed: {message}")]
    Serialize { message: String },

    #[error("deserialization failed: {message}")]
    Deserialize { message: String },

    #[error("storage I/O failed: {message}")]
    Io { message: String },

    #[error("storage unavailable: {message}")]
    Unavailable { message: String },
}

impl StoreError {
    pub fn deserialize(err: serde_json::Error) -> Self {
        StoreError::Deserialize {
            message: err.to_string(),
        }
    }

    pub fn serialize(err: serde_json::Error) -> Self {
        StoreError::Serialize {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io {
            message: err.to_string(),
        }
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for StoreError {
    fn from(err: uniffi::UnexpectedUniFFICallbackError) -> Self {
        StoreError::Unavailable {
            message: err.reason,
        }
    }
}
