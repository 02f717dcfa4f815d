use thiserror::Error;

/// A persisted snapshot could not be turned into a document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot root must be an object with a `blocks` array")]
    MissingBlocks,

    #[error("Unsupported snapshot version {found} (newest supported is {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Malformed node at {path:?}: {reason}")]
    MalformedNode { path: Vec<usize>, reason: String },
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Text op out of range: {0}")]
    OutOfRange(String),

    #[error("Normalization did not converge")]
    NormalizeDidNotConverge,
}

impl From<PathError> for ApplyError {
    fn from(value: PathError) -> Self {
        ApplyError::InvalidPath(value.0)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct PathError(pub String);

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for CommandError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for CommandError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Duplicate node spec kind: {0}")]
    DuplicateKind(String),

    #[error("Duplicate command id: {0}")]
    DuplicateCommand(String),

    #[error("Duplicate query id: {0}")]
    DuplicateQuery(String),
}

/// User supplied input was rejected; the prompt that produced it stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Unsupported image type `{extension}`, choose one of: {allowed}")]
    UnsupportedImageType { extension: String, allowed: String },

    #[error("The selected file has no extension, choose one of: {allowed}")]
    MissingExtension { allowed: String },

    #[error("No image selected")]
    NoImageSelected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialogError {
    #[error("Dialog request #{pending} is still waiting for the user")]
    Busy { pending: u64 },

    #[error("No dialog request is pending")]
    NoPendingRequest,

    #[error("The pending dialog is not an image request")]
    NotAnImageRequest,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse editor config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid editor config: {0}")]
    Invalid(String),
}
