use crate::Point3;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    /// A run parameter is malformed or out of its valid range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The look-at construction has no defined orientation
    #[error("degenerate sensor look-at: position {position} cannot look at {target}")]
    DegenerateLookAt { position: Point3, target: Point3 },

    /// The configured target does not exist in the scene
    #[error("object '{0}' not found in the scene")]
    NotFound(String),

    /// A scene description could not be turned into geometry
    #[error("scene error: {0}")]
    Scene(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {}:{line}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("visualization failed: {0}")]
    Visualization(String),

    #[error("run cancelled after {completed} of {requested} samples")]
    Cancelled { completed: usize, requested: usize },
}

impl ScanError {
    /// Returns true for the errors which are raised while validating inputs, before any sample
    /// has been generated.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidConfig(_)
                | ScanError::DegenerateLookAt { .. }
                | ScanError::NotFound(_)
                | ScanError::Scene(_)
        )
    }
}
