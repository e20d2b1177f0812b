//! Template engine error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Template rendering error
    #[error("Template error: {0}")]
    TemplateError(String),

    /// Override directory could not be read
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
