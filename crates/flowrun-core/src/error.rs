//! Core domain errors.

use thiserror::Error;

/// Core domain errors for flowrun.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed `name@location` entry in the task inputs.
    #[error("Invalid input location '{0}': expected name@location")]
    InvalidInputLocation(String),
}
