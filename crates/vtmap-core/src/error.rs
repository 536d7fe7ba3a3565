use thiserror::Error;

use crate::raster::RasterError;
use crate::vector::VectorError;

/// Everything that can stop an export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid map area: {0}")]
    InvalidArea(String),
    #[error("required field \"{0}\" not found. Map area layer is invalid")]
    MissingAreaField(&'static str),
    #[error("layer \"{0}\" is not a city layer (no \"City Level\" field)")]
    NotACityLayer(String),
    #[error("city feature {index} has invalid level {value} (expected an integer 1-5)")]
    InvalidCityLevel { index: usize, value: String },
    #[error("city raster holds value {0}, expected 0-5")]
    InvalidCityRaster(f32),
    #[error("invalid input layer: {0}")]
    InvalidSource(String),
    #[error("invalid export settings: {0}")]
    InvalidSettings(String),
    #[error("{stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: RasterError,
    },
    /// Internal signal, surfaced to callers as [`crate::pipeline::ExportOutcome::Cancelled`].
    #[error("export cancelled")]
    Cancelled,
    #[error(transparent)]
    Vector(#[from] VectorError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// Attach the failing stage name to an operator error.
pub trait StageExt<T> {
    fn stage(self, stage: &'static str) -> Result<T>;
}

impl<T> StageExt<T> for std::result::Result<T, RasterError> {
    fn stage(self, stage: &'static str) -> Result<T> {
        self.map_err(|source| ExportError::Stage { stage, source })
    }
}
