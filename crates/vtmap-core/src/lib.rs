//! Heightmap export for VTOL VR custom maps.
//!
//! Turns an elevation model and optional city footprints into the game's
//! height images and `.vtm` descriptor. Raster work goes through the
//! [`raster::RasterOps`] seam; [`raster::NativeOps`] is the built-in backend.

pub mod area;
pub mod bathymetry;
pub mod blend;
pub mod city;
pub mod classify;
pub mod config;
pub mod coords;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod quantize;
pub mod raster;
pub mod utm;
pub mod vector;

pub use area::{AreaOverrides, Biome, CoastSide, Edge, MapArea, MapAreaBuilder};
pub use config::{BathymetryConfig, Calibration, Encoding, ExportSettings, ShorelineBias};
pub use coords::{Crs, Extent, LatLon};
pub use error::{ExportError, Result};
pub use pipeline::{
    ArtifactSink, CancelToken, ExportJob, ExportOutcome, ExportProduct, Exporter, Feedback, LogFeedback, MemorySink,
};
pub use raster::{GridSpec, NativeOps, Raster, RasterOps, Resampling};
pub use vector::{Feature, FeatureCollection};
