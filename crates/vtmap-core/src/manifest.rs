//! The `.vtm` map descriptor the game reads next to the height images.
use std::fmt::{self, Write};

use crate::area::{Edge, MapArea};
use crate::error::{ExportError, Result};

pub const MANIFEST_EXTENSION: &str = "vtm";

/// Map ids name the output folder and appear verbatim in the manifest.
pub fn validate_map_id(map_id: &str) -> Result<()> {
    let bad = map_id.trim().is_empty()
        || map_id.chars().any(|c| c.is_control() || matches!(c, '/' | '\\' | '{' | '}'))
        || map_id == "."
        || map_id == "..";
    if bad {
        return Err(ExportError::InvalidSettings(format!("invalid map id {map_id:?}")));
    }
    Ok(())
}

/// `<map_id>.vtm`.
pub fn manifest_file_name(map_id: &str) -> String {
    format!("{map_id}.{MANIFEST_EXTENSION}")
}

/// Coordinates print like the game's own files: whole degrees keep one
/// decimal, everything else its shortest exact form.
fn degrees(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// Render the manifest. Tab-indented with `\n` line endings.
///
/// The game reads `longitude` as latitude and vice versa, so the area's
/// latitude is written to the `longitude` key.
pub fn render_vtm(map_id: &str, area: &MapArea) -> Result<String> {
    validate_map_id(map_id)?;
    let mut s = String::new();
    write_vtm(&mut s, map_id, area).map_err(|e| ExportError::InvalidSettings(e.to_string()))?;
    Ok(s)
}

fn write_vtm(s: &mut String, map_id: &str, area: &MapArea) -> fmt::Result {
    writeln!(s, "VTMapCustom")?;
    writeln!(s, "{{")?;
    writeln!(s, "\tmapID = {map_id}")?;
    writeln!(s, "\tmapName = ")?;
    writeln!(s, "\tmapDescription = ")?;
    writeln!(s, "\tmapType = HeightMap")?;
    writeln!(s, "\tedgeMode = {}", area.edge)?;
    writeln!(s, "\tlongitude = {}", degrees(area.latitude))?;
    writeln!(s, "\tlatitude = {}", degrees(area.longitude))?;
    writeln!(s, "\tcloudHeightOffset = -1")?;
    if let (Edge::Coast, Some(coast)) = (area.edge, area.coast) {
        writeln!(s, "\tcoastSide = {coast}")?;
    }
    writeln!(s, "\tbiome = {}", area.biome)?;
    writeln!(s, "\tseed = seed")?;
    writeln!(s, "\tmapSize = {}", area.chunks)?;
    writeln!(s, "\tTerrainSettings")?;
    writeln!(s, "\t{{")?;
    writeln!(s, "\t}}")?;
    writeln!(s, "}}")
}
