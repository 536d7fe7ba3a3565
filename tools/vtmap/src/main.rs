//! VTOL VR heightmap exporter.
//!
//! `vtmap area` lays out a square map area in the UTM zone of a location and
//! writes it as a GeoJSON layer. `vtmap export` turns an elevation model,
//! that area layer and an optional city layer into a custom map folder:
//! height images plus the `.vtm` descriptor.
mod dem;
mod output;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use vtmap_core::area::{AreaOverrides, Biome, CoastSide, Edge, MapAreaBuilder};
use vtmap_core::config::{BathymetryConfig, Encoding, ExportSettings, ShorelineBias};
use vtmap_core::coords::{Extent, LatLon};
use vtmap_core::pipeline::{ArtifactSink, ExportJob, ExportOutcome, Exporter, LogFeedback};
use vtmap_core::raster::{NativeOps, Resampling};
use vtmap_core::vector::FeatureCollection;

use crate::output::{write_product, DebugDir};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vtmap", version, about = "Export real-world terrain as VTOL VR custom maps")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a map-area layer
    Area(AreaArgs),
    /// Export a map folder
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct AreaArgs {
    /// Centre latitude in degrees (with --lon and --chunks)
    #[arg(long, requires_all = ["lon", "chunks"], conflicts_with = "bbox", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Centre longitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Side length in chunks of 3072 m (8-64)
    #[arg(long)]
    chunks: Option<u32>,

    /// Reference extent in WGS84: min_lon,min_lat,max_lon,max_lat. The
    /// largest fitting area is centred on it.
    #[arg(long, value_delimiter = ',', num_args = 4, allow_hyphen_values = true)]
    bbox: Option<Vec<f64>>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long, default_value = "boreal")]
    biome: Biome,

    #[arg(long, default_value = "water")]
    edge: Edge,

    #[arg(long, default_value = "north")]
    coast: CoastSide,

    /// Keep the plain south-west longitude instead of the GPS-corrected one
    #[arg(long)]
    no_gps_fix: bool,

    /// Output GeoJSON path
    #[arg(short, long, default_value = "map_area.geojson")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Elevation model (single-band GeoTIFF)
    #[arg(long)]
    dem: PathBuf,

    /// Map-area layer written by `vtmap area`
    #[arg(long)]
    area: PathBuf,

    /// City layer with a "City Level" attribute (1-5)
    #[arg(long)]
    cities: Option<PathBuf>,

    /// Output folder; its name becomes the map id
    #[arg(short, long)]
    output: PathBuf,

    /// Settings JSON; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sea level in metres
    #[arg(long, allow_hyphen_values = true)]
    sea_level: Option<f32>,

    /// Slope-projected bathymetry with this shoreline bias
    #[arg(long, conflicts_with = "water_falloff")]
    shoreline_bias: Option<ShorelineBias>,

    /// Linear water falloff over this many metres instead of slope projection
    #[arg(long)]
    water_falloff: Option<f64>,

    /// Terrain resampling method
    #[arg(long)]
    resampling: Option<Resampling>,

    /// Which height images to write: split, single or both
    #[arg(long)]
    encoding: Option<Encoding>,

    /// Write every intermediate raster to <output>/debug
    #[arg(long)]
    debug: bool,

    #[arg(long)]
    biome: Option<Biome>,

    #[arg(long)]
    edge: Option<Edge>,

    #[arg(long)]
    coast: Option<CoastSide>,
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn run_area(args: &AreaArgs) -> Result<()> {
    let mut builder = MapAreaBuilder::new()
        .biome(args.biome)
        .edge(args.edge)
        .coast(args.coast)
        .improve_gps(!args.no_gps_fix);
    if let Some(name) = &args.name {
        builder = builder.name(name);
    }
    let area = match (&args.bbox, args.lat, args.lon, args.chunks) {
        (Some(b), ..) => builder.from_wgs84_extent(&Extent::new(b[0], b[1], b[2], b[3]))?,
        (None, Some(lat), Some(lon), Some(chunks)) => builder.from_center(LatLon::new(lat, lon), chunks)?,
        _ => bail!("give either --bbox or --lat, --lon and --chunks"),
    };
    let layer = area.to_layer(&Default::default());
    fs::write(&args.output, layer.to_geojson()?)
        .with_context(|| format!("Write failed: {}", args.output.display()))?;
    log::info!("Map area written to {}", args.output.display());
    Ok(())
}

fn read_layer(path: &Path) -> Result<FeatureCollection> {
    let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let mut layer = FeatureCollection::from_geojson(&text).with_context(|| format!("Cannot parse {}", path.display()))?;
    if layer.name.is_none() {
        layer.name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
    }
    Ok(layer)
}

fn settings_for(args: &ExportArgs) -> Result<ExportSettings> {
    let mut settings = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
            ExportSettings::from_json(&text).with_context(|| format!("Cannot parse {}", path.display()))?
        }
        None => ExportSettings::default(),
    };
    if let Some(sea) = args.sea_level {
        settings.sea_level_m = sea;
    }
    if let Some(bias) = args.shoreline_bias {
        settings.bathymetry = BathymetryConfig::SlopeProjection { shoreline_bias: bias };
    }
    if let Some(distance_m) = args.water_falloff {
        settings.bathymetry = BathymetryConfig::WaterFalloff { distance_m };
    }
    if let Some(r) = args.resampling {
        settings.resampling = r;
    }
    if let Some(e) = args.encoding {
        settings.encoding = e;
    }
    settings.debug |= args.debug;
    settings.overrides = AreaOverrides {
        biome: args.biome.or(settings.overrides.biome),
        edge: args.edge.or(settings.overrides.edge),
        coast: args.coast.or(settings.overrides.coast),
    };
    Ok(settings)
}

fn map_id(output: &Path) -> Result<String> {
    match output.file_name() {
        Some(name) => Ok(name.to_string_lossy().into_owned()),
        None => bail!("output folder {} has no name to use as map id", output.display()),
    }
}

fn run_export(args: &ExportArgs) -> Result<()> {
    let settings = settings_for(args)?;
    let job = ExportJob {
        map_id: map_id(&args.output)?,
        area: read_layer(&args.area)?,
        dem: dem::read_dem(&args.dem)?,
        cities: args.cities.as_deref().map(read_layer).transpose()?,
        settings,
    };

    let mut debug_dir = if job.settings.debug {
        Some(DebugDir::create(&args.output.join("debug"))?)
    } else {
        None
    };
    let sink: Option<&mut dyn ArtifactSink> = match debug_dir.as_mut() {
        Some(dir) => Some(dir),
        None => None,
    };

    let outcome = Exporter::new(&NativeOps, &LogFeedback)
        .run(&job, sink)
        .with_context(|| format!("Export of {} failed", job.map_id))?;
    match outcome {
        ExportOutcome::Completed(product) => {
            for path in write_product(&args.output, &product)? {
                log::info!("Wrote {}", path.display());
            }
        }
        ExportOutcome::Cancelled => log::warn!("Export cancelled; nothing written"),
    }
    Ok(())
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match &cli.command {
        Command::Area(args) => run_area(args),
        Command::Export(args) => run_export(args),
    }
}
