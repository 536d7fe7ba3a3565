//! Export orchestrator: validates a job, then runs every stage in order.
//!
//! Stage order:
//!   1. Clip the elevation model to the map area
//!   2. Lift terrain relative to sea level
//!   3. Resample terrain onto the output grid
//!   4. Synthesize bathymetry (strategy specific, several stages)
//!   5. Blend land and water into raw height steps
//!   6. Burn cities (when a city layer is given)
//!   7. Encode height images
//!   8. Render the map descriptor

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::area::MapArea;
use crate::bathymetry::{strategy_for, BathymetryInput, BathymetryStrategy};
use crate::blend::blend_terrain;
use crate::city::{burn_cities, CityLayer, CityRaster, CityStats, CITY_LEVEL_FIELD};
use crate::config::ExportSettings;
use crate::coords::{CoordTransform, Extent};
use crate::error::{ExportError, Result, StageExt};
use crate::manifest::{manifest_file_name, render_vtm, validate_map_id};
use crate::quantize::{encode, EncodedHeight};
use crate::raster::{Raster, RasterOps, Resampling, WarpOptions};
use crate::vector::FeatureCollection;

// ── Progress & cancellation ──────────────────────────────────────────────────

/// Receives stage progress. `fraction` runs from 0 to 1.
pub trait Feedback {
    fn progress(&self, text: &str, fraction: f64);
}

/// Reports progress through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFeedback;

impl Feedback for LogFeedback {
    fn progress(&self, text: &str, fraction: f64) {
        log::info!("[{:>3.0}%] {text}", fraction * 100.0);
    }
}

/// Shared flag checked between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Debug artifacts ──────────────────────────────────────────────────────────

/// Destination for intermediate rasters and layers in debug mode.
pub trait ArtifactSink {
    fn write_raster(&mut self, name: &str, raster: &Raster) -> io::Result<()>;
    fn write_features(&mut self, name: &str, layer: &FeatureCollection) -> io::Result<()>;
}

/// Keeps artifacts in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub rasters: Vec<(String, Raster)>,
    pub layers: Vec<(String, FeatureCollection)>,
}

impl MemorySink {
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .rasters
            .iter()
            .map(|(n, _)| n.as_str())
            .chain(self.layers.iter().map(|(n, _)| n.as_str()))
            .collect();
        names.sort_unstable();
        names
    }
}

impl ArtifactSink for MemorySink {
    fn write_raster(&mut self, name: &str, raster: &Raster) -> io::Result<()> {
        self.rasters.push((name.to_string(), raster.clone()));
        Ok(())
    }

    fn write_features(&mut self, name: &str, layer: &FeatureCollection) -> io::Result<()> {
        self.layers.push((name.to_string(), layer.clone()));
        Ok(())
    }
}

/// Stage bookkeeping handed to every stage: progress, cancellation checks
/// and sequentially numbered artifacts (`01_hires_source`, ...).
pub struct StageRunner<'a> {
    feedback: &'a dyn Feedback,
    cancel: CancelToken,
    sink: Option<&'a mut dyn ArtifactSink>,
    total: usize,
    started: usize,
    persisted: usize,
}

impl<'a> StageRunner<'a> {
    pub fn new(
        feedback: &'a dyn Feedback,
        cancel: CancelToken,
        sink: Option<&'a mut dyn ArtifactSink>,
        total: usize,
    ) -> Self {
        Self { feedback, cancel, sink, total: total.max(1), started: 0, persisted: 0 }
    }

    /// Enter the next stage, or stop if the run was cancelled.
    pub fn begin(&mut self, text: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        let fraction = self.started as f64 / self.total as f64;
        self.started += 1;
        self.feedback.progress(&format!("{text} ({}/{})", self.started, self.total), fraction);
        Ok(())
    }

    pub fn is_persisting(&self) -> bool {
        self.sink.is_some()
    }

    pub fn persist(&mut self, name: &str, raster: &Raster) -> Result<()> {
        if let Some(sink) = self.sink.as_deref_mut() {
            self.persisted += 1;
            let name = format!("{:02}_{name}", self.persisted);
            log::debug!("persisting {name}");
            sink.write_raster(&name, raster)?;
        }
        Ok(())
    }

    pub fn persist_features(&mut self, name: &str, layer: &FeatureCollection) -> Result<()> {
        if let Some(sink) = self.sink.as_deref_mut() {
            self.persisted += 1;
            let name = format!("{:02}_{name}", self.persisted);
            log::debug!("persisting {name}");
            sink.write_features(&name, layer)?;
        }
        Ok(())
    }

    fn finish(&self) {
        self.feedback.progress("Done", 1.0);
    }
}

// ── Jobs & results ───────────────────────────────────────────────────────────

/// Everything one export needs.
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Output folder name; becomes `mapID` in the descriptor.
    pub map_id: String,
    /// Map-area layer, see [`MapArea::from_layer`].
    pub area: FeatureCollection,
    /// Elevation model in metres.
    pub dem: Raster,
    pub cities: Option<FeatureCollection>,
    pub settings: ExportSettings,
}

#[derive(Debug, Clone)]
pub struct ExportProduct {
    pub map_area: MapArea,
    /// Blended height steps on the output grid, 0..=1020.
    pub raw_steps: Raster,
    pub cities: Option<CityRaster>,
    pub city_stats: Option<CityStats>,
    pub images: EncodedHeight,
    pub manifest: String,
    pub manifest_name: String,
}

#[derive(Debug)]
pub enum ExportOutcome {
    Completed(Box<ExportProduct>),
    Cancelled,
}

impl ExportOutcome {
    pub fn product(self) -> Option<ExportProduct> {
        match self {
            ExportOutcome::Completed(p) => Some(*p),
            ExportOutcome::Cancelled => None,
        }
    }
}

/// A job that passed validation.
struct Plan {
    area: MapArea,
    strategy: Box<dyn BathymetryStrategy>,
    cities: Option<CityLayer>,
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

pub struct Exporter<'a> {
    ops: &'a dyn RasterOps,
    feedback: &'a dyn Feedback,
    cancel: CancelToken,
}

impl<'a> Exporter<'a> {
    pub fn new(ops: &'a dyn RasterOps, feedback: &'a dyn Feedback) -> Self {
        Self { ops, feedback, cancel: CancelToken::new() }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Validate `job` and run the export. Intermediate rasters go to
    /// `artifacts` when the job's settings enable debug output.
    ///
    /// Nothing runs unless every input validates. A cancelled run is not an
    /// error and yields [`ExportOutcome::Cancelled`].
    pub fn run(&self, job: &ExportJob, artifacts: Option<&mut dyn ArtifactSink>) -> Result<ExportOutcome> {
        let plan = self.validate(job)?;
        let total = 3 + plan.strategy.stage_count() + 1 + usize::from(plan.cities.is_some()) + 2;
        let sink: Option<&mut dyn ArtifactSink> = match artifacts {
            Some(sink) if job.settings.debug => Some(sink),
            _ => None,
        };
        let mut stages = StageRunner::new(self.feedback, self.cancel.clone(), sink, total);

        log::info!(
            "Exporting \"{}\": {} chunks, {} bathymetry, {} resampling",
            job.map_id,
            plan.area.chunks,
            plan.strategy.name(),
            job.settings.resampling
        );
        match self.execute(job, plan, &mut stages) {
            Ok(product) => {
                stages.finish();
                Ok(ExportOutcome::Completed(Box::new(product)))
            }
            Err(ExportError::Cancelled) => {
                log::warn!("export of \"{}\" cancelled", job.map_id);
                Ok(ExportOutcome::Cancelled)
            }
            Err(e) => Err(e),
        }
    }

    fn validate(&self, job: &ExportJob) -> Result<Plan> {
        let settings = &job.settings;
        let cal = &settings.calibration;
        settings.validate()?;
        validate_map_id(&job.map_id)?;
        let area = MapArea::from_layer(&job.area, &settings.overrides, cal)?;
        let strategy = strategy_for(&settings.bathymetry, cal)?;
        check_dem(&job.dem, &area)?;
        let cities = job
            .cities
            .as_ref()
            .map(|layer| CityLayer::from_collection(layer, &area.crs))
            .transpose()?;
        Ok(Plan { area, strategy, cities })
    }

    fn execute(&self, job: &ExportJob, plan: Plan, stages: &mut StageRunner<'_>) -> Result<ExportProduct> {
        let ops = self.ops;
        let settings = &job.settings;
        let cal = &settings.calibration;
        let area = plan.area;
        let grid = area.target_grid(cal);
        let sea_level = settings.sea_level_m;

        // ── 1. Clip ─────────────────────────────────────────────────────────
        stages.begin("Clipping elevation model")?;
        let hires_source = ops
            .reproject(&job.dem, &WarpOptions::clip(&area.crs, area.extent, Resampling::Nearest))
            .stage("clip elevation")?;
        let missing = hires_source.nodata_count();
        if missing > 0 {
            log::warn!(
                "elevation model leaves {:.1}% of the map area empty; treated as land at sea level",
                100.0 * missing as f64 / hires_source.data.len() as f64
            );
        }
        stages.persist("hires_source", &hires_source)?;

        // ── 2. Terrain above sea level ─────────────────────────────────────
        stages.begin("Preparing terrain")?;
        // Nodata survives the resample so gaps stay land for every strategy.
        let void = hires_source.nodata;
        let hires_terrain = ops
            .calc(&[&hires_source], void, &|px| {
                if hires_source.is_nodata(px[0]) {
                    px[0]
                } else {
                    (px[0] - sea_level).max(0.0)
                }
            })
            .stage("terrain above sea level")?;
        stages.persist("hires_terrain", &hires_terrain)?;

        // ── 3. Resample ─────────────────────────────────────────────────────
        stages.begin("Resampling terrain")?;
        let lores_terrain = ops
            .reproject(&hires_terrain, &WarpOptions::onto(&grid, settings.resampling))
            .stage("resample terrain")?;
        stages.persist("lores_terrain", &lores_terrain)?;

        // ── 4. Bathymetry ───────────────────────────────────────────────────
        let input = BathymetryInput {
            hires_source: &hires_source,
            lores_terrain: &lores_terrain,
            sea_level,
            calibration: cal,
        };
        let surface = plan.strategy.synthesize(&input, ops, stages)?;

        // ── 5. Blend ────────────────────────────────────────────────────────
        stages.begin("Blending terrain")?;
        let raw_steps = blend_terrain(ops, &lores_terrain, &surface, cal).stage("blend")?;
        if let Some((lo, hi)) = raw_steps.value_range() {
            log::debug!("raw height steps {lo}..={hi}");
        }
        stages.persist("lores_blend", &raw_steps)?;

        // ── 6. Cities ───────────────────────────────────────────────────────
        let (cities, city_stats) = match &plan.cities {
            Some(layer) => {
                stages.begin("Burning cities")?;
                let burned = burn_cities(ops, layer, &grid)?;
                stages.persist("city_levels", burned.raster())?;
                if stages.is_persisting() {
                    let mut polygons = ops.vectorize(burned.raster(), CITY_LEVEL_FIELD).stage("vectorize cities")?;
                    polygons.retain(|f| f.number(CITY_LEVEL_FIELD).is_some_and(|l| l > 0.0));
                    let layer = FeatureCollection::new(grid.crs.clone(), polygons).with_name("cities");
                    stages.persist_features("cities", &layer)?;
                }
                let stats = CityStats::from_layer(layer);
                stats.log();
                (Some(burned), Some(stats))
            }
            None => (None, None),
        };

        // ── 7. Encode ───────────────────────────────────────────────────────
        stages.begin("Encoding height images")?;
        let images = encode(&raw_steps, cities.as_ref(), settings.encoding, cal)?;

        // ── 8. Descriptor ───────────────────────────────────────────────────
        stages.begin("Writing map descriptor")?;
        let manifest = render_vtm(&job.map_id, &area)?;

        Ok(ExportProduct {
            map_area: area,
            raw_steps,
            cities,
            city_stats,
            images,
            manifest,
            manifest_name: manifest_file_name(&job.map_id),
        })
    }
}

/// The DEM must hold data, be projectable into the map CRS and overlap the area.
fn check_dem(dem: &Raster, area: &MapArea) -> Result<()> {
    if dem.grid.is_empty() || dem.data.is_empty() {
        return Err(ExportError::InvalidSource("elevation model is empty".into()));
    }
    if dem.nodata_count() == dem.data.len() {
        return Err(ExportError::InvalidSource("elevation model holds no data".into()));
    }
    let to_dem = CoordTransform::new(&area.crs, &dem.grid.crs)
        .map_err(|e| ExportError::InvalidSource(format!("elevation model: {e}")))?;
    let footprint = to_dem.transform_extent(&area.extent);
    if !overlaps(&footprint, &dem.grid.extent) {
        return Err(ExportError::InvalidSource(format!(
            "elevation model ({}) does not cover the map area",
            dem.grid.crs
        )));
    }
    Ok(())
}

fn overlaps(a: &Extent, b: &Extent) -> bool {
    a.min_x < b.max_x && b.min_x < a.max_x && a.min_y < b.max_y && b.min_y < a.max_y
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::MapAreaBuilder;
    use crate::city::CityLevel;
    use crate::config::{BathymetryConfig, Calibration, Encoding};
    use crate::coords::{Crs, LatLon};
    use crate::raster::{GridSpec, NativeOps};
    use crate::vector::{Feature, Polygon};
    use noise::{NoiseFn, Perlin};
    use std::cell::{Cell, RefCell};

    fn area() -> MapArea {
        MapAreaBuilder::new().from_center(LatLon::new(45.0, 15.0), 8).unwrap()
    }

    /// DEM one chunk wider than the area on every side, 384 m pixels.
    fn dem(area: &MapArea, height: impl Fn(f64, f64) -> f32) -> Raster {
        let pad = 3072.0;
        let e = area.extent;
        let extent = Extent::new(e.min_x - pad, e.min_y - pad, e.max_x + pad, e.max_y + pad);
        let n = (extent.width() / 384.0).round() as usize;
        let grid = GridSpec::new(area.crs.clone(), extent, n, n);
        let (cx, cy) = e.center();
        let mut data = Vec::with_capacity(n * n);
        for row in 0..n {
            for col in 0..n {
                let (x, y) = grid.pixel_center(row, col);
                data.push(height(x - cx, y - cy));
            }
        }
        Raster::from_data(grid, data, None).unwrap()
    }

    fn job(height: impl Fn(f64, f64) -> f32, settings: ExportSettings) -> ExportJob {
        let area = area();
        ExportJob {
            map_id: "test_map".into(),
            area: area.to_layer(&settings.calibration),
            dem: dem(&area, height),
            cities: None,
            settings,
        }
    }

    fn falloff() -> ExportSettings {
        ExportSettings {
            bathymetry: BathymetryConfig::WaterFalloff { distance_m: 1536.0 },
            ..ExportSettings::default()
        }
    }

    fn run(job: &ExportJob) -> ExportProduct {
        Exporter::new(&NativeOps, &LogFeedback).run(job, None).unwrap().product().unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        texts: RefCell<Vec<String>>,
        fractions: RefCell<Vec<f64>>,
    }

    impl Feedback for Recorder {
        fn progress(&self, text: &str, fraction: f64) {
            self.texts.borrow_mut().push(text.to_string());
            self.fractions.borrow_mut().push(fraction);
        }
    }

    #[test]
    fn flat_land_is_uniform() {
        for (settings, expected) in [(falloff(), 14.0), (ExportSettings::default(), 15.0)] {
            let product = run(&job(|_, _| 10.0, settings));
            let raw = &product.raw_steps;
            assert_eq!((raw.width(), raw.height()), (161, 161));
            assert!(raw.data.iter().all(|&v| v == expected), "expected {expected}, range {:?}", raw.value_range());
            let single = product.images.get("height.png").unwrap();
            assert_eq!((single.width, single.height), (161, 161));
            assert_eq!(single.pixel(80, 80), [4, 0, 0, 255]);
            let h0 = product.images.get("height0.png").unwrap();
            assert_eq!(h0.pixel(0, 0), [expected as u8, 0, 0, 255]);
            assert_eq!(product.images.get("height1.png").unwrap().pixel(160, 160), [0, 0, 0, 255]);
        }
    }

    #[test]
    fn dem_voids_stay_land_under_both_strategies() {
        const VOID: f32 = -9999.0;
        let hole = |x: f64, y: f64| if x.abs() < 3000.0 && y.abs() < 3000.0 { VOID } else { 10.0 };
        for (settings, rim) in [(falloff(), 14.0), (ExportSettings::default(), 15.0)] {
            let mut job = job(hole, settings);
            job.dem = job.dem.clone().with_nodata(Some(VOID));
            let raw = run(&job).raw_steps;
            // Land at sea level: the land offset, never a water step.
            assert_eq!(raw.get(80, 80), 13.0);
            assert!(raw.data.iter().all(|&v| v >= 13.0), "range {:?}", raw.value_range());
            assert_eq!(raw.get(0, 0), rim);
        }
    }

    #[test]
    fn open_sea_sits_at_the_lowest_water_step() {
        let product = run(&job(|_, _| -5.0, falloff()));
        assert!(product.raw_steps.data.iter().all(|&v| v == 1.0), "{:?}", product.raw_steps.value_range());
        assert_eq!(product.images.get("height0.png").unwrap().pixel(3, 7)[0], 1);
        assert_eq!(product.images.get("height.png").unwrap().pixel(3, 7)[0], 0);
    }

    #[test]
    fn island_with_projected_slopes() {
        let perlin = Perlin::new(7);
        let island = move |x: f64, y: f64| {
            let r2 = (x * x + y * y) / (4000.0 * 4000.0);
            let bumps = perlin.get([x / 2000.0, y / 2000.0]) * 5.0;
            (300.0 * (-r2).exp() - 50.0 + bumps) as f32
        };
        let mut sink = MemorySink::default();
        let job = job(island, ExportSettings { debug: true, ..ExportSettings::default() });
        let product = Exporter::new(&NativeOps, &LogFeedback)
            .run(&job, Some(&mut sink))
            .unwrap()
            .product()
            .unwrap();
        let raw = &product.raw_steps;
        assert!(raw.data.iter().all(|&v| (0.0..=1020.0).contains(&v) && v.fract() == 0.0));
        // Summit about 250 m above sea level.
        assert!(raw.get(80, 80) > 45.0, "summit {}", raw.get(80, 80));
        // Corners are far offshore and bottom out.
        for (r, c) in [(0, 0), (0, 160), (160, 0), (160, 160)] {
            assert_eq!(raw.get(r, c), 0.0, "corner {r},{c}");
        }
        // A few pixels offshore the seabed sits between the deepest and the
        // shallowest water level.
        let shelf = raw.get(80, 120);
        assert!(shelf > 0.0 && shelf < 13.0, "shelf {shelf}");

        let names: Vec<&str> = sink.rasters.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(&names[..4], &["01_hires_source", "02_hires_terrain", "03_lores_terrain", "04_hires_water"]);
        assert_eq!(names.last(), Some(&"14_lores_blend"));
        assert!(sink.layers.is_empty());
    }

    #[test]
    fn debug_artifacts_only_when_enabled() {
        let mut sink = MemorySink::default();
        let job = job(|_, _| 10.0, falloff());
        Exporter::new(&NativeOps, &LogFeedback).run(&job, Some(&mut sink)).unwrap();
        assert!(sink.names().is_empty());
    }

    #[test]
    fn cities_are_burned_into_green() {
        let mut job = job(|_, _| 10.0, ExportSettings { debug: true, ..falloff() });
        let e = area().extent;
        let (cx, cy) = e.center();
        let block = |half: f64, level: u8| {
            Feature::new(vec![Polygon::rect(&Extent::new(cx - half, cy - half, cx + half, cy + half))])
                .with_property(CITY_LEVEL_FIELD, level)
        };
        job.cities = Some(FeatureCollection::new(area().crs, vec![block(400.0, 5), block(2000.0, 1)]));
        let mut sink = MemorySink::default();
        let product = Exporter::new(&NativeOps, &LogFeedback)
            .run(&job, Some(&mut sink))
            .unwrap()
            .product()
            .unwrap();
        let cities = product.cities.as_ref().unwrap();
        assert_eq!(cities.level(80 * 161 + 80), 5);
        assert_eq!(cities.level(80 * 161 + 90), 1);
        assert_eq!(cities.level(0), 0);
        assert_eq!(product.images.get("height3.png").unwrap().pixel(80, 80)[1], 229);
        assert_eq!(product.images.get("height.png").unwrap().pixel(80, 90)[1], 51);
        // Polygon areas, not burned pixels: the downtown block overlaps the rural one.
        let stats = product.city_stats.unwrap();
        assert_eq!(stats.area(CityLevel::Rural), 16.0);
        assert_eq!(stats.area(CityLevel::DowntownII), 0.6);
        assert!(sink.names().contains(&"08_city_levels"));
        assert_eq!(sink.layers[0].0, "09_cities");
        assert_eq!(sink.layers.len(), 1);
        assert!(sink.layers[0].1.features.iter().all(|f| f.number(CITY_LEVEL_FIELD).unwrap() > 0.0));
    }

    #[test]
    fn manifest_and_encoding_choice() {
        let settings = ExportSettings { encoding: Encoding::Single, ..falloff() };
        let product = run(&job(|_, _| 10.0, settings));
        assert_eq!(product.images.images.len(), 1);
        assert_eq!(product.manifest_name, "test_map.vtm");
        assert!(product.manifest.contains("\tmapID = test_map\n"));
        assert!(product.manifest.contains("\tmapSize = 8\n"));
    }

    #[test]
    fn cancelled_before_start() {
        let exporter = Exporter::new(&NativeOps, &LogFeedback);
        exporter.cancel_token().cancel();
        let outcome = exporter.run(&job(|_, _| 10.0, falloff()), None).unwrap();
        assert!(matches!(outcome, ExportOutcome::Cancelled));
    }

    #[test]
    fn cancelled_between_stages() {
        struct CancelAfter {
            token: CancelToken,
            after: usize,
            calls: Cell<usize>,
        }
        impl Feedback for CancelAfter {
            fn progress(&self, _: &str, _: f64) {
                self.calls.set(self.calls.get() + 1);
                if self.calls.get() == self.after {
                    self.token.cancel();
                }
            }
        }
        let token = CancelToken::new();
        let feedback = CancelAfter { token: token.clone(), after: 2, calls: Cell::new(0) };
        let outcome = Exporter::new(&NativeOps, &feedback)
            .with_cancel(token)
            .run(&job(|_, _| 10.0, falloff()), None)
            .unwrap();
        assert!(matches!(outcome, ExportOutcome::Cancelled));
        assert_eq!(feedback.calls.get(), 2);
    }

    #[test]
    fn progress_runs_to_completion() {
        let recorder = Recorder::default();
        Exporter::new(&NativeOps, &recorder).run(&job(|_, _| 10.0, falloff()), None).unwrap();
        let texts = recorder.texts.borrow();
        // 3 preparation + 2 falloff + blend + encode + descriptor, then done.
        assert_eq!(texts.len(), 9);
        assert_eq!(texts[0], "Clipping elevation model (1/8)");
        assert_eq!(texts[8], "Done");
        let fractions = recorder.fractions.borrow();
        assert!(fractions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(fractions[8], 1.0);
    }

    #[test]
    fn validation_runs_before_any_stage() {
        let recorder = Recorder::default();
        let mut bad_city = job(|_, _| 10.0, falloff());
        bad_city.cities = Some(FeatureCollection::new(
            area().crs,
            vec![Feature::new(vec![Polygon::rect(&area().extent)]).with_property(CITY_LEVEL_FIELD, 9)],
        ));
        let err = Exporter::new(&NativeOps, &recorder).run(&bad_city, None).unwrap_err();
        assert!(matches!(err, ExportError::InvalidCityLevel { index: 0, .. }));

        let mut short_falloff = job(|_, _| 10.0, falloff());
        short_falloff.settings.bathymetry = BathymetryConfig::WaterFalloff { distance_m: 100.0 };
        assert!(matches!(
            Exporter::new(&NativeOps, &recorder).run(&short_falloff, None),
            Err(ExportError::InvalidSettings(_))
        ));

        let mut far_dem = job(|_, _| 10.0, falloff());
        far_dem.dem.grid.extent = Extent::new(0.0, 0.0, 1000.0, 1000.0);
        assert!(matches!(
            Exporter::new(&NativeOps, &recorder).run(&far_dem, None),
            Err(ExportError::InvalidSource(_))
        ));

        let mut bad_id = job(|_, _| 10.0, falloff());
        bad_id.map_id = "a/b".into();
        assert!(Exporter::new(&NativeOps, &recorder).run(&bad_id, None).is_err());

        assert!(recorder.texts.borrow().is_empty());
    }

    #[test]
    fn unknown_dem_crs_is_rejected() {
        let mut job = job(|_, _| 10.0, falloff());
        job.dem.grid.crs = Crs::Other("EPSG:3035".into());
        let err = Exporter::new(&NativeOps, &LogFeedback).run(&job, None).unwrap_err();
        assert!(matches!(err, ExportError::InvalidSource(_)), "{err}");
    }

    #[test]
    fn calibration_flows_from_settings() {
        let cal = Calibration { land_offset_steps: 20.0, ..Calibration::default() };
        let settings = ExportSettings { calibration: cal, ..falloff() };
        let product = run(&job(|_, _| 0.6, settings));
        assert!(product.raw_steps.data.iter().all(|&v| v == 20.0));
    }
}
