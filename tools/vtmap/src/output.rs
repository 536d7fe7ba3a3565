//! Writing export results: PNG height images, the `.vtm` descriptor and
//! debug GeoTIFF / GeoJSON artifacts.
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use vtmap_core::pipeline::{ArtifactSink, ExportProduct};
use vtmap_core::quantize::HeightImage;
use vtmap_core::raster::Raster;
use vtmap_core::vector::FeatureCollection;

use crate::dem::GeoKeys;

pub fn write_png(dir: &Path, image: &HeightImage) -> Result<PathBuf> {
    let path = dir.join(&image.file_name);
    let img = image::RgbaImage::from_raw(image.width as u32, image.height as u32, image.rgba.clone())
        .with_context(|| format!("{} has a malformed pixel buffer", image.file_name))?;
    img.save(&path).with_context(|| format!("Write failed: {}", path.display()))?;
    Ok(path)
}

/// Float32 GeoTIFF with pixel-is-area georeferencing.
pub fn write_geotiff(path: &Path, raster: &Raster) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    let grid = &raster.grid;
    let mut image = encoder.new_image::<colortype::Gray32Float>(grid.width as u32, grid.height as u32)?;
    let scale = [grid.pixel_width(), grid.pixel_height(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, grid.extent.min_x, grid.extent.max_y, 0.0];
    image.encoder().write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
    image.encoder().write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
    image.encoder().write_tag(Tag::GeoKeyDirectoryTag, &GeoKeys::directory_for(&grid.crs)[..])?;
    if let Some(nodata) = raster.nodata {
        image.encoder().write_tag(Tag::GdalNodata, nodata.to_string().as_str())?;
    }
    image.write_data(&raster.data)?;
    Ok(())
}

/// Height images and descriptor into `dir` (created if absent).
pub fn write_product(dir: &Path, product: &ExportProduct) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    let mut written = Vec::with_capacity(product.images.images.len() + 1);
    for image in &product.images.images {
        written.push(write_png(dir, image)?);
    }
    let path = dir.join(&product.manifest_name);
    fs::write(&path, &product.manifest).with_context(|| format!("Write failed: {}", path.display()))?;
    written.push(path);
    Ok(written)
}

/// Debug artifacts as `<name>.tif` and `<name>.geojson` files in one folder.
pub struct DebugDir {
    dir: PathBuf,
}

impl DebugDir {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
        Ok(Self { dir: dir.to_path_buf() })
    }
}

fn to_io(e: anyhow::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{e:#}"))
}

impl ArtifactSink for DebugDir {
    fn write_raster(&mut self, name: &str, raster: &Raster) -> io::Result<()> {
        write_geotiff(&self.dir.join(format!("{name}.tif")), raster).map_err(to_io)
    }

    fn write_features(&mut self, name: &str, layer: &FeatureCollection) -> io::Result<()> {
        let text = layer.to_geojson().map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.dir.join(format!("{name}.geojson")), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtmap_core::pipeline::{ExportJob, Exporter, LogFeedback};
    use vtmap_core::{Encoding, ExportSettings, Extent, GridSpec, LatLon, MapAreaBuilder, NativeOps};

    fn flat_job(settings: ExportSettings) -> ExportJob {
        let area = MapAreaBuilder::new().from_center(LatLon::new(60.0, 10.0), 8).unwrap();
        let e = area.extent;
        let extent = Extent::new(e.min_x - 1000.0, e.min_y - 1000.0, e.max_x + 1000.0, e.max_y + 1000.0);
        let grid = GridSpec::new(area.crs.clone(), extent, 40, 40);
        ExportJob {
            map_id: "flat".into(),
            area: area.to_layer(&settings.calibration),
            dem: Raster::new(grid, 10.0),
            cities: None,
            settings,
        }
    }

    #[test]
    fn product_folder_contents() {
        let settings = ExportSettings { encoding: Encoding::Both, ..ExportSettings::default() };
        let product = Exporter::new(&NativeOps, &LogFeedback)
            .run(&flat_job(settings), None)
            .unwrap()
            .product()
            .unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("flat");
        let written = write_product(&dir, &product).unwrap();
        let names: Vec<String> = written.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(names, ["height.png", "height0.png", "height1.png", "height2.png", "height3.png", "flat.vtm"]);

        let png = image::open(dir.join("height0.png")).unwrap().to_rgba8();
        assert_eq!(png.dimensions(), (161, 161));
        assert_eq!(png.get_pixel(10, 20).0, [15, 0, 0, 255]);
        let vtm = fs::read_to_string(dir.join("flat.vtm")).unwrap();
        assert!(vtm.starts_with("VTMapCustom\n{\n\tmapID = flat\n"));
    }

    #[test]
    fn debug_artifacts_on_disk() {
        let settings = ExportSettings { debug: true, ..ExportSettings::default() };
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = DebugDir::create(&tmp.path().join("debug")).unwrap();
        Exporter::new(&NativeOps, &LogFeedback).run(&flat_job(settings), Some(&mut sink)).unwrap();
        let first = crate::dem::read_dem(&tmp.path().join("debug/01_hires_source.tif")).unwrap();
        assert!(first.data.iter().all(|&v| v == 10.0));
        assert!(tmp.path().join("debug/14_lores_blend.tif").exists());
    }
}
