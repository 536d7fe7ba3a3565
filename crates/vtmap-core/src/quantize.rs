//! Encoding raw height steps into the engine's RGBA height images.
//!
//! Split encoding spreads the 0..=1020 step range over the red channel of
//! four images (`height0..height3`), 255 steps each. Single encoding
//! squeezes the range into the red channel of one image (`height`). The
//! green channel carries the city level in both.

use crate::city::CityRaster;
use crate::config::{Calibration, Encoding};
use crate::error::{ExportError, Result};
use crate::raster::Raster;

/// Number of images in split encoding.
pub const SPLIT_IMAGES: usize = 4;

/// Green channel value per city level 1..=5. Column 0 is used by the single
/// image, columns 1..=4 by `height0..height3`.
pub const CITY_TYPE_BURNS: [[u8; 5]; 5] = [
    [51, 205, 0, 0, 0],
    [99, 255, 143, 0, 0],
    [149, 255, 255, 87, 0],
    [199, 255, 255, 255, 31],
    [249, 255, 255, 255, 229],
];

/// One RGBA8 output image, row-major, row 0 north.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightImage {
    /// File name without directory, e.g. `height2.png`.
    pub file_name: String,
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

impl HeightImage {
    pub fn pixel(&self, row: usize, col: usize) -> [u8; 4] {
        let i = (row * self.width + col) * 4;
        [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]]
    }
}

/// All images produced by one export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedHeight {
    pub images: Vec<HeightImage>,
}

impl EncodedHeight {
    pub fn get(&self, file_name: &str) -> Option<&HeightImage> {
        self.images.iter().find(|i| i.file_name == file_name)
    }
}

/// Red channel of split image `index` for a raw step.
#[inline]
pub fn split_channel(raw: f32, index: usize) -> u8 {
    (raw - 255.0 * index as f32).clamp(0.0, 255.0) as u8
}

/// Red channel of the single image for a raw step.
#[inline]
pub fn single_channel(raw: f32, max_steps: f32) -> u8 {
    (raw.clamp(0.0, max_steps) * 255.0 / max_steps).round_ties_even() as u8
}

/// Inverse of [`split_channel`] over all images.
pub fn decode_split(channels: [u8; SPLIT_IMAGES]) -> f32 {
    channels.iter().map(|&c| c as f32).sum()
}

/// Inverse of [`single_channel`], exact to one output step.
pub fn decode_single(value: u8, max_steps: f32) -> f32 {
    value as f32 * max_steps / 255.0
}

/// Green channel for city `level` (0 = none) in image slot `slot`
/// (0 = single, 1..=4 = split).
#[inline]
pub fn city_burn(level: u8, slot: usize) -> u8 {
    match level {
        1..=5 => CITY_TYPE_BURNS[level as usize - 1][slot],
        _ => 0,
    }
}

fn check_grid(raw: &Raster, cities: Option<&CityRaster>) -> Result<()> {
    match cities {
        Some(c) if !c.raster().grid.aligned_with(&raw.grid) => Err(ExportError::InvalidSettings(
            "city raster and height raster are on different grids".into(),
        )),
        _ => Ok(()),
    }
}

fn image(file_name: String, raw: &Raster, cities: Option<&CityRaster>, pixel: impl Fn(f32, u8) -> [u8; 4]) -> HeightImage {
    let mut rgba = Vec::with_capacity(raw.data.len() * 4);
    for (i, &v) in raw.data.iter().enumerate() {
        let level = cities.map_or(0, |c| c.level(i));
        rgba.extend_from_slice(&pixel(v, level));
    }
    HeightImage { file_name, width: raw.width(), height: raw.height(), rgba }
}

/// `height0.png..height3.png`.
pub fn encode_split(raw: &Raster, cities: Option<&CityRaster>) -> Result<Vec<HeightImage>> {
    check_grid(raw, cities)?;
    Ok((0..SPLIT_IMAGES)
        .map(|i| {
            image(format!("height{i}.png"), raw, cities, |v, level| {
                [split_channel(v, i), city_burn(level, i + 1), 0, 255]
            })
        })
        .collect())
}

/// `height.png`.
pub fn encode_single(raw: &Raster, cities: Option<&CityRaster>, cal: &Calibration) -> Result<HeightImage> {
    check_grid(raw, cities)?;
    let max = cal.max_steps;
    Ok(image("height.png".into(), raw, cities, |v, level| {
        [single_channel(v, max), city_burn(level, 0), 0, 255]
    }))
}

pub fn encode(raw: &Raster, cities: Option<&CityRaster>, encoding: Encoding, cal: &Calibration) -> Result<EncodedHeight> {
    let mut images = Vec::new();
    if encoding.writes_single() {
        images.push(encode_single(raw, cities, cal)?);
    }
    if encoding.writes_split() {
        images.extend(encode_split(raw, cities)?);
    }
    Ok(EncodedHeight { images })
}
