//! Presentation: where the field goes after each frame.
//!
//! The controller hands a [`TrailField`] snapshot to a [`PresentationAdapter`]
//! once per presented frame. [`ImageExporter`] writes grayscale PNG frames;
//! an on-screen renderer would bind
//! [`WgpuBackend::presentation_buffer`](crate::gpu::WgpuBackend::presentation_buffer)
//! instead of reading back.

use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};

use crate::error::SimulationError;
use crate::field::TrailField;

/// Consumes the field once per presented frame.
pub trait PresentationAdapter {
    fn present(&mut self, field: &TrailField, frame: u32) -> Result<(), SimulationError>;
}

/// How trail intensity maps to pixel brightness.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Tonemap {
    /// Intensity 1.0 is white; brighter cells saturate.
    #[default]
    Clamp,
    /// The brightest cell of each frame is white.
    Normalize,
}

/// Rasterize a field into an 8-bit grayscale image, row 0 at the top.
pub fn rasterize(field: &TrailField, tonemap: Tonemap) -> GrayImage {
    let scale = match tonemap {
        Tonemap::Clamp => 1.0,
        Tonemap::Normalize => {
            let max = field.max_value();
            if max > 0.0 {
                1.0 / max
            } else {
                1.0
            }
        }
    };
    GrayImage::from_fn(field.width(), field.height(), |x, y| {
        let v = (field.get(x, y) * scale).clamp(0.0, 1.0);
        Luma([(v * 255.0).round() as u8])
    })
}

/// Writes every `every`-th presented frame as `<prefix><frame>.png`.
#[derive(Clone, Debug)]
pub struct ImageExporter {
    directory: PathBuf,
    prefix: String,
    every: u32,
    tonemap: Tonemap,
    written: Vec<PathBuf>,
}

impl ImageExporter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            prefix: "frame_".to_string(),
            every: 1,
            tonemap: Tonemap::default(),
            written: Vec::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Only write frames whose number is a multiple of `every` (min 1).
    pub fn with_every(mut self, every: u32) -> Self {
        self.every = every.max(1);
        self
    }

    pub fn with_tonemap(mut self, tonemap: Tonemap) -> Self {
        self.tonemap = tonemap;
        self
    }

    pub fn frame_path(&self, frame: u32) -> PathBuf {
        self.directory.join(format!("{}{:06}.png", self.prefix, frame))
    }

    /// Paths written so far, oldest first.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

/// Write one field snapshot as a PNG.
pub fn save_png(field: &TrailField, tonemap: Tonemap, path: &Path) -> Result<(), SimulationError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    rasterize(field, tonemap).save(path)?;
    Ok(())
}

impl PresentationAdapter for ImageExporter {
    fn present(&mut self, field: &TrailField, frame: u32) -> Result<(), SimulationError> {
        if frame % self.every != 0 {
            return Ok(());
        }
        let path = self.frame_path(frame);
        save_png(field, self.tonemap, &path)?;
        log::debug!("wrote {}", path.display());
        self.written.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldLayout;

    fn sample_field() -> TrailField {
        TrailField::from_cells(FieldLayout::new(3, 2), vec![0.0, 0.5, 1.0, 2.0, -1.0, 0.25])
    }

    #[test]
    fn test_rasterize_clamp() {
        let img = rasterize(&sample_field(), Tonemap::Clamp);
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 0)[0], 128);
        assert_eq!(img.get_pixel(2, 0)[0], 255);
        assert_eq!(img.get_pixel(0, 1)[0], 255);
        assert_eq!(img.get_pixel(1, 1)[0], 0);
    }

    #[test]
    fn test_rasterize_normalize() {
        let img = rasterize(&sample_field(), Tonemap::Normalize);
        assert_eq!(img.get_pixel(0, 1)[0], 255);
        assert_eq!(img.get_pixel(2, 0)[0], 128);
    }

    #[test]
    fn test_rasterize_empty_field_is_black() {
        let field = TrailField::zeroed(FieldLayout::new(4, 4)).unwrap();
        let img = rasterize(&field, Tonemap::Normalize);
        assert!(img.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_exporter_writes_every_nth_frame() {
        let dir = std::env::temp_dir().join(format!("physarum_export_{}", std::process::id()));
        let mut exporter = ImageExporter::new(&dir).with_prefix("t_").with_every(2);
        let field = sample_field();
        for frame in 0..5 {
            exporter.present(&field, frame).unwrap();
        }
        assert_eq!(exporter.written().len(), 3);
        assert_eq!(exporter.written()[1], dir.join("t_000002.png"));
        for path in exporter.written() {
            assert!(path.exists());
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_exporter_applies_tonemap() {
        let dir = std::env::temp_dir().join(format!("physarum_tonemap_{}", std::process::id()));
        let mut exporter = ImageExporter::new(&dir).with_tonemap(Tonemap::Normalize);
        let field = sample_field();
        exporter.present(&field, 0).unwrap();

        let written = image::open(&exporter.written()[0]).unwrap().to_luma8();
        assert_eq!(written, rasterize(&field, Tonemap::Normalize));
        assert_ne!(written, rasterize(&field, Tonemap::Clamp));
        let _ = fs::remove_dir_all(&dir);
    }
}
