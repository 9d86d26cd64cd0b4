//! Pyramid-aware helpers for whole-slide files: vendor metadata parsed out
//! of `ImageDescription` and classification of a file's IFD chain into
//! resolution levels and auxiliary images.

use std::collections::BTreeMap;

use crate::error::TiffResult;
use crate::ifd::Ifd;

/// Minimum dimension for an image to count as a pyramid level; anything
/// smaller is an auxiliary image.
const MIN_LEVEL_DIMENSION: u64 = 256;

/// Metadata parsed from a vendor-formatted `ImageDescription`.
///
/// Slide scanners write a header line followed by pipe-separated
/// `key = value` pairs:
///
/// ```text
/// Aperio Image Library v12.0.15
/// 46000x32914 [0,100 46000x32814] (256x256) JPEG/RGB Q=30|AppMag = 20|MPP = 0.4990|...
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlideDescription {
    /// Scanner vendor, when the header line names a known one.
    pub vendor: Option<String>,
    /// Microns per pixel at full resolution.
    pub mpp: Option<f64>,
    /// Objective magnification.
    pub magnification: Option<f64>,
    /// Every `key = value` pair, verbatim.
    pub properties: BTreeMap<String, String>,
    /// The unparsed description string.
    pub raw: String,
}

impl SlideDescription {
    pub fn parse(description: &str) -> SlideDescription {
        let mut parsed = SlideDescription {
            raw: description.to_string(),
            ..Default::default()
        };
        for vendor in ["Aperio", "Hamamatsu", "Leica", "Ventana"] {
            if description.contains(vendor) {
                parsed.vendor = Some(vendor.to_string());
                break;
            }
        }
        for part in description.split('|') {
            let part = part.trim();
            let Some(eq) = part.find('=') else { continue };
            let key = part[..eq].trim();
            let value = part[eq + 1..].trim();
            if key.is_empty() {
                continue;
            }
            parsed
                .properties
                .insert(key.to_string(), value.to_string());
            match key {
                "MPP" => parsed.mpp = value.parse().ok(),
                "AppMag" => parsed.magnification = value.parse().ok(),
                _ => {}
            }
        }
        parsed
    }

    /// Whether the description carries any structured slide metadata.
    pub fn is_slide(&self) -> bool {
        self.vendor.is_some() || !self.properties.is_empty()
    }
}

/// One resolution level of a pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidLevel {
    /// Position in the pyramid; 0 is the full-resolution image.
    pub level_index: usize,
    /// Position of the backing IFD in the file's chain.
    pub ifd_index: usize,
    pub width: u64,
    pub height: u64,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Downsample factor relative to level 0.
    pub downsample: f64,
}

/// A file's IFD chain sorted into pyramid levels and auxiliary images.
#[derive(Debug, Clone, Default)]
pub struct PyramidLayout {
    /// Levels ordered from full resolution downwards.
    pub levels: Vec<PyramidLevel>,
    /// IFD index of the slide label image, when present.
    pub label_index: Option<usize>,
    /// IFD index of the macro overview image, when present.
    pub macro_index: Option<usize>,
    /// IFD index of a strip-based thumbnail, when present.
    pub thumbnail_index: Option<usize>,
    /// Metadata parsed from the level-0 description.
    pub description: Option<SlideDescription>,
}

impl PyramidLayout {
    /// Classifies a chain of directories.
    ///
    /// Tiled images of decreasing size form the pyramid; strip-based
    /// images are sorted into thumbnail/label/macro by their description
    /// and order, the way slide scanners lay them out.
    pub fn classify(ifds: &[Ifd]) -> TiffResult<PyramidLayout> {
        let mut layout = PyramidLayout::default();
        let mut candidates: Vec<(usize, u64, u64, u32, u32)> = Vec::new();

        for (ifd_index, ifd) in ifds.iter().enumerate() {
            let Ok((width, height)) = ifd.dimensions() else {
                continue;
            };
            if ifd.is_tiled() && width.max(height) >= MIN_LEVEL_DIMENSION {
                let (tile_width, tile_height) = ifd.tile_size()?;
                candidates.push((ifd_index, width, height, tile_width, tile_height));
                continue;
            }
            // Auxiliary images: the description names labels and macros,
            // the first unnamed strip image is the thumbnail.
            let description = ifd.description().unwrap_or(None).unwrap_or_default();
            let lowered = description.to_ascii_lowercase();
            if lowered.contains("label") && layout.label_index.is_none() {
                layout.label_index = Some(ifd_index);
            } else if lowered.contains("macro") && layout.macro_index.is_none() {
                layout.macro_index = Some(ifd_index);
            } else if layout.thumbnail_index.is_none() {
                layout.thumbnail_index = Some(ifd_index);
            }
        }

        // Largest first; the chain order of pyramids already matches in
        // well-formed files, the sort makes it so everywhere.
        candidates.sort_by(|a, b| (b.1 * b.2).cmp(&(a.1 * a.2)));
        let base_width = candidates.first().map(|c| c.1).unwrap_or(0);
        for (level_index, (ifd_index, width, height, tile_width, tile_height)) in
            candidates.into_iter().enumerate()
        {
            layout.levels.push(PyramidLevel {
                level_index,
                ifd_index,
                width,
                height,
                tile_width,
                tile_height,
                downsample: base_width as f64 / width as f64,
            });
        }

        if let Some(level0) = layout.levels.first() {
            if let Ok(Some(description)) = ifds[level0.ifd_index].description() {
                let parsed = SlideDescription::parse(&description);
                if parsed.is_slide() {
                    layout.description = Some(parsed);
                }
            }
        }
        Ok(layout)
    }

    /// The smallest level whose downsample factor does not exceed the
    /// requested one; falls back to the base level.
    pub fn level_for_downsample(&self, downsample: f64) -> Option<&PyramidLevel> {
        self.levels
            .iter()
            .rev()
            .find(|level| level.downsample <= downsample.max(1.0))
            .or(self.levels.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ByteOrder;
    use crate::tags::{CompressionScheme, PhotometricInterpretation};

    fn tiled_ifd(width: u64, height: u64) -> Ifd {
        let mut ifd = Ifd::new(ByteOrder::LittleEndian, false);
        ifd.set_dimensions(width, height).unwrap();
        ifd.set_photometric(PhotometricInterpretation::RGB);
        ifd.set_bits_per_sample(&[8, 8, 8]);
        ifd.set_compression(CompressionScheme::Jpeg);
        ifd.set_tile_size(256, 256).unwrap();
        ifd
    }

    fn strip_ifd(width: u64, height: u64, description: Option<&str>) -> Ifd {
        let mut ifd = Ifd::new(ByteOrder::LittleEndian, false);
        ifd.set_dimensions(width, height).unwrap();
        ifd.set_photometric(PhotometricInterpretation::RGB);
        ifd.set_bits_per_sample(&[8, 8, 8]);
        ifd.set_rows_per_strip(16);
        if let Some(text) = description {
            ifd.set_description(text).unwrap();
        }
        ifd
    }

    #[test]
    fn parses_aperio_style_description() {
        let text = "Aperio Image Library v12.0.15\r\n46000x32914 (256x256) JPEG/RGB Q=30|AppMag = 20|MPP = 0.4990|ScanScope ID = SS1302";
        let parsed = SlideDescription::parse(text);
        assert_eq!(parsed.vendor.as_deref(), Some("Aperio"));
        assert_eq!(parsed.magnification, Some(20.0));
        assert_eq!(parsed.mpp, Some(0.499));
        assert_eq!(
            parsed.properties.get("ScanScope ID").map(String::as_str),
            Some("SS1302")
        );
        assert!(parsed.is_slide());
    }

    #[test]
    fn classifies_levels_and_auxiliaries() {
        let mut level0 = tiled_ifd(40_000, 30_000);
        level0
            .set_description("Aperio Image Library v12.0.15\r\n40000x30000|AppMag = 40|MPP = 0.25")
            .unwrap();
        let ifds = vec![
            level0,
            strip_ifd(1024, 768, None),
            tiled_ifd(10_000, 7_500),
            tiled_ifd(2_500, 1_875),
            strip_ifd(600, 500, Some("label 42")),
            strip_ifd(1200, 400, Some("macro image")),
        ];
        let layout = PyramidLayout::classify(&ifds).unwrap();

        assert_eq!(layout.levels.len(), 3);
        assert_eq!(layout.levels[0].ifd_index, 0);
        assert_eq!(layout.levels[1].downsample, 4.0);
        assert_eq!(layout.levels[2].downsample, 16.0);
        assert_eq!(layout.thumbnail_index, Some(1));
        assert_eq!(layout.label_index, Some(4));
        assert_eq!(layout.macro_index, Some(5));
        let pick = |d: f64| layout.level_for_downsample(d).unwrap().level_index;
        assert_eq!(pick(1.0), 0);
        assert_eq!(pick(5.0), 1);
        assert_eq!(pick(100.0), 2);

        let description = layout.description.unwrap();
        assert_eq!(description.magnification, Some(40.0));
    }
}
