//! # Floorplan calibration
//!
//! Maps between the millimetre world frame and the image pixel frame. The
//! world frame is y-up; pixels are y-down, so the transformer flips the Y
//! axis by default. Scale validation projects the anchor sample through the
//! transformer and can derive a replacement scale when the recorded one
//! puts most anchors off the image.

use crate::error::CalibrationError;
use crate::parse::Anchor;
use geo::{Coord, coord};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Fraction of anchors that must project inside the image for the recorded
/// scale to be accepted.
pub const MIN_IN_BOUNDS_FRACTION: f64 = 0.8;

/// A camera-like calibration record for one floorplan raster.
///
/// `raw_scale * 100` is the millimetre length of one pixel.
#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationRecord {
    #[serde(default)]
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub centre_px_x: f64,
    pub centre_px_y: f64,
    pub raw_scale: f64,
    #[serde(default)]
    pub rotation: Option<f64>,
    #[serde(default)]
    pub sublocation_uid: String,
}

impl CalibrationRecord {
    pub fn mm_per_pixel(&self) -> f64 {
        self.raw_scale * 100.0
    }
}

/// Bidirectional mm ↔ pixel transformer derived from a calibration record.
#[derive(Debug, Clone)]
pub struct PixelTransformer {
    mm_per_pixel: f64,
    x_min_mm: f64,
    y_min_mm: f64,
    width: u32,
    height: u32,
    flip_x: bool,
    flip_y: bool,
}

impl PixelTransformer {
    /// Builds a transformer with the default Y flip (world y-up, pixel
    /// y-down).
    ///
    /// # Errors
    ///
    /// Fails when the record violates `width > 0 && height > 0 &&
    /// raw_scale > 0`.
    pub fn new(record: &CalibrationRecord) -> Result<Self, CalibrationError> {
        Self::with_flips(record, false, true)
    }

    /// Builds a transformer with explicit axis flips.
    ///
    /// # Errors
    ///
    /// See [`PixelTransformer::new`].
    pub fn with_flips(
        record: &CalibrationRecord,
        flip_x: bool,
        flip_y: bool,
    ) -> Result<Self, CalibrationError> {
        if record.width == 0 || record.height == 0 {
            return Err(CalibrationError::InvalidDimensions {
                width: record.width,
                height: record.height,
            });
        }
        if record.raw_scale <= 0.0 {
            return Err(CalibrationError::InvalidScale(record.raw_scale));
        }
        let mm_per_pixel = record.mm_per_pixel();
        Ok(PixelTransformer {
            mm_per_pixel,
            x_min_mm: (record.centre_px_x - f64::from(record.width) / 2.0) * mm_per_pixel,
            y_min_mm: (record.centre_px_y - f64::from(record.height) / 2.0) * mm_per_pixel,
            width: record.width,
            height: record.height,
            flip_x,
            flip_y,
        })
    }

    /// Builds a transformer, replacing the recorded scale with the derived
    /// one when validation rejects it. The validation report is returned
    /// either way.
    ///
    /// # Errors
    ///
    /// See [`PixelTransformer::new`].
    pub fn validated(
        record: &CalibrationRecord,
        anchors: &BTreeMap<String, Anchor>,
    ) -> Result<(Self, ScaleValidation), CalibrationError> {
        let transformer = Self::new(record)?;
        let validation = validate_scale(&transformer, anchors);
        if validation.valid {
            return Ok((transformer, validation));
        }
        let Some(suggested) = validation.suggested_raw_scale else {
            return Ok((transformer, validation));
        };
        warn!(
            recorded = record.raw_scale,
            suggested, "Recorded scale rejected by the anchor sample; rebuilding transformer"
        );
        let corrected = CalibrationRecord {
            raw_scale: suggested,
            ..record.clone()
        };
        Ok((Self::new(&corrected)?, validation))
    }

    pub fn mm_per_pixel(&self) -> f64 {
        self.mm_per_pixel
    }

    pub fn image_width(&self) -> u32 {
        self.width
    }

    pub fn image_height(&self) -> u32 {
        self.height
    }

    /// World millimetres → image pixels.
    pub fn to_pixels(&self, mm: Coord) -> Coord {
        let mut x = (mm.x - self.x_min_mm) / self.mm_per_pixel;
        let mut y = (mm.y - self.y_min_mm) / self.mm_per_pixel;
        if self.flip_x {
            x = f64::from(self.width) - x;
        }
        if self.flip_y {
            y = f64::from(self.height) - y;
        }
        coord! { x: x, y: y }
    }

    /// Image pixels → world millimetres. Exact inverse of
    /// [`PixelTransformer::to_pixels`] up to floating point error.
    pub fn to_mm(&self, pixel: Coord) -> Coord {
        let mut x = pixel.x;
        let mut y = pixel.y;
        if self.flip_x {
            x = f64::from(self.width) - x;
        }
        if self.flip_y {
            y = f64::from(self.height) - y;
        }
        coord! {
            x: x * self.mm_per_pixel + self.x_min_mm,
            y: y * self.mm_per_pixel + self.y_min_mm,
        }
    }

    pub fn polygon_to_pixels(&self, mm: &[Coord]) -> Vec<Coord> {
        mm.iter().map(|v| self.to_pixels(*v)).collect()
    }

    pub fn polygon_to_mm(&self, pixels: &[Coord]) -> Vec<Coord> {
        pixels.iter().map(|v| self.to_mm(*v)).collect()
    }

    /// Whether a pixel coordinate falls on the image rectangle.
    pub fn contains_pixel(&self, pixel: Coord) -> bool {
        pixel.x >= 0.0
            && pixel.x <= f64::from(self.width)
            && pixel.y >= 0.0
            && pixel.y <= f64::from(self.height)
    }
}

/// One anchor projected through the transformer for the validation report.
#[derive(Debug, Clone)]
pub struct AnchorProjection {
    pub name: String,
    pub mm: Coord,
    pub pixel: Coord,
    pub in_bounds: bool,
}

/// Outcome of projecting the anchor sample through a transformer.
#[derive(Debug, Clone)]
pub struct ScaleValidation {
    pub valid: bool,
    /// Raw scale that would fit the anchor spread to the image, when the
    /// recorded one does not.
    pub suggested_raw_scale: Option<f64>,
    /// Ratio of the suggested raw scale to the recorded one; 1.0 when valid.
    pub correction_factor: f64,
    pub message: String,
    pub samples: Vec<AnchorProjection>,
}

/// Projects every anchor and accepts the scale when at least
/// [`MIN_IN_BOUNDS_FRACTION`] of them land inside the image rectangle.
///
/// On rejection, the suggested scale maps the larger millimetre anchor
/// range onto the corresponding image dimension.
#[allow(clippy::cast_precision_loss)]
pub fn validate_scale(
    transformer: &PixelTransformer,
    anchors: &BTreeMap<String, Anchor>,
) -> ScaleValidation {
    let samples: Vec<AnchorProjection> = anchors
        .iter()
        .map(|(name, anchor)| {
            let mm = coord! { x: anchor.position.x, y: anchor.position.y };
            let pixel = transformer.to_pixels(mm);
            AnchorProjection {
                name: name.clone(),
                mm,
                pixel,
                in_bounds: transformer.contains_pixel(pixel),
            }
        })
        .collect();

    if samples.is_empty() {
        return ScaleValidation {
            valid: true,
            suggested_raw_scale: None,
            correction_factor: 1.0,
            message: "No anchors to project; scale accepted".to_string(),
            samples,
        };
    }

    let in_bounds = samples.iter().filter(|s| s.in_bounds).count();
    let fraction = in_bounds as f64 / samples.len() as f64;
    if fraction >= MIN_IN_BOUNDS_FRACTION {
        return ScaleValidation {
            valid: true,
            suggested_raw_scale: None,
            correction_factor: 1.0,
            message: format!(
                "{in_bounds}/{} anchors project inside the image",
                samples.len()
            ),
            samples,
        };
    }

    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    for sample in &samples {
        x_min = x_min.min(sample.mm.x);
        x_max = x_max.max(sample.mm.x);
        y_min = y_min.min(sample.mm.y);
        y_max = y_max.max(sample.mm.y);
    }
    let x_range = x_max - x_min;
    let y_range = y_max - y_min;
    let required_mm_per_pixel = if x_range >= y_range {
        x_range / f64::from(transformer.image_width())
    } else {
        y_range / f64::from(transformer.image_height())
    };

    // All anchors coincident: nothing to derive a scale from.
    let suggested = (required_mm_per_pixel > 0.0).then_some(required_mm_per_pixel / 100.0);
    let current_raw = transformer.mm_per_pixel() / 100.0;
    ScaleValidation {
        valid: false,
        suggested_raw_scale: suggested,
        correction_factor: suggested.map_or(1.0, |s| s / current_raw),
        message: format!(
            "Only {in_bounds}/{} anchors project inside the image; suggested raw scale {}",
            samples.len(),
            suggested.map_or_else(|| "unavailable".to_string(), |s| format!("{s:.6}")),
        ),
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{Anchor, AnchorPosition};
    use proptest::{prop_assert, proptest};

    fn record(width: u32, height: u32, centre_x: f64, centre_y: f64, raw: f64) -> CalibrationRecord {
        CalibrationRecord {
            filename: "plan.png".to_string(),
            width,
            height,
            centre_px_x: centre_x,
            centre_px_y: centre_y,
            raw_scale: raw,
            rotation: None,
            sublocation_uid: String::new(),
        }
    }

    fn anchor_at(x: f64, y: f64) -> Anchor {
        Anchor {
            name: String::new(),
            uid: String::new(),
            kind: "ANCHOR".to_string(),
            position: AnchorPosition {
                x,
                y,
                z: 0.0,
                yaw: 0.0,
                sl_uid: String::new(),
            },
            locked: false,
        }
    }

    #[test]
    fn rejects_invalid_records() {
        assert_eq!(
            PixelTransformer::new(&record(0, 100, 0.0, 0.0, 0.1)).unwrap_err(),
            CalibrationError::InvalidDimensions { width: 0, height: 100 }
        );
        assert_eq!(
            PixelTransformer::new(&record(100, 100, 0.0, 0.0, 0.0)).unwrap_err(),
            CalibrationError::InvalidScale(0.0)
        );
    }

    #[test]
    fn maps_known_points_with_y_flip() {
        // mm_per_pixel = 10; image mm range x: 0..20000, y: -1000..1000.
        let transformer = PixelTransformer::new(&record(2000, 200, 1000.0, 0.0, 0.1)).unwrap();
        let px = transformer.to_pixels(coord! { x: 0.0, y: 500.0 });
        assert!((px.x - 0.0).abs() < 1e-9);
        assert!((px.y - 50.0).abs() < 1e-9);
        let px = transformer.to_pixels(coord! { x: 10000.0, y: -500.0 });
        assert!((px.x - 1000.0).abs() < 1e-9);
        assert!((px.y - 150.0).abs() < 1e-9);
    }

    #[test]
    fn accepts_scale_with_anchors_in_bounds() {
        let transformer = PixelTransformer::new(&record(1000, 1000, 500.0, 500.0, 0.1)).unwrap();
        let mut anchors = BTreeMap::new();
        anchors.insert("a1".to_string(), anchor_at(1000.0, 1000.0));
        anchors.insert("a2".to_string(), anchor_at(9000.0, 9000.0));
        let validation = validate_scale(&transformer, &anchors);
        assert!(validation.valid);
        assert_eq!(validation.suggested_raw_scale, None);
        assert!((validation.correction_factor - 1.0).abs() < 1e-12);
        assert_eq!(validation.samples.len(), 2);
    }

    #[test]
    fn suggests_scale_when_anchors_overflow() {
        // 1 mm/px puts a 0..40000 mm spread far outside a 2000 px image.
        let transformer = PixelTransformer::new(&record(2000, 1000, 1000.0, 500.0, 0.01)).unwrap();
        let mut anchors = BTreeMap::new();
        anchors.insert("a1".to_string(), anchor_at(0.0, 0.0));
        anchors.insert("a2".to_string(), anchor_at(40_000.0, 500.0));
        anchors.insert("a3".to_string(), anchor_at(39_000.0, 400.0));
        let validation = validate_scale(&transformer, &anchors);
        assert!(!validation.valid);
        // 40000 mm over 2000 px = 20 mm/px = raw 0.2.
        let suggested = validation.suggested_raw_scale.unwrap();
        assert!((suggested - 0.2).abs() < 1e-9);
        assert!((validation.correction_factor - 20.0).abs() < 1e-9);
    }

    #[test]
    fn validated_constructor_applies_suggestion() {
        let rec = record(2000, 1000, 1000.0, 500.0, 0.01);
        let mut anchors = BTreeMap::new();
        anchors.insert("a1".to_string(), anchor_at(0.0, 0.0));
        anchors.insert("a2".to_string(), anchor_at(40_000.0, 500.0));
        let (transformer, validation) = PixelTransformer::validated(&rec, &anchors).unwrap();
        assert!(!validation.valid);
        assert!((transformer.mm_per_pixel() - 20.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn pixel_mm_round_trip(
            width in 1u32..4000,
            height in 1u32..4000,
            centre_x in -5000.0f64..5000.0,
            centre_y in -5000.0f64..5000.0,
            raw in 0.01f64..10.0,
            fx in 0.0f64..1.0,
            fy in 0.0f64..1.0,
        ) {
            let transformer =
                PixelTransformer::new(&record(width, height, centre_x, centre_y, raw)).unwrap();
            let px = coord! {
                x: fx * f64::from(width),
                y: fy * f64::from(height),
            };
            let back = transformer.to_pixels(transformer.to_mm(px));
            prop_assert!((back.x - px.x).abs() < 1.0);
            prop_assert!((back.y - px.y).abs() < 1.0);
        }
    }
}
