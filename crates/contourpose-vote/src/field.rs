use contourpose_geometry::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// Image region a field is requested for, in full-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    /// Left edge of the crop.
    pub x: f64,
    /// Top edge of the crop.
    pub y: f64,
    /// Crop width in pixels.
    pub width: usize,
    /// Crop height in pixels.
    pub height: usize,
}

/// Producer of per-pixel keypoint predictions, typically a network runtime.
pub trait VectorFieldSource {
    /// Produce the prediction tensor for an image region.
    fn field(&self, region: &CropRegion) -> Result<VectorField, FieldError>;
}

/// Dense per-keypoint prediction tensor.
///
/// Confidences are stored as `[K, H, W]` and directions as `[K, H, W, 2]`,
/// both row-major. Grid cell `(row, col)` sits at image pixel
/// `origin + (col, row) * stride`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorField {
    num_keypoints: usize,
    height: usize,
    width: usize,
    origin: DVec2,
    stride: f64,
    confidence: Vec<f32>,
    directions: Vec<f32>,
}

impl VectorField {
    /// Build a field from raw buffers, checking their sizes against the shape.
    pub fn new(
        num_keypoints: usize,
        height: usize,
        width: usize,
        confidence: Vec<f32>,
        directions: Vec<f32>,
    ) -> Result<Self, FieldError> {
        let plane = num_keypoints * height * width;
        let check = |name: &'static str, expected: usize, actual: usize| {
            if expected == actual {
                Ok(())
            } else {
                Err(FieldError::ShapeMismatch {
                    name,
                    expected,
                    actual,
                    keypoints: num_keypoints,
                    height,
                    width,
                })
            }
        };
        check("confidence", plane, confidence.len())?;
        check("directions", plane * 2, directions.len())?;

        Ok(Self {
            num_keypoints,
            height,
            width,
            origin: DVec2::ZERO,
            stride: 1.0,
            confidence,
            directions,
        })
    }

    /// Place the grid inside the full image.
    pub fn with_placement(mut self, origin: DVec2, stride: f64) -> Result<Self, FieldError> {
        if !origin.is_finite() {
            return Err(FieldError::InvalidOrigin(origin.x, origin.y));
        }
        if !stride.is_finite() || stride <= 0.0 {
            return Err(FieldError::InvalidStride(stride));
        }
        self.origin = origin;
        self.stride = stride;
        Ok(self)
    }

    /// Number of keypoint channels `K`.
    pub fn num_keypoints(&self) -> usize {
        self.num_keypoints
    }

    /// Grid height `H`.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Grid width `W`.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image position of grid cell `(0, 0)`.
    pub fn origin(&self) -> DVec2 {
        self.origin
    }

    /// Image pixels per grid cell.
    pub fn stride(&self) -> f64 {
        self.stride
    }

    /// Raw `[K, H, W]` confidence buffer.
    pub fn confidence(&self) -> &[f32] {
        &self.confidence
    }

    /// Raw `[K, H, W, 2]` direction buffer.
    pub fn directions(&self) -> &[f32] {
        &self.directions
    }

    /// Borrow the slices belonging to one keypoint.
    pub fn channel(&self, index: usize) -> Result<FieldChannel<'_>, FieldError> {
        if index >= self.num_keypoints {
            return Err(FieldError::ChannelOutOfRange {
                index,
                available: self.num_keypoints,
            });
        }
        let plane = self.height * self.width;
        Ok(FieldChannel {
            index,
            width: self.width,
            origin: self.origin,
            stride: self.stride,
            confidence: &self.confidence[index * plane..(index + 1) * plane],
            directions: &self.directions[index * plane * 2..(index + 1) * plane * 2],
        })
    }
}

impl VectorField {
    /// Copy out the grid cells whose image positions fall inside `region`.
    ///
    /// The result keeps full-image placement, so positions are unchanged.
    pub fn crop(&self, region: &CropRegion) -> VectorField {
        let span = |start: f64, len: usize, origin: f64, cells: usize| {
            let lo = ((start - origin) / self.stride).ceil().max(0.0);
            let hi = ((start + len as f64 - origin) / self.stride).ceil().max(0.0);
            let lo = (lo as usize).min(cells);
            let hi = (hi as usize).clamp(lo, cells);
            (lo, hi)
        };
        let (c0, c1) = span(region.x, region.width, self.origin.x, self.width);
        let (r0, r1) = span(region.y, region.height, self.origin.y, self.height);
        let (h, w) = (r1 - r0, c1 - c0);

        let mut confidence = Vec::with_capacity(self.num_keypoints * h * w);
        let mut directions = Vec::with_capacity(self.num_keypoints * h * w * 2);
        let plane = self.height * self.width;
        for k in 0..self.num_keypoints {
            for r in r0..r1 {
                let row = k * plane + r * self.width;
                confidence.extend_from_slice(&self.confidence[row + c0..row + c1]);
                directions.extend_from_slice(&self.directions[2 * (row + c0)..2 * (row + c1)]);
            }
        }

        VectorField {
            num_keypoints: self.num_keypoints,
            height: h,
            width: w,
            origin: self.origin + DVec2::new(c0 as f64, r0 as f64) * self.stride,
            stride: self.stride,
            confidence,
            directions,
        }
    }
}

/// A precomputed field serves any region by cropping.
impl VectorFieldSource for VectorField {
    fn field(&self, region: &CropRegion) -> Result<VectorField, FieldError> {
        Ok(self.crop(region))
    }
}

/// Borrowed view on a single keypoint channel of a [`VectorField`].
#[derive(Debug, Clone, Copy)]
pub struct FieldChannel<'a> {
    /// Keypoint index of this channel.
    pub index: usize,
    /// Grid width.
    pub width: usize,
    /// Image position of grid cell `(0, 0)`.
    pub origin: DVec2,
    /// Image pixels per grid cell.
    pub stride: f64,
    /// `[H, W]` confidences.
    pub confidence: &'a [f32],
    /// `[H, W, 2]` directions.
    pub directions: &'a [f32],
}

impl FieldChannel<'_> {
    /// Image position of the cell at flat offset `i`.
    #[inline]
    pub fn position(&self, i: usize) -> DVec2 {
        let row = (i / self.width) as f64;
        let col = (i % self.width) as f64;
        self.origin + DVec2::new(col, row) * self.stride
    }
}
