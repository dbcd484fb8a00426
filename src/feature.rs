use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::integral::IntegralView;

/// The five Haar-like rectangle patterns. The discriminants are the
/// integer tags used by the persisted cascade format, so this is a
/// closed set; adding a kind is a format change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FeatureKind {
    /// Bright left half, dark right half. Width must be even.
    HorizontalPair = 0,
    /// Bright top half, dark bottom half. Height must be even.
    VerticalPair = 1,
    /// Bright outer thirds, dark middle third, side by side. Width
    /// divisible by three.
    HorizontalTriple = 2,
    /// Bright outer thirds, dark middle third, stacked. Height
    /// divisible by three.
    VerticalTriple = 3,
    /// Checkerboard of four quadrants. Both dimensions even.
    Diagonal = 4,
}

impl FeatureKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::HorizontalPair),
            1 => Some(Self::VerticalPair),
            2 => Some(Self::HorizontalTriple),
            3 => Some(Self::VerticalTriple),
            4 => Some(Self::Diagonal),
            _ => None,
        }
    }
}

impl Serialize for FeatureKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.tag())
    }
}

impl<'de> Deserialize<'de> for FeatureKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = u8::deserialize(deserializer)?;
        Self::from_tag(tag)
            .ok_or_else(|| de::Error::custom(format!("feature type tag {tag} out of range")))
    }
}

/// One Haar-like feature: a pattern anchored at `(x, y)` over a
/// `width` x `height` bounding box inside the detection window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "Type")]
    pub kind: FeatureKind,
    #[serde(rename = "X")]
    pub x: usize,
    #[serde(rename = "Y")]
    pub y: usize,
    #[serde(rename = "Width")]
    pub width: usize,
    #[serde(rename = "Height")]
    pub height: usize,
}

impl Feature {
    /// Signed value of the feature: sum over bright rectangles minus
    /// sum over dark rectangles, from 6-9 integral lookups on the
    /// corners of the sub-rectangles.
    pub fn value(&self, img: &impl IntegralView) -> f64 {
        let (x, y, w, h) = (self.x, self.y, self.width, self.height);
        match self.kind {
            FeatureKind::HorizontalPair => {
                let mid_top = img.integral_at(x + w / 2, y);
                let mid_bottom = img.integral_at(x + w / 2, y + h);
                let left = mid_bottom + img.integral_at(x, y)
                    - (mid_top + img.integral_at(x, y + h));
                let right = mid_top + img.integral_at(x + w, y + h)
                    - (mid_bottom + img.integral_at(x + w, y));
                left - right
            }
            FeatureKind::VerticalPair => {
                let mid_left = img.integral_at(x, y + h / 2);
                let mid_right = img.integral_at(x + w, y + h / 2);
                let top = mid_right + img.integral_at(x, y)
                    - (mid_left + img.integral_at(x + w, y));
                let bottom = mid_left + img.integral_at(x + w, y + h)
                    - (mid_right + img.integral_at(x, y + h));
                top - bottom
            }
            FeatureKind::HorizontalTriple => {
                let (x1, x2) = (x + w / 3, x + 2 * w / 3);
                let top = [
                    img.integral_at(x, y),
                    img.integral_at(x1, y),
                    img.integral_at(x2, y),
                    img.integral_at(x + w, y),
                ];
                let bottom = [
                    img.integral_at(x, y + h),
                    img.integral_at(x1, y + h),
                    img.integral_at(x2, y + h),
                    img.integral_at(x + w, y + h),
                ];
                let first = top[0] + bottom[1] - (top[1] + bottom[0]);
                let second = top[1] + bottom[2] - (top[2] + bottom[1]);
                let third = top[2] + bottom[3] - (top[3] + bottom[2]);
                first + third - second
            }
            FeatureKind::VerticalTriple => {
                let (y1, y2) = (y + h / 3, y + 2 * h / 3);
                let left = [
                    img.integral_at(x, y),
                    img.integral_at(x, y1),
                    img.integral_at(x, y2),
                    img.integral_at(x, y + h),
                ];
                let right = [
                    img.integral_at(x + w, y),
                    img.integral_at(x + w, y1),
                    img.integral_at(x + w, y2),
                    img.integral_at(x + w, y + h),
                ];
                let first = left[0] + right[1] - (left[1] + right[0]);
                let second = left[1] + right[2] - (left[2] + right[1]);
                let third = left[2] + right[3] - (left[3] + right[2]);
                first + third - second
            }
            FeatureKind::Diagonal => {
                let (xm, ym) = (x + w / 2, y + h / 2);
                let top = [
                    img.integral_at(x, y),
                    img.integral_at(xm, y),
                    img.integral_at(x + w, y),
                ];
                let mid = [
                    img.integral_at(x, ym),
                    img.integral_at(xm, ym),
                    img.integral_at(x + w, ym),
                ];
                let bottom = [
                    img.integral_at(x, y + h),
                    img.integral_at(xm, y + h),
                    img.integral_at(x + w, y + h),
                ];
                let top_left = top[0] + mid[1] - (mid[0] + top[1]);
                let top_right = top[1] + mid[2] - (mid[1] + top[2]);
                let bottom_left = mid[0] + bottom[1] - (bottom[0] + mid[1]);
                let bottom_right = mid[1] + bottom[2] - (bottom[1] + mid[2]);
                top_left + bottom_right - (top_right + bottom_left)
            }
        }
    }
}

/// Every feature that fits in a `width` x `height` window.
///
/// Enumeration order is part of the training contract because the
/// stump learner breaks equal-score ties toward the later candidate:
/// bounding boxes go `w` 1..=width then `h` 1..=height (the 1x1 box is
/// skipped), then `y`, then `x`, and within one box the kinds appear
/// in tag order.
pub fn all_features(width: usize, height: usize) -> Vec<Feature> {
    let mut res = Vec::new();
    let mut push = |kind, x, y, w, h| {
        res.push(Feature {
            kind,
            x,
            y,
            width: w,
            height: h,
        });
    };
    for w in 1..=width {
        for h in 1..=height {
            if w == 1 && h == 1 {
                continue;
            }
            for y in 0..=height - h {
                for x in 0..=width - w {
                    if w % 2 == 0 {
                        push(FeatureKind::HorizontalPair, x, y, w, h);
                    }
                    if h % 2 == 0 {
                        push(FeatureKind::VerticalPair, x, y, w, h);
                    }
                    if w % 3 == 0 {
                        push(FeatureKind::HorizontalTriple, x, y, w, h);
                    }
                    if h % 3 == 0 {
                        push(FeatureKind::VerticalTriple, x, y, w, h);
                    }
                    if w % 2 == 0 && h % 2 == 0 {
                        push(FeatureKind::Diagonal, x, y, w, h);
                    }
                }
            }
        }
    }
    res
}
