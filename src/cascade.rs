use serde::{Deserialize, Serialize};

use crate::feature::Feature;
use crate::integral::{DualImage, IntegralView};
use crate::matches::{Match, Matches};

/// One layer of a cascade: a weighted vote of feature stumps against
/// an acceptance bias. The parallel arrays mirror the persisted JSON
/// layout, one slot per stump.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Layer {
    #[serde(rename = "Features")]
    pub features: Vec<Feature>,
    #[serde(rename = "Thresholds")]
    pub thresholds: Vec<f64>,
    #[serde(rename = "Weights")]
    pub weights: Vec<f64>,
    #[serde(rename = "Threshold")]
    pub threshold: f64,
}

impl Layer {
    /// Weighted sum of the stump outputs, compared against the
    /// layer's bias.
    pub fn classify(&self, img: &impl IntegralView) -> bool {
        let mut sum = 0.0;
        for (i, feature) in self.features.iter().enumerate() {
            let output = if feature.value(img) > self.thresholds[i] {
                1.0
            } else {
                -1.0
            };
            sum += self.weights[i] * output;
        }
        sum > self.threshold
    }
}

/// An ordered conjunction of layers over a fixed detection window.
/// A window is positive only if every layer accepts it; the first
/// rejection ends evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cascade {
    #[serde(rename = "Layers")]
    pub layers: Vec<Layer>,
    #[serde(rename = "WindowWidth")]
    pub window_width: usize,
    #[serde(rename = "WindowHeight")]
    pub window_height: usize,
}

/// Knobs for [`Cascade::scan`].
#[derive(Debug, Clone, Copy)]
pub struct ScanParams {
    /// Factor between successive window sizes.
    pub scale_step: f64,
    /// Slide distance in window-relative pixels; the absolute step
    /// grows with the scale.
    pub stride: f64,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            scale_step: 1.25,
            stride: 1.0,
        }
    }
}

impl Cascade {
    pub fn classify(&self, img: &impl IntegralView) -> bool {
        self.layers.iter().all(|layer| layer.classify(img))
    }

    /// Slides the detection window over the whole image at every scale
    /// that fits, collecting the windows the cascade accepts. Windows
    /// larger than the training size are resampled down before
    /// classification.
    pub fn scan(&self, image: &DualImage, params: ScanParams) -> Matches {
        let mut found = Vec::new();
        if self.layers.is_empty() || self.window_width == 0 || self.window_height == 0 {
            return Matches(found);
        }

        let mut scale = 1.0f64;
        loop {
            let crop_w = (self.window_width as f64 * scale).round() as usize;
            let crop_h = (self.window_height as f64 * scale).round() as usize;
            if crop_w > image.width() || crop_h > image.height() {
                break;
            }
            let step = scale * params.stride;

            let mut yf = 0.0f64;
            loop {
                let y = yf.round() as usize;
                if y + crop_h > image.height() {
                    break;
                }
                let mut xf = 0.0f64;
                loop {
                    let x = xf.round() as usize;
                    if x + crop_w > image.width() {
                        break;
                    }
                    let window = image.window(x, y, crop_w, crop_h);
                    let positive = if crop_w == self.window_width
                        && crop_h == self.window_height
                    {
                        self.classify(&window)
                    } else {
                        self.classify(&window.scaled_to(self.window_width, self.window_height))
                    };
                    if positive {
                        found.push(Match {
                            x,
                            y,
                            width: crop_w,
                            height: crop_h,
                        });
                    }
                    xf += step;
                }
                yf += step;
            }

            scale *= params.scale_step;
        }

        Matches(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Feature, FeatureKind};
    use crate::integral::IntegralImage;

    fn left_bright() -> IntegralImage {
        IntegralImage::from_bitmap(&[1.0, 0.0, 1.0, 0.0], 2, 2).unwrap()
    }

    fn split_feature() -> Feature {
        Feature {
            kind: FeatureKind::HorizontalPair,
            x: 0,
            y: 0,
            width: 2,
            height: 2,
        }
    }

    fn accepting_layer() -> Layer {
        Layer {
            features: vec![split_feature()],
            thresholds: vec![0.0],
            weights: vec![1.0],
            threshold: 0.0,
        }
    }

    fn rejecting_layer() -> Layer {
        Layer {
            threshold: 10.0,
            ..accepting_layer()
        }
    }

    #[test]
    fn layer_votes_against_bias() {
        let img = left_bright();
        assert!(accepting_layer().classify(&img));
        assert!(!rejecting_layer().classify(&img));
    }

    #[test]
    fn empty_cascade_accepts_everything() {
        let cascade = Cascade::default();
        assert!(cascade.classify(&left_bright()));
    }

    #[test]
    fn rejection_short_circuits_later_layers() {
        // The second layer's feature reaches far outside the 2x2
        // sample and would panic on lookup if it were ever evaluated.
        let poison = Layer {
            features: vec![Feature {
                kind: FeatureKind::HorizontalPair,
                x: 0,
                y: 0,
                width: 100,
                height: 100,
            }],
            thresholds: vec![0.0],
            weights: vec![1.0],
            threshold: 0.0,
        };
        let cascade = Cascade {
            layers: vec![rejecting_layer(), poison],
            window_width: 2,
            window_height: 2,
        };
        assert!(!cascade.classify(&left_bright()));
    }

    #[test]
    fn appending_layers_never_recovers_a_rejection() {
        let samples = [
            IntegralImage::from_bitmap(&[1.0, 0.0, 1.0, 0.0], 2, 2).unwrap(),
            IntegralImage::from_bitmap(&[0.0, 1.0, 0.0, 1.0], 2, 2).unwrap(),
            IntegralImage::from_bitmap(&[0.3, 0.9, 0.1, 0.4], 2, 2).unwrap(),
        ];
        let mut cascade = Cascade {
            layers: vec![accepting_layer()],
            window_width: 2,
            window_height: 2,
        };
        let before: Vec<bool> = samples.iter().map(|s| cascade.classify(s)).collect();
        cascade.layers.push(rejecting_layer());
        for (i, sample) in samples.iter().enumerate() {
            if !before[i] {
                assert!(!cascade.classify(sample));
            }
        }
    }

    #[test]
    fn round_trip_preserves_classification() {
        let cascade = Cascade {
            layers: vec![accepting_layer(), accepting_layer()],
            window_width: 2,
            window_height: 2,
        };
        let json = serde_json::to_string(&cascade).unwrap();
        let back: Cascade = serde_json::from_str(&json).unwrap();
        assert_eq!(back.layers.len(), 2);
        assert_eq!(back.window_width, 2);
        assert_eq!(back.window_height, 2);
        let samples = [
            IntegralImage::from_bitmap(&[1.0, 0.0, 1.0, 0.0], 2, 2).unwrap(),
            IntegralImage::from_bitmap(&[0.0, 1.0, 0.0, 1.0], 2, 2).unwrap(),
        ];
        for sample in &samples {
            assert_eq!(cascade.classify(sample), back.classify(sample));
        }
    }

    #[test]
    fn persisted_field_names_are_stable() {
        let cascade = Cascade {
            layers: vec![accepting_layer()],
            window_width: 2,
            window_height: 2,
        };
        let json = serde_json::to_string(&cascade).unwrap();
        for field in [
            "\"Layers\"",
            "\"Features\"",
            "\"Thresholds\"",
            "\"Weights\"",
            "\"Threshold\"",
            "\"WindowWidth\"",
            "\"WindowHeight\"",
            "\"Type\":0",
        ] {
            assert!(json.contains(field), "missing {field} in {json}");
        }
    }
}
