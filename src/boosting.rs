use crate::cascade::Layer;
use crate::error::Result;
use crate::feature::Feature;
use crate::integral::IntegralImage;
use crate::weak_classifier::{FeaturePool, Stump};

/// Positive samples carry this extra factor in the loss, on top of the
/// negative/positive count ratio.
const POSITIVE_BIAS: f64 = 2.0;

/// Keeps a perfectly-classifying stump's coefficient finite.
const ALPHA_SMOOTHING: f64 = 1e-12;

/// Gradient boosting under a weighted exponential loss. One instance
/// lives for exactly one layer's training: the sample set is frozen at
/// construction and the accumulated stumps become the layer.
pub(crate) struct Booster<'a> {
    samples: &'a [&'a IntegralImage],
    desired: Vec<f64>,
    out_cache: Vec<f64>,
    positive_weight: f64,
    stumps: Vec<Stump>,
    stump_weights: Vec<f64>,
    pool: FeaturePool<'a>,
}

impl<'a> Booster<'a> {
    /// `samples` is positives first, negatives after; the first
    /// `num_positive` entries have desired output +1, the rest -1.
    pub fn new(
        samples: &'a [&'a IntegralImage],
        num_positive: usize,
        features: &'a [Feature],
    ) -> Self {
        let num_negative = samples.len() - num_positive;
        let desired = (0..samples.len())
            .map(|i| if i < num_positive { 1.0 } else { -1.0 })
            .collect();
        Self {
            samples,
            desired,
            out_cache: vec![0.0; samples.len()],
            positive_weight: POSITIVE_BIAS * num_negative as f64 / num_positive as f64,
            stumps: Vec::new(),
            stump_weights: Vec::new(),
            pool: FeaturePool::new(features),
        }
    }

    /// Adds one stump to the model: pick the stump best aligned with
    /// the current loss residuals, weight it by the closed-form
    /// exponential-loss optimum `alpha = ln(correct/wrong) / 2`, and
    /// fold its outputs into the per-sample cumulative output.
    pub fn step(&mut self) -> Result<Stump> {
        let magnitudes = self.sample_weights();
        let residuals: Vec<f64> = magnitudes
            .iter()
            .zip(&self.desired)
            .map(|(m, d)| m * d)
            .collect();
        let stump = self.pool.best_stump(self.samples, &residuals)?;

        let mut correct = 0.0;
        let mut wrong = 0.0;
        let mut outputs = Vec::with_capacity(self.samples.len());
        for (i, sample) in self.samples.iter().enumerate() {
            let out = stump.evaluate(sample);
            if out == self.desired[i] {
                correct += magnitudes[i];
            } else {
                wrong += magnitudes[i];
            }
            outputs.push(out);
        }
        let alpha = 0.5 * ((correct + ALPHA_SMOOTHING) / (wrong + ALPHA_SMOOTHING)).ln();

        for (cache, out) in self.out_cache.iter_mut().zip(&outputs) {
            *cache += alpha * out;
        }
        self.stumps.push(stump);
        self.stump_weights.push(alpha);
        Ok(stump)
    }

    /// Per-sample loss weights, normalised to sum to 1: positives get
    /// the positive-class bias, and every sample is scaled by how
    /// badly the current model handles it.
    fn sample_weights(&self) -> Vec<f64> {
        let mut weights: Vec<f64> = self
            .desired
            .iter()
            .zip(&self.out_cache)
            .map(|(d, out)| {
                let bias = if *d > 0.0 { self.positive_weight } else { 1.0 };
                bias * (-d * out).exp()
            })
            .collect();
        let sum: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= sum;
        }
        weights
    }

    pub fn out_cache(&self) -> &[f64] {
        &self.out_cache
    }

    pub fn desired(&self) -> &[f64] {
        &self.desired
    }

    pub fn into_layer(self, threshold: f64) -> Layer {
        Layer {
            features: self.stumps.iter().map(|s| s.feature).collect(),
            thresholds: self.stumps.iter().map(|s| s.threshold).collect(),
            weights: self.stump_weights,
            threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::all_features;
    use crate::feature::FeatureKind;

    fn separable_samples() -> Vec<IntegralImage> {
        let bitmaps: [&[f64]; 4] = [
            &[1.0, 0.0, 1.0, 0.0],
            &[1.0, 0.0, 1.0, 0.0],
            &[0.0, 1.0, 0.0, 1.0],
            &[0.0, 1.0, 0.0, 1.0],
        ];
        bitmaps
            .iter()
            .map(|b| IntegralImage::from_bitmap(b, 2, 2).unwrap())
            .collect()
    }

    #[test]
    fn initial_weights_favor_positives() {
        let imgs = separable_samples();
        let refs: Vec<&IntegralImage> = imgs.iter().collect();
        let features = all_features(2, 2);
        let booster = Booster::new(&refs, 2, &features);
        let weights = booster.sample_weights();
        let sum: f64 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        // pw = 2 * 2/2 = 2, so each positive holds twice the weight
        // of each negative before any step.
        assert!((weights[0] / weights[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn step_separates_and_raises_margins() {
        let imgs = separable_samples();
        let refs: Vec<&IntegralImage> = imgs.iter().collect();
        let features = all_features(2, 2);
        let mut booster = Booster::new(&refs, 2, &features);
        let stump = booster.step().unwrap();
        assert_eq!(stump.feature.kind, FeatureKind::HorizontalPair);
        let out = booster.out_cache();
        assert!(out[0] > 0.0 && out[1] > 0.0);
        assert!(out[2] < 0.0 && out[3] < 0.0);
        // A perfect stump earns a large positive coefficient.
        assert!(booster.stump_weights[0] > 1.0);
    }

    #[test]
    fn layer_carries_one_slot_per_stump() {
        let imgs = separable_samples();
        let refs: Vec<&IntegralImage> = imgs.iter().collect();
        let features = all_features(2, 2);
        let mut booster = Booster::new(&refs, 2, &features);
        booster.step().unwrap();
        booster.step().unwrap();
        let layer = booster.into_layer(-0.5);
        assert_eq!(layer.features.len(), 2);
        assert_eq!(layer.thresholds.len(), 2);
        assert_eq!(layer.weights.len(), 2);
        assert_eq!(layer.threshold, -0.5);
    }
}
