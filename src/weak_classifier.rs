use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::integral::{IntegralImage, IntegralView};
use crate::sorted_bins::SortedBins;

/// Features are sliced into batches of roughly this size per worker
/// task to amortise scheduling overhead.
const BATCH_SIZE: usize = 10;

/// A depth-one decision on a single feature: +1 if the feature value
/// exceeds the threshold, -1 otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stump {
    pub feature: Feature,
    pub threshold: f64,
}

impl Stump {
    pub fn evaluate(&self, img: &impl IntegralView) -> f64 {
        if self.feature.value(img) > self.threshold {
            1.0
        } else {
            -1.0
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    stump: Stump,
    dot: f64,
    index: usize,
}

/// The weak-learner search over a fixed feature catalogue. Holds the
/// per-feature sorted bins, which are built on first use and reused
/// for every boosting step of the layer (the sample set is fixed for
/// the layer's lifetime).
pub(crate) struct FeaturePool<'a> {
    features: &'a [Feature],
    bins: Option<Vec<SortedBins>>,
}

impl<'a> FeaturePool<'a> {
    pub fn new(features: &'a [Feature]) -> Self {
        Self {
            features,
            bins: None,
        }
    }

    /// Finds the stump maximising `|sum_i weights[i] * h_i|` where
    /// `h_i` is the stump's +/-1 output on sample `i`. `weights` are
    /// signed boosting residuals. Equal scores resolve toward the
    /// later feature in catalogue order, independent of worker
    /// scheduling.
    pub fn best_stump(
        &mut self,
        samples: &[&IntegralImage],
        weights: &[f64],
    ) -> Result<Stump> {
        if self.bins.is_none() {
            let bins = self
                .features
                .par_iter()
                .with_min_len(BATCH_SIZE)
                .map(|feature| {
                    let values: Vec<f64> =
                        samples.iter().map(|s| feature.value(s)).collect();
                    SortedBins::new(&values)
                })
                .collect::<Result<Vec<_>>>()?;
            self.bins = Some(bins);
        }
        let Some(bins) = &self.bins else { unreachable!() };

        let total: f64 = weights.iter().sum();
        self.features
            .par_iter()
            .with_min_len(BATCH_SIZE)
            .enumerate()
            .map(|(index, &feature)| best_split(feature, index, &bins[index], weights, total))
            .reduce_with(|a, b| {
                let (early, late) = if a.index < b.index { (a, b) } else { (b, a) };
                if late.dot.abs() >= early.dot.abs() {
                    late
                } else {
                    early
                }
            })
            .map(|c| c.stump)
            .ok_or(Error::NoFeatures)
    }
}

/// Sweeps every distinct threshold of one feature. Starting above the
/// maximum output makes every stump output -1; lowering the threshold
/// past a distinct value flips that bin's samples to +1, moving the
/// weighted dot product by twice the bin's weight.
fn best_split(
    feature: Feature,
    index: usize,
    bins: &SortedBins,
    weights: &[f64],
    total: f64,
) -> Candidate {
    let mut weight_sums = vec![0.0; bins.sorted.len()];
    for (i, &slot) in bins.mapping.iter().enumerate() {
        weight_sums[slot] += weights[i];
    }

    let mut best_dot = -total;
    let mut best_threshold = bins.sorted[bins.sorted.len() - 1];

    let mut dot = best_dot;
    for i in (1..bins.sorted.len()).rev() {
        dot += 2.0 * weight_sums[i];
        if dot.abs() > best_dot.abs() {
            best_dot = dot;
            best_threshold = (bins.sorted[i - 1] + bins.sorted[i]) / 2.0;
        }
    }

    Candidate {
        stump: Stump {
            feature,
            threshold: best_threshold,
        },
        dot: best_dot,
        index,
    }
}
