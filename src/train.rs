use crate::boosting::Booster;
use crate::cascade::{Cascade, Layer};
use crate::error::Result;
use crate::feature::{all_features, Feature};
use crate::integral::{IntegralImage, IntegralView};
use crate::logger::Logger;
use crate::samples::SampleSource;

/// Minimum requirements for one layer of a cascade.
#[derive(Debug, Clone, Copy)]
pub struct Requirements {
    /// Minimum fraction of positive samples the layer must accept.
    /// Useful values sit in the high 0.9s.
    pub positive_retention: f64,
    /// Minimum fraction of negative samples the layer must reject.
    /// 0.5 is already worthwhile for an early layer.
    pub negative_exclusion: f64,
    /// Stumps to try before giving up on the exclusion quota. A layer
    /// that runs out is kept as-is; the next layer cleans up.
    pub max_features: usize,
}

/// Trains a cascade from scratch, one layer per requirement entry.
///
/// Fewer layers than requested come back if the negatives run dry:
/// once the partial cascade rejects every background crop there is
/// nothing left to train against.
pub fn train(
    requirements: &[Requirements],
    samples: &dyn SampleSource,
    logger: &dyn Logger,
) -> Result<Cascade> {
    let mut cascade = Cascade::default();
    train_more(&mut cascade, requirements, samples, logger)?;
    Ok(cascade)
}

/// Appends layers onto an existing cascade; `requirements` covers only
/// the layers being added. Positives that the existing cascade already
/// rejects are dropped before training begins.
pub fn train_more(
    cascade: &mut Cascade,
    requirements: &[Requirements],
    samples: &dyn SampleSource,
    logger: &dyn Logger,
) -> Result<()> {
    let mut positives = samples.positives();
    if !cascade.layers.is_empty() {
        positives.retain(|p| cascade.classify(p));
    }
    if positives.is_empty() {
        return Ok(());
    }

    cascade.window_width = positives[0].width();
    cascade.window_height = positives[0].height();

    let features = all_features(cascade.window_width, cascade.window_height);

    for reqs in requirements {
        logger.log_starting_layer(cascade.layers.len());

        let negatives = if cascade.layers.is_empty() {
            samples.initial_negatives()
        } else {
            samples.adversarial_negatives(cascade)
        };
        logger.log_created_negatives(negatives.len());
        if negatives.is_empty() {
            break;
        }

        let layer = train_layer(reqs, &positives, &negatives, &features, logger)?;
        positives.retain(|p| layer.classify(p));
        cascade.layers.push(layer);
    }

    Ok(())
}

fn train_layer(
    reqs: &Requirements,
    positives: &[IntegralImage],
    negatives: &[IntegralImage],
    features: &[Feature],
    logger: &dyn Logger,
) -> Result<Layer> {
    let samples: Vec<&IntegralImage> = positives.iter().chain(negatives.iter()).collect();
    let mut booster = Booster::new(&samples, positives.len(), features);

    let mut threshold = 0.0;
    for i in 0..reqs.max_features {
        let stump = booster.step()?;
        threshold = calibrate_threshold(
            booster.out_cache(),
            booster.desired(),
            reqs.positive_retention,
        );
        let (retention, exclusion) =
            scores(booster.out_cache(), booster.desired(), threshold);

        if exclusion > 0.0 {
            logger.log_feature(i + 1, retention, exclusion, &stump.feature);
        } else {
            // A degenerate early threshold makes the calibrated scores
            // meaningless; log the raw-zero scores instead.
            let (raw_retention, raw_exclusion) =
                scores(booster.out_cache(), booster.desired(), 0.0);
            logger.log_feature(i + 1, raw_retention, raw_exclusion, &stump.feature);
        }

        if retention >= reqs.positive_retention && exclusion >= reqs.negative_exclusion {
            break;
        }
    }

    Ok(booster.into_layer(threshold))
}

/// The highest threshold that still keeps `retention` of the positive
/// samples, clamped to zero from above: a boosted output near zero is
/// still confidently negative, so the bias never turns positive.
pub(crate) fn calibrate_threshold(out: &[f64], desired: &[f64], retention: f64) -> f64 {
    let mut positive_outs: Vec<f64> = desired
        .iter()
        .zip(out)
        .filter(|(d, _)| **d > 0.0)
        .map(|(_, o)| *o)
        .collect();
    let positive_count = positive_outs.len();
    positive_outs.sort_by(f64::total_cmp);

    // Distinct values with multiplicities, ascending.
    let mut distinct: Vec<f64> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    for &o in &positive_outs {
        if distinct.last() == Some(&o) {
            if let Some(last) = counts.last_mut() {
                *last += 1;
            }
        } else {
            distinct.push(o);
            counts.push(1);
        }
    }

    let mut needed = (retention * positive_count as f64).ceil() as i64;
    let mut res = 0.0;
    for i in (1..distinct.len()).rev() {
        needed -= counts[i] as i64;
        if needed <= 0 {
            res = (distinct[i - 1] + distinct[i]) / 2.0;
            break;
        }
    }
    if needed > 0 {
        // The quota needs even the lowest-scoring positives; sit just
        // below the minimum so all of them pass the strict comparison.
        res = distinct[0].next_down();
    }

    res.min(0.0)
}

/// Fraction of positives above the threshold and fraction of negatives
/// at or below it.
pub(crate) fn scores(out: &[f64], desired: &[f64], threshold: f64) -> (f64, f64) {
    let mut retained = 0usize;
    let mut positive = 0usize;
    let mut excluded = 0usize;
    let mut negative = 0usize;

    for (d, o) in desired.iter().zip(out) {
        if *d > 0.0 {
            positive += 1;
            if *o > threshold {
                retained += 1;
            }
        } else {
            negative += 1;
            if *o <= threshold {
                excluded += 1;
            }
        }
    }

    (
        retained as f64 / positive as f64,
        excluded as f64 / negative as f64,
    )
}
