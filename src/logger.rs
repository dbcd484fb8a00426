use log::info;

use crate::feature::Feature;

/// Observer hook for the training loop.
pub trait Logger {
    /// A new cascade layer is about to be trained.
    fn log_starting_layer(&self, index: usize);

    /// The negative samples for the current layer are ready.
    fn log_created_negatives(&self, count: usize);

    /// A stump was added to the current layer. `count` is the number
    /// of stumps in the layer so far; retention and exclusion are
    /// measured at the layer's calibrated threshold.
    fn log_feature(&self, count: usize, retention: f64, exclusion: f64, feature: &Feature);
}

/// Logs progress through the `log` facade.
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log_starting_layer(&self, index: usize) {
        info!("Starting layer {index} ...");
    }

    fn log_created_negatives(&self, count: usize) {
        info!("Created {count} negatives.");
    }

    fn log_feature(&self, count: usize, retention: f64, exclusion: f64, feature: &Feature) {
        info!(
            "Feature {count}: retention={retention:.6} exclusion={exclusion:.6} type={}",
            feature.kind.tag()
        );
    }
}

/// Discards everything.
pub struct NullLogger;

impl Logger for NullLogger {
    fn log_starting_layer(&self, _index: usize) {}

    fn log_created_negatives(&self, _count: usize) {}

    fn log_feature(&self, _count: usize, _retention: f64, _exclusion: f64, _feature: &Feature) {}
}
