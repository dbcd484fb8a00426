//! Training and detection for Viola-Jones style cascades of Haar-like
//! rectangle features over integral images.
//!
//! Training consumes a [`SampleSource`] of normalised positive windows
//! and background crops, boosts feature stumps into layers under
//! per-layer retention/exclusion quotas, and mines adversarial
//! negatives between layers. The resulting [`Cascade`] serialises to
//! JSON and can be slid across whole images at multiple scales with
//! [`Cascade::scan`].

mod boosting;
mod cascade;
mod error;
mod feature;
mod integral;
mod logger;
mod matches;
mod samples;
mod sorted_bins;
mod train;
mod weak_classifier;

pub use cascade::{Cascade, Layer, ScanParams};
pub use error::{Error, Result};
pub use feature::{all_features, Feature, FeatureKind};
pub use integral::{DualImage, IntegralImage, IntegralView, NormalizedWindow, ScaledWindow};
pub use logger::{ConsoleLogger, Logger, NullLogger};
pub use matches::{Match, Matches};
pub use samples::{DirSampleSource, SampleSource};
pub use sorted_bins::SortedBins;
pub use train::{train, train_more, Requirements};
pub use weak_classifier::Stump;
