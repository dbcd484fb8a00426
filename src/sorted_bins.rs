use crate::error::{Error, Result};

/// Maps an unsorted list of floats onto its deduplicated sorted axis.
///
/// `sorted` is strictly ascending; `mapping[i]` is the position of the
/// original `values[i]` in `sorted`. This is what lets the stump
/// learner sweep every distinct threshold of a feature in one O(k)
/// pass instead of re-sorting per candidate.
#[derive(Debug, Clone)]
pub struct SortedBins {
    pub sorted: Vec<f64>,
    pub mapping: Vec<usize>,
}

impl SortedBins {
    /// Fails with [`Error::NanValue`] if any value is NaN, since NaN
    /// has no place on a sorted axis.
    pub fn new(values: &[f64]) -> Result<Self> {
        if values.iter().any(|v| v.is_nan()) {
            return Err(Error::NanValue);
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        sorted.dedup();

        // Every value is present in `sorted`, so the partition point of
        // "strictly less" lands exactly on it.
        let mapping = values
            .iter()
            .map(|v| sorted.partition_point(|s| s < v))
            .collect();

        Ok(Self { sorted, mapping })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_and_maps() {
        let values = [1.0, 3.0, 2.0, 3.0, 5.0, 0.5, 0.5, 4.5, 5.0];
        let bins = SortedBins::new(&values).unwrap();
        assert_eq!(bins.sorted, vec![0.5, 1.0, 2.0, 3.0, 4.5, 5.0]);
        assert_eq!(bins.mapping, vec![1, 3, 2, 3, 5, 0, 0, 4, 5]);
    }

    #[test]
    fn mapping_points_back_at_values() {
        let values = [0.25, -1.5, 0.25, 9.0, 3.0, -1.5, 0.0];
        let bins = SortedBins::new(&values).unwrap();
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(bins.sorted[bins.mapping[i]], v);
        }
        for pair in bins.sorted.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn rejects_nan() {
        assert!(matches!(
            SortedBins::new(&[1.0, f64::NAN]),
            Err(Error::NanValue)
        ));
    }

    #[test]
    fn single_value() {
        let bins = SortedBins::new(&[7.0, 7.0, 7.0]).unwrap();
        assert_eq!(bins.sorted, vec![7.0]);
        assert_eq!(bins.mapping, vec![0, 0, 0]);
    }
}
