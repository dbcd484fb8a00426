use std::ops::Deref;

use serde::Serialize;

/// A region of an image in which the cascade fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Match {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Match {
    fn area(&self) -> usize {
        self.width * self.height
    }

    fn intersection_area(&self, other: &Match) -> usize {
        let x0 = self.x.max(other.x);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y0 = self.y.max(other.y);
        let y1 = (self.y + self.height).min(other.y + other.height);
        if x1 <= x0 || y1 <= y0 {
            return 0;
        }
        (x1 - x0) * (y1 - y0)
    }

    /// True when the intersection covers more than `threshold` of the
    /// smaller rectangle. At 0 any positive intersection counts.
    fn overlaps(&self, other: &Match, threshold: f64) -> bool {
        let intersection = self.intersection_area(other);
        intersection > 0
            && intersection as f64 > threshold * self.area().min(other.area()) as f64
    }
}

/// A set of possibly-overlapping matches, as produced by a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Matches(pub Vec<Match>);

impl Matches {
    /// Averages transitively-overlapping matches into single
    /// rectangles. A match touching several existing clusters fuses
    /// them, so the outcome does not depend on input order.
    pub fn join_overlaps(&self, threshold: f64) -> Matches {
        let mut clusters: Vec<Vec<Match>> = Vec::new();
        for &m in &self.0 {
            let hits: Vec<usize> = clusters
                .iter()
                .enumerate()
                .filter(|(_, cluster)| cluster.iter().any(|c| c.overlaps(&m, threshold)))
                .map(|(i, _)| i)
                .collect();
            match hits.split_first() {
                None => clusters.push(vec![m]),
                Some((&first, rest)) => {
                    clusters[first].push(m);
                    for &k in rest.iter().rev() {
                        let absorbed = clusters.swap_remove(k);
                        clusters[first].extend(absorbed);
                    }
                }
            }
        }
        Matches(clusters.iter().map(|c| average(c)).collect())
    }
}

fn average(cluster: &[Match]) -> Match {
    let mut sum = Match {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    };
    for m in cluster {
        sum.x += m.x;
        sum.y += m.y;
        sum.width += m.width;
        sum.height += m.height;
    }
    let n = cluster.len();
    Match {
        x: sum.x / n,
        y: sum.y / n,
        width: sum.width / n,
        height: sum.height / n,
    }
}

impl Deref for Matches {
    type Target = [Match];

    fn deref(&self) -> &[Match] {
        &self.0
    }
}

impl From<Vec<Match>> for Matches {
    fn from(matches: Vec<Match>) -> Self {
        Matches(matches)
    }
}
