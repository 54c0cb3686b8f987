use crate::criterion::{entropy_from_counts, gini_from_counts, variance_from_moments, Criterion};
use crate::data::Matrix;
use crate::errors::CartError;
use crate::utils::{items_to_strings, label_key, mean};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// How candidate thresholds are enumerated at a node.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum SplitSearch {
    /// Every distinct feature value above the smallest is a candidate.
    /// Ties keep the first candidate found.
    Exhaustive,
    /// The distinct values of a feature are enumerated in ascending order,
    /// and the value at position `i` among them is skipped when the labels
    /// of rows `i` and `i - 1` of the node are equal, or when `i` is the
    /// first or the last row. The rows are ordered by a stable sort on the
    /// feature, starting from the order the previous feature left them in,
    /// and children inherit the order of the last feature. Cheaper, but can
    /// miss the best split and can find none at all on impure nodes. A
    /// candidate needs a non negative gain, and ties keep the last one found.
    LabelAdjacency,
}

impl FromStr for SplitSearch {
    type Err = CartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exhaustive" => Ok(SplitSearch::Exhaustive),
            "label_adjacency" => Ok(SplitSearch::LabelAdjacency),
            _ => Err(CartError::ParseString(
                s.to_string(),
                "SplitSearch".to_string(),
                items_to_strings(vec!["exhaustive", "label_adjacency"]),
            )),
        }
    }
}

/// The chosen split of a node. Rows with `value < split_value` go left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitInfo {
    pub split_feature: usize,
    pub split_value: f64,
    /// Impurity reduction of the split.
    pub split_gain: f64,
}

/// Rows of a node sorted by one feature, with their values and labels in
/// the same order.
pub struct SortedFeature {
    pub rows: Vec<usize>,
    pub values: Vec<f64>,
    pub labels: Vec<f64>,
}

impl SortedFeature {
    pub fn new(data: &Matrix<f64>, y: &[f64], index: &[usize], feature: usize) -> Self {
        let mut rows = index.to_vec();
        // Stable, so rows with equal values keep the order they came in.
        // NaN is rejected before fitting.
        rows.sort_by(|a, b| {
            data.get(*a, feature)
                .partial_cmp(data.get(*b, feature))
                .unwrap_or(Ordering::Equal)
        });
        SortedFeature {
            values: rows.iter().map(|i| *data.get(*i, feature)).collect(),
            labels: rows.iter().map(|i| y[*i]).collect(),
            rows,
        }
    }

    /// Distinct values, ascending.
    pub fn distinct_values(&self) -> Vec<f64> {
        let mut uniq = self.values.clone();
        uniq.dedup();
        uniq
    }

    /// Number of rows strictly below the threshold.
    pub fn n_below(&self, threshold: f64) -> usize {
        self.values.partition_point(|v| *v < threshold)
    }
}

#[inline]
fn weighted_score(n_left: usize, left: f64, n_right: usize, right: f64) -> f64 {
    let n = (n_left + n_right) as f64;
    (n_left as f64 / n) * left + (n_right as f64 / n) * right
}

/// Weighted criterion of the two sides of a split.
#[inline]
pub fn split_score(criterion: &Criterion, left: &[f64], right: &[f64]) -> f64 {
    weighted_score(left.len(), criterion.score(left), right.len(), criterion.score(right))
}

enum SweepStats {
    /// Class counts of each side, by class id of the sorted rows.
    Counts {
        score: fn(&[usize], usize) -> f64,
        class_ids: Vec<usize>,
        left: Vec<usize>,
        total: Vec<usize>,
    },
    /// Sum and sum of squares of the shifted labels.
    Moments { shift: f64, left: [f64; 2], total: [f64; 2] },
    /// Medians can not be updated row by row, each side is rescored.
    Rescan,
}

/// Scores the thresholds of one sorted feature in ascending order, moving
/// rows from the right side to the left side as the threshold grows.
pub struct SplitSweep<'a> {
    criterion: Criterion,
    labels: &'a [f64],
    n_left: usize,
    // labels[..n] is constant when n <= first_change, labels[n..] when
    // n >= last_change.
    first_change: usize,
    last_change: usize,
    stats: SweepStats,
}

impl<'a> SplitSweep<'a> {
    pub fn new(criterion: Criterion, labels: &'a [f64]) -> Self {
        let stats = match criterion {
            Criterion::Gini | Criterion::Entropy => {
                let mut ids: HashMap<u64, usize> = HashMap::new();
                let class_ids: Vec<usize> = labels
                    .iter()
                    .map(|y| {
                        let next = ids.len();
                        *ids.entry(label_key(*y)).or_insert(next)
                    })
                    .collect();
                let mut total = vec![0; ids.len()];
                for c in &class_ids {
                    total[*c] += 1;
                }
                let score: fn(&[usize], usize) -> f64 = if criterion == Criterion::Gini {
                    gini_from_counts
                } else {
                    entropy_from_counts
                };
                SweepStats::Counts {
                    score,
                    left: vec![0; ids.len()],
                    total,
                    class_ids,
                }
            }
            Criterion::Variance => {
                let shift = mean(labels);
                let total = labels.iter().fold([0., 0.], |[s, sq], y| {
                    let d = y - shift;
                    [s + d, sq + d * d]
                });
                SweepStats::Moments {
                    shift,
                    left: [0., 0.],
                    total,
                }
            }
            Criterion::MadMedian => SweepStats::Rescan,
        };
        let first_change = (1..labels.len())
            .find(|i| labels[*i] != labels[i - 1])
            .unwrap_or(labels.len());
        let last_change = (1..labels.len()).rev().find(|i| labels[*i] != labels[i - 1]).unwrap_or(0);
        SplitSweep {
            criterion,
            labels,
            n_left: 0,
            first_change,
            last_change,
            stats,
        }
    }

    /// Weighted criterion of the split with the first `n_left` rows on the
    /// left. `n_left` must not decrease from one call to the next.
    pub fn score_at(&mut self, n_left: usize) -> f64 {
        let labels = self.labels;
        match &mut self.stats {
            SweepStats::Counts { class_ids, left, .. } => {
                for c in &class_ids[self.n_left..n_left] {
                    left[*c] += 1;
                }
            }
            SweepStats::Moments { shift, left, .. } => {
                for y in &labels[self.n_left..n_left] {
                    let d = y - *shift;
                    left[0] += d;
                    left[1] += d * d;
                }
            }
            SweepStats::Rescan => {}
        }
        self.n_left = n_left;

        let n_right = labels.len() - n_left;
        let (left_score, right_score) = match &self.stats {
            SweepStats::Counts { score, left, total, .. } => {
                let score = *score;
                let right: Vec<usize> = total.iter().zip(left.iter()).map(|(t, l)| t - l).collect();
                (score(left, n_left), score(&right, n_right))
            }
            SweepStats::Moments { left, total, .. } => (
                variance_from_moments(left[0], left[1], n_left),
                variance_from_moments(total[0] - left[0], total[1] - left[1], n_right),
            ),
            SweepStats::Rescan => (
                self.criterion.score(&labels[..n_left]),
                self.criterion.score(&labels[n_left..]),
            ),
        };
        let left_score = if n_left <= self.first_change { 0.0 } else { left_score };
        let right_score = if n_left >= self.last_change { 0.0 } else { right_score };
        weighted_score(n_left, left_score, n_right, right_score)
    }
}

pub trait Splitter: Sync {
    fn get_criterion(&self) -> &Criterion;

    /// Thresholds to try for one sorted feature, ascending.
    fn candidate_thresholds(&self, sorted: &SortedFeature) -> Vec<f64>;

    /// Should a split with `gain` replace `best`, the best split accepted
    /// so far at this node?
    fn is_better(&self, gain: f64, best: Option<&SplitInfo>) -> bool;

    /// When true, the rows of a node are left in the order of each feature
    /// sort, so the next feature is sorted from it and the children
    /// inherit the order of the last one.
    fn carries_row_order(&self) -> bool {
        false
    }

    /// Find the split with the largest impurity reduction over all features.
    ///
    /// * `data` - The full training matrix.
    /// * `y` - Labels of the full training matrix.
    /// * `index` - Rows of `data` that reached this node, reordered in place
    ///     when the splitter carries row order.
    /// * `parent_score` - Criterion value of the node's labels.
    ///
    /// Returns `None` when no candidate leaves rows on both sides.
    fn best_split(&self, data: &Matrix<f64>, y: &[f64], index: &mut [usize], parent_score: f64) -> Option<SplitInfo> {
        let criterion = self.get_criterion();
        let mut best: Option<SplitInfo> = None;
        for feature in 0..data.cols {
            let sorted = SortedFeature::new(data, y, index, feature);
            if self.carries_row_order() {
                index.copy_from_slice(&sorted.rows);
            }
            let mut sweep = SplitSweep::new(*criterion, &sorted.labels);
            for threshold in self.candidate_thresholds(&sorted) {
                let n_left = sorted.n_below(threshold);
                if n_left == 0 || n_left == sorted.labels.len() {
                    continue;
                }
                let gain = parent_score - sweep.score_at(n_left);
                if self.is_better(gain, best.as_ref()) {
                    best = Some(SplitInfo {
                        split_feature: feature,
                        split_value: threshold,
                        split_gain: gain,
                    });
                }
            }
        }
        best
    }
}

pub struct ExhaustiveSplitter {
    pub criterion: Criterion,
}

impl ExhaustiveSplitter {
    pub fn new(criterion: Criterion) -> Self {
        ExhaustiveSplitter { criterion }
    }
}

impl Splitter for ExhaustiveSplitter {
    fn get_criterion(&self) -> &Criterion {
        &self.criterion
    }

    fn candidate_thresholds(&self, sorted: &SortedFeature) -> Vec<f64> {
        // The smallest value would leave the left side empty.
        sorted.distinct_values().into_iter().skip(1).collect()
    }

    fn is_better(&self, gain: f64, best: Option<&SplitInfo>) -> bool {
        best.map_or(true, |b| gain > b.split_gain)
    }
}

pub struct LabelAdjacencySplitter {
    pub criterion: Criterion,
}

impl LabelAdjacencySplitter {
    pub fn new(criterion: Criterion) -> Self {
        LabelAdjacencySplitter { criterion }
    }
}

impl Splitter for LabelAdjacencySplitter {
    fn get_criterion(&self) -> &Criterion {
        &self.criterion
    }

    fn candidate_thresholds(&self, sorted: &SortedFeature) -> Vec<f64> {
        let n_rows = sorted.labels.len();
        // The label lookup uses the position of the value among the distinct
        // values, not its row position.
        sorted
            .distinct_values()
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i != 0 && *i != n_rows - 1 && sorted.labels[*i] != sorted.labels[*i - 1])
            .map(|(_, v)| v)
            .collect()
    }

    fn is_better(&self, gain: f64, best: Option<&SplitInfo>) -> bool {
        gain >= best.map_or(0.0, |b| b.split_gain)
    }

    fn carries_row_order(&self) -> bool {
        true
    }
}

/// Split the rows of a node into the rows going left and right, each side
/// keeping the order the rows came in.
pub fn pivot_on_split(data: &Matrix<f64>, index: Vec<usize>, split: &SplitInfo) -> (Vec<usize>, Vec<usize>) {
    index
        .into_iter()
        .partition(|i| *data.get(*i, split.split_feature) < split.split_value)
}
