//! Criterion
//!
//! Impurity and dispersion measures used to score a set of labels.
//! All of them are pure functions of the labels they are given, and
//! score 0 when every label is identical.
use crate::errors::CartError;
use crate::utils::{items_to_strings, label_key, mean, median};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type CriterionFn = fn(&[f64]) -> f64;

/// Kind of problem a tree solves, fixed by its criterion.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Classification,
    Regression,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity, classification.
    Gini,
    /// Shannon entropy in bits, classification.
    Entropy,
    /// Population variance, regression.
    Variance,
    /// Mean absolute deviation from the median, regression.
    MadMedian,
}

impl FromStr for Criterion {
    type Err = CartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gini" => Ok(Criterion::Gini),
            "entropy" => Ok(Criterion::Entropy),
            "variance" => Ok(Criterion::Variance),
            "mad_median" => Ok(Criterion::MadMedian),

            _ => Err(CartError::ParseString(
                s.to_string(),
                "Criterion".to_string(),
                items_to_strings(vec!["gini", "entropy", "variance", "mad_median"]),
            )),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Criterion::Gini => "gini",
            Criterion::Entropy => "entropy",
            Criterion::Variance => "variance",
            Criterion::MadMedian => "mad_median",
        };
        write!(f, "{}", name)
    }
}

impl Criterion {
    pub fn task(&self) -> TaskType {
        match self {
            Criterion::Gini | Criterion::Entropy => TaskType::Classification,
            Criterion::Variance | Criterion::MadMedian => TaskType::Regression,
        }
    }

    pub fn callable(&self) -> CriterionFn {
        match self {
            Criterion::Gini => gini,
            Criterion::Entropy => entropy,
            Criterion::Variance => variance,
            Criterion::MadMedian => mad_median,
        }
    }

    /// Score a set of labels with this criterion.
    #[inline]
    pub fn score(&self, labels: &[f64]) -> f64 {
        self.callable()(labels)
    }
}

/// Number of labels taken by each distinct value present.
pub fn class_counts(labels: &[f64]) -> Vec<usize> {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for y in labels {
        *counts.entry(label_key(*y)).or_insert(0) += 1;
    }
    counts.into_values().collect()
}

/// Fraction of `n` taken by each non empty class.
fn class_fractions(counts: &[usize], n: usize) -> Vec<f64> {
    // Map iteration order is not stable, sort so sums are reproducible.
    let mut counts: Vec<usize> = counts.iter().copied().filter(|c| *c > 0).collect();
    counts.sort_unstable();
    let n = n as f64;
    counts.into_iter().map(|c| c as f64 / n).collect()
}

/// Gini impurity of `n` labels split into classes of the given sizes.
pub fn gini_from_counts(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    1.0 - class_fractions(counts, n).iter().map(|p| p * p).sum::<f64>()
}

/// Entropy of `n` labels split into classes of the given sizes.
pub fn entropy_from_counts(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let s: f64 = class_fractions(counts, n).iter().map(|p| p * p.log2()).sum();
    // -0.0 for pure sets
    if s == 0.0 {
        0.0
    } else {
        -s
    }
}

pub fn gini(labels: &[f64]) -> f64 {
    gini_from_counts(&class_counts(labels), labels.len())
}

pub fn entropy(labels: &[f64]) -> f64 {
    entropy_from_counts(&class_counts(labels), labels.len())
}

pub fn variance(labels: &[f64]) -> f64 {
    match labels.first() {
        None => 0.0,
        // The two pass formula leaves rounding error on constant labels.
        Some(first) if labels.iter().all(|y| y == first) => 0.0,
        Some(_) => {
            let m = mean(labels);
            labels.iter().map(|y| (y - m).powi(2)).sum::<f64>() / labels.len() as f64
        }
    }
}

/// Population variance from the sum and the sum of squares of `n` labels,
/// all shifted by the same constant.
pub fn variance_from_moments(sum: f64, sum_sq: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    ((sum_sq - sum * sum / n) / n).max(0.0)
}

pub fn mad_median(labels: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let m = median(labels);
    labels.iter().map(|y| (y - m).abs()).sum::<f64>() / labels.len() as f64
}
