use crate::errors::CartError;
use std::cmp::Ordering;

/// Create a string of all available items.
pub fn items_to_strings(items: Vec<&str>) -> String {
    let mut s = String::new();
    for i in items {
        s.push_str(i);
        s.push_str(&String::from(", "));
    }
    s
}

pub fn fmt_vec_output(v: &[f64]) -> String {
    let mut res = String::new();
    if let Some(last) = v.len().checked_sub(1) {
        if last == 0 {
            return format!("{:.4}", v[0]);
        }
        for n in &v[..last] {
            res.push_str(format!("{:.4}", n).as_str());
            res.push_str(", ");
        }
        res.push_str(format!("{:.4}", &v[last]).as_str());
    }
    res
}

// Validation
pub fn validate_positive_parameter(value: usize, parameter: &str) -> Result<(), CartError> {
    if value == 0 {
        Err(CartError::InvalidParameter(
            parameter.to_string(),
            "a positive integer".to_string(),
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

pub fn precision_round(n: f64, precision: i32) -> f64 {
    let p = (10.0_f64).powi(precision);
    (n * p).round() / p
}

/// Key used to group equal labels, `-0.0` and `0.0` share a key.
#[inline]
pub fn label_key(v: f64) -> u64 {
    if v == 0.0 {
        0.0_f64.to_bits()
    } else {
        v.to_bits()
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of the values, averaging the two middle values for even lengths.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Position of the first maximum, NaN values never win.
pub fn first_argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v.partial_cmp(&b) != Some(Ordering::Greater) => {}
            _ if v.is_nan() => {}
            _ => best = Some((i, *v)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_round() {
        assert_eq!(precision_round(0.33333, 3), 0.333);
        assert_eq!(precision_round(0.6666, 3), 0.667);
        assert_eq!(precision_round(1.0, 3), 1.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3., 1., 2.]), 2.);
        assert_eq!(median(&[4., 1., 3., 2.]), 2.5);
        assert_eq!(median(&[7.]), 7.);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[10., 10., 20., 20.]), 15.);
        assert_eq!(mean(&[]), 0.);
    }

    #[test]
    fn test_first_argmax_ties() {
        assert_eq!(first_argmax(&[0.5, 0.5]), Some(0));
        assert_eq!(first_argmax(&[0.2, 0.4, 0.4]), Some(1));
        assert_eq!(first_argmax(&[f64::NAN, 0.1]), Some(1));
        assert_eq!(first_argmax(&[]), None);
    }

    #[test]
    fn test_label_key_zero() {
        assert_eq!(label_key(-0.0), label_key(0.0));
        assert_ne!(label_key(1.0), label_key(2.0));
    }

    #[test]
    fn test_validate_positive_parameter() {
        assert!(validate_positive_parameter(1, "min_samples_split").is_ok());
        assert!(matches!(
            validate_positive_parameter(0, "min_samples_split"),
            Err(CartError::InvalidParameter(..))
        ));
    }

    #[test]
    fn test_items_to_strings() {
        assert_eq!(items_to_strings(vec!["gini", "entropy"]), "gini, entropy, ");
    }
}
