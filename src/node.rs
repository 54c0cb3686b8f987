use crate::utils::{first_argmax, fmt_vec_output};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a leaf predicts.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub enum LeafValue {
    /// Class probabilities, in class universe order.
    Probabilities(Vec<f64>),
    /// Regression value.
    Value(f64),
}

impl LeafValue {
    /// Collapse the leaf to a single prediction. Probability leaves return
    /// the most likely class, ties going to the first class.
    pub fn prediction(&self, classes: &[f64]) -> f64 {
        match self {
            LeafValue::Probabilities(p) => first_argmax(p).map_or(f64::NAN, |i| classes[i]),
            LeafValue::Value(v) => *v,
        }
    }

    pub fn probabilities(&self) -> Option<&[f64]> {
        match self {
            LeafValue::Probabilities(p) => Some(p),
            LeafValue::Value(_) => None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub enum Node {
    Leaf {
        value: LeafValue,
        n_samples: usize,
        depth: usize,
    },
    Internal {
        split_feature: usize,
        split_value: f64,
        split_gain: f64,
        n_samples: usize,
        depth: usize,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn depth(&self) -> usize {
        match self {
            Node::Leaf { depth, .. } | Node::Internal { depth, .. } => *depth,
        }
    }

    /// Number of training rows that reached this node.
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Leaf { n_samples, .. } | Node::Internal { n_samples, .. } => *n_samples,
        }
    }

    /// Get the child that should be traveled down, given a value of the split
    /// feature. `None` for leaves.
    pub fn get_child(&self, v: f64) -> Option<&Node> {
        match self {
            Node::Leaf { .. } => None,
            Node::Internal {
                split_value,
                left,
                right,
                ..
            } => {
                if v < *split_value {
                    Some(left.as_ref())
                } else {
                    Some(right.as_ref())
                }
            }
        }
    }
}

impl fmt::Display for Node {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Node::Leaf {
                value: LeafValue::Probabilities(p),
                n_samples,
                ..
            } => write!(f, "leaf=[{}],samples={}", fmt_vec_output(p), n_samples),
            Node::Leaf {
                value: LeafValue::Value(v),
                n_samples,
                ..
            } => write!(f, "leaf={},samples={}", v, n_samples),
            Node::Internal {
                split_feature,
                split_value,
                split_gain,
                n_samples,
                ..
            } => write!(
                f,
                "[{} < {}] gain={},samples={}",
                split_feature, split_value, split_gain, n_samples
            ),
        }
    }
}
