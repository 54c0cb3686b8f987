//! Tree Prediction Methods
//!
//! Traversal of a fitted tree, for single rows and whole matrices.
use super::tree::Tree;
use crate::data::Matrix;
use crate::node::{LeafValue, Node};
use rayon::prelude::*;

impl Tree {
    /// Walk a row down to its leaf, left when the value is strictly below
    /// the threshold.
    pub fn predict_row_leaf(&self, row: &[f64]) -> &Node {
        let mut node = &self.root;
        while let Node::Internal { split_feature, .. } = node {
            // Internal nodes always have a child.
            node = match node.get_child(row[*split_feature]) {
                Some(child) => child,
                None => break,
            };
        }
        node
    }

    fn predict_matrix_row_leaf(&self, data: &Matrix<f64>, row: usize) -> &LeafValue {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value, .. } => return value,
                Node::Internal {
                    split_feature,
                    split_value,
                    left,
                    right,
                    ..
                } => {
                    node = if data.get(row, *split_feature) < split_value {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                }
            }
        }
    }

    /// Leaf values reached by every row of the data, in row order.
    pub fn predict_leaves(&self, data: &Matrix<f64>, parallel: bool) -> Vec<&LeafValue> {
        if parallel {
            data.index
                .par_iter()
                .map(|i| self.predict_matrix_row_leaf(data, *i))
                .collect()
        } else {
            data.index
                .iter()
                .map(|i| self.predict_matrix_row_leaf(data, *i))
                .collect()
        }
    }

    /// Predict a class label or regression value for every row.
    ///
    /// * `classes` - Class universe the probability leaves are ordered by.
    pub fn predict(&self, data: &Matrix<f64>, classes: &[f64], parallel: bool) -> Vec<f64> {
        if parallel {
            data.index
                .par_iter()
                .map(|i| self.predict_matrix_row_leaf(data, *i).prediction(classes))
                .collect()
        } else {
            data.index
                .iter()
                .map(|i| self.predict_matrix_row_leaf(data, *i).prediction(classes))
                .collect()
        }
    }

    /// Leaf class probabilities for every row, `None` for regression trees.
    pub fn predict_proba(&self, data: &Matrix<f64>, parallel: bool) -> Option<Vec<Vec<f64>>> {
        let leaves = self.predict_leaves(data, parallel);
        leaves
            .into_iter()
            .map(|leaf| leaf.probabilities().map(|p| p.to_vec()))
            .collect()
    }
}
