use crate::constants::{PARALLEL_MIN_SAMPLES, PROBA_PRECISION};
use crate::criterion::TaskType;
use crate::data::Matrix;
use crate::errors::CartError;
use crate::node::{LeafValue, Node};
use crate::splitter::{pivot_on_split, Splitter};
use crate::utils::{label_key, mean, precision_round};
use hashbrown::HashMap;
use log::debug;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::cmp::max;
use std::fmt::{self, Display};

/// Stopping rules and options used while growing a tree.
#[derive(Debug, Clone)]
pub struct TreeParams {
    /// Nodes at this depth become leaves, `None` is unbounded.
    pub max_depth: Option<usize>,
    /// Nodes with this many rows or fewer become leaves.
    pub min_samples_split: usize,
    /// Log every node as it is created.
    pub debug: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Tree {
    pub root: Node,
    pub depth: usize,
    pub n_leaves: usize,
    pub n_nodes: usize,
}

struct TreeBuilder<'a, 'b, S: Splitter> {
    data: &'a Matrix<'b, f64>,
    y: &'a [f64],
    splitter: &'a S,
    classes: &'a [f64],
    params: &'a TreeParams,
    parallel: bool,
}

impl<'a, 'b, S: Splitter> TreeBuilder<'a, 'b, S> {
    fn make_leaf(&self, labels: &[f64], depth: usize) -> Node {
        let value = match self.splitter.get_criterion().task() {
            TaskType::Classification => {
                let mut counts: HashMap<u64, usize> = HashMap::new();
                for y in labels {
                    *counts.entry(label_key(*y)).or_insert(0) += 1;
                }
                let n = labels.len() as f64;
                LeafValue::Probabilities(
                    self.classes
                        .iter()
                        .map(|c| {
                            let count = counts.get(&label_key(*c)).copied().unwrap_or(0);
                            precision_round(count as f64 / n, PROBA_PRECISION)
                        })
                        .collect(),
                )
            }
            TaskType::Regression => LeafValue::Value(mean(labels)),
        };
        if self.params.debug {
            debug!("depth {}: leaf {:?} from {} samples", depth, value, labels.len());
        }
        Node::Leaf {
            value,
            n_samples: labels.len(),
            depth,
        }
    }

    fn is_terminal(&self, labels: &[f64], score: f64, depth: usize) -> bool {
        let pure = score == 0.0 || labels.windows(2).all(|w| w[0] == w[1]);
        pure || labels.len() <= self.params.min_samples_split || self.params.max_depth.is_some_and(|d| depth >= d)
    }

    fn build_node(&self, mut index: Vec<usize>, depth: usize) -> Result<Node, CartError> {
        let labels: Vec<f64> = index.iter().map(|i| self.y[*i]).collect();
        let score = self.splitter.get_criterion().score(&labels);
        if self.is_terminal(&labels, score, depth) {
            return Ok(self.make_leaf(&labels, depth));
        }

        let n_samples = index.len();
        let split = self
            .splitter
            .best_split(self.data, self.y, &mut index, score)
            .ok_or(CartError::NoValidSplit { depth, n_samples })?;
        if self.params.debug {
            debug!(
                "depth {}: split feature {} < {}, gain {:.6}, {} samples",
                depth, split.split_feature, split.split_value, split.split_gain, n_samples
            );
        }

        let (left_index, right_index) = pivot_on_split(self.data, index, &split);
        let (left, right) = if self.parallel && n_samples >= PARALLEL_MIN_SAMPLES {
            let (left, right) = rayon::join(
                || self.build_node(left_index, depth + 1),
                || self.build_node(right_index, depth + 1),
            );
            (left?, right?)
        } else {
            let left = self.build_node(left_index, depth + 1)?;
            (left, self.build_node(right_index, depth + 1)?)
        };

        Ok(Node::Internal {
            split_feature: split.split_feature,
            split_value: split.split_value,
            split_gain: split.split_gain,
            n_samples,
            depth,
            left: Box::new(left),
            right: Box::new(right),
        })
    }
}

impl Tree {
    /// Grow a tree on the rows in `index`.
    ///
    /// * `data` - Training features.
    /// * `y` - Training labels, one per row of `data`.
    /// * `index` - The rows to grow the tree on.
    /// * `splitter` - Split search, carries the criterion.
    /// * `classes` - Sorted class universe, empty for regression.
    /// * `params` - Stopping rules.
    /// * `pool` - When given, large subtrees are grown in parallel on it.
    pub fn fit<S: Splitter>(
        data: &Matrix<f64>,
        y: &[f64],
        index: Vec<usize>,
        splitter: &S,
        classes: &[f64],
        params: &TreeParams,
        pool: Option<&ThreadPool>,
    ) -> Result<Self, CartError> {
        let builder = TreeBuilder {
            data,
            y,
            splitter,
            classes,
            params,
            parallel: pool.is_some(),
        };
        let root = match pool {
            Some(pool) => pool.install(|| builder.build_node(index, 0))?,
            None => builder.build_node(index, 0)?,
        };
        Ok(Tree::from_root(root))
    }

    pub fn from_root(root: Node) -> Self {
        let (depth, n_leaves, n_nodes) = {
            let (mut depth, mut n_leaves, mut n_nodes) = (0, 0, 0);
            let mut stack = vec![&root];
            while let Some(node) = stack.pop() {
                n_nodes += 1;
                depth = max(depth, node.depth());
                match node {
                    Node::Leaf { .. } => n_leaves += 1,
                    Node::Internal { left, right, .. } => {
                        stack.push(right.as_ref());
                        stack.push(left.as_ref());
                    }
                }
            }
            (depth, n_leaves, n_nodes)
        };
        Tree {
            root,
            depth,
            n_leaves,
            n_nodes,
        }
    }

    fn calc_feature_node_stats<F>(&self, calc_stat: &F, node: &Node, stats: &mut HashMap<usize, (f64, usize)>)
    where
        F: Fn(&Node) -> f64,
    {
        if let Node::Internal {
            split_feature,
            left,
            right,
            ..
        } = node
        {
            stats
                .entry(*split_feature)
                .and_modify(|(v, c)| {
                    *v += calc_stat(node);
                    *c += 1;
                })
                .or_insert((calc_stat(node), 1));
            self.calc_feature_node_stats(calc_stat, left, stats);
            self.calc_feature_node_stats(calc_stat, right, stats);
        }
    }

    fn get_node_stats<F>(&self, calc_stat: &F, stats: &mut HashMap<usize, (f64, usize)>)
    where
        F: Fn(&Node) -> f64,
    {
        self.calc_feature_node_stats(calc_stat, &self.root, stats);
    }

    pub fn calculate_importance_weight(&self, stats: &mut HashMap<usize, (f64, usize)>) {
        self.get_node_stats(&|_: &Node| 1., stats);
    }

    /// Impurity reduction weighted by the rows reaching the node.
    pub fn calculate_importance_gain(&self, stats: &mut HashMap<usize, (f64, usize)>) {
        self.get_node_stats(
            &|n: &Node| match n {
                Node::Internal {
                    split_gain, n_samples, ..
                } => split_gain * *n_samples as f64,
                Node::Leaf { .. } => 0.,
            },
            stats,
        );
    }

    pub fn calculate_importance_cover(&self, stats: &mut HashMap<usize, (f64, usize)>) {
        self.get_node_stats(&|n: &Node| n.n_samples() as f64, stats);
    }
}

impl Display for Tree {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut print_buffer: Vec<&Node> = vec![&self.root];
        let mut r = String::new();
        while let Some(node) = print_buffer.pop() {
            r += format!("{}{}\n", "      ".repeat(node.depth()).as_str(), node).as_str();
            if let Node::Internal { left, right, .. } = node {
                print_buffer.push(right);
                print_buffer.push(left);
            }
        }
        write!(f, "{}", r)
    }
}

// Unit-testing
#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::Criterion;
    use crate::splitter::{ExhaustiveSplitter, LabelAdjacencySplitter};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn params(max_depth: Option<usize>, min_samples_split: usize) -> TreeParams {
        TreeParams {
            max_depth,
            min_samples_split,
            debug: false,
        }
    }

    fn random_data(seed: u64, rows: usize, cols: usize) -> (Vec<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let data_vec: Vec<f64> = (0..rows * cols).map(|_| rng.gen::<f64>() * 20.).collect();
        let y: Vec<f64> = (0..rows)
            .map(|i| {
                let s = data_vec[i] + data_vec[rows + i];
                if s > 20. {
                    1.
                } else if rng.gen_bool(0.1) {
                    2.
                } else {
                    0.
                }
            })
            .collect();
        (data_vec, y)
    }

    fn collect_leaves<'a>(node: &'a Node, leaves: &mut Vec<&'a Node>) {
        match node {
            Node::Leaf { .. } => leaves.push(node),
            Node::Internal { left, right, .. } => {
                collect_leaves(left, leaves);
                collect_leaves(right, leaves);
            }
        }
    }

    #[test]
    fn test_tree_fit_classification() {
        let data_vec = vec![0., 1., 2., 3.];
        let y = vec![0., 0., 1., 1.];
        let data = Matrix::new(&data_vec, 4, 1);
        let splitter = ExhaustiveSplitter::new(Criterion::Gini);
        let tree = Tree::fit(&data, &y, data.index.to_owned(), &splitter, &[0., 1.], &params(None, 2), None).unwrap();
        println!("{}", tree);
        match &tree.root {
            Node::Internal {
                split_feature,
                split_value,
                left,
                right,
                ..
            } => {
                assert_eq!((*split_feature, *split_value), (0, 2.));
                assert!(left.is_leaf() && right.is_leaf());
            }
            Node::Leaf { .. } => panic!("root should be split"),
        }
        assert_eq!(tree.depth, 1);
        assert_eq!(tree.n_leaves, 2);
        assert_eq!(tree.n_nodes, 3);
    }

    #[test]
    fn test_tree_fit_regression() {
        let data_vec = vec![1., 2., 3., 4.];
        let y = vec![10., 10., 20., 20.];
        let data = Matrix::new(&data_vec, 4, 1);
        let splitter = LabelAdjacencySplitter::new(Criterion::Variance);
        let tree = Tree::fit(&data, &y, data.index.to_owned(), &splitter, &[], &params(None, 2), None).unwrap();
        if let Node::Internal {
            split_value,
            left,
            right,
            ..
        } = &tree.root
        {
            assert_eq!(*split_value, 3.);
            assert!(matches!(**left, Node::Leaf { value: LeafValue::Value(v), .. } if v == 10.));
            assert!(matches!(**right, Node::Leaf { value: LeafValue::Value(v), .. } if v == 20.));
        } else {
            panic!("root should be split");
        }
    }

    #[test]
    fn test_min_samples_split_makes_leaf() {
        let data_vec = vec![0., 1., 2., 3.];
        let y = vec![0., 1., 0., 1.];
        let data = Matrix::new(&data_vec, 4, 1);
        let splitter = ExhaustiveSplitter::new(Criterion::Gini);
        let tree = Tree::fit(&data, &y, data.index.to_owned(), &splitter, &[0., 1.], &params(None, 4), None).unwrap();
        assert_eq!(
            tree.root,
            Node::Leaf {
                value: LeafValue::Probabilities(vec![0.5, 0.5]),
                n_samples: 4,
                depth: 0,
            }
        );
    }

    #[test]
    fn test_max_depth_bounds_tree() {
        let (data_vec, y) = random_data(0, 200, 3);
        let data = Matrix::new(&data_vec, 200, 3);
        let splitter = ExhaustiveSplitter::new(Criterion::Entropy);
        for max_depth in 1..5 {
            let tree = Tree::fit(
                &data,
                &y,
                data.index.to_owned(),
                &splitter,
                &[0., 1., 2.],
                &params(Some(max_depth), 2),
                None,
            )
            .unwrap();
            assert!(tree.depth <= max_depth);
            assert!(tree.n_leaves <= 2_usize.pow(max_depth as u32));
        }
    }

    #[test]
    fn test_leaf_probabilities_sum_to_one() {
        let (data_vec, y) = random_data(1, 300, 3);
        let data = Matrix::new(&data_vec, 300, 3);
        let classes = vec![0., 1., 2.];
        for criterion in [Criterion::Gini, Criterion::Entropy] {
            let splitter = ExhaustiveSplitter::new(criterion);
            let tree = Tree::fit(&data, &y, data.index.to_owned(), &splitter, &classes, &params(None, 2), None).unwrap();
            let mut leaves = Vec::new();
            collect_leaves(&tree.root, &mut leaves);
            assert_eq!(leaves.len(), tree.n_leaves);
            for leaf in leaves {
                if let Node::Leaf {
                    value: LeafValue::Probabilities(p),
                    ..
                } = leaf
                {
                    assert_eq!(p.len(), classes.len());
                    assert_relative_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 2e-3);
                } else {
                    panic!("classification leaves hold probabilities");
                }
            }
        }
    }

    #[test]
    fn test_regression_leaves_within_label_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let rows = 150;
        let data_vec: Vec<f64> = (0..rows * 2).map(|_| rng.gen::<f64>()).collect();
        let y: Vec<f64> = (0..rows).map(|i| 3. * data_vec[i] + rng.gen::<f64>()).collect();
        let data = Matrix::new(&data_vec, rows, 2);
        for criterion in [Criterion::Variance, Criterion::MadMedian] {
            let splitter = ExhaustiveSplitter::new(criterion);
            let tree = Tree::fit(&data, &y, data.index.to_owned(), &splitter, &[], &params(Some(4), 5), None).unwrap();
            // Every row reaches exactly one leaf, check each leaf against
            // the labels of the rows that reach it.
            let mut reached: HashMap<usize, Vec<f64>> = HashMap::new();
            let mut leaves = Vec::new();
            collect_leaves(&tree.root, &mut leaves);
            for i in 0..rows {
                let leaf = tree.predict_row_leaf(&data.get_row(i));
                let pos = leaves.iter().position(|l| std::ptr::eq(*l, leaf)).unwrap();
                reached.entry(pos).or_default().push(y[i]);
            }
            for (pos, labels) in reached {
                if let Node::Leaf {
                    value: LeafValue::Value(v),
                    n_samples,
                    ..
                } = leaves[pos]
                {
                    let lo = labels.iter().copied().fold(f64::INFINITY, f64::min);
                    let hi = labels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    assert_eq!(*n_samples, labels.len());
                    assert!(lo <= *v && *v <= hi);
                }
            }
        }
    }

    #[test]
    fn test_identical_rows() {
        let data_vec = vec![1., 1., 1., 5., 5., 5.];
        let y = vec![0., 1., 0.];
        let data = Matrix::new(&data_vec, 3, 2);
        let splitter = ExhaustiveSplitter::new(Criterion::Gini);
        let classes = [0., 1.];

        let tree = Tree::fit(&data, &y, data.index.to_owned(), &splitter, &classes, &params(None, 3), None).unwrap();
        assert!(tree.root.is_leaf());
        let tree = Tree::fit(&data, &y, data.index.to_owned(), &splitter, &classes, &params(Some(1), 2), None);
        assert_eq!(
            tree.unwrap_err(),
            CartError::NoValidSplit {
                depth: 0,
                n_samples: 3
            }
        );
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (data_vec, y) = random_data(3, 1500, 3);
        let data = Matrix::new(&data_vec, 1500, 3);
        let splitter = ExhaustiveSplitter::new(Criterion::Gini);
        let classes = [0., 1., 2.];
        let p = params(Some(4), 2);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let sequential = Tree::fit(&data, &y, data.index.to_owned(), &splitter, &classes, &p, None).unwrap();
        let parallel = Tree::fit(&data, &y, data.index.to_owned(), &splitter, &classes, &p, Some(&pool)).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_importance() {
        let data_vec = vec![0., 1., 2., 3., 0., 0., 0., 0.];
        let y = vec![0., 0., 1., 1.];
        let data = Matrix::new(&data_vec, 4, 2);
        let splitter = ExhaustiveSplitter::new(Criterion::Gini);
        let tree = Tree::fit(&data, &y, data.index.to_owned(), &splitter, &[0., 1.], &params(None, 2), None).unwrap();
        let mut stats = HashMap::new();
        tree.calculate_importance_weight(&mut stats);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[&0], (1., 1));
        let mut stats = HashMap::new();
        tree.calculate_importance_gain(&mut stats);
        assert_relative_eq!(stats[&0].0, 2.0, epsilon = 1e-12);
        let mut stats = HashMap::new();
        tree.calculate_importance_cover(&mut stats);
        assert_eq!(stats[&0], (4., 1));
    }

    #[test]
    fn test_tree_display() {
        let data_vec = vec![0., 1., 2., 3.];
        let y = vec![0., 0., 1., 1.];
        let data = Matrix::new(&data_vec, 4, 1);
        let splitter = ExhaustiveSplitter::new(Criterion::Gini);
        let tree = Tree::fit(&data, &y, data.index.to_owned(), &splitter, &[0., 1.], &params(None, 2), None).unwrap();
        let expected = "[0 < 2] gain=0.5,samples=4\n      leaf=[1.0000, 0.0000],samples=2\n      leaf=[0.0000, 1.0000],samples=2\n";
        assert_eq!(tree.to_string(), expected);
    }
}
