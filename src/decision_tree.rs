use crate::constants::DEFAULT_MIN_SAMPLES_SPLIT;
use crate::criterion::{Criterion, TaskType};
use crate::data::Matrix;
use crate::errors::CartError;
use crate::node::{LeafValue, Node};
use crate::splitter::{ExhaustiveSplitter, LabelAdjacencySplitter, SplitSearch, Splitter};
use crate::tree::{Tree, TreeParams};
use crate::utils::validate_positive_parameter;
use hashbrown::HashMap;
use log::info;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Instant;

type ImportanceFn = fn(&Tree, &mut HashMap<usize, (f64, usize)>);

/// Method to calculate variable importance.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub enum ImportanceMethod {
    /// The number of times a feature is used to split the data.
    Weight,
    /// The average weighted impurity reduction across all splits the feature is used in.
    Gain,
    /// The average number of rows across all splits the feature is used in.
    Cover,
    /// The total weighted impurity reduction across all splits the feature is used in.
    TotalGain,
    /// The total number of rows across all splits the feature is used in.
    TotalCover,
}

/// Decision Tree object
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DecisionTree {
    /// Impurity measure used to choose splits. "gini" and "entropy" grow
    /// a classification tree, "variance" and "mad_median" a regression tree.
    pub criterion: Criterion,
    /// Depth at which nodes are always turned into leaves. `None` grows
    /// until another stopping rule applies.
    #[serde(default)]
    pub max_depth: Option<usize>,
    /// Nodes with this many rows or fewer are turned into leaves.
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    /// How candidate thresholds are enumerated.
    #[serde(default = "default_split_search")]
    pub split_search: SplitSearch,
    /// Number of threads to use when `parallel` is set.
    pub num_threads: Option<usize>,
    /// Grow large subtrees and predict rows in parallel.
    #[serde(default)]
    pub parallel: bool,
    /// Log every node as it is created. Never changes the learned tree.
    #[serde(default)]
    pub debug: bool,
    // Members set by fit, and not parameters set by the user.
    classes: Vec<f64>,
    n_features: usize,
    tree: Option<Tree>,
}

fn default_min_samples_split() -> usize {
    DEFAULT_MIN_SAMPLES_SPLIT
}
fn default_split_search() -> SplitSearch {
    SplitSearch::Exhaustive
}

impl Default for DecisionTree {
    fn default() -> Self {
        DecisionTree {
            criterion: Criterion::Gini,
            max_depth: None,
            min_samples_split: DEFAULT_MIN_SAMPLES_SPLIT,
            split_search: SplitSearch::Exhaustive,
            num_threads: None,
            parallel: false,
            debug: false,
            classes: Vec::new(),
            n_features: 0,
            tree: None,
        }
    }
}

impl DecisionTree {
    /// Decision Tree object
    ///
    /// * `criterion` - Impurity measure used to choose splits, it also sets
    ///     whether the tree is a classifier or a regressor.
    /// * `max_depth` - Depth at which nodes are always turned into leaves, `None` for unbounded.
    /// * `min_samples_split` - Nodes with this many rows or fewer are turned into leaves.
    /// * `split_search` - How candidate thresholds are enumerated.
    /// * `num_threads` - Number of threads to use when `parallel` is set.
    /// * `parallel` - Grow large subtrees and predict rows in parallel.
    /// * `debug` - Log every node as it is created.
    pub fn new(
        criterion: Criterion,
        max_depth: Option<usize>,
        min_samples_split: usize,
        split_search: SplitSearch,
        num_threads: Option<usize>,
        parallel: bool,
        debug: bool,
    ) -> Result<Self, CartError> {
        let tree = DecisionTree {
            criterion,
            max_depth,
            min_samples_split,
            split_search,
            num_threads,
            parallel,
            debug,
            ..Default::default()
        };

        tree.validate_parameters()?;

        Ok(tree)
    }

    /// Default decision tree using the criterion with the given name.
    ///
    /// * `name` - One of "gini", "entropy", "variance" or "mad_median".
    pub fn from_criterion_name(name: &str) -> Result<Self, CartError> {
        Ok(Self::default().set_criterion(name.parse()?))
    }

    pub fn validate_parameters(&self) -> Result<(), CartError> {
        if let Some(max_depth) = self.max_depth {
            validate_positive_parameter(max_depth, "max_depth")?;
        }
        if let Some(num_threads) = self.num_threads {
            validate_positive_parameter(num_threads, "num_threads")?;
        }
        validate_positive_parameter(self.min_samples_split, "min_samples_split")
    }

    /// Drop everything learned by a previous fit.
    pub fn reset(&mut self) {
        self.classes = Vec::new();
        self.n_features = 0;
        self.tree = None;
    }

    /// Fit the decision tree on a provided dataset.
    ///
    /// Any previous fit is discarded first. If fitting fails the tree is left unfit.
    ///
    /// * `data` - Column major matrix of features.
    /// * `y` - Labels, one per row of `data`.
    pub fn fit(&mut self, data: &Matrix<f64>, y: &[f64]) -> Result<&mut Self, CartError> {
        self.reset();
        self.validate_parameters()?;
        validate_training_data(data, y)?;

        let start = Instant::now();
        let classes = match self.task() {
            TaskType::Classification => class_universe(y),
            TaskType::Regression => Vec::new(),
        };
        let pool = if self.parallel { Some(self.build_pool()?) } else { None };

        let tree = match self.split_search {
            SplitSearch::Exhaustive => {
                let splitter = ExhaustiveSplitter::new(self.criterion);
                self.fit_tree(data, y, &splitter, &classes, pool.as_ref())?
            }
            SplitSearch::LabelAdjacency => {
                let splitter = LabelAdjacencySplitter::new(self.criterion);
                self.fit_tree(data, y, &splitter, &classes, pool.as_ref())?
            }
        };

        info!(
            "Fit {} tree on {} rows and {} features: depth {}, {} leaves, {:.3}s.",
            self.criterion,
            data.rows,
            data.cols,
            tree.depth,
            tree.n_leaves,
            start.elapsed().as_secs_f32()
        );

        self.classes = classes;
        self.n_features = data.cols;
        self.tree = Some(tree);
        Ok(self)
    }

    fn fit_tree<T: Splitter>(
        &self,
        data: &Matrix<f64>,
        y: &[f64],
        splitter: &T,
        classes: &[f64],
        pool: Option<&ThreadPool>,
    ) -> Result<Tree, CartError> {
        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            debug: self.debug,
        };
        Tree::fit(data, y, data.index.to_owned(), splitter, classes, &params, pool)
    }

    fn build_pool(&self) -> Result<ThreadPool, CartError> {
        let num_threads = match self.num_threads {
            Some(num_threads) => num_threads,
            None => std::thread::available_parallelism().map_or(1, |n| n.get()),
        };
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| CartError::InvalidParameter("num_threads".to_string(), "a usable thread count".to_string(), e.to_string()))
    }

    fn fitted_tree(&self, data: &Matrix<f64>) -> Result<&Tree, CartError> {
        let tree = self.tree.as_ref().ok_or(CartError::NotFitted)?;
        if data.cols != self.n_features {
            return Err(CartError::FeatureMismatch(self.n_features, data.cols));
        }
        Ok(tree)
    }

    /// Generate predictions on data using the decision tree. Class labels for
    /// classification, values for regression.
    ///
    /// * `data` - Column major matrix with the columns seen at fit time.
    pub fn predict(&self, data: &Matrix<f64>) -> Result<Vec<f64>, CartError> {
        let tree = self.fitted_tree(data)?;
        Ok(tree.predict(data, &self.classes, self.parallel))
    }

    /// Generate class probabilities on data, ordered as `classes()`.
    ///
    /// * `data` - Column major matrix with the columns seen at fit time.
    pub fn predict_proba(&self, data: &Matrix<f64>) -> Result<Vec<Vec<f64>>, CartError> {
        if self.task() == TaskType::Regression {
            return Err(CartError::ProbaNotSupported);
        }
        let tree = self.fitted_tree(data)?;
        tree.predict_proba(data, self.parallel).ok_or(CartError::ProbaNotSupported)
    }

    pub fn task(&self) -> TaskType {
        self.criterion.task()
    }

    pub fn is_fitted(&self) -> bool {
        self.tree.is_some()
    }

    /// Sorted distinct labels seen at fit time, empty for regression.
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn get_tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    /// Calculate feature importance measure for the features
    /// in the model.
    /// - `method`: variable importance method to use.
    /// - `normalize`: scale the values to sum to one.
    pub fn calculate_feature_importance(
        &self,
        method: ImportanceMethod,
        normalize: bool,
    ) -> Result<HashMap<usize, f64>, CartError> {
        let tree = self.tree.as_ref().ok_or(CartError::NotFitted)?;
        let (average, importance_fn): (bool, ImportanceFn) = match method {
            ImportanceMethod::Weight => (false, Tree::calculate_importance_weight),
            ImportanceMethod::Gain => (true, Tree::calculate_importance_gain),
            ImportanceMethod::TotalGain => (false, Tree::calculate_importance_gain),
            ImportanceMethod::Cover => (true, Tree::calculate_importance_cover),
            ImportanceMethod::TotalCover => (false, Tree::calculate_importance_cover),
        };
        let mut stats = HashMap::new();
        importance_fn(tree, &mut stats);

        let importance = stats
            .iter()
            .map(|(k, (v, c))| if average { (*k, v / (*c as f64)) } else { (*k, *v) })
            .collect::<HashMap<usize, f64>>();

        if normalize {
            // To make deterministic, sort values and then sum.
            let mut values: Vec<f64> = importance.values().copied().collect();
            values.sort_by(|a, b| a.total_cmp(b));
            let total: f64 = values.iter().sum();
            if total == 0.0 {
                return Ok(importance);
            }
            Ok(importance.iter().map(|(k, v)| (*k, v / total)).collect())
        } else {
            Ok(importance)
        }
    }

    /// Save a decision tree as a json object to a file.
    ///
    /// * `path` - Path to save the model.
    pub fn save_model(&self, path: &str) -> Result<(), CartError> {
        let model = self.json_dump()?;
        match fs::write(path, model) {
            Err(e) => Err(CartError::UnableToWrite(e.to_string())),
            Ok(_) => Ok(()),
        }
    }

    /// Dump a decision tree as a json object
    pub fn json_dump(&self) -> Result<String, CartError> {
        match serde_json::to_string(self) {
            Ok(s) => Ok(s),
            Err(e) => Err(CartError::UnableToWrite(e.to_string())),
        }
    }

    /// Load a decision tree from Json string
    ///
    /// * `json_str` - String object, which can be serialized to json.
    pub fn from_json(json_str: &str) -> Result<Self, CartError> {
        let model = serde_json::from_str::<DecisionTree>(json_str);
        match model {
            Ok(m) => {
                m.validate_fitted_state()?;
                Ok(m)
            }
            Err(e) => Err(CartError::UnableToRead(e.to_string())),
        }
    }

    /// Check that a loaded tree only splits on known features and that its
    /// leaves match the task and the class universe.
    fn validate_fitted_state(&self) -> Result<(), CartError> {
        self.validate_parameters()
            .map_err(|e| CartError::UnableToRead(e.to_string()))?;
        let tree = match &self.tree {
            Some(tree) => tree,
            None => return Ok(()),
        };
        let classification = self.task() == TaskType::Classification;
        if classification && self.classes.is_empty() {
            return Err(CartError::UnableToRead("classification model without classes".to_string()));
        }
        let mut stack = vec![&tree.root];
        while let Some(node) = stack.pop() {
            match node {
                Node::Internal {
                    split_feature,
                    left,
                    right,
                    ..
                } => {
                    if *split_feature >= self.n_features {
                        return Err(CartError::UnableToRead(format!(
                            "split on feature {} in a model fit with {} features",
                            split_feature, self.n_features
                        )));
                    }
                    stack.push(left.as_ref());
                    stack.push(right.as_ref());
                }
                Node::Leaf { value, .. } => {
                    let valid = match value {
                        LeafValue::Probabilities(p) => classification && p.len() == self.classes.len(),
                        LeafValue::Value(_) => !classification,
                    };
                    if !valid {
                        return Err(CartError::UnableToRead(format!(
                            "leaf {:?} does not match a {} model with {} classes",
                            value,
                            self.criterion,
                            self.classes.len()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Load a decision tree from a path to a json model object.
    ///
    /// * `path` - Path to load the model from.
    pub fn load_model(path: &str) -> Result<Self, CartError> {
        let json_str = match fs::read_to_string(path) {
            Ok(s) => Ok(s),
            Err(e) => Err(CartError::UnableToRead(e.to_string())),
        }?;
        Self::from_json(&json_str)
    }

    // Set methods for paramters

    /// Set the criterion on the decision tree.
    /// * `criterion` - Impurity measure, also sets the task type.
    pub fn set_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the maximum depth on the decision tree.
    /// * `max_depth` - Depth at which nodes become leaves, `None` for unbounded.
    pub fn set_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples to split a node.
    /// * `min_samples_split` - Nodes with this many rows or fewer become leaves.
    pub fn set_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the threshold search on the decision tree.
    /// * `split_search` - How candidate thresholds are enumerated.
    pub fn set_split_search(mut self, split_search: SplitSearch) -> Self {
        self.split_search = split_search;
        self
    }

    /// Set the number of threads on the decision tree.
    /// * `num_threads` - Set the number of threads to be used when parallel.
    pub fn set_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Set parallel fitting and prediction.
    pub fn set_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set node level debug logging.
    pub fn set_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

fn validate_training_data(data: &Matrix<f64>, y: &[f64]) -> Result<(), CartError> {
    if data.rows == 0 || data.cols == 0 {
        return Err(CartError::EmptyData);
    }
    if data.rows != y.len() {
        return Err(CartError::ShapeMismatch(data.rows, y.len()));
    }
    if let Some(row) = y.iter().position(|v| v.is_nan()) {
        return Err(CartError::NaNLabelFound(row));
    }
    for feature in 0..data.cols {
        if let Some(row) = data.get_col(feature).iter().position(|v| v.is_nan()) {
            return Err(CartError::NaNValueFound { row, feature });
        }
    }
    Ok(())
}

/// Sorted distinct labels.
fn class_universe(y: &[f64]) -> Vec<f64> {
    let mut classes = y.to_vec();
    classes.sort_unstable_by(|a, b| a.total_cmp(b));
    classes.dedup();
    classes
}
