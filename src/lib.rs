// Modules
pub mod constants;
pub mod criterion;
pub mod data;
pub mod decision_tree;
pub mod errors;
pub mod node;
pub mod splitter;
pub mod tree;
pub mod utils;

// Individual classes, and functions
pub use criterion::{Criterion, TaskType};
pub use data::Matrix;
pub use decision_tree::{DecisionTree, ImportanceMethod};
pub use errors::CartError;
pub use splitter::SplitSearch;
