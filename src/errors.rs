//! Errors
//!
//! Custom error types used throughout the `perpetual_cart` crate.
use thiserror::Error;

/// Errors that can occur while fitting or using a decision tree.
#[derive(Debug, Error, PartialEq)]
pub enum CartError {
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// No rows or no columns were provided.
    #[error("Training data must contain at least one row and one feature.")]
    EmptyData,
    /// Number of rows and number of labels differ.
    #[error("Data has {0} rows, but {1} labels were provided.")]
    ShapeMismatch(usize, usize),
    /// A row record has a different number of features than the first row.
    #[error("Row {row} has {found} features, but the first row has {expected}.")]
    RaggedRow { row: usize, expected: usize, found: usize },
    /// NaN value found in the feature data.
    #[error("A NaN value was found in row {row}, feature {feature}.")]
    NaNValueFound { row: usize, feature: usize },
    /// NaN value found in the labels.
    #[error("A NaN label was found in row {0}.")]
    NaNLabelFound(usize),
    /// Prediction requested before the model was fit.
    #[error("The decision tree has not been fit yet.")]
    NotFitted,
    /// Class probabilities requested from a regression tree.
    #[error("predict_proba is only available for classification criteria.")]
    ProbaNotSupported,
    /// Column count at prediction time differs from fit time.
    #[error("The model was fit with {0} features, but {1} were provided.")]
    FeatureMismatch(usize, usize),
    /// A node that should have been split has no two sided partition.
    #[error("No valid split found at depth {depth} for a node with {n_samples} samples.")]
    NoValidSplit { depth: usize, n_samples: usize },
    /// Unable to write model to file.
    #[error("Unable to write model to file: {0}")]
    UnableToWrite(String),
    /// Unable to read model from file.
    #[error("Unable to read model from a file {0}")]
    UnableToRead(String),
}
