/// Decimal places kept for leaf class probabilities.
pub const PROBA_PRECISION: i32 = 3;
/// Nodes with fewer samples are always built on the current thread.
pub const PARALLEL_MIN_SAMPLES: usize = 1024;
pub const DEFAULT_MIN_SAMPLES_SPLIT: usize = 2;
