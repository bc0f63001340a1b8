pub mod classifier;
pub mod types;

pub use classifier::NgramClassifier;
pub use types::{IntentClassifier, IntentPrediction, NullClassifier};
