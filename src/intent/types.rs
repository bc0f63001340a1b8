use crate::capability::CapabilityId;

/// Classifier guess: which capability a phrase most likely belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntentPrediction {
    pub capability: CapabilityId,
    /// Cosine similarity, 0.0 - 1.0.
    pub confidence: f32,
}

/// Maps a phrase to the capability that most likely handles it.
pub trait IntentClassifier: Send + Sync {
    fn predict(&self, text: &str) -> Option<IntentPrediction>;
}

/// Classifier that never guesses; used when no samples are registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullClassifier;

impl IntentClassifier for NullClassifier {
    fn predict(&self, _text: &str) -> Option<IntentPrediction> {
        None
    }
}
