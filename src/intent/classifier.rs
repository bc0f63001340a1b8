//! Local intent classifier trained from capability sample phrases.
//!
//! Character n-grams (1-3, padded at word boundaries) weighted by smoothed
//! TF-IDF. Each capability is represented by the normalized centroid of its
//! sample vectors; a phrase is assigned to the closest centroid by cosine
//! similarity.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::types::{IntentClassifier, IntentPrediction};
use crate::capability::{CapabilityId, CapabilityRegistry};

const MIN_NGRAM: usize = 1;
const MAX_NGRAM: usize = 3;

type SparseVec = HashMap<String, f32>;

pub struct NgramClassifier {
    idf: HashMap<String, f32>,
    centroids: Vec<(CapabilityId, SparseVec)>,
    threshold: f32,
}

impl NgramClassifier {
    /// Train on every capability that declares samples.
    ///
    /// Needs at least two classes to be meaningful; with fewer the classifier
    /// stays untrained and predicts nothing.
    pub fn train(registry: &CapabilityRegistry, threshold: f32) -> Self {
        let mut classes: BTreeMap<CapabilityId, Vec<String>> = BTreeMap::new();
        for (id, capability) in registry.iter() {
            let mut samples: Vec<String> = capability
                .samples()
                .iter()
                .map(|s| preprocess(s))
                .filter(|s| !s.is_empty())
                .collect();
            samples.sort();
            samples.dedup();
            if !samples.is_empty() {
                classes.insert(id, samples);
            }
        }

        let mut classifier = Self {
            idf: HashMap::new(),
            centroids: Vec::new(),
            threshold,
        };

        if classes.len() < 2 {
            warn!("Intent: fewer than 2 capabilities with samples, classifier disabled");
            return classifier;
        }

        // Document frequency over individual samples.
        let docs: Vec<(CapabilityId, HashMap<String, f32>)> = classes
            .iter()
            .flat_map(|(id, samples)| samples.iter().map(move |s| (*id, term_counts(s))))
            .collect();
        let mut df: HashMap<String, usize> = HashMap::new();
        for (_, counts) in &docs {
            for gram in counts.keys() {
                *df.entry(gram.clone()).or_default() += 1;
            }
        }
        let n_docs = docs.len() as f32;
        classifier.idf = df
            .into_iter()
            .map(|(gram, freq)| (gram, ((1.0 + n_docs) / (1.0 + freq as f32)).ln() + 1.0))
            .collect();

        for (id, samples) in &classes {
            let mut centroid = SparseVec::new();
            for (_, counts) in docs.iter().filter(|(doc_id, _)| doc_id == id) {
                for (gram, weight) in classifier.weigh(counts) {
                    *centroid.entry(gram).or_default() += weight;
                }
            }
            for weight in centroid.values_mut() {
                *weight /= samples.len() as f32;
            }
            normalize(&mut centroid);
            classifier.centroids.push((*id, centroid));
        }

        info!(
            "Intent: classifier trained, {} classes, {} samples, {} features",
            classifier.centroids.len(),
            docs.len(),
            classifier.idf.len()
        );
        classifier
    }

    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    /// TF-IDF weights, L2-normalized. Grams outside the vocabulary are dropped.
    fn weigh(&self, counts: &HashMap<String, f32>) -> SparseVec {
        let mut vector: SparseVec = counts
            .iter()
            .filter_map(|(gram, tf)| self.idf.get(gram).map(|idf| (gram.clone(), tf * idf)))
            .collect();
        normalize(&mut vector);
        vector
    }
}

impl IntentClassifier for NgramClassifier {
    fn predict(&self, text: &str) -> Option<IntentPrediction> {
        if !self.is_trained() {
            return None;
        }
        let clean = preprocess(text);
        if clean.is_empty() {
            return None;
        }

        let query = self.weigh(&term_counts(&clean));
        if query.is_empty() {
            return None;
        }

        let (capability, confidence) = self
            .centroids
            .iter()
            .map(|(id, centroid)| (*id, dot(&query, centroid)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;

        if confidence < self.threshold {
            debug!("Intent: low confidence {:.2} < {:.2} for '{}'", confidence, self.threshold, clean);
            return None;
        }
        debug!("Intent: '{}' -> {} ({:.2})", clean, capability, confidence);
        Some(IntentPrediction { capability, confidence })
    }
}

/// Lowercase, fold `ё` into `е`, drop punctuation.
pub fn preprocess(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c == 'ё' { 'е' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Word-boundary character n-gram counts.
fn term_counts(text: &str) -> HashMap<String, f32> {
    let mut counts = HashMap::new();
    for word in text.split_whitespace() {
        let padded: Vec<char> = format!(" {} ", word).chars().collect();
        for n in MIN_NGRAM..=MAX_NGRAM {
            if n > padded.len() {
                break;
            }
            for window in padded.windows(n) {
                *counts.entry(window.iter().collect::<String>()).or_insert(0.0) += 1.0;
            }
        }
    }
    counts
}

fn normalize(vector: &mut SparseVec) {
    let norm = vector.values().map(|w| w * w).sum::<f32>().sqrt();
    if norm > 0.0 {
        for weight in vector.values_mut() {
            *weight /= norm;
        }
    }
}

fn dot(a: &SparseVec, b: &SparseVec) -> f32 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(gram, w)| large.get(gram).map(|v| w * v))
        .sum()
}
