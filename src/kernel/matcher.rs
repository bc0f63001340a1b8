use lru::LruCache;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

use super::fuzz;
use crate::config::BotConfig;

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Lead-in words need at least this confidence to be skipped.
const PREFIX_MIN_SCORE: u8 = 85;
/// Phonetic table entries below this are ignored.
const PHONETIC_MIN_SCORE: u8 = 70;
/// Trigger names are looked for in at most this many leading words.
const MAX_PROBE_WORDS: usize = 3;
/// Scores at or below this are not worth a debug line.
const DEBUG_SCORE_FLOOR: u8 = 40;

/// The assistant's name plus the tolerance data used to recognize it.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub name: String,
    /// Exact recognizer outputs known to mean the name, with confidence.
    pub phonetic: BTreeMap<String, u8>,
    /// Lead-in words ("hey", "listen") that may precede the name.
    pub prefixes: BTreeMap<String, u8>,
    pub threshold: u8,
}

impl Trigger {
    pub fn new(name: impl Into<String>, threshold: u8) -> Self {
        Self {
            name: name.into().to_lowercase(),
            phonetic: BTreeMap::new(),
            prefixes: BTreeMap::new(),
            threshold,
        }
    }

    pub fn with_phonetic(mut self, variant: &str, confidence: u8) -> Self {
        self.phonetic.insert(variant.to_lowercase(), confidence);
        self
    }

    pub fn with_prefix(mut self, word: &str, confidence: u8) -> Self {
        self.prefixes.insert(word.to_lowercase(), confidence);
        self
    }

    pub fn from_config(cfg: &BotConfig) -> Self {
        let mut trigger = Self::new(&cfg.name, cfg.match_threshold);
        for (variant, score) in &cfg.phonetic {
            trigger = trigger.with_phonetic(variant, *score);
        }
        for (word, score) in &cfg.prefixes {
            trigger = trigger.with_prefix(word, *score);
        }
        trigger
    }
}

/// Outcome of `best_match`. `variant` is only set when the score reached the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestMatch<'a> {
    pub variant: Option<&'a str>,
    pub score: u8,
}

impl<'a> BestMatch<'a> {
    pub const NONE: Self = BestMatch { variant: None, score: 0 };
}

/// A confirmed trigger at the head of a phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerHit {
    /// The words that were recognized as the name.
    pub matched: String,
    /// Phrase with the prefix and name removed.
    pub remaining: String,
    pub score: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScoreKey {
    text: String,
    variant: String,
    partial: bool,
}

/// Fuzzy trigger scoring with a bounded score cache.
///
/// Shared between the activation window and the dispatcher, so the cache sits
/// behind a mutex. Scores are pure, so a racing miss only costs a recompute.
pub struct TriggerMatcher {
    cache: Mutex<LruCache<ScoreKey, u8>>,
    hits: AtomicU64,
    misses: AtomicU64,
    trigger: Option<Trigger>,
    debug: bool,
}

impl Default for TriggerMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl TriggerMatcher {
    pub fn new(cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            trigger: None,
            debug: false,
        }
    }

    /// Attach the assistant's own name; enables the phonetic and prefix tables.
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn trigger(&self) -> Option<&Trigger> {
        self.trigger.as_ref()
    }

    /// Similarity of `text` to `variant`, 0-100, case-insensitive.
    ///
    /// Strict mode compares whole strings. Partial mode takes the better of
    /// token-set and substring similarity, which tolerates reordering and a
    /// variant embedded mid-phrase.
    pub fn score(&self, text: &str, variant: &str, partial: bool) -> u8 {
        let key = ScoreKey {
            text: text.trim().to_lowercase(),
            variant: variant.trim().to_lowercase(),
            partial,
        };

        if let Ok(mut cache) = self.cache.lock() {
            if let Some(score) = cache.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return *score;
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let score = compute_score(&key.text, &key.variant, partial);
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, score);
        }
        score
    }

    /// Highest-scoring variant. An exact hit ends the scan early.
    pub fn best_match<'a, S: AsRef<str>>(
        &self,
        text: &str,
        variants: &'a [S],
        threshold: u8,
        partial: bool,
    ) -> BestMatch<'a> {
        let text = text.trim().to_lowercase();
        if text.is_empty() || variants.is_empty() {
            return BestMatch::NONE;
        }

        let mut best: Option<&'a str> = None;
        let mut max_score = 0;
        for variant in variants {
            let variant = variant.as_ref();
            let score = self.score(&text, variant, partial);
            if score > max_score {
                max_score = score;
                best = Some(variant);
            }
            if score == 100 {
                break;
            }
        }

        if self.debug && max_score > DEBUG_SCORE_FLOOR {
            let stats = self.cache_stats();
            let mode = if partial { "partial" } else { "ratio" };
            debug!(
                mode,
                "Matcher: '{}' <-> '{}' score {} (min {}) | cache {}/{} hits",
                text,
                best.unwrap_or_default(),
                max_score,
                threshold,
                stats.hits,
                stats.hits + stats.misses
            );
        }

        if max_score >= threshold {
            BestMatch { variant: best, score: max_score }
        } else {
            BestMatch { variant: None, score: max_score }
        }
    }

    /// Look for one of `names` at the head of `text`, optionally after a lead-in word.
    ///
    /// When `names` includes the attached trigger's name, its phonetic table is
    /// consulted before generic fuzzy matching.
    pub fn check_trigger<S: AsRef<str>>(&self, text: &str, names: &[S], threshold: u8) -> Option<TriggerHit> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();
        if words.is_empty() || names.is_empty() {
            return None;
        }

        let prefix_len = self.prefix_len(&words);

        if let Some(trigger) = self.trigger_for(names) {
            if let Some(hit) = phonetic_hit(trigger, &words, prefix_len) {
                debug!("Matcher: phonetic '{}' -> {} (score {})", hit.matched, trigger.name, hit.score);
                return Some(hit);
            }
        }

        let mut starts = vec![prefix_len];
        if prefix_len > 0 {
            starts.push(0);
        }
        for start in starts {
            let end = words.len().min(start + MAX_PROBE_WORDS);
            for stop in (start + 1)..=end {
                let probe = words[start..stop].join(" ");
                let found = self.best_match(&probe, names, threshold, false);
                if found.variant.is_some() {
                    return Some(TriggerHit {
                        matched: probe,
                        remaining: words[stop..].join(" "),
                        score: found.score,
                    });
                }
            }
        }
        None
    }

    fn trigger_for<S: AsRef<str>>(&self, names: &[S]) -> Option<&Trigger> {
        let trigger = self.trigger.as_ref()?;
        names
            .iter()
            .any(|n| n.as_ref().trim().to_lowercase() == trigger.name)
            .then_some(trigger)
    }

    fn prefix_len(&self, words: &[&str]) -> usize {
        let Some(trigger) = self.trigger.as_ref() else {
            return 0;
        };
        match trigger.prefixes.get(words[0]) {
            Some(&score) if score >= PREFIX_MIN_SCORE && words.len() > 1 => {
                debug!("Matcher: prefix '{}' recognized (score {})", words[0], score);
                1
            }
            _ => 0,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        let len = self.cache.lock().map(|c| c.len()).unwrap_or(0);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len,
        }
    }

    /// Drop memoized scores, e.g. after the capability set changes.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

fn compute_score(text: &str, variant: &str, partial: bool) -> u8 {
    if partial {
        fuzz::token_set_ratio(text, variant).max(fuzz::partial_ratio(text, variant))
    } else {
        fuzz::ratio(text, variant)
    }
}

fn phonetic_hit(trigger: &Trigger, words: &[&str], start: usize) -> Option<TriggerHit> {
    let end = words.len().min(start + MAX_PROBE_WORDS);
    for stop in (start + 1)..=end {
        let probe = words[start..stop].join(" ");
        if let Some(&score) = trigger.phonetic.get(&probe) {
            if score >= PHONETIC_MIN_SCORE {
                return Some(TriggerHit {
                    matched: probe,
                    remaining: words[stop..].join(" "),
                    score,
                });
            }
        }
    }
    None
}
