use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::matcher::TriggerMatcher;
use crate::capability::{isolate, CapabilityId, CapabilityRegistry, Context};
use crate::config::DispatchConfig;
use crate::intent::IntentClassifier;

/// Where a route candidate came from.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteSource {
    Classifier { confidence: f32 },
    Keyword { keyword: String },
    Fallback,
}

impl fmt::Display for RouteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteSource::Classifier { confidence } => write!(f, "ml({:.2})", confidence),
            RouteSource::Keyword { keyword } => write!(f, "keyword:{}", keyword),
            RouteSource::Fallback => f.write_str("fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteCandidate {
    pub capability: CapabilityId,
    pub source: RouteSource,
    /// 0-100; classifier confidence is scaled to the same range.
    pub score: u8,
}

/// Outcome of one handler attempt, reported to an optional observer.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Handled,
    Declined,
    Failed(String),
}

/// Keyword thresholds. Stop-family keywords need a closer match than the rest.
#[derive(Debug, Clone)]
pub struct KeywordThresholds {
    pub start: u8,
    pub stop: u8,
    pub stop_keywords: Vec<String>,
}

impl Default for KeywordThresholds {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

impl KeywordThresholds {
    pub fn from_config(cfg: &DispatchConfig) -> Self {
        Self {
            start: cfg.start_threshold,
            stop: cfg.stop_threshold,
            stop_keywords: cfg.stop_keywords.iter().map(|k| k.trim().to_lowercase()).collect(),
        }
    }

    pub fn for_keyword(&self, keyword: &str) -> u8 {
        let in_stop_family = self
            .stop_keywords
            .iter()
            .any(|stop| keyword == stop || keyword.split_whitespace().any(|w| w == stop));
        if in_stop_family {
            self.stop
        } else {
            self.start
        }
    }
}

/// Routes a command phrase to the first capability willing to handle it.
///
/// Candidate order: classifier guess, then keyword matches on the head of the
/// phrase ranked by score, then fallbacks. A capability reachable from several
/// sources is attempted once.
pub struct CommandDispatcher {
    registry: Arc<CapabilityRegistry>,
    classifier: Box<dyn IntentClassifier>,
    matcher: Arc<TriggerMatcher>,
    thresholds: KeywordThresholds,
}

impl CommandDispatcher {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        classifier: Box<dyn IntentClassifier>,
        matcher: Arc<TriggerMatcher>,
        thresholds: KeywordThresholds,
    ) -> Self {
        Self {
            registry,
            classifier,
            matcher,
            thresholds,
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Try candidates until one handles `phrase`. Returns whether any did.
    pub fn route(&self, phrase: &str, ctx: &Context<'_>) -> bool {
        self.route_observed(phrase, ctx, |_, _| {}).is_some()
    }

    /// Like `route`, reporting each attempt and returning the winning candidate.
    pub fn route_observed<F>(&self, phrase: &str, ctx: &Context<'_>, mut observe: F) -> Option<RouteCandidate>
    where
        F: FnMut(&RouteCandidate, &AttemptOutcome),
    {
        let text = phrase.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }
        debug!("Router: routing '{}'", text);

        let mut tried: HashSet<CapabilityId> = HashSet::new();
        for candidate in self.candidates(&text) {
            if !tried.insert(candidate.capability) {
                continue;
            }
            let outcome = self.attempt(&candidate, &text, ctx);
            observe(&candidate, &outcome);
            if outcome == AttemptOutcome::Handled {
                return Some(candidate);
            }
        }

        warn!("Router: no capability handled '{}'", text);
        None
    }

    /// All candidates in priority order, duplicates included.
    pub fn candidates(&self, text: &str) -> Vec<RouteCandidate> {
        let mut candidates = Vec::new();

        // 1. Classifier
        if let Some(prediction) = self.classifier.predict(text) {
            candidates.push(RouteCandidate {
                capability: prediction.capability,
                source: RouteSource::Classifier {
                    confidence: prediction.confidence,
                },
                score: (prediction.confidence.clamp(0.0, 1.0) * 100.0).round() as u8,
            });
        }

        // 2. Keywords on the head of the phrase
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut keyword_hits = Vec::new();
        for (keyword, ids) in self.registry.keywords() {
            let span_len = keyword.split_whitespace().count();
            if span_len == 0 || span_len > words.len() {
                continue;
            }
            let span = words[..span_len].join(" ");
            let score = self.matcher.score(&span, keyword, false);
            if score < self.thresholds.for_keyword(keyword) {
                continue;
            }
            for id in ids {
                keyword_hits.push(RouteCandidate {
                    capability: *id,
                    source: RouteSource::Keyword {
                        keyword: keyword.clone(),
                    },
                    score,
                });
            }
        }
        // Stable: equal scores keep registration order.
        keyword_hits.sort_by(|a, b| b.score.cmp(&a.score));
        candidates.extend(keyword_hits);

        // 3. Fallbacks
        candidates.extend(self.registry.fallbacks().iter().map(|id| RouteCandidate {
            capability: *id,
            source: RouteSource::Fallback,
            score: 0,
        }));

        candidates
    }

    fn attempt(&self, candidate: &RouteCandidate, text: &str, ctx: &Context<'_>) -> AttemptOutcome {
        let Some(capability) = self.registry.get(candidate.capability) else {
            return AttemptOutcome::Failed(format!("unknown capability {}", candidate.capability));
        };
        let name = capability.name();

        match isolate(|| capability.execute(text, ctx)) {
            Ok(true) => {
                info!(capability = name, source = %candidate.source, "Router: handled");
                AttemptOutcome::Handled
            }
            Ok(false) => {
                debug!(capability = name, source = %candidate.source, "Router: declined");
                AttemptOutcome::Declined
            }
            Err(e) => {
                error!(capability = name, source = %candidate.source, "Router: capability failed: {}", e);
                AttemptOutcome::Failed(e)
            }
        }
    }
}
