use std::time::Instant;
use tracing::{debug, error, info};

use super::SpeechEngine;
use crate::error::{Error, Result};
use crate::kernel::event::{AudioFrame, Phrase};

/// Builds the engine on first use. Model loading is expensive.
pub type EngineLoader = Box<dyn FnMut() -> Result<Box<dyn SpeechEngine>> + Send>;

/// Turns captured frames into finalized phrases.
pub struct TranscriptionService {
    loader: EngineLoader,
    engine: Option<Box<dyn SpeechEngine>>,
}

impl TranscriptionService {
    pub fn new(loader: EngineLoader) -> Self {
        Self { loader, engine: None }
    }

    /// Wrap an engine that is already loaded.
    pub fn with_engine(engine: Box<dyn SpeechEngine>) -> Self {
        Self {
            loader: Box::new(|| Err(Error::ModelLoad("engine already provided".into()))),
            engine: Some(engine),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_some()
    }

    /// Load the engine now so a broken model aborts startup instead of the first utterance.
    pub fn warm_up(&mut self) -> Result<()> {
        self.engine().map(|_| ())
    }

    fn engine(&mut self) -> Result<&mut Box<dyn SpeechEngine>> {
        if self.engine.is_none() {
            let started = Instant::now();
            info!("STT: loading speech model...");
            match (self.loader)() {
                Ok(engine) => {
                    info!("STT: model loaded in {:.2}s", started.elapsed().as_secs_f64());
                    self.engine = Some(engine);
                }
                Err(e) => {
                    error!("STT: model load failed: {}", e);
                    return Err(match e {
                        Error::ModelLoad(_) => e,
                        other => Error::ModelLoad(other.to_string()),
                    });
                }
            }
        }
        self.engine
            .as_mut()
            .ok_or_else(|| Error::ModelLoad("engine missing after load".into()))
    }

    /// Feed one frame.
    ///
    /// `Ok(Some)` only at an utterance boundary with non-empty text. Engine
    /// errors on a single frame are logged and reported as `Ok(None)`; only a
    /// model load failure is returned as `Err`.
    pub fn accept_frame(&mut self, frame: &AudioFrame) -> Result<Option<Phrase>> {
        let engine = self.engine()?;
        match engine.accept(&frame.samples) {
            Ok(Some(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(None);
                }
                debug!("STT: final phrase '{}'", text);
                Ok(Some(Phrase::new(text)))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                error!("STT: recognition error, frame skipped: {}", e);
                Ok(None)
            }
        }
    }

    /// Clear recognizer state. A no-op before the engine is loaded.
    pub fn reset(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.reset();
            debug!("STT: recognizer state reset");
        }
    }
}
