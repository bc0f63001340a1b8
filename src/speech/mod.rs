//! Speech-to-text: the recognizer seam and the service that drives it.

pub mod transcriber;
#[cfg(feature = "vosk")]
pub mod vosk;

pub use transcriber::{EngineLoader, TranscriptionService};

use crate::config::SpeechConfig;
use crate::error::Result;

/// A streaming recognizer fed with 16 kHz mono PCM.
pub trait SpeechEngine: Send {
    /// Feed samples. Returns the finalized text once the engine decides the
    /// utterance ended; interim hypotheses are never returned.
    fn accept(&mut self, samples: &[i16]) -> Result<Option<String>>;

    /// Drop any buffered audio and partial hypothesis.
    fn reset(&mut self);
}

/// Loader for the engine compiled into this build.
pub fn default_loader(cfg: &SpeechConfig, sample_rate: u32) -> EngineLoader {
    #[cfg(feature = "vosk")]
    {
        let path = cfg.model_path.clone();
        Box::new(move || {
            let engine = vosk::VoskEngine::load(&path, sample_rate)?;
            Ok(Box::new(engine) as Box<dyn SpeechEngine>)
        })
    }
    #[cfg(not(feature = "vosk"))]
    {
        let path = cfg.model_path.display().to_string();
        let _ = sample_rate;
        Box::new(move || {
            Err(crate::error::Error::ModelLoad(format!(
                "no speech engine compiled in (build with --features vosk) for model {}",
                path
            )))
        })
    }
}
