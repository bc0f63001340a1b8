use std::path::Path;
use vosk::{DecodingState, Model, Recognizer};

use super::SpeechEngine;
use crate::error::{Error, Result};

/// Kaldi recognizer via the `vosk` bindings.
pub struct VoskEngine {
    recognizer: Recognizer,
    // The recognizer borrows model data on the C side; keep it alive.
    _model: Model,
}

impl VoskEngine {
    pub fn load(path: &Path, sample_rate: u32) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ModelLoad(format!("model not found at {}", path.display())));
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| Error::ModelLoad(format!("model path is not UTF-8: {}", path.display())))?;
        let model = Model::new(path_str)
            .ok_or_else(|| Error::ModelLoad(format!("vosk could not load {}", path.display())))?;
        let recognizer = Recognizer::new(&model, sample_rate as f32)
            .ok_or_else(|| Error::ModelLoad("vosk could not create a recognizer".into()))?;
        Ok(Self {
            recognizer,
            _model: model,
        })
    }
}

impl SpeechEngine for VoskEngine {
    fn accept(&mut self, samples: &[i16]) -> Result<Option<String>> {
        let state = self
            .recognizer
            .accept_waveform(samples)
            .map_err(|e| Error::Speech(format!("{:?}", e)))?;
        match state {
            DecodingState::Finalized => {
                let text = self
                    .recognizer
                    .result()
                    .single()
                    .map(|r| r.text.to_string())
                    .unwrap_or_default();
                Ok(Some(text))
            }
            DecodingState::Running => Ok(None),
            DecodingState::Failed => Err(Error::Speech("decoding failed".into())),
        }
    }

    fn reset(&mut self) {
        self.recognizer.reset();
    }
}
