//! Shared types for the TTS provider

use habla_core::HablaError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a user's messages should sound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Voice short name, e.g. `es-ES-ElviraNeural`
    pub voice_id: String,
    /// Speech rate offset as a signed percentage string, e.g. `+0%`
    pub rate: String,
    /// Volume offset as a signed percentage string, e.g. `+0%`
    pub volume: String,
}

impl VoiceProfile {
    pub fn new(voice_id: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            rate: "+0%".to_string(),
            volume: "+0%".to_string(),
        }
    }

    pub fn with_rate(mut self, rate: impl Into<String>) -> Self {
        self.rate = rate.into();
        self
    }

    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volume = volume.into();
        self
    }
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self::new("es-ES-ElviraNeural")
    }
}

/// Voice gender as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceGender {
    Female,
    Male,
    Neutral,
}

impl VoiceGender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Female => "Female",
            Self::Male => "Male",
            Self::Neutral => "Neutral",
        }
    }

    pub(crate) fn parse(s: &str) -> Self {
        match s {
            "Female" => Self::Female,
            "Male" => Self::Male,
            _ => Self::Neutral,
        }
    }
}

/// One entry of the voice catalog
#[derive(Debug, Clone)]
pub struct VoiceInfo {
    pub short_name: String,
    pub locale: String,
    pub gender: VoiceGender,
    pub display_name: String,
}

/// TTS provider errors
#[derive(Debug, Error)]
pub enum TtsError {
    /// Nothing speakable survived cleaning
    #[error("No speakable text after cleaning")]
    EmptyText,

    /// The gateway returned an empty audio payload
    #[error("Synthesis produced no audio data")]
    NoAudio,

    /// Transport-level failure reaching the gateway
    #[error("Network error: {0}")]
    Network(String),

    /// The gateway rejected the request
    #[error("Provider error (status {status}): {message}")]
    Provider { status: u16, message: String },

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TtsError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<TtsError> for HablaError {
    fn from(e: TtsError) -> Self {
        HablaError::Synthesis(e.to_string())
    }
}
