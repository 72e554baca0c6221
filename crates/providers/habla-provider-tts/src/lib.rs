//! Neural text-to-speech provider
//!
//! Wraps an HTTP TTS gateway serving Microsoft-style neural voices. The
//! engine cleans Discord markup out of the text, synthesizes it with a
//! per-user or default [`VoiceProfile`], and exposes the Spanish voice
//! catalog for the `voices` command.

#![warn(clippy::all)]

pub mod clean;
pub mod engine;
pub mod types;

pub use clean::clean_text;
pub use engine::TtsEngine;
pub use types::{TtsError, VoiceGender, VoiceInfo, VoiceProfile};
