//! Core building blocks for the habla Discord TTS bot
//!
//! This crate carries everything the adaptor and provider crates share:
//! - the error taxonomy ([`HablaError`]) and `Result` alias
//! - environment-driven configuration ([`HablaConfig`])
//! - the text normalizer that rewrites chat slang into speakable form
//! - the saves store (whitelist, per-user voices, channel bindings)

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod normalize;
pub mod store;

pub use config::HablaConfig;
pub use error::{HablaError, Result};
