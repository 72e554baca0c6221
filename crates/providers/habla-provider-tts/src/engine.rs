//! HTTP client for the neural-TTS gateway

use std::sync::OnceLock;
use std::time::Duration;

use bytes::Bytes;
use habla_core::Result;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::clean::clean_text;
use crate::types::{TtsError, VoiceGender, VoiceInfo, VoiceProfile};

const DEFAULT_MAX_TEXT_LENGTH: usize = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Spanish locales the voice catalog is restricted to
const SPANISH_LOCALES: &[&str] = &[
    "es-AR", "es-BO", "es-CL", "es-CO", "es-CR", "es-CU", "es-DO", "es-EC",
    "es-ES", "es-GQ", "es-GT", "es-HN", "es-MX", "es-NI", "es-PA", "es-PE",
    "es-PR", "es-PY", "es-SV", "es-US", "es-UY", "es-VE",
];

static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

fn http_client() -> &'static Client {
    HTTP_CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new())
    })
}

/// Voice entry as the gateway reports it (edge-tts list shape)
#[derive(Debug, Deserialize)]
struct GatewayVoice {
    #[serde(rename = "ShortName")]
    short_name: String,
    #[serde(rename = "Locale")]
    locale: String,
    #[serde(rename = "Gender", default)]
    gender: String,
    #[serde(rename = "FriendlyName", default)]
    friendly_name: String,
}

/// Client for an HTTP gateway serving Microsoft-style neural voices.
///
/// `POST {endpoint}/api/synthesize` with `{ text, voice, rate, volume }`
/// returns the encoded audio clip; `GET {endpoint}/api/voices` returns the
/// catalog.
#[derive(Debug, Clone)]
pub struct TtsEngine {
    endpoint: String,
    default_profile: VoiceProfile,
    max_text_length: usize,
}

impl TtsEngine {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            endpoint,
            default_profile: VoiceProfile::default(),
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
        }
    }

    pub fn with_default_profile(mut self, profile: VoiceProfile) -> Self {
        self.default_profile = profile;
        self
    }

    pub fn with_max_text_length(mut self, max: usize) -> Self {
        self.max_text_length = max;
        self
    }

    pub fn default_profile(&self) -> &VoiceProfile {
        &self.default_profile
    }

    /// Build a profile for `voice_id` carrying the default rate/volume
    pub fn profile_for(&self, voice_id: &str) -> VoiceProfile {
        VoiceProfile {
            voice_id: voice_id.to_string(),
            rate: self.default_profile.rate.clone(),
            volume: self.default_profile.volume.clone(),
        }
    }

    /// Clean `text` and synthesize it with `profile`.
    ///
    /// Fails with [`TtsError::EmptyText`] when nothing speakable survives
    /// cleaning and [`TtsError::NoAudio`] when the gateway returns an empty
    /// payload.
    pub async fn synthesize(&self, text: &str, profile: &VoiceProfile) -> Result<Bytes> {
        let cleaned = clean_text(text, self.max_text_length);
        if cleaned.is_empty() {
            return Err(TtsError::EmptyText.into());
        }

        debug!(
            voice = %profile.voice_id,
            chars = cleaned.chars().count(),
            "Requesting speech synthesis"
        );

        let response = http_client()
            .post(format!("{}/api/synthesize", self.endpoint))
            .json(&json!({
                "text": cleaned,
                "voice": profile.voice_id,
                "rate": profile.rate,
                "volume": profile.volume,
            }))
            .send()
            .await
            .map_err(TtsError::from)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "TTS gateway rejected request");
            return Err(TtsError::Provider {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let audio = response.bytes().await.map_err(TtsError::from)?;
        if audio.is_empty() {
            return Err(TtsError::NoAudio.into());
        }

        debug!(bytes = audio.len(), "Synthesis complete");
        Ok(audio)
    }

    /// Fetch the Spanish voice catalog, sorted by locale then short name
    pub async fn available_voices(&self) -> Result<Vec<VoiceInfo>> {
        let response = http_client()
            .get(format!("{}/api/voices", self.endpoint))
            .send()
            .await
            .map_err(TtsError::from)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TtsError::Provider {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let raw: Vec<GatewayVoice> = response.json().await.map_err(TtsError::from)?;
        Ok(spanish_catalog(raw))
    }
}

fn spanish_catalog(raw: Vec<GatewayVoice>) -> Vec<VoiceInfo> {
    let mut voices: Vec<VoiceInfo> = raw
        .into_iter()
        .filter(|v| SPANISH_LOCALES.contains(&v.locale.as_str()))
        .map(|v| VoiceInfo {
            gender: VoiceGender::parse(&v.gender),
            display_name: if v.friendly_name.is_empty() {
                v.short_name.clone()
            } else {
                v.friendly_name
            },
            short_name: v.short_name,
            locale: v.locale,
        })
        .collect();
    voices.sort_by(|a, b| {
        (a.locale.as_str(), a.short_name.as_str()).cmp(&(b.locale.as_str(), b.short_name.as_str()))
    });
    voices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_voice(short_name: &str, locale: &str, gender: &str) -> GatewayVoice {
        GatewayVoice {
            short_name: short_name.to_string(),
            locale: locale.to_string(),
            gender: gender.to_string(),
            friendly_name: String::new(),
        }
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let engine = TtsEngine::new("http://localhost:5002/");
        assert_eq!(engine.endpoint, "http://localhost:5002");
    }

    #[test]
    fn test_profile_for_carries_defaults() {
        let engine = TtsEngine::new("http://localhost:5002")
            .with_default_profile(VoiceProfile::new("es-ES-XimenaNeural").with_rate("+10%"));
        let profile = engine.profile_for("es-MX-JorgeNeural");
        assert_eq!(profile.voice_id, "es-MX-JorgeNeural");
        assert_eq!(profile.rate, "+10%");
    }

    #[test]
    fn test_catalog_filters_non_spanish() {
        let voices = spanish_catalog(vec![
            gateway_voice("en-US-AriaNeural", "en-US", "Female"),
            gateway_voice("es-ES-ElviraNeural", "es-ES", "Female"),
            gateway_voice("fr-FR-DeniseNeural", "fr-FR", "Female"),
        ]);
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].short_name, "es-ES-ElviraNeural");
    }

    #[test]
    fn test_catalog_sorted_by_locale_then_name() {
        let voices = spanish_catalog(vec![
            gateway_voice("es-MX-JorgeNeural", "es-MX", "Male"),
            gateway_voice("es-AR-ElenaNeural", "es-AR", "Female"),
            gateway_voice("es-MX-DaliaNeural", "es-MX", "Female"),
            gateway_voice("es-ES-AlvaroNeural", "es-ES", "Male"),
        ]);
        let names: Vec<&str> = voices.iter().map(|v| v.short_name.as_str()).collect();
        assert_eq!(
            names,
            [
                "es-AR-ElenaNeural",
                "es-ES-AlvaroNeural",
                "es-MX-DaliaNeural",
                "es-MX-JorgeNeural",
            ]
        );
    }

    #[test]
    fn test_catalog_display_name_falls_back_to_short_name() {
        let voices = spanish_catalog(vec![gateway_voice("es-CL-CatalinaNeural", "es-CL", "Female")]);
        assert_eq!(voices[0].display_name, "es-CL-CatalinaNeural");
    }
}
