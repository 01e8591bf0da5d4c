use serde::{Deserialize, Serialize};

pub const SONIOX_WEBSOCKET_URL: &str = "wss://stt-rt.soniox.com/transcribe-websocket";
pub const END_TOKEN_TEXT: &str = "<end>";

#[derive(Debug, Clone, Serialize)]
pub struct TranslationConfig {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub target_language: String,
}

impl TranslationConfig {
    pub fn one_way(target_language: impl Into<String>) -> Self {
        Self {
            kind: "one_way",
            target_language: target_language.into(),
        }
    }
}

/// The JSON configuration frame sent as the first websocket text message,
/// before any binary audio frames.
#[derive(Debug, Clone, Serialize)]
pub struct StreamConfig {
    pub api_key: String,
    pub model: &'static str,
    pub enable_language_identification: bool,
    pub enable_speaker_diarization: bool,
    pub enable_endpoint_detection: bool,
    pub audio_format: &'static str,
    pub sample_rate: u32,
    pub num_channels: u8,
    pub translation: TranslationConfig,
    pub language_hints: Vec<String>,
}

impl StreamConfig {
    pub fn new(api_key: impl Into<String>, target_language: impl Into<String>, language_hints: Vec<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "stt-rt-v4",
            enable_language_identification: true,
            enable_speaker_diarization: false,
            enable_endpoint_detection: true,
            audio_format: "pcm_s16le",
            sample_rate: 16_000,
            num_channels: 1,
            translation: TranslationConfig::one_way(target_language),
            language_hints,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Token {
    pub text: Option<String>,
    #[serde(default)]
    pub is_final: bool,
    pub translation_status: Option<String>,
    pub language: Option<String>,
    pub speaker: Option<String>,
}

impl Token {
    pub fn is_translation(&self) -> bool {
        self.translation_status.as_deref() == Some("translation")
    }

    pub fn is_end_marker(&self) -> bool {
        self.is_final && self.text.as_deref() == Some(END_TOKEN_TEXT)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerMessage {
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub finished: bool,
    pub error_code: Option<i64>,
    pub error_message: Option<String>,
}
