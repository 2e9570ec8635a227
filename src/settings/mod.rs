//! Operator-editable generation settings.
//!
//! A [`Settings`] snapshot is fetched once at the start of every job and held
//! for the job's lifetime, so edits made through the admin API only affect
//! jobs submitted afterwards.

pub mod store;

use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use store::{InMemorySettingsStore, SettingsStore, SupabaseSettingsStore};

/// Configuration snapshot for one job.
///
/// Field names match the columns of the settings table.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub openai_api_key: String,
    pub elevenlabs_api_key: String,
    pub openai_model: String,
    pub elevenlabs_model: String,
    pub elevenlabs_voice_id: String,
    pub speech_speed: f32,
    pub chapter_count: usize,
    pub silence_seconds: u32,
    /// Prompt template with `{disease}`, `{symptom}` and `{additional_instructions}` placeholders.
    #[serde(rename = "system_prompt")]
    pub prompt_template: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            elevenlabs_api_key: String::new(),
            openai_model: defaults::OPENAI_MODEL.to_string(),
            elevenlabs_model: defaults::ELEVENLABS_MODEL.to_string(),
            elevenlabs_voice_id: defaults::ELEVENLABS_VOICE_ID.to_string(),
            speech_speed: defaults::SPEECH_SPEED,
            chapter_count: defaults::CHAPTER_COUNT,
            silence_seconds: defaults::SILENCE_SECS,
            prompt_template: defaults::PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("elevenlabs_api_key", &redact(&self.elevenlabs_api_key))
            .field("openai_model", &self.openai_model)
            .field("elevenlabs_model", &self.elevenlabs_model)
            .field("elevenlabs_voice_id", &self.elevenlabs_voice_id)
            .field("speech_speed", &self.speech_speed)
            .field("chapter_count", &self.chapter_count)
            .field("silence_seconds", &self.silence_seconds)
            .field("prompt_template", &format!("<{} chars>", self.prompt_template.len()))
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "<redacted>" }
}

impl Settings {
    /// Built-in defaults overlaid with provider credentials and models from the
    /// process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Like [`Settings::from_env`] with an arbitrary lookup. Empty values are ignored.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(key) = get("OPENAI_API_KEY") {
            settings.openai_api_key = key;
        }
        if let Some(key) = get("ELEVENLABS_API_KEY") {
            settings.elevenlabs_api_key = key;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            settings.openai_model = model;
        }
        if let Some(model) = get("ELEVENLABS_MODEL_ID") {
            settings.elevenlabs_model = model;
        }
        if let Some(voice) = get("ELEVENLABS_VOICE_ID") {
            settings.elevenlabs_voice_id = voice;
        }

        settings
    }

    /// Clamp values into the ranges the pipeline and providers accept.
    pub fn normalized(mut self) -> Self {
        self.chapter_count = self.chapter_count.max(1);

        let (min, max) = defaults::SPEECH_SPEED_RANGE;
        self.speech_speed = if self.speech_speed.is_finite() {
            self.speech_speed.clamp(min, max)
        } else {
            defaults::SPEECH_SPEED
        };

        self
    }
}

/// Partial settings change. Only fields that are `Some` are applied.
///
/// Also used to read stored rows, where any column may be missing or null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevenlabs_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevenlabs_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevenlabs_voice_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_speed: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silence_seconds: Option<u32>,
    #[serde(
        rename = "system_prompt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub prompt_template: Option<String>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Return `base` with every provided field replaced.
    pub fn apply(&self, base: &Settings) -> Settings {
        let mut next = base.clone();

        if let Some(v) = &self.openai_api_key {
            next.openai_api_key = v.clone();
        }
        if let Some(v) = &self.elevenlabs_api_key {
            next.elevenlabs_api_key = v.clone();
        }
        if let Some(v) = &self.openai_model {
            next.openai_model = v.clone();
        }
        if let Some(v) = &self.elevenlabs_model {
            next.elevenlabs_model = v.clone();
        }
        if let Some(v) = &self.elevenlabs_voice_id {
            next.elevenlabs_voice_id = v.clone();
        }
        if let Some(v) = self.speech_speed {
            next.speech_speed = v;
        }
        if let Some(v) = self.chapter_count {
            next.chapter_count = v;
        }
        if let Some(v) = self.silence_seconds {
            next.silence_seconds = v;
        }
        if let Some(v) = &self.prompt_template {
            next.prompt_template = v.clone();
        }

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.openai_model, "gpt-4o-mini");
        assert_eq!(settings.elevenlabs_model, "eleven_turbo_v2_5");
        assert_eq!(settings.chapter_count, 3);
        assert_eq!(settings.silence_seconds, 60);
        assert_eq!(settings.prompt_template, defaults::PROMPT_TEMPLATE);
    }

    #[test]
    fn test_from_env_with() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-1"),
            ("ELEVENLABS_API_KEY", "el-1"),
            ("ELEVENLABS_MODEL_ID", "eleven_multilingual_v2"),
            ("OPENAI_MODEL", ""),
        ]
        .into_iter()
        .collect();

        let settings = Settings::from_env_with(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(settings.openai_api_key, "sk-1");
        assert_eq!(settings.elevenlabs_api_key, "el-1");
        assert_eq!(settings.elevenlabs_model, "eleven_multilingual_v2");
        // Empty value ignored
        assert_eq!(settings.openai_model, "gpt-4o-mini");
    }

    #[test]
    fn test_normalized_clamps() {
        let settings = Settings {
            chapter_count: 0,
            speech_speed: 3.0,
            ..Settings::default()
        }
        .normalized();
        assert_eq!(settings.chapter_count, 1);
        assert_eq!(settings.speech_speed, 1.2);

        let settings = Settings {
            speech_speed: f32::NAN,
            ..Settings::default()
        }
        .normalized();
        assert_eq!(settings.speech_speed, 1.0);
    }

    #[test]
    fn test_debug_redacts_keys() {
        let settings = Settings {
            openai_api_key: "sk-very-secret".to_string(),
            ..Settings::default()
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("<redacted>"));
        assert!(debug.contains("<unset>"));
    }

    #[test]
    fn test_update_applies_only_provided_fields() {
        let base = Settings::default();
        let update = SettingsUpdate {
            silence_seconds: Some(30),
            openai_model: Some("gpt-4o".to_string()),
            ..SettingsUpdate::default()
        };

        let next = update.apply(&base);
        assert_eq!(next.silence_seconds, 30);
        assert_eq!(next.openai_model, "gpt-4o");
        assert_eq!(next.chapter_count, base.chapter_count);
        assert_eq!(next.prompt_template, base.prompt_template);
    }

    #[test]
    fn test_empty_update() {
        assert!(SettingsUpdate::default().is_empty());
        let update = SettingsUpdate {
            chapter_count: Some(4),
            ..SettingsUpdate::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_update_serializes_only_present_fields() {
        let update = SettingsUpdate {
            prompt_template: Some("Hi {disease}".to_string()),
            ..SettingsUpdate::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"system_prompt": "Hi {disease}"}));
    }

    #[test]
    fn test_row_with_nulls_and_extra_columns() {
        let row = serde_json::json!({
            "id": 1,
            "openai_api_key": "sk",
            "openai_model": null,
            "created_at": "2025-01-01T00:00:00Z"
        });
        let update: SettingsUpdate = serde_json::from_value(row).unwrap();
        let settings = update.apply(&Settings::default());

        assert_eq!(settings.openai_api_key, "sk");
        assert_eq!(settings.openai_model, "gpt-4o-mini");
    }
}
