//! User settings, persisted through the key-value backing.
//!
//! Values missing from the backing fall back to `.env`/environment, then to
//! built-in defaults. `PublicSettings` is safe to print; it never carries the
//! credential.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::plugins::store::{keys, KeyValueBacking, PersistError};
use crate::services::prompts;

pub const DEFAULT_MODEL: &str = "deepseek/deepseek-r1:free";
pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_SPEECH_LANG: &str = "bn-BD";
pub const DEFAULT_APP_TITLE: &str = "Agent Studio";
pub const DEFAULT_REFERER: &str = "http://localhost";

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub dark: bool,
    pub system_prompt: String,
    pub speech_lang: String,
    pub auto_speak: bool,
    pub referer: String,
    pub app_title: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            dark: false,
            system_prompt: prompts::SYSTEM_PROMPT_DEFAULT.to_string(),
            speech_lang: DEFAULT_SPEECH_LANG.to_string(),
            auto_speak: false,
            referer: DEFAULT_REFERER.to_string(),
            app_title: DEFAULT_APP_TITLE.to_string(),
        }
    }
}

impl Settings {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Values read from `.env`/environment.
#[derive(Debug, Clone, Default)]
pub struct EnvDefaults {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

fn env_value(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

impl EnvDefaults {
    /// Reads:
    /// - `AI_API_KEY` (fallback: `OPENROUTER_API_KEY`, `OPENAI_API_KEY`)
    /// - `AI_MODEL`
    /// - `AI_BASE_URL`
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self {
            api_key: env_value(&["AI_API_KEY", "OPENROUTER_API_KEY", "OPENAI_API_KEY"]),
            model: env_value(&["AI_MODEL"]),
            base_url: env_value(&["AI_BASE_URL"]),
        }
    }
}

/// Accepts either an API base (`.../v1`) or the full completions URL.
fn normalize_endpoint(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.is_empty() {
        return DEFAULT_ENDPOINT.to_string();
    }
    if base.ends_with(CHAT_COMPLETIONS_PATH) {
        return base.to_string();
    }
    format!("{base}{CHAT_COMPLETIONS_PATH}")
}

fn read_key(backing: &dyn KeyValueBacking, key: &str) -> Option<String> {
    match backing.get(key) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("Failed to read setting {}: {}", key, err);
            None
        }
    }
}

fn read_flag(backing: &dyn KeyValueBacking, key: &str) -> bool {
    read_key(backing, key).as_deref() == Some("1")
}

fn flag_value(on: bool) -> &'static str {
    if on { "1" } else { "0" }
}

pub fn load_settings(backing: &dyn KeyValueBacking, env: &EnvDefaults) -> Settings {
    let defaults = Settings::default();

    let api_key = read_key(backing, keys::API_KEY)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| env.api_key.clone())
        .unwrap_or_default();

    let model = read_key(backing, keys::MODEL)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| env.model.clone())
        .unwrap_or(defaults.model);

    // A stored empty prompt is a deliberate choice; only absence falls back.
    let system_prompt = read_key(backing, keys::SYSTEM_PROMPT).unwrap_or(defaults.system_prompt);

    let speech_lang = read_key(backing, keys::SPEECH_LANG)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(defaults.speech_lang);

    Settings {
        api_key,
        model,
        endpoint: env
            .base_url
            .as_deref()
            .map(normalize_endpoint)
            .unwrap_or(defaults.endpoint),
        dark: read_flag(backing, keys::DARK),
        system_prompt,
        speech_lang,
        auto_speak: read_flag(backing, keys::AUTO_SPEAK),
        referer: defaults.referer,
        app_title: defaults.app_title,
    }
}

/// Settings safe to show (credential omitted).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSettings {
    pub model: String,
    pub endpoint: String,
    pub dark: bool,
    pub system_prompt: String,
    pub speech_lang: String,
    pub auto_speak: bool,
    pub has_api_key: bool,
}

impl From<&Settings> for PublicSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            model: settings.model.clone(),
            endpoint: settings.endpoint.clone(),
            dark: settings.dark,
            system_prompt: settings.system_prompt.clone(),
            speech_lang: settings.speech_lang.clone(),
            auto_speak: settings.auto_speak,
            has_api_key: settings.has_api_key(),
        }
    }
}

/// Live settings. Readers take a snapshot; writers persist then publish.
pub struct SettingsStore {
    backing: Arc<dyn KeyValueBacking>,
    current: ArcSwap<Settings>,
}

impl SettingsStore {
    pub fn load(backing: Arc<dyn KeyValueBacking>, env: &EnvDefaults) -> Self {
        let settings = load_settings(backing.as_ref(), env);
        Self {
            backing,
            current: ArcSwap::from_pointee(settings),
        }
    }

    pub fn snapshot(&self) -> Arc<Settings> {
        self.current.load_full()
    }

    pub fn public(&self) -> PublicSettings {
        PublicSettings::from(self.current.load().as_ref())
    }

    /// Publish the change in memory, then write `key`. The in-memory value
    /// is kept even if the write fails.
    fn apply<F>(&self, key: &str, value: &str, mutate: F) -> Result<(), PersistError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut next = Settings::clone(&self.current.load());
        mutate(&mut next);
        self.current.store(Arc::new(next));
        self.backing.set(key, value).inspect_err(|err| {
            log::warn!("Setting {} not saved: {}", key, err);
        })
    }

    pub fn set_api_key(&self, api_key: &str) -> Result<(), PersistError> {
        let api_key = api_key.trim().to_string();
        self.apply(keys::API_KEY, &api_key, |s| s.api_key = api_key.clone())
    }

    pub fn set_model(&self, model: &str) -> Result<(), PersistError> {
        let model = match model.trim() {
            "" => DEFAULT_MODEL.to_string(),
            trimmed => trimmed.to_string(),
        };
        self.apply(keys::MODEL, &model, |s| s.model = model.clone())
    }

    pub fn set_system_prompt(&self, prompt: &str) -> Result<(), PersistError> {
        self.apply(keys::SYSTEM_PROMPT, prompt, |s| {
            s.system_prompt = prompt.to_string()
        })
    }

    pub fn set_dark(&self, dark: bool) -> Result<(), PersistError> {
        self.apply(keys::DARK, flag_value(dark), |s| s.dark = dark)
    }

    pub fn set_speech_lang(&self, lang: &str) -> Result<(), PersistError> {
        let lang = match lang.trim() {
            "" => DEFAULT_SPEECH_LANG.to_string(),
            trimmed => trimmed.to_string(),
        };
        self.apply(keys::SPEECH_LANG, &lang, |s| s.speech_lang = lang.clone())
    }

    pub fn set_auto_speak(&self, on: bool) -> Result<(), PersistError> {
        self.apply(keys::AUTO_SPEAK, flag_value(on), |s| s.auto_speak = on)
    }
}
