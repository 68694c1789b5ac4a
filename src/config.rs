//! Explicit configuration threaded into registries and pipelines at
//! startup.
//!
//! Nothing in podweave reads the environment ambiently: capabilities and
//! pipelines receive a [`PodweaveConfig`] (or a slice of it) from their
//! constructors. [`PodweaveConfig::from_env`] is the one place environment
//! variables are consulted, with `.env` support via `dotenvy`.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while assembling configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("missing required environment variable: {name}")]
    #[diagnostic(
        code(podweave::config::missing_var),
        help("Set the variable or provide the value programmatically.")
    )]
    MissingVar { name: &'static str },
}

/// Chat-completion provider settings.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model used for script composition.
    pub model: String,
    /// Cheaper model used for triage and query formulation.
    pub triage_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4.1".into(),
            triage_model: "gpt-4o-mini".into(),
        }
    }
}

/// Web search / extraction provider settings.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub api_key: String,
    pub base_url: String,
    pub max_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.tavily.com".into(),
            max_results: 5,
        }
    }
}

/// Speech synthesis settings.
#[derive(Clone, Debug)]
pub struct TtsConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Voices assigned to speakers in order when the request names none.
    pub default_voices: Vec<String>,
    /// Cap on concurrent per-line syntheses.
    pub concurrency: usize,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".into(),
            model: "tts-1".into(),
            default_voices: vec!["shimmer".into(), "echo".into()],
            concurrency: 8,
        }
    }
}

/// Media processing settings.
#[derive(Clone, Debug)]
pub struct AudioConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// HLS segment length in seconds.
    pub segment_seconds: u32,
    /// Lead-in / fade-out padding around the speech track, in milliseconds.
    pub padding_ms: u64,
    /// Object-store keys for the shared silence and default BGM assets.
    pub short_silence_key: String,
    pub long_silence_key: String,
    pub default_bgm_key: String,
    /// Nominal durations of the silence assets, in seconds.
    pub short_silence_secs: f64,
    pub long_silence_secs: f64,
    /// Linear gains applied when mixing speech over music.
    pub speech_gain: f64,
    pub music_gain: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".into(),
            ffprobe_path: "ffprobe".into(),
            segment_seconds: 6,
            padding_ms: 4000,
            short_silence_key: "silent300.mp3".into(),
            long_silence_key: "silent800.mp3".into(),
            default_bgm_key: "stars_beyond.mp3".into(),
            short_silence_secs: 0.3,
            long_silence_secs: 0.8,
            speech_gain: 4.0,
            music_gain: 0.2,
        }
    }
}

/// Durable storage settings for published segments and shared assets.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub bucket: String,
    /// Base URL under which uploaded keys are publicly reachable.
    pub public_base_url: String,
    /// Remote prefix for published streams.
    pub stream_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            public_base_url: "http://localhost:3000".into(),
            stream_prefix: "stream".into(),
        }
    }
}

/// One curated feed category the triage step can select.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedCategory {
    pub field: String,
    pub urls: Vec<String>,
}

/// Top-level configuration for a podweave deployment.
#[derive(Clone, Debug)]
pub struct PodweaveConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub tts: TtsConfig,
    pub audio: AudioConfig,
    pub storage: StorageConfig,
    /// Curated news feeds, by topical category.
    pub feeds: Vec<FeedCategory>,
    /// Root under which per-job scratch directories are created.
    pub scratch_root: PathBuf,
    /// Shared local cache for downloaded audio assets (not job-scoped).
    pub asset_cache_dir: PathBuf,
}

impl Default for PodweaveConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            tts: TtsConfig::default(),
            audio: AudioConfig::default(),
            storage: StorageConfig::default(),
            feeds: default_feeds(),
            scratch_root: PathBuf::from("/tmp/podweave"),
            asset_cache_dir: PathBuf::from("/tmp/podweave/assets"),
        }
    }
}

impl PodweaveConfig {
    /// Build configuration from the environment (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        config.llm.api_key = require_var("OPENAI_API_KEY")?;
        config.tts.api_key = config.llm.api_key.clone();
        config.search.api_key = require_var("TAVILY_API_KEY")?;
        config.storage.bucket = require_var("STORAGE_BUCKET")?;

        if let Ok(url) = std::env::var("STORAGE_PUBLIC_URL") {
            config.storage.public_base_url = url;
        }
        if let Ok(root) = std::env::var("PODWEAVE_SCRATCH_ROOT") {
            config.scratch_root = PathBuf::from(&root);
            config.asset_cache_dir = config.scratch_root.join("assets");
        }
        if let Ok(path) = std::env::var("FFMPEG_PATH") {
            config.audio.ffmpeg_path = path;
        }
        if let Ok(path) = std::env::var("FFPROBE_PATH") {
            config.audio.ffprobe_path = path;
        }

        Ok(config)
    }
}

fn require_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar { name })
}

/// The curated feed catalog: one public broadcaster feed per category.
pub fn default_feeds() -> Vec<FeedCategory> {
    let categories = [
        ("general", 0),
        ("social", 1),
        ("technology", 2),
        ("politics", 3),
        ("economy", 4),
        ("world", 5),
        ("sports", 6),
        ("entertainment", 7),
    ];
    categories
        .into_iter()
        .map(|(field, n)| FeedCategory {
            field: field.to_string(),
            urls: vec![format!("https://www.nhk.or.jp/rss/news/cat{n}.xml")],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let config = PodweaveConfig::default();
        assert_eq!(config.tts.concurrency, 8);
        assert_eq!(config.audio.padding_ms, 4000);
        assert_eq!(config.feeds.len(), 8);
        assert!(config.feeds.iter().any(|f| f.field == "technology"));
    }

    #[test]
    fn feed_catalog_is_keyed_by_field() {
        let feeds = default_feeds();
        let tech = feeds.iter().find(|f| f.field == "technology").unwrap();
        assert_eq!(tech.urls.len(), 1);
        assert!(tech.urls[0].contains("cat2"));
    }
}
