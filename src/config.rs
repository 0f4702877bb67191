//! Startup configuration.
//!
//! Loaded from an optional TOML file with environment fallbacks; the engine
//! credential may come from `OPENAI_API_KEY`. Validation is fatal by design:
//! a missing credential or a malformed endpoint aborts startup before any
//! channel is created. Everything after startup recovers on its own.

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::engine::ReconnectConfig;
use crate::relay::Direction;

/// Environment variable consulted when the file carries no credential.
const API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
const DEFAULT_ENGINE_URL: &str = "wss://api.openai.com/v1/realtime";
const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

/// The only error kind allowed to stop the process.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("no engine credential: set OPENAI_API_KEY or engine.api_key in the config file")]
    MissingCredential,

    #[error("engine endpoint `{0}` must be a ws:// or wss:// URL")]
    InvalidEndpoint(String),

    #[error("invalid listen address `{0}`")]
    InvalidListenAddr(String),
}

/// Connection settings for the remote translation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub url: String,
    pub model: String,
    pub api_key: String,
}

/// Display names of the two participants' languages, used to build each
/// direction's translation instruction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Languages {
    pub a: String,
    pub b: String,
}

impl Default for Languages {
    fn default() -> Self {
        Self {
            a: "English".into(),
            b: "Spanish".into(),
        }
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub engine: EngineConfig,
    pub languages: Languages,
    pub reconnect: ReconnectConfig,
}

impl Config {
    /// Load and validate. `path = None` uses defaults plus environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.display().to_string(),
                    source,
                })?;
                toml::from_str::<ConfigFile>(&text).map_err(|source| ConfigError::Parse {
                    path: p.display().to_string(),
                    source,
                })?
            }
            None => ConfigFile::default(),
        };
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let listen_raw = file.listen.unwrap_or_else(|| DEFAULT_LISTEN.into());
        let listen = listen_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidListenAddr(listen_raw))?;

        let api_key = file
            .engine
            .api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()))
            .ok_or(ConfigError::MissingCredential)?;

        let url = file.engine.url.unwrap_or_else(|| DEFAULT_ENGINE_URL.into());
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(ConfigError::InvalidEndpoint(url));
        }

        Ok(Self {
            listen,
            engine: EngineConfig {
                url,
                model: file.engine.model.unwrap_or_else(|| DEFAULT_MODEL.into()),
                api_key,
            },
            languages: file.languages,
            reconnect: file.reconnect,
        })
    }

    /// Translation instruction for one direction, fixed at channel creation.
    pub fn system_prompt(&self, direction: Direction) -> String {
        let (input, output) = match direction {
            Direction::AToB => (&self.languages.a, &self.languages.b),
            Direction::BToA => (&self.languages.b, &self.languages.a),
        };
        format!(
            "You are a real-time interpreter. Input language: {input}. \
             Output language: {output}. Respond ONLY with translated speech and text."
        )
    }
}

// ── File schema ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    listen: Option<String>,
    #[serde(default)]
    engine: EngineFile,
    #[serde(default)]
    languages: Languages,
    #[serde(default)]
    reconnect: ReconnectConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EngineFile {
    url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
}

// ── Tests ──────────────────────────────────────────────────────────
