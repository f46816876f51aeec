//! RON configuration for the `relay` binary.
//!
//! Every field has a default, so a partial file (or none at all) is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use log::LevelFilter;
use relay_engine::{
    BodyTextExtractor, ChatRelay, CommandRewriter, ContentRetriever, FetchSettings,
    GenerationParams, ReqwestFetcher, RewritePolicy, StreamSettings, StreamingTokenClient,
    DEFAULT_USER_AGENT,
};
use relay_logging::LogDestination;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "relay.ron";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub endpoint: String,
    pub generation: GenerationParams,
    pub fetch: FetchConfig,
    pub word_limit: usize,
    pub policy: RewritePolicy,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/chat".to_string(),
            generation: GenerationParams::default(),
            fetch: FetchConfig::default(),
            word_limit: relay_core::DEFAULT_WORD_LIMIT,
            policy: RewritePolicy::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_ms: u64,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let defaults = FetchSettings::default();
        Self {
            connect_timeout_ms: defaults.connect_timeout.as_millis() as u64,
            redirect_limit: defaults.redirect_limit,
            max_bytes: defaults.max_bytes,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_attempts: defaults.max_attempts,
            backoff_base_ms: defaults.backoff_base.as_millis() as u64,
        }
    }
}

impl FetchConfig {
    fn settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            redirect_limit: self.redirect_limit,
            max_bytes: self.max_bytes,
            user_agent: self.user_agent.clone(),
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogTarget {
    Terminal,
    File,
    Both,
    Off,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::File => LogDestination::File,
            LogTarget::Both => LogDestination::Both,
            LogTarget::Off => LogDestination::Off,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub target: LogTarget,
    pub level: String,
    pub path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            target: LogTarget::File,
            level: "info".to_string(),
            path: PathBuf::from("./relay.log"),
        }
    }
}

impl LogConfig {
    pub fn level_filter(&self) -> anyhow::Result<LevelFilter> {
        LevelFilter::from_str(&self.level)
            .map_err(|_| anyhow!("unknown log level {:?}", self.level))
    }
}

impl AppConfig {
    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read config {:?}", path));
            }
        };
        Self::parse(&content).with_context(|| format!("failed to parse config {:?}", path))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = ron::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.endpoint_url()?;
        self.log.level_filter()?;
        if self.word_limit == 0 {
            return Err(anyhow!("word_limit must be greater than zero"));
        }
        if self.fetch.max_attempts == 0 {
            return Err(anyhow!("fetch.max_attempts must be greater than zero"));
        }
        Ok(())
    }

    pub fn endpoint_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.endpoint).with_context(|| format!("invalid endpoint {:?}", self.endpoint))
    }

    pub fn build_relay(&self) -> anyhow::Result<ChatRelay> {
        let fetcher = ReqwestFetcher::new(self.fetch.settings())?;
        let retriever = ContentRetriever::new(Arc::new(fetcher), Arc::new(BodyTextExtractor));
        let rewriter = CommandRewriter::with_word_limit(retriever, self.word_limit);

        let mut stream_settings = StreamSettings::new(self.endpoint_url()?);
        stream_settings.connect_timeout = Duration::from_millis(self.fetch.connect_timeout_ms);
        stream_settings.generation = self.generation;
        let client = StreamingTokenClient::new(stream_settings)?;

        Ok(ChatRelay::new(rewriter, client, self.policy))
    }
}
