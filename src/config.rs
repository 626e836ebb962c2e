use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::music::PlayerSettings;

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_QUEUE_LEN: usize = 500;

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub idle_timeout: Duration,
    /// `None` means the queue is unbounded.
    pub max_queue_len: Option<usize>,
    pub ytdlp_path: String,
    pub ytdlp_cookies: Option<PathBuf>,
}

impl Config {
    /// Reads configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_token = lookup("DISCORD_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("DISCORD_TOKEN".into()))?;

        let idle_timeout = Duration::from_secs(parse_or(
            &lookup,
            "IDLE_TIMEOUT_SECS",
            DEFAULT_IDLE_TIMEOUT_SECS,
        )?);

        let max_queue_len = match parse_or(&lookup, "MAX_QUEUE_LEN", DEFAULT_MAX_QUEUE_LEN)? {
            0 => None,
            len => Some(len),
        };

        let ytdlp_path = lookup("YTDLP_PATH").unwrap_or_else(|| "yt-dlp".into());
        let ytdlp_cookies = lookup("YTDLP_COOKIES")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            discord_token,
            idle_timeout,
            max_queue_len,
            ytdlp_path,
            ytdlp_cookies,
        })
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            idle_timeout: self.idle_timeout,
            max_queue_len: self.max_queue_len,
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name: name.into(),
            value: raw,
        }),
        None => Ok(default),
    }
}
