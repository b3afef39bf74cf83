//! Configuration management for Safepost
//!
//! Configuration is a TOML file whose sections all have defaults, so an empty
//! file (or no file at all) yields the stock anti-spam policy. The Mastodon
//! credentials can also come from `MASTODON_BASE_URL` and
//! `MASTODON_ACCESS_TOKEN`, which take precedence over the file.

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{QuietHours, WindowClassifier};
use crate::error::{ConfigError, Result};
use crate::scheduling::DurationRange;

pub const CONFIG_ENV: &str = "SAFEPOST_CONFIG";
pub const BASE_URL_ENV: &str = "MASTODON_BASE_URL";
pub const ACCESS_TOKEN_ENV: &str = "MASTODON_ACCESS_TOKEN";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mastodon: MastodonConfig,
    pub state: StateConfig,
    pub schedule: ScheduleConfig,
    pub limits: LimitsConfig,
    pub content: ContentConfig,
    pub delays: DelayConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MastodonConfig {
    /// Instance base URL, e.g. `https://mastodon.social`
    pub instance: String,
    /// File holding the OAuth access token
    pub token_file: Option<String>,
    /// Token taken from the environment; never written back to disk
    #[serde(skip)]
    pub access_token: Option<SecretString>,
}

/// Resolved credentials for the remote service
#[derive(Debug)]
pub struct MastodonCredentials {
    pub instance_url: String,
    pub access_token: SecretString,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/safepost/state.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// IANA timezone used for windows, quiet hours and day boundaries
    pub timezone: String,
    pub quiet_start_hour: u32,
    pub quiet_end_hour: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Brussels".to_string(),
            quiet_start_hour: 23,
            quiet_end_hour: 7,
        }
    }
}

impl ScheduleConfig {
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|e| {
            ConfigError::InvalidValue {
                field: "schedule.timezone".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn quiet_hours(&self) -> QuietHours {
        QuietHours::new(self.quiet_start_hour, self.quiet_end_hour)
    }

    pub fn classifier(&self) -> Result<WindowClassifier> {
        Ok(WindowClassifier::new(self.timezone()?, self.quiet_hours()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_posts_per_day: u32,
    pub max_posts_per_hour: u32,
    pub max_engagements_per_day: u32,
    pub max_engagements_per_hour: u32,
    pub max_image_greetings_per_day: u32,
    pub max_short_links_per_day: u32,
    pub max_long_greetings_per_day: u32,
    pub notification_fetch_limit: u32,
    pub timeline_fetch_limit: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_posts_per_day: 4,
            max_posts_per_hour: 2,
            max_engagements_per_day: 10,
            max_engagements_per_hour: 3,
            max_image_greetings_per_day: 2,
            max_short_links_per_day: 2,
            max_long_greetings_per_day: 1,
            notification_fetch_limit: 40,
            timeline_fetch_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub images_dir: String,
    pub image_extensions: Vec<String>,
    /// Alt text attached to every uploaded image
    pub image_description: String,
    pub text_lookback_days: u32,
    pub image_lookback_days: u32,

    pub gm_short: Vec<String>,
    pub gn_short: Vec<String>,
    pub gn_emojis: Vec<String>,
    pub gm_long: Vec<String>,
    pub gn_long: Vec<String>,
    pub links: Vec<String>,
    pub reply_phrases: Vec<String>,
    pub reply_emojis: Vec<String>,

    pub gn_emoji_probability: f64,
    pub long_image_probability: f64,
    pub favourite_probability: f64,
    pub reply_phrase_probability: f64,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            images_dir: "./assets/posts".to_string(),
            image_extensions: strings(&["jpg", "jpeg", "png"]),
            image_description: "Artwork".to_string(),
            text_lookback_days: 7,
            image_lookback_days: 14,
            gm_short: strings(&["GM ☀️", "GM ✨", "GM 🌞", "GM 🌿", "GM 👋"]),
            gn_short: strings(&["GN", "Gn", "gn", "Good night", "Night"]),
            gn_emojis: strings(&["🌙", "✨", "⭐", "💤", "🌌", "🫶", "💫", "😴", "🌠"]),
            gm_long: strings(&[
                "GM 🌱 Wishing you a day full of creativity and light.",
                "GM ✨ New day, new brushstrokes.",
                "GM 🌊 Let's dive into imagination today.",
            ]),
            gn_long: strings(&[
                "Good night 🌙💫 May your dreams be as colorful as art.",
                "GN 🌌 See you in tomorrow's stories.",
                "Resting the canvas for tomorrow's colors. GN ✨",
            ]),
            links: Vec::new(),
            reply_phrases: strings(&[
                "Thanks for the mention!",
                "Appreciate it 🙏",
                "Thanks for looping me in ✨",
                "Thanks!",
            ]),
            reply_emojis: strings(&[
                "🔥", "👍", "👏", "😍", "✨", "🫶", "🎉", "💯", "🤝", "⚡", "🌟",
            ]),
            gn_emoji_probability: 0.85,
            long_image_probability: 0.30,
            favourite_probability: 0.75,
            reply_phrase_probability: 0.70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    /// Pause after a post or reblog
    pub post: DurationRange,
    /// Pause after an engagement
    pub engage: DurationRange,
    pub quiet_sleep: DurationRange,
    pub active_sleep: DurationRange,
    pub night_sleep: DurationRange,
    pub extra_pause: DurationRange,
    pub extra_pause_probability: f64,
    /// Pause after a cycle that errored in continuous mode
    pub cooldown: DurationRange,
}

impl Default for DelayConfig {
    fn default() -> Self {
        let minutes = |a: u64, b: u64| {
            DurationRange::from_secs(a * 60, b * 60).unwrap_or_else(|_| DurationRange::zero())
        };
        let seconds = |a: u64, b: u64| {
            DurationRange::from_secs(a, b).unwrap_or_else(|_| DurationRange::zero())
        };
        Self {
            post: seconds(8, 28),
            engage: seconds(12, 45),
            quiet_sleep: minutes(70, 120),
            active_sleep: minutes(25, 55),
            night_sleep: minutes(45, 80),
            extra_pause: minutes(20, 40),
            extra_pause_probability: 0.18,
            cooldown: seconds(60, 120),
        }
    }
}

impl Config {
    /// Load configuration, apply environment overrides and validate.
    ///
    /// An explicit path (argument or `SAFEPOST_CONFIG`) must exist. The
    /// default location is optional; built-in defaults apply without it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(|p| expand_path(&p)));

        let mut config = match explicit {
            Some(path) => Self::load_from_path(&path)?,
            None => {
                let path = resolve_config_path()?;
                if path.exists() {
                    Self::load_from_path(&path)?
                } else {
                    debug!("No config file at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path (no env overrides)
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.mastodon.instance = url.trim().to_string();
            }
        }
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.mastodon.access_token = Some(SecretString::from(token.trim().to_string()));
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.schedule.timezone()?;

        for (field, hour) in [
            ("schedule.quiet_start_hour", self.schedule.quiet_start_hour),
            ("schedule.quiet_end_hour", self.schedule.quiet_end_hour),
        ] {
            if hour > 23 {
                return Err(invalid(field, format!("{} is not an hour of the day", hour)));
            }
        }

        for (field, p) in [
            ("content.gn_emoji_probability", self.content.gn_emoji_probability),
            ("content.long_image_probability", self.content.long_image_probability),
            ("content.favourite_probability", self.content.favourite_probability),
            ("content.reply_phrase_probability", self.content.reply_phrase_probability),
            ("delays.extra_pause_probability", self.delays.extra_pause_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(invalid(field, format!("{} is not a probability", p)));
            }
        }

        if self.limits.notification_fetch_limit == 0 || self.limits.timeline_fetch_limit == 0 {
            return Err(invalid("limits", "fetch limits must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Resolve instance URL and access token.
    ///
    /// The token comes from the environment if set, otherwise from
    /// `mastodon.token_file`.
    pub fn credentials(&self) -> Result<MastodonCredentials> {
        let instance = self.mastodon.instance.trim();
        if instance.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "mastodon.instance (or {})",
                BASE_URL_ENV
            ))
            .into());
        }

        let instance_url = if instance.starts_with("http://") || instance.starts_with("https://") {
            instance.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", instance.trim_end_matches('/'))
        };

        let access_token = match (&self.mastodon.access_token, &self.mastodon.token_file) {
            (Some(token), _) => SecretString::from(token.expose_secret().to_string()),
            (None, Some(file)) => {
                let token = std::fs::read_to_string(expand_path(file))
                    .map_err(ConfigError::ReadError)?
                    .trim()
                    .to_string();
                if token.is_empty() {
                    return Err(invalid("mastodon.token_file", "token file is empty".to_string()));
                }
                SecretString::from(token)
            }
            (None, None) => {
                return Err(ConfigError::MissingField(format!(
                    "mastodon.token_file (or {})",
                    ACCESS_TOKEN_ENV
                ))
                .into())
            }
        };

        Ok(MastodonCredentials {
            instance_url,
            access_token,
        })
    }

    pub fn state_path(&self) -> PathBuf {
        expand_path(&self.state.path)
    }

    pub fn images_dir(&self) -> PathBuf {
        expand_path(&self.content.images_dir)
    }
}

fn invalid(field: &str, reason: String) -> crate::error::SafepostError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason,
    }
    .into()
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Default configuration file location (`<config dir>/safepost/config.toml`)
pub fn resolve_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("safepost").join("config.toml"))
}
