//! Persistent scheduling state
//!
//! Everything the bot must remember between runs lives in one JSON document:
//! day/hour counters, per-category counters, the history of published texts
//! and images, and the ids of mentions and statuses already handled. The
//! document is loaded once at startup and saved after every action.
//!
//! The on-disk layout stays readable by (and from) older state files: every
//! field is optional on load, unknown fields are ignored, and history entries
//! that cannot be parsed are dropped rather than failing the whole load.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::clock::TimeSlot;
use crate::config::LimitsConfig;
use crate::error::{Result, StateError};
use crate::selector::PostCategory;

pub const STATE_VERSION: u32 = 1;
pub const HISTORY_LIMIT: usize = 400;
pub const PROCESSED_LIMIT: usize = 500;
pub const REBLOG_LIMIT: usize = 400;
/// Reblog ids kept across a day boundary
pub const REBLOG_KEEP_ON_RESET: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyCounters {
    pub date: String,
    pub posts: u32,
    pub engagements: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HourlyCounters {
    #[serde(alias = "hour_key")]
    pub key: String,
    pub posts: u32,
    pub engagements: u32,
}

/// Posts per content category for the current day
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerTypeCounters {
    #[serde(alias = "post_img_gmgn_short")]
    pub image_greeting: u32,
    #[serde(alias = "post_gmgn_long")]
    pub long_greeting: u32,
    #[serde(alias = "post_short_link")]
    pub short_link: u32,
    pub reblog: u32,
}

impl PerTypeCounters {
    pub fn get(&self, category: PostCategory) -> u32 {
        match category {
            PostCategory::ImageGreeting => self.image_greeting,
            PostCategory::LongGreeting => self.long_greeting,
            PostCategory::ShortLink => self.short_link,
            PostCategory::Reblog => self.reblog,
        }
    }

    fn increment(&mut self, category: PostCategory) {
        let slot = match category {
            PostCategory::ImageGreeting => &mut self.image_greeting,
            PostCategory::LongGreeting => &mut self.long_greeting,
            PostCategory::ShortLink => &mut self.short_link,
            PostCategory::Reblog => &mut self.reblog,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub text: String,
    #[serde(rename = "ts", alias = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
}

fn default_version() -> u32 {
    STATE_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(deserialize_with = "lenient_history")]
    pub history: Vec<HistoryEntry>,
    pub daily: DailyCounters,
    pub hourly: HourlyCounters,
    #[serde(alias = "processedNotifications")]
    pub processed_notifications: Vec<String>,
    #[serde(alias = "recentReblogs")]
    pub recent_reblogs: Vec<String>,
    pub pertype: PerTypeCounters,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            history: Vec::new(),
            daily: DailyCounters::default(),
            hourly: HourlyCounters::default(),
            processed_notifications: Vec::new(),
            recent_reblogs: Vec::new(),
            pertype: PerTypeCounters::default(),
        }
    }
}

/// Keep history entries that parse, drop the rest
fn lenient_history<'de, D>(deserializer: D) -> std::result::Result<Vec<HistoryEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    let total = raw.len();
    let entries: Vec<HistoryEntry> = raw
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();
    if entries.len() < total {
        debug!("Dropped {} unreadable history entries", total - entries.len());
    }
    Ok(entries)
}

/// Drop duplicates (keeping the latest occurrence), then keep the last `limit`
fn dedup_tail(ids: &mut Vec<String>, limit: usize) {
    let mut seen = std::collections::HashSet::new();
    let mut kept: Vec<String> = ids
        .drain(..)
        .rev()
        .filter(|id| seen.insert(id.clone()))
        .collect();
    kept.reverse();
    keep_last(&mut kept, limit);
    *ids = kept;
}

fn keep_last<T>(items: &mut Vec<T>, limit: usize) {
    if items.len() > limit {
        items.drain(..items.len() - limit);
    }
}

impl PersistedState {
    /// Start a new day when the local date changed.
    ///
    /// Returns whether a reset happened.
    pub fn reset_daily_if_needed(&mut self, slot: &TimeSlot) -> bool {
        let today = slot.day_key();
        if self.daily.date == today {
            return false;
        }
        debug!("New day {} (was '{}'), resetting daily counters", today, self.daily.date);
        self.daily = DailyCounters {
            date: today,
            posts: 0,
            engagements: 0,
        };
        self.pertype = PerTypeCounters::default();
        keep_last(&mut self.recent_reblogs, REBLOG_KEEP_ON_RESET);
        true
    }

    /// Start a new hour bucket when the local hour changed
    pub fn reset_hourly_if_needed(&mut self, slot: &TimeSlot) -> bool {
        let key = slot.hour_key();
        if self.hourly.key == key {
            return false;
        }
        self.hourly = HourlyCounters {
            key,
            posts: 0,
            engagements: 0,
        };
        true
    }

    pub fn can_post(&self, limits: &LimitsConfig) -> bool {
        self.daily.posts < limits.max_posts_per_day && self.hourly.posts < limits.max_posts_per_hour
    }

    pub fn can_engage(&self, limits: &LimitsConfig) -> bool {
        self.daily.engagements < limits.max_engagements_per_day
            && self.hourly.engagements < limits.max_engagements_per_hour
    }

    /// Count one published post or reblog
    pub fn record_post(&mut self, category: PostCategory) {
        self.daily.posts += 1;
        self.hourly.posts += 1;
        self.pertype.increment(category);
    }

    pub fn record_engagement(&mut self) {
        self.daily.engagements += 1;
        self.hourly.engagements += 1;
    }

    /// Append a published text (and image) to the history.
    ///
    /// Timestamps never go backwards: if the clock stepped back, the entry
    /// reuses the previous timestamp.
    pub fn record_history(&mut self, text: &str, media: Option<&str>, now: DateTime<Utc>) {
        let timestamp = match self.history.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        self.history.push(HistoryEntry {
            text: text.to_string(),
            timestamp,
            media: media.map(str::to_string),
        });
        keep_last(&mut self.history, HISTORY_LIMIT);
    }

    pub fn is_processed(&self, notification_id: &str) -> bool {
        self.processed_notifications.iter().any(|id| id == notification_id)
    }

    pub fn mark_processed(&mut self, notification_id: &str) {
        if !self.is_processed(notification_id) {
            self.processed_notifications.push(notification_id.to_string());
            keep_last(&mut self.processed_notifications, PROCESSED_LIMIT);
        }
    }

    pub fn was_reblogged(&self, status_id: &str) -> bool {
        self.recent_reblogs.iter().any(|id| id == status_id)
    }

    pub fn record_reblog(&mut self, status_id: &str) {
        if !self.was_reblogged(status_id) {
            self.recent_reblogs.push(status_id.to_string());
            keep_last(&mut self.recent_reblogs, REBLOG_LIMIT);
        }
    }

    /// Enforce bounds and uniqueness on freshly loaded data
    fn normalize(&mut self) {
        keep_last(&mut self.history, HISTORY_LIMIT);
        dedup_tail(&mut self.processed_notifications, PROCESSED_LIMIT);
        dedup_tail(&mut self.recent_reblogs, REBLOG_LIMIT);
        self.version = STATE_VERSION;
    }
}

/// Loads and saves [`PersistedState`] at a fixed path
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state file.
    ///
    /// A missing file is a fresh state; unparseable JSON is
    /// [`StateError::Corrupt`].
    pub fn load(&self) -> std::result::Result<PersistedState, StateError> {
        if !self.path.exists() {
            return Ok(PersistedState::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let mut state: PersistedState = serde_json::from_str(&content)?;
        state.normalize();
        Ok(state)
    }

    /// Like [`StateStore::load`], but a corrupt or unreadable file yields a
    /// fresh state. Losing counters only risks a temporary over/under-post.
    pub fn load_or_default(&self) -> PersistedState {
        match self.load() {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Could not load state from {}, starting fresh: {}",
                    self.path.display(),
                    e
                );
                PersistedState::default()
            }
        }
    }

    /// Write the whole state (temp file + rename)
    pub fn save(&self, state: &PersistedState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StateError::Io)?;
            }
        }

        let content = serde_json::to_string_pretty(state).map_err(StateError::Corrupt)?;
        let tmp_path = sibling(&self.path, ".tmp");
        std::fs::write(&tmp_path, content).map_err(StateError::Io)?;
        std::fs::rename(&tmp_path, &self.path).map_err(StateError::Io)?;
        Ok(())
    }

    /// Take the single-writer lock for this state file.
    ///
    /// The lock is advisory and released when the returned guard is dropped
    /// or the process exits.
    pub fn lock(&self) -> Result<StateLock> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StateError::Io)?;
            }
        }

        let lock_path = sibling(&self.path, ".lock");
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(StateError::Io)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == std::io::ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
            {
                return Err(StateError::Locked(lock_path.display().to_string()).into());
            }
            return Err(StateError::Io(e).into());
        }

        file.set_len(0).map_err(StateError::Io)?;
        writeln!(file, "{}", std::process::id()).map_err(StateError::Io)?;

        Ok(StateLock {
            _file: file,
            path: lock_path,
        })
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Held for as long as this process owns the state file
#[derive(Debug)]
pub struct StateLock {
    _file: File,
    path: PathBuf,
}

impl StateLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}
