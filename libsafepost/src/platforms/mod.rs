//! Remote service abstraction
//!
//! The bot only needs a handful of calls from a Fediverse server. They sit
//! behind [`SocialPlatform`] so the cycle logic can run against the real
//! Mastodon client or the in-memory mock.

use async_trait::async_trait;
use std::path::Path;

use crate::error::PlatformError;

pub mod mastodon;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Notification type, reduced to what the bot cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    Mention,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    /// The status that triggered the notification, when there is one
    pub status_id: Option<String>,
}

impl Notification {
    pub fn is_mention(&self) -> bool {
        self.kind == NotificationKind::Mention
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineStatus {
    pub id: String,
    pub account_id: String,
    /// The status is itself a boost of another status
    pub is_reblog: bool,
}

/// Calls the bot makes against its home server
///
/// Every method may fail transiently; callers wrap them in
/// [`RetryPolicy::run`](crate::retry::RetryPolicy::run).
#[async_trait]
pub trait SocialPlatform: Send + Sync {
    /// Publish a status, returning its id
    async fn post_status(&self, text: &str, media_ids: &[String]) -> PlatformResult<String>;

    /// Upload an image with alt text, returning the media id
    async fn upload_media(&self, path: &Path, description: &str) -> PlatformResult<String>;

    /// Most recent notifications, newest first
    async fn list_notifications(&self, limit: u32) -> PlatformResult<Vec<Notification>>;

    async fn favourite(&self, status_id: &str) -> PlatformResult<()>;

    async fn reblog(&self, status_id: &str) -> PlatformResult<()>;

    /// Publish `text` as a reply to `status_id`
    async fn reply(&self, status_id: &str, text: &str) -> PlatformResult<String>;

    async fn home_timeline(&self, limit: u32) -> PlatformResult<Vec<TimelineStatus>>;

    /// Account id of the authenticated user. Also serves as a credentials check.
    async fn who_am_i(&self) -> PlatformResult<String>;
}
