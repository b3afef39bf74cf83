//! Mastodon platform implementation
//!
//! Talks to Mastodon (and API-compatible Fediverse servers) through the
//! megalodon library.

use std::path::Path;

use async_trait::async_trait;
use megalodon::entities::notification::NotificationType;
use megalodon::entities::StatusVisibility;
use megalodon::megalodon::{
    GetHomeTimelineInputOptions, GetNotificationsInputOptions, PostStatusInputOptions,
    PostStatusOutput, UploadMediaInputOptions,
};
use megalodon::{Megalodon, SNS};
use secrecy::ExposeSecret;

use crate::config::MastodonCredentials;
use crate::error::PlatformError;
use crate::platforms::{
    Notification, NotificationKind, PlatformResult, SocialPlatform, TimelineStatus,
};

/// Mastodon client
pub struct MastodonClient {
    client: Box<dyn Megalodon + Send + Sync>,
    instance_url: String,
}

impl MastodonClient {
    /// Create a client for `instance_url` authenticated with `access_token`.
    ///
    /// No request is made; call [`SocialPlatform::who_am_i`] to verify the
    /// credentials.
    pub fn new(instance_url: String, access_token: String) -> PlatformResult<Self> {
        let client = megalodon::generator(
            SNS::Mastodon,
            instance_url.clone(),
            Some(access_token),
            None,
        )
        .map_err(|e| {
            PlatformError::Authentication(format!("Failed to create Mastodon client: {:?}", e))
        })?;

        Ok(Self {
            client,
            instance_url,
        })
    }

    pub fn from_credentials(credentials: &MastodonCredentials) -> PlatformResult<Self> {
        Self::new(
            credentials.instance_url.clone(),
            credentials.access_token.expose_secret().to_string(),
        )
    }

    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }

    async fn post(
        &self,
        text: &str,
        options: &PostStatusInputOptions,
        context: &str,
    ) -> PlatformResult<String> {
        let response = self
            .client
            .post_status(text.to_string(), Some(options))
            .await
            .map_err(|e| map_megalodon_error(e, context))?;

        let id = match response.json {
            PostStatusOutput::Status(status) => status.id,
            PostStatusOutput::ScheduledStatus(scheduled) => scheduled.id,
        };
        Ok(id)
    }
}

#[async_trait]
impl SocialPlatform for MastodonClient {
    async fn post_status(&self, text: &str, media_ids: &[String]) -> PlatformResult<String> {
        let options = status_options(media_ids, None);
        self.post(text, &options, "post status").await
    }

    async fn upload_media(&self, path: &Path, description: &str) -> PlatformResult<String> {
        let options = UploadMediaInputOptions {
            description: Some(description.to_string()),
            ..Default::default()
        };
        let response = self
            .client
            .upload_media(path.to_string_lossy().into_owned(), Some(&options))
            .await
            .map_err(|e| map_megalodon_error(e, "upload media"))?;

        let id = match response.json {
            megalodon::entities::UploadMedia::Attachment(attachment) => attachment.id,
            megalodon::entities::UploadMedia::AsyncAttachment(attachment) => attachment.id,
        };
        Ok(id)
    }

    async fn list_notifications(&self, limit: u32) -> PlatformResult<Vec<Notification>> {
        let options = GetNotificationsInputOptions {
            limit: Some(limit),
            ..Default::default()
        };
        let response = self
            .client
            .get_notifications(Some(&options))
            .await
            .map_err(|e| map_megalodon_error(e, "list notifications"))?;

        Ok(response
            .json
            .into_iter()
            .map(|n| Notification {
                id: n.id,
                kind: match n.r#type {
                    NotificationType::Mention => NotificationKind::Mention,
                    other => NotificationKind::Other(format!("{:?}", other).to_lowercase()),
                },
                status_id: n.status.map(|s| s.id),
            })
            .collect())
    }

    async fn favourite(&self, status_id: &str) -> PlatformResult<()> {
        self.client
            .favourite_status(status_id.to_string())
            .await
            .map_err(|e| map_megalodon_error(e, "favourite"))?;
        Ok(())
    }

    async fn reblog(&self, status_id: &str) -> PlatformResult<()> {
        self.client
            .reblog_status(status_id.to_string())
            .await
            .map_err(|e| map_megalodon_error(e, "reblog"))?;
        Ok(())
    }

    async fn reply(&self, status_id: &str, text: &str) -> PlatformResult<String> {
        let options = status_options(&[], Some(status_id));
        self.post(text, &options, "reply").await
    }

    async fn home_timeline(&self, limit: u32) -> PlatformResult<Vec<TimelineStatus>> {
        let options = GetHomeTimelineInputOptions {
            limit: Some(limit),
            ..Default::default()
        };
        let response = self
            .client
            .get_home_timeline(Some(&options))
            .await
            .map_err(|e| map_megalodon_error(e, "home timeline"))?;

        Ok(response
            .json
            .into_iter()
            .map(|status| TimelineStatus {
                is_reblog: status.reblog.is_some(),
                account_id: status.account.id,
                id: status.id,
            })
            .collect())
    }

    async fn who_am_i(&self) -> PlatformResult<String> {
        let response = self
            .client
            .verify_account_credentials()
            .await
            .map_err(|e| map_megalodon_error(e, "verify credentials"))?;
        Ok(response.json.id)
    }
}

/// Options for a new status. Posts and replies are always public, whatever
/// the account's default visibility.
fn status_options(media_ids: &[String], in_reply_to_id: Option<&str>) -> PostStatusInputOptions {
    PostStatusInputOptions {
        media_ids: if media_ids.is_empty() {
            None
        } else {
            Some(media_ids.to_vec())
        },
        in_reply_to_id: in_reply_to_id.map(str::to_string),
        visibility: Some(StatusVisibility::Public),
        ..Default::default()
    }
}

/// Map megalodon errors to PlatformError
fn map_megalodon_error(error: megalodon::error::Error, context: &str) -> PlatformError {
    classify_error(&error.to_string(), context)
}

/// Classify an error message from the server or the HTTP layer.
///
/// - HTTP 401/403 → `Authentication`
/// - HTTP 422 → `Validation`
/// - HTTP 429 or rate-limit wording → `RateLimit`
/// - HTTP 5xx and everything unrecognised → `Network`
/// - Parse errors → `Posting`
fn classify_error(error_str: &str, context: &str) -> PlatformError {
    let error_lower = error_str.to_lowercase();

    match extract_http_status(error_str) {
        Some(401) | Some(403) => PlatformError::Authentication(format!(
            "Mastodon authentication failed ({}): {}. \
                    Suggestion: Verify your access token is valid and has not been revoked.",
            context, error_str
        )),
        Some(422) => PlatformError::Validation(format!(
            "Mastodon validation failed ({}): {}",
            context, error_str
        )),
        Some(429) => PlatformError::RateLimit(format!(
            "Mastodon rate limit exceeded ({}): {}",
            context, error_str
        )),
        Some(500..=599) => PlatformError::Network(format!(
            "Mastodon server error ({}): {}",
            context, error_str
        )),
        Some(_) => {
            PlatformError::Network(format!("Mastodon HTTP error ({}): {}", context, error_str))
        }
        None => {
            if error_lower.contains("rate limit")
                || error_lower.contains("ratelimit")
                || error_lower.contains("too many requests")
            {
                PlatformError::RateLimit(format!(
                    "Mastodon rate limit exceeded ({}): {}",
                    context, error_str
                ))
            } else if error_lower.contains("unauthorized")
                || error_lower.contains("forbidden")
                || error_lower.contains("authentication")
            {
                PlatformError::Authentication(format!(
                    "Mastodon authentication failed ({}): {}",
                    context, error_str
                ))
            } else if error_lower.contains("parse")
                || error_lower.contains("json")
                || error_lower.contains("deserialize")
            {
                PlatformError::Posting(format!(
                    "Mastodon response parse error ({}): {}",
                    context, error_str
                ))
            } else if error_lower.contains("validation") || error_lower.contains("unprocessable") {
                PlatformError::Validation(format!(
                    "Mastodon validation failed ({}): {}",
                    context, error_str
                ))
            } else {
                PlatformError::Network(format!(
                    "Mastodon error ({}): {}. \
                        Suggestion: Check your network connection and instance availability.",
                    context, error_str
                ))
            }
        }
    }
}

/// Extract an HTTP status code from an error message.
///
/// Looks for "HTTP 401", "status 403", "code: 429", or a standalone
/// three-digit code followed by a colon or space.
fn extract_http_status(error_str: &str) -> Option<u16> {
    let prefixes = ["HTTP ", "status ", "code: ", "status_code: "];

    for prefix in &prefixes {
        if let Some(pos) = error_str.find(prefix) {
            let after_prefix = &error_str[pos + prefix.len()..];
            if let Some(code) = after_prefix.get(0..3).and_then(|s| s.parse::<u16>().ok()) {
                if (100..=599).contains(&code) {
                    return Some(code);
                }
            }
        }
    }

    let bytes = error_str.as_bytes();
    for (i, window) in bytes.windows(4).enumerate() {
        let digits = window[..3].iter().all(u8::is_ascii_digit);
        let delimited = window[3] == b':' || window[3] == b' ';
        let standalone = i == 0 || !bytes[i - 1].is_ascii_digit();
        if digits && delimited && standalone {
            let code = std::str::from_utf8(&window[..3])
                .ok()
                .and_then(|s| s.parse::<u16>().ok());
            if let Some(code) = code.filter(|c| (100..=599).contains(c)) {
                return Some(code);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mastodon_client_creation() {
        let client = MastodonClient::new(
            "https://mastodon.social".to_string(),
            "test-token".to_string(),
        )
        .expect("Failed to create client");

        assert_eq!(client.instance_url(), "https://mastodon.social");
    }

    #[test]
    fn test_from_credentials() {
        let credentials = MastodonCredentials {
            instance_url: "https://example.social".to_string(),
            access_token: "abc".to_string().into(),
        };
        let client = MastodonClient::from_credentials(&credentials).unwrap();
        assert_eq!(client.instance_url(), "https://example.social");
    }

    #[test]
    fn test_status_options_are_public() {
        let post = status_options(&["m1".to_string()], None);
        assert!(matches!(post.visibility, Some(StatusVisibility::Public)));
        assert_eq!(post.media_ids, Some(vec!["m1".to_string()]));
        assert_eq!(post.in_reply_to_id, None);

        let reply = status_options(&[], Some("s-9"));
        assert!(matches!(reply.visibility, Some(StatusVisibility::Public)));
        assert_eq!(reply.media_ids, None);
        assert_eq!(reply.in_reply_to_id.as_deref(), Some("s-9"));
    }

    #[test]
    fn test_extract_http_status_with_prefixes() {
        assert_eq!(extract_http_status("HTTP 401 Unauthorized"), Some(401));
        assert_eq!(extract_http_status("HTTP 429 Too Many Requests"), Some(429));
        assert_eq!(extract_http_status("status 404 not found"), Some(404));
        assert_eq!(extract_http_status("code: 401"), Some(401));
        assert_eq!(extract_http_status("status_code: 429"), Some(429));
    }

    #[test]
    fn test_extract_http_status_standalone() {
        assert_eq!(extract_http_status("Error: 401: Unauthorized"), Some(401));
        assert_eq!(
            extract_http_status("Failed with 422: validation error"),
            Some(422)
        );
    }

    #[test]
    fn test_extract_http_status_none() {
        assert_eq!(extract_http_status("Network error"), None);
        assert_eq!(extract_http_status("HTTP 999"), None);
        assert_eq!(extract_http_status("HTTP 99"), None);
        assert_eq!(extract_http_status("1234"), None);
    }

    #[test]
    fn test_classify_rate_limit() {
        assert!(classify_error("HTTP 429 Too Many Requests", "post status").is_rate_limit());
        assert!(classify_error("Rate limit exceeded", "favourite").is_rate_limit());
        assert!(classify_error("too many requests, slow down", "reblog").is_rate_limit());
    }

    #[test]
    fn test_classify_authentication() {
        match classify_error("HTTP 401 Unauthorized", "verify credentials") {
            PlatformError::Authentication(msg) => {
                assert!(msg.contains("verify credentials"));
                assert!(msg.contains("Suggestion"));
            }
            other => panic!("Expected authentication error, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_validation_and_server_errors() {
        assert!(matches!(
            classify_error("HTTP 422 Unprocessable Entity", "post status"),
            PlatformError::Validation(_)
        ));
        assert!(matches!(
            classify_error("HTTP 503 Service Unavailable", "home timeline"),
            PlatformError::Network(_)
        ));
        assert!(matches!(
            classify_error("error decoding json body", "list notifications"),
            PlatformError::Posting(_)
        ));
        assert!(matches!(
            classify_error("connection reset by peer", "reply"),
            PlatformError::Network(_)
        ));
    }
}
