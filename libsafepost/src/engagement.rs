//! Opt-in engagement
//!
//! Only mentions are engaged with: someone addressed the bot directly. Each
//! cycle handles at most one of them, with either a favourite or a short
//! reply.

use rand::Rng;

use crate::content::ContentLibrary;
use crate::error::Result;
use crate::platforms::{Notification, SocialPlatform};
use crate::retry::RetryPolicy;
use crate::state::PersistedState;

/// How the bot reacts to a mention
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Engagement {
    Favourite,
    Reply(String),
}

impl Engagement {
    /// Mostly a favourite; otherwise a reply. Falls back to a favourite when
    /// there is nothing to reply with.
    pub fn choose<R: Rng + ?Sized>(content: &ContentLibrary<'_>, rng: &mut R) -> Self {
        let favourite_probability = content.config().favourite_probability.clamp(0.0, 1.0);
        if rng.gen_bool(favourite_probability) {
            return Engagement::Favourite;
        }
        match content.reply_text(rng) {
            Some(text) => Engagement::Reply(text),
            None => Engagement::Favourite,
        }
    }

    pub async fn perform<P: SocialPlatform + ?Sized>(
        &self,
        platform: &P,
        retry: &RetryPolicy,
        status_id: &str,
    ) -> Result<()> {
        match self {
            Engagement::Favourite => {
                retry
                    .run("favourite", move || platform.favourite(status_id))
                    .await
            }
            Engagement::Reply(text) => {
                let text = text.as_str();
                retry
                    .run("reply", move || platform.reply(status_id, text))
                    .await
                    .map(|_| ())
            }
        }
    }
}

impl std::fmt::Display for Engagement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Engagement::Favourite => write!(f, "favourite"),
            Engagement::Reply(text) => write!(f, "reply:{}", text),
        }
    }
}

/// Mentions not handled yet, in the order the server returned them
pub fn unprocessed_mentions(
    notifications: Vec<Notification>,
    state: &PersistedState,
) -> Vec<Notification> {
    notifications
        .into_iter()
        .filter(|n| n.is_mention() && !n.id.is_empty() && !state.is_processed(&n.id))
        .collect()
}

pub async fn fetch_unprocessed_mentions<P: SocialPlatform + ?Sized>(
    platform: &P,
    retry: &RetryPolicy,
    state: &PersistedState,
    limit: u32,
) -> Result<Vec<Notification>> {
    let notifications = retry
        .run("list_notifications", move || platform.list_notifications(limit))
        .await?;
    Ok(unprocessed_mentions(notifications, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContentConfig;
    use crate::platforms::mock::{MockCall, MockPlatform};
    use crate::platforms::NotificationKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn notification(id: &str, kind: NotificationKind) -> Notification {
        Notification {
            id: id.to_string(),
            kind,
            status_id: Some(format!("s-{}", id)),
        }
    }

    #[test]
    fn test_only_unprocessed_mentions_survive() {
        let mut state = PersistedState::default();
        state.mark_processed("2");

        let fresh = unprocessed_mentions(
            vec![
                notification("1", NotificationKind::Mention),
                notification("2", NotificationKind::Mention),
                notification("3", NotificationKind::Other("favourite".to_string())),
                notification("4", NotificationKind::Mention),
            ],
            &state,
        );
        let ids: Vec<&str> = fresh.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "4"]);
    }

    #[test]
    fn test_choose_respects_probabilities() {
        let always_favourite = ContentConfig {
            favourite_probability: 1.0,
            ..ContentConfig::default()
        };
        let library = ContentLibrary::new(&always_favourite, "unused");
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(Engagement::choose(&library, &mut rng), Engagement::Favourite);

        let always_reply = ContentConfig {
            favourite_probability: 0.0,
            reply_phrase_probability: 1.0,
            ..ContentConfig::default()
        };
        let library = ContentLibrary::new(&always_reply, "unused");
        match Engagement::choose(&library, &mut rng) {
            Engagement::Reply(text) => assert!(always_reply.reply_phrases.contains(&text)),
            other => panic!("Expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_choose_without_reply_pools_favourites() {
        let config = ContentConfig {
            favourite_probability: 0.0,
            reply_phrases: Vec::new(),
            reply_emojis: Vec::new(),
            ..ContentConfig::default()
        };
        let library = ContentLibrary::new(&config, "unused");
        let mut rng = StdRng::seed_from_u64(2);
        assert_eq!(Engagement::choose(&library, &mut rng), Engagement::Favourite);
    }

    #[tokio::test]
    async fn test_perform_reply() {
        let platform = MockPlatform::default();
        Engagement::Reply("Thanks!".to_string())
            .perform(&platform, &RetryPolicy::default(), "s-9")
            .await
            .unwrap();

        assert_eq!(
            platform.writes(),
            vec![MockCall::Reply {
                status_id: "s-9".to_string(),
                text: "Thanks!".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_fetch_uses_limit() {
        let platform = MockPlatform::default();
        platform.add_mention("n1", Some("s1"));
        let state = PersistedState::default();

        let mentions = fetch_unprocessed_mentions(&platform, &RetryPolicy::default(), &state, 40)
            .await
            .unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(platform.calls(), vec![MockCall::ListNotifications { limit: 40 }]);
    }
}
