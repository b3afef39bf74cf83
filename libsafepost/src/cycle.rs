//! One safe action per cycle
//!
//! A cycle classifies the current time, rolls the day/hour buckets, handles
//! at most one pending mention, and otherwise publishes at most one post or
//! reblog. State is saved after every mutation, before the post-action pause.
//! Remote and save failures end up in the cycle's [`CycleOutcome`]; a cycle
//! never fails as a whole.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::clock::{TimeSlot, Window, WindowClassifier};
use crate::config::{Config, ContentConfig};
use crate::content::ContentLibrary;
use crate::engagement::{fetch_unprocessed_mentions, Engagement};
use crate::error::Result;
use crate::picker::RepetitionGuard;
use crate::platforms::{Notification, SocialPlatform};
use crate::reblog::find_reblog_candidate;
use crate::retry::RetryPolicy;
use crate::scheduling::DurationRange;
use crate::selector::{select_action, Action, DowngradeChain, PostCategory, Situation};
use crate::state::{HistoryEntry, PersistedState, StateStore};

/// Result of one cycle, printed as the status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Posted,
    Reblogged,
    Engaged,
    EngageFailed,
    Skip,
    PostFailed,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Posted => "posted",
            CycleOutcome::Reblogged => "reblogged",
            CycleOutcome::Engaged => "engaged",
            CycleOutcome::EngageFailed => "engage_failed",
            CycleOutcome::Skip => "skip",
            CycleOutcome::PostFailed => "post_failed",
        }
    }

    /// Whether a remote action gave up after retries
    pub fn is_failure(&self) -> bool {
        matches!(self, CycleOutcome::EngageFailed | CycleOutcome::PostFailed)
    }
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text and optional image ready to publish
#[derive(Debug, Clone, PartialEq, Eq)]
struct PreparedPost {
    text: String,
    image: Option<String>,
}

/// The bot: configuration, platform, state and randomness for its lifetime
pub struct Bot<P: SocialPlatform> {
    config: Config,
    platform: P,
    store: StateStore,
    state: PersistedState,
    classifier: WindowClassifier,
    retry: RetryPolicy,
    rng: StdRng,
    own_account_id: Option<String>,
    images_dir: PathBuf,
}

impl<P: SocialPlatform> Bot<P> {
    /// Build a bot and load its state.
    ///
    /// Fails only on an invalid schedule; a missing or corrupt state file
    /// starts fresh.
    pub fn new(config: Config, platform: P, rng: StdRng) -> Result<Self> {
        let classifier = config.schedule.classifier()?;
        let store = StateStore::new(config.state_path());
        let state = store.load_or_default();
        let images_dir = config.images_dir();

        Ok(Self {
            config,
            platform,
            store,
            state,
            classifier,
            retry: RetryPolicy::default(),
            rng,
            own_account_id: None,
            images_dir,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    pub fn classifier(&self) -> &WindowClassifier {
        &self.classifier
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Check credentials and remember our own account id
    pub async fn verify(&mut self) -> Result<String> {
        let platform = &self.platform;
        let id = self
            .retry
            .run("verify_credentials", move || platform.who_am_i())
            .await?;
        info!("Authenticated as account {}", id);
        self.own_account_id = Some(id.clone());
        Ok(id)
    }

    async fn own_account_id(&mut self) -> Result<String> {
        match &self.own_account_id {
            Some(id) => Ok(id.clone()),
            None => {
                let platform = &self.platform;
                let id = self
                    .retry
                    .run("who_am_i", move || platform.who_am_i())
                    .await?;
                self.own_account_id = Some(id.clone());
                Ok(id)
            }
        }
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle as if the current time were `now`
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let slot = self.classifier.classify(now);
        debug!(
            "Cycle at {} ({}, quiet: {})",
            slot.local, slot.window, slot.quiet
        );

        let daily_reset = self.state.reset_daily_if_needed(&slot);
        let hourly_reset = self.state.reset_hourly_if_needed(&slot);
        if daily_reset || hourly_reset {
            self.persist();
        }

        let can_engage = self.state.can_engage(&self.config.limits);
        let mut mentions = if can_engage {
            let fetched = fetch_unprocessed_mentions(
                &self.platform,
                &self.retry,
                &self.state,
                self.config.limits.notification_fetch_limit,
            )
            .await;
            fetched.unwrap_or_else(|e| {
                warn!("Listing notifications failed, not engaging this cycle: {}", e);
                Vec::new()
            })
        } else {
            debug!("Engagement caps reached");
            Vec::new()
        };

        let mut action = self.select(&slot, can_engage, !mentions.is_empty());
        if action == Action::EngageMention {
            let index = self.rng.gen_range(0..mentions.len());
            let mention = mentions.swap_remove(index);
            if let Some(outcome) = self.engage(mention).await {
                return outcome;
            }
            action = self.select(&slot, can_engage, false);
        }

        match action.category() {
            Some(category) => self.publish(category, &slot, now).await,
            None => {
                info!("Nothing to do (caps reached, quiet hours or no mentions)");
                CycleOutcome::Skip
            }
        }
    }

    fn select(&self, slot: &TimeSlot, can_engage: bool, mention_pending: bool) -> Action {
        let action = select_action(&Situation {
            slot,
            pertype: &self.state.pertype,
            limits: &self.config.limits,
            can_engage,
            mention_pending,
            can_post: self.state.can_post(&self.config.limits),
        });
        debug!("Selected {:?}", action);
        action
    }

    /// Engage with one mention. `None` when the mention has no status and
    /// the cycle should go on to posting.
    async fn engage(&mut self, mention: Notification) -> Option<CycleOutcome> {
        let status_id = match mention.status_id {
            Some(id) => id,
            None => {
                debug!("Mention {} has no status, skipping it", mention.id);
                self.state.mark_processed(&mention.id);
                self.persist();
                return None;
            }
        };

        let engagement = {
            let library = ContentLibrary::new(&self.config.content, &self.images_dir);
            Engagement::choose(&library, &mut self.rng)
        };

        // Processed whether or not the call below succeeds
        self.state.mark_processed(&mention.id);

        let result = engagement
            .perform(&self.platform, &self.retry, &status_id)
            .await;
        match result {
            Ok(()) => {
                self.state.record_engagement();
                self.persist();
                info!("Engaged with mention {} ({})", mention.id, engagement);
                self.pause(self.config.delays.engage).await;
                Some(CycleOutcome::Engaged)
            }
            Err(e) => {
                warn!("Engagement with mention {} failed: {}", mention.id, e);
                self.persist();
                Some(CycleOutcome::EngageFailed)
            }
        }
    }

    /// Publish `start`, downgrading while content is unavailable
    async fn publish(
        &mut self,
        start: PostCategory,
        slot: &TimeSlot,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        let mut chain = DowngradeChain::new(start);
        let mut category = start;

        loop {
            if category == PostCategory::Reblog {
                return self.reblog().await;
            }

            let prepared = prepare_post(
                &self.config.content,
                &self.images_dir,
                &self.state.history,
                category,
                slot.window,
                now,
                &mut self.rng,
            );
            if let Some(post) = prepared {
                return self.send_post(category, post, now).await;
            }

            match chain.downgrade(category, &self.state.pertype, &self.config.limits) {
                Some(next) => {
                    debug!("No content for {}, trying {}", category, next);
                    category = next;
                }
                None => {
                    info!("No content for {} and nothing to fall back to", category);
                    return CycleOutcome::Skip;
                }
            }
        }
    }

    async fn send_post(
        &mut self,
        category: PostCategory,
        post: PreparedPost,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        let platform = &self.platform;

        let mut media_ids = Vec::new();
        if let Some(image) = &post.image {
            let path = Path::new(image);
            let description = self.config.content.image_description.as_str();
            match self
                .retry
                .run("upload_media", move || platform.upload_media(path, description))
                .await
            {
                Ok(id) => media_ids.push(id),
                Err(e) => {
                    warn!("Uploading {} failed: {}", image, e);
                    return CycleOutcome::PostFailed;
                }
            }
        }

        let text = post.text.as_str();
        let ids = media_ids.as_slice();
        let status_id = match self
            .retry
            .run("post_status", move || platform.post_status(text, ids))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!("Posting {} failed: {}", category, e);
                return CycleOutcome::PostFailed;
            }
        };

        self.state.record_post(category);
        self.state
            .record_history(&post.text, post.image.as_deref(), now);
        self.persist();
        info!(
            "Posted {} as {}{}: {}",
            category,
            status_id,
            if post.image.is_some() { " [+image]" } else { "" },
            preview(&post.text)
        );
        self.pause(self.config.delays.post).await;
        CycleOutcome::Posted
    }

    async fn reblog(&mut self) -> CycleOutcome {
        let own_id = match self.own_account_id().await {
            Ok(id) => id,
            Err(e) => {
                warn!("Could not determine own account: {}", e);
                return CycleOutcome::PostFailed;
            }
        };

        let candidate = match find_reblog_candidate(
            &self.platform,
            &self.retry,
            &own_id,
            &self.state,
            self.config.limits.timeline_fetch_limit,
            &mut self.rng,
        )
        .await
        {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                info!("No reblog candidate found");
                return CycleOutcome::Skip;
            }
            Err(e) => {
                warn!("Fetching the home timeline failed: {}", e);
                return CycleOutcome::PostFailed;
            }
        };

        let platform = &self.platform;
        let status_id = candidate.id.as_str();
        if let Err(e) = self
            .retry
            .run("reblog", move || platform.reblog(status_id))
            .await
        {
            warn!("Reblogging {} failed: {}", candidate.id, e);
            return CycleOutcome::PostFailed;
        }

        self.state.record_reblog(&candidate.id);
        self.state.record_post(PostCategory::Reblog);
        self.persist();
        info!("Reblogged {}", candidate.id);
        self.pause(self.config.delays.post).await;
        CycleOutcome::Reblogged
    }

    /// Save the state. A failed save keeps the in-memory state, so caps
    /// still hold for the rest of this process.
    fn persist(&self) {
        if let Err(e) = self.store.save(&self.state) {
            error!("Saving state to {} failed: {}", self.store.path().display(), e);
        }
    }

    async fn pause(&mut self, range: DurationRange) {
        let delay = range.sample(&mut self.rng);
        if !delay.is_zero() {
            debug!("Sleeping {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }
}

/// Text (and image) for `category`, or `None` when its pool is exhausted
fn prepare_post<R: Rng + ?Sized>(
    content: &ContentConfig,
    images_dir: &Path,
    history: &[HistoryEntry],
    category: PostCategory,
    window: Window,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Option<PreparedPost> {
    let library = ContentLibrary::new(content, images_dir);
    let guard = RepetitionGuard::new(history, now);

    match category {
        PostCategory::ImageGreeting => {
            let image = library.fresh_image(&guard, rng)?;
            let text = library.short_greeting(window, rng)?;
            Some(PreparedPost {
                text,
                image: Some(image),
            })
        }
        PostCategory::LongGreeting => {
            let text = library.long_greeting(window, &guard, rng)?;
            let image = if library.attach_image_to_long(rng) {
                library.fresh_image(&guard, rng)
            } else {
                None
            };
            Some(PreparedPost { text, image })
        }
        PostCategory::ShortLink => {
            let text = library.short_link(&guard, rng)?;
            Some(PreparedPost { text, image: None })
        }
        PostCategory::Reblog => None,
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    if text.chars().count() > MAX {
        let cut: String = text.chars().take(MAX).collect();
        format!("{}…", cut)
    } else {
        text.to_string()
    }
}
