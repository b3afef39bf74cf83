//! Action selection
//!
//! A pure decision over the current window, the per-category counters and
//! the caps. Nothing here talks to the network or touches state; the cycle
//! orchestrator feeds the answers back in when content turns out to be
//! unavailable (see [`DowngradeChain`]).

use serde::{Deserialize, Serialize};

use crate::clock::{TimeSlot, Window};
use crate::config::LimitsConfig;
use crate::state::PerTypeCounters;

/// Category of a post, each with its own daily counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostCategory {
    ImageGreeting,
    LongGreeting,
    ShortLink,
    Reblog,
}

impl PostCategory {
    /// Daily cap for this category; reblogs only obey the global post cap
    pub fn cap(&self, limits: &LimitsConfig) -> Option<u32> {
        match self {
            PostCategory::ImageGreeting => Some(limits.max_image_greetings_per_day),
            PostCategory::LongGreeting => Some(limits.max_long_greetings_per_day),
            PostCategory::ShortLink => Some(limits.max_short_links_per_day),
            PostCategory::Reblog => None,
        }
    }

    pub fn has_room(&self, pertype: &PerTypeCounters, limits: &LimitsConfig) -> bool {
        match self.cap(limits) {
            Some(cap) => pertype.get(*self) < cap,
            None => true,
        }
    }

    /// Fallback order when this category cannot be published
    fn fallbacks(&self) -> &'static [PostCategory] {
        match self {
            PostCategory::ImageGreeting => &[
                PostCategory::ShortLink,
                PostCategory::LongGreeting,
                PostCategory::Reblog,
            ],
            PostCategory::LongGreeting => &[PostCategory::ShortLink, PostCategory::Reblog],
            PostCategory::ShortLink => &[PostCategory::LongGreeting, PostCategory::Reblog],
            PostCategory::Reblog => &[],
        }
    }
}

impl std::fmt::Display for PostCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostCategory::ImageGreeting => write!(f, "image_greeting"),
            PostCategory::LongGreeting => write!(f, "long_greeting"),
            PostCategory::ShortLink => write!(f, "short_link"),
            PostCategory::Reblog => write!(f, "reblog"),
        }
    }
}

/// The one thing a cycle decides to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    EngageMention,
    PostImageGreeting,
    PostLongGreeting,
    PostShortLink,
    Reblog,
    Skip,
}

impl Action {
    pub fn category(&self) -> Option<PostCategory> {
        match self {
            Action::PostImageGreeting => Some(PostCategory::ImageGreeting),
            Action::PostLongGreeting => Some(PostCategory::LongGreeting),
            Action::PostShortLink => Some(PostCategory::ShortLink),
            Action::Reblog => Some(PostCategory::Reblog),
            Action::EngageMention | Action::Skip => None,
        }
    }
}

impl From<PostCategory> for Action {
    fn from(category: PostCategory) -> Self {
        match category {
            PostCategory::ImageGreeting => Action::PostImageGreeting,
            PostCategory::LongGreeting => Action::PostLongGreeting,
            PostCategory::ShortLink => Action::PostShortLink,
            PostCategory::Reblog => Action::Reblog,
        }
    }
}

/// Everything the decision depends on
#[derive(Debug, Clone, Copy)]
pub struct Situation<'a> {
    pub slot: &'a TimeSlot,
    pub pertype: &'a PerTypeCounters,
    pub limits: &'a LimitsConfig,
    /// Daily and hourly engagement caps not exhausted
    pub can_engage: bool,
    /// An unprocessed opt-in mention is waiting
    pub mention_pending: bool,
    /// Daily and hourly post caps not exhausted
    pub can_post: bool,
}

/// Decide this cycle's action. Engagements preempt posting; quiet hours only
/// block posting.
pub fn select_action(situation: &Situation<'_>) -> Action {
    if situation.can_engage && situation.mention_pending {
        return Action::EngageMention;
    }
    if situation.can_post && !situation.slot.quiet {
        return choose_post_category(situation.slot.window, situation.pertype, situation.limits)
            .into();
    }
    Action::Skip
}

/// Preferred post category for a window, honouring per-category caps
pub fn choose_post_category(
    window: Window,
    pertype: &PerTypeCounters,
    limits: &LimitsConfig,
) -> PostCategory {
    let image = PostCategory::ImageGreeting;
    match window {
        // At most one image greeting in the morning
        Window::Morning if pertype.image_greeting == 0 && image.has_room(pertype, limits) => image,
        Window::Evening if image.has_room(pertype, limits) => image,
        _ => first_with_room(
            &[PostCategory::ShortLink, PostCategory::LongGreeting],
            pertype,
            limits,
        ),
    }
}

fn first_with_room(
    candidates: &[PostCategory],
    pertype: &PerTypeCounters,
    limits: &LimitsConfig,
) -> PostCategory {
    candidates
        .iter()
        .copied()
        .find(|c| c.has_room(pertype, limits))
        .unwrap_or(PostCategory::Reblog)
}

/// Tracks fallbacks when the chosen category cannot produce content.
///
/// Each category is tried at most once, so the chain ends after at most
/// four steps.
#[derive(Debug, Clone)]
pub struct DowngradeChain {
    tried: Vec<PostCategory>,
}

impl DowngradeChain {
    pub fn new(start: PostCategory) -> Self {
        Self { tried: vec![start] }
    }

    pub fn tried(&self) -> &[PostCategory] {
        &self.tried
    }

    /// Next category after `failed` could not be published, or `None` when
    /// nothing is left (the cycle skips).
    pub fn downgrade(
        &mut self,
        failed: PostCategory,
        pertype: &PerTypeCounters,
        limits: &LimitsConfig,
    ) -> Option<PostCategory> {
        let next = failed
            .fallbacks()
            .iter()
            .copied()
            .find(|c| !self.tried.contains(c) && c.has_room(pertype, limits))?;
        self.tried.push(next);
        Some(next)
    }
}
