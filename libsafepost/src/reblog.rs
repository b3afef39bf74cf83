//! Reblog candidate selection

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::Result;
use crate::platforms::{SocialPlatform, TimelineStatus};
use crate::retry::RetryPolicy;
use crate::state::PersistedState;

/// A status worth boosting: not ours, not itself a boost, not boosted
/// recently. Candidates are shuffled first so the pick is not always the
/// newest status.
pub fn pick_reblog_candidate<R: Rng + ?Sized>(
    mut timeline: Vec<TimelineStatus>,
    own_account_id: &str,
    state: &PersistedState,
    rng: &mut R,
) -> Option<TimelineStatus> {
    timeline.shuffle(rng);
    timeline.into_iter().find(|status| {
        !status.id.is_empty()
            && status.account_id != own_account_id
            && !status.is_reblog
            && !state.was_reblogged(&status.id)
    })
}

/// Fetch the home timeline and pick a candidate from it
pub async fn find_reblog_candidate<P, R>(
    platform: &P,
    retry: &RetryPolicy,
    own_account_id: &str,
    state: &PersistedState,
    limit: u32,
    rng: &mut R,
) -> Result<Option<TimelineStatus>>
where
    P: SocialPlatform + ?Sized,
    R: Rng + ?Sized,
{
    let timeline = retry
        .run("home_timeline", move || platform.home_timeline(limit))
        .await?;
    Ok(pick_reblog_candidate(timeline, own_account_id, state, rng))
}
