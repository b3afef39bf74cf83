//! Mock platform implementation for testing
//!
//! An in-memory [`SocialPlatform`] with scriptable failures and a record of
//! every call. Clones share the same state, so a test can keep a handle for
//! inspection after handing one to the bot.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::PlatformError;
use crate::platforms::{
    Notification, NotificationKind, PlatformResult, SocialPlatform, TimelineStatus,
};

/// A call the bot made, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    PostStatus { text: String, media_ids: Vec<String> },
    UploadMedia { path: String, description: String },
    ListNotifications { limit: u32 },
    Favourite { status_id: String },
    Reblog { status_id: String },
    Reply { status_id: String, text: String },
    HomeTimeline { limit: u32 },
    WhoAmI,
}

/// Which call a scripted error applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    PostStatus,
    UploadMedia,
    ListNotifications,
    Favourite,
    Reblog,
    Reply,
    HomeTimeline,
    WhoAmI,
}

#[derive(Debug, Default)]
struct MockState {
    account_id: String,
    notifications: Vec<Notification>,
    timeline: Vec<TimelineStatus>,
    failures: Vec<(MockOperation, VecDeque<PlatformError>)>,
    calls: Vec<MockCall>,
    next_id: u64,
}

/// Mock platform for testing
#[derive(Debug, Clone)]
pub struct MockPlatform {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new("me")
    }
}

impl MockPlatform {
    /// A platform where every call succeeds, logged in as `account_id`
    pub fn new(account_id: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                account_id: account_id.to_string(),
                next_id: 1000,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the calls recorded so far
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a mention notification pointing at `status_id`
    pub fn add_mention(&self, notification_id: &str, status_id: Option<&str>) {
        self.add_notification(Notification {
            id: notification_id.to_string(),
            kind: NotificationKind::Mention,
            status_id: status_id.map(str::to_string),
        });
    }

    pub fn add_notification(&self, notification: Notification) {
        self.lock().notifications.push(notification);
    }

    pub fn add_timeline_status(&self, id: &str, account_id: &str, is_reblog: bool) {
        self.lock().timeline.push(TimelineStatus {
            id: id.to_string(),
            account_id: account_id.to_string(),
            is_reblog,
        });
    }

    /// Make the next calls to `operation` fail with `errors`, in order
    pub fn fail_next(&self, operation: MockOperation, errors: Vec<PlatformError>) {
        let mut state = self.lock();
        match state.failures.iter_mut().find(|(op, _)| *op == operation) {
            Some((_, queue)) => queue.extend(errors),
            None => state.failures.push((operation, errors.into())),
        }
    }

    /// Make every call to `operation` fail with a network error
    pub fn fail_always(&self, operation: MockOperation, times: usize) {
        let errors = (0..times)
            .map(|i| PlatformError::Network(format!("scripted failure {}", i + 1)))
            .collect();
        self.fail_next(operation, errors);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Calls that changed something on the server
    pub fn writes(&self) -> Vec<MockCall> {
        self.calls()
            .into_iter()
            .filter(|call| {
                matches!(
                    call,
                    MockCall::PostStatus { .. }
                        | MockCall::UploadMedia { .. }
                        | MockCall::Favourite { .. }
                        | MockCall::Reblog { .. }
                        | MockCall::Reply { .. }
                )
            })
            .collect()
    }

    pub fn count(&self, operation: MockOperation) -> usize {
        self.calls()
            .iter()
            .filter(|call| call_operation(call) == operation)
            .count()
    }

    /// Record the call, then either pop a scripted error or hand out an id
    fn enter(&self, call: MockCall) -> PlatformResult<String> {
        let operation = call_operation(&call);
        let mut state = self.lock();
        state.calls.push(call);

        let scripted = state
            .failures
            .iter_mut()
            .find(|(op, _)| *op == operation)
            .and_then(|(_, queue)| queue.pop_front());
        if let Some(error) = scripted {
            return Err(error);
        }

        state.next_id += 1;
        Ok(state.next_id.to_string())
    }
}

fn call_operation(call: &MockCall) -> MockOperation {
    match call {
        MockCall::PostStatus { .. } => MockOperation::PostStatus,
        MockCall::UploadMedia { .. } => MockOperation::UploadMedia,
        MockCall::ListNotifications { .. } => MockOperation::ListNotifications,
        MockCall::Favourite { .. } => MockOperation::Favourite,
        MockCall::Reblog { .. } => MockOperation::Reblog,
        MockCall::Reply { .. } => MockOperation::Reply,
        MockCall::HomeTimeline { .. } => MockOperation::HomeTimeline,
        MockCall::WhoAmI => MockOperation::WhoAmI,
    }
}

#[async_trait]
impl SocialPlatform for MockPlatform {
    async fn post_status(&self, text: &str, media_ids: &[String]) -> PlatformResult<String> {
        if text.trim().is_empty() {
            return Err(PlatformError::Validation("Content cannot be empty".to_string()));
        }
        self.enter(MockCall::PostStatus {
            text: text.to_string(),
            media_ids: media_ids.to_vec(),
        })
    }

    async fn upload_media(&self, path: &Path, description: &str) -> PlatformResult<String> {
        self.enter(MockCall::UploadMedia {
            path: path.to_string_lossy().into_owned(),
            description: description.to_string(),
        })
        .map(|id| format!("media-{}", id))
    }

    async fn list_notifications(&self, limit: u32) -> PlatformResult<Vec<Notification>> {
        self.enter(MockCall::ListNotifications { limit })?;
        let state = self.lock();
        Ok(state
            .notifications
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn favourite(&self, status_id: &str) -> PlatformResult<()> {
        self.enter(MockCall::Favourite {
            status_id: status_id.to_string(),
        })
        .map(|_| ())
    }

    async fn reblog(&self, status_id: &str) -> PlatformResult<()> {
        self.enter(MockCall::Reblog {
            status_id: status_id.to_string(),
        })
        .map(|_| ())
    }

    async fn reply(&self, status_id: &str, text: &str) -> PlatformResult<String> {
        self.enter(MockCall::Reply {
            status_id: status_id.to_string(),
            text: text.to_string(),
        })
    }

    async fn home_timeline(&self, limit: u32) -> PlatformResult<Vec<TimelineStatus>> {
        self.enter(MockCall::HomeTimeline { limit })?;
        let state = self.lock();
        Ok(state.timeline.iter().take(limit as usize).cloned().collect())
    }

    async fn who_am_i(&self) -> PlatformResult<String> {
        self.enter(MockCall::WhoAmI)?;
        Ok(self.lock().account_id.clone())
    }
}
