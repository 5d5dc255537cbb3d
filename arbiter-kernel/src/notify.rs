//! Operator notification for suspect decisions.

use std::sync::Mutex;

use arbiter_audit::Flag;
use arbiter_primitives::{CallerId, CorrelationId, FeatureActionKey};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Notification raised when the oversight pass flags a decision.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OversightNotice {
    correlation_id: CorrelationId,
    caller: CallerId,
    key: FeatureActionKey,
    flag: Flag,
}

impl OversightNotice {
    /// Creates a notice for the supplied flagged decision.
    #[must_use]
    pub fn new(
        correlation_id: CorrelationId,
        caller: CallerId,
        key: FeatureActionKey,
        flag: Flag,
    ) -> Self {
        Self {
            correlation_id,
            caller,
            key,
            flag,
        }
    }

    /// Returns the correlation id of the flagged audit entry.
    #[must_use]
    pub const fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Returns the caller whose request was flagged.
    #[must_use]
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    /// Returns the feature/action pair of the flagged request.
    #[must_use]
    pub fn key(&self) -> &FeatureActionKey {
        &self.key
    }

    /// Returns the oversight flag.
    #[must_use]
    pub fn flag(&self) -> &Flag {
        &self.flag
    }
}

/// Routes oversight notices to operators, fire-and-forget.
///
/// Implementations must swallow their own delivery failures; a dead pager
/// integration is never allowed to stall or fail the oversight pass.
pub trait NotificationDispatcher: Send + Sync {
    /// Delivers the notice on a best-effort basis.
    fn notify(&self, notice: &OversightNotice);
}

/// Dispatcher that emits notices to the tracing system.
#[derive(Default)]
pub struct TracingNotifier;

impl NotificationDispatcher for TracingNotifier {
    fn notify(&self, notice: &OversightNotice) {
        warn!(
            correlation_id = %notice.correlation_id(),
            caller = %notice.caller(),
            key = %notice.key(),
            rationale = notice.flag().rationale(),
            confidence = notice.flag().confidence_score(),
            "suspect decision flagged"
        );
    }
}

/// Dispatcher used during testing to capture notices.
#[derive(Default)]
pub struct CollectingNotifier {
    notices: Mutex<Vec<OversightNotice>>,
}

impl CollectingNotifier {
    /// Creates a new collecting dispatcher.
    #[must_use]
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    /// Returns the collected notices, clearing the buffer.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn drain(&self) -> Vec<OversightNotice> {
        let mut lock = self.notices.lock().expect("collecting notifier poisoned");
        lock.drain(..).collect()
    }

    /// Returns how many notices have been captured without clearing them.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn len(&self) -> usize {
        self.notices.lock().expect("collecting notifier poisoned").len()
    }

    /// Returns `true` when no notice has been captured.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationDispatcher for CollectingNotifier {
    fn notify(&self, notice: &OversightNotice) {
        self.notices
            .lock()
            .expect("collecting notifier poisoned")
            .push(notice.clone());
    }
}
