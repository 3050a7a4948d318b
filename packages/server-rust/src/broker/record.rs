use std::time::{Duration, Instant};

use newsroute_core::{HandlerId, NativeState, NativeTaskSnapshot, TaskState, TransitionError};
use serde_json::Value;

/// Status line reported for a finished task whose result has been dropped.
pub const RESULT_EXPIRED: &str = "result expired";

/// Broker-side bookkeeping for one queued task.
///
/// State only moves forward (Pending -> Running -> Succeeded | Failed); an
/// attempt to move backwards or out of a terminal state is refused and the
/// record is left untouched. Expiry drops the result but never the state.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    handler_id: HandlerId,
    state: TaskState,
    result: Option<Value>,
    error: Option<String>,
    finished_at: Option<Instant>,
    expired: bool,
}

impl TaskRecord {
    #[must_use]
    pub fn pending(handler_id: HandlerId) -> Self {
        Self {
            handler_id,
            state: TaskState::Pending,
            result: None,
            error: None,
            finished_at: None,
            expired: false,
        }
    }

    #[must_use]
    pub fn handler_id(&self) -> &HandlerId {
        &self.handler_id
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// # Errors
    ///
    /// `TransitionError` unless the task is pending.
    pub fn mark_started(&mut self) -> Result<(), TransitionError> {
        self.state = self.state.transition(TaskState::Running)?;
        Ok(())
    }

    /// # Errors
    ///
    /// `TransitionError` unless the task is running.
    pub fn mark_succeeded(&mut self, result: Value) -> Result<(), TransitionError> {
        self.state = self.state.transition(TaskState::Succeeded)?;
        self.result = Some(result);
        self.finished_at = Some(Instant::now());
        Ok(())
    }

    /// # Errors
    ///
    /// `TransitionError` unless the task is running.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.state = self.state.transition(TaskState::Failed)?;
        self.error = Some(error.into());
        self.finished_at = Some(Instant::now());
        Ok(())
    }

    /// Terminal, still holding its result, and older than `ttl` at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.finished_at
            .is_some_and(|finished| now.saturating_duration_since(finished) >= ttl)
    }

    /// Release the result or error of a finished task. The record keeps
    /// answering with its terminal state. No-op before the task finishes.
    pub fn expire(&mut self) {
        if !self.state.is_terminal() {
            return;
        }
        self.result = None;
        self.error = None;
        self.finished_at = None;
        self.expired = true;
    }

    /// Report the record in broker-native vocabulary.
    #[must_use]
    pub fn snapshot(&self) -> NativeTaskSnapshot {
        match self.state {
            TaskState::Pending => NativeTaskSnapshot::new(NativeState::Pending),
            TaskState::Running => NativeTaskSnapshot::new(NativeState::Started),
            TaskState::Succeeded if self.expired => {
                NativeTaskSnapshot::new(NativeState::Success).with_info(Value::from(RESULT_EXPIRED))
            }
            TaskState::Failed if self.expired => {
                NativeTaskSnapshot::new(NativeState::Failure).with_info(Value::from(RESULT_EXPIRED))
            }
            TaskState::Succeeded => NativeTaskSnapshot::new(NativeState::Success)
                .with_result(self.result.clone().unwrap_or(Value::Null)),
            TaskState::Failed => {
                let snapshot = NativeTaskSnapshot::new(NativeState::Failure);
                match &self.error {
                    Some(error) => snapshot.with_info(Value::String(error.clone())),
                    None => snapshot,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record() -> TaskRecord {
        TaskRecord::pending(HandlerId::new("ads-of-the-world"))
    }

    #[test]
    fn runs_forward_to_success() {
        let mut rec = record();
        assert_eq!(rec.snapshot().state, NativeState::Pending);

        rec.mark_started().unwrap();
        assert_eq!(rec.snapshot().state, NativeState::Started);

        rec.mark_succeeded(json!({"ok": true})).unwrap();
        let snapshot = rec.snapshot();
        assert_eq!(snapshot.state, NativeState::Success);
        assert_eq!(snapshot.result, Some(json!({"ok": true})));
    }

    #[test]
    fn terminal_state_is_sticky() {
        let mut rec = record();
        rec.mark_started().unwrap();
        rec.mark_failed("boom").unwrap();

        assert!(rec.mark_started().is_err());
        assert!(rec.mark_succeeded(json!(1)).is_err());
        assert_eq!(rec.state(), TaskState::Failed);
        assert_eq!(rec.snapshot().info, Some(json!("boom")));
    }

    #[test]
    fn cannot_finish_without_starting() {
        let mut rec = record();
        assert!(rec.mark_succeeded(json!(null)).is_err());
        assert_eq!(rec.state(), TaskState::Pending);
    }

    #[test]
    fn only_finished_records_expire() {
        let mut rec = record();
        let later = Instant::now() + Duration::from_secs(3600);
        assert!(!rec.is_expired(later, Duration::from_secs(1)));

        rec.mark_started().unwrap();
        rec.mark_succeeded(json!(null)).unwrap();
        assert!(rec.is_expired(later, Duration::from_secs(1)));
        assert!(!rec.is_expired(Instant::now(), Duration::from_secs(3600)));
    }

    #[test]
    fn expired_record_keeps_its_terminal_state() {
        let mut rec = record();
        rec.mark_started().unwrap();
        rec.mark_succeeded(json!({"ads": 4})).unwrap();
        rec.expire();

        assert_eq!(rec.state(), TaskState::Succeeded);
        let snapshot = rec.snapshot();
        assert_eq!(snapshot.state, NativeState::Success);
        assert_eq!(snapshot.result, None);
        assert_eq!(snapshot.info, Some(json!(RESULT_EXPIRED)));

        // A tombstone does not expire again and still refuses transitions.
        assert!(!rec.is_expired(Instant::now() + Duration::from_secs(3600), Duration::ZERO));
        assert!(rec.mark_started().is_err());
    }

    #[test]
    fn expiring_unfinished_record_does_nothing() {
        let mut rec = record();
        rec.mark_started().unwrap();
        rec.expire();

        assert_eq!(rec.snapshot().state, NativeState::Started);
        assert!(rec.snapshot().info.is_none());
    }

    proptest::proptest! {
        #[test]
        fn state_never_moves_backwards(steps in proptest::collection::vec(0u8..3, 0..12)) {
            let mut rec = record();
            let mut previous = rec.state();
            for step in steps {
                let _ = match step {
                    0 => rec.mark_started(),
                    1 => rec.mark_succeeded(json!(step)),
                    _ => rec.mark_failed("boom"),
                };
                let current = rec.state();
                if previous.is_terminal() {
                    proptest::prop_assert_eq!(current, previous);
                }
                proptest::prop_assert!(current != TaskState::Pending || previous == TaskState::Pending);
                previous = current;
            }
        }
    }
}
