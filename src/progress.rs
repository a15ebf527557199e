//! Observer trait for conversion state transitions.
//!
//! Inject an [`ObserverHandle`] via
//! [`crate::config::ConversionConfigBuilder::observer`] to receive events as
//! the orchestrator moves a request through its states. The CLI uses it to
//! drive a spinner; a server could forward events to a job table.
//!
//! # Example
//!
//! ```rust
//! use multitool_convert::{ConversionConfig, ConversionObserver, ConversionState};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     transitions: AtomicUsize,
//! }
//!
//! impl ConversionObserver for CountingObserver {
//!     fn on_transition(&self, _request_id: uuid::Uuid, _state: &ConversionState) {
//!         self.transitions.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .observer(Arc::new(CountingObserver { transitions: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::output::{ConversionAttempt, PersistenceOutcome};
use crate::strategy::StrategyKind;

/// States a request passes through.
///
/// `Received → Classifying → SelectingStrategy → Attempting(i)… → Succeeded`
/// or `→ ExhaustedFallback`. `Classifying` is skipped for directions that do
/// not classify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConversionState {
    Received,
    Classifying,
    SelectingStrategy,
    Attempting { index: usize, strategy: StrategyKind },
    Succeeded,
    ExhaustedFallback { kind: ErrorKind },
}

impl fmt::Display for ConversionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionState::Received => f.write_str("received"),
            ConversionState::Classifying => f.write_str("classifying"),
            ConversionState::SelectingStrategy => f.write_str("selecting strategy"),
            ConversionState::Attempting { index, strategy } => {
                write!(f, "attempting #{} ({strategy})", index + 1)
            }
            ConversionState::Succeeded => f.write_str("succeeded"),
            ConversionState::ExhaustedFallback { kind } => write!(f, "failed ({kind})"),
        }
    }
}

/// Called by the orchestrator as a request progresses.
///
/// Implementations must be `Send + Sync`: concurrent requests share one
/// observer. All methods default to no-ops.
pub trait ConversionObserver: Send + Sync {
    /// Called on entry to every state.
    fn on_transition(&self, request_id: Uuid, state: &ConversionState) {
        let _ = (request_id, state);
    }

    /// Called after each strategy attempt, success or failure.
    fn on_attempt_complete(&self, request_id: Uuid, attempt: &ConversionAttempt) {
        let _ = (request_id, attempt);
    }

    /// Called once the persistence step has run (or been skipped).
    fn on_persistence(&self, request_id: Uuid, outcome: &PersistenceOutcome) {
        let _ = (request_id, outcome);
    }
}

/// Observer that ignores everything. Used when none is configured.
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {}

/// Type stored in [`crate::config::ConversionConfig`].
pub type ObserverHandle = Arc<dyn ConversionObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        states: Mutex<Vec<ConversionState>>,
    }

    impl ConversionObserver for Recording {
        fn on_transition(&self, _request_id: Uuid, state: &ConversionState) {
            self.states.lock().unwrap().push(state.clone());
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        let id = Uuid::new_v4();
        o.on_transition(id, &ConversionState::Received);
        o.on_persistence(id, &PersistenceOutcome::Declined);
    }

    #[test]
    fn handle_receives_transitions() {
        let rec = Arc::new(Recording::default());
        let handle: ObserverHandle = rec.clone();
        let id = Uuid::new_v4();
        handle.on_transition(id, &ConversionState::Received);
        handle.on_transition(
            id,
            &ConversionState::Attempting {
                index: 0,
                strategy: StrategyKind::Native,
            },
        );
        assert_eq!(rec.states.lock().unwrap().len(), 2);
    }

    #[test]
    fn state_display() {
        let s = ConversionState::Attempting {
            index: 1,
            strategy: StrategyKind::External,
        };
        assert_eq!(s.to_string(), "attempting #2 (external)");
        assert_eq!(
            ConversionState::ExhaustedFallback {
                kind: ErrorKind::ExhaustedStrategies
            }
            .to_string(),
            "failed (exhausted_strategies)"
        );
    }
}
