// State management module
//
// StateManager wraps SessionState with thread-safe access using Arc<RwLock<T>>
// and emits change events so observers don't have to poll.

use crate::models::{DegradeReason, PerformanceTier, SessionState, TrackingPhase};
use crate::services::camera::FacingMode;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when session state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Device was scored and a tier chosen
    TierAssessed {
        tier: PerformanceTier,
        target_fps: u32,
    },

    /// Tracking loop entered the Tracking phase
    TrackingStarted { session_id: u64 },

    /// Tracking loop returned to Idle
    TrackingStopped { session_id: u64 },

    /// Camera switched to a different facing mode
    CameraSwitched { facing: FacingMode },

    /// Detection moved between the background context and the tracking task
    StrategyChanged { offloaded: bool },

    /// A stage fell back to a degraded value
    Degraded { reason: DegradeReason },

    /// A one-second processing-rate window closed
    FrameRateMeasured {
        fps: f32,
        reduce_quality_advised: bool,
    },
}

/// Thread-safe state manager with event emission
///
/// - [`read()`](Self::read) for reading state through a closure
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
///
/// The tracking loop consults [`is_tracking_session()`](Self::is_tracking_session)
/// before every reschedule and before applying any detection result.
pub struct StateManager {
    state: Arc<RwLock<SessionState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            state_tx,
        }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> SessionState {
        self.state.read().unwrap().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let tracking = state_manager.read(|state| state.is_tracking());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SessionState) -> R,
    {
        let state = self.state.read().unwrap();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, diffs the two and
    /// broadcasts one event per detected change.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut SessionState),
    {
        let mut state = self.state.write().unwrap();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = self.detect_changes(&old_state, &state);

        for change in &changes {
            // No subscribers is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(&self, old: &SessionState, new: &SessionState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.tier != new.tier || old.target_fps != new.target_fps {
            if let Some(tier) = new.tier {
                changes.push(StateChange::TierAssessed {
                    tier,
                    target_fps: new.target_fps,
                });
            }
        }

        if old.phase != new.phase || old.session_id != new.session_id {
            if old.phase == TrackingPhase::Tracking {
                changes.push(StateChange::TrackingStopped {
                    session_id: old.session_id,
                });
            }
            if new.phase == TrackingPhase::Tracking {
                changes.push(StateChange::TrackingStarted {
                    session_id: new.session_id,
                });
            }
        }

        if old.facing != new.facing {
            if let Some(facing) = new.facing {
                changes.push(StateChange::CameraSwitched { facing });
            }
        }

        if old.offloaded != new.offloaded {
            changes.push(StateChange::StrategyChanged {
                offloaded: new.offloaded,
            });
        }

        if old.last_degrade != new.last_degrade {
            if let Some(reason) = new.last_degrade {
                changes.push(StateChange::Degraded { reason });
            }
        }

        if old.measured_fps != new.measured_fps {
            if let Some(fps) = new.measured_fps {
                changes.push(StateChange::FrameRateMeasured {
                    fps,
                    reduce_quality_advised: new.reduce_quality_advised,
                });
            }
        }

        changes
    }

    // Convenience methods for common state updates

    pub fn set_tier(&self, tier: PerformanceTier, target_fps: u32) -> Vec<StateChange> {
        self.update(|state| {
            state.tier = Some(tier);
            state.target_fps = target_fps;
        })
    }

    /// Enter Tracking under a fresh session id; returns that id
    pub fn begin_tracking(&self) -> u64 {
        let mut session_id = 0;
        self.update(|state| {
            state.session_id += 1;
            state.phase = TrackingPhase::Tracking;
            session_id = state.session_id;
        });
        session_id
    }

    /// Return to Idle; a no-op when already idle
    pub fn end_tracking(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.phase = TrackingPhase::Idle;
        })
    }

    pub fn is_tracking(&self) -> bool {
        self.read(|state| state.is_tracking())
    }

    pub fn is_tracking_session(&self, session_id: u64) -> bool {
        self.read(|state| state.is_tracking_session(session_id))
    }

    pub fn set_facing(&self, facing: FacingMode) -> Vec<StateChange> {
        self.update(|state| {
            state.facing = Some(facing);
        })
    }

    pub fn set_offloaded(&self, offloaded: bool) -> Vec<StateChange> {
        self.update(|state| {
            state.offloaded = offloaded;
        })
    }

    /// Record a degradation. Repeats of the same reason are broadcast too.
    pub fn record_degrade(&self, reason: DegradeReason) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.last_degrade = Some(reason);
        });

        if changes.is_empty() {
            let event = StateChange::Degraded { reason };
            let _ = self.state_tx.send(event.clone());
            changes.push(event);
        }

        changes
    }

    pub fn record_frame_rate(&self, fps: f32, reduce_quality_advised: bool) -> Vec<StateChange> {
        self.update(|state| {
            state.measured_fps = Some(fps);
            state.reduce_quality_advised = reduce_quality_advised;
        })
    }

    /// Shared handle to the underlying lock
    pub fn state_arc(&self) -> Arc<RwLock<SessionState>> {
        Arc::clone(&self.state)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Clones share the same state and channel
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
