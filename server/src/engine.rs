//! Item entity model and the time arithmetic governing it
//!
//! Every transition is a pure function of the item and a caller-supplied
//! wall-clock timestamp, so the same code path is exercised by command
//! handlers, the tick loop, and tests running on simulated time. The one
//! formula clients ever see is `materialize`; the tick loop uses the same
//! formula, which is what keeps "what the server counts" and "what the
//! server reports" from drifting apart.

use shared::ItemKind;

/// A stopwatch or countdown owned by a single user.
#[derive(Debug, Clone)]
pub struct Item {
    /// Unique, immutable identifier assigned by the store.
    pub id: u64,
    pub name: String,
    /// Owning user id, set at creation and never changed.
    pub owner: String,
    pub is_running: bool,
    pub state: ItemState,
}

/// Variant-specific time state. Timestamp fields are only meaningful
/// while the item is running.
#[derive(Debug, Clone)]
pub enum ItemState {
    Stopwatch {
        /// Total elapsed time over all completed runs.
        accumulated_ms: u64,
        /// Wall-clock start of the current run.
        run_started_at_ms: u64,
    },
    Countdown {
        duration_ms: u64,
        /// Authoritative remaining time while not running.
        remaining_ms: u64,
        /// Absolute wall-clock deadline of the current run.
        run_ends_at_ms: u64,
    },
}

impl Item {
    pub fn stopwatch(id: u64, name: String, owner: String) -> Self {
        Self {
            id,
            name,
            owner,
            is_running: false,
            state: ItemState::Stopwatch {
                accumulated_ms: 0,
                run_started_at_ms: 0,
            },
        }
    }

    pub fn countdown(id: u64, name: String, owner: String, duration_secs: u64) -> Self {
        // Duration arrives off the wire; saturate rather than overflow
        let duration_ms = duration_secs.saturating_mul(1000);
        Self {
            id,
            name,
            owner,
            is_running: false,
            state: ItemState::Countdown {
                duration_ms,
                remaining_ms: duration_ms,
                run_ends_at_ms: 0,
            },
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self.state {
            ItemState::Stopwatch { .. } => ItemKind::Stopwatch,
            ItemState::Countdown { .. } => ItemKind::Countdown,
        }
    }

    /// Begins or resumes the item. Idempotent while running. Returns false
    /// only when the transition is refused, which happens for a countdown
    /// that has already reached zero.
    pub fn start(&mut self, now_ms: u64) -> bool {
        if self.is_running {
            return true;
        }

        match &mut self.state {
            ItemState::Stopwatch {
                run_started_at_ms, ..
            } => {
                *run_started_at_ms = now_ms;
            }
            ItemState::Countdown {
                remaining_ms,
                run_ends_at_ms,
                ..
            } => {
                if *remaining_ms == 0 {
                    return false;
                }
                *run_ends_at_ms = now_ms.saturating_add(*remaining_ms);
            }
        }

        self.is_running = true;
        true
    }

    /// Halts the item, folding the current run into the stored fields.
    /// No-op while not running.
    pub fn pause(&mut self, now_ms: u64) {
        if !self.is_running {
            return;
        }

        match &mut self.state {
            ItemState::Stopwatch {
                accumulated_ms,
                run_started_at_ms,
            } => {
                *accumulated_ms += now_ms.saturating_sub(*run_started_at_ms);
            }
            ItemState::Countdown {
                duration_ms,
                remaining_ms,
                run_ends_at_ms,
            } => {
                // min() keeps remaining within the duration if the wall
                // clock stepped backwards since start
                *remaining_ms = run_ends_at_ms.saturating_sub(now_ms).min(*duration_ms);
            }
        }

        self.is_running = false;
    }

    /// Current displayable time in milliseconds: elapsed for a stopwatch,
    /// remaining for a countdown.
    pub fn materialize(&self, now_ms: u64) -> u64 {
        match &self.state {
            ItemState::Stopwatch {
                accumulated_ms,
                run_started_at_ms,
            } => {
                if self.is_running {
                    accumulated_ms + now_ms.saturating_sub(*run_started_at_ms)
                } else {
                    *accumulated_ms
                }
            }
            ItemState::Countdown {
                duration_ms,
                remaining_ms,
                run_ends_at_ms,
            } => {
                if self.is_running {
                    run_ends_at_ms.saturating_sub(now_ms).min(*duration_ms)
                } else {
                    *remaining_ms
                }
            }
        }
    }

    /// Periodic expiry check. A running countdown whose deadline has passed
    /// is paused and clamped to exactly zero; it then refuses to restart
    /// until removed. Returns true when that transition happened. Running
    /// stopwatches need no per-tick mutation since elapsed time is derived.
    pub fn expire(&mut self, now_ms: u64) -> bool {
        if !self.is_running {
            return false;
        }

        match &mut self.state {
            ItemState::Stopwatch { .. } => false,
            ItemState::Countdown {
                remaining_ms,
                run_ends_at_ms,
                ..
            } => {
                if *run_ends_at_ms <= now_ms {
                    *remaining_ms = 0;
                    self.is_running = false;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Countdown duration in whole seconds; None for stopwatches.
    pub fn duration_secs(&self) -> Option<u64> {
        match &self.state {
            ItemState::Stopwatch { .. } => None,
            ItemState::Countdown { duration_ms, .. } => Some(duration_ms / 1000),
        }
    }
}
