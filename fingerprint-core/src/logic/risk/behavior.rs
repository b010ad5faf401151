//! Interaction Counters
//!
//! Bounded ring buffer of UI interactions for one session. The caller owns
//! it (one per session context) and hands it to the combiner; nothing here
//! is global.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Interactions kept per session
pub const DEFAULT_INTERACTION_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    PointerMove,
    PointerClick,
    KeyPress,
    Scroll,
    Touch,
}

impl InteractionKind {
    /// Pointer and keyboard input count as human interaction
    pub fn is_human_input(self) -> bool {
        !matches!(self, InteractionKind::Scroll)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub kind: InteractionKind,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionCounters {
    session_start: DateTime<Utc>,
    capacity: usize,
    recent: VecDeque<Interaction>,
    /// Totals survive ring eviction
    human_total: u64,
    total: u64,
}

impl InteractionCounters {
    pub fn new(session_start: DateTime<Utc>) -> Self {
        Self::with_capacity(session_start, DEFAULT_INTERACTION_CAPACITY)
    }

    pub fn with_capacity(session_start: DateTime<Utc>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            session_start,
            capacity,
            recent: VecDeque::with_capacity(capacity),
            human_total: 0,
            total: 0,
        }
    }

    /// Push an interaction, evicting the oldest when full
    pub fn record(&mut self, kind: InteractionKind, at: DateTime<Utc>) {
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(Interaction { kind, at });

        self.total += 1;
        if kind.is_human_input() {
            self.human_total += 1;
        }
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    /// Whole seconds since the session started (0 if `now` is earlier)
    pub fn session_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.session_start).num_seconds().max(0)
    }

    /// Pointer/key events over the whole session
    pub fn human_interactions(&self) -> u64 {
        self.human_total
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Buffered interactions of `kind`
    pub fn recent_count(&self, kind: InteractionKind) -> usize {
        self.recent.iter().filter(|i| i.kind == kind).count()
    }

    pub fn recent(&self) -> impl Iterator<Item = &Interaction> {
        self.recent.iter()
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
