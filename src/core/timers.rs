//! Arena-indexed timer wheel. Timers are referenced by `TimerHandle` (an
//! arena slot index) rather than back-pointers from the connection, so a
//! `ConnectionSlot` can cancel its own timer without the wheel knowing
//! anything about connections.

use mio::Token;
use std::time::{Duration, Instant};

pub type TimerHandle = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Wakeup,
    Linger,
    Idle,
    Throttle,
    Watchdog,
}

struct TimerEntry {
    deadline: Instant,
    token: Token,
    kind: TimerKind,
    active: bool,
}

pub struct TimerWheel {
    entries: Vec<TimerEntry>,
    free: Vec<usize>,
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerWheel {
    pub fn new() -> Self {
        TimerWheel {
            entries: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn schedule(&mut self, token: Token, kind: TimerKind, delay: Duration) -> TimerHandle {
        let entry = TimerEntry {
            deadline: Instant::now() + delay,
            token,
            kind,
            active: true,
        };
        if let Some(idx) = self.free.pop() {
            self.entries[idx] = entry;
            idx
        } else {
            self.entries.push(entry);
            self.entries.len() - 1
        }
    }

    pub fn cancel(&mut self, handle: TimerHandle) {
        if let Some(e) = self.entries.get_mut(handle) {
            if e.active {
                e.active = false;
                self.free.push(handle);
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .iter()
            .filter(|e| e.active)
            .map(|e| e.deadline)
            .min()
    }

    /// Fires due timers in non-decreasing deadline order. A timer cancelled
    /// before this runs never appears in the result.
    pub fn run_due(&mut self, now: Instant) -> Vec<(Token, TimerKind)> {
        let mut due: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.active && e.deadline <= now)
            .map(|(i, _)| i)
            .collect();
        due.sort_by_key(|&i| self.entries[i].deadline);

        let mut fired = Vec::with_capacity(due.len());
        for idx in due {
            let entry = &mut self.entries[idx];
            if !entry.active {
                continue;
            }
            fired.push((entry.token, entry.kind));
            entry.active = false;
            self.free.push(idx);
        }
        fired
    }
}
