//! Child-process supervisor: bounded CGI/signing concurrency and reaping.
//!
//! The legacy design indexes a pid -> slot table directly, since a bare pid
//! can be `waitpid`-ed from anywhere. `std::process::Child` only exposes a
//! non-blocking wait on the owning value, so here the pid -> slot mapping is
//! kept for accounting and the actual reap walks the slot table, calling
//! `try_wait()` on whichever connection still owns that `Child`.

use crate::core::slots::SlotTable;
use crate::http::ActiveAction;
use mio::Token;
use proxy_log::warn;
use std::collections::HashMap;
use std::process::Child;

pub struct ChildTable {
    pub cgi_limit: usize,
    pub cgi_count: usize,
    pid_to_slot: HashMap<u32, Token>,
    purgatory: Vec<Child>,
}

impl ChildTable {
    pub fn new(cgi_limit: usize) -> Self {
        ChildTable {
            cgi_limit,
            cgi_count: 0,
            pid_to_slot: HashMap::new(),
            purgatory: Vec::new(),
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.cgi_count < self.cgi_limit
    }

    pub fn register(&mut self, pid: u32, owner: Token) {
        self.pid_to_slot.insert(pid, owner);
        self.cgi_count += 1;
    }

    /// Known benign race (spec 4.8 / 9c): a child may exit and be reaped
    /// before the parent got around to recording its pid. Callers tolerate
    /// a missing entry by simply not finding it here.
    pub fn forget(&mut self, pid: u32) {
        if self.pid_to_slot.remove(&pid).is_some() {
            self.cgi_count = self.cgi_count.saturating_sub(1);
        }
    }

    pub fn quarantine(&mut self, child: Child) {
        self.purgatory.push(child);
    }

    /// Called on the SIGCHLD self-pipe wakeup: drains exited children with
    /// no-hang waits, across both the slot table and the shutdown purgatory.
    pub fn reap(&mut self, slots: &mut SlotTable) {
        for (_, conn) in slots.iter_mut() {
            if let ActiveAction::Cgi { child, .. } = &mut conn.action {
                match child.try_wait() {
                    Ok(Some(_)) => self.forget(child.id()),
                    Ok(None) => {}
                    Err(e) => warn!("waiting on cgi child failed: {}", e),
                }
            }
        }
        self.purgatory.retain_mut(|child| match child.try_wait() {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(e) => {
                warn!("waiting on zombie child failed: {}", e);
                false
            }
        });
    }

    /// Shutdown: gentle kill, then confirm, across every tracked child.
    pub fn kill_all(&mut self, slots: &mut SlotTable) {
        for (_, conn) in slots.iter_mut() {
            if let ActiveAction::Cgi { child, .. } = &mut conn.action {
                let _ = child.kill();
            }
        }
        for child in &mut self.purgatory {
            let _ = child.kill();
        }
        self.reap(slots);
    }
}
