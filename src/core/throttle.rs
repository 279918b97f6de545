//! Rate-limit groups matched by filename glob. A sending connection joins
//! every group whose pattern matches the resolved path; its effective
//! ceiling is the tightest `max_limit/num_sending` across joined groups.

use crate::config::ThrottleConfig;
use crate::core::glob::glob_match;
use crate::core::slots::SlotTable;
use proxy_log::warn;
use std::time::{Duration, Instant};

pub const THROTTLE_TIME: u64 = 10;

#[derive(Debug, Clone)]
pub struct Throttle {
    pub pattern: String,
    pub max_limit: usize,
    pub min_limit: usize,
    pub rate: f64,
    pub bytes_since_avg: usize,
    pub num_sending: usize,
}

impl Throttle {
    pub fn new(pattern: String, min_limit: usize, max_limit: usize) -> Self {
        Throttle {
            pattern,
            max_limit,
            min_limit,
            rate: 0.0,
            bytes_since_avg: 0,
            num_sending: 0,
        }
    }
}

pub struct ThrottleTable {
    pub groups: Vec<Throttle>,
    last_update: Instant,
}

impl Default for ThrottleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ThrottleTable {
    pub fn new() -> Self {
        ThrottleTable {
            groups: Vec::new(),
            last_update: Instant::now(),
        }
    }

    pub fn from_configs(configs: &[ThrottleConfig]) -> Self {
        let groups = configs
            .iter()
            .map(|c| Throttle::new(c.pattern.clone(), c.min_limit, c.max_limit))
            .collect();
        ThrottleTable {
            groups,
            last_update: Instant::now(),
        }
    }

    /// Joins every matching group in declaration order. Returns `Err` if any
    /// matched group is saturated (`rate > 2*max_limit` or `rate < min_limit`)
    /// -- the caller should answer 503 and join nothing.
    pub fn join(&mut self, filename: &str) -> Result<(Vec<usize>, usize, usize), ()> {
        let mut joined = Vec::new();
        for (idx, g) in self.groups.iter().enumerate() {
            if glob_match(&g.pattern, filename) {
                if g.rate > 2.0 * g.max_limit as f64 || g.rate < g.min_limit as f64 {
                    return Err(());
                }
                joined.push(idx);
            }
        }
        for &idx in &joined {
            self.groups[idx].num_sending += 1;
        }
        let (max_limit, min_limit) = self.recompute_limits(&joined);
        Ok((joined, max_limit, min_limit))
    }

    pub fn leave(&mut self, joined: &[usize]) {
        for &idx in joined {
            if let Some(g) = self.groups.get_mut(idx) {
                g.num_sending = g.num_sending.saturating_sub(1);
            }
        }
    }

    pub fn recompute_limits(&self, joined: &[usize]) -> (usize, usize) {
        if joined.is_empty() {
            return (usize::MAX, 0);
        }
        let max_limit = joined
            .iter()
            .map(|&idx| {
                let g = &self.groups[idx];
                g.max_limit / g.num_sending.max(1)
            })
            .min()
            .unwrap_or(usize::MAX);
        let min_limit = joined
            .iter()
            .map(|&idx| self.groups[idx].min_limit)
            .max()
            .unwrap_or(0);
        (max_limit, min_limit)
    }

    pub fn credit(&mut self, joined: &[usize], bytes: usize) {
        for &idx in joined {
            if let Some(g) = self.groups.get_mut(idx) {
                g.bytes_since_avg += bytes;
            }
        }
    }

    pub fn due(&self, now: Instant) -> bool {
        now.duration_since(self.last_update) >= Duration::from_secs(THROTTLE_TIME)
    }

    /// EMA smoothing of the observed rate; logs over/under against the
    /// configured band. Does not touch any connection's ceiling -- that's
    /// `redistribute`'s job, called right after this on the same tick.
    pub fn update_rates(&mut self, now: Instant) {
        for g in &mut self.groups {
            let instantaneous = g.bytes_since_avg as f64 / THROTTLE_TIME as f64;
            g.rate = (2.0 * g.rate + instantaneous) / 3.0;
            g.bytes_since_avg = 0;
            if g.num_sending > 0 {
                if g.rate > g.max_limit as f64 {
                    warn!(
                        "throttle '{}' rate {:.0}B/s exceeds max_limit {}",
                        g.pattern, g.rate, g.max_limit
                    );
                } else if g.rate < g.min_limit as f64 {
                    warn!(
                        "throttle '{}' rate {:.0}B/s below min_limit {}",
                        g.pattern, g.rate, g.min_limit
                    );
                }
            }
        }
        self.last_update = now;
    }

    /// Re-applies `recompute_limits` to every currently SENDING/PAUSING
    /// connection, redistributing `max_limit` fair-share across whichever
    /// senders are joined to each group right now -- a connection that
    /// joined when it was alone and others have since joined would otherwise
    /// keep its original, now-too-generous ceiling until it finishes.
    pub fn redistribute(&self, connections: &mut SlotTable) {
        for (_, conn) in connections.iter_mut() {
            if conn.throttle_groups.is_empty() {
                continue;
            }
            let (max_limit, min_limit) = self.recompute_limits(&conn.throttle_groups);
            conn.max_limit = max_limit;
            conn.min_limit = min_limit;
        }
    }
}
