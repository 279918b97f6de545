//! Signal-driven control plane (spec 6/9): a self-pipe registered with the
//! poller at `SIGNAL_TOKEN` turns async-signal-unsafe work (anything beyond
//! setting a flag) into ordinary poll-loop code.

use crate::core::context::{Server, SIGNAL_TOKEN};
use crate::prelude::*;
use signal_hook::consts::{SIGALRM, SIGBUS, SIGCHLD, SIGHUP, SIGINT, SIGPIPE, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook_mio::v1_0::Signals;
use std::time::Duration;

/// Period of the OCCASIONAL timer that keeps the watchdog alive (thttpd's
/// `OCCASIONAL_TIME`). The real alarm is armed for three of these.
pub const OCCASIONAL_INTERVAL: Duration = Duration::from_secs(60);

pub struct SignalPipe {
    signals: Signals,
}

impl SignalPipe {
    pub fn register(poll: &Poll) -> Result<Self> {
        let mut signals = Signals::new([
            SIGTERM, SIGINT, SIGHUP, SIGUSR1, SIGUSR2, SIGALRM, SIGCHLD, SIGBUS, SIGPIPE,
        ])?;
        poll.registry()
            .register(&mut signals, SIGNAL_TOKEN, Interest::READABLE)?;
        Ok(SignalPipe { signals })
    }

    /// Drains every pending signal and folds it into server-level flags or
    /// immediate action. Never blocks: `Signals` is itself non-blocking once
    /// registered with the poller.
    pub fn drain(&mut self, server: &mut Server) {
        for signal in self.signals.pending() {
            match signal {
                SIGTERM | SIGINT => {
                    warn!("received shutdown signal {}, terminating", signal);
                    server.shutting_down = true;
                }
                SIGHUP => {
                    info!("SIGHUP: reloading log file");
                    server.reload_requested = true;
                }
                SIGUSR1 => {
                    info!("SIGUSR1: graceful stop requested, draining connections");
                    server.graceful_stop = true;
                }
                SIGUSR2 => {
                    info!(
                        "stats: {} connections, {} cgi children",
                        server.connections.len(),
                        server.children.cgi_count
                    );
                }
                SIGALRM => {
                    if server.watchdog_alive {
                        server.watchdog_alive = false;
                        unsafe {
                            libc::alarm((OCCASIONAL_INTERVAL.as_secs() * 3) as libc::c_uint);
                        }
                    } else {
                        errors!(
                            "watchdog: event loop unresponsive for {:?}, aborting",
                            OCCASIONAL_INTERVAL * 3
                        );
                        std::process::abort();
                    }
                }
                SIGCHLD => {
                    server.children.reap(&mut server.connections);
                }
                SIGBUS => {
                    errors!("SIGBUS received, a memory-mapped file likely went stale");
                }
                SIGPIPE => {}
                _ => {}
            }
        }
    }
}
