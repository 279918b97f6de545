//! Event loop (spec 4.1): one `poll.poll()` per tick, dispatched by token
//! range, followed by due timers and the periodic idle sweep.

use crate::core::accept::accept_all;
use crate::core::cgi::handle_cgi_event;
use crate::core::context::{Server, CONN_TOKEN_BASE, DYNAMIC_TOKEN_BASE, SIGNAL_TOKEN, WATCHDOG_TOKEN};
use crate::core::idle;
use crate::core::read::handle_read_phase;
use crate::core::send::{handle_linger, handle_write_phase};
use crate::core::signals::{SignalPipe, OCCASIONAL_INTERVAL};
use crate::core::timers::TimerKind;
use crate::http::ConnState;
use crate::prelude::*;
use std::time::Instant;

pub fn run(server: &mut Server, poll: &mut Poll, signals: &mut SignalPipe) -> Result<()> {
    let mut events = Events::with_capacity(1024);
    let mut last_sweep = Instant::now();

    unsafe {
        libc::alarm((OCCASIONAL_INTERVAL.as_secs() * 3) as libc::c_uint);
    }
    server.timers.schedule(WATCHDOG_TOKEN, TimerKind::Watchdog, OCCASIONAL_INTERVAL);

    loop {
        let timeout = server
            .timers
            .next_deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
            .unwrap_or(idle::IDLE_SWEEP_INTERVAL);

        match poll.poll(&mut events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }

        for event in events.iter() {
            let token = event.token();

            if token == SIGNAL_TOKEN {
                let was_graceful = server.graceful_stop;
                signals.drain(server);
                if server.graceful_stop && !was_graceful {
                    info!("graceful stop: closing listeners, no longer accepting");
                    server.close_listeners(poll);
                }
                continue;
            }

            if !server.graceful_stop && server.is_listener_token(token) {
                accept_all(server, poll, token);
                continue;
            }

            if server.is_connection_token(token) {
                dispatch_connection(server, poll, token)?;
                continue;
            }

            if token.0 >= DYNAMIC_TOKEN_BASE {
                if let Some(&client_token) = server.cgi_to_client.get(&token) {
                    let cgi_to_client = &mut server.cgi_to_client;
                    if let Some(conn) = server.connections.get_mut(client_token) {
                        handle_cgi_event(
                            poll,
                            event,
                            token,
                            client_token,
                            conn,
                            cgi_to_client,
                            &mut server.children,
                        )?;
                    }
                    if server.connections.get(client_token).map(|c| c.should_close()) == Some(true)
                    {
                        crate::http::HttpConnection::terminate_connection(server, client_token);
                    }
                }
                continue;
            }
        }

        let now = Instant::now();
        for (token, kind) in server.timers.run_due(now) {
            match kind {
                TimerKind::Wakeup => {
                    if server.connections.get(token).is_some() {
                        dispatch_connection(server, poll, token)?;
                    }
                }
                TimerKind::Linger => {
                    crate::http::HttpConnection::terminate_connection(server, token);
                }
                TimerKind::Watchdog => {
                    server.watchdog_alive = true;
                    server
                        .timers
                        .schedule(WATCHDOG_TOKEN, TimerKind::Watchdog, OCCASIONAL_INTERVAL);
                }
                TimerKind::Idle | TimerKind::Throttle => {}
            }
        }

        if server.throttles.due(now) {
            server.throttles.update_rates(now);
            server.throttles.redistribute(&mut server.connections);
        }

        if now.duration_since(last_sweep) >= idle::IDLE_SWEEP_INTERVAL {
            idle::sweep(server, poll);
            server.children.reap(&mut server.connections);
            last_sweep = now;
        }

        if server.reload_requested {
            if let Err(e) = proxy_log::reopen() {
                warn!("failed to reopen log file: {}", e);
            }
            server.reload_requested = false;
        }

        if server.graceful_stop && server.connections.is_empty() {
            info!("graceful shutdown complete, exiting");
            return Ok(());
        }

        if server.shutting_down {
            server.children.kill_all(&mut server.connections);
            return Ok(());
        }
    }
}

fn dispatch_connection(server: &mut Server, poll: &Poll, token: Token) -> Result<()> {
    let Some(conn) = server.connections.get(token) else {
        return Ok(());
    };
    match conn.conn_state {
        ConnState::Reading => handle_read_phase(server, poll, token),
        ConnState::Sending | ConnState::Pausing => handle_write_phase(server, poll, token),
        ConnState::Lingering => {
            let Some(conn) = server.connections.get_mut(token) else {
                return Ok(());
            };
            if handle_linger(conn) {
                crate::http::HttpConnection::terminate_connection(server, token);
            }
            Ok(())
        }
    }
}
