//! Idle sweep (spec 4.7): walks every slot every `IDLE_SWEEP_INTERVAL`,
//! evicting connections that have been READING or SENDING/PAUSING too long,
//! and separately reaps CGI children that have exceeded their time budget.

use crate::core::cgi::force_cgi_timeout;
use crate::core::context::Server;
use crate::http::{ActiveAction, ConnState, HttpConnection};
use crate::prelude::*;
use std::net::Shutdown;
use std::time::{Duration, Instant};

pub const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(5);
pub const IDLE_READ_TIMELIMIT: u64 = 30;
pub const IDLE_SEND_TIMELIMIT: u64 = 60;

pub fn sweep(server: &mut Server, poll: &Poll) {
    let now = Instant::now();
    let mut to_clear = Vec::new();

    {
        let connections = &mut server.connections;
        let cgi_to_client = &mut server.cgi_to_client;
        let children = &mut server.children;

        for (token, conn) in connections.iter_mut() {
            let idle = now.duration_since(conn.last_activity).as_secs();
            match conn.conn_state {
                ConnState::Reading if idle >= IDLE_READ_TIMELIMIT => {
                    let mut res = handle_error(HTTP_REQUEST_TIMEOUT, conn.s_cfg.as_ref());
                    res.set_header("Connection", "close");
                    conn.write_buffer.clear();
                    conn.write_buffer.extend_from_slice(&res.to_bytes());
                    conn.conn_state = ConnState::Sending;
                    conn.closed = true;
                    let _ = poll
                        .registry()
                        .reregister(&mut conn.stream, token, Interest::WRITABLE);
                }
                ConnState::Sending | ConnState::Pausing if idle >= IDLE_SEND_TIMELIMIT => {
                    to_clear.push(token);
                }
                _ => {}
            }

            if let ActiveAction::Cgi { start_time, .. } = &conn.action {
                if start_time.elapsed().as_secs() > TIMEOUT_CGI {
                    force_cgi_timeout(conn, cgi_to_client, children);
                    let _ = poll
                        .registry()
                        .reregister(&mut conn.stream, token, Interest::WRITABLE);
                }
            }
        }
    }

    for token in to_clear {
        if let Some(conn) = server.connections.get_mut(token) {
            let _ = poll.registry().deregister(&mut conn.stream);
            let _ = conn.stream.shutdown(Shutdown::Both);
        }
        HttpConnection::terminate_connection(server, token);
    }

    if server.session_store.last_cleanup.elapsed() > Duration::from_secs(CLEAN_UP) {
        server.session_store.cleanup();
        server.session_store.last_cleanup = Instant::now();
    }
}
