//! Send/linger engine (spec 4.4/4.6): drives the SENDING/PAUSING/LINGERING
//! half of a connection's lifecycle, owning the throttle ceiling and the
//! adaptive would-block back-off that `HttpConnection::write_data` alone
//! does not know about.

use crate::core::context::Server;
use crate::core::timers::TimerKind;
use crate::http::{ActiveAction, ConnState, HttpConnection};
use crate::prelude::*;
use proxy_log::trace;
use std::time::{Duration, Instant};

const MIN_WOULDBLOCK_STEP_MS: u64 = 10;
const LINGER_TIME: Duration = Duration::from_secs(5);

/// Joins throttle groups for the resolved path and primes the byte-range
/// bookkeeping. Called once, right after a request produced a body to send.
/// On throttle saturation, replaces the pending action with a 503 and never
/// enters SENDING.
pub fn admit(server: &mut Server, token: Token, resolved_path: &str) {
    let Some(conn) = server.connections.get_mut(token) else {
        return;
    };
    let file_size = match &conn.action {
        ActiveAction::FileDownload(_, size) => *size,
        _ => return,
    };

    match server.throttles.join(resolved_path) {
        Ok((groups, max_limit, min_limit)) => {
            conn.throttle_groups = groups;
            conn.max_limit = max_limit;
            conn.min_limit = min_limit;
        }
        Err(()) => {
            conn.action = ActiveAction::None;
            let mut res = handle_error(HTTP_SERVICE_UNAVAILABLE, conn.s_cfg.as_ref());
            res.set_header("Retry-After", "5");
            conn.write_buffer.clear();
            conn.write_buffer.extend_from_slice(&res.to_bytes());
            return;
        }
    }

    conn.conn_state = ConnState::Sending;
    conn.started_at = Instant::now();
    conn.next_byte_index = 0;
    conn.end_byte_index = file_size;
    conn.bytes_sent = 0;
    conn.wouldblock_delay = 0;
}

fn write_budget(max_limit: usize) -> usize {
    if max_limit == usize::MAX {
        usize::MAX
    } else {
        (max_limit / 4).max(1)
    }
}

/// Drives one tick of the SENDING state: refills from the file body if the
/// buffer ran dry, writes up to the throttle ceiling, and on WOULDBLOCK
/// enters PAUSING with a growing back-off timer.
pub fn handle_write_phase(server: &mut Server, poll: &Poll, token: Token) -> Result<()> {
    let Some(conn) = server.connections.get_mut(token) else {
        return Ok(());
    };

    if conn.write_buffer.is_empty() {
        if let ActiveAction::FileDownload(ref mut file, ref mut remaining) = conn.action {
            if *remaining == 0 {
                conn.action = ActiveAction::None;
            } else {
                let want = (*remaining).min(8192);
                let mut chunk = vec![0u8; want];
                match file.read(&mut chunk) {
                    Ok(0) => conn.action = ActiveAction::None,
                    Ok(n) => {
                        conn.write_buffer.extend_from_slice(&chunk[..n]);
                        *remaining -= n;
                        if *remaining == 0 {
                            conn.action = ActiveAction::None;
                        }
                    }
                    Err(_) => conn.closed = true,
                }
            }
        }
    }

    if !conn.write_buffer.is_empty() {
        let budget = write_budget(conn.max_limit);
        let attempt_len = conn.write_buffer.len().min(budget);
        match conn.stream.write(&conn.write_buffer[..attempt_len]) {
            Ok(0) => pause_for_wouldblock(server, token),
            Ok(n) => {
                if let Some(conn) = server.connections.get_mut(token) {
                    conn.write_buffer.drain(..n);
                }
                after_write(server, token, n);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => pause_for_wouldblock(server, token),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(_) => {
                if let Some(conn) = server.connections.get_mut(token) {
                    conn.closed = true;
                }
            }
        }
    }

    let Some(conn) = server.connections.get_mut(token) else {
        return Ok(());
    };

    if !conn.closed && conn.write_buffer.is_empty() && conn.conn_state == ConnState::Sending {
        finish_send(server, token, poll)?;
    }

    Ok(())
}

fn pause_for_wouldblock(server: &mut Server, token: Token) {
    let Some(conn) = server.connections.get_mut(token) else {
        return;
    };
    conn.wouldblock_delay += MIN_WOULDBLOCK_STEP_MS;
    conn.conn_state = ConnState::Pausing;
    let delay = conn.wouldblock_delay;
    if let Some(old) = conn.wakeup_timer.take() {
        server.timers.cancel(old);
    }
    let handle = server
        .timers
        .schedule(token, TimerKind::Wakeup, Duration::from_millis(delay));
    if let Some(conn) = server.connections.get_mut(token) {
        conn.wakeup_timer = Some(handle);
    }
}

fn after_write(server: &mut Server, token: Token, n: usize) {
    server.throttles.credit(
        &server
            .connections
            .get(token)
            .map(|c| c.throttle_groups.clone())
            .unwrap_or_default(),
        n,
    );

    let Some(conn) = server.connections.get_mut(token) else {
        return;
    };
    if conn.wouldblock_delay > MIN_WOULDBLOCK_STEP_MS {
        conn.wouldblock_delay -= MIN_WOULDBLOCK_STEP_MS;
    } else {
        conn.wouldblock_delay = 0;
    }
    conn.next_byte_index += n;
    conn.bytes_sent += n;
    conn.conn_state = ConnState::Sending;

    if conn.max_limit != usize::MAX {
        let elapsed = conn.started_at.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            let observed = conn.bytes_sent as f64 / elapsed;
            if observed > conn.max_limit as f64 {
                let coast = (conn.bytes_sent as f64 / conn.max_limit as f64 - elapsed).max(0.5);
                trace!("throttle coasting connection for {:.2}s", coast);
                conn.conn_state = ConnState::Pausing;
                let handle_old = conn.wakeup_timer.take();
                drop(conn);
                if let Some(old) = handle_old {
                    server.timers.cancel(old);
                }
                let handle = server
                    .timers
                    .schedule(token, TimerKind::Wakeup, Duration::from_secs_f64(coast));
                if let Some(conn) = server.connections.get_mut(token) {
                    conn.wakeup_timer = Some(handle);
                }
            }
        }
    }
}

fn finish_send(server: &mut Server, token: Token, poll: &Poll) -> Result<()> {
    server.throttles.leave(
        &server
            .connections
            .get(token)
            .map(|c| c.throttle_groups.clone())
            .unwrap_or_default(),
    );

    let Some(conn) = server.connections.get_mut(token) else {
        return Ok(());
    };
    conn.throttle_groups.clear();

    if conn.should_linger {
        enter_linger(server, token, poll)?;
        return Ok(());
    }

    let mut interest = Interest::READABLE;
    if matches!(conn.action, ActiveAction::FileDownload(_, _)) {
        interest |= Interest::WRITABLE;
    }
    conn.conn_state = ConnState::Reading;
    conn.response = HttpResponse::new(HTTP_OK, &HttpResponse::status_text(HTTP_OK));
    poll.registry()
        .reregister(&mut conn.stream, token, interest)?;

    if !conn.request.buffer.is_empty() && conn.request.state == ParsingState::RequestLine {
        let closed = HttpRequest::proces_request(
            poll,
            token,
            &mut server.next_token,
            &mut server.cgi_to_client,
            conn,
            &mut server.session_store,
            &mut server.children,
        )?;
        if let Some(conn) = server.connections.get_mut(token) {
            conn.closed = closed;
        }
    }
    Ok(())
}

/// Apache-style lingering close: shut the write half, keep reading (and
/// discarding) until EOF/error/timer, then the idle sweep or read path
/// performs the real close.
fn enter_linger(server: &mut Server, token: Token, poll: &Poll) -> Result<()> {
    let Some(conn) = server.connections.get_mut(token) else {
        return Ok(());
    };
    let _ = conn.stream.shutdown(std::net::Shutdown::Write);
    conn.conn_state = ConnState::Lingering;
    poll.registry()
        .reregister(&mut conn.stream, token, Interest::READABLE)?;
    let handle = server
        .timers
        .schedule(token, TimerKind::Linger, LINGER_TIME);
    if let Some(conn) = server.connections.get_mut(token) {
        conn.linger_timer = Some(handle);
    }
    Ok(())
}

/// While LINGERING, drain and discard bytes; EOF or read error triggers the
/// real close at the call site (mainloop clears the connection).
pub fn handle_linger(conn: &mut HttpConnection) -> bool {
    let mut buf = [0u8; 4096];
    loop {
        match conn.stream.read(&mut buf) {
            Ok(0) => return true,
            Ok(_) => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
            Err(_) => return true,
        }
    }
}
