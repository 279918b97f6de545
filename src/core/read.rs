//! Read phase (spec 4.3): drains the socket into the request buffer and
//! drives the parser; on request completion hands any produced body off to
//! the send engine for throttle admission.

use crate::core::context::Server;
use crate::core::send;
use crate::http::{ActiveAction, ConnState};
use crate::prelude::*;

pub fn handle_read_phase(server: &mut Server, poll: &Poll, token: Token) -> Result<()> {
    let Some(conn) = server.connections.get_mut(token) else {
        return Ok(());
    };

    match conn.read_data() {
        Ok(is_eof) => conn.closed = is_eof,
        Err(_) => conn.closed = true,
    }
    conn.touch();

    let mut interest = Interest::READABLE;
    if matches!(conn.action, ActiveAction::Cgi { .. }) && conn.request.buffer.len() > MAX_READ_DATA
    {
        interest = Interest::WRITABLE;
    }
    poll.registry()
        .reregister(&mut conn.stream, token, interest)?;

    if !conn.closed && !conn.request.buffer.is_empty() {
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

    if let Some(conn) = server.connections.get_mut(token) {
        if matches!(conn.action, ActiveAction::FileDownload(_, _)) {
            let resolved_path = conn.request.url.clone();
            send::admit(server, token, &resolved_path);
        } else if !conn.write_buffer.is_empty() {
            conn.conn_state = ConnState::Sending;
        }
    }

    Ok(())
}
