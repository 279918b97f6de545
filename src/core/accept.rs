//! Accept loop (spec 4.2): drains a listener's backlog into fresh
//! connection slots, never queueing beyond what the slot table can hold.

use crate::core::context::{Server, MAX_CONNECTIONS};
use crate::http::{ConnState, HttpConnection};
use crate::prelude::*;

pub fn accept_all(server: &mut Server, poll: &Poll, listener_token: Token) {
    if server.graceful_stop {
        return;
    }
    let Some(listener) = server.listener_for(listener_token) else {
        return;
    };
    let configs = listener.configs.clone();

    loop {
        let Some(listener) = server.listeners.iter_mut().find(|l| l.token == listener_token)
        else {
            return;
        };
        let (stream, addr) = match listener.socket.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!("accept failed on {:?}: {}", listener_token, e);
                return;
            }
        };

        if server.connections.is_full() {
            warn!("connection table full ({} slots), dropping {}", MAX_CONNECTIONS, addr);
            return;
        }

        let mut conn = HttpConnection::new(stream, configs.clone());
        conn.conn_state = ConnState::Reading;
        conn.touch();

        let Some(token) = server.connections.try_insert(conn) else {
            return;
        };

        let conn = server.connections.get_mut(token).expect("just inserted");
        if let Err(e) = poll
            .registry()
            .register(&mut conn.stream, token, Interest::READABLE)
        {
            warn!("failed to register accepted connection from {}: {}", addr, e);
            server.connections.remove(token);
            continue;
        }
        trace!("accepted {} as {:?}", addr, token);
    }
}
