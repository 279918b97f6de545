//! Built-in HKP-style key server endpoints (spec "Supplemented features"):
//! `POST /pks/add` and `GET /pks/lookup`. Neither is a user-configured CGI
//! script -- both are server built-ins that still run through the exact
//! same child-supervisor pipe path as CGI (`core::cgi::spawn_stdio_child`),
//! because the core's only job here is piping bytes to/from the external
//! OpenPGP engine, same as spec 1 describes for signing.

use crate::core::children::ChildTable;
use crate::core::cgi::SpawnError;
use crate::prelude::*;
use std::process::Command;

pub const PKS_ADD_PATH: &str = "/pks/add";
pub const PKS_LOOKUP_PATH: &str = "/pks/lookup";

/// `POST /pks/add`: the request body (`keytext=...`, url-encoded) is piped
/// to `{pgp_engine} import` verbatim, exactly like a CGI POST body -- the
/// worker is responsible for url-decoding and import semantics, including
/// the merge-only restriction when `PKS_ADD_MERGE_ONLY` is set.
pub fn handle_pks_add(
    conn: &mut HttpConnection,
    poll: &Poll,
    next_token: &mut usize,
    cgi_to_client: &mut HashMap<Token, Token>,
    client_token: Token,
    s_cfg: &Arc<ServerConfig>,
    children: &mut ChildTable,
) -> Option<HttpResponse> {
    let Some(engine) = &s_cfg.pgp_engine else {
        return Some(handle_error(HTTP_NOT_IMPLEMENTED, Some(s_cfg)));
    };

    let mut cmd = Command::new(engine);
    cmd.arg("import");
    if s_cfg.pks_add_merge_only {
        cmd.arg("--merge-only");
    }

    match crate::core::cgi::spawn_stdio_child(
        cmd,
        poll,
        next_token,
        cgi_to_client,
        client_token,
        children,
    ) {
        Ok((action, out_token, in_token)) => {
            conn.cgi_out_token = Some(out_token);
            conn.cgi_in_token = Some(in_token);
            conn.action = action;
            trace!("pks add running via {}", engine);
            None
        }
        Err(SpawnError::AtCapacity) => Some(handle_error(HTTP_SERVICE_UNAVAILABLE, Some(s_cfg))),
        Err(SpawnError::Io(_)) => Some(handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg))),
    }
}

/// `GET /pks/lookup?op=get&search=...`: the query string is forwarded as a
/// single argument to `{pgp_engine} lookup`; there is no request body to
/// pipe, so the stdin half of the duplex pair simply never gets written to.
pub fn handle_pks_lookup(
    conn: &mut HttpConnection,
    poll: &Poll,
    next_token: &mut usize,
    cgi_to_client: &mut HashMap<Token, Token>,
    client_token: Token,
    query: &str,
    s_cfg: &Arc<ServerConfig>,
    children: &mut ChildTable,
) -> Option<HttpResponse> {
    let Some(engine) = &s_cfg.pgp_engine else {
        return Some(handle_error(HTTP_NOT_IMPLEMENTED, Some(s_cfg)));
    };

    let mut cmd = Command::new(engine);
    cmd.arg("lookup").arg(query);

    match crate::core::cgi::spawn_stdio_child(
        cmd,
        poll,
        next_token,
        cgi_to_client,
        client_token,
        children,
    ) {
        Ok((action, out_token, in_token)) => {
            conn.cgi_out_token = Some(out_token);
            conn.cgi_in_token = Some(in_token);
            conn.action = action;
            trace!("pks lookup running via {}", engine);
            None
        }
        Err(SpawnError::AtCapacity) => Some(handle_error(HTTP_SERVICE_UNAVAILABLE, Some(s_cfg))),
        Err(SpawnError::Io(_)) => Some(handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::TcpStream as MioTcpStream;
    use std::net::{TcpListener, TcpStream};

    fn test_connection() -> HttpConnection {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).unwrap();
        let (stream, _) = listener.accept().unwrap();
        stream.set_nonblocking(true).unwrap();
        HttpConnection::new(MioTcpStream::from_std(stream), Vec::new())
    }

    #[test]
    fn test_handle_pks_add_without_engine_returns_not_implemented() {
        let poll = Poll::new().unwrap();
        let mut conn = test_connection();
        let mut next_token = 1000usize;
        let mut cgi_to_client = HashMap::new();
        let s_cfg = Arc::new(ServerConfig::default());
        let mut children = ChildTable::new(4);

        let result = handle_pks_add(
            &mut conn,
            &poll,
            &mut next_token,
            &mut cgi_to_client,
            Token(0),
            &s_cfg,
            &mut children,
        );

        let response = result.expect("expected an immediate response");
        assert_eq!(response.status_code, HTTP_NOT_IMPLEMENTED);
    }

    #[test]
    fn test_handle_pks_lookup_without_engine_returns_not_implemented() {
        let poll = Poll::new().unwrap();
        let mut conn = test_connection();
        let mut next_token = 1000usize;
        let mut cgi_to_client = HashMap::new();
        let s_cfg = Arc::new(ServerConfig::default());
        let mut children = ChildTable::new(4);

        let result = handle_pks_lookup(
            &mut conn,
            &poll,
            &mut next_token,
            &mut cgi_to_client,
            Token(0),
            "op=get&search=alice",
            &s_cfg,
            &mut children,
        );

        let response = result.expect("expected an immediate response");
        assert_eq!(response.status_code, HTTP_NOT_IMPLEMENTED);
    }
}
