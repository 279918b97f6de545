use crate::core::children::ChildTable;
use crate::core::slots::SlotTable;
use crate::prelude::*;
use proxy_log::{trace, warn};
use std::os::fd::{FromRawFd, IntoRawFd};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::process::{Command, Stdio};

/// Why a child couldn't be spawned: distinguished so callers can answer 503
/// (try again later, capacity is the whole point of `cgi_limit`) instead of
/// 500 (something actually went wrong) when the ceiling is simply full.
#[derive(Debug)]
pub enum SpawnError {
    AtCapacity,
    Io(std::io::Error),
}

impl From<std::io::Error> for SpawnError {
    fn from(e: std::io::Error) -> Self {
        SpawnError::Io(e)
    }
}

/// Wires a freshly-spawned child's stdin/stdout into the poller as a pair of
/// duplex pipes and returns the `ActiveAction::Cgi` for it, plus the tokens
/// the caller must stash on its `HttpConnection` (`cgi_out_token`/
/// `cgi_in_token`). Shared by script CGI (spec 4.2/4.8), the signing worker
/// (spec 4.9) and the built-in HKP endpoint -- all three are "spawn a child,
/// pipe bytes to/from it" and differ only in the `Command` and in whether
/// anything is ever written to stdin. Bounded by `children.cgi_limit` (spec
/// 4.8): every caller goes through here, so this is the one place the
/// ceiling needs enforcing.
pub fn spawn_stdio_child(
    mut cmd: Command,
    poll: &Poll,
    next_token: &mut usize,
    cgi_to_client: &mut HashMap<Token, Token>,
    client_token: Token,
    children: &mut ChildTable,
) -> std::result::Result<(ActiveAction, Token, Token), SpawnError> {
    if !children.has_capacity() {
        return Err(SpawnError::AtCapacity);
    }

    let (server_out_std, script_out_std) = StdUnixStream::pair()?;
    server_out_std.set_nonblocking(true)?;
    let mut server_out_mio = mio::net::UnixStream::from_std(server_out_std);

    let (server_in_std, script_in_std) = StdUnixStream::pair()?;
    server_in_std.set_nonblocking(true)?;
    let mut server_in_mio = mio::net::UnixStream::from_std(server_in_std);

    let script_output_file = unsafe { File::from_raw_fd(script_out_std.into_raw_fd()) };
    let script_input_file = unsafe { File::from_raw_fd(script_in_std.into_raw_fd()) };

    cmd.stdin(Stdio::from(script_input_file))
        .stdout(Stdio::from(script_output_file))
        .stderr(Stdio::inherit());

    let child = cmd.spawn()?;

    let out_token = Token(*next_token);
    *next_token += 1;
    poll.registry()
        .register(&mut server_out_mio, out_token, Interest::READABLE)
        .ok();

    let in_token = Token(*next_token);
    *next_token += 1;
    poll.registry()
        .register(&mut server_in_mio, in_token, Interest::WRITABLE)
        .ok();

    cgi_to_client.insert(out_token, client_token);
    cgi_to_client.insert(in_token, client_token);

    children.register(child.id(), client_token);

    Ok((
        ActiveAction::Cgi {
            out_stream: server_out_mio,
            in_stream: Some(server_in_mio),
            child,
            parse_state: CgiParsingState::ReadHeaders,
            header_buf: Vec::new(),
            start_time: Instant::now(),
        },
        out_token,
        in_token,
    ))
}

#[derive(Debug, PartialEq)]
pub enum CgiParsingState {
    ReadHeaders,
    StreamBody,
    StreamBodyChuncked,
}

pub fn parse_cgi_headers(bytes: &[u8]) -> (u16, Vec<(String, String)>) {
    let mut status = 200;
    let mut headers = Vec::new();
    let content = String::from_utf8_lossy(bytes);

    for line in content.lines() {
        if let Some((key, val)) = line.split_once(':') {
            let key = key.trim().to_lowercase();
            let val = val.trim().to_string();

            if key == "status" {
                status = val
                    .split_whitespace()
                    .next()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(200);
            } else {
                headers.push((key, val));
            }
        }
    }
    (status, headers)
}

pub fn parse_cgi_output(raw_output: &[u8]) -> (u16, Vec<(String, String)>, Vec<u8>) {
    let mut header_end = 0;
    if let Some(pos) = find_subsequence(raw_output, b"\r\n\r\n", 0) {
        header_end = pos;
    }

    let header_section = String::from_utf8_lossy(&raw_output[..header_end]);
    let body = raw_output[header_end + 4..].to_vec();

    let mut status_code = 200;
    let mut headers = Vec::new();

    for line in header_section.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_lowercase();
            let value = value.trim().to_string();

            if key == "status" {
                status_code = value
                    .split_whitespace()
                    .next()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(200);
            } else {
                headers.push((key, value));
            }
        }
    }

    (status_code, headers, body)
}

pub fn handle_cgi_event(
    poll: &Poll,
    event: &Event,
    cgi_token: Token,
    client_token: Token,
    conn: &mut HttpConnection,
    cgi_to_client: &mut HashMap<Token, Token>,
    children: &mut ChildTable,
) -> Result<()> {
    if let ActiveAction::Cgi {
        out_stream,
        in_stream,
        child,
        parse_state,
        header_buf,
        start_time,
    } = &mut conn.action
    {
        if start_time.elapsed().as_secs() > TIMEOUT_CGI {
            warn!("cgi child exceeded {}s budget for {}", TIMEOUT_CGI, conn.request.url);
        }
        // SCRIPT -> SERVER (Stdout)
        if event.is_readable() && Some(cgi_token) == conn.cgi_out_token {
            let mut buf = [0u8; 4096];
            match out_stream.read(&mut buf) {
                Ok(0) => {
                    if *parse_state == CgiParsingState::StreamBodyChuncked {
                        conn.write_buffer.extend_from_slice(b"0\r\n\r\n");
                        poll.registry().reregister(
                            &mut conn.stream,
                            client_token,
                            Interest::READABLE | Interest::WRITABLE,
                        )?;
                    }
                    conn.cgi_out_token = None;
                    conn.cgi_in_token = None;
                }
                Ok(n) => {
                    trace!("read {} bytes from cgi stdout", n);
                    process_cgi_stdout(parse_state, header_buf, &mut conn.write_buffer, &buf[..n])?;

                    poll.registry().reregister(
                        &mut conn.stream,
                        client_token,
                        Interest::READABLE | Interest::WRITABLE,
                    )?;
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(_) => conn.closed = true,
            }
        }

        // SERVER -> SCRIPT (Stdin)
        if event.is_writable() && Some(cgi_token) == conn.cgi_in_token && !conn.cgi_buffer.is_empty() {
            if let Some(pipe) = in_stream {
                match pipe.write(&conn.cgi_buffer) {
                    Ok(n) => {
                        conn.cgi_buffer.drain(..n);

                        if conn.cgi_buffer.len() < 65536 {
                            poll.registry().reregister(
                                &mut conn.stream,
                                client_token,
                                Interest::READABLE | Interest::WRITABLE,
                            )?;
                        }

                        if conn.body_remaining == 0 && conn.cgi_buffer.is_empty() {
                            conn.cgi_in_token = None;
                            trace!("cgi stdin pipe closed (eof sent)");
                        }
                    }
                    Err(e) if e.kind() != ErrorKind::WouldBlock => {}
                    Err(_) => conn.closed = true,
                }
            }
        }

        // Child process status check
        match child.try_wait() {
            Ok(Some(_status)) => {
                if let ActiveAction::Cgi { in_stream, child, .. } = &mut conn.action {
                    if conn.body_remaining == 0 && conn.cgi_buffer.is_empty() {
                        if let Some(pipe) = in_stream.take() {
                            drop(pipe);
                            conn.cgi_in_token = None;
                        }
                    }
                    children.forget(child.id());
                }

                cleanup_cgi(cgi_to_client, conn);
                conn.action = ActiveAction::None;
            }
            Ok(None) => {}
            Err(_) => conn.closed = true,
        }
    }
    Ok(())
}

pub fn build_cgi_env(conn: &mut HttpConnection) -> HashMap<String, String> {
    let req = &conn.request;
    let mut envs = HashMap::new();

    envs.insert("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string());
    envs.insert("SERVER_PROTOCOL".to_string(), "HTTP/1.1".to_string());
    envs.insert("REQUEST_METHOD".to_string(), req.method.to_string());
    envs.insert("PATH_INFO".to_string(), req.url.clone());
    envs.insert("SCRIPT_NAME".to_string(), req.url.clone());

    if let Some(s_cfg) = &conn.s_cfg {
        envs.insert("SERVER_NAME".to_string(), s_cfg.server_name.clone());
    }

    if let Ok(addr) = conn.stream.peer_addr() {
        envs.insert("REMOTE_ADDR".to_string(), addr.ip().to_string());
        envs.insert("REMOTE_PORT".to_string(), addr.port().to_string());

        // X-Forwarded-For: prepend the direct peer, preserving any chain the
        // client already presented, per the spec's list of consumed headers.
        let forwarded = match req.headers.get("x-forwarded-for") {
            Some(existing) => format!("{}, {}", existing, addr.ip()),
            None => addr.ip().to_string(),
        };
        envs.insert("HTTP_X_FORWARDED_FOR".to_string(), forwarded);
    }

    if let Some(ct) = req.headers.get("content-type") {
        envs.insert("CONTENT_TYPE".to_string(), ct.clone());
    }
    if let Some(cl) = req.headers.get("content-length") {
        envs.insert("CONTENT_LENGTH".to_string(), cl.clone());
    }

    for (k, v) in req.headers.iter().chain(&req.trailers) {
        if k.eq_ignore_ascii_case("x-forwarded-for") {
            continue;
        }
        let env_key = format!("HTTP_{}", k.to_uppercase().replace('-', "_"));
        envs.insert(env_key, v.clone());
    }

    envs
}

pub fn process_cgi_stdout(
    parse_state: &mut CgiParsingState,
    header_buf: &mut Vec<u8>,
    write_buffer: &mut Vec<u8>,
    new_data: &[u8],
) -> Result<()> {
    match parse_state {
        CgiParsingState::ReadHeaders => {
            header_buf.extend_from_slice(new_data);

            if let Some(pos) = find_subsequence(header_buf, b"\r\n\r\n", 0)
                .or_else(|| find_subsequence(header_buf, b"\n\n", 0))
            {
                let is_crlf = header_buf.contains(&b'\r');
                let delimiter_len = if is_crlf { 4 } else { 2 };

                let header_bytes = header_buf[..pos].to_vec();
                let body_start = header_buf[pos + delimiter_len..].to_vec();

                let (status, cgi_headers) = parse_cgi_headers(&header_bytes);
                let mut res = HttpResponse::new(status, &HttpResponse::status_text(status));

                res.headers.remove("Content-Length");

                for (k, v) in cgi_headers {
                    res.set_header(&k, &v);
                }

                let is_chunked = !res.headers.contains_key("content-length");
                if is_chunked {
                    res.set_header("transfer-encoding", "chunked");
                    *parse_state = CgiParsingState::StreamBodyChuncked;
                } else {
                    *parse_state = CgiParsingState::StreamBody;
                }

                write_buffer.extend_from_slice(&res.to_bytes_headers_only());

                if !body_start.is_empty() {
                    push_cgi_data(write_buffer, &body_start, is_chunked);
                }
            }
        }
        CgiParsingState::StreamBody => {
            write_buffer.extend_from_slice(new_data);
        }
        CgiParsingState::StreamBodyChuncked => {
            push_cgi_data(write_buffer, new_data, true);
        }
    }
    Ok(())
}

fn push_cgi_data(write_buffer: &mut Vec<u8>, data: &[u8], chunked: bool) {
    if chunked {
        let header = format!("{:X}\r\n", data.len());
        write_buffer.extend_from_slice(header.as_bytes());
        write_buffer.extend_from_slice(data);
        write_buffer.extend_from_slice(b"\r\n");
    } else {
        write_buffer.extend_from_slice(data);
    }
}

pub fn cleanup_cgi(cgi_to_client: &mut HashMap<Token, Token>, conn: &mut HttpConnection) {
    if let Some(t) = conn.cgi_out_token.take() {
        cgi_to_client.remove(&t);
    }
    if let Some(t) = conn.cgi_in_token.take() {
        cgi_to_client.remove(&t);
    }
}

pub fn check_time_out_cgi(
    connections: &mut SlotTable,
    poll: &Poll,
    cgi_to_client: &mut HashMap<Token, Token>,
    children: &mut ChildTable,
) {
    connections.retain(|token, conn| {
        if let ActiveAction::Cgi { start_time, .. } = &conn.action {
            if start_time.elapsed().as_secs() > TIMEOUT_CGI {
                warn!("cgi process for {:?} timed out with no events, killing", token);
                force_cgi_timeout(conn, cgi_to_client, children);

                poll.registry()
                    .reregister(&mut conn.stream, token, Interest::WRITABLE)
                    .ok();
                return true;
            }
        }
        true
    });
}

pub fn force_cgi_timeout(
    conn: &mut HttpConnection,
    cgi_to_client: &mut HashMap<Token, Token>,
    children: &mut ChildTable,
) {
    if let ActiveAction::Cgi { ref mut child, .. } = conn.action {
        let _ = child.kill();
        let _ = child.wait();
        children.forget(child.id());

        if let ActiveAction::Cgi { parse_state, .. } = &conn.action {
            if *parse_state == CgiParsingState::StreamBodyChuncked {
                let end_marker = "0\r\n\r\n";
                conn.write_buffer.extend_from_slice(end_marker.as_bytes());
            } else {
                let error_res = "HTTP/1.1 504 Gateway Timeout\r\nContent-Length: 0\r\n\r\n";
                conn.write_buffer.extend_from_slice(error_res.as_bytes());
            }
        }

        conn.cgi_in_token = None;
        conn.cgi_out_token = None;
        conn.cgi_buffer.clear();
        conn.closed = true;

        cleanup_cgi(cgi_to_client, conn);
        conn.action = ActiveAction::None;
    }
}
