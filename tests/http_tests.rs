use gatekeepd::http::{HttpResponse, Method, ParseError};
use std::str::FromStr;

#[test]
fn test_method_from_str() {
    assert_eq!(Method::from_str("get").unwrap(), Method::GET);
    assert_eq!(Method::from_str("POST").unwrap(), Method::POST);
    assert_eq!(Method::from_str("Delete").unwrap(), Method::DELETE);
    assert!(Method::from_str("PATCH").is_err());
}

#[test]
fn test_method_is_allowed() {
    let allowed = vec!["GET".to_string(), "POST".to_string()];
    assert!(Method::GET.is_allowed(&allowed));
    assert!(!Method::DELETE.is_allowed(&allowed));
}

#[test]
fn test_parse_error_display() {
    assert_eq!(
        ParseError::MalformedRequestLine.to_string(),
        "Malformed request line"
    );
    assert_eq!(ParseError::InvalidMethod.to_string(), "Invalid HTTP method");
}

#[test]
fn test_response_generation() {
    let mut res = HttpResponse::new(200, "OK");
    res.set_header("Content-Type", "text/plain")
        .set_body(b"Hello Rust".to_vec(), "text/plain");

    let bytes = res.to_bytes();
    let s = String::from_utf8_lossy(&bytes);

    assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(s.contains("Content-Type: text/plain\r\n"));
    assert!(s.contains("Content-Length: 10\r\n"));
    assert!(s.ends_with("\r\n\r\nHello Rust"));
}

#[test]
fn test_response_headers_only_omits_body() {
    let res = HttpResponse::new(204, "No Content");
    let bytes = res.to_bytes_headers_only();
    let s = String::from_utf8_lossy(&bytes);
    assert!(s.starts_with("HTTP/1.1 204 No Content\r\n"));
    assert!(s.ends_with("\r\n\r\n"));
}
