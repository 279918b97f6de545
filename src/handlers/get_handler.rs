pub use crate::prelude::*;
use crate::utils::http_date::{format_http_date, not_modified_since};
use std::io::{Seek, SeekFrom};

/// Resolves a route-relative URL to a filesystem path, without touching the
/// filesystem itself. Shared by `handle_get` and the response-signing hook
/// in `HttpRequest::setup_action`, which needs the same path to hand to the
/// external `pgp_engine` worker.
pub fn resolve_static_path(request: &HttpRequest, r_cfg: &RouteConfig) -> PathBuf {
    let root = &r_cfg.root;
    let relative_path = request
        .url
        .strip_prefix(&r_cfg.path)
        .unwrap_or(&request.url);
    let mut path = PathBuf::from(root);
    path.push(relative_path.trim_start_matches('/'));
    path
}

/// Parses a `Range: bytes=...` header into an inclusive `(start, end)` byte
/// range, clamped to `file_size`. Only the single-range forms `d-d`, `d-`
/// and `-d` are accepted -- a comma (multiple ranges) falls back to `None`,
/// which callers treat as "serve the whole file", matching thttpd's own
/// single-range-only support.
pub fn parse_byte_range(header: &str, file_size: usize) -> Option<(usize, usize)> {
    let spec = header.trim().strip_prefix("bytes=")?;
    if spec.contains(',') || file_size == 0 {
        return None;
    }
    let (start_str, end_str) = spec.split_once('-')?;

    if start_str.is_empty() {
        // suffix range: last N bytes
        let n: usize = end_str.trim().parse().ok()?;
        if n == 0 {
            return None;
        }
        let n = n.min(file_size);
        return Some((file_size - n, file_size - 1));
    }

    let start: usize = start_str.trim().parse().ok()?;
    if start >= file_size {
        return None;
    }
    let end = if end_str.trim().is_empty() {
        file_size - 1
    } else {
        end_str.trim().parse::<usize>().ok()?.min(file_size - 1)
    };
    if end < start {
        return None;
    }
    Some((start, end))
}

pub fn handle_get(
    request: &HttpRequest,
    r_cfg: &RouteConfig,
    s_cfg: &Arc<ServerConfig>,
) -> (HttpResponse, ActiveAction) {
    let mut path = resolve_static_path(request, r_cfg);

    if path.is_dir() {
        if r_cfg.default_file != "" {
            path.push(&r_cfg.default_file);
        } else if r_cfg.autoindex {
            return (generate_autoindex(&path, &request.url), ActiveAction::None);
        } else {
            let mut res = HttpResponse::new(403, "Forbidden");
            res.set_body(
                b"403 Forbidden: Directory listing denied".to_vec(),
                "text/plain",
            );
            return (res, ActiveAction::None);
        }
    }

    match File::open(&path) {
        Ok(mut file) => {
            let Ok(metadata) = file.metadata() else {
                return (
                    handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg)),
                    ActiveAction::None,
                );
            };
            let file_size = metadata.size() as usize;
            let mime_type = get_mime_type(path.extension().and_then(|s| s.to_str()));
            let last_modified = metadata.modified().ok();

            if let (Some(mtime), Some(if_modified_since)) =
                (last_modified, request.headers.get("if-modified-since"))
            {
                if not_modified_since(mtime, if_modified_since) {
                    let mut res =
                        HttpResponse::new(HTTP_NOT_MODIFIED, &HttpResponse::status_text(HTTP_NOT_MODIFIED));
                    res.headers.insert("Content-Length".to_string(), "0".to_string());
                    res.headers
                        .insert("Last-Modified".to_string(), format_http_date(mtime));
                    return (res, ActiveAction::None);
                }
            }

            if let Some(range_header) = request.headers.get("range") {
                if let Some((start, end)) = parse_byte_range(range_header, file_size) {
                    if file.seek(SeekFrom::Start(start as u64)).is_err() {
                        return (
                            handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg)),
                            ActiveAction::None,
                        );
                    }
                    let range_len = end - start + 1;

                    let mut res =
                        HttpResponse::new(HTTP_PARTIAL_CONTENT, &HttpResponse::status_text(HTTP_PARTIAL_CONTENT));
                    res.headers
                        .insert("Content-Length".to_string(), range_len.to_string());
                    res.headers
                        .insert("Content-Type".to_string(), mime_type.to_string());
                    res.headers.insert(
                        "Content-Range".to_string(),
                        format!("bytes {}-{}/{}", start, end, file_size),
                    );
                    res.headers
                        .insert("Accept-Ranges".to_string(), "bytes".to_string());
                    if let Some(mtime) = last_modified {
                        res.headers
                            .insert("Last-Modified".to_string(), format_http_date(mtime));
                    }

                    return (res, ActiveAction::FileDownload(file, range_len));
                }
            }

            let mut res = HttpResponse::new(HTTP_OK, &HttpResponse::status_text(HTTP_OK));
            res.headers
                .insert("Content-Length".to_string(), file_size.to_string());
            res.headers
                .insert("Content-Type".to_string(), mime_type.to_string());
            res.headers
                .insert("Accept-Ranges".to_string(), "bytes".to_string());
            if let Some(mtime) = last_modified {
                res.headers
                    .insert("Last-Modified".to_string(), format_http_date(mtime));
            }

            (res, ActiveAction::FileDownload(file, file_size))
        }
        Err(e) => {
            let res = match e.kind() {
                std::io::ErrorKind::NotFound => handle_error(HTTP_NOT_FOUND, Some(s_cfg)),
                std::io::ErrorKind::PermissionDenied => {
                    handle_error(HTTP_FORBIDDEN, Some(s_cfg))
                }
                _ => handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg)),
            };
            (res, ActiveAction::None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_byte_range_basic() {
        assert_eq!(parse_byte_range("bytes=5-9", 100), Some((5, 9)));
    }

    #[test]
    fn test_parse_byte_range_open_ended() {
        assert_eq!(parse_byte_range("bytes=90-", 100), Some((90, 99)));
    }

    #[test]
    fn test_parse_byte_range_suffix() {
        assert_eq!(parse_byte_range("bytes=-10", 100), Some((90, 99)));
    }

    #[test]
    fn test_parse_byte_range_clamped_end() {
        assert_eq!(parse_byte_range("bytes=5-1000", 100), Some((5, 99)));
    }

    #[test]
    fn test_parse_byte_range_rejects_multi_range() {
        assert_eq!(parse_byte_range("bytes=0-1,5-6", 100), None);
    }

    #[test]
    fn test_parse_byte_range_rejects_start_past_eof() {
        assert_eq!(parse_byte_range("bytes=200-300", 100), None);
    }

    #[test]
    fn test_parse_byte_range_rejects_malformed() {
        assert_eq!(parse_byte_range("nonsense", 100), None);
    }
}
