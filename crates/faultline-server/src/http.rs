//! Minimal HTTP/1.1 framing for the decision protocol.
//!
//! One request per connection: the server answers with `Connection: close`
//! and the client reads the response until EOF. Only `Content-Length` bodies
//! are understood.

use std::fmt::Write as _;

use crate::error::{ServerError, ServerResult};

/// Requests larger than this are rejected.
pub const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

const HEADER_END: &[u8] = b"\r\n\r\n";

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn body_str(&self) -> ServerResult<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|e| ServerError::BadRequest(format!("body is not utf-8: {e}")))
    }

    /// Non-empty path segments, percent-decoded.
    pub fn segments(&self) -> ServerResult<Vec<String>> {
        let path = self.path.split('?').next().unwrap_or_default();
        path.split('/')
            .filter(|s| !s.is_empty())
            .map(decode_segment)
            .collect()
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_END.len()).position(|w| w == HEADER_END)
}

/// Parses a request out of `buf`.
///
/// Returns `Ok(None)` while the head or the body is still incomplete.
pub fn parse_request(buf: &[u8]) -> ServerResult<Option<HttpRequest>> {
    if buf.len() > MAX_REQUEST_BYTES {
        return Err(ServerError::BadRequest("request too large".to_string()));
    }
    let Some(head_len) = find_header_end(buf) else {
        return Ok(None);
    };
    let head = std::str::from_utf8(&buf[..head_len])
        .map_err(|_| ServerError::BadRequest("request head is not utf-8".to_string()))?;

    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(ServerError::BadRequest(format!(
            "malformed request line: {request_line:?}"
        )));
    };
    if !version.starts_with("HTTP/1.") {
        return Err(ServerError::BadRequest(format!("unsupported version {version}")));
    }

    let content_length = content_length(lines)?;
    let body_start = head_len + HEADER_END.len();
    if buf.len() < body_start + content_length {
        return Ok(None);
    }

    Ok(Some(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        body: buf[body_start..body_start + content_length].to_vec(),
    }))
}

fn content_length<'a>(headers: impl Iterator<Item = &'a str>) -> ServerResult<usize> {
    for line in headers {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            let length: usize = value
                .trim()
                .parse()
                .map_err(|_| ServerError::BadRequest(format!("bad content-length {value:?}")))?;
            if length > MAX_REQUEST_BYTES {
                return Err(ServerError::BadRequest(format!(
                    "content-length {length} exceeds {MAX_REQUEST_BYTES} bytes"
                )));
            }
            return Ok(length);
        }
    }
    Ok(0)
}

/// Builds a complete HTTP/1.1 response.
pub fn http_response(status: u16, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status} {}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        reason_phrase(status),
        body.len()
    )
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        409 => "Conflict",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Builds a request with a JSON body.
pub fn http_request(method: &str, host: &str, path: &str, body: Option<&str>) -> String {
    let body = body.unwrap_or_default();
    let mut request = format!("{method} {path} HTTP/1.1\r\nHost: {host}\r\n");
    if !body.is_empty() {
        request.push_str("Content-Type: application/json\r\n");
    }
    let _ = write!(
        request,
        "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    request
}

/// Splits a raw response into its status code and body.
pub fn parse_response(raw: &[u8]) -> ServerResult<(u16, String)> {
    let head_len = find_header_end(raw)
        .ok_or_else(|| ServerError::InvalidResponse("truncated response head".to_string()))?;
    let head = String::from_utf8_lossy(&raw[..head_len]);
    let status_line = head.lines().next().unwrap_or_default();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ServerError::InvalidResponse(format!("bad status line {status_line:?}")))?;

    let mut body = &raw[head_len + HEADER_END.len()..];
    if let Ok(length) = content_length(head.split("\r\n").skip(1)) {
        if length > 0 && body.len() >= length {
            body = &body[..length];
        }
    }
    let body = String::from_utf8(body.to_vec())
        .map_err(|_| ServerError::InvalidResponse("body is not utf-8".to_string()))?;
    Ok((status, body))
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

/// Percent-encodes a single path segment.
pub fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        if is_unreserved(b) {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

/// Reverses [`encode_segment`].
pub fn decode_segment(segment: &str) -> ServerResult<String> {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| ServerError::BadRequest(format!("bad escape in {segment:?}")))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out)
        .map_err(|_| ServerError::BadRequest(format!("segment {segment:?} is not utf-8")))
}
