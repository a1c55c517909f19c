//! Request parser.
//!
//! Turns the bytes of one receive into a `Request`. Only a small subset of
//! HTTP/1.1 is understood:
//!
//! ```text
//! <METHOD> <target> HTTP/1.x
//! <Header-Name>: <value>
//! ...
//! <blank line>
//! <body bytes, verbatim>
//! ```
//!
//! Lines may end in CRLF or bare LF. The body is whatever followed the blank
//! line in the same receive; `Content-Length` is not consulted, so a body
//! that did not arrive in the first read is truncated.

use bytes::Bytes;
use std::collections::HashMap;

/// Request methods the router knows about. Anything else parses as
/// `Unknown` and is turned away by the router with 405.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Options,
    Unknown,
}

impl Method {
    /// Method tokens are case-sensitive.
    pub fn from_token(token: &str) -> Method {
        match token {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            _ => Method::Unknown,
        }
    }
}

/// A parsed request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Method token as sent, kept for logging.
    pub method_token: String,
    /// Request target, including any query string.
    pub target: String,
    /// Header names are stored as sent; lookups are exact.
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl Request {
    /// Parse a request from the bytes of a single read.
    pub fn parse(input: &[u8]) -> Result<Request, ParseError> {
        let (head, body) = split_head(input);

        let mut lines = head
            .split(|&b| b == b'\n')
            .map(|l| l.strip_suffix(b"\r").unwrap_or(l));
        let request_line = lines.next().unwrap_or_default();
        let request_line =
            std::str::from_utf8(request_line).map_err(|_| ParseError::InvalidEncoding)?;
        let (method_token, target) = parse_request_line(request_line)?;

        // Header bytes are not validated; invalid UTF-8 is replaced.
        let mut headers = HashMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let line = String::from_utf8_lossy(line);
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_string(), value.trim().to_string());
            }
        }

        Ok(Request {
            method: Method::from_token(method_token),
            method_token: method_token.to_string(),
            target: target.to_string(),
            headers,
            body: Bytes::copy_from_slice(body),
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// `<method> <target> HTTP/<version>`, exactly three tokens.
fn parse_request_line(line: &str) -> Result<(&str, &str), ParseError> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(protocol), None) if protocol.starts_with("HTTP/") => {
            Ok((method, target))
        }
        _ => Err(ParseError::MalformedRequestLine(line.to_string())),
    }
}

/// Split at the first blank line. Without one, everything is head.
fn split_head(input: &[u8]) -> (&[u8], &[u8]) {
    let crlf = find(input, b"\r\n\r\n").map(|pos| (pos, pos + 4));
    let lf = find(input, b"\n\n").map(|pos| (pos, pos + 2));

    let boundary = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };

    match boundary {
        Some((head_end, body_start)) => (&input[..head_end], &input[body_start..]),
        None => (input, &[]),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Request parsing errors. All of them answer 400.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    MalformedRequestLine(String),
    InvalidEncoding,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MalformedRequestLine(line) => {
                write!(f, "malformed request line: {:?}", line)
            }
            ParseError::InvalidEncoding => write!(f, "request line is not valid UTF-8"),
        }
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get() {
        let req = Request::parse(b"GET /todos HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.target, "/todos");
        assert_eq!(req.header("Host"), Some("localhost"));
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_parse_post_with_body() {
        let raw = b"POST /todos HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 20\r\n\r\n{\"title\":\"Buy milk\"}";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(&req.body[..], b"{\"title\":\"Buy milk\"}");
    }

    #[test]
    fn test_bare_lf_line_endings() {
        let req = Request::parse(b"PUT /todos/3 HTTP/1.1\nX-Test: yes\n\nbody").unwrap();
        assert_eq!(req.method, Method::Put);
        assert_eq!(req.target, "/todos/3");
        assert_eq!(req.header("X-Test"), Some("yes"));
        assert_eq!(&req.body[..], b"body");
    }

    #[test]
    fn test_body_is_verbatim_and_ignores_content_length() {
        let raw = b"POST /todos HTTP/1.1\r\nContent-Length: 100\r\n\r\n{\"ti";
        let req = Request::parse(raw).unwrap();
        assert_eq!(&req.body[..], b"{\"ti");

        let raw = b"POST /todos HTTP/1.1\r\nContent-Length: 1\r\n\r\nabc\r\n\r\ndef";
        let req = Request::parse(raw).unwrap();
        assert_eq!(&req.body[..], b"abc\r\n\r\ndef");
    }

    #[test]
    fn test_no_blank_line() {
        let req = Request::parse(b"DELETE /todos/1 HTTP/1.1\r\nHost: x").unwrap();
        assert_eq!(req.method, Method::Delete);
        assert_eq!(req.header("Host"), Some("x"));
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_header_names_are_exact() {
        let req = Request::parse(b"GET / HTTP/1.1\r\ncontent-type: text/plain\r\n\r\n").unwrap();
        assert_eq!(req.header("content-type"), Some("text/plain"));
        assert_eq!(req.header("Content-Type"), None);
    }

    #[test]
    fn test_header_value_may_contain_colon() {
        let req = Request::parse(b"GET / HTTP/1.1\r\nHost: localhost:8080\r\n\r\n").unwrap();
        assert_eq!(req.header("Host"), Some("localhost:8080"));
    }

    #[test]
    fn test_unknown_method_still_parses() {
        let req = Request::parse(b"PATCH /todos/1 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.method, Method::Unknown);
        assert_eq!(req.method_token, "PATCH");

        let req = Request::parse(b"get /todos HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.method, Method::Unknown);
    }

    #[test]
    fn test_options() {
        let req = Request::parse(b"OPTIONS /todos HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.method, Method::Options);
    }

    #[test]
    fn test_malformed_request_lines() {
        for raw in [
            b"\r\n\r\n".as_slice(),
            b"GET\r\n\r\n".as_slice(),
            b"GET /todos\r\n\r\n".as_slice(),
            b"GET /todos FOO/1.1\r\n\r\n".as_slice(),
            b"GET /todos HTTP/1.1 extra\r\n\r\n".as_slice(),
            b"garbage".as_slice(),
        ] {
            assert!(
                matches!(Request::parse(raw), Err(ParseError::MalformedRequestLine(_))),
                "expected failure for {:?}",
                String::from_utf8_lossy(raw)
            );
        }
    }

    #[test]
    fn test_invalid_utf8_head() {
        assert_eq!(
            Request::parse(b"GET /\xff HTTP/1.1\r\n\r\n").unwrap_err(),
            ParseError::InvalidEncoding
        );
    }

    #[test]
    fn test_non_utf8_header_value_accepted() {
        let raw = b"POST /todos HTTP/1.1\r\nX-Name: caf\xe9\r\nHost: x\r\n\r\n{\"title\":\"a\"}";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.target, "/todos");
        assert_eq!(req.header("X-Name"), Some("caf\u{fffd}"));
        assert_eq!(req.header("Host"), Some("x"));
        assert_eq!(&req.body[..], b"{\"title\":\"a\"}");
    }

    #[test]
    fn test_binary_body_allowed() {
        let req = Request::parse(b"POST /todos HTTP/1.1\r\n\r\n\xff\xfe").unwrap();
        assert_eq!(&req.body[..], b"\xff\xfe");
    }
}
