//! Response model and writer.
//!
//! Every response carries `Content-Type`, a `Content-Length` computed from
//! the body at serialization time, and the CORS headers, in that order.

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tracing::error;

pub const CONTENT_TYPE_JSON: &str = "application/json";

const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

/// A response ready to be framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Bytes,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    status: u16,
}

impl Response {
    /// JSON response with `value` as the body. A value that fails to
    /// serialize becomes a 500.
    pub fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> Response {
        match serde_json::to_vec(value) {
            Ok(body) => Response {
                status,
                content_type: CONTENT_TYPE_JSON,
                body: Bytes::from(body),
            },
            Err(e) => {
                error!(error = %e, "Failed to serialize response body");
                Response::internal_error()
            }
        }
    }

    /// `{"error": message, "status": code}`
    pub fn error(status: u16, message: &str) -> Response {
        Response::json(
            status,
            &ErrorBody {
                error: message,
                status,
            },
        )
    }

    pub fn no_content() -> Response {
        Response {
            status: 204,
            content_type: CONTENT_TYPE_JSON,
            body: Bytes::new(),
        }
    }

    /// Generic 500. Never carries internal detail.
    pub fn internal_error() -> Response {
        Response {
            status: 500,
            content_type: CONTENT_TYPE_JSON,
            body: Bytes::from_static(br#"{"error":"Internal Server Error","status":500}"#),
        }
    }

    pub fn reason(&self) -> &'static str {
        reason_phrase(self.status)
    }

    /// Headers in the order they are written.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Content-Type", self.content_type.to_string()),
            ("Content-Length", self.body.len().to_string()),
        ];
        headers.extend(CORS_HEADERS.iter().map(|&(k, v)| (k, v.to_string())));
        headers
    }

    /// Frame the response: status line, headers, blank line, body.
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(256 + self.body.len());
        buf.extend_from_slice(b"HTTP/1.1 ");
        buf.extend_from_slice(self.status.to_string().as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(self.reason().as_bytes());
        buf.extend_from_slice(b"\r\n");
        for (name, value) in self.headers() {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);
        buf
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing() {
        let response = Response::json(200, &serde_json::json!({"ok": true}));
        let bytes = response.to_bytes();

        let expected = "HTTP/1.1 200 OK\r\n\
            Content-Type: application/json\r\n\
            Content-Length: 11\r\n\
            Access-Control-Allow-Origin: *\r\n\
            Access-Control-Allow-Methods: GET, POST, PUT, DELETE, OPTIONS\r\n\
            Access-Control-Allow-Headers: Content-Type\r\n\
            \r\n\
            {\"ok\":true}";
        assert_eq!(&bytes[..], expected.as_bytes());
    }

    #[test]
    fn test_content_length_matches_body() {
        let body = vec!["\u{e9}t\u{e9}"; 3];
        let response = Response::json(201, &body);
        let headers = response.headers();
        let length = headers
            .iter()
            .find(|(k, _)| *k == "Content-Length")
            .map(|(_, v)| v.parse::<usize>().unwrap())
            .unwrap();
        assert_eq!(length, response.body.len());
    }

    #[test]
    fn test_error_body() {
        let response = Response::error(404, "Todo not found");
        assert_eq!(response.status, 404);
        assert_eq!(&response.body[..], br#"{"error":"Todo not found","status":404}"#);
        assert!(response.to_bytes().starts_with(b"HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn test_no_content() {
        let bytes = Response::no_content().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_internal_error_matches_error_helper() {
        assert_eq!(
            Response::internal_error(),
            Response::error(500, "Internal Server Error")
        );
    }

    #[test]
    fn test_cors_on_every_response() {
        for response in [
            Response::no_content(),
            Response::error(405, "Method Not Allowed"),
            Response::json(200, &Vec::<u8>::new()),
        ] {
            let names: Vec<&str> = response.headers().iter().map(|(k, _)| *k).collect();
            assert!(names.contains(&"Access-Control-Allow-Origin"));
            assert!(names.contains(&"Access-Control-Allow-Methods"));
            assert!(names.contains(&"Access-Control-Allow-Headers"));
        }
    }
}
