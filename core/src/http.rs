//! HTTP request and response types exchanged with the transport.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. A
//! `Transaction` assembles an `HttpRequest`, hands it to a `Transport` (or to
//! an option that answers it locally), and receives an `HttpResponse` back.
//! Keeping them free of any client library lets options build synthetic
//! responses and lets tests run without a network.

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::content_type::CONTENT_TYPE;
use crate::error::Error;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// GET requests never carry an encoded body.
    pub fn carries_body(self) -> bool {
        self != HttpMethod::Get
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(Error::Validation {
                location: "remote::HttpMethod::from_str",
                message: format!("unsupported HTTP method {other:?}"),
            }),
        }
    }
}

/// An HTTP request described as plain data.
///
/// `url` already includes the encoded query string. `body` is `None` for
/// methods that carry no body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// First header value with a case-insensitive name match.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Replace every header called `name` with a single value.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }
}

/// Body of an `HttpResponse`.
///
/// Transports may hand back a reader; `HttpResponse::body_bytes` drains it
/// once and keeps the bytes so the body can be read any number of times.
pub enum ResponseBody {
    Buffered(Vec<u8>),
    Stream(Box<dyn Read + Send>),
}

impl Default for ResponseBody {
    fn default() -> Self {
        ResponseBody::Buffered(Vec::new())
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = ResponseBody::Buffered(body.into());
        self
    }

    pub fn with_reader(mut self, reader: impl Read + Send + 'static) -> Self {
        self.body = ResponseBody::Stream(Box::new(reader));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> &str {
        self.header(CONTENT_TYPE).unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Canonical status line text, e.g. `404 Not Found`.
    pub fn status_text(&self) -> String {
        let reason = ureq::http::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|code| code.canonical_reason());
        match reason {
            Some(reason) => format!("{} {reason}", self.status),
            None => self.status.to_string(),
        }
    }

    /// Drain a streaming body into memory, then return the buffered bytes.
    pub fn body_bytes(&mut self) -> io::Result<&[u8]> {
        if let ResponseBody::Stream(reader) = &mut self.body {
            let mut buffer = Vec::new();
            reader.read_to_end(&mut buffer)?;
            self.body = ResponseBody::Buffered(buffer);
        }
        match &self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes.as_slice()),
            ResponseBody::Stream(_) => Ok(&[][..]),
        }
    }

    /// The body if it has already been buffered.
    pub fn buffered_body(&self) -> Option<&[u8]> {
        match &self.body {
            ResponseBody::Buffered(bytes) => Some(bytes.as_slice()),
            ResponseBody::Stream(_) => None,
        }
    }
}

fn find_header<'h>(headers: &'h [(String, String)], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parses_from_wire_names() {
        assert_eq!("PATCH".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!(matches!("TRACE".parse::<HttpMethod>(), Err(Error::Validation { .. })));
    }

    #[test]
    fn only_get_skips_the_body() {
        assert!(!HttpMethod::Get.carries_body());
        assert!(HttpMethod::Delete.carries_body());
    }

    #[test]
    fn set_header_replaces_other_casings() {
        let mut req = HttpRequest {
            method: HttpMethod::Get,
            url: "http://example.com".to_string(),
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: None,
        };
        req.set_header("Content-Type", "application/json");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn stream_body_is_buffered_once() {
        let mut response = HttpResponse::new(200).with_reader(io::Cursor::new(b"hello".to_vec()));
        assert!(response.buffered_body().is_none());
        assert_eq!(response.body_bytes().unwrap(), b"hello");
        assert_eq!(response.body_bytes().unwrap(), b"hello");
        assert_eq!(response.buffered_body(), Some(&b"hello"[..]));
    }

    #[test]
    fn status_text_uses_canonical_reason() {
        assert_eq!(HttpResponse::new(404).status_text(), "404 Not Found");
        assert_eq!(HttpResponse::new(599).status_text(), "599");
    }

    #[test]
    fn success_range_is_inclusive() {
        assert!(HttpResponse::new(200).is_success());
        assert!(HttpResponse::new(299).is_success());
        assert!(!HttpResponse::new(300).is_success());
        assert!(!HttpResponse::new(199).is_success());
    }
}
