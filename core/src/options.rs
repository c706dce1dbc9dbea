//! Ready-made `RequestOption`s.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;
use tracing::{debug, warn};

use crate::content_type::AUTHORIZATION;
use crate::http::HttpResponse;
use crate::option::RequestOption;
use crate::transport::Transport;

/// Set the `Authorization` header to `value` on every request.
pub fn authorization(value: impl Into<String>) -> RequestOption {
    let value = value.into();
    RequestOption::new().before_request(move |txn| {
        txn.header(AUTHORIZATION, value.clone());
        Ok(())
    })
}

/// HTTP Basic authentication.
pub fn basic_auth(username: &str, password: &str) -> RequestOption {
    let credentials = STANDARD.encode(format!("{username}:{password}"));
    authorization(format!("Basic {credentials}"))
}

pub fn bearer_auth(token: &str) -> RequestOption {
    authorization(format!("Bearer {token}"))
}

/// Send through `client` instead of the default transport.
pub fn with_client(client: Arc<dyn Transport>) -> RequestOption {
    RequestOption::new().before_request(move |txn| {
        txn.client(Arc::clone(&client));
        Ok(())
    })
}

/// Dump every request and response at `debug` level.
pub fn debug() -> RequestOption {
    RequestOption::new()
        .modify_request(|_, request| {
            debug!(
                method = %request.method,
                url = %request.url,
                headers = ?request.headers,
                body = %String::from_utf8_lossy(request.body.as_deref().unwrap_or_default()),
                "HTTP request"
            );
            None
        })
        .after_request(|_, response| {
            let body = match response.buffered_body() {
                Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                None => "<streaming>".to_string(),
            };
            debug!(
                status = %response.status_text(),
                headers = ?response.headers,
                body = %body,
                "HTTP response"
            );
            Ok(())
        })
}

/// Answer requests for `hostname` from raw HTTP response files under `dir`.
///
/// A request for `http://<hostname>/users/1` reads `<dir>/users/1`, which
/// holds a status line, headers, a blank line and the body. Missing or
/// malformed fixtures produce a 404 whose body is the error text. Requests
/// for other hosts go to the network as usual.
pub fn test_server(hostname: impl Into<String>, dir: impl Into<PathBuf>) -> RequestOption {
    let hostname = hostname.into();
    let dir = dir.into();
    RequestOption::new().modify_request(move |_, request| {
        let url = url::Url::parse(&request.url).ok()?;
        if url.host_str() != Some(hostname.as_str()) {
            return None;
        }
        let response = load_fixture(&dir, url.path()).unwrap_or_else(|err| {
            warn!(url = %request.url, error = %err, "test server fixture unavailable");
            HttpResponse::new(404).with_body(err.to_string())
        });
        Some(response)
    })
}

#[derive(Debug, Error)]
enum FixtureError {
    #[error("unable to open fixture {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed fixture {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

#[derive(Debug, Error)]
enum ParseError {
    #[error("invalid response head: {0}")]
    Head(#[from] httparse::Error),

    #[error("{0}")]
    Framing(&'static str),
}

const MAX_FIXTURE_HEADERS: usize = 64;

fn load_fixture(dir: &Path, url_path: &str) -> Result<HttpResponse, FixtureError> {
    let path = dir.join(url_path.trim_start_matches('/'));
    let raw = fs::read(&path).map_err(|source| FixtureError::Open {
        path: path.clone(),
        source,
    })?;
    parse_response(&raw).map_err(|source| FixtureError::Malformed { path, source })
}

/// Parse a raw HTTP/1.x response, framing the body by `Transfer-Encoding:
/// chunked`, then `Content-Length`, then end of file.
fn parse_response(raw: &[u8]) -> Result<HttpResponse, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_FIXTURE_HEADERS];
    let mut parsed = httparse::Response::new(&mut headers);
    let head_len = match parsed.parse(raw)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Err(ParseError::Framing("incomplete response head")),
    };
    let status = parsed.code.ok_or(ParseError::Framing("missing status code"))?;

    let mut response = HttpResponse::new(status);
    for header in parsed.headers.iter() {
        response = response.with_header(header.name, String::from_utf8_lossy(header.value));
    }

    let rest = &raw[head_len..];
    let chunked = response
        .header("Transfer-Encoding")
        .and_then(|codings| codings.rsplit(',').next())
        .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"));
    let body = if chunked {
        decode_chunked(rest)?
    } else if let Some(length) = response.header("Content-Length") {
        let length: usize = length
            .trim()
            .parse()
            .map_err(|_| ParseError::Framing("invalid Content-Length"))?;
        rest.get(..length)
            .ok_or(ParseError::Framing("body shorter than Content-Length"))?
            .to_vec()
    } else {
        rest.to_vec()
    };
    Ok(response.with_body(body))
}

/// Join the chunks of a chunked body. Trailers after the last chunk are ignored.
fn decode_chunked(mut rest: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut body = Vec::new();
    loop {
        let (start, size) = match httparse::parse_chunk_size(rest) {
            Ok(httparse::Status::Complete(found)) => found,
            Ok(httparse::Status::Partial) => return Err(ParseError::Framing("truncated chunk size")),
            Err(_) => return Err(ParseError::Framing("invalid chunk size")),
        };
        if size == 0 {
            return Ok(body);
        }
        let end = usize::try_from(size)
            .ok()
            .and_then(|size| start.checked_add(size))
            .ok_or(ParseError::Framing("chunk too large"))?;
        let chunk = rest.get(start..end).ok_or(ParseError::Framing("truncated chunk"))?;
        body.extend_from_slice(chunk);
        rest = rest[end..]
            .strip_prefix(b"\r\n")
            .ok_or(ParseError::Framing("chunk not followed by CRLF"))?;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::{BoxError, Error};
    use crate::http::HttpRequest;

    struct Refuse;

    impl Transport for Refuse {
        fn send(&self, _: &HttpRequest) -> Result<HttpResponse, BoxError> {
            Err("refused".into())
        }
    }

    fn fixtures() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("users")).unwrap();
        fs::write(
            dir.path().join("users/1"),
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"name\":\"Leanne Graham\"}",
        )
        .unwrap();
        fs::write(dir.path().join("broken"), "not a response").unwrap();
        dir
    }

    #[test]
    fn authorization_options_set_the_header() {
        for (option, expected) in [
            (authorization("Token abc"), "Token abc"),
            (bearer_auth("abc"), "Bearer abc"),
            (basic_auth("Aladdin", "open sesame"), "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="),
        ] {
            let mut txn = crate::get("http://example.com");
            txn.with([option, RequestOption::new().modify_request(|_, _| Some(HttpResponse::new(204)))]);
            txn.send().unwrap();
            assert_eq!(txn.request().unwrap().header("Authorization"), Some(expected));
        }
    }

    #[test]
    fn with_client_replaces_the_transport() {
        let mut txn = crate::get("http://example.com");
        txn.with([with_client(Arc::new(Refuse))]);
        assert!(matches!(txn.send(), Err(Error::Transport { .. })));
    }

    #[test]
    fn debug_does_not_change_the_exchange() {
        let mut text = String::new();
        let mut txn = crate::post("http://example.com");
        txn.body("hello")
            .with([
                debug(),
                RequestOption::new().modify_request(|_, _| Some(HttpResponse::new(200).with_body("ok"))),
            ])
            .result_text(&mut text);
        txn.send().unwrap();
        drop(txn);
        assert_eq!(text, "ok");
    }

    #[test]
    fn test_server_serves_fixture_files() {
        let dir = fixtures();
        let mut user: HashMap<String, String> = HashMap::new();
        let mut txn = crate::get("https://jsonplaceholder.typicode.com/users/1");
        txn.with([test_server("jsonplaceholder.typicode.com", dir.path())])
            .client(Arc::new(Refuse))
            .result(&mut user);
        txn.send().unwrap();
        drop(txn);
        assert_eq!(user["name"], "Leanne Graham");
    }

    #[test]
    fn test_server_returns_404_for_missing_or_malformed_fixtures() {
        let dir = fixtures();
        for path in ["users/2", "broken"] {
            let mut failure = String::new();
            let mut txn = crate::get(format!("http://fixtures.test/{path}"));
            txn.with([test_server("fixtures.test", dir.path())]).error_text(&mut failure);
            let err = txn.send().unwrap_err();
            drop(txn);
            assert_eq!(err.code(), 404);
            assert!(failure.contains("fixture"), "{failure}");
        }
    }

    #[test]
    fn test_server_ignores_other_hosts() {
        let dir = fixtures();
        let mut txn = crate::get("http://elsewhere.test/users/1");
        txn.with([test_server("fixtures.test", dir.path())]).client(Arc::new(Refuse));
        assert!(matches!(txn.send(), Err(Error::Transport { .. })));
    }

    #[test]
    fn parses_lf_only_fixtures() {
        let response = parse_response(b"HTTP/1.0 201 Created\nLocation: /users/3\n\n").unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.header("location"), Some("/users/3"));
        assert_eq!(response.buffered_body(), Some(&b""[..]));
        assert!(matches!(parse_response(b"HTTP/1.1 abc\r\n\r\n"), Err(ParseError::Head(_))));
        assert!(matches!(parse_response(b"SPDY 200\r\n\r\n"), Err(ParseError::Head(_))));
        assert!(matches!(parse_response(b"HTTP/1.1 200 OK\r\nX-A: 1\r\n"), Err(ParseError::Framing(_))));
    }

    #[test]
    fn content_length_frames_the_body() {
        let response =
            parse_response(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello\r\ntrailing garbage").unwrap();
        assert_eq!(response.buffered_body(), Some(&b"hello"[..]));

        let err = parse_response(b"HTTP/1.1 200 OK\r\nContent-Length: 50\r\n\r\nhello").unwrap_err();
        assert_eq!(err.to_string(), "body shorter than Content-Length");
    }

    #[test]
    fn chunked_fixture_is_decoded() {
        let dir = fixtures();
        fs::write(
            dir.path().join("chunked"),
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\n\r\n\
             5\r\nhello\r\n7;ext=1\r\n, world\r\n0\r\nX-Trailer: done\r\n\r\n",
        )
        .unwrap();

        let mut text = String::new();
        let mut txn = crate::get("http://fixtures.test/chunked");
        txn.with([test_server("fixtures.test", dir.path())])
            .client(Arc::new(Refuse))
            .result_text(&mut text);
        txn.send().unwrap();
        drop(txn);
        assert_eq!(text, "hello, world");

        let err = parse_response(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhel").unwrap_err();
        assert_eq!(err.to_string(), "truncated chunk");
    }
}
