//! A single HTTP request/response exchange with a remote server.
//!
//! # Design
//! `Transaction` is configured through chained `&mut self` setters, then
//! `send` walks a fixed sequence:
//!
//! 1. `before_request` hooks
//! 2. bearer capability rewrite (`bear:?u=..&t=..`)
//! 3. request assembly (body encoding, query string, headers)
//! 4. `modify_request` hooks, which may answer the request locally;
//!    otherwise the transaction is published to its queue (and `send`
//!    returns) or dispatched through its transport
//! 5. `after_request` hooks
//! 6. response buffering
//! 7. decoding into the success target (2xx) or the failure target
//!
//! Nothing is shared: a transaction belongs to the code that built it and
//! is meant to be sent once. Sending again overwrites `request` and
//! `response`.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::bearcap;
use crate::codec::{decode_body, encode_body, encode_buffered, encode_values, Body, Target, Values};
use crate::content_type::{self, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use crate::error::{Error, ErrorReport, RequestReport, ResponseReport};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::option::RequestOption;
use crate::queue::{Queue, TRANSACTION_JOB};
use crate::transport::{default_client, Transport};

const LOCATION: &str = "remote::Transaction::send";

/// One configured HTTP request and, once sent, its response.
///
/// `'a` is the lifetime of the success and failure targets borrowed from
/// the caller.
#[derive(Default)]
pub struct Transaction<'a> {
    client: Option<Arc<dyn Transport>>,
    queue: Option<Arc<dyn Queue>>,
    method: Option<HttpMethod>,
    url: String,
    header: BTreeMap<String, String>,
    query: Values,
    form: Values,
    body: Body,
    success: Option<Target<'a>>,
    failure: Option<Target<'a>>,
    options: Vec<RequestOption>,
    request: Option<HttpRequest>,
    response: Option<HttpResponse>,
}

impl<'a> Transaction<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(&mut self, method: HttpMethod) -> &mut Self {
        self.method = Some(method);
        self
    }

    pub fn url(&mut self, url: impl Into<String>) -> &mut Self {
        self.url = url.into();
        self
    }

    pub fn get(&mut self, url: impl Into<String>) -> &mut Self {
        self.method(HttpMethod::Get).url(url)
    }

    pub fn post(&mut self, url: impl Into<String>) -> &mut Self {
        self.method(HttpMethod::Post).url(url)
    }

    pub fn put(&mut self, url: impl Into<String>) -> &mut Self {
        self.method(HttpMethod::Put).url(url)
    }

    pub fn patch(&mut self, url: impl Into<String>) -> &mut Self {
        self.method(HttpMethod::Patch).url(url)
    }

    pub fn delete(&mut self, url: impl Into<String>) -> &mut Self {
        self.method(HttpMethod::Delete).url(url)
    }

    /// Use `client` instead of the shared default transport.
    pub fn client(&mut self, client: Arc<dyn Transport>) -> &mut Self {
        self.client = Some(client);
        self
    }

    /// Publish to `queue` on `send` instead of calling the network.
    pub fn queue(&mut self, queue: Arc<dyn Queue>) -> &mut Self {
        self.queue = Some(queue);
        self
    }

    /// Set a request header. The last write wins, whatever the letter case
    /// of the earlier name.
    pub fn header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.header.retain(|k, _| !k.eq_ignore_ascii_case(name));
        self.header.insert(name.to_string(), value.into());
        self
    }

    /// Set the `Accept` header. No types means `*/*`; several types are
    /// weighted `q=1.0, 0.9, ...` in the order given, never below `0.1`.
    pub fn accept(&mut self, content_types: &[&str]) -> &mut Self {
        let value = match content_types {
            [] => "*/*".to_string(),
            [single] => (*single).to_string(),
            many => many
                .iter()
                .enumerate()
                .map(|(i, content_type)| {
                    let tenths = 10usize.saturating_sub(i).max(1);
                    format!("{content_type};q={}.{}", tenths / 10, tenths % 10)
                })
                .collect::<Vec<_>>()
                .join(", "),
        };
        self.header(ACCEPT, value)
    }

    pub fn content_type(&mut self, value: impl Into<String>) -> &mut Self {
        self.header(CONTENT_TYPE, value)
    }

    /// Add a query string value; repeated names accumulate.
    pub fn query(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.query.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Add a form value; repeated names accumulate. Selects form encoding
    /// unless a Content-Type is already set.
    pub fn form(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.form.entry(name.into()).or_default().push(value.into());
        self.default_content_type(content_type::FORM)
    }

    /// Plain text body.
    pub fn body(&mut self, value: impl Into<String>) -> &mut Self {
        self.body = Body::Text(value.into());
        self.default_content_type(content_type::PLAIN)
    }

    /// Raw bytes, sent as-is.
    pub fn body_bytes(&mut self, value: impl Into<Vec<u8>>) -> &mut Self {
        self.body = Body::Bytes(value.into());
        self.default_content_type(content_type::PLAIN)
    }

    /// Streaming body, read to completion when the request is assembled.
    pub fn body_reader(&mut self, reader: impl Read + Send + 'static) -> &mut Self {
        self.body = Body::Reader(Box::new(reader));
        self.default_content_type(content_type::PLAIN)
    }

    pub fn json<T: Serialize + Send + 'static>(&mut self, value: T) -> &mut Self {
        self.body = Body::Structured(Box::new(value));
        self.default_content_type(content_type::JSON)
    }

    pub fn xml<T: Serialize + Send + 'static>(&mut self, value: T) -> &mut Self {
        self.body = Body::Structured(Box::new(value));
        self.default_content_type(content_type::XML)
    }

    fn default_content_type(&mut self, value: &str) -> &mut Self {
        if self.content_type_value().is_empty() {
            self.content_type(value);
        }
        self
    }

    /// Append options; they run in the order they were added.
    pub fn with(&mut self, options: impl IntoIterator<Item = RequestOption>) -> &mut Self {
        self.options.extend(options);
        self
    }

    /// Decode a 2xx response body into `target`.
    pub fn result<T: DeserializeOwned>(&mut self, target: &'a mut T) -> &mut Self {
        self.success = Some(Target::Structured(target));
        self
    }

    pub fn result_text(&mut self, target: &'a mut String) -> &mut Self {
        self.success = Some(Target::Text(target));
        self
    }

    pub fn result_bytes(&mut self, target: &'a mut Vec<u8>) -> &mut Self {
        self.success = Some(Target::Bytes(target));
        self
    }

    /// Copy a 2xx response body into a writer the caller owns.
    pub fn result_writer(&mut self, target: &'a mut dyn Write) -> &mut Self {
        self.success = Some(Target::Writer(target));
        self
    }

    pub fn result_target(&mut self, target: Target<'a>) -> &mut Self {
        self.success = Some(target);
        self
    }

    /// Decode a non-2xx response body into `target`.
    pub fn error<T: DeserializeOwned>(&mut self, target: &'a mut T) -> &mut Self {
        self.failure = Some(Target::Structured(target));
        self
    }

    pub fn error_text(&mut self, target: &'a mut String) -> &mut Self {
        self.failure = Some(Target::Text(target));
        self
    }

    pub fn error_target(&mut self, target: Target<'a>) -> &mut Self {
        self.failure = Some(target);
        self
    }

    /// Execute the transaction.
    ///
    /// Returns `Ok` for a 2xx response whose body decoded into the success
    /// target, or as soon as a queue accepted the transaction.
    pub fn send(&mut self) -> Result<(), Error> {
        self.request = None;
        self.response = None;

        self.on_before_request()?;

        if bearcap::is_bearcap(&self.url) {
            let cap = bearcap::parse(&self.url)?;
            self.header(AUTHORIZATION, cap.authorization());
            self.url = cap.url;
        }

        let mut request = self.assemble_request()?;
        let substitute = self.on_modify_request(&mut request);

        let dispatched = match (substitute, self.queue.clone()) {
            (Some(response), _) => {
                debug!(url = %request.url, status = response.status, "request answered by option");
                Ok(response)
            }
            (None, Some(queue)) => {
                self.request = Some(request);
                return self.publish(queue.as_ref());
            }
            (None, None) => {
                debug!(method = %request.method, url = %request.url, "sending request");
                self.transport().send(&request)
            }
        };
        self.request = Some(request);

        let response = dispatched.map_err(|source| Error::Transport {
            location: LOCATION,
            source,
            report: Box::new(self.error_report()),
        })?;
        self.response = Some(response);

        if let Some(response) = &self.response {
            self.on_after_request(response)?;
        }

        let body = self.response_body()?.to_vec();
        let status = self.response_status_code();
        let content_type = self.response_content_type().to_string();

        if (200..=299).contains(&status) {
            return decode_body(&body, self.success.as_mut(), &content_type)
                .map_err(|err| err.into_error(LOCATION, self.error_report()));
        }

        let failure_decode = decode_body(&body, self.failure.as_mut(), &content_type)
            .err()
            .map(|err| {
                let err = err.into_error(LOCATION, self.error_report());
                warn!(status, error = %err, "unable to decode failure response");
                Box::new(err)
            });

        Err(Error::RemoteService {
            location: LOCATION,
            status,
            report: Box::new(self.error_report()),
            failure_decode,
        })
    }

    fn assemble_request(&mut self) -> Result<HttpRequest, Error> {
        let Some(method) = self.method else {
            return Err(self.request_error("no HTTP method".to_string()));
        };
        if self.url.is_empty() {
            return Err(self.request_error("no URL".to_string()));
        }

        let url = self.request_url();
        if let Err(err) = url::Url::parse(&url) {
            return Err(self.request_error(format!("invalid URL {url:?}: {err}")));
        }

        let body = if method.carries_body() {
            let content_type = self.content_type_value().to_string();
            let encoded = encode_body(&mut self.body, &content_type, &self.form)
                .map_err(|err| err.into_error(LOCATION, self.error_report()))?;
            Some(encoded)
        } else {
            None
        };

        Ok(HttpRequest {
            method,
            url,
            headers: self.header.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            body,
        })
    }

    fn request_error(&self, message: String) -> Error {
        Error::Request {
            location: LOCATION,
            message,
            report: Box::new(self.error_report()),
        }
    }

    fn publish(&mut self, queue: &dyn Queue) -> Result<(), Error> {
        let payload = self.marshal_map()?;
        queue
            .publish(TRANSACTION_JOB, payload)
            .map_err(|source| Error::QueuePublish {
                location: LOCATION,
                source,
            })?;
        debug!(url = %self.url, job = TRANSACTION_JOB, "transaction published to queue");
        Ok(())
    }

    fn transport(&self) -> Arc<dyn Transport> {
        self.client.clone().unwrap_or_else(default_client)
    }

    pub fn http_method(&self) -> Option<HttpMethod> {
        self.method
    }

    /// The URL as configured, without the query string.
    pub fn raw_url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.header
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.header
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Request Content-Type, empty when unset.
    pub fn content_type_value(&self) -> &str {
        self.header_value(CONTENT_TYPE).unwrap_or_default()
    }

    pub fn query_values(&self) -> &Values {
        &self.query
    }

    pub fn form_values(&self) -> &Values {
        &self.form
    }

    pub fn options(&self) -> &[RequestOption] {
        &self.options
    }

    /// The URL with the encoded query string appended.
    pub fn request_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{}", self.url, encode_values(&self.query))
    }

    /// The body as it would be sent with the current Content-Type.
    pub fn request_body(&mut self) -> Result<Vec<u8>, Error> {
        let content_type = self.content_type_value().to_string();
        encode_body(&mut self.body, &content_type, &self.form)
            .map_err(|err| err.into_error("remote::Transaction::request_body", self.error_report()))
    }

    /// The request assembled by the last `send`.
    pub fn request(&self) -> Option<&HttpRequest> {
        self.request.as_ref()
    }

    /// The response received by the last `send`.
    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    /// 0 until a response exists.
    pub fn response_status_code(&self) -> u16 {
        self.response.as_ref().map_or(0, |r| r.status)
    }

    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response.as_ref().and_then(|r| r.header(name))
    }

    pub fn response_content_type(&self) -> &str {
        self.response.as_ref().map_or("", HttpResponse::content_type)
    }

    /// The response body, buffered on first access so it can be read
    /// repeatedly.
    pub fn response_body(&mut self) -> Result<&[u8], Error> {
        let status = self.response_status_code();
        let buffered = match self.response.as_mut() {
            Some(response) => response.body_bytes().map(|_| ()),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "transaction has no response")),
        };
        if let Err(source) = buffered {
            return Err(Error::ResponseRead {
                location: LOCATION,
                status,
                source,
                report: Box::new(self.error_report()),
            });
        }
        Ok(self
            .response
            .as_ref()
            .and_then(HttpResponse::buffered_body)
            .unwrap_or_default())
    }

    /// Snapshot of the request and response for diagnostics.
    pub fn error_report(&self) -> ErrorReport {
        let body = match self.request.as_ref().and_then(|r| r.body.as_deref()) {
            Some(sent) => sent.to_vec(),
            None => encode_buffered(&self.body, self.content_type_value(), &self.form).unwrap_or_default(),
        };

        let response = match &self.response {
            Some(response) => ResponseReport {
                status_code: response.status,
                status: response.status_text(),
                header: response.headers.clone(),
                body: response
                    .buffered_body()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default(),
            },
            None => ResponseReport::default(),
        };

        ErrorReport {
            url: self.request_url(),
            request: RequestReport {
                method: self.method.map(|m| m.to_string()).unwrap_or_default(),
                header: self.header.clone(),
                body: String::from_utf8_lossy(&body).into_owned(),
            },
            response,
        }
    }

    pub(crate) fn body_and_form_mut(&mut self) -> (&mut Body, &Values) {
        (&mut self.body, &self.form)
    }

    pub(crate) fn replace_request_fields(
        &mut self,
        method: Option<HttpMethod>,
        url: String,
        header: BTreeMap<String, String>,
        query: Values,
        form: Values,
        body: Body,
    ) {
        self.method = method;
        self.url = url;
        self.header = header;
        self.query = query;
        self.form = form;
        self.body = body;
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("header", &self.header)
            .field("query", &self.query)
            .field("form", &self.form)
            .field("body", &self.body)
            .field("success", &self.success)
            .field("failure", &self.failure)
            .field("options", &self.options.len())
            .field("request", &self.request)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}
