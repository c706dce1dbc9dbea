//! Fluent, synchronous HTTP client for talking to remote APIs.
//!
//! # Overview
//! A `Transaction` describes one request: method, URL, headers, query and
//! form values, a body, and where the response body should go. `send`
//! assembles the request, runs it through the attached options, dispatches
//! it and decodes the response according to its Content-Type.
//!
//! ```no_run
//! use std::collections::HashMap;
//!
//! let mut user: HashMap<String, serde_json::Value> = HashMap::new();
//! remote_core::get("https://jsonplaceholder.typicode.com/users/1")
//!     .accept(&["application/json"])
//!     .result(&mut user)
//!     .send()?;
//! # Ok::<(), remote_core::Error>(())
//! ```
//!
//! # Design
//! - The network sits behind the `Transport` trait; `UreqTransport` is the
//!   default. Options can answer a request locally, which is how tests and
//!   `options::test_server` avoid the network.
//! - Transactions are plain data until `send`. They can be flattened into a
//!   `TransactionMap` and handed to a `Queue`; `consumer` rebuilds and sends
//!   them on the worker side.
//! - Every failure is a `crate::Error` carrying the operation name and, when
//!   a transaction was live, an `ErrorReport`.

pub mod bearcap;
pub mod codec;
pub mod content_type;
pub mod error;
pub mod http;
pub mod marshal;
pub mod option;
pub mod options;
pub mod queue;
pub mod transaction;
pub mod transport;

pub use codec::{Body, Target, Values};
pub use error::{BoxError, Error, ErrorReport};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use marshal::{Payload, TransactionMap};
pub use option::RequestOption;
pub use queue::{consumer, JobResult, Queue, TRANSACTION_JOB};
pub use transaction::Transaction;
pub use transport::{default_client, ClientConfig, Transport, UreqTransport};

/// An empty transaction.
pub fn new<'a>() -> Transaction<'a> {
    Transaction::new()
}

pub fn get<'a>(url: impl Into<String>) -> Transaction<'a> {
    with_method(HttpMethod::Get, url)
}

pub fn post<'a>(url: impl Into<String>) -> Transaction<'a> {
    with_method(HttpMethod::Post, url)
}

pub fn put<'a>(url: impl Into<String>) -> Transaction<'a> {
    with_method(HttpMethod::Put, url)
}

pub fn patch<'a>(url: impl Into<String>) -> Transaction<'a> {
    with_method(HttpMethod::Patch, url)
}

pub fn delete<'a>(url: impl Into<String>) -> Transaction<'a> {
    with_method(HttpMethod::Delete, url)
}

fn with_method<'a>(method: HttpMethod, url: impl Into<String>) -> Transaction<'a> {
    let mut transaction = Transaction::new();
    transaction.method(method).url(url);
    transaction
}
