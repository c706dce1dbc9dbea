//! Extension hooks that run at fixed points of `Transaction::send`.
//!
//! # Design
//! A `RequestOption` is three optional callbacks, nothing more. Options are
//! cheap to clone (the callbacks are behind `Arc`) so one configured set can
//! be attached to many transactions, e.g. by the queue consumer.

use std::fmt;
use std::sync::Arc;

use crate::error::{BoxError, Error, OptionPhase};
use crate::http::{HttpRequest, HttpResponse};
use crate::transaction::Transaction;

type BeforeRequestFn = dyn Fn(&mut Transaction<'_>) -> Result<(), BoxError> + Send + Sync;
type ModifyRequestFn = dyn Fn(&Transaction<'_>, &mut HttpRequest) -> Option<HttpResponse> + Send + Sync;
type AfterRequestFn = dyn Fn(&Transaction<'_>, &HttpResponse) -> Result<(), BoxError> + Send + Sync;

/// Hooks attached to a transaction with `Transaction::with`.
#[derive(Clone, Default)]
pub struct RequestOption {
    before_request: Option<Arc<BeforeRequestFn>>,
    modify_request: Option<Arc<ModifyRequestFn>>,
    after_request: Option<Arc<AfterRequestFn>>,
}

impl RequestOption {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs before the HTTP request is assembled; may change any
    /// transaction field.
    pub fn before_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Transaction<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.before_request = Some(Arc::new(hook));
        self
    }

    /// Runs on the assembled request. Returning a response answers the
    /// request locally and skips the network.
    pub fn modify_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Transaction<'_>, &mut HttpRequest) -> Option<HttpResponse> + Send + Sync + 'static,
    {
        self.modify_request = Some(Arc::new(hook));
        self
    }

    /// Runs on the response before it is decoded.
    pub fn after_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Transaction<'_>, &HttpResponse) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.after_request = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for RequestOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOption")
            .field("before_request", &self.before_request.is_some())
            .field("modify_request", &self.modify_request.is_some())
            .field("after_request", &self.after_request.is_some())
            .finish()
    }
}

const LOCATION: &str = "remote::Transaction::send";

impl Transaction<'_> {
    /// First hook error aborts the pipeline.
    pub(crate) fn on_before_request(&mut self) -> Result<(), Error> {
        // Hooks may attach further options; only the ones present now run.
        let options = self.options().to_vec();
        for hook in options.iter().filter_map(|o| o.before_request.as_ref()) {
            hook(&mut *self).map_err(|source| Error::OptionFailed {
                location: LOCATION,
                phase: OptionPhase::BeforeRequest,
                source,
                report: None,
            })?;
        }
        Ok(())
    }

    /// First hook to return a response wins; later hooks do not run.
    pub(crate) fn on_modify_request(&self, request: &mut HttpRequest) -> Option<HttpResponse> {
        self.options()
            .iter()
            .filter_map(|o| o.modify_request.as_ref())
            .find_map(|hook| hook(self, &mut *request))
    }

    pub(crate) fn on_after_request(&self, response: &HttpResponse) -> Result<(), Error> {
        for hook in self.options().iter().filter_map(|o| o.after_request.as_ref()) {
            hook(self, response).map_err(|source| Error::OptionFailed {
                location: LOCATION,
                phase: OptionPhase::AfterRequest,
                source,
                report: Some(Box::new(self.error_report())),
            })?;
        }
        Ok(())
    }
}
