//! Hand-off of transactions to an asynchronous task queue.
//!
//! A transaction with a queue attached publishes its map form under
//! `TRANSACTION_JOB` instead of calling the network. A worker on the other
//! side of the queue runs the function returned by `consumer`, which rebuilds
//! the transaction and sends it for real.

use tracing::debug;

use crate::error::{BoxError, Error};
use crate::marshal::Payload;
use crate::option::RequestOption;
use crate::transaction::Transaction;

/// Job name under which transactions are published.
pub const TRANSACTION_JOB: &str = "remote.Transaction.Send";

/// Accepts jobs for later processing. Success means "accepted", not
/// "delivered".
pub trait Queue: Send + Sync {
    fn publish(&self, name: &str, payload: Payload) -> Result<(), BoxError>;
}

/// Outcome reported back to the queue runtime for one job.
#[derive(Debug)]
pub enum JobResult {
    Success,
    /// The payload cannot be processed; retrying will not help.
    Failure(Error),
    /// Sending failed; the job may be retried.
    Error(Error),
    /// The job belongs to someone else.
    Ignored,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success)
    }
}

/// Build a job handler that sends queued transactions with `options`
/// attached. Jobs with any other name are ignored.
pub fn consumer(options: Vec<RequestOption>) -> impl Fn(&str, &Payload) -> JobResult + Send + Sync {
    const LOCATION: &str = "remote::consumer";

    move |name: &str, payload: &Payload| {
        if name != TRANSACTION_JOB {
            debug!(job = name, "ignoring job");
            return JobResult::Ignored;
        }

        let mut transaction = Transaction::new();
        transaction.with(options.iter().cloned());

        if let Err(err) = transaction.unmarshal_map(payload) {
            return JobResult::Failure(err);
        }

        match transaction.send() {
            Ok(()) => JobResult::Success,
            Err(err) => {
                debug!(location = LOCATION, error = %err, "queued transaction failed");
                JobResult::Error(err)
            }
        }
    }
}
