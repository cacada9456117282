//! Response sinks for long-poll requests.
//!
//! The transport hands the dispatcher a boxed [`AsyncResponse`]. Every
//! method consumes the box, so a handle can be resumed at most once.

use tokio::sync::oneshot;

use crate::error::FetchError;
use crate::request::LockedTask;

/// Single-use sink the dispatcher resolves a request through.
pub trait AsyncResponse: Send {
    fn resume_with_tasks(self: Box<Self>, tasks: Vec<LockedTask>);

    fn resume_with_error(self: Box<Self>, error: FetchError);

    /// Forced early end without a result (superseded by a newer request).
    fn cancel(self: Box<Self>);
}

/// What a [`ChannelResponse`] delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Tasks(Vec<LockedTask>),
    Error(FetchError),
    Cancelled,
}

impl FetchOutcome {
    pub fn tasks(&self) -> Option<&[LockedTask]> {
        match self {
            Self::Tasks(tasks) => Some(tasks),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// Receiver half for awaiting a fetch outcome.
pub type OutcomeRx = oneshot::Receiver<FetchOutcome>;

/// [`AsyncResponse`] backed by a oneshot channel.
#[derive(Debug)]
pub struct ChannelResponse {
    tx: oneshot::Sender<FetchOutcome>,
}

impl ChannelResponse {
    pub fn new() -> (Self, OutcomeRx) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn boxed() -> (Box<dyn AsyncResponse>, OutcomeRx) {
        let (response, rx) = Self::new();
        (Box::new(response), rx)
    }

    fn deliver(self, outcome: FetchOutcome) {
        if self.tx.send(outcome).is_err() {
            tracing::debug!("response receiver dropped before resolution");
        }
    }
}

impl AsyncResponse for ChannelResponse {
    fn resume_with_tasks(self: Box<Self>, tasks: Vec<LockedTask>) {
        self.deliver(FetchOutcome::Tasks(tasks));
    }

    fn resume_with_error(self: Box<Self>, error: FetchError) {
        self.deliver(FetchOutcome::Error(error));
    }

    fn cancel(self: Box<Self>) {
        self.deliver(FetchOutcome::Cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_exactly_what_was_resumed() {
        let (response, mut rx) = ChannelResponse::boxed();
        response.resume_with_error(FetchError::Shutdown);
        let outcome = rx.try_recv().unwrap();
        assert_eq!(outcome.error(), Some(&FetchError::Shutdown));
        assert!(outcome.tasks().is_none());
    }

    #[test]
    fn cancel_delivers_cancelled() {
        let (response, mut rx) = ChannelResponse::boxed();
        response.cancel();
        assert_eq!(rx.try_recv().unwrap(), FetchOutcome::Cancelled);
    }

    #[test]
    fn dropped_receiver_is_tolerated() {
        let (response, rx) = ChannelResponse::boxed();
        drop(rx);
        response.resume_with_tasks(Vec::new());
    }
}
