use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::model::changeset::{ChangeSetDiff, Snapshot};

/// Lifecycle state of a repository context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepoState {
    Empty,
    Scanning,
    Ready,
    Error,
}

/// What changed in a model update
#[derive(Debug, Clone)]
pub enum Change {
    /// First generation after a repository was opened
    Full(Arc<Snapshot>),
    /// Difference from the previous generation
    Diff(ChangeSetDiff),
}

/// Payload sent to the UI after a new generation is installed
#[derive(Debug, Clone)]
pub struct Notification {
    pub state: RepoState,
    pub generation: u64,
    pub change: Change,
}

#[derive(Debug, Clone)]
pub enum Event {
    /// `open` switched to a new repository, or `close` cleared it
    RepositoryChanged(Option<PathBuf>),
    StateChanged {
        state: RepoState,
        /// The visible snapshot is last-known-good data, not current
        stale: bool,
        error: Option<Arc<CoreError>>,
    },
    ModelUpdated(Notification),
}

/// Fan-out list of event channels; closed receivers are pruned on publish
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Vec<mpsc::UnboundedSender<Event>>,
}

impl Subscribers {
    pub(crate) fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.push(tx);
        rx
    }

    pub(crate) fn publish(&mut self, event: Event) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }
}
