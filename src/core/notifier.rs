//! Side channel for system notices.
//!
//! Notices travel on their own unbounded channel, separate from the bounded
//! request queue. The dispatch task is the only producer of notices and it
//! drains them before taking the next request, so the channel holds at most
//! the notices of the request in flight.

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{Envelope, SystemMessage};

/// Handle for emitting system notices to the dispatch task
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    notices: Option<mpsc::UnboundedSender<Envelope>>,
}

impl Notifier {
    pub fn new(notices: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            notices: Some(notices),
        }
    }

    /// A notifier that discards everything
    pub fn disabled() -> Self {
        Self { notices: None }
    }

    /// Hand a notice to the dispatch task; returns whether it was accepted
    pub fn notify(&self, message: SystemMessage) -> bool {
        let Some(notices) = &self.notices else {
            return false;
        };

        match notices.send(Envelope::System(message)) {
            Ok(()) => true,
            Err(_) => {
                debug!("Notice channel closed, notice discarded");
                false
            }
        }
    }
}
