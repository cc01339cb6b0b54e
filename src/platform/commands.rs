//! Outbound command sink
//!
//! Commands are fire-and-forget: their effect only becomes visible through
//! later upstream events.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::sim::Identity;

/// Actions the engine asks the external authority to perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundCommand {
    /// Ask the authority to open a session for this song
    RequestSessionStart { identity: Identity, song_id: u64 },
    /// Player pressed hit while this note was the expected one
    AttemptNoteHit { identity: Identity, note_index: usize },
}

pub trait CommandSink {
    fn send(&mut self, command: OutboundCommand);
}

impl<F: FnMut(OutboundCommand)> CommandSink for F {
    fn send(&mut self, command: OutboundCommand) {
        self(command)
    }
}

/// Keeps every command it receives; clones share the log
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    sent: Rc<RefCell<Vec<OutboundCommand>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundCommand> {
        self.sent.borrow().clone()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<OutboundCommand> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }
}

impl CommandSink for RecordingSink {
    fn send(&mut self, command: OutboundCommand) {
        log::debug!("Outbound command: {:?}", command);
        self.sent.borrow_mut().push(command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_json_shape() {
        let cmd = OutboundCommand::AttemptNoteHit {
            identity: Identity::new("0xABC"),
            note_index: 3,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"attempt_note_hit","identity":"0xabc","note_index":3}"#
        );
    }

    #[test]
    fn test_recording_sink_take() {
        let mut sink = RecordingSink::new();
        let view = sink.clone();
        sink.send(OutboundCommand::RequestSessionStart {
            identity: Identity::new("0x1"),
            song_id: 0,
        });
        assert_eq!(view.sent().len(), 1);
        assert_eq!(view.take().len(), 1);
        assert!(view.sent().is_empty());
    }
}
