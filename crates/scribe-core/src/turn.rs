//! Per-turn message numbering.

use tracing::debug;

use crate::error::ScribeError;
use crate::ports::ChatListener;
use crate::types::{ChatMessage, MessageStatus};

/// Numbers and delivers the messages of one turn.
///
/// Indices start at zero and grow by one per message.  Once a FINAL message
/// went out, anything else is dropped, so a listener always sees FINAL last.
pub struct TurnEmitter<'a> {
    listener: &'a dyn ChatListener,
    next_index: u32,
    finished: bool,
}

impl<'a> TurnEmitter<'a> {
    pub fn new(listener: &'a dyn ChatListener) -> Self {
        Self {
            listener,
            next_index: 0,
            finished: false,
        }
    }

    /// Deliver one message.
    pub fn emit(&mut self, content: impl Into<String>, status: MessageStatus) {
        if self.finished {
            debug!(index = self.next_index, "dropping message emitted after FINAL");
            return;
        }
        let message = ChatMessage::assistant(content, self.next_index, status);
        self.next_index += 1;
        self.finished = message.is_final();
        self.listener.on_message(message);
    }

    /// Close the turn with an empty FINAL unless it is already closed.
    pub fn finish(&mut self) {
        if !self.finished {
            self.emit(String::new(), MessageStatus::Final);
        }
    }

    /// Close the turn with the error text as FINAL content.
    pub fn fail(&mut self, err: &ScribeError) {
        if !self.finished {
            self.emit(err.to_string(), MessageStatus::Final);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of messages delivered so far.
    pub fn emitted(&self) -> u32 {
        self.next_index
    }
}
