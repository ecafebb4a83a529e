//! State of one agent turn.

use tracing::{debug, trace};

use crate::error::ScribeError;
use crate::ports::{ChatListener, DocumentSink, WriteOptions};
use crate::turn::TurnEmitter;
use crate::types::{MessageStatus, ToolInvocation};

use super::scanner::ToolTagScanner;

/// Output held back while a network attempt may still be discarded.
enum Staged {
    Sink(String),
    Message(String, MessageStatus),
}

/// Rollback point and held output of one network attempt.
struct Attempt {
    buffer_len: usize,
    scanner: ToolTagScanner,
    output: Vec<Staged>,
}

/// Message numbering, the full-text buffer, the document sink, and the tag
/// scanner for one `chat` call.  Dropped when the turn ends.
///
/// Between [`begin_attempt`](Self::begin_attempt) and either
/// [`commit_attempt`](Self::commit_attempt) or
/// [`discard_attempt`](Self::discard_attempt), listener and sink output is
/// held back so a failed attempt leaves no trace.
pub struct TurnSession<'a> {
    turn: TurnEmitter<'a>,
    sink: &'a dyn DocumentSink,
    options: WriteOptions,
    buffer: String,
    scanner: ToolTagScanner,
    attempt: Option<Attempt>,
}

impl<'a> TurnSession<'a> {
    pub fn new(listener: &'a dyn ChatListener, sink: &'a dyn DocumentSink) -> Self {
        Self {
            turn: TurnEmitter::new(listener),
            sink,
            options: WriteOptions::default(),
            buffer: String::new(),
            scanner: ToolTagScanner::new(),
            attempt: None,
        }
    }

    /// Start holding output back.
    pub fn begin_attempt(&mut self) {
        self.attempt = Some(Attempt {
            buffer_len: self.buffer.len(),
            scanner: self.scanner.clone(),
            output: Vec::new(),
        });
    }

    /// Release the held output, in order.
    pub fn commit_attempt(&mut self) {
        let Some(attempt) = self.attempt.take() else {
            return;
        };
        trace!(held = attempt.output.len(), "releasing attempt output");
        for staged in attempt.output {
            match staged {
                Staged::Sink(text) => self.write_sink(&text),
                Staged::Message(content, status) => self.turn.emit(content, status),
            }
        }
    }

    /// Drop the held output and rewind the buffer and the tag scanner.
    pub fn discard_attempt(&mut self) {
        let Some(attempt) = self.attempt.take() else {
            return;
        };
        debug!(
            dropped = attempt.output.len(),
            text_len = self.buffer.len() - attempt.buffer_len,
            "discarding attempt output"
        );
        self.buffer.truncate(attempt.buffer_len);
        self.scanner = attempt.scanner;
    }

    /// Take in generated text: buffer it, write it to the document, and
    /// return the tool tags it completed.
    pub fn absorb(&mut self, text: &str) -> Vec<ToolInvocation> {
        if text.is_empty() {
            return Vec::new();
        }
        self.buffer.push_str(text);
        self.stage_sink(text);
        self.scanner.feed(text)
    }

    /// Deliver a message to the listener only.
    pub fn emit(&mut self, content: impl Into<String>, status: MessageStatus) {
        let content = content.into();
        match &mut self.attempt {
            Some(attempt) => attempt.output.push(Staged::Message(content, status)),
            None => self.turn.emit(content, status),
        }
    }

    /// Tool or simulator narration: shown live and delivered as CONTINUE,
    /// but not part of the remembered turn text.
    pub fn say(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.stage_sink(&text);
        self.emit(text, MessageStatus::Continue);
    }

    /// Close the turn with `content` as FINAL.  Held output is released
    /// first.
    pub fn finish(&mut self, content: impl Into<String>) {
        self.commit_attempt();
        if !self.turn.is_finished() {
            self.turn.emit(content, MessageStatus::Final);
        }
    }

    /// Close the turn with an error message.  Held output is released
    /// first.
    pub fn fail(&mut self, err: &ScribeError) {
        self.commit_attempt();
        self.turn.fail(err);
    }

    /// Everything absorbed so far.
    pub fn content(&self) -> &str {
        &self.buffer
    }

    /// Messages delivered to the listener so far.
    pub fn emitted(&self) -> u32 {
        self.turn.emitted()
    }

    fn stage_sink(&mut self, text: &str) {
        match &mut self.attempt {
            Some(attempt) => attempt.output.push(Staged::Sink(text.to_owned())),
            None => self.write_sink(text),
        }
    }

    fn write_sink(&self, text: &str) {
        let ok = self.sink.write(text, &self.options);
        trace!(ok, len = text.len(), "document sink write");
    }
}
