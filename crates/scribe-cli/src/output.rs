//! Terminal output: a listener that prints the answer as it streams, and a
//! document sink that appends to a file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use scribe_core::{ChatListener, ChatMessage, DocumentSink, MessageStatus, WriteOptions};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Prints every message of a turn to `W`.
///
/// A FINAL message is printed only when it adds something: the simulator
/// closes with the full text it already streamed word by word.
pub struct PrintingListener<W: Write + Send> {
    out: Mutex<W>,
    printed: Mutex<String>,
}

impl PrintingListener<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> PrintingListener<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            printed: Mutex::new(String::new()),
        }
    }

    fn print(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
            warn!(error = %e, "failed to write to terminal");
        }
    }
}

impl<W: Write + Send> ChatListener for PrintingListener<W> {
    fn on_start(&self) {
        self.printed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn on_message(&self, message: ChatMessage) {
        debug!(index = message.index, status = ?message.status, "message");
        let mut printed = self.printed.lock().unwrap_or_else(PoisonError::into_inner);
        if message.status == MessageStatus::Final && *printed == message.content {
            return;
        }
        self.print(&message.content);
        printed.push_str(&message.content);
    }

    fn on_stop(&self) {
        self.print("\n");
    }
}

// ---------------------------------------------------------------------------
// Document sink
// ---------------------------------------------------------------------------

/// Appends everything the agent types to a document file.
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl DocumentSink for FileSink {
    fn write(&self, text: &str, _options: &WriteOptions) -> bool {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        match file.write_all(text.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "document write failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str, index: u32, status: MessageStatus) -> ChatMessage {
        ChatMessage::assistant(content, index, status)
    }

    fn printed(listener: &PrintingListener<Vec<u8>>) -> String {
        String::from_utf8(listener.out.lock().unwrap().clone()).unwrap()
    }

    #[test]
    fn repeated_final_is_not_printed_twice() {
        let listener = PrintingListener::new(Vec::new());
        listener.on_start();
        listener.on_message(message("hello ", 0, MessageStatus::Start));
        listener.on_message(message("there", 1, MessageStatus::Continue));
        listener.on_message(message("hello there", 2, MessageStatus::Final));
        listener.on_stop();

        assert_eq!(printed(&listener), "hello there\n");
    }

    #[test]
    fn final_with_new_content_is_printed() {
        let listener = PrintingListener::new(Vec::new());
        listener.on_start();
        listener.on_message(message("partial", 0, MessageStatus::Continue));
        listener.on_message(message("API returned 500: boom", 1, MessageStatus::Final));
        listener.on_stop();

        assert_eq!(printed(&listener), "partialAPI returned 500: boom\n");
    }

    #[test]
    fn file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        let sink = FileSink::open(&path).unwrap();

        assert!(sink.write("one ", &WriteOptions::default()));
        assert!(sink.write("two", &WriteOptions::default()));

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one two");
    }
}
