//! Incremental scanner for inline tool tags.
//!
//! Recognises `[tool:NAME]ARGUMENT[/tool]` in text that arrives in arbitrary
//! fragments.  Only the partial-match state is kept between calls, so a tag
//! split across chunk boundaries is still found, text outside tags is not
//! buffered, and each tag is reported exactly once.  The first `[/tool]`
//! closes a tag.

use tracing::warn;

use crate::types::ToolInvocation;

const OPEN: &[u8] = b"[tool:";
const CLOSE: &[u8] = b"[/tool]";

/// Longest accepted tool name.
const MAX_NAME_LEN: usize = 32;

/// Longest accepted argument; longer tags are abandoned.
pub const MAX_ARGUMENT_LEN: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// Plain text; `matched` bytes of `[tool:` seen so far.
    Text { matched: usize },
    /// Inside the tag name, waiting for `]`.
    Name { name: String },
    /// Inside the argument; `matched` bytes of `[/tool]` seen so far.
    Argument {
        name: String,
        argument: String,
        matched: usize,
    },
}

/// Streaming tag recogniser.  Feed it every content fragment in order.
#[derive(Debug, Clone)]
pub struct ToolTagScanner {
    state: State,
}

impl Default for ToolTagScanner {
    fn default() -> Self {
        Self {
            state: State::Text { matched: 0 },
        }
    }
}

impl ToolTagScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume `fragment` and return the tags it completed.
    pub fn feed(&mut self, fragment: &str) -> Vec<ToolInvocation> {
        let mut found = Vec::new();
        for c in fragment.chars() {
            if let Some(invocation) = self.step(c) {
                found.push(invocation);
            }
        }
        found
    }

    /// Scan a complete text in one go.
    pub fn scan_all(text: &str) -> Vec<ToolInvocation> {
        Self::new().feed(text)
    }

    /// Whether the scanner is in the middle of a possible tag.
    pub fn is_pending(&self) -> bool {
        !matches!(self.state, State::Text { matched: 0 })
    }

    fn step(&mut self, c: char) -> Option<ToolInvocation> {
        let state = std::mem::replace(&mut self.state, State::Text { matched: 0 });
        let (next, emitted) = match state {
            State::Text { matched } => (advance_text(matched, c), None),

            State::Name { mut name } => {
                if c == ']' && !name.is_empty() {
                    (
                        State::Argument {
                            name,
                            argument: String::new(),
                            matched: 0,
                        },
                        None,
                    )
                } else if is_name_char(c) && name.len() < MAX_NAME_LEN {
                    name.push(c);
                    (State::Name { name }, None)
                } else {
                    (advance_text(0, c), None)
                }
            }

            State::Argument {
                name,
                mut argument,
                matched,
            } => {
                if c == char::from(CLOSE[matched]) {
                    if matched + 1 == CLOSE.len() {
                        let invocation = ToolInvocation::new(name, argument.trim());
                        (State::Text { matched: 0 }, Some(invocation))
                    } else {
                        (
                            State::Argument {
                                name,
                                argument,
                                matched: matched + 1,
                            },
                            None,
                        )
                    }
                } else {
                    // The partial close tag was argument text after all.
                    argument.extend(CLOSE[..matched].iter().map(|b| char::from(*b)));
                    let matched = if c == '[' {
                        1
                    } else {
                        argument.push(c);
                        0
                    };
                    if argument.len() > MAX_ARGUMENT_LEN {
                        warn!(tool = %name, "abandoning oversized tool tag");
                        (State::Text { matched: 0 }, None)
                    } else {
                        (
                            State::Argument {
                                name,
                                argument,
                                matched,
                            },
                            None,
                        )
                    }
                }
            }
        };
        self.state = next;
        emitted
    }
}

/// Advance the `[tool:` matcher by one character.
fn advance_text(matched: usize, c: char) -> State {
    if c == char::from(OPEN[matched]) {
        if matched + 1 == OPEN.len() {
            State::Name {
                name: String::new(),
            }
        } else {
            State::Text {
                matched: matched + 1,
            }
        }
    } else if c == '[' {
        State::Text { matched: 1 }
    } else {
        State::Text { matched: 0 }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_tag_in_single_fragment() {
        let found = ToolTagScanner::scan_all("Sure. [tool:search]rust sse[/tool] Done.");
        assert_eq!(found, vec![ToolInvocation::new("search", "rust sse")]);
    }

    #[test]
    fn tag_split_across_fragments() {
        let mut scanner = ToolTagScanner::new();
        assert!(scanner.feed("[too").is_empty());
        assert!(scanner.is_pending());
        let found = scanner.feed("l:search]cats[/tool]");
        assert_eq!(found, vec![ToolInvocation::new("search", "cats")]);
        assert!(!scanner.is_pending());
    }

    #[test]
    fn every_split_point_yields_the_same_tag() {
        let text = "x [tool:memory]likes tea[/tool] y";
        for split in 0..=text.len() {
            let mut scanner = ToolTagScanner::new();
            let mut found = scanner.feed(&text[..split]);
            found.extend(scanner.feed(&text[split..]));
            assert_eq!(found, vec![ToolInvocation::new("memory", "likes tea")], "split {split}");
        }
    }

    #[test]
    fn matching_is_non_greedy() {
        let found = ToolTagScanner::scan_all("[tool:code]a[/tool] mid [tool:terminal]ls[/tool]");
        assert_eq!(
            found,
            vec![
                ToolInvocation::new("code", "a"),
                ToolInvocation::new("terminal", "ls"),
            ]
        );
    }

    #[test]
    fn multiline_argument_and_brackets_inside() {
        let found = ToolTagScanner::scan_all("[tool:code]\nlet v = [1, 2];\n[/tol] x\n[/tool]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].argument, "let v = [1, 2];\n[/tol] x");
    }

    #[test]
    fn uppercase_or_empty_names_are_not_tags() {
        assert!(ToolTagScanner::scan_all("[tool:Search]x[/tool]").is_empty());
        assert!(ToolTagScanner::scan_all("[tool:]x[/tool]").is_empty());
    }

    #[test]
    fn unknown_lowercase_names_are_reported() {
        let found = ToolTagScanner::scan_all("[tool:teleport]mars[/tool]");
        assert_eq!(found[0].name, "teleport");
        assert!(found[0].kind().is_none());
    }

    #[test]
    fn restart_after_false_open() {
        let found = ToolTagScanner::scan_all("[[tool:browser]example.com[/tool]");
        assert_eq!(found, vec![ToolInvocation::new("browser", "example.com")]);
    }

    #[test]
    fn unterminated_tag_emits_nothing() {
        let mut scanner = ToolTagScanner::new();
        assert!(scanner.feed("[tool:search]never closed").is_empty());
        assert!(scanner.is_pending());
    }

    #[test]
    fn oversized_argument_is_abandoned() {
        let mut scanner = ToolTagScanner::new();
        scanner.feed("[tool:code]");
        scanner.feed(&"x".repeat(MAX_ARGUMENT_LEN + 1));
        assert!(scanner.feed("[/tool]").is_empty());
        assert!(!scanner.is_pending());
    }
}
