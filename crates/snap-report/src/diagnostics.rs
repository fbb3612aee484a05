//! Failure Diagnostics Extractor
//!
//! Builds the one-line failure summary written into a failed test's entry:
//!
//! ```text
//! Test '<method>' in class '<class>' failed at <frame>. Error: <short><show more>
//! ```
//!
//! - `<frame>` is the innermost stack frame whose declaring type contains the
//!   test's own type name, or empty when no frame belongs to the test.
//! - `<short>` is the first five message lines joined with `<br>`.
//! - `<show more>` appears once the message has more than four lines: lines
//!   three onwards inside a `<details>` disclosure block.
//!
//! A failure without a message is one empty line, never an error.

use regex::Regex;
use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::OnceLock;

use crate::render::escape_html;

/// Separator between message lines in the report
pub const LINE_BREAK: &str = "<br>";

/// Lines kept in the short message
const SHORT_LINES: usize = 5;

/// A message longer than this gets a disclosure block
const DISCLOSURE_AFTER: usize = 4;

/// First line repeated inside the disclosure block
const DISCLOSURE_FROM: usize = 2;

/// One frame of a failure's call stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Type or module path that declares the function
    pub declaring_type: String,
    /// Function name
    pub function: String,
    /// Source file, if known
    pub file: Option<String>,
    /// Source line, if known
    pub line: Option<u32>,
}

impl StackFrame {
    /// Create a frame without a location
    #[must_use]
    pub fn new(declaring_type: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            function: function.into(),
            file: None,
            line: None,
        }
    }

    /// Set the source location
    #[must_use]
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// Split a symbol like `crate::module::Type::method::h0123456789abcdef`
    /// into declaring type and function
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Self {
        let symbol = strip_hash(symbol.trim());
        match symbol.rsplit_once("::") {
            Some((owner, function)) => Self::new(owner, function),
            None => Self::new("", symbol),
        }
    }

    /// Parse the text of a [`Backtrace`] into frames, innermost first
    #[must_use]
    pub fn parse_backtrace(text: &str) -> Vec<Self> {
        static FRAME: OnceLock<Regex> = OnceLock::new();
        static LOCATION: OnceLock<Regex> = OnceLock::new();
        let frame_re = FRAME.get_or_init(|| {
            Regex::new(r"^\s*\d+:\s+(?P<symbol>\S.*?)\s*$").expect("frame pattern is valid")
        });
        let location_re = LOCATION.get_or_init(|| {
            Regex::new(r"^\s*at\s+(?P<file>.+?):(?P<line>\d+)(?::\d+)?\s*$")
                .expect("location pattern is valid")
        });

        let mut frames: Vec<Self> = Vec::new();
        for line in text.lines() {
            if let Some(caps) = location_re.captures(line) {
                if let Some(last) = frames.last_mut() {
                    if last.file.is_none() {
                        last.file = Some(caps["file"].to_string());
                        last.line = caps["line"].parse().ok();
                    }
                }
            } else if let Some(caps) = frame_re.captures(line) {
                frames.push(Self::from_symbol(&caps["symbol"]));
            }
        }
        frames
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.declaring_type.is_empty() {
            write!(f, "{}", self.function)?;
        } else {
            write!(f, "{}::{}", self.declaring_type, self.function)?;
        }
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "({file}:{line})"),
            (Some(file), None) => write!(f, "({file})"),
            _ => write!(f, "(Unknown Source)"),
        }
    }
}

fn strip_hash(symbol: &str) -> &str {
    match symbol.rsplit_once("::h") {
        Some((head, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
            head
        }
        _ => symbol,
    }
}

/// A raised test failure: its message and where it came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Failure {
    /// Failure text, possibly multi-line; `None` if the failure carried none
    pub message: Option<String>,
    /// Call stack, innermost frame first
    pub frames: Vec<StackFrame>,
}

impl Failure {
    /// Create a failure with a message and no stack
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            frames: Vec::new(),
        }
    }

    /// Create a failure that carries no message
    #[must_use]
    pub fn without_message() -> Self {
        Self::default()
    }

    /// Create a failure with the current call stack attached
    #[must_use]
    pub fn capture(message: impl Into<String>) -> Self {
        let trace = Backtrace::force_capture().to_string();
        Self::new(message).with_frames(StackFrame::parse_backtrace(&trace))
    }

    /// Create a failure from a caught panic payload
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send), frames: Vec<StackFrame>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned());
        Self { message, frames }
    }

    /// Replace the stack
    #[must_use]
    pub fn with_frames(mut self, frames: Vec<StackFrame>) -> Self {
        self.frames = frames;
        self
    }

    /// Append one frame (outermost so far)
    #[must_use]
    pub fn with_frame(mut self, frame: StackFrame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Message split into lines.
    ///
    /// Trailing empty lines are dropped; an absent or empty message is a single
    /// empty line.
    #[must_use]
    pub fn message_lines(&self) -> Vec<&str> {
        let text = self.message.as_deref().unwrap_or_default();
        let mut lines: Vec<&str> = text
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .collect();
        while lines.len() > 1 && lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message.as_deref().unwrap_or("<no message>"))
    }
}

/// Diagnostics derived from a [`Failure`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDiagnosis {
    /// Innermost frame that belongs to the test's own type
    pub failing_frame: Option<String>,
    /// First lines of the message, joined with `<br>`
    pub short_message: String,
    /// Disclosure block with the rest of the message, if long enough
    pub remaining_message: Option<String>,
}

impl FailureDiagnosis {
    /// Extract diagnostics for a test declared in `test_type`
    #[must_use]
    pub fn extract(failure: &Failure, test_type: &str) -> Self {
        let failing_frame = if test_type.is_empty() {
            None
        } else {
            failure
                .frames
                .iter()
                .find(|frame| frame.declaring_type.contains(test_type))
                .map(ToString::to_string)
        };

        let lines: Vec<String> = failure
            .message_lines()
            .into_iter()
            .map(escape_html)
            .collect();
        let short_message = lines[..lines.len().min(SHORT_LINES)].join(LINE_BREAK);
        let remaining_message = (lines.len() > DISCLOSURE_AFTER)
            .then(|| disclosure(&lines[DISCLOSURE_FROM..].join(LINE_BREAK)));

        Self {
            failing_frame,
            short_message,
            remaining_message,
        }
    }

    /// The summary line for the report
    #[must_use]
    pub fn message(&self, test_name: &str, class_name: &str) -> String {
        format!(
            "Test '{}' in class '{}' failed at {}. Error: {}{}",
            escape_html(test_name),
            escape_html(class_name),
            self.failing_frame
                .as_deref()
                .map(escape_html)
                .unwrap_or_default(),
            self.short_message,
            self.remaining_message.as_deref().unwrap_or_default()
        )
    }
}

/// Wrap markup in a collapsible "Show more" block
#[must_use]
pub fn disclosure(content: &str) -> String {
    format!("<details><summary>Show more...</summary>{content}</details>")
}
