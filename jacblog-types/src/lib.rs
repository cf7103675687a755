//! Shared types for jacblog
//!
//! This crate provides the message vocabulary spoken between the page-side
//! harness and the background snippet runtime, plus the page-level events the
//! result renderer consumes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of command a snippet action sends to the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Execute the program
    Run,
    /// Start the program's server entry point in fake, non-listening mode
    Serve,
    /// Dump the program's graph description
    Dot,
    /// Execute once, streaming output, then emit the graph description
    Graph,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Run => "run",
            CommandKind::Serve => "serve",
            CommandKind::Dot => "dot",
            CommandKind::Graph => "graph",
        }
    }

    /// Whether this command produces a graph payload
    pub fn emits_graph(&self) -> bool {
        matches!(self, CommandKind::Dot | CommandKind::Graph)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source language of a snippet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// The documented language (brace-delimited blocks)
    #[default]
    Jac,
    /// Fallback language (indentation-delimited blocks)
    Python,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Jac => "jac",
            Language::Python => "python",
        }
    }

    /// File extension used for the runtime's scratch file
    pub fn extension(&self) -> &'static str {
        match self {
            Language::Jac => "jac",
            Language::Python => "py",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a language name is not recognized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLanguage(pub String);

impl fmt::Display for UnknownLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown snippet language: {}", self.0)
    }
}

impl std::error::Error for UnknownLanguage {}

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jac" => Ok(Language::Jac),
            "python" | "py" => Ok(Language::Python),
            other => Err(UnknownLanguage(other.to_string())),
        }
    }
}

/// A single request to execute snippet text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub command: CommandKind,
    #[serde(default)]
    pub language: Language,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, command: CommandKind, language: Language) -> Self {
        Self {
            code: code.into(),
            command,
            language,
        }
    }

    pub fn run(code: impl Into<String>) -> Self {
        Self::new(code, CommandKind::Run, Language::Jac)
    }
}

/// Output stream a chunk of text was written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Messages posted by the background runtime to the page side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// The interpreter and support archive are loaded
    Ready,
    /// One write call on stdout or stderr
    StreamingOutput { output: String, stream: Stream },
    /// Graph description produced by a dot/graph command
    Dot { dot: String },
    /// The current command finished (user-code errors included)
    ExecutionComplete,
    /// The running program is blocked on an input call
    InputRequest { prompt: String },
    /// Infrastructure failure
    Error { error: String },
}

impl WorkerMessage {
    /// Whether this message ends the current command
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerMessage::ExecutionComplete | WorkerMessage::Error { .. }
        )
    }
}

/// Page-level events bridging runtime output to the result renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PageEvent {
    Output { output: String, stream: Stream },
    GraphReady { dot: String },
}

/// A button offered next to a runnable snippet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnippetAction {
    Run,
    Serve,
    Graph,
}

impl SnippetAction {
    /// Command sent to the runtime when this action is triggered
    pub fn command(&self) -> CommandKind {
        match self {
            SnippetAction::Run => CommandKind::Run,
            SnippetAction::Serve => CommandKind::Serve,
            SnippetAction::Graph => CommandKind::Graph,
        }
    }

    /// Action set selected by a markup modifier tag
    ///
    /// Unknown modifiers fall back to run-only.
    pub fn for_modifier(modifier: Option<&str>) -> Vec<SnippetAction> {
        use SnippetAction::*;
        match modifier {
            Some("run-serve") => vec![Run, Serve],
            Some("serve-only") => vec![Serve],
            Some("run-dot") => vec![Run, Graph],
            Some("serve-dot") => vec![Serve, Graph],
            Some("run-dot-serve") => vec![Run, Graph, Serve],
            _ => vec![Run],
        }
    }

    /// Whether the given tag is one of the recognized modifiers
    pub fn is_modifier(tag: &str) -> bool {
        matches!(
            tag,
            "run" | "run-serve" | "serve-only" | "run-dot" | "serve-dot" | "run-dot-serve"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_message_wire_names() {
        let msg = WorkerMessage::StreamingOutput {
            output: "hi\n".to_string(),
            stream: Stream::Stderr,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "streaming_output");
        assert_eq!(json["stream"], "stderr");

        let json = serde_json::to_value(WorkerMessage::ExecutionComplete).unwrap();
        assert_eq!(json["type"], "execution_complete");

        let back: WorkerMessage =
            serde_json::from_str(r#"{"type":"input_request","prompt":"Enter input:"}"#).unwrap();
        assert_eq!(
            back,
            WorkerMessage::InputRequest {
                prompt: "Enter input:".to_string()
            }
        );
    }

    #[test]
    fn test_terminal_messages() {
        assert!(WorkerMessage::ExecutionComplete.is_terminal());
        assert!(WorkerMessage::Error {
            error: "boom".into()
        }
        .is_terminal());
        assert!(!WorkerMessage::Ready.is_terminal());
    }

    #[test]
    fn test_language_parse() {
        assert_eq!("jac".parse::<Language>().unwrap(), Language::Jac);
        assert_eq!("PY".parse::<Language>().unwrap(), Language::Python);
        assert!("ruby".parse::<Language>().is_err());
    }

    #[test]
    fn test_modifier_actions() {
        use SnippetAction::*;
        assert_eq!(SnippetAction::for_modifier(None), vec![Run]);
        assert_eq!(SnippetAction::for_modifier(Some("serve-only")), vec![Serve]);
        assert_eq!(
            SnippetAction::for_modifier(Some("run-dot-serve")),
            vec![Run, Graph, Serve]
        );
        assert_eq!(SnippetAction::for_modifier(Some("bogus")), vec![Run]);
        assert_eq!(Graph.command(), CommandKind::Graph);
    }
}
