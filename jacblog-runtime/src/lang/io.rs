use jacblog_types::Stream;

/// Why an `input()` call produced no text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFailure {
    /// The page side interrupted the wait
    Interrupted,
    /// No response arrived within the configured timeout
    TimedOut,
    /// No input source is attached
    Closed,
}

/// Host hooks the interpreter uses for its standard streams
pub trait ScriptIo {
    /// One write call; implementations must not buffer across calls
    fn write(&mut self, stream: Stream, text: &str);

    /// Block until the page side answers an input request
    fn read_line(&mut self, prompt: &str) -> Result<String, InputFailure>;

    /// Whether the running program should stop at the next statement
    fn interrupted(&self) -> bool {
        false
    }
}

/// Drops stdout while forwarding stderr and input
pub struct MutedStdout<'a> {
    inner: &'a mut dyn ScriptIo,
}

impl<'a> MutedStdout<'a> {
    pub fn new(inner: &'a mut dyn ScriptIo) -> Self {
        Self { inner }
    }
}

impl ScriptIo for MutedStdout<'_> {
    fn write(&mut self, stream: Stream, text: &str) {
        if stream == Stream::Stderr {
            self.inner.write(stream, text);
        }
    }

    fn read_line(&mut self, prompt: &str) -> Result<String, InputFailure> {
        self.inner.read_line(prompt)
    }

    fn interrupted(&self) -> bool {
        self.inner.interrupted()
    }
}

/// In-memory streams with scripted input, used by tests and dry runs
#[derive(Debug, Default)]
pub struct CapturedIo {
    pub chunks: Vec<(Stream, String)>,
    pub inputs: std::collections::VecDeque<String>,
    pub prompts: Vec<String>,
}

impl CapturedIo {
    pub fn with_inputs<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn stdout(&self) -> String {
        self.collect(Stream::Stdout)
    }

    pub fn stderr(&self) -> String {
        self.collect(Stream::Stderr)
    }

    fn collect(&self, stream: Stream) -> String {
        self.chunks
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, text)| text.as_str())
            .collect()
    }
}

impl ScriptIo for CapturedIo {
    fn write(&mut self, stream: Stream, text: &str) {
        self.chunks.push((stream, text.to_string()));
    }

    fn read_line(&mut self, prompt: &str) -> Result<String, InputFailure> {
        self.prompts.push(prompt.to_string());
        self.inputs.pop_front().ok_or(InputFailure::Closed)
    }
}
