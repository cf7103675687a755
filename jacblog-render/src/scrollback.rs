//! Output panel text with a visible-row window
//!
//! Chunks are appended as they stream in. A chunk that does not end in a
//! newline leaves its last line open, and the next chunk continues it.
//! Every append scrolls the window to the bottom.

use jacblog_types::Stream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    /// Stream of the chunk that started the line
    pub stream: Stream,
}

#[derive(Debug, Clone)]
pub struct Scrollback {
    lines: Vec<Line>,
    open: bool,
    rows: usize,
    top: usize,
}

impl Scrollback {
    /// A panel showing `rows` lines at a time
    pub fn new(rows: usize) -> Self {
        Self {
            lines: Vec::new(),
            open: false,
            rows: rows.max(1),
            top: 0,
        }
    }

    pub fn append(&mut self, chunk: &str, stream: Stream) {
        if chunk.is_empty() {
            return;
        }
        for segment in chunk.split_inclusive('\n') {
            let body = segment.strip_suffix('\n');
            let text = body.unwrap_or(segment);
            match self.lines.last_mut() {
                Some(last) if self.open => last.text.push_str(text),
                _ => self.lines.push(Line {
                    text: text.to_string(),
                    stream,
                }),
            }
            self.open = body.is_none();
        }
        self.scroll_to_bottom();
    }

    /// Everything appended so far, as one string
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            out.push_str(&line.text);
            if i + 1 < self.lines.len() || !self.open {
                out.push('\n');
            }
        }
        out
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn visible(&self) -> &[Line] {
        let end = (self.top + self.rows).min(self.lines.len());
        &self.lines[self.top..end]
    }

    pub fn top(&self) -> usize {
        self.top
    }

    fn max_top(&self) -> usize {
        self.lines.len().saturating_sub(self.rows)
    }

    pub fn at_bottom(&self) -> bool {
        self.top == self.max_top()
    }

    pub fn scroll_to_bottom(&mut self) {
        self.top = self.max_top();
    }

    /// Move the window by `delta` rows, negative is up
    pub fn scroll_by(&mut self, delta: isize) {
        let target = self.top as isize + delta;
        self.top = target.clamp(0, self.max_top() as isize) as usize;
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.open = false;
        self.top = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_accumulate_in_order() {
        let mut panel = Scrollback::new(10);
        panel.append("Hello, ", Stream::Stdout);
        panel.append("World!\n", Stream::Stdout);
        assert_eq!(panel.text(), "Hello, World!\n");
        assert_eq!(panel.lines().len(), 1);
    }

    #[test]
    fn test_blank_lines_are_kept() {
        let mut panel = Scrollback::new(10);
        panel.append("a\n\nb\n", Stream::Stdout);
        let texts: Vec<&str> = panel.lines().iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "", "b"]);
        assert_eq!(panel.text(), "a\n\nb\n");
    }

    #[test]
    fn test_bare_newline_is_a_line() {
        let mut panel = Scrollback::new(10);
        panel.append("\n", Stream::Stdout);
        assert_eq!(panel.lines().len(), 1);
        assert_eq!(panel.text(), "\n");
    }

    #[test]
    fn test_open_line_text() {
        let mut panel = Scrollback::new(10);
        panel.append("Enter input: ", Stream::Stdout);
        assert_eq!(panel.text(), "Enter input: ");
        panel.append("42\n", Stream::Stdout);
        assert_eq!(panel.text(), "Enter input: 42\n");
    }

    #[test]
    fn test_stream_of_each_line() {
        let mut panel = Scrollback::new(10);
        panel.append("ok\n", Stream::Stdout);
        panel.append("Traceback\n", Stream::Stderr);
        assert_eq!(panel.lines()[1].stream, Stream::Stderr);
    }

    #[test]
    fn test_append_follows_the_bottom() {
        let mut panel = Scrollback::new(3);
        for i in 0..5 {
            panel.append(&format!("Count: {}\n", i), Stream::Stdout);
        }
        let visible: Vec<&str> = panel.visible().iter().map(|l| l.text.as_str()).collect();
        assert_eq!(visible, vec!["Count: 2", "Count: 3", "Count: 4"]);

        panel.scroll_by(-10);
        assert_eq!(panel.top(), 0);
        assert!(!panel.at_bottom());
        panel.append("Count: 5\n", Stream::Stdout);
        assert!(panel.at_bottom());
        assert_eq!(panel.visible()[2].text, "Count: 5");
    }

    #[test]
    fn test_clear() {
        let mut panel = Scrollback::new(2);
        panel.append("x", Stream::Stdout);
        panel.clear();
        assert!(panel.is_empty());
        panel.append("y\n", Stream::Stdout);
        assert_eq!(panel.text(), "y\n");
    }
}
