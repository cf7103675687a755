use std::fmt;

/// Exception class raised inside a snippet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SyntaxError,
    IndentationError,
    NameError,
    TypeError,
    ValueError,
    ZeroDivisionError,
    IndexError,
    AttributeError,
    RecursionError,
    OverflowError,
    MemoryError,
    ImportError,
    KeyboardInterrupt,
    EOFError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::IndentationError => "IndentationError",
            ErrorKind::NameError => "NameError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ValueError => "ValueError",
            ErrorKind::ZeroDivisionError => "ZeroDivisionError",
            ErrorKind::IndexError => "IndexError",
            ErrorKind::AttributeError => "AttributeError",
            ErrorKind::RecursionError => "RecursionError",
            ErrorKind::OverflowError => "OverflowError",
            ErrorKind::MemoryError => "MemoryError",
            ErrorKind::ImportError => "ImportError",
            ErrorKind::KeyboardInterrupt => "KeyboardInterrupt",
            ErrorKind::EOFError => "EOFError",
        }
    }

    /// Raised before any statement ran
    pub fn is_compile_time(&self) -> bool {
        matches!(self, ErrorKind::SyntaxError | ErrorKind::IndentationError)
    }
}

/// An exception that escaped the snippet
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    /// 1-indexed source line, attached by the innermost statement
    pub line: Option<usize>,
    /// Function the error was raised in; `None` for module level
    pub scope: Option<String>,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            scope: None,
        }
    }

    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, message).at_line(line)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValueError, message)
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Python-style traceback naming the scratch file
    pub fn traceback(&self, file: &str) -> String {
        let mut out = String::new();
        if self.kind.is_compile_time() {
            if let Some(line) = self.line {
                out.push_str(&format!("  File \"{}\", line {}\n", file, line));
            }
        } else {
            out.push_str("Traceback (most recent call last):\n");
            let scope = self.scope.as_deref().unwrap_or("<module>");
            match self.line {
                Some(line) => {
                    out.push_str(&format!("  File \"{}\", line {}, in {}\n", file, line, scope))
                }
                None => out.push_str(&format!("  File \"{}\", in {}\n", file, scope)),
            }
        }
        out.push_str(&self.to_string());
        out.push('\n');
        out
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.kind.as_str())
        } else {
            write!(f, "{}: {}", self.kind.as_str(), self.message)
        }
    }
}

impl std::error::Error for ScriptError {}

pub type ScriptResult<T> = std::result::Result<T, ScriptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_traceback() {
        let mut err = ScriptError::new(ErrorKind::NameError, "name 'y' is not defined").at_line(3);
        err.scope = Some("greet".to_string());
        assert_eq!(
            err.traceback("/tmp/temp.jac"),
            "Traceback (most recent call last):\n  File \"/tmp/temp.jac\", line 3, in greet\nNameError: name 'y' is not defined\n"
        );
    }

    #[test]
    fn test_syntax_traceback() {
        let err = ScriptError::syntax(2, "invalid syntax");
        assert_eq!(
            err.traceback("/tmp/temp.py"),
            "  File \"/tmp/temp.py\", line 2\nSyntaxError: invalid syntax\n"
        );
    }

    #[test]
    fn test_bare_interrupt() {
        let err = ScriptError::new(ErrorKind::KeyboardInterrupt, "");
        assert_eq!(err.to_string(), "KeyboardInterrupt");
    }
}
