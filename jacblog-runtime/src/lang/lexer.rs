use super::error::{ErrorKind, ScriptError, ScriptResult};
use jacblog_types::Language;
use logos::{FilterResult, Lexer, Logos};
use std::ops::Range;

/// Tokens shared by both snippet dialects
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"\\\r?\n")]
#[logos(skip r"#([^*\n][^\n]*)?")]
#[logos(extras = Language)]
pub enum Token {
    // Keywords
    #[token("node")]
    Node,
    #[token("has")]
    Has,
    #[token("def")]
    Def,
    #[token("with")]
    With,
    #[token("entry")]
    Entry,
    #[token("glob")]
    Glob,
    #[token("include")]
    Include,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("return")]
    Return,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("pass")]
    Pass,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("True")]
    True,
    #[token("False")]
    False,
    #[token("None")]
    None,

    // Identifiers and literals
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(strip_quotes(lex.slice(), 0)))]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| unescape(strip_quotes(lex.slice(), 0)))]
    Str(String),

    #[regex(r#"f"([^"\\\n]|\\.)*""#, |lex| unescape(strip_quotes(lex.slice(), 1)))]
    #[regex(r#"f'([^'\\\n]|\\.)*'"#, |lex| unescape(strip_quotes(lex.slice(), 1)))]
    FString(String),

    // Operators
    #[token("++>")]
    Connect,
    #[token("-->")]
    EdgeRef,
    #[token("->")]
    Arrow,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("//")]
    SlashSlash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // Punctuation
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,
    #[token("\n")]
    Newline,

    /// `#* ... *#`, never emitted
    #[token("#*", block_comment)]
    BlockComment,

    Eof,
}

/// Skip to the closing `*#`; an unterminated comment is an invalid token
///
/// The fallback dialect has no block comments, so there `#*` starts an
/// ordinary line comment.
fn block_comment(lex: &mut Lexer<Token>) -> FilterResult<(), ()> {
    let rest = lex.remainder();
    if lex.extras == Language::Python {
        let end = rest.find('\n').unwrap_or(rest.len());
        lex.bump(end);
        return FilterResult::Skip;
    }
    match rest.find("*#") {
        Some(end) => {
            lex.bump(end + 2);
            FilterResult::Skip
        }
        None => {
            lex.bump(rest.len());
            FilterResult::Error(())
        }
    }
}

impl Token {
    /// Human-readable rendering for error messages
    pub fn describe(&self) -> String {
        match self {
            Token::Identifier(name) => format!("'{}'", name),
            Token::Int(v) => format!("'{}'", v),
            Token::Float(v) => format!("'{}'", v),
            Token::Str(_) | Token::FString(_) => "string literal".to_string(),
            Token::Newline => "newline".to_string(),
            Token::Eof => "end of input".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::Node => "node",
            Token::Has => "has",
            Token::Def => "def",
            Token::With => "with",
            Token::Entry => "entry",
            Token::Glob => "glob",
            Token::Include => "include",
            Token::If => "if",
            Token::Elif => "elif",
            Token::Else => "else",
            Token::While => "while",
            Token::For => "for",
            Token::In => "in",
            Token::Return => "return",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::Pass => "pass",
            Token::And => "and",
            Token::Or => "or",
            Token::Not => "not",
            Token::True => "True",
            Token::False => "False",
            Token::None => "None",
            Token::Connect => "++>",
            Token::EdgeRef => "-->",
            Token::Arrow => "->",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::StarStar => "**",
            Token::Slash => "/",
            Token::SlashSlash => "//",
            Token::Percent => "%",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::StarAssign => "*=",
            Token::SlashAssign => "/=",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Semi => ";",
            Token::Dot => ".",
            Token::Identifier(_)
            | Token::Int(_)
            | Token::Float(_)
            | Token::Str(_)
            | Token::FString(_)
            | Token::Newline
            | Token::BlockComment
            | Token::Eof => "",
        }
    }
}

/// A token with its byte span and 1-indexed line
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Range<usize>,
    pub line: usize,
}

fn strip_quotes(slice: &str, prefix: usize) -> &str {
    &slice[prefix + 1..slice.len() - 1]
}

fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Some(out)
}

/// Byte offsets of every line start, for offset → line lookups
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    pub fn line(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    pub fn line_start(&self, line: usize) -> usize {
        self.starts[line.saturating_sub(1).min(self.starts.len() - 1)]
    }
}

/// Tokenize source for the given dialect
///
/// The primary dialect drops newlines; the fallback dialect converts its
/// indentation into the same brace and semicolon tokens.
pub fn tokenize(source: &str, language: Language) -> ScriptResult<Vec<SpannedToken>> {
    let index = LineIndex::new(source);
    let mut lex = Token::lexer_with_extras(source, language);
    let mut tokens = Vec::new();

    while let Some(result) = lex.next() {
        let span = lex.span();
        let line = index.line(span.start);
        match result {
            Ok(Token::Newline) if language == Language::Jac => {}
            Ok(token) => tokens.push(SpannedToken { token, span, line }),
            Err(()) => {
                return Err(ScriptError::syntax(
                    line,
                    format!("invalid token {:?}", &source[span.clone()]),
                ))
            }
        }
    }

    let mut tokens = match language {
        Language::Jac => tokens,
        Language::Python => layout(tokens, source, &index)?,
    };
    let end = source.len();
    tokens.push(SpannedToken {
        token: Token::Eof,
        span: end..end,
        line: index.line(end),
    });
    Ok(tokens)
}

fn synthetic(token: Token, near: &SpannedToken) -> SpannedToken {
    SpannedToken {
        token,
        span: near.span.clone(),
        line: near.line,
    }
}

/// Convert indentation-delimited blocks into brace-delimited ones
///
/// A logical line ending in `:` opens a block that the next, deeper line
/// enters; dedents close blocks; every other logical line ends in `;`.
fn layout(
    tokens: Vec<SpannedToken>,
    source: &str,
    index: &LineIndex,
) -> ScriptResult<Vec<SpannedToken>> {
    let mut lines: Vec<Vec<SpannedToken>> = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;

    for tok in tokens {
        match tok.token {
            Token::Newline if depth > 0 => continue,
            Token::Newline => {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                continue;
            }
            Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => depth = depth.saturating_sub(1),
            _ => {}
        }
        current.push(tok);
    }
    if !current.is_empty() {
        lines.push(current);
    }

    let mut out = Vec::new();
    let mut indents = vec![0usize];
    let mut opens_block = false;

    for mut line in lines {
        let first = line[0].clone();
        let start = index.line_start(first.line);
        let indent = source[start..first.span.start]
            .chars()
            .map(|c| if c == '\t' { 8 } else { 1 })
            .sum::<usize>();
        let top = *indents.last().unwrap_or(&0);

        if indent > top {
            if !opens_block {
                return Err(indentation(first.line, "unexpected indent"));
            }
            indents.push(indent);
            out.push(synthetic(Token::LBrace, &first));
        } else {
            if opens_block {
                return Err(indentation(first.line, "expected an indented block"));
            }
            while indent < *indents.last().unwrap_or(&0) {
                indents.pop();
                out.push(synthetic(Token::RBrace, &first));
            }
            if indent != *indents.last().unwrap_or(&0) {
                return Err(indentation(
                    first.line,
                    "unindent does not match any outer indentation level",
                ));
            }
        }

        opens_block = matches!(line.last().map(|t| &t.token), Some(Token::Colon));
        if opens_block {
            line.pop();
            out.extend(line);
        } else {
            let last = line[line.len() - 1].clone();
            out.extend(line);
            out.push(synthetic(Token::Semi, &last));
        }
    }

    if let Some(last) = out.last().cloned() {
        if opens_block {
            return Err(indentation(last.line, "expected an indented block"));
        }
        while indents.len() > 1 {
            indents.pop();
            out.push(synthetic(Token::RBrace, &last));
        }
    }

    Ok(out)
}

fn indentation(line: usize, message: &str) -> ScriptError {
    ScriptError::new(ErrorKind::IndentationError, message).at_line(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str, language: Language) -> Vec<Token> {
        tokenize(source, language)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_keywords_and_operators() {
        let tokens = kinds("node has ++> --> -> ** // <= &&", Language::Jac);
        assert_eq!(
            tokens,
            vec![
                Token::Node,
                Token::Has,
                Token::Connect,
                Token::EdgeRef,
                Token::Arrow,
                Token::StarStar,
                Token::SlashSlash,
                Token::Le,
                Token::AndAnd,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_literals() {
        let tokens = kinds(r#"42 3.5 "a\nb" 'c' f"x{y}""#, Language::Jac);
        assert_eq!(tokens[0], Token::Int(42));
        assert_eq!(tokens[1], Token::Float(3.5));
        assert_eq!(tokens[2], Token::Str("a\nb".to_string()));
        assert_eq!(tokens[3], Token::Str("c".to_string()));
        assert_eq!(tokens[4], Token::FString("x{y}".to_string()));
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = kinds("x # trailing\n#* block\n comment *# y", Language::Jac);
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("x".into()),
                Token::Identifier("y".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_inline_block_comment() {
        let tokens = kinds("with entry { #* c *# print(1); }", Language::Jac);
        assert_eq!(
            tokens,
            vec![
                Token::With,
                Token::Entry,
                Token::LBrace,
                Token::Identifier("print".into()),
                Token::LParen,
                Token::Int(1),
                Token::RParen,
                Token::Semi,
                Token::RBrace,
                Token::Eof
            ]
        );

        // A lone `#` is still a comment
        assert_eq!(kinds("a #\nb", Language::Jac).len(), 3);
    }

    #[test]
    fn test_unterminated_block_comment() {
        let err = tokenize("x #* never closed\n y", Language::Jac).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn test_python_hash_star_is_line_comment() {
        let tokens = kinds("x = 1 #* not a block\ny = 2\n", Language::Python);
        assert_eq!(tokens.iter().filter(|t| **t == Token::Semi).count(), 2);
        assert!(tokens.contains(&Token::Identifier("y".into())));
    }

    #[test]
    fn test_python_layout() {
        let source = "if x:\n    a\nelse:\n    b\nc\n";
        let tokens = kinds(source, Language::Python);
        assert_eq!(
            tokens,
            vec![
                Token::If,
                Token::Identifier("x".into()),
                Token::LBrace,
                Token::Identifier("a".into()),
                Token::Semi,
                Token::RBrace,
                Token::Else,
                Token::LBrace,
                Token::Identifier("b".into()),
                Token::Semi,
                Token::RBrace,
                Token::Identifier("c".into()),
                Token::Semi,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_python_brackets_join_lines() {
        let tokens = kinds("xs = [1,\n  2]\n", Language::Python);
        assert_eq!(tokens.iter().filter(|t| **t == Token::Semi).count(), 1);
    }

    #[test]
    fn test_python_unexpected_indent() {
        let err = tokenize("a\n    b\n", Language::Python).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndentationError);
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_line_numbers() {
        let tokens = tokenize("a\n\nb", Language::Jac).unwrap();
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 3);
    }
}
