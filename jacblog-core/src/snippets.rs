//! Runnable snippet discovery in markdown pages.
//!
//! Two markup forms mark a code block as runnable:
//!
//! ~~~text
//! ```jac runnable            ```python run-dot
//! ...                        ...
//! ```                        ```
//!
//! <div class="code-block python run-serve">
//!
//! ```python
//! ...
//! ```
//!
//! </div>
//! ~~~
//!
//! A fence is runnable when its info string carries the `runnable` marker or a
//! modifier tag. Inside a `code-block` container the first fenced block is
//! runnable and takes its language and modifier from the container classes.

use jacblog_types::{Language, SnippetAction};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

/// Info-string marker for fences without a modifier
pub const RUNNABLE_MARKER: &str = "runnable";
/// Class that tags an HTML container as holding a runnable block
pub const CONTAINER_CLASS: &str = "code-block";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SnippetError {
    #[error("line {line}: runnable block has unsupported language {name:?}")]
    UnknownLanguage { line: usize, name: String },

    #[error("snippet {index} does not exist (page has {count})")]
    NotFound { index: usize, count: usize },
}

/// A runnable block found in a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snippet {
    /// Position among the page's runnable blocks, from 0
    pub index: usize,
    /// 1-based line of the opening fence
    pub line: usize,
    pub language: Language,
    pub modifier: Option<String>,
    pub actions: Vec<SnippetAction>,
    pub code: String,
}

/// Classes of an open `code-block` container
#[derive(Debug, Clone, Default)]
struct Container {
    python: bool,
    modifier: Option<String>,
    used: bool,
}

impl Container {
    fn from_classes(classes: &str) -> Option<Self> {
        let classes: Vec<&str> = classes.split_whitespace().collect();
        if !classes.contains(&CONTAINER_CLASS) {
            return None;
        }
        Some(Container {
            python: classes.iter().any(|c| matches!(*c, "python" | "py")),
            modifier: classes
                .iter()
                .find(|c| SnippetAction::is_modifier(c))
                .map(|c| c.to_string()),
            used: false,
        })
    }
}

fn div_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<div\s[^>]*class\s*=\s*["']([^"']*)["'][^>]*>"#)
            .expect("valid container regex")
    })
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())].matches('\n').count() + 1
}

fn parse_language(name: &str, line: usize) -> Result<Language, SnippetError> {
    if name.is_empty() {
        return Ok(Language::Jac);
    }
    name.parse().map_err(|_| SnippetError::UnknownLanguage {
        line,
        name: name.to_string(),
    })
}

/// Collects snippets while walking the event stream
struct Collector {
    snippets: Vec<Snippet>,
    container: Option<Container>,
}

impl Collector {
    fn push(&mut self, line: usize, language: Language, modifier: Option<String>, code: String) {
        let actions = SnippetAction::for_modifier(modifier.as_deref());
        self.snippets.push(Snippet {
            index: self.snippets.len(),
            line,
            language,
            modifier,
            actions,
            code,
        });
    }

    /// A fenced block with the given info string
    fn fence(&mut self, info: &str, code: String, line: usize) -> Result<(), SnippetError> {
        let mut tokens = info.split_whitespace();
        let lang = tokens.next().unwrap_or("");
        let tags: Vec<&str> = tokens.collect();
        let fence_modifier = tags
            .iter()
            .find(|t| SnippetAction::is_modifier(t))
            .map(|t| t.to_string());

        if let Some(container) = self.container.as_mut().filter(|c| !c.used) {
            container.used = true;
            let language = if container.python {
                Language::Python
            } else {
                parse_language(lang, line)?
            };
            let modifier = container.modifier.clone().or(fence_modifier);
            self.push(line, language, modifier, code);
            return Ok(());
        }

        if tags.contains(&RUNNABLE_MARKER) || fence_modifier.is_some() {
            let language = parse_language(lang, line)?;
            self.push(line, language, fence_modifier, code);
        }
        Ok(())
    }

    /// One complete HTML block
    ///
    /// Without a blank line after the opening `<div>`, the fence is part of
    /// the HTML block itself and is extracted from the raw lines.
    fn html_block(&mut self, html: &str, first_line: usize) -> Result<(), SnippetError> {
        let mut rest = html;
        let mut line_base = first_line;

        while !rest.is_empty() {
            let open = div_open().captures_iter(rest).find_map(|caps| {
                let classes = Container::from_classes(caps.get(1)?.as_str())?;
                Some((caps.get(0)?, classes))
            });
            let close = rest.find("</div>");

            match (open, close) {
                (Some((m, container)), close) if close.map_or(true, |c| m.start() < c) => {
                    self.container = Some(container);
                    line_base += rest[..m.end()].matches('\n').count();
                    rest = &rest[m.end()..];
                    if let Some((consumed, lines)) = self.inline_fence(rest, line_base)? {
                        line_base += lines;
                        rest = &rest[consumed..];
                    }
                }
                (_, Some(c)) => {
                    self.container = None;
                    line_base += rest[..c].matches('\n').count();
                    rest = &rest[c + "</div>".len()..];
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Extract a fence that sits directly in HTML text; returns the bytes and
    /// lines consumed
    fn inline_fence(
        &mut self,
        text: &str,
        line_base: usize,
    ) -> Result<Option<(usize, usize)>, SnippetError> {
        let mut offset = 0;
        let mut lines = text.split_inclusive('\n').enumerate();
        let opening = loop {
            let Some((i, line)) = lines.next() else {
                return Ok(None);
            };
            let trimmed = line.trim();
            if trimmed.starts_with("</div>") {
                return Ok(None);
            }
            offset += line.len();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                break (i, trimmed);
            }
        };

        let (open_index, fence_line) = opening;
        let marker_char = fence_line.chars().next().unwrap_or('`');
        let marker_len = fence_line.chars().take_while(|&c| c == marker_char).count();
        let info = fence_line[marker_len..].trim().to_string();
        let indent = text
            .split_inclusive('\n')
            .nth(open_index)
            .map(|l| l.len() - l.trim_start().len())
            .unwrap_or(0);

        let mut code = String::new();
        let mut last_index = open_index;
        for (i, line) in lines {
            offset += line.len();
            last_index = i;
            let trimmed = line.trim();
            if trimmed.len() >= marker_len && trimmed.chars().all(|c| c == marker_char) {
                break;
            }
            let strip = line.len() - line.trim_start().len();
            code.push_str(&line[strip.min(indent)..]);
            if !line.ends_with('\n') {
                code.push('\n');
            }
        }

        self.fence(&info, code, line_base + open_index)?;
        Ok(Some((offset, last_index + 1)))
    }
}

/// Find every runnable block in a markdown page, in document order
pub fn extract_snippets(markdown: &str) -> Result<Vec<Snippet>, SnippetError> {
    let mut collector = Collector {
        snippets: Vec::new(),
        container: None,
    };

    let mut code: Option<(String, String, usize)> = None;
    let mut html: Option<(String, usize)> = None;

    for (event, range) in Parser::new_ext(markdown, Options::empty()).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                code = Some((info.to_string(), String::new(), line_of(markdown, range.start)));
            }
            Event::Text(text) if code.is_some() => {
                if let Some((_, body, _)) = code.as_mut() {
                    body.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((info, body, line)) = code.take() {
                    collector.fence(&info, body, line)?;
                }
            }
            Event::Start(Tag::HtmlBlock) => {
                html = Some((String::new(), line_of(markdown, range.start)));
            }
            Event::Html(text) | Event::InlineHtml(text) => match html.as_mut() {
                Some((buffer, _)) => buffer.push_str(&text),
                None => collector.html_block(&text, line_of(markdown, range.start))?,
            },
            Event::End(TagEnd::HtmlBlock) => {
                if let Some((buffer, line)) = html.take() {
                    collector.html_block(&buffer, line)?;
                }
            }
            _ => {}
        }
    }

    Ok(collector.snippets)
}

/// The snippet at `index`
pub fn select(snippets: &[Snippet], index: usize) -> Result<&Snippet, SnippetError> {
    snippets.get(index).ok_or(SnippetError::NotFound {
        index,
        count: snippets.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacblog_types::SnippetAction::*;

    #[test]
    fn test_runnable_fences() {
        let page = "# Title\n\n```jac runnable\nwith entry { print(1); }\n```\n\n```jac\nnot runnable\n```\n\n```python run-dot\nprint(2)\n```\n";
        let snippets = extract_snippets(page).unwrap();
        assert_eq!(snippets.len(), 2);

        assert_eq!(snippets[0].line, 3);
        assert_eq!(snippets[0].language, Language::Jac);
        assert_eq!(snippets[0].actions, vec![Run]);
        assert_eq!(snippets[0].code, "with entry { print(1); }\n");

        assert_eq!(snippets[1].index, 1);
        assert_eq!(snippets[1].language, Language::Python);
        assert_eq!(snippets[1].modifier.as_deref(), Some("run-dot"));
        assert_eq!(snippets[1].actions, vec![Run, Graph]);
    }

    #[test]
    fn test_container_with_blank_lines() {
        let page = "<div class=\"code-block python serve-dot\">\n\n```\nprint('hi')\n```\n\n</div>\n\n```jac\nplain\n```\n";
        let snippets = extract_snippets(page).unwrap();
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].language, Language::Python);
        assert_eq!(snippets[0].actions, vec![Serve, Graph]);
        assert_eq!(snippets[0].code, "print('hi')\n");
        assert_eq!(snippets[0].line, 3);
    }

    #[test]
    fn test_container_without_blank_lines() {
        let page = "Intro\n\n<div class=\"code-block run-dot-serve\">\n```jac\nwith entry {\n    print(\"x\");\n}\n```\n</div>\n";
        let snippets = extract_snippets(page).unwrap();
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].language, Language::Jac);
        assert_eq!(snippets[0].actions, vec![Run, Graph, Serve]);
        assert_eq!(snippets[0].code, "with entry {\n    print(\"x\");\n}\n");
        assert_eq!(snippets[0].line, 4);
    }

    #[test]
    fn test_other_divs_ignored() {
        let page = "<div class=\"note\">\n\n```jac\nx\n```\n\n</div>\n";
        assert!(extract_snippets(page).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_modifier_runs_only() {
        let page = "<div class=\"code-block sparkle\">\n\n```jac\nx = 1;\n```\n\n</div>\n";
        let snippets = extract_snippets(page).unwrap();
        assert_eq!(snippets[0].modifier, None);
        assert_eq!(snippets[0].actions, vec![Run]);
    }

    #[test]
    fn test_unsupported_language() {
        let page = "\n```ruby runnable\nputs 1\n```\n";
        assert_eq!(
            extract_snippets(page).unwrap_err(),
            SnippetError::UnknownLanguage {
                line: 2,
                name: "ruby".into()
            }
        );
    }

    #[test]
    fn test_select() {
        let snippets = extract_snippets("```jac runnable\nx\n```\n").unwrap();
        assert!(select(&snippets, 0).is_ok());
        assert_eq!(
            select(&snippets, 3).unwrap_err(),
            SnippetError::NotFound { index: 3, count: 1 }
        );
    }
}
