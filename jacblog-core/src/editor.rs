//! Editor surface: one editable buffer per runnable snippet.

use crate::snippets::{extract_snippets, Snippet, SnippetError};
use jacblog_types::{ExecutionRequest, SnippetAction};
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EditorError {
    #[error("offset {offset} is past the end of the text ({len} bytes)")]
    OutOfBounds { offset: usize, len: usize },

    #[error("offset {0} is not on a character boundary")]
    NotCharBoundary(usize),

    #[error("range {start}..{end} is reversed")]
    ReversedRange { start: usize, end: usize },

    #[error("this snippet does not offer the {0:?} action")]
    ActionNotOffered(SnippetAction),

    #[error("no editor with index {index} (surface has {count})")]
    NoSuchEditor { index: usize, count: usize },
}

/// Editable text of one snippet, remembering what the page shipped
#[derive(Debug, Clone)]
pub struct SnippetEditor {
    snippet: Snippet,
    text: String,
}

impl SnippetEditor {
    pub fn new(snippet: Snippet) -> Self {
        let text = snippet.code.clone();
        Self { snippet, text }
    }

    pub fn snippet(&self) -> &Snippet {
        &self.snippet
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn actions(&self) -> &[SnippetAction] {
        &self.snippet.actions
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    fn check_offset(&self, offset: usize) -> Result<(), EditorError> {
        if offset > self.text.len() {
            return Err(EditorError::OutOfBounds {
                offset,
                len: self.text.len(),
            });
        }
        if !self.text.is_char_boundary(offset) {
            return Err(EditorError::NotCharBoundary(offset));
        }
        Ok(())
    }

    pub fn insert(&mut self, offset: usize, text: &str) -> Result<(), EditorError> {
        self.check_offset(offset)?;
        self.text.insert_str(offset, text);
        Ok(())
    }

    /// Remove a byte range; returns the removed text
    pub fn delete(&mut self, range: Range<usize>) -> Result<String, EditorError> {
        if range.start > range.end {
            return Err(EditorError::ReversedRange {
                start: range.start,
                end: range.end,
            });
        }
        self.check_offset(range.start)?;
        self.check_offset(range.end)?;
        Ok(self.text.drain(range).collect())
    }

    /// Discard edits
    pub fn reset(&mut self) {
        self.text.clone_from(&self.snippet.code);
    }

    pub fn is_dirty(&self) -> bool {
        self.text != self.snippet.code
    }

    /// Request carrying the current text for one of the offered actions
    pub fn request(&self, action: SnippetAction) -> Result<ExecutionRequest, EditorError> {
        if !self.snippet.actions.contains(&action) {
            return Err(EditorError::ActionNotOffered(action));
        }
        Ok(ExecutionRequest::new(
            self.text.clone(),
            action.command(),
            self.snippet.language,
        ))
    }
}

/// All editors on a page, in document order
#[derive(Debug, Clone, Default)]
pub struct EditorSurface {
    editors: Vec<SnippetEditor>,
}

impl EditorSurface {
    pub fn new(snippets: Vec<Snippet>) -> Self {
        Self {
            editors: snippets.into_iter().map(SnippetEditor::new).collect(),
        }
    }

    pub fn from_markdown(markdown: &str) -> Result<Self, SnippetError> {
        Ok(Self::new(extract_snippets(markdown)?))
    }

    pub fn len(&self) -> usize {
        self.editors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.editors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnippetEditor> {
        self.editors.iter()
    }

    pub fn get(&self, index: usize) -> Result<&SnippetEditor, EditorError> {
        let count = self.editors.len();
        self.editors
            .get(index)
            .ok_or(EditorError::NoSuchEditor { index, count })
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut SnippetEditor, EditorError> {
        let count = self.editors.len();
        self.editors
            .get_mut(index)
            .ok_or(EditorError::NoSuchEditor { index, count })
    }

    pub fn request(
        &self,
        index: usize,
        action: SnippetAction,
    ) -> Result<ExecutionRequest, EditorError> {
        self.get(index)?.request(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacblog_types::{CommandKind, Language};

    const PAGE: &str = "```jac runnable\nwith entry { print(\"héllo\"); }\n```\n\n<div class=\"code-block python serve-only\">\n\n```\nprint(1)\n```\n\n</div>\n";

    fn surface() -> EditorSurface {
        EditorSurface::from_markdown(PAGE).unwrap()
    }

    #[test]
    fn test_edit_and_reset() {
        let mut surface = surface();
        let editor = surface.get_mut(0).unwrap();
        assert!(!editor.is_dirty());

        editor.insert(0, "# edited\n").unwrap();
        assert!(editor.text().starts_with("# edited\n"));
        assert!(editor.is_dirty());

        let removed = editor.delete(0..9).unwrap();
        assert_eq!(removed, "# edited\n");
        assert!(!editor.is_dirty());

        editor.set_text("something else");
        editor.reset();
        assert_eq!(editor.text(), editor.snippet().code);
    }

    #[test]
    fn test_offsets_must_be_char_boundaries() {
        let mut surface = surface();
        let editor = surface.get_mut(0).unwrap();
        let accent = editor.text().find('é').unwrap();
        assert_eq!(
            editor.insert(accent + 1, "x"),
            Err(EditorError::NotCharBoundary(accent + 1))
        );
        assert!(matches!(
            editor.delete(0..10_000),
            Err(EditorError::OutOfBounds { .. })
        ));
        assert!(matches!(
            editor.delete(5..2),
            Err(EditorError::ReversedRange { .. })
        ));
        assert!(!editor.is_dirty());
    }

    #[test]
    fn test_request_carries_current_text() {
        let mut surface = surface();
        surface.get_mut(1).unwrap().set_text("print(2)\n");

        let request = surface.request(1, SnippetAction::Serve).unwrap();
        assert_eq!(request.code, "print(2)\n");
        assert_eq!(request.command, CommandKind::Serve);
        assert_eq!(request.language, Language::Python);
    }

    #[test]
    fn test_action_must_be_offered() {
        let surface = surface();
        assert_eq!(
            surface.request(1, SnippetAction::Run),
            Err(EditorError::ActionNotOffered(SnippetAction::Run))
        );
        assert_eq!(
            surface.request(7, SnippetAction::Run),
            Err(EditorError::NoSuchEditor { index: 7, count: 2 })
        );
    }
}
