//! Page rendering with highlighted snippet source.
//!
//! Fenced blocks whose info string names a snippet language (`jac`,
//! `python`, `py`) are replaced by the runtime's highlighted markup; every
//! other event passes through to the stock HTML writer.

use jacblog_runtime::lang::highlight_code;
use jacblog_types::Language;
use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};

fn fence_language(info: &str) -> Option<Language> {
    info.split_whitespace().next()?.parse().ok()
}

/// Render a markdown page to HTML with snippet fences highlighted
pub fn render_page(markdown: &str) -> String {
    let mut events = Vec::new();
    let mut block: Option<(Language, String)> = None;

    for event in Parser::new_ext(markdown, Options::empty()) {
        if let Some((language, source)) = block.as_mut() {
            match event {
                Event::Text(text) => source.push_str(&text),
                Event::End(TagEnd::CodeBlock) => {
                    let markup = highlight_code(source, *language);
                    events.push(Event::Html(CowStr::from(markup)));
                    block = None;
                }
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                match fence_language(&info) {
                    Some(language) => block = Some((language, String::new())),
                    None => events.push(Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info)))),
                }
            }
            other => events.push(other),
        }
    }

    let mut out = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut out, events.into_iter());
    out
}
