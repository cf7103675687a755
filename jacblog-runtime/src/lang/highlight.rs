//! Syntax highlighting for snippet source
//!
//! Runs the interpreter's own lexer over the text and wraps each token in a
//! `<span>` with a short Pygments class (`k`, `nf`, `s`, `c`, ...), so page
//! stylesheets written for Pygments output apply unchanged. Whitespace,
//! comments and anything the lexer rejects are kept, so the highlighted text
//! always reads exactly like the source.

use super::builtins::Builtin;
use super::lexer::Token;
use jacblog_types::Language;
use logos::Logos;

fn class_of(token: &Token, previous: Option<&Token>) -> Option<&'static str> {
    let class = match token {
        Token::True | Token::False | Token::None => "kc",
        Token::Node
        | Token::Has
        | Token::Def
        | Token::With
        | Token::Entry
        | Token::Glob
        | Token::Include
        | Token::If
        | Token::Elif
        | Token::Else
        | Token::While
        | Token::For
        | Token::In
        | Token::Return
        | Token::Break
        | Token::Continue
        | Token::Pass
        | Token::And
        | Token::Or
        | Token::Not => "k",
        Token::Identifier(name) => match previous {
            Some(Token::Def) => "nf",
            Some(Token::Node) => "nc",
            _ if name == "root" || Builtin::lookup(name).is_some() => "nb",
            _ => "n",
        },
        Token::Int(_) => "mi",
        Token::Float(_) => "mf",
        Token::Str(_) | Token::FString(_) => "s",
        Token::LParen
        | Token::RParen
        | Token::LBracket
        | Token::RBracket
        | Token::LBrace
        | Token::RBrace
        | Token::Comma
        | Token::Colon
        | Token::Semi
        | Token::Dot => "p",
        Token::Newline | Token::BlockComment | Token::Eof => return None,
        _ => "o",
    };
    Some(class)
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

fn push_span(out: &mut String, class: &str, text: &str) {
    out.push_str("<span class=\"");
    out.push_str(class);
    out.push_str("\">");
    escape_into(out, text);
    out.push_str("</span>");
}

/// Text the lexer skipped: whitespace, continuations and comments
fn push_gap(out: &mut String, gap: &str, language: Language) {
    let mut rest = gap;
    while let Some(start) = rest.find('#') {
        escape_into(out, &rest[..start]);
        let comment = &rest[start..];
        let len = if language == Language::Jac && comment.starts_with("#*") {
            comment[2..].find("*#").map_or(comment.len(), |end| end + 4)
        } else {
            comment.find('\n').unwrap_or(comment.len())
        };
        push_span(out, "c", &comment[..len]);
        rest = &comment[len..];
    }
    escape_into(out, rest);
}

/// Render `source` as a highlighted `<pre>` block
pub fn highlight_code(source: &str, language: Language) -> String {
    let mut out = String::with_capacity(source.len() * 2);
    out.push_str("<pre class=\"highlight\"><code class=\"language-");
    out.push_str(language.as_str());
    out.push_str("\">");

    let mut lex = Token::lexer_with_extras(source, language);
    let mut cursor = 0;
    let mut previous: Option<Token> = None;
    while let Some(result) = lex.next() {
        let span = lex.span();
        push_gap(&mut out, &source[cursor..span.start], language);
        let text = &source[span.clone()];
        match result {
            Ok(token) => {
                match class_of(&token, previous.as_ref()) {
                    Some(class) => push_span(&mut out, class, text),
                    None => escape_into(&mut out, text),
                }
                if token != Token::Newline {
                    previous = Some(token);
                }
            }
            // Unterminated block comment
            Err(()) if text.starts_with("#*") => push_span(&mut out, "c", text),
            Err(()) => push_span(&mut out, "err", text),
        }
        cursor = span.end;
    }
    push_gap(&mut out, &source[cursor..], language);

    out.push_str("</code></pre>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_classes() {
        let html = highlight_code("node Person { has name: str; }", Language::Jac);
        assert!(html.starts_with("<pre class=\"highlight\"><code class=\"language-jac\">"));
        assert!(html.contains("<span class=\"k\">node</span> <span class=\"nc\">Person</span>"));
        assert!(html.contains("<span class=\"k\">has</span>"));
        assert!(html.contains("<span class=\"p\">;</span>"));
        assert!(html.ends_with("</code></pre>"));
    }

    #[test]
    fn test_functions_builtins_and_literals() {
        let html = highlight_code("def add(x: int) -> int { return x + 1.5; }\nprint(\"hi\", None)", Language::Jac);
        assert!(html.contains("<span class=\"nf\">add</span>"));
        assert!(html.contains("<span class=\"o\">-&gt;</span>"));
        assert!(html.contains("<span class=\"mf\">1.5</span>"));
        assert!(html.contains("<span class=\"nb\">print</span>"));
        assert!(html.contains("<span class=\"s\">&quot;hi&quot;</span>"));
        assert!(html.contains("<span class=\"kc\">None</span>"));
    }

    #[test]
    fn test_comments_and_whitespace_are_kept() {
        let source = "x = 1  # note\n#* block\n   comment *# y";
        let html = highlight_code(source, Language::Jac);
        assert!(html.contains("<span class=\"c\"># note</span>\n"));
        assert!(html.contains("<span class=\"c\">#* block\n   comment *#</span> <span class=\"n\">y</span>"));
        assert!(html.contains("<span class=\"mi\">1</span>  "));
    }

    #[test]
    fn test_text_round_trips() {
        let source = "if a < b:\n    print('x & y')  # c\n";
        let html = highlight_code(source, Language::Python);
        let body = html
            .trim_start_matches("<pre class=\"highlight\"><code class=\"language-python\">")
            .trim_end_matches("</code></pre>");

        let mut text = String::new();
        let mut in_tag = false;
        for c in body.chars() {
            match c {
                '<' => in_tag = true,
                '>' if in_tag => in_tag = false,
                c if !in_tag => text.push(c),
                _ => {}
            }
        }
        let text = text
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&");
        assert_eq!(text, source);
    }

    #[test]
    fn test_invalid_input_is_marked_not_dropped() {
        let html = highlight_code("x = $", Language::Jac);
        assert!(html.contains("<span class=\"err\">$</span>"));

        let html = highlight_code("x #* open", Language::Jac);
        assert!(html.contains("<span class=\"c\">#* open</span>"));
    }
}
