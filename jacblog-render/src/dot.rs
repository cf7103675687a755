//! Parser for the graph-description language
//!
//! Supports the subset emitted by the runtime plus common hand-written input:
//! `graph`/`digraph` with an optional id, node and edge statements, edge
//! chains, attribute lists, `graph`/`node`/`edge` default attribute
//! statements, top-level `key = value` attributes, anonymous or named
//! subgraph blocks (flattened), ports (ignored), and comments.

use logos::Logos;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DotError {
    #[error("unexpected character at byte {0}")]
    Lex(usize),

    #[error("expected {expected}, found {found} at byte {offset}")]
    Unexpected {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("edge operator '{found}' does not match a {kind}")]
    EdgeOperator { found: &'static str, kind: &'static str },

    #[error("unexpected end of input")]
    Eof,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"#[^\n]*")]
enum Token {
    /// `/* ... */`, never emitted
    #[token("/*", block_comment)]
    BlockComment,

    #[regex("(?i)strict")]
    Strict,
    #[regex("(?i)graph")]
    Graph,
    #[regex("(?i)digraph")]
    Digraph,
    #[regex("(?i)node")]
    Node,
    #[regex("(?i)edge")]
    Edge,
    #[regex("(?i)subgraph")]
    Subgraph,

    #[regex(r"[A-Za-z_\u{80}-\u{10FFFF}][A-Za-z0-9_\u{80}-\u{10FFFF}]*", |lex| lex.slice().to_string())]
    #[regex(r"-?(\.[0-9]+|[0-9]+(\.[0-9]*)?)", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r#""([^"\\]|\\(.|\n))*""#, |lex| unquote(lex.slice()))]
    Quoted(String),

    #[token("<", html_string)]
    Html(String),

    #[token("->")]
    DirectedEdge,
    #[token("--")]
    UndirectedEdge,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token("=")]
    Equals,
    #[token(":")]
    Colon,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) | Token::Quoted(s) | Token::Html(s) => write!(f, "'{}'", s),
            Token::DirectedEdge => f.write_str("'->'"),
            Token::UndirectedEdge => f.write_str("'--'"),
            Token::LBrace => f.write_str("'{'"),
            Token::RBrace => f.write_str("'}'"),
            Token::LBracket => f.write_str("'['"),
            Token::RBracket => f.write_str("']'"),
            Token::Semi => f.write_str("';'"),
            Token::Comma => f.write_str("','"),
            Token::Equals => f.write_str("'='"),
            Token::Colon => f.write_str("':'"),
            keyword => write!(f, "keyword {:?}", keyword),
        }
    }
}

/// Strip quotes; only `\"` is an escape, other sequences are kept for labels
fn unquote(slice: &str) -> String {
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('\\', Some('"')) => {
                out.push('"');
                chars.next();
            }
            ('\\', Some('\n')) => {
                // Line continuation
                chars.next();
            }
            ('\\', Some(&next)) => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// `<...>` with balanced angle brackets
fn html_string(lex: &mut logos::Lexer<Token>) -> Option<String> {
    let mut depth = 1usize;
    for (i, c) in lex.remainder().char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth == 0 {
                    let body = lex.remainder()[..i].to_string();
                    lex.bump(i + 1);
                    return Some(body);
                }
            }
            _ => {}
        }
    }
    None
}

/// Skip to the closing `*/`; an unterminated comment is a lex error
fn block_comment(lex: &mut logos::Lexer<Token>) -> logos::FilterResult<(), ()> {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            logos::FilterResult::Skip
        }
        None => logos::FilterResult::Error(()),
    }
}

/// Resolve label escapes: `\n` `\l` `\r` are line breaks, `\\` a backslash
pub fn label_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'l' | 'r') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

pub type Attrs = Vec<(String, String)>;

fn attr<'a>(attrs: &'a Attrs, key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn merge(into: &mut Attrs, from: &Attrs) {
    for (k, v) in from {
        match into.iter_mut().find(|(key, _)| key == k) {
            Some(slot) => slot.1 = v.clone(),
            None => into.push((k.clone(), v.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DotNode {
    pub id: String,
    pub attrs: Attrs,
}

impl DotNode {
    pub fn attr(&self, key: &str) -> Option<&str> {
        attr(&self.attrs, key)
    }

    /// Display text: the `label` attribute with escapes resolved, else the id
    pub fn label(&self) -> String {
        match self.attr("label") {
            Some(raw) => label_text(raw),
            None => self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DotEdge {
    pub from: String,
    pub to: String,
    pub attrs: Attrs,
}

impl DotEdge {
    pub fn attr(&self, key: &str) -> Option<&str> {
        attr(&self.attrs, key)
    }
}

/// Direction ranks are laid out in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankDir {
    #[default]
    TopBottom,
    LeftRight,
    BottomTop,
    RightLeft,
}

impl RankDir {
    fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "LR" => RankDir::LeftRight,
            "BT" => RankDir::BottomTop,
            "RL" => RankDir::RightLeft,
            _ => RankDir::TopBottom,
        }
    }

    pub fn is_horizontal(&self) -> bool {
        matches!(self, RankDir::LeftRight | RankDir::RightLeft)
    }
}

/// A parsed graph; nodes keep first-mention order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DotGraph {
    pub directed: bool,
    pub strict: bool,
    pub id: Option<String>,
    pub attrs: Attrs,
    pub nodes: Vec<DotNode>,
    pub edges: Vec<DotEdge>,
}

impl DotGraph {
    pub fn rankdir(&self) -> RankDir {
        attr(&self.attrs, "rankdir")
            .map(RankDir::parse)
            .unwrap_or_default()
    }

    pub fn node(&self, id: &str) -> Option<&DotNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Parse a complete graph document
pub fn parse(input: &str) -> Result<DotGraph, DotError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(input);
    while let Some(token) = lexer.next() {
        match token {
            Ok(token) => tokens.push((token, lexer.span().start)),
            Err(()) => return Err(DotError::Lex(lexer.span().start)),
        }
    }
    Parser {
        tokens,
        pos: 0,
        end: input.len(),
        graph: DotGraph::default(),
        index: HashMap::new(),
        node_defaults: Vec::new(),
        edge_defaults: Vec::new(),
    }
    .parse_graph()
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
    graph: DotGraph,
    index: HashMap<String, usize>,
    node_defaults: Attrs,
    edge_defaults: Attrs,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, o)| *o).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> DotError {
        match self.peek() {
            Some(found) => DotError::Unexpected {
                expected: expected.to_string(),
                found: found.to_string(),
                offset: self.offset(),
            },
            None => DotError::Eof,
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), DotError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn id(&mut self) -> Option<String> {
        match self.peek() {
            Some(Token::Ident(_) | Token::Quoted(_) | Token::Html(_)) => match self.advance() {
                Some(Token::Ident(s) | Token::Quoted(s) | Token::Html(s)) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    fn expect_id(&mut self) -> Result<String, DotError> {
        self.id().ok_or_else(|| self.unexpected("an identifier"))
    }

    fn parse_graph(mut self) -> Result<DotGraph, DotError> {
        self.graph.strict = self.eat(&Token::Strict);
        self.graph.directed = match self.advance() {
            Some(Token::Digraph) => true,
            Some(Token::Graph) => false,
            _ => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.unexpected("'graph' or 'digraph'"));
            }
        };
        self.graph.id = self.id();
        self.expect(Token::LBrace, "'{'")?;
        self.parse_stmts()?;
        if self.peek().is_some() {
            return Err(self.unexpected("end of input"));
        }
        Ok(self.graph)
    }

    /// Statements up to and including the closing brace
    fn parse_stmts(&mut self) -> Result<(), DotError> {
        loop {
            match self.peek() {
                None => return Err(DotError::Eof),
                Some(Token::RBrace) => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(Token::Semi) => {
                    self.pos += 1;
                }
                Some(_) => self.parse_stmt()?,
            }
        }
    }

    fn parse_stmt(&mut self) -> Result<(), DotError> {
        match self.peek() {
            Some(Token::Graph) => {
                self.pos += 1;
                let attrs = self.parse_attr_lists()?;
                merge(&mut self.graph.attrs, &attrs);
            }
            Some(Token::Node) => {
                self.pos += 1;
                let attrs = self.parse_attr_lists()?;
                merge(&mut self.node_defaults, &attrs);
            }
            Some(Token::Edge) => {
                self.pos += 1;
                let attrs = self.parse_attr_lists()?;
                merge(&mut self.edge_defaults, &attrs);
            }
            Some(Token::Subgraph | Token::LBrace) => {
                self.parse_subgraph()?;
            }
            _ => {
                let first = self.expect_id()?;
                if self.eat(&Token::Equals) {
                    let value = self.expect_id()?;
                    merge(&mut self.graph.attrs, &vec![(first, value)]);
                } else {
                    self.skip_port()?;
                    self.parse_node_or_edge(first)?;
                }
            }
        }
        Ok(())
    }

    /// Subgraph contents are flattened into the parent graph
    fn parse_subgraph(&mut self) -> Result<(), DotError> {
        if self.eat(&Token::Subgraph) {
            self.id();
        }
        self.expect(Token::LBrace, "'{'")?;
        let saved = (self.node_defaults.clone(), self.edge_defaults.clone());
        let result = self.parse_stmts();
        (self.node_defaults, self.edge_defaults) = saved;
        result
    }

    fn skip_port(&mut self) -> Result<(), DotError> {
        while self.eat(&Token::Colon) {
            self.expect_id()?;
        }
        Ok(())
    }

    fn parse_node_or_edge(&mut self, first: String) -> Result<(), DotError> {
        let mut chain = vec![first];
        loop {
            let directed = match self.peek() {
                Some(Token::DirectedEdge) => true,
                Some(Token::UndirectedEdge) => false,
                _ => break,
            };
            if directed != self.graph.directed {
                return Err(DotError::EdgeOperator {
                    found: if directed { "->" } else { "--" },
                    kind: if self.graph.directed { "digraph" } else { "graph" },
                });
            }
            self.pos += 1;
            chain.push(self.expect_id()?);
            self.skip_port()?;
        }
        let attrs = self.parse_attr_lists()?;

        if chain.len() == 1 {
            let index = self.touch_node(&chain[0]);
            merge(&mut self.graph.nodes[index].attrs, &attrs);
            return Ok(());
        }

        for id in &chain {
            self.touch_node(id);
        }
        let mut edge_attrs = self.edge_defaults.clone();
        merge(&mut edge_attrs, &attrs);
        for pair in chain.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            if self.graph.strict
                && self
                    .graph
                    .edges
                    .iter()
                    .any(|e| &e.from == from && &e.to == to)
            {
                continue;
            }
            self.graph.edges.push(DotEdge {
                from: from.clone(),
                to: to.clone(),
                attrs: edge_attrs.clone(),
            });
        }
        Ok(())
    }

    /// Index of a node, declaring it with the current defaults on first use
    fn touch_node(&mut self, id: &str) -> usize {
        if let Some(&index) = self.index.get(id) {
            return index;
        }
        self.graph.nodes.push(DotNode {
            id: id.to_string(),
            attrs: self.node_defaults.clone(),
        });
        let index = self.graph.nodes.len() - 1;
        self.index.insert(id.to_string(), index);
        index
    }

    /// Zero or more `[k=v, ...]` lists
    fn parse_attr_lists(&mut self) -> Result<Attrs, DotError> {
        let mut attrs = Attrs::new();
        while self.eat(&Token::LBracket) {
            loop {
                if self.eat(&Token::RBracket) {
                    break;
                }
                let key = self.expect_id()?;
                let value = if self.eat(&Token::Equals) {
                    self.expect_id()?
                } else {
                    "true".to_string()
                };
                attrs.push((key, value));
                if !self.eat(&Token::Comma) {
                    self.eat(&Token::Semi);
                }
            }
        }
        Ok(attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNTIME_OUTPUT: &str = "digraph {\n  node [shape=\"ellipse\", style=\"filled\", fillcolor=\"#eef2ff\"];\n  0 [label=\"Root()\"];\n  1 [label=\"Person(name='Alice')\"];\n  0 -> 1;\n}\n";

    #[test]
    fn test_runtime_output() {
        let graph = parse(RUNTIME_OUTPUT).unwrap();
        assert!(graph.directed);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[1].label(), "Person(name='Alice')");
        assert_eq!(graph.nodes[1].attr("fillcolor"), Some("#eef2ff"));
        assert_eq!(graph.edges.len(), 1);
        assert_eq!((graph.edges[0].from.as_str(), graph.edges[0].to.as_str()), ("0", "1"));
    }

    #[test]
    fn test_edge_chain_and_attrs() {
        let graph = parse("digraph G { rankdir=LR; a -> b -> c [color=red]; }").unwrap();
        assert_eq!(graph.id.as_deref(), Some("G"));
        assert_eq!(graph.rankdir(), RankDir::LeftRight);
        assert_eq!(graph.edges.len(), 2);
        assert!(graph.edges.iter().all(|e| e.attr("color") == Some("red")));
        let ids: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_quoted_ids_and_escapes() {
        let graph = parse(r#"digraph { "a b" [label="say \"hi\"\nthere"]; }"#).unwrap();
        assert_eq!(graph.nodes[0].id, "a b");
        assert_eq!(graph.nodes[0].label(), "say \"hi\"\nthere");
    }

    #[test]
    fn test_comments_and_subgraphs() {
        let source = "/* header */\ngraph {\n  // nodes\n  subgraph cluster_x { a -- b }\n  c;\n}";
        let graph = parse(source).unwrap();
        assert!(!graph.directed);
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_block_comments_anywhere() {
        let graph = parse("/* a -> b */ digraph { x /* inline\n * spanning */ -> y; }").unwrap();
        assert!(graph.directed);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges[0].from, "x");
        assert_eq!(graph.edges[0].to, "y");

        assert_eq!(parse("digraph { a /* open").unwrap_err(), DotError::Lex(12));
    }

    #[test]
    fn test_defaults_apply_to_later_nodes() {
        let graph = parse("digraph { a; node [shape=box]; b; }").unwrap();
        assert_eq!(graph.node("a").and_then(|n| n.attr("shape")), None);
        assert_eq!(graph.node("b").and_then(|n| n.attr("shape")), Some("box"));
    }

    #[test]
    fn test_wrong_edge_operator() {
        let err = parse("graph { a -> b }").unwrap_err();
        assert!(matches!(err, DotError::EdgeOperator { .. }));
    }

    #[test]
    fn test_truncated_input() {
        assert_eq!(parse("digraph { a -> ").unwrap_err(), DotError::Eof);
        assert!(parse("not a graph").is_err());
    }
}
