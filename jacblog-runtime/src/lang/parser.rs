use super::ast::*;
use super::error::{ScriptError, ScriptResult};
use super::lexer::{tokenize, SpannedToken, Token};
use jacblog_types::Language;
use std::rc::Rc;

/// Parse snippet source into a module
pub fn parse(source: &str, language: Language) -> ScriptResult<Module> {
    let tokens = tokenize(source, language)?;
    Parser::new(&tokens, language).parse_module()
}

/// Recursive-descent parser over a token slice
pub struct Parser<'a> {
    tokens: &'a [SpannedToken],
    pos: usize,
    language: Language,
    loop_depth: usize,
    fn_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [SpannedToken], language: Language) -> Self {
        Self {
            tokens,
            pos: 0,
            language,
            loop_depth: 0,
            fn_depth: 0,
        }
    }

    fn current(&self) -> &SpannedToken {
        // Token streams always end in Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.current().token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].token
    }

    fn line(&self) -> usize {
        self.current().line
    }

    fn advance(&mut self) -> SpannedToken {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> ScriptResult<SpannedToken> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected {}, found {}",
                expected.describe(),
                self.peek().describe()
            )))
        }
    }

    fn expect_ident(&mut self) -> ScriptResult<String> {
        match self.peek().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!(
                "expected identifier, found {}",
                other.describe()
            ))),
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::syntax(self.line(), message)
    }

    fn skip_semis(&mut self) {
        while self.eat(&Token::Semi) {}
    }

    pub fn parse_module(&mut self) -> ScriptResult<Module> {
        let mut items = Vec::new();
        loop {
            self.skip_semis();
            if self.check(&Token::Eof) {
                break;
            }
            let item = match self.language {
                Language::Jac => self.parse_item()?,
                Language::Python if self.check(&Token::Def) => Item::Def(self.parse_def()?),
                Language::Python => Item::Stmt(self.parse_stmt()?),
            };
            items.push(item);
        }
        Ok(Module { items })
    }

    fn parse_item(&mut self) -> ScriptResult<Item> {
        match self.peek() {
            Token::Node => Ok(Item::Node(self.parse_node()?)),
            Token::Def => Ok(Item::Def(self.parse_def()?)),
            Token::Glob => {
                let line = self.advance().line;
                let mut bindings = Vec::new();
                loop {
                    let name = self.expect_ident()?;
                    self.expect(Token::Assign)?;
                    bindings.push((name, self.parse_expr()?));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::Semi)?;
                Ok(Item::Glob(bindings, line))
            }
            Token::Include => {
                let line = self.advance().line;
                let mut path = self.expect_ident()?;
                while self.eat(&Token::Dot) {
                    path.push('.');
                    path.push_str(&self.expect_ident()?);
                }
                self.expect(Token::Semi)?;
                Ok(Item::Include(path, line))
            }
            Token::With => {
                self.advance();
                self.expect(Token::Entry)?;
                Ok(Item::Entry(self.parse_block()?))
            }
            other => Err(self.error(format!(
                "expected a declaration or 'with entry' block, found {}",
                other.describe()
            ))),
        }
    }

    fn parse_node(&mut self) -> ScriptResult<Rc<NodeDecl>> {
        let line = self.expect(Token::Node)?.line;
        let name = self.expect_ident()?;
        self.expect(Token::LBrace)?;
        let mut fields = Vec::new();
        loop {
            self.skip_semis();
            if self.eat(&Token::RBrace) {
                break;
            }
            self.expect(Token::Has)?;
            loop {
                let field = self.expect_ident()?;
                if self.eat(&Token::Colon) {
                    self.parse_type()?;
                }
                let default = if self.eat(&Token::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                fields.push(FieldDecl {
                    name: field,
                    default,
                });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::Semi)?;
        }
        Ok(Rc::new(NodeDecl { name, fields, line }))
    }

    /// Type annotations are parsed and discarded
    fn parse_type(&mut self) -> ScriptResult<()> {
        if !self.eat(&Token::None) {
            self.expect_ident()?;
            while self.eat(&Token::Dot) {
                self.expect_ident()?;
            }
        }
        if self.eat(&Token::LBracket) {
            loop {
                self.parse_type()?;
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RBracket)?;
        }
        Ok(())
    }

    fn parse_def(&mut self) -> ScriptResult<Rc<FuncDecl>> {
        let line = self.expect(Token::Def)?.line;
        let name = self.expect_ident()?;
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            let param = self.expect_ident()?;
            if self.eat(&Token::Colon) {
                self.parse_type()?;
            }
            let default = if self.eat(&Token::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|p: &Param| p.default.is_some()) {
                return Err(self.error("non-default argument follows default argument"));
            }
            params.push(Param {
                name: param,
                default,
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        if self.eat(&Token::Arrow) {
            self.parse_type()?;
        }

        let saved_loops = std::mem::take(&mut self.loop_depth);
        self.fn_depth += 1;
        let body = self.parse_block();
        self.fn_depth -= 1;
        self.loop_depth = saved_loops;

        Ok(Rc::new(FuncDecl {
            name,
            params,
            body: body?,
            line,
        }))
    }

    fn parse_block(&mut self) -> ScriptResult<Vec<Stmt>> {
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        loop {
            self.skip_semis();
            if self.eat(&Token::RBrace) {
                break;
            }
            if self.check(&Token::Eof) {
                return Err(self.error("expected '}', found end of input"));
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_loop_body(&mut self) -> ScriptResult<Vec<Stmt>> {
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        body
    }

    pub fn parse_stmt(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        let kind = match self.peek() {
            Token::If => self.parse_if()?,
            Token::While => {
                self.advance();
                let cond = self.parse_expr()?;
                StmtKind::While(cond, self.parse_loop_body()?)
            }
            Token::For => {
                self.advance();
                let name = self.expect_ident()?;
                self.expect(Token::In)?;
                let iter = self.parse_expr()?;
                StmtKind::For(name, iter, self.parse_loop_body()?)
            }
            Token::Def => StmtKind::Def(self.parse_def()?),
            Token::Return => {
                if self.fn_depth == 0 {
                    return Err(self.error("'return' outside function"));
                }
                self.advance();
                let value = if self.check(&Token::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(Token::Semi)?;
                StmtKind::Return(value)
            }
            Token::Break | Token::Continue => {
                let token = self.advance();
                if self.loop_depth == 0 {
                    return Err(ScriptError::syntax(
                        token.line,
                        format!("{} outside loop", token.token.describe()),
                    ));
                }
                self.expect(Token::Semi)?;
                if token.token == Token::Break {
                    StmtKind::Break
                } else {
                    StmtKind::Continue
                }
            }
            Token::Pass => {
                self.advance();
                self.expect(Token::Semi)?;
                StmtKind::Pass
            }
            _ => self.parse_simple_stmt()?,
        };
        Ok(Stmt { kind, line })
    }

    fn parse_if(&mut self) -> ScriptResult<StmtKind> {
        self.expect(Token::If)?;
        let mut branches = vec![(self.parse_expr()?, self.parse_block()?)];
        while self.eat(&Token::Elif) {
            branches.push((self.parse_expr()?, self.parse_block()?));
        }
        let orelse = if self.eat(&Token::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(StmtKind::If { branches, orelse })
    }

    fn parse_simple_stmt(&mut self) -> ScriptResult<StmtKind> {
        let expr = self.parse_expr()?;
        let kind = match self.peek() {
            Token::Assign => {
                self.advance();
                let target = self.to_target(expr)?;
                StmtKind::Assign(target, self.parse_expr()?)
            }
            Token::PlusAssign | Token::MinusAssign | Token::StarAssign | Token::SlashAssign => {
                let op = match self.advance().token {
                    Token::PlusAssign => BinOp::Add,
                    Token::MinusAssign => BinOp::Sub,
                    Token::StarAssign => BinOp::Mul,
                    _ => BinOp::Div,
                };
                let target = self.to_target(expr)?;
                StmtKind::AugAssign(target, op, self.parse_expr()?)
            }
            Token::Colon => {
                self.advance();
                let Expr::Name(name) = expr else {
                    return Err(self.error("only names can be annotated"));
                };
                self.parse_type()?;
                if self.eat(&Token::Assign) {
                    StmtKind::Assign(Target::Name(name), self.parse_expr()?)
                } else {
                    StmtKind::Pass
                }
            }
            _ => StmtKind::Expr(expr),
        };
        self.expect(Token::Semi)?;
        Ok(kind)
    }

    fn to_target(&self, expr: Expr) -> ScriptResult<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Attr(obj, name) => Ok(Target::Attr(*obj, name)),
            Expr::Index(obj, index) => Ok(Target::Index(*obj, *index)),
            _ => Err(self.error("cannot assign to expression")),
        }
    }

    pub fn parse_expr(&mut self) -> ScriptResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ScriptResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) || self.eat(&Token::OrOr) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ScriptResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) || self.eat(&Token::AndAnd) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ScriptResult<Expr> {
        if self.eat(&Token::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary(UnOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ScriptResult<Expr> {
        let mut left = self.parse_connect()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinOp::Eq,
                Token::NotEq => BinOp::Ne,
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                Token::In => BinOp::In,
                Token::Not if *self.peek_at(1) == Token::In => BinOp::NotIn,
                _ => break,
            };
            self.advance();
            if op == BinOp::NotIn {
                self.advance();
            }
            let right = self.parse_connect()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_connect(&mut self) -> ScriptResult<Expr> {
        let mut left = self.parse_additive()?;
        while self.eat(&Token::Connect) {
            let right = self.parse_additive()?;
            left = Expr::Connect(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ScriptResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> ScriptResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::SlashSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ScriptResult<Expr> {
        let op = match self.peek() {
            Token::Minus => UnOp::Neg,
            Token::Plus => UnOp::Pos,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_power(&mut self) -> ScriptResult<Expr> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::StarStar) {
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), BinOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::LParen) {
                let args = self.parse_args()?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.eat(&Token::Dot) {
                let name = self.expect_ident()?;
                expr = Expr::Attr(Box::new(expr), name);
            } else if self.eat(&Token::LBracket) {
                let index = self.parse_expr()?;
                self.expect(Token::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> ScriptResult<Vec<Arg>> {
        let mut args = Vec::new();
        while !self.check(&Token::RParen) {
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Token::Identifier(name), Token::Assign) => Some(name.clone()),
                _ => None,
            };
            let arg = if let Some(name) = keyword {
                self.advance();
                self.advance();
                Arg {
                    name: Some(name),
                    value: self.parse_expr()?,
                }
            } else {
                if args.iter().any(|a: &Arg| a.name.is_some()) {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                Arg {
                    name: None,
                    value: self.parse_expr()?,
                }
            };
            args.push(arg);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> ScriptResult<Expr> {
        let token = self.advance();
        match token.token {
            Token::Int(v) => Ok(Expr::Int(v)),
            Token::Float(v) => Ok(Expr::Float(v)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::FString(raw) => Ok(Expr::FString(parse_fstring(&raw, token.line)?)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::None => Ok(Expr::None),
            Token::Identifier(name) => Ok(Expr::Name(name)),
            Token::LParen => {
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                if self.eat(&Token::RBracket) {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.eat(&Token::EdgeRef) {
                    self.expect(Token::RBracket)?;
                    return Ok(Expr::EdgeRef(Box::new(first)));
                }
                let mut items = vec![first];
                while self.eat(&Token::Comma) {
                    if self.check(&Token::RBracket) {
                        break;
                    }
                    items.push(self.parse_expr()?);
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::List(items))
            }
            other => Err(ScriptError::syntax(
                token.line,
                format!("invalid syntax: unexpected {}", other.describe()),
            )),
        }
    }
}

/// Split an f-string body into literal and interpolated parts
fn parse_fstring(raw: &str, line: usize) -> ScriptResult<Vec<FPart>> {
    let chars: Vec<char> = raw.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '}' => return Err(ScriptError::syntax(line, "f-string: single '}' is not allowed")),
            '{' => {
                let end = matching_brace(&chars, i)
                    .ok_or_else(|| ScriptError::syntax(line, "f-string: expecting '}'"))?;
                let inner: String = chars[i + 1..end].iter().collect();
                let (source, spec) = split_format_spec(&inner);
                if source.trim().is_empty() {
                    return Err(ScriptError::syntax(
                        line,
                        "f-string: empty expression not allowed",
                    ));
                }

                let tokens = tokenize(source, Language::Jac).map_err(|e| e.at_line(line))?;
                let mut parser = Parser::new(&tokens, Language::Jac);
                let expr = parser.parse_expr().map_err(|e| e.at_line(line))?;
                if !parser.check(&Token::Eof) {
                    return Err(ScriptError::syntax(line, "f-string: invalid expression"));
                }

                if !literal.is_empty() {
                    parts.push(FPart::Lit(std::mem::take(&mut literal)));
                }
                parts.push(FPart::Expr(expr, spec.map(str::to_string)));
                i = end + 1;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    if !literal.is_empty() {
        parts.push(FPart::Lit(literal));
    }
    Ok(parts)
}

fn matching_brace(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (offset, &c) in chars[open..].iter().enumerate() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_format_spec(inner: &str) -> (&str, Option<&str>) {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in inner.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ':' if depth == 0 => return (&inner[..i], Some(&inner[i + 1..])),
            _ => {}
        }
    }
    (inner, None)
}
