//! Tree-walking evaluator for both snippet dialects

use super::ast::*;
use super::builtins::Builtin;
use super::error::{ErrorKind, ScriptError, ScriptResult};
use super::graph::{Graph, NodeId};
use super::io::ScriptIo;
use super::parser::parse;
use super::value::{self, format_float, quote_str, Value};
use crate::vfs::{Vfs, LIB_PREFIX};
use jacblog_types::{Language, Stream};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::debug;

/// Deepest user-function nesting before `RecursionError`
pub const MAX_CALL_DEPTH: usize = 200;

/// Folder inside the support archive that holds the bundled library
const SUPPORT_FOLDER: &str = "jaclang";

/// Whether `with entry` blocks run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    Run,
    /// Load declarations only
    Serve,
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

struct Frame {
    name: String,
    locals: HashMap<String, Value>,
}

/// Values already on the repr stack
enum Seen {
    List(*const ()),
    Node(NodeId),
}

pub struct Interpreter<'a> {
    pub(super) io: &'a mut dyn ScriptIo,
    vfs: &'a Vfs,
    language: Language,
    globals: HashMap<String, Value>,
    frames: Vec<Frame>,
    graph: Graph,
    included: HashSet<String>,
    endpoints: Vec<String>,
}

impl<'a> Interpreter<'a> {
    pub fn new(io: &'a mut dyn ScriptIo, vfs: &'a Vfs, language: Language) -> Self {
        let mut globals = HashMap::new();
        if language == Language::Jac {
            globals.insert("root".to_string(), Value::Node(NodeId::ROOT));
        }
        Self {
            io,
            vfs,
            language,
            globals,
            frames: Vec::new(),
            graph: Graph::new(),
            included: HashSet::new(),
            endpoints: Vec::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Top-level functions of the main module, in declaration order
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Execute a parsed module
    pub fn run(&mut self, module: &Module, mode: EntryMode) -> ScriptResult<()> {
        self.exec_module(module, mode, true)
    }

    fn exec_module(&mut self, module: &Module, mode: EntryMode, main: bool) -> ScriptResult<()> {
        match self.language {
            Language::Jac => {
                // Declarations are visible to every entry block regardless of order
                for item in &module.items {
                    self.declare(item, main);
                }
                for item in &module.items {
                    match item {
                        Item::Glob(bindings, line) => {
                            for (name, expr) in bindings {
                                let value = self.eval(expr).map_err(|e| with_line(e, *line))?;
                                self.globals.insert(name.clone(), value);
                            }
                        }
                        Item::Include(path, line) => {
                            self.include(path).map_err(|e| with_line(e, *line))?
                        }
                        Item::Entry(body) if mode == EntryMode::Run => {
                            self.exec_block(body)?;
                        }
                        Item::Stmt(stmt) => {
                            self.exec_stmt(stmt)?;
                        }
                        _ => {}
                    }
                }
            }
            Language::Python => {
                for item in &module.items {
                    match item {
                        Item::Stmt(stmt) => {
                            self.exec_stmt(stmt)?;
                        }
                        other => self.declare(other, main),
                    }
                }
            }
        }
        Ok(())
    }

    fn declare(&mut self, item: &Item, main: bool) {
        match item {
            Item::Node(decl) => {
                self.globals
                    .insert(decl.name.clone(), Value::NodeType(Rc::clone(decl)));
            }
            Item::Def(decl) => {
                if main && !self.endpoints.contains(&decl.name) {
                    self.endpoints.push(decl.name.clone());
                }
                self.globals
                    .insert(decl.name.clone(), Value::Func(Rc::clone(decl)));
            }
            _ => {}
        }
    }

    /// Load `a.b` from the support library mounted under `/lib`
    fn include(&mut self, dotted: &str) -> ScriptResult<()> {
        if !self.included.insert(dotted.to_string()) {
            return Ok(());
        }
        let relative = dotted.replace('.', "/");
        let candidates = [
            format!("{}/{}.jac", LIB_PREFIX, relative),
            format!("{}/{}/{}.jac", LIB_PREFIX, SUPPORT_FOLDER, relative),
        ];
        let Some(path) = candidates.iter().find(|p| self.vfs.exists(p)) else {
            return Err(ScriptError::new(
                ErrorKind::ImportError,
                format!("No module named '{}'", dotted),
            ));
        };
        debug!(module = dotted, path = %path, "including module");
        let source = self.vfs.read_to_string(path).map_err(|e| {
            ScriptError::new(ErrorKind::ImportError, format!("cannot read '{}': {}", path, e))
        })?;
        let module = parse(&source, Language::Jac)?;
        self.exec_module(&module, EntryMode::Run, false)
    }

    fn exec_block(&mut self, body: &[Stmt]) -> ScriptResult<Flow> {
        for stmt in body {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn check_interrupt(&self) -> ScriptResult<()> {
        if self.io.interrupted() {
            return Err(ScriptError::new(ErrorKind::KeyboardInterrupt, ""));
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> ScriptResult<Flow> {
        self.check_interrupt()
            .and_then(|_| self.exec_kind(&stmt.kind))
            .map_err(|e| with_line(e, stmt.line))
    }

    fn exec_kind(&mut self, kind: &StmtKind) -> ScriptResult<Flow> {
        match kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign(target, expr) => {
                let value = self.eval(expr)?;
                self.assign(target, value)?;
            }
            StmtKind::AugAssign(target, op, expr) => self.aug_assign(target, *op, expr)?,
            StmtKind::If { branches, orelse } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.is_truthy() {
                        return self.exec_block(body);
                    }
                }
                if let Some(body) = orelse {
                    return self.exec_block(body);
                }
            }
            StmtKind::While(cond, body) => {
                while self.eval(cond)?.is_truthy() {
                    self.check_interrupt()?;
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::For(name, iter, body) => {
                let iterable = self.eval(iter)?;
                let items = self.iterate(iterable)?;
                for item in items {
                    self.check_interrupt()?;
                    self.set_name(name, item);
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Def(decl) => self.set_name(&decl.name, Value::Func(Rc::clone(decl))),
        }
        Ok(Flow::Normal)
    }

    fn iterate(&self, value: Value) -> ScriptResult<Vec<Value>> {
        match value {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not iterable",
                self.type_name(&other)
            ))),
        }
    }

    fn set_name(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.locals.insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    fn lookup(&self, name: &str) -> ScriptResult<Value> {
        if let Some(value) = self.frames.last().and_then(|f| f.locals.get(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if let Some(builtin) = Builtin::lookup(name) {
            return Ok(Value::Builtin(builtin));
        }
        Err(ScriptError::new(
            ErrorKind::NameError,
            format!("name '{}' is not defined", name),
        ))
    }

    fn assign(&mut self, target: &Target, value: Value) -> ScriptResult<()> {
        match target {
            Target::Name(name) => self.set_name(name, value),
            Target::Attr(obj, name) => {
                let obj = self.eval(obj)?;
                self.set_attr(obj, name, value)?;
            }
            Target::Index(obj, index) => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                self.set_index(obj, index, value)?;
            }
        }
        Ok(())
    }

    fn aug_assign(&mut self, target: &Target, op: BinOp, expr: &Expr) -> ScriptResult<()> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name)?;
                let rhs = self.eval(expr)?;
                self.set_name(name, value::binary(op, current, rhs)?);
            }
            Target::Attr(obj, name) => {
                let obj = self.eval(obj)?;
                let current = self.get_attr(&obj, name)?;
                let rhs = self.eval(expr)?;
                self.set_attr(obj, name, value::binary(op, current, rhs)?)?;
            }
            Target::Index(obj, index) => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                let current = self.get_index(&obj, &index)?;
                let rhs = self.eval(expr)?;
                self.set_index(obj, index, value::binary(op, current, rhs)?)?;
            }
        }
        Ok(())
    }

    fn get_attr(&self, obj: &Value, name: &str) -> ScriptResult<Value> {
        if let Value::Node(id) = obj {
            if let Some(value) = self.graph.node(*id).field(name) {
                return Ok(value.clone());
            }
        }
        Err(self.no_attribute(obj, name))
    }

    fn set_attr(&mut self, obj: Value, name: &str, value: Value) -> ScriptResult<()> {
        match obj {
            Value::Node(id) if id != NodeId::ROOT => {
                self.graph.node_mut(id).set_field(name, value);
                Ok(())
            }
            other => Err(self.no_attribute(&other, name)),
        }
    }

    pub(super) fn no_attribute(&self, obj: &Value, name: &str) -> ScriptError {
        ScriptError::new(
            ErrorKind::AttributeError,
            format!(
                "'{}' object has no attribute '{}'",
                self.type_name(obj),
                name
            ),
        )
    }

    fn get_index(&self, obj: &Value, index: &Value) -> ScriptResult<Value> {
        match obj {
            Value::List(items) => {
                let items = items.borrow();
                let i = resolve_index(index, items.len(), "list")?;
                Ok(items[i].clone())
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = resolve_index(index, chars.len(), "string")?;
                Ok(Value::Str(chars[i].to_string()))
            }
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not subscriptable",
                self.type_name(other)
            ))),
        }
    }

    fn set_index(&mut self, obj: Value, index: Value, value: Value) -> ScriptResult<()> {
        match obj {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let i = resolve_index(&index, items.len(), "list assignment")?;
                items[i] = value;
                Ok(())
            }
            other => Err(ScriptError::type_error(format!(
                "'{}' object does not support item assignment",
                self.type_name(&other)
            ))),
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> ScriptResult<Value> {
        match expr {
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Float(v) => Ok(Value::Float(*v)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FPart::Lit(text) => out.push_str(text),
                        FPart::Expr(expr, spec) => {
                            let value = self.eval(expr)?;
                            match spec {
                                Some(spec) => out.push_str(&self.format_spec(&value, spec)?),
                                None => out.push_str(&self.to_str(&value)),
                            }
                        }
                    }
                }
                Ok(Value::Str(out))
            }
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<ScriptResult<Vec<_>>>()?;
                Ok(Value::list(values))
            }
            Expr::Binary(left, op, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                value::binary(*op, left, right)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match (op, value) {
                    (UnOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
                    (UnOp::Neg, Value::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(|| {
                        ScriptError::new(ErrorKind::OverflowError, "integer overflow")
                    }),
                    (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnOp::Neg, Value::Bool(b)) => Ok(Value::Int(-(b as i64))),
                    (UnOp::Pos, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
                    (UnOp::Pos, Value::Bool(b)) => Ok(Value::Int(b as i64)),
                    (op, v) => Err(ScriptError::type_error(format!(
                        "bad operand type for unary {}: '{}'",
                        if *op == UnOp::Neg { "-" } else { "+" },
                        self.type_name(&v)
                    ))),
                }
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Call(callee, args) => self.eval_call(callee, args),
            Expr::Attr(obj, name) => {
                let obj = self.eval(obj)?;
                self.get_attr(&obj, name)
            }
            Expr::Index(obj, index) => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                self.get_index(&obj, &index)
            }
            Expr::Connect(left, right) => {
                let from = self.eval(left)?;
                let to = self.eval(right)?;
                match (&from, &to) {
                    (Value::Node(a), Value::Node(b)) => {
                        self.graph.connect(*a, *b);
                        Ok(to)
                    }
                    _ => Err(ScriptError::type_error(format!(
                        "cannot connect '{}' to '{}'",
                        self.type_name(&from),
                        self.type_name(&to)
                    ))),
                }
            }
            Expr::EdgeRef(source) => match self.eval(source)? {
                Value::Node(id) => Ok(Value::list(
                    self.graph
                        .successors(id)
                        .into_iter()
                        .map(Value::Node)
                        .collect(),
                )),
                other => Err(ScriptError::type_error(format!(
                    "'{}' object has no edges",
                    self.type_name(&other)
                ))),
            },
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Arg]) -> ScriptResult<Value> {
        // Methods on builtin values are resolved at the call site
        if let Expr::Attr(obj, name) = callee {
            let receiver = self.eval(obj)?;
            if !matches!(receiver, Value::Node(_)) {
                let (positional, keywords) = self.eval_args(args)?;
                return self.call_method(receiver, name, positional, keywords);
            }
            let function = self.get_attr(&receiver, name)?;
            let (positional, keywords) = self.eval_args(args)?;
            return self.call_value(function, positional, keywords);
        }
        let function = self.eval(callee)?;
        let (positional, keywords) = self.eval_args(args)?;
        self.call_value(function, positional, keywords)
    }

    fn eval_args(&mut self, args: &[Arg]) -> ScriptResult<(Vec<Value>, Vec<(String, Value)>)> {
        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        for arg in args {
            let value = self.eval(&arg.value)?;
            match &arg.name {
                Some(name) => keywords.push((name.clone(), value)),
                None => positional.push(value),
            }
        }
        Ok((positional, keywords))
    }

    pub(super) fn call_value(
        &mut self,
        function: Value,
        positional: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> ScriptResult<Value> {
        match function {
            Value::Builtin(builtin) => self.call_builtin(builtin, positional, keywords),
            Value::Func(decl) => self.call_function(&decl, positional, keywords),
            Value::NodeType(decl) => self.construct(&decl, positional, keywords),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not callable",
                self.type_name(&other)
            ))),
        }
    }

    fn bind_params(
        &mut self,
        callable: &str,
        params: &[(String, Option<&Expr>)],
        positional: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> ScriptResult<Vec<(String, Value)>> {
        if positional.len() > params.len() {
            return Err(ScriptError::type_error(format!(
                "{}() takes {} positional argument{} but {} {} given",
                callable,
                params.len(),
                if params.len() == 1 { "" } else { "s" },
                positional.len(),
                if positional.len() == 1 { "was" } else { "were" }
            )));
        }

        let mut slots: Vec<Option<Value>> = vec![None; params.len()];
        for (slot, value) in slots.iter_mut().zip(positional) {
            *slot = Some(value);
        }
        for (name, value) in keywords {
            let Some(index) = params.iter().position(|(p, _)| *p == name) else {
                return Err(ScriptError::type_error(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    callable, name
                )));
            };
            if slots[index].is_some() {
                return Err(ScriptError::type_error(format!(
                    "{}() got multiple values for argument '{}'",
                    callable, name
                )));
            }
            slots[index] = Some(value);
        }

        let missing: Vec<&str> = params
            .iter()
            .zip(&slots)
            .filter(|((_, default), slot)| slot.is_none() && default.is_none())
            .map(|((name, _), _)| name.as_str())
            .collect();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|n| format!("'{}'", n)).collect();
            return Err(ScriptError::type_error(format!(
                "{}() missing {} required positional argument{}: {}",
                callable,
                missing.len(),
                if missing.len() == 1 { "" } else { "s" },
                names.join(" and ")
            )));
        }

        let mut bound = Vec::with_capacity(params.len());
        for ((name, default), slot) in params.iter().zip(slots) {
            let value = match (slot, default) {
                (Some(value), _) => value,
                (None, Some(expr)) => self.eval(expr)?,
                (None, None) => Value::None,
            };
            bound.push((name.clone(), value));
        }
        Ok(bound)
    }

    fn call_function(
        &mut self,
        decl: &Rc<FuncDecl>,
        positional: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> ScriptResult<Value> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(ScriptError::new(
                ErrorKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        let params: Vec<(String, Option<&Expr>)> = decl
            .params
            .iter()
            .map(|p| (p.name.clone(), p.default.as_ref()))
            .collect();
        let bound = self.bind_params(&decl.name, &params, positional, keywords)?;

        self.frames.push(Frame {
            name: decl.name.clone(),
            locals: bound.into_iter().collect(),
        });
        let result = self.exec_block(&decl.body);
        let frame = self.frames.pop();

        match result {
            Ok(Flow::Return(value)) => Ok(value),
            Ok(_) => Ok(Value::None),
            Err(mut err) => {
                if err.scope.is_none() {
                    err.scope = frame.map(|f| f.name);
                }
                Err(err)
            }
        }
    }

    fn construct(
        &mut self,
        decl: &Rc<NodeDecl>,
        positional: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> ScriptResult<Value> {
        let params: Vec<(String, Option<&Expr>)> = decl
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.default.as_ref()))
            .collect();
        let fields = self.bind_params(&decl.name, &params, positional, keywords)?;
        Ok(Value::Node(self.graph.add_node(&decl.name, fields)))
    }

    /// Type name as the program sees it; nodes report their archetype
    pub(super) fn type_name(&self, value: &Value) -> String {
        match value {
            Value::Node(id) => self.graph.node(*id).archetype.clone(),
            other => other.type_name().to_string(),
        }
    }

    /// `str()` rendering
    pub fn to_str(&self, value: &Value) -> String {
        match value {
            Value::Str(s) => s.clone(),
            other => self.repr(other),
        }
    }

    /// `repr()` rendering
    pub fn repr(&self, value: &Value) -> String {
        self.repr_guarded(value, &mut Vec::new())
    }

    fn repr_guarded(&self, value: &Value, seen: &mut Vec<Seen>) -> String {
        match value {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => quote_str(s),
            Value::List(items) => {
                let ptr = Rc::as_ptr(items) as *const ();
                if seen.iter().any(|s| matches!(s, Seen::List(p) if *p == ptr)) {
                    return "[...]".to_string();
                }
                seen.push(Seen::List(ptr));
                let parts: Vec<String> = items
                    .borrow()
                    .iter()
                    .map(|v| self.repr_guarded(v, seen))
                    .collect();
                seen.pop();
                format!("[{}]", parts.join(", "))
            }
            Value::Func(decl) => format!("<function {}>", decl.name),
            Value::Builtin(b) => format!("<built-in function {}>", b.name()),
            Value::NodeType(decl) => format!("<class '{}'>", decl.name),
            Value::Node(id) => {
                let node = self.graph.node(*id);
                if seen.iter().any(|s| matches!(s, Seen::Node(n) if n == id)) {
                    return format!("{}(...)", node.archetype);
                }
                seen.push(Seen::Node(*id));
                let fields: Vec<String> = node
                    .fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, self.repr_guarded(v, seen)))
                    .collect();
                seen.pop();
                format!("{}({})", node.archetype, fields.join(", "))
            }
        }
    }

    /// Apply an f-string format spec: `[[fill]align][width][.precision][type]`
    pub fn format_spec(&self, value: &Value, spec: &str) -> ScriptResult<String> {
        let chars: Vec<char> = spec.chars().collect();
        let mut i = 0;
        let mut fill = ' ';
        let mut align = None;
        if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^') {
            fill = chars[0];
            align = Some(chars[1]);
            i = 2;
        } else if chars.first().is_some_and(|c| matches!(*c, '<' | '>' | '^')) {
            align = Some(chars[0]);
            i = 1;
        }
        if align.is_none() && chars.get(i) == Some(&'0') {
            fill = '0';
            align = Some('>');
        }
        let width = format_digits(&chars, &mut i)?;
        let mut precision = None;
        if i < chars.len() && chars[i] == '.' {
            i += 1;
            precision = Some(format_digits(&chars, &mut i)?);
        }
        let kind = chars.get(i).copied();
        if i + usize::from(kind.is_some()) != chars.len() {
            return Err(ScriptError::value_error("Invalid format specifier"));
        }

        let as_float = |v: &Value| match v {
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(*b as i64 as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        };
        let unknown = |code: char| {
            ScriptError::value_error(format!(
                "Unknown format code '{}' for object of type '{}'",
                code,
                self.type_name(value)
            ))
        };

        let (body, numeric) = match kind {
            Some('f') | Some('F') => {
                let f = as_float(value).ok_or_else(|| unknown('f'))?;
                (format!("{:.*}", precision.unwrap_or(6), f), true)
            }
            Some('%') => {
                let f = as_float(value).ok_or_else(|| unknown('%'))?;
                (format!("{:.*}%", precision.unwrap_or(6), f * 100.0), true)
            }
            Some('d') => match value {
                Value::Int(i) => (i.to_string(), true),
                Value::Bool(b) => ((*b as i64).to_string(), true),
                _ => return Err(unknown('d')),
            },
            Some('s') | None => match (value, precision) {
                (Value::Float(f), Some(p)) if kind.is_none() => (format!("{:.*}", p, f), true),
                (Value::Int(_) | Value::Float(_) | Value::Bool(_), None) if kind.is_none() => {
                    (self.to_str(value), true)
                }
                (Value::Str(s), Some(p)) => (s.chars().take(p).collect(), false),
                (Value::Str(s), None) => (s.clone(), false),
                (_, _) if kind == Some('s') => return Err(unknown('s')),
                _ => (self.to_str(value), false),
            },
            Some(other) => return Err(unknown(other)),
        };

        let len = body.chars().count();
        if len >= width {
            return Ok(body);
        }
        let pad = width - len;
        let padding = |n: usize| fill.to_string().repeat(n);
        Ok(match align.unwrap_or(if numeric { '>' } else { '<' }) {
            '>' => format!("{}{}", padding(pad), body),
            '^' => format!("{}{}{}", padding(pad / 2), body, padding(pad - pad / 2)),
            _ => format!("{}{}", body, padding(pad)),
        })
    }

    /// Graph reachable from root, labelled with each node's repr
    pub fn dump_dot(&self) -> String {
        self.graph.to_dot(|id| self.repr(&Value::Node(id)))
    }

    pub(super) fn write(&mut self, stream: Stream, text: &str) {
        self.io.write(stream, text);
    }
}

fn with_line(err: ScriptError, line: usize) -> ScriptError {
    if err.line.is_none() {
        err.at_line(line)
    } else {
        err
    }
}

fn resolve_index(index: &Value, len: usize, what: &str) -> ScriptResult<usize> {
    let Some(raw) = index.as_int() else {
        return Err(ScriptError::type_error(format!(
            "{} indices must be integers, not {}",
            what.split(' ').next().unwrap_or(what),
            index.type_name()
        )));
    };
    let resolved = if raw < 0 { raw + len as i64 } else { raw };
    if resolved < 0 || resolved >= len as i64 {
        return Err(ScriptError::new(
            ErrorKind::IndexError,
            format!("{} index out of range", what),
        ));
    }
    Ok(resolved as usize)
}

/// Width or precision digits of a format spec, starting at `*i`
fn format_digits(chars: &[char], i: &mut usize) -> ScriptResult<usize> {
    let mut n = 0usize;
    while let Some(digit) = chars.get(*i).and_then(|c| c.to_digit(10)) {
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_add(digit as usize))
            .ok_or_else(|| ScriptError::value_error("Too many decimal digits in format string"))?;
        *i += 1;
    }
    value::check_sequence_len(n)?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::super::io::CapturedIo;
    use super::*;

    fn run(source: &str, language: Language) -> (CapturedIo, ScriptResult<()>) {
        let vfs = Vfs::new();
        let mut io = CapturedIo::default();
        let result = {
            let module = parse(source, language).unwrap();
            let mut interp = Interpreter::new(&mut io, &vfs, language);
            interp.run(&module, EntryMode::Run)
        };
        (io, result)
    }

    fn jac(source: &str) -> String {
        let (io, result) = run(source, Language::Jac);
        result.unwrap();
        io.stdout()
    }

    #[test]
    fn test_counting_loop() {
        let out = jac("with entry { for i in range(5) { print(\"Count: \" + str(i)); } }");
        assert_eq!(out, "Count: 0\nCount: 1\nCount: 2\nCount: 3\nCount: 4\n");
    }

    #[test]
    fn test_each_print_is_one_write() {
        let (io, result) = run("with entry { print(1, 2, sep=\"-\"); print(\"x\", end=\"\"); }", Language::Jac);
        result.unwrap();
        assert_eq!(io.chunks.len(), 2);
        assert_eq!(io.chunks[0].1, "1-2\n");
        assert_eq!(io.chunks[1].1, "x");
    }

    #[test]
    fn test_entry_sees_later_declarations() {
        let out = jac("with entry { print(square(4)); }\ndef square(x: int) -> int { return x * x; }");
        assert_eq!(out, "16\n");
    }

    #[test]
    fn test_glob_and_function_locals() {
        let out = jac(
            "glob total = 10;\n\
             def bump(n: int) -> int { total = n + 1; return total; }\n\
             with entry { print(bump(1), total); }",
        );
        assert_eq!(out, "2 10\n");
    }

    #[test]
    fn test_nodes_and_edges() {
        let vfs = Vfs::new();
        let mut io = CapturedIo::default();
        let source = "node Person { has name: str; }\n\
                      with entry {\n\
                        a = root ++> Person(name=\"Alice\");\n\
                        a ++> Person(\"Bob\");\n\
                        print(len([root -->]), [a -->][0].name);\n\
                      }";
        let module = parse(source, Language::Jac).unwrap();
        let mut interp = Interpreter::new(&mut io, &vfs, Language::Jac);
        interp.run(&module, EntryMode::Run).unwrap();
        let dot = interp.dump_dot();
        drop(interp);

        assert_eq!(io.stdout(), "1 Bob\n");
        assert!(dot.contains("0 [label=\"Root()\"];"));
        assert!(dot.contains("1 [label=\"Person(name=&#x27;Alice&#x27;)\"];"));
        assert!(dot.contains("0 -> 1;"));
        assert!(dot.contains("1 -> 2;"));
    }

    #[test]
    fn test_serve_mode_skips_entry() {
        let vfs = Vfs::new();
        let mut io = CapturedIo::default();
        let module = parse(
            "def add(a: int, b: int) -> int { return a + b; }\nwith entry { print(\"ran\"); }",
            Language::Jac,
        )
        .unwrap();
        let mut interp = Interpreter::new(&mut io, &vfs, Language::Jac);
        interp.run(&module, EntryMode::Serve).unwrap();
        assert_eq!(interp.endpoints().to_vec(), vec!["add".to_string()]);
        drop(interp);
        assert_eq!(io.stdout(), "");
    }

    #[test]
    fn test_name_error_reports_line_and_scope() {
        let (_, result) = run(
            "def greet() {\n  print(missing);\n}\nwith entry {\n  greet();\n}",
            Language::Jac,
        );
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NameError);
        assert_eq!(err.line, Some(2));
        assert_eq!(err.scope.as_deref(), Some("greet"));
    }

    #[test]
    fn test_python_dialect() {
        let source = "def fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\n\nxs = []\nfor i in range(6):\n    xs.append(fib(i))\nprint(xs)\n";
        let (io, result) = run(source, Language::Python);
        result.unwrap();
        assert_eq!(io.stdout(), "[0, 1, 1, 2, 3, 5]\n");
    }

    #[test]
    fn test_python_has_no_root() {
        let (_, result) = run("print(root)\n", Language::Python);
        assert_eq!(result.unwrap_err().kind, ErrorKind::NameError);
    }

    #[test]
    fn test_fstring_format_specs() {
        let out = jac("with entry { x = 3.14159; n = 7; print(f\"{x:.2f}|{n:>3}|{'ab':<4}|{n:03}\"); }");
        assert_eq!(out, "3.14|  7|ab  |007\n");
    }

    #[test]
    fn test_oversized_results_raise() {
        let (_, result) = run("with entry {\n  s = 'ab' * (10 ** 11);\n}", Language::Jac);
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MemoryError);
        assert_eq!(err.line, Some(2));

        let (_, result) = run("x = [0] * (2 ** 62)\n", Language::Python);
        assert_eq!(result.unwrap_err().kind, ErrorKind::MemoryError);

        let (_, result) = run("print(f\"{1:999999999999}\")\n", Language::Python);
        assert_eq!(result.unwrap_err().kind, ErrorKind::MemoryError);

        let (_, result) = run("print(f\"{1:99999999999999999999999}\")\n", Language::Python);
        assert_eq!(result.unwrap_err().kind, ErrorKind::ValueError);
    }

    #[test]
    fn test_list_repr_cycle() {
        let out = jac("with entry { xs = [1]; xs.append(xs); print(xs); }");
        assert_eq!(out, "[1, [...]]\n");
    }

    #[test]
    fn test_missing_field_argument() {
        let (_, result) = run(
            "node Person { has name: str; }\nwith entry { Person(); }",
            Language::Jac,
        );
        let err = result.unwrap_err();
        assert_eq!(
            err.message,
            "Person() missing 1 required positional argument: 'name'"
        );
    }

    #[test]
    fn test_include_from_support_library() {
        let mut vfs = Vfs::new();
        vfs.write(
            "/lib/jaclang/helpers/math.jac",
            b"def triple(x: int) -> int { return 3 * x; }".to_vec(),
        );
        let mut io = CapturedIo::default();
        let module = parse(
            "include helpers.math;\nwith entry { print(triple(5)); }",
            Language::Jac,
        )
        .unwrap();
        Interpreter::new(&mut io, &vfs, Language::Jac)
            .run(&module, EntryMode::Run)
            .unwrap();
        assert_eq!(io.stdout(), "15\n");
    }

    #[test]
    fn test_unknown_include() {
        let (_, result) = run("include nowhere;", Language::Jac);
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ImportError);
        assert_eq!(err.line, Some(1));
    }
}
