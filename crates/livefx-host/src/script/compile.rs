//! Name resolution: turns a syntax tree into slot-addressed routines.
//!
//! Everything that can be checked without running the script is checked
//! here: undefined names, unknown functions, arity, assignment targets,
//! `break` outside loops, duplicate members, parameter declarations and
//! registration targets. The interpreter then never looks a name up.

use super::ast::{
    AssignOp, BinaryOp, Block, Expr, ExprKind, FnDecl, ForIter, Item, Member, Module, Span,
    StmtKind, UnaryOp, UnitDecl,
};
use crate::error::{LoadError, Position};
use crate::params::{ParamSpec, validate_specs};
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) type Slot = u16;

/// Values every routine can read without declaring them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Global {
    Channels,
    Parameters,
    SampleRate,
    CurrentFrame,
    Pi,
}

/// Host-provided functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Abs,
    Sin,
    Cos,
    Tan,
    Tanh,
    Exp,
    Log,
    Sqrt,
    Pow,
    Min,
    Max,
    Clamp,
    Floor,
    Ceil,
    Round,
    Sign,
    Len,
    Warn,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Self::Abs,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "tanh" => Self::Tanh,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "sqrt" => Self::Sqrt,
            "pow" => Self::Pow,
            "min" => Self::Min,
            "max" => Self::Max,
            "clamp" => Self::Clamp,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "sign" => Self::Sign,
            "len" => Self::Len,
            "warn" => Self::Warn,
            _ => return None,
        })
    }

    pub(crate) fn arity(self) -> usize {
        match self {
            Self::Pow | Self::Min | Self::Max => 2,
            Self::Clamp => 3,
            _ => 1,
        }
    }
}

/// Members the interpreter understands on handle values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemberKey {
    Input,
    Output,
    Length,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CExpr {
    Num(f32),
    Bool(bool),
    Local(Slot),
    State(Slot),
    Global(Global),
    Neg(Box<CExpr>),
    Not(Box<CExpr>),
    Binary(BinaryOp, Box<CExpr>, Box<CExpr>),
    And(Box<CExpr>, Box<CExpr>),
    Or(Box<CExpr>, Box<CExpr>),
    Ternary(Box<CExpr>, Box<CExpr>, Box<CExpr>),
    Builtin(Builtin, Box<[CExpr]>),
    Call(usize, Box<[CExpr]>),
    Index(Box<CExpr>, Box<CExpr>),
    Member {
        target: Box<CExpr>,
        key: MemberKey,
        /// Declared parameter with this name, for `parameters.<name>`.
        param: Option<usize>,
        name: Arc<str>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Place {
    Local(Slot),
    State(Slot),
    Index(Box<CExpr>, Box<CExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CStmt {
    Let(Slot, CExpr),
    Assign(Place, AssignOp, CExpr),
    Step(Place, f32),
    If(CExpr, Vec<CStmt>, Vec<CStmt>),
    While(CExpr, Vec<CStmt>),
    ForRange {
        var: Slot,
        start: CExpr,
        end: CExpr,
        body: Vec<CStmt>,
    },
    ForEach {
        var: Slot,
        iter: CExpr,
        body: Vec<CStmt>,
    },
    Try {
        body: Vec<CStmt>,
        binding: Slot,
        handler: Vec<CStmt>,
    },
    Return(Option<CExpr>),
    Break,
    Continue,
    Expr(CExpr),
}

/// A resolved function body with its frame size.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Routine {
    pub(crate) name: String,
    pub(crate) arity: usize,
    pub(crate) locals: usize,
    pub(crate) body: Vec<CStmt>,
}

/// A fully resolved unit class, ready to instantiate.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub(crate) class: String,
    pub(crate) params: Vec<ParamSpec>,
    pub(crate) state_names: Vec<String>,
    pub(crate) state_init: Vec<CExpr>,
    pub(crate) handlers: Vec<(String, Routine)>,
    pub(crate) process: Routine,
    pub(crate) functions: Vec<Routine>,
}

impl Program {
    /// Unit class name.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Declared parameters.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Names of the unit's state variables in declaration order.
    pub fn state_names(&self) -> &[String] {
        &self.state_names
    }

    /// Whether the unit has a handler for `message`.
    pub fn handles(&self, message: &str) -> bool {
        self.handler(message).is_some()
    }

    pub(crate) fn handler(&self, message: &str) -> Option<&Routine> {
        self.handlers
            .iter()
            .find(|(m, _)| m == message)
            .map(|(_, r)| r)
    }
}

/// The result of compiling one module: classes and the names they register.
#[derive(Debug, Clone)]
pub struct CompiledModule {
    /// `(registration name, program)` pairs in source order.
    pub registrations: Vec<(String, Arc<Program>)>,
}

/// Resolves a parsed module.
pub fn compile_module(module: &Module, src: &str) -> Result<CompiledModule, LoadError> {
    let semantic = |span: Span, message: String| LoadError::Semantic {
        pos: Position::at(src, span.start),
        message,
    };

    let mut classes: HashMap<&str, Arc<Program>> = HashMap::new();
    for item in &module.items {
        if let Item::Unit(unit) = item {
            if classes.contains_key(unit.name.as_str()) {
                return Err(semantic(
                    unit.span,
                    format!("duplicate unit class '{}'", unit.name),
                ));
            }
            let program = compile_unit(unit, src)?;
            classes.insert(unit.name.as_str(), Arc::new(program));
        }
    }

    let mut registrations = Vec::new();
    for item in &module.items {
        if let Item::Register { name, class, span } = item {
            let program = classes.get(class.as_str()).ok_or_else(|| LoadError::UnknownClass {
                class: class.clone(),
                pos: Position::at(src, span.start),
            })?;
            registrations.push((name.clone(), Arc::clone(program)));
        }
    }
    Ok(CompiledModule { registrations })
}

/// What kind of routine is being resolved; decides which globals are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Process,
    Handler,
    Function,
    StateInit,
}

struct UnitCx<'a> {
    src: &'a str,
    states: Vec<String>,
    functions: HashMap<&'a str, (usize, usize)>,
    params: &'a [ParamSpec],
}

struct Local {
    name: String,
    slot: Slot,
    constant: bool,
}

struct RoutineCx<'u, 'a> {
    unit: &'u UnitCx<'a>,
    entry: Entry,
    scopes: Vec<Vec<Local>>,
    next: usize,
    max: usize,
    loops: usize,
}

fn compile_unit(unit: &UnitDecl, src: &str) -> Result<Program, LoadError> {
    let semantic = |span: Span, message: String| LoadError::Semantic {
        pos: Position::at(src, span.start),
        message,
    };

    let mut params: Option<&[ParamSpec]> = None;
    let mut states: Vec<(&str, &Expr, Span)> = Vec::new();
    let mut handlers: Vec<(&str, &Block, Span)> = Vec::new();
    let mut process: Option<&Block> = None;
    let mut functions: Vec<&FnDecl> = Vec::new();

    for member in &unit.members {
        match member {
            Member::Parameters { specs, span } => {
                if params.is_some() {
                    return Err(semantic(*span, "duplicate 'parameters' declaration".into()));
                }
                params = Some(specs.as_slice());
            }
            Member::State { name, init, span } => {
                if states.iter().any(|(n, ..)| n == name) {
                    return Err(semantic(*span, format!("duplicate state variable '{name}'")));
                }
                states.push((name.as_str(), init, *span));
            }
            Member::Handler {
                message,
                body,
                span,
            } => {
                if handlers.iter().any(|(m, ..)| m == message) {
                    return Err(semantic(*span, format!("duplicate handler for \"{message}\"")));
                }
                handlers.push((message.as_str(), body, *span));
            }
            Member::Process { body, span } => {
                if process.is_some() {
                    return Err(semantic(*span, "duplicate 'process' block".into()));
                }
                process = Some(body);
            }
            Member::Function(decl) => {
                if functions.iter().any(|f| f.name == decl.name) {
                    return Err(semantic(decl.span, format!("duplicate function '{}'", decl.name)));
                }
                if Builtin::lookup(&decl.name).is_some() {
                    return Err(semantic(
                        decl.span,
                        format!("function '{}' shadows a builtin", decl.name),
                    ));
                }
                functions.push(decl);
            }
        }
    }

    let params = params.unwrap_or(&[]);
    validate_specs(params).map_err(|message| LoadError::InvalidParameters {
        class: unit.name.clone(),
        message,
    })?;

    let Some(process) = process else {
        return Err(semantic(
            unit.span,
            format!("unit '{}' has no 'process' block", unit.name),
        ));
    };

    let mut cx = UnitCx {
        src,
        states: Vec::new(),
        functions: functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.as_str(), (i, f.params.len())))
            .collect(),
        params,
    };

    // Each initializer sees only the state declared before it.
    let mut state_init = Vec::with_capacity(states.len());
    for (name, init, _) in &states {
        let mut rcx = RoutineCx::new(&cx, Entry::StateInit);
        state_init.push(rcx.expr(init)?);
        cx.states.push((*name).to_string());
    }

    let process = RoutineCx::new(&cx, Entry::Process).routine("process", &[], process)?;
    let handlers = handlers
        .iter()
        .map(|(message, body, _)| {
            let routine = RoutineCx::new(&cx, Entry::Handler).routine(message, &[], body)?;
            Ok(((*message).to_string(), routine))
        })
        .collect::<Result<Vec<_>, LoadError>>()?;
    let functions = functions
        .iter()
        .map(|f| RoutineCx::new(&cx, Entry::Function).routine(&f.name, &f.params, &f.body))
        .collect::<Result<Vec<_>, LoadError>>()?;

    Ok(Program {
        class: unit.name.clone(),
        params: params.to_vec(),
        state_names: cx.states,
        state_init,
        handlers,
        process,
        functions,
    })
}

impl<'u, 'a> RoutineCx<'u, 'a> {
    fn new(unit: &'u UnitCx<'a>, entry: Entry) -> Self {
        Self {
            unit,
            entry,
            scopes: vec![Vec::new()],
            next: 0,
            max: 0,
            loops: 0,
        }
    }

    fn error(&self, span: Span, message: impl Into<String>) -> LoadError {
        LoadError::Semantic {
            pos: Position::at(self.unit.src, span.start),
            message: message.into(),
        }
    }

    fn routine(mut self, name: &str, params: &[String], body: &Block) -> Result<Routine, LoadError> {
        for param in params {
            self.declare(param, false, Span::default())?;
        }
        let body = self.stmts(body)?;
        Ok(Routine {
            name: name.to_string(),
            arity: params.len(),
            locals: self.max,
            body,
        })
    }

    fn declare(&mut self, name: &str, constant: bool, span: Span) -> Result<Slot, LoadError> {
        let slot = Slot::try_from(self.next).map_err(|_| self.error(span, "too many local variables"))?;
        self.next += 1;
        self.max = self.max.max(self.next);
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(Local {
                name: name.to_string(),
                slot,
                constant,
            });
        }
        Ok(slot)
    }

    fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    fn pop_scope(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            self.next -= scope.len();
        }
    }

    fn lookup_local(&self, name: &str) -> Option<&Local> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.iter().rev().find(|l| l.name == name))
    }

    fn global(&self, name: &str) -> Option<Global> {
        let in_process = self.entry == Entry::Process;
        match name {
            "channels" if in_process => Some(Global::Channels),
            "parameters" if in_process => Some(Global::Parameters),
            "sampleRate" => Some(Global::SampleRate),
            "currentFrame" => Some(Global::CurrentFrame),
            "PI" => Some(Global::Pi),
            _ => None,
        }
    }

    fn scoped_block(&mut self, block: &Block) -> Result<Vec<CStmt>, LoadError> {
        self.push_scope();
        let out = self.stmts(block);
        self.pop_scope();
        out
    }

    fn loop_body(&mut self, block: &Block) -> Result<Vec<CStmt>, LoadError> {
        self.loops += 1;
        let out = self.stmts(block);
        self.loops -= 1;
        out
    }

    fn stmts(&mut self, block: &Block) -> Result<Vec<CStmt>, LoadError> {
        let mut out = Vec::with_capacity(block.stmts.len());
        for stmt in &block.stmts {
            let compiled = match &stmt.kind {
                StmtKind::Let {
                    name,
                    value,
                    constant,
                } => {
                    let value = self.expr(value)?;
                    let slot = self.declare(name, *constant, stmt.span)?;
                    CStmt::Let(slot, value)
                }
                StmtKind::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    let cond = self.expr(cond)?;
                    let then = self.scoped_block(then)?;
                    let otherwise = match otherwise {
                        Some(block) => self.scoped_block(block)?,
                        None => Vec::new(),
                    };
                    CStmt::If(cond, then, otherwise)
                }
                StmtKind::While { cond, body } => {
                    let cond = self.expr(cond)?;
                    self.push_scope();
                    let body = self.loop_body(body);
                    self.pop_scope();
                    CStmt::While(cond, body?)
                }
                StmtKind::For { var, iter, body } => {
                    let (first, second) = match iter {
                        ForIter::Range(start, end) => (self.expr(start)?, Some(self.expr(end)?)),
                        ForIter::Each(e) => (self.expr(e)?, None),
                    };
                    self.push_scope();
                    let compiled = self
                        .declare(var, false, stmt.span)
                        .and_then(|slot| Ok((slot, self.loop_body(body)?)));
                    self.pop_scope();
                    let (var, body) = compiled?;
                    match second {
                        Some(end) => CStmt::ForRange {
                            var,
                            start: first,
                            end,
                            body,
                        },
                        None => CStmt::ForEach {
                            var,
                            iter: first,
                            body,
                        },
                    }
                }
                StmtKind::Try {
                    body,
                    binding,
                    handler,
                } => {
                    let body = self.scoped_block(body)?;
                    self.push_scope();
                    let compiled = self
                        .declare(binding, true, stmt.span)
                        .and_then(|slot| Ok((slot, self.stmts(handler)?)));
                    self.pop_scope();
                    let (binding, handler) = compiled?;
                    CStmt::Try {
                        body,
                        binding,
                        handler,
                    }
                }
                StmtKind::Return(value) => {
                    if self.entry == Entry::StateInit {
                        return Err(self.error(stmt.span, "'return' outside a routine"));
                    }
                    CStmt::Return(value.as_ref().map(|v| self.expr(v)).transpose()?)
                }
                StmtKind::Break | StmtKind::Continue => {
                    if self.loops == 0 {
                        let word = if stmt.kind == StmtKind::Break { "break" } else { "continue" };
                        return Err(self.error(stmt.span, format!("'{word}' outside a loop")));
                    }
                    if stmt.kind == StmtKind::Break {
                        CStmt::Break
                    } else {
                        CStmt::Continue
                    }
                }
                StmtKind::Assign { target, op, value } => {
                    let place = self.place(target)?;
                    CStmt::Assign(place, *op, self.expr(value)?)
                }
                StmtKind::Step { target, delta } => CStmt::Step(self.place(target)?, *delta),
                StmtKind::Expr(e) => CStmt::Expr(self.expr(e)?),
            };
            out.push(compiled);
        }
        Ok(out)
    }

    fn place(&mut self, target: &Expr) -> Result<Place, LoadError> {
        match &target.kind {
            ExprKind::Ident(name) => {
                if let Some(local) = self.lookup_local(name) {
                    if local.constant {
                        return Err(self.error(target.span, format!("cannot assign to constant '{name}'")));
                    }
                    return Ok(Place::Local(local.slot));
                }
                if let Some(i) = self.unit.states.iter().position(|s| s == name) {
                    return Ok(Place::State(i as Slot));
                }
                if self.global(name).is_some() {
                    return Err(self.error(target.span, format!("cannot assign to '{name}'")));
                }
                Err(self.error(target.span, format!("undefined variable '{name}'")))
            }
            ExprKind::Index(buffer, index) => Ok(Place::Index(
                Box::new(self.expr(buffer)?),
                Box::new(self.expr(index)?),
            )),
            ExprKind::Member(_, name) => {
                Err(self.error(target.span, format!("cannot assign to member '{name}'")))
            }
            _ => Err(self.error(target.span, "invalid assignment target")),
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<CExpr, LoadError> {
        Ok(match &expr.kind {
            ExprKind::Number(n) => CExpr::Num(*n),
            ExprKind::Bool(b) => CExpr::Bool(*b),
            ExprKind::Ident(name) => {
                if let Some(local) = self.lookup_local(name) {
                    CExpr::Local(local.slot)
                } else if let Some(i) = self.unit.states.iter().position(|s| s == name) {
                    CExpr::State(i as Slot)
                } else if let Some(global) = self.global(name) {
                    CExpr::Global(global)
                } else {
                    return Err(self.error(expr.span, format!("undefined variable '{name}'")));
                }
            }
            ExprKind::Unary(UnaryOp::Neg, e) => CExpr::Neg(Box::new(self.expr(e)?)),
            ExprKind::Unary(UnaryOp::Not, e) => CExpr::Not(Box::new(self.expr(e)?)),
            ExprKind::Binary(op, l, r) => {
                CExpr::Binary(*op, Box::new(self.expr(l)?), Box::new(self.expr(r)?))
            }
            ExprKind::Logical(true, l, r) => CExpr::And(Box::new(self.expr(l)?), Box::new(self.expr(r)?)),
            ExprKind::Logical(false, l, r) => CExpr::Or(Box::new(self.expr(l)?), Box::new(self.expr(r)?)),
            ExprKind::Ternary(c, t, o) => CExpr::Ternary(
                Box::new(self.expr(c)?),
                Box::new(self.expr(t)?),
                Box::new(self.expr(o)?),
            ),
            ExprKind::Call(name, args) => {
                let compiled = args
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<Vec<_>, _>>()?
                    .into_boxed_slice();
                if let Some(&(index, arity)) = self.unit.functions.get(name.as_str()) {
                    if self.entry == Entry::StateInit {
                        return Err(self.error(expr.span, "state initializers cannot call functions"));
                    }
                    check_arity(self, expr.span, name, arity, args.len())?;
                    CExpr::Call(index, compiled)
                } else if let Some(builtin) = Builtin::lookup(name) {
                    check_arity(self, expr.span, name, builtin.arity(), args.len())?;
                    CExpr::Builtin(builtin, compiled)
                } else {
                    return Err(self.error(expr.span, format!("unknown function '{name}'")));
                }
            }
            ExprKind::Index(target, index) => {
                CExpr::Index(Box::new(self.expr(target)?), Box::new(self.expr(index)?))
            }
            ExprKind::Member(target, name) => {
                let key = match name.as_str() {
                    "input" => MemberKey::Input,
                    "output" => MemberKey::Output,
                    "length" => MemberKey::Length,
                    _ => MemberKey::Other,
                };
                CExpr::Member {
                    target: Box::new(self.expr(target)?),
                    key,
                    param: self.unit.params.iter().position(|p| &p.name == name),
                    name: Arc::from(name.as_str()),
                }
            }
        })
    }
}

fn check_arity(
    cx: &RoutineCx<'_, '_>,
    span: Span,
    name: &str,
    expected: usize,
    found: usize,
) -> Result<(), LoadError> {
    if expected == found {
        Ok(())
    } else {
        Err(cx.error(
            span,
            format!("function '{name}' takes {expected} argument(s) but {found} were given"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::parse_module;

    fn compile(src: &str) -> Result<CompiledModule, LoadError> {
        compile_module(&parse_module(src)?, src)
    }

    fn unit(body: &str) -> String {
        format!("unit U {{ {body} }}\nregister \"u\" U;")
    }

    fn semantic_message(src: &str) -> String {
        match compile(src) {
            Err(LoadError::Semantic { message, .. }) => message,
            other => panic!("expected a semantic error, got {other:?}"),
        }
    }

    #[test]
    fn resolves_locals_states_and_functions() {
        let module = compile(&unit(
            "state keep = true
             on \"disconnect\" { keep = false }
             process { let x = 1; x += 2; return keep }
             fn twice(a) { return a * 2 }",
        ))
        .unwrap();
        let (name, program) = &module.registrations[0];
        assert_eq!(name, "u");
        assert_eq!(program.class(), "U");
        assert_eq!(program.state_names(), ["keep"]);
        assert!(program.handles("disconnect"));
        assert!(!program.handles("other"));
        assert_eq!(program.process.locals, 1);
        assert_eq!(program.functions[0].arity, 1);
    }

    #[test]
    fn sibling_scopes_reuse_slots() {
        let module = compile(&unit(
            "process { if true { let a = 1 } else { let b = 2 } for i in 0..2 { let c = i } }",
        ))
        .unwrap();
        assert_eq!(module.registrations[0].1.process.locals, 2);
    }

    #[test]
    fn undefined_variable() {
        let msg = semantic_message(&unit("process { y = 1 }"));
        assert_eq!(msg, "undefined variable 'y'");
    }

    #[test]
    fn unknown_function_and_arity() {
        assert_eq!(
            semantic_message(&unit("process { frob(1) }")),
            "unknown function 'frob'"
        );
        assert!(semantic_message(&unit("process { sin(1, 2) }")).contains("takes 1 argument"));
        assert!(
            semantic_message(&unit("process { f() } fn f(a) { }")).contains("takes 1 argument")
        );
    }

    #[test]
    fn channels_only_visible_in_process() {
        assert!(compile(&unit("process { for c in channels { } }")).is_ok());
        assert_eq!(
            semantic_message(&unit("process { } fn f() { return len(channels) }")),
            "undefined variable 'channels'"
        );
    }

    #[test]
    fn invalid_assignment_targets() {
        assert!(semantic_message(&unit("process { const k = 1; k = 2 }")).contains("constant"));
        assert!(semantic_message(&unit("process { sampleRate = 2 }")).contains("cannot assign"));
        assert!(
            semantic_message(&unit("process { parameters.gain = 1 }")).contains("member 'gain'")
        );
        assert!(
            semantic_message(&unit("process { 1 + 2 = 3 }")).contains("invalid assignment target")
        );
    }

    #[test]
    fn break_outside_loop() {
        assert_eq!(
            semantic_message(&unit("process { break }")),
            "'break' outside a loop"
        );
        assert!(compile(&unit("process { while true { break } }")).is_ok());
    }

    #[test]
    fn missing_process_and_duplicates() {
        assert!(semantic_message(&unit("state a = 1")).contains("no 'process' block"));
        assert!(semantic_message(&unit("state a = 1 state a = 2 process { }")).contains("duplicate"));
        assert!(semantic_message(&unit("process { } process { }")).contains("duplicate"));
        assert!(
            semantic_message(&unit("on \"x\" { } on \"x\" { } process { }")).contains("duplicate")
        );
        assert!(semantic_message(&unit("process { } fn abs(x) { }")).contains("shadows"));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let err = compile(&unit(
            r#"parameters [{"name":"g","defaultValue":3,"minValue":0,"maxValue":1}] process { }"#,
        ))
        .unwrap_err();
        assert!(matches!(err, LoadError::InvalidParameters { .. }));
    }

    #[test]
    fn unknown_class_registration() {
        let err = compile("unit A { process { } }\nregister \"x\" B;").unwrap_err();
        assert!(matches!(err, LoadError::UnknownClass { ref class, .. } if class == "B"));
        assert_eq!(err.position().unwrap().line, 2);
    }

    #[test]
    fn member_resolves_declared_parameter() {
        let module = compile(&unit(
            r#"parameters [{"name":"gain","defaultValue":1}] process { let g = parameters.gain; let h = parameters.nope }"#,
        ))
        .unwrap();
        let body = &module.registrations[0].1.process.body;
        let CStmt::Let(_, CExpr::Member { param, .. }) = &body[0] else {
            panic!("expected member read");
        };
        assert_eq!(*param, Some(0));
        let CStmt::Let(_, CExpr::Member { param, .. }) = &body[1] else {
            panic!("expected member read");
        };
        assert_eq!(*param, None);
    }

    #[test]
    fn state_initializers_see_earlier_state_only() {
        assert!(compile(&unit("state a = 1 state b = a + 1 process { }")).is_ok());
        assert_eq!(
            semantic_message(&unit("state b = a state a = 1 process { }")),
            "undefined variable 'a'"
        );
    }
}
