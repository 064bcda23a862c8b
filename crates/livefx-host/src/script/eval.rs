//! Tree-walking interpreter for resolved unit scripts.
//!
//! Runs on the render thread. Locals live on a value stack that is reserved
//! up front and truncated back after every call, so steady-state execution
//! does not allocate.

use super::ast::{AssignOp, BinaryOp};
use super::compile::{Builtin, CExpr, CStmt, Global, MemberKey, Place, Program, Routine, Slot};
use crate::bus::AudioBus;
use crate::error::RuntimeFault;
use crate::unit::FaultReporter;
use std::fmt;

/// Maximum nesting of script function calls.
pub(crate) const MAX_CALL_DEPTH: usize = 64;

const STACK_RESERVE: usize = 1024;

/// A script value.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum Value {
    #[default]
    Unit,
    Num(f32),
    Bool(bool),
    /// One channel of the current block.
    Channel(usize),
    /// Read-only input samples of a channel.
    Input(usize),
    /// Writable output samples of a channel.
    Output(usize),
    /// The k-rate parameter mapping.
    Params,
    /// The channel collection of the current block.
    Channels,
    Fault(RuntimeFault),
}

impl Value {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Unit => "nothing",
            Self::Num(_) => "number",
            Self::Bool(_) => "boolean",
            Self::Channel(_) => "channel",
            Self::Input(_) => "input buffer",
            Self::Output(_) => "output buffer",
            Self::Params => "parameters",
            Self::Channels => "channels",
            Self::Fault(_) => "fault",
        }
    }

    pub(crate) fn truthy(&self) -> bool {
        match self {
            Self::Unit => false,
            Self::Bool(b) => *b,
            Self::Num(n) => *n != 0.0 && !n.is_nan(),
            _ => true,
        }
    }

    fn num(&self) -> Result<f32, RuntimeFault> {
        match self {
            Self::Num(n) => Ok(*n),
            other => Err(mismatch("number", other)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => f.write_str("()"),
            Self::Num(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Channel(c) => write!(f, "channel {c}"),
            Self::Input(c) => write!(f, "input buffer of channel {c}"),
            Self::Output(c) => write!(f, "output buffer of channel {c}"),
            Self::Params => f.write_str("parameters"),
            Self::Channels => f.write_str("channels"),
            Self::Fault(fault) => write!(f, "{fault}"),
        }
    }
}

fn mismatch(expected: &'static str, found: &Value) -> RuntimeFault {
    RuntimeFault::TypeMismatch {
        expected,
        found: found.type_name(),
    }
}

/// What a block of statements hands back to its caller.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Per-block view of the world a script runs against.
pub(crate) struct Io<'a> {
    pub(crate) input: &'a AudioBus,
    pub(crate) output: &'a mut AudioBus,
    pub(crate) params: &'a [f32],
    pub(crate) sample_rate: f32,
    pub(crate) current_frame: u64,
    pub(crate) reporter: &'a mut FaultReporter,
}

/// Interpreter state owned by one unit instance.
pub(crate) struct Interpreter {
    stack: Vec<Value>,
    state: Vec<Value>,
    depth: usize,
}

impl Interpreter {
    pub(crate) fn new(program: &Program) -> Self {
        Self {
            stack: Vec::with_capacity(STACK_RESERVE),
            state: vec![Value::Unit; program.state_names.len()],
            depth: 0,
        }
    }

    /// Evaluates state initializers in declaration order.
    pub(crate) fn init_state(&mut self, program: &Program, io: &mut Io<'_>) -> Result<(), RuntimeFault> {
        for (slot, init) in program.state_init.iter().enumerate() {
            let value = self.eval(program, 0, init, io)?;
            self.state[slot] = value;
        }
        Ok(())
    }

    /// Current value of a state variable.
    #[cfg(test)]
    pub(crate) fn state(&self, name: &str, program: &Program) -> Option<&Value> {
        let slot = program.state_names.iter().position(|n| n == name)?;
        self.state.get(slot)
    }

    /// Runs a zero-argument routine (`process` or a message handler).
    pub(crate) fn run(&mut self, program: &Program, routine: &Routine, io: &mut Io<'_>) -> Result<Value, RuntimeFault> {
        let base = self.stack.len();
        self.enter_frame(program, routine, base, io)
    }

    fn enter_frame(
        &mut self,
        program: &Program,
        routine: &Routine,
        base: usize,
        io: &mut Io<'_>,
    ) -> Result<Value, RuntimeFault> {
        if self.depth >= MAX_CALL_DEPTH {
            self.stack.truncate(base);
            return Err(RuntimeFault::CallDepth(MAX_CALL_DEPTH));
        }
        self.depth += 1;
        self.stack.resize(base + routine.locals, Value::Unit);
        let result = self.exec(program, base, &routine.body, io);
        self.stack.truncate(base);
        self.depth -= 1;
        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Unit),
        }
    }

    fn call(
        &mut self,
        program: &Program,
        base: usize,
        index: usize,
        args: &[CExpr],
        io: &mut Io<'_>,
    ) -> Result<Value, RuntimeFault> {
        let routine = &program.functions[index];
        let frame = self.stack.len();
        for arg in args {
            match self.eval(program, base, arg, io) {
                Ok(value) => self.stack.push(value),
                Err(fault) => {
                    self.stack.truncate(frame);
                    return Err(fault);
                }
            }
        }
        self.enter_frame(program, routine, frame, io)
    }

    fn local(&self, base: usize, slot: Slot) -> Value {
        self.stack[base + slot as usize].clone()
    }

    fn set_local(&mut self, base: usize, slot: Slot, value: Value) {
        self.stack[base + slot as usize] = value;
    }

    // --- Statements ---

    fn exec(&mut self, program: &Program, base: usize, stmts: &[CStmt], io: &mut Io<'_>) -> Result<Flow, RuntimeFault> {
        for stmt in stmts {
            let flow = match stmt {
                CStmt::Let(slot, value) => {
                    let value = self.eval(program, base, value, io)?;
                    self.set_local(base, *slot, value);
                    Flow::Normal
                }
                CStmt::Assign(place, op, value) => {
                    self.assign(program, base, place, *op, value, io)?;
                    Flow::Normal
                }
                CStmt::Step(place, delta) => {
                    self.assign(program, base, place, AssignOp::Add, &CExpr::Num(*delta), io)?;
                    Flow::Normal
                }
                CStmt::If(cond, then, otherwise) => {
                    if self.eval(program, base, cond, io)?.truthy() {
                        self.exec(program, base, then, io)?
                    } else {
                        self.exec(program, base, otherwise, io)?
                    }
                }
                CStmt::While(cond, body) => {
                    let mut flow = Flow::Normal;
                    while self.eval(program, base, cond, io)?.truthy() {
                        match self.exec(program, base, body, io)? {
                            Flow::Break => break,
                            Flow::Return(v) => {
                                flow = Flow::Return(v);
                                break;
                            }
                            Flow::Normal | Flow::Continue => {}
                        }
                    }
                    flow
                }
                CStmt::ForRange {
                    var,
                    start,
                    end,
                    body,
                } => {
                    let mut i = self.eval(program, base, start, io)?.num()?;
                    let end = self.eval(program, base, end, io)?.num()?;
                    let mut flow = Flow::Normal;
                    while i < end {
                        self.set_local(base, *var, Value::Num(i));
                        match self.exec(program, base, body, io)? {
                            Flow::Break => break,
                            Flow::Return(v) => {
                                flow = Flow::Return(v);
                                break;
                            }
                            Flow::Normal | Flow::Continue => {}
                        }
                        i += 1.0;
                    }
                    flow
                }
                CStmt::ForEach { var, iter, body } => {
                    let collection = self.eval(program, base, iter, io)?;
                    let count = match collection {
                        Value::Channels => io.input.channel_count(),
                        Value::Input(_) | Value::Output(_) => io.input.frames(),
                        ref other => return Err(mismatch("channels or a buffer", other)),
                    };
                    let mut flow = Flow::Normal;
                    for k in 0..count {
                        let item = match collection {
                            Value::Input(c) => Value::Num(io.input.channel(active(io.input, c)?)[k]),
                            Value::Output(c) => Value::Num(io.output.channel(active(io.output, c)?)[k]),
                            _ => Value::Channel(k),
                        };
                        self.set_local(base, *var, item);
                        match self.exec(program, base, body, io)? {
                            Flow::Break => break,
                            Flow::Return(v) => {
                                flow = Flow::Return(v);
                                break;
                            }
                            Flow::Normal | Flow::Continue => {}
                        }
                    }
                    flow
                }
                CStmt::Try {
                    body,
                    binding,
                    handler,
                } => {
                    let mark = self.stack.len();
                    let depth = self.depth;
                    match self.exec(program, base, body, io) {
                        Ok(flow) => flow,
                        Err(fault) => {
                            self.stack.truncate(mark);
                            self.depth = depth;
                            self.set_local(base, *binding, Value::Fault(fault));
                            self.exec(program, base, handler, io)?
                        }
                    }
                }
                CStmt::Return(value) => Flow::Return(match value {
                    Some(e) => self.eval(program, base, e, io)?,
                    None => Value::Unit,
                }),
                CStmt::Break => Flow::Break,
                CStmt::Continue => Flow::Continue,
                CStmt::Expr(e) => {
                    self.eval(program, base, e, io)?;
                    Flow::Normal
                }
            };
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn assign(
        &mut self,
        program: &Program,
        base: usize,
        place: &Place,
        op: AssignOp,
        value: &CExpr,
        io: &mut Io<'_>,
    ) -> Result<(), RuntimeFault> {
        match place {
            Place::Local(slot) => {
                let rhs = self.eval(program, base, value, io)?;
                let new = combine(op, || Ok(self.local(base, *slot)), rhs)?;
                self.set_local(base, *slot, new);
            }
            Place::State(slot) => {
                let rhs = self.eval(program, base, value, io)?;
                let slot = *slot as usize;
                let new = combine(op, || Ok(self.state[slot].clone()), rhs)?;
                self.state[slot] = new;
            }
            Place::Index(target, index) => {
                let target = self.eval(program, base, target, io)?;
                let index = self.eval(program, base, index, io)?.num()?;
                let rhs = self.eval(program, base, value, io)?;
                let channel = match target {
                    Value::Output(c) => c,
                    Value::Input(_) => return Err(RuntimeFault::ReadOnly("an input buffer")),
                    ref other => return Err(mismatch("output buffer", other)),
                };
                let channel = active(io.output, channel)?;
                let i = buffer_index(index, io.output.frames())?;
                let current = io.output.channel(channel)[i];
                let new = combine(op, || Ok(Value::Num(current)), rhs)?.num()?;
                io.output.channel_mut(channel)[i] = new;
            }
        }
        Ok(())
    }

    // --- Expressions ---

    fn eval(&mut self, program: &Program, base: usize, expr: &CExpr, io: &mut Io<'_>) -> Result<Value, RuntimeFault> {
        Ok(match expr {
            CExpr::Num(n) => Value::Num(*n),
            CExpr::Bool(b) => Value::Bool(*b),
            CExpr::Local(slot) => self.local(base, *slot),
            CExpr::State(slot) => self.state[*slot as usize].clone(),
            CExpr::Global(global) => match global {
                Global::Channels => Value::Channels,
                Global::Parameters => Value::Params,
                Global::SampleRate => Value::Num(io.sample_rate),
                Global::CurrentFrame => Value::Num(io.current_frame as f32),
                Global::Pi => Value::Num(std::f32::consts::PI),
            },
            CExpr::Neg(e) => Value::Num(-self.eval(program, base, e, io)?.num()?),
            CExpr::Not(e) => Value::Bool(!self.eval(program, base, e, io)?.truthy()),
            CExpr::Binary(op, l, r) => {
                let l = self.eval(program, base, l, io)?;
                let r = self.eval(program, base, r, io)?;
                binary(*op, &l, &r)?
            }
            CExpr::And(l, r) => {
                let l = self.eval(program, base, l, io)?;
                if l.truthy() { self.eval(program, base, r, io)? } else { l }
            }
            CExpr::Or(l, r) => {
                let l = self.eval(program, base, l, io)?;
                if l.truthy() { l } else { self.eval(program, base, r, io)? }
            }
            CExpr::Ternary(c, t, o) => {
                if self.eval(program, base, c, io)?.truthy() {
                    self.eval(program, base, t, io)?
                } else {
                    self.eval(program, base, o, io)?
                }
            }
            CExpr::Builtin(builtin, args) => self.builtin(program, base, *builtin, args, io)?,
            CExpr::Call(index, args) => self.call(program, base, *index, args, io)?,
            CExpr::Index(target, index) => {
                let target = self.eval(program, base, target, io)?;
                let index = self.eval(program, base, index, io)?.num()?;
                match target {
                    Value::Input(c) => {
                        let i = buffer_index(index, io.input.frames())?;
                        Value::Num(io.input.channel(active(io.input, c)?)[i])
                    }
                    Value::Output(c) => {
                        let i = buffer_index(index, io.output.frames())?;
                        Value::Num(io.output.channel(active(io.output, c)?)[i])
                    }
                    ref other => return Err(mismatch("buffer", other)),
                }
            }
            CExpr::Member {
                target,
                key,
                param,
                name,
            } => {
                let target = self.eval(program, base, target, io)?;
                match (&target, key) {
                    (Value::Params, _) => Value::Num(param.and_then(|i| io.params.get(i).copied()).unwrap_or(0.0)),
                    (Value::Channel(c), MemberKey::Input) => Value::Input(*c),
                    (Value::Channel(c), MemberKey::Output) => Value::Output(*c),
                    (Value::Input(_) | Value::Output(_), MemberKey::Length) => Value::Num(io.input.frames() as f32),
                    (Value::Channels, MemberKey::Length) => Value::Num(io.input.channel_count() as f32),
                    (other, _) => {
                        return Err(RuntimeFault::UnknownMember {
                            on: other.type_name(),
                            member: name.clone(),
                        });
                    }
                }
            }
        })
    }

    fn builtin(
        &mut self,
        program: &Program,
        base: usize,
        builtin: Builtin,
        args: &[CExpr],
        io: &mut Io<'_>,
    ) -> Result<Value, RuntimeFault> {
        let mut vals = [Value::Unit, Value::Unit, Value::Unit];
        for (slot, arg) in vals.iter_mut().zip(args) {
            *slot = self.eval(program, base, arg, io)?;
        }
        let [a, b, c] = &vals;
        let unary = |f: fn(f32) -> f32| -> Result<Value, RuntimeFault> { Ok(Value::Num(f(a.num()?))) };
        match builtin {
            Builtin::Abs => unary(f32::abs),
            Builtin::Sin => unary(f32::sin),
            Builtin::Cos => unary(f32::cos),
            Builtin::Tan => unary(f32::tan),
            Builtin::Tanh => unary(f32::tanh),
            Builtin::Exp => unary(f32::exp),
            Builtin::Log => unary(f32::ln),
            Builtin::Sqrt => unary(f32::sqrt),
            Builtin::Floor => unary(f32::floor),
            Builtin::Ceil => unary(f32::ceil),
            Builtin::Round => unary(f32::round),
            Builtin::Sign => unary(|x| if x == 0.0 || x.is_nan() { x } else { x.signum() }),
            Builtin::Pow => Ok(Value::Num(a.num()?.powf(b.num()?))),
            Builtin::Min => Ok(Value::Num(a.num()?.min(b.num()?))),
            Builtin::Max => Ok(Value::Num(a.num()?.max(b.num()?))),
            Builtin::Clamp => {
                let (x, lo, hi) = (a.num()?, b.num()?, c.num()?);
                Ok(Value::Num(x.max(lo).min(hi)))
            }
            Builtin::Len => match a {
                Value::Input(_) | Value::Output(_) => Ok(Value::Num(io.input.frames() as f32)),
                Value::Channels => Ok(Value::Num(io.input.channel_count() as f32)),
                other => Err(mismatch("buffer or channels", other)),
            },
            Builtin::Warn => {
                io.reporter.warn(a);
                Ok(Value::Unit)
            }
        }
    }
}

/// Checks that a buffer handle's channel exists in the current block.
fn active(bus: &AudioBus, channel: usize) -> Result<usize, RuntimeFault> {
    let active = bus.channel_count();
    if channel < active {
        Ok(channel)
    } else {
        Err(RuntimeFault::InactiveChannel { channel, active })
    }
}

fn buffer_index(index: f32, len: usize) -> Result<usize, RuntimeFault> {
    if index >= 0.0 && index.fract() == 0.0 && (index as usize) < len {
        Ok(index as usize)
    } else {
        Err(RuntimeFault::IndexOutOfRange { index, len })
    }
}

fn combine(
    op: AssignOp,
    current: impl FnOnce() -> Result<Value, RuntimeFault>,
    rhs: Value,
) -> Result<Value, RuntimeFault> {
    let op = match op {
        AssignOp::Set => return Ok(rhs),
        AssignOp::Add => BinaryOp::Add,
        AssignOp::Sub => BinaryOp::Sub,
        AssignOp::Mul => BinaryOp::Mul,
        AssignOp::Div => BinaryOp::Div,
    };
    binary(op, &current()?, &rhs)
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, RuntimeFault> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(l == r)),
        BinaryOp::Ne => return Ok(Value::Bool(l != r)),
        _ => {}
    }
    let (a, b) = (l.num()?, r.num()?);
    Ok(match op {
        BinaryOp::Add => Value::Num(a + b),
        BinaryOp::Sub => Value::Num(a - b),
        BinaryOp::Mul => Value::Num(a * b),
        BinaryOp::Div => Value::Num(a / b),
        BinaryOp::Rem => Value::Num(a % b),
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::Le => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::Ge => Value::Bool(a >= b),
        BinaryOp::Eq | BinaryOp::Ne => unreachable!("handled above"),
    })
}
