//! The stack machine
//!
//! One fetch/decode/execute loop over the flat code vector. Labels and
//! constant-pool values in the stream are skipped; `halt` stops the
//! machine; everything else dispatches through a single exhaustive
//! match.
//!
//! Register discipline: `pc` and `esp` are views (instruction index and
//! logical stack length); writing `esp` truncates the stack, which is
//! how a returning function discards its locals. `ebp`, `lr`, `jm`,
//! and `rt` are stored cells.

use leaven_core::{
    Code, Instr, Operand, Register, RegisterFile, RuntimeError, StrId, Value, ValueKind,
};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::io::Output;

/// Maximum number of values the stack may hold. Runaway recursion in
/// user code lands here and is reported as a runtime error.
const STACK_CAPACITY: usize = 64 * 1024;

/// A virtual machine instance. Not safe to run concurrently with
/// itself; build one per execution.
pub struct Machine<O: Output> {
    /// The flattened code stream.
    codes: Vec<Code>,
    /// Label name to instruction index.
    labels: FxHashMap<String, usize>,
    /// Constant pool, by label. First entry wins, matching the layout
    /// dedup.
    pool: FxHashMap<String, (ValueKind, Operand)>,
    /// The value stack.
    stack: Vec<Value>,
    /// Named slots written by `store` and read by `load`.
    slots: FxHashMap<String, Value>,
    /// String intern table.
    strings: Vec<String>,
    interned: FxHashMap<String, StrId>,
    pc: usize,
    ebp: Value,
    lr: Value,
    jm: Value,
    rt: Value,
    /// Index of the instruction currently executing, for diagnostics.
    at: usize,
    /// The instruction currently executing, for diagnostics.
    current: Option<Instr>,
    /// Executed instruction count.
    steps: usize,
    running: bool,
    /// The sink `println` writes to.
    pub output: O,
}

impl<O: Output> Machine<O> {
    /// Create a machine over a code stream, indexing its labels and
    /// constant pool.
    pub fn new(codes: Vec<Code>, output: O) -> Self {
        let mut labels = FxHashMap::default();
        let mut pool = FxHashMap::default();
        for (index, code) in codes.iter().enumerate() {
            match code {
                Code::Label(name) => {
                    labels.entry(name.clone()).or_insert(index);
                }
                Code::Value(kind, label, payload) => {
                    pool.entry(label.clone()).or_insert((*kind, payload.clone()));
                }
                Code::Instr(_) => {}
            }
        }

        Self {
            codes,
            labels,
            pool,
            stack: Vec::new(),
            slots: FxHashMap::default(),
            strings: Vec::new(),
            interned: FxHashMap::default(),
            pc: 0,
            ebp: Value::I32(0),
            lr: Value::I32(0),
            jm: Value::I32(0),
            rt: Value::I32(0),
            at: 0,
            current: None,
            steps: 0,
            running: true,
            output,
        }
    }

    /// Execute until the machine halts or runs off the end of the code.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.running && self.pc < self.codes.len() {
            self.step()?;
        }
        Ok(())
    }

    /// Execute with an instruction budget.
    pub fn run_with_max_steps(&mut self, max_steps: usize) -> Result<(), RuntimeError> {
        while self.running && self.pc < self.codes.len() {
            if self.steps >= max_steps {
                return Err(self.fault(format!("program exceeded {max_steps} steps")));
            }
            self.step()?;
        }
        Ok(())
    }

    /// Execute a single element of the code stream.
    pub fn step(&mut self) -> Result<(), RuntimeError> {
        let Some(code) = self.codes.get(self.pc) else {
            self.running = false;
            return Ok(());
        };

        match code {
            // Labels and pool values just advance.
            Code::Label(_) | Code::Value(..) => {
                self.pc += 1;
                Ok(())
            }
            Code::Instr(Instr::Halt) => {
                debug!(pc = self.pc, "halt");
                self.running = false;
                Ok(())
            }
            Code::Instr(instr) => {
                let instr = instr.clone();
                debug!(pc = self.pc, %instr, "executing");
                self.at = self.pc;
                self.current = Some(instr.clone());
                self.pc += 1;
                self.steps += 1;
                self.exec(instr)
            }
        }
    }

    fn exec(&mut self, instr: Instr) -> Result<(), RuntimeError> {
        match instr {
            Instr::Push(kind, operand) => {
                let value = self.realize(kind, &operand)?;
                self.push(value)
            }
            Instr::Add(_) => self.arith(i32::wrapping_add),
            Instr::Sub(_) => self.arith(i32::wrapping_sub),
            Instr::Load(_, label) => {
                if let Some(value) = self.slots.get(&label).cloned() {
                    self.push(value)
                } else if let Some((kind, payload)) = self.pool.get(&label).cloned() {
                    let value = self.realize(kind, &payload)?;
                    self.push(value)
                } else {
                    Err(self.fault(format!("`{label}` has no value")))
                }
            }
            Instr::Store(_, label) => {
                let value = self.pop()?;
                self.slots.insert(label, value);
                Ok(())
            }
            Instr::Jz(label) => {
                let value = self.pop()?;
                if !value.is_truthy() {
                    self.pc = self.resolve_label(&label)?;
                }
                Ok(())
            }
            Instr::Jmp(label) => {
                self.pc = self.resolve_label(&label)?;
                Ok(())
            }
            Instr::Call(label) => {
                let target = self.resolve_target(&label)?;
                // pc was already advanced past the call.
                self.push(Value::I32(self.pc as i32))?;
                self.pc = target;
                Ok(())
            }
            Instr::Call0 => {
                let target = match self.jm.clone() {
                    Value::Id(label) | Value::Scope(label) => self.resolve_target(&label)?,
                    Value::I32(index) => index as usize,
                    other => return Err(self.fault(format!("jm is not callable: {other}"))),
                };
                self.push(Value::I32(self.pc as i32))?;
                self.pc = target;
                Ok(())
            }
            Instr::Ret => {
                let value = self.pop()?;
                let Value::I32(address) = value else {
                    return Err(self.fault(format!("bad return address: {value}")));
                };
                self.pc = address as usize;
                Ok(())
            }
            Instr::Mov(register, operand) => {
                let value = match operand {
                    Some(operand) => self.realize(ValueKind::Ref, &operand)?,
                    None => self.pop()?,
                };
                self.set_register(register, value)
            }
            Instr::Stw(register) => {
                let value = self.get_register(register);
                self.push(value)
            }
            Instr::Ldw(register) => {
                let value = self.pop()?;
                self.set_register(register, value)
            }
            Instr::Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(self.fault("swap needs two stack values"));
                }
                self.stack.swap(len - 1, len - 2);
                Ok(())
            }
            Instr::Frame(arity) => {
                // The caller must have pushed the arguments and the
                // return address.
                if self.stack.len() < arity + 1 {
                    Err(self.fault(format!("stack underflow opening a frame of {arity}")))
                } else {
                    Ok(())
                }
            }
            Instr::FrameInit(_) => {
                Err(self.fault("frame_init must be rewritten before execution"))
            }
            Instr::Concat => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                match (lhs, rhs) {
                    (Value::Str(a), Value::Str(b)) => {
                        let (Some(lhs), Some(rhs)) = (self.strings.get(a), self.strings.get(b))
                        else {
                            return Err(self.fault("concat on unknown string ids"));
                        };
                        let joined = format!("{lhs}{rhs}");
                        let id = self.intern(&joined);
                        self.push(Value::Str(id))
                    }
                    (lhs, rhs) => {
                        Err(self.fault(format!("concat on non-string values: {lhs}, {rhs}")))
                    }
                }
            }
            Instr::Println => {
                let value = self.pop()?;
                let text = self.display_value(&value);
                self.output
                    .write(&text)
                    .map_err(|err| self.fault(format!("output failed: {err}")))
            }
            Instr::Halt => {
                self.running = false;
                Ok(())
            }
        }
    }

    /// Turn an instruction operand into a runtime value. `Const`
    /// operands go through the pool; `Scope` references become callable
    /// scope values; other label references stay symbolic.
    fn realize(&mut self, kind: ValueKind, operand: &Operand) -> Result<Value, RuntimeError> {
        match operand {
            Operand::I32(n) => Ok(Value::I32(*n)),
            Operand::True => Ok(Value::True),
            Operand::False => Ok(Value::False),
            Operand::Str(text) => {
                let id = self.intern(text);
                Ok(Value::Str(id))
            }
            Operand::Symbol(name) => Ok(Value::Symbol(name.clone())),
            Operand::Id(label) => match kind {
                ValueKind::Const => {
                    let Some((pool_kind, payload)) = self.pool.get(label).cloned() else {
                        return Err(self.fault(format!("unknown constant `{label}`")));
                    };
                    self.realize(pool_kind, &payload)
                }
                ValueKind::Scope => Ok(Value::Scope(label.clone())),
                _ => Ok(Value::Id(label.clone())),
            },
        }
    }

    fn arith(&mut self, apply: impl Fn(i32, i32) -> i32) -> Result<(), RuntimeError> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        match (lhs, rhs) {
            (Value::I32(a), Value::I32(b)) => self.push(Value::I32(apply(a, b))),
            (lhs, rhs) => {
                Err(self.fault(format!("arithmetic on non-I32 values: {lhs}, {rhs}")))
            }
        }
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_CAPACITY {
            return Err(self.fault("stack overflow"));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or_else(|| self.fault("stack underflow"))
    }

    fn intern(&mut self, text: &str) -> StrId {
        if let Some(&id) = self.interned.get(text) {
            return id;
        }
        self.strings.push(text.to_string());
        let id = self.strings.len() - 1;
        self.interned.insert(text.to_string(), id);
        id
    }

    fn resolve_label(&self, label: &str) -> Result<usize, RuntimeError> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| self.fault(format!("unknown label `{label}`")))
    }

    /// Resolve a call target: a code label directly, a slot holding a
    /// reference, or a constant-pool entry pointing at a label.
    fn resolve_target(&self, name: &str) -> Result<usize, RuntimeError> {
        if let Some(&index) = self.labels.get(name) {
            return Ok(index);
        }

        match self.slots.get(name) {
            Some(Value::Id(label) | Value::Scope(label)) => return self.resolve_target(label),
            Some(Value::I32(index)) => return Ok(*index as usize),
            Some(other) => {
                return Err(self.fault(format!("`{name}` is not callable: {other}")));
            }
            None => {}
        }

        if let Some((_, Operand::Id(label))) = self.pool.get(name) {
            if label != name {
                return self.resolve_target(label);
            }
        }

        Err(self.fault(format!("cannot call `{name}`")))
    }

    fn get_register(&self, register: Register) -> Value {
        match register {
            Register::Pc => Value::I32(self.pc as i32),
            Register::Esp => Value::I32(self.stack.len() as i32),
            Register::Ebp => self.ebp.clone(),
            Register::Lr => self.lr.clone(),
            Register::Jm => self.jm.clone(),
            Register::Rt => self.rt.clone(),
        }
    }

    fn set_register(&mut self, register: Register, value: Value) -> Result<(), RuntimeError> {
        match register {
            Register::Pc => {
                let Value::I32(index) = value else {
                    return Err(self.fault(format!("pc expects an I32, got {value}")));
                };
                self.pc = index as usize;
            }
            Register::Esp => {
                let Value::I32(len) = value else {
                    return Err(self.fault(format!("esp expects an I32, got {value}")));
                };
                let len = len as usize;
                if len > self.stack.len() {
                    return Err(self.fault("cannot grow the stack through esp"));
                }
                self.stack.truncate(len);
            }
            Register::Ebp => self.ebp = value,
            Register::Lr => self.lr = value,
            Register::Jm => self.jm = value,
            Register::Rt => self.rt = value,
        }
        Ok(())
    }

    /// Render a value for program output.
    fn display_value(&self, value: &Value) -> String {
        match value {
            Value::Str(id) => self.strings.get(*id).cloned().unwrap_or_default(),
            value => value.to_string(),
        }
    }

    fn registers(&self) -> RegisterFile {
        RegisterFile {
            pc: self.at,
            esp: self.stack.len(),
            ebp: self.ebp.clone(),
            lr: self.lr.clone(),
            jm: self.jm.clone(),
            rt: self.rt.clone(),
        }
    }

    fn fault(&self, message: impl Into<String>) -> RuntimeError {
        RuntimeError::new(message, self.current.clone(), self.codes.clone(), self.registers())
    }

    /// The current program counter.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Whether the machine is still running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Executed instruction count.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// The value stack, bottom first.
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// The value on top of the stack.
    pub fn stack_top(&self) -> Option<&Value> {
        self.stack.last()
    }

    /// Read a named slot (mostly for tests and debugging).
    pub fn slot(&self, name: &str) -> Option<&Value> {
        self.slots.get(name)
    }

    /// Resolve an interned string.
    pub fn string(&self, id: StrId) -> Option<&str> {
        self.strings.get(id).map(String::as_str)
    }

    /// Render the value a program left on top of the stack.
    pub fn render_top(&self) -> Option<String> {
        self.stack_top().map(|value| self.display_value(value))
    }
}
