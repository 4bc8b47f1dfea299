//! Embedded assembler for `opcode("…")` strings
//!
//! A restricted micro-syntax: one label (`name:`) or instruction per
//! line, lowercase mnemonics, `#`-prefixed immediates. Identifier and
//! label operands are resolved through the enclosing scope, so a
//! function written with the escape hatch addresses its parameters by
//! their plain names.

use leaven_core::{Code, Instr, Operand, Register, ValueKind};
use leaven_error::{GeneratorError, Loc};
use rustc_hash::FxHashSet;

use crate::scope::{ScopeId, ScopeTree};

/// Assemble an inline opcode string into code for the current section.
pub fn assemble(
    scopes: &ScopeTree,
    scope: ScopeId,
    source: &str,
    loc: &Loc,
) -> Result<Vec<Code>, GeneratorError> {
    // The string token's location points at the `%{` opener; the text
    // itself starts two bytes later.
    let base = loc.offset + 2;

    // Pre-scan label definitions so forward jumps resolve.
    let mut locals = FxHashSet::default();
    for line in source.lines() {
        if let Some(name) = line.trim().strip_suffix(':') {
            if !name.is_empty() && !name.contains(char::is_whitespace) {
                locals.insert(name.to_string());
            }
        }
    }

    let resolver = Resolver { scopes, scope, locals };

    let mut codes = Vec::new();
    let mut offset = 0;
    for line in source.split('\n') {
        let line_loc = Loc::new(loc.source.clone(), base + offset);
        offset += line.len() + 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(name) = line.strip_suffix(':') {
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(GeneratorError::OpcodeSyntax {
                    detail: format!("`{line}` is not a valid label"),
                    loc: line_loc,
                });
            }
            codes.push(Code::Label(resolver.resolve(name, &line_loc)?));
            continue;
        }

        codes.push(Code::Instr(instruction(&resolver, line, &line_loc)?));
    }

    Ok(codes)
}

struct Resolver<'a> {
    scopes: &'a ScopeTree,
    scope: ScopeId,
    locals: FxHashSet<String>,
}

impl Resolver<'_> {
    /// Resolve a label or identifier operand. Labels defined in the
    /// same opcode block qualify under the current module; names bound
    /// in the scope qualify under their defining module; dotted names
    /// pass through as already qualified.
    fn resolve(&self, name: &str, loc: &Loc) -> Result<String, GeneratorError> {
        if self.locals.contains(name) {
            return Ok(self.scopes.qualified(self.scope, name));
        }
        if let Some(qualified) = self.scopes.qualified2(self.scope, name) {
            return Ok(qualified);
        }
        if name.contains('.') {
            return Ok(name.to_string());
        }
        Err(GeneratorError::Lookup { name: name.to_string(), loc: loc.clone() })
    }
}

fn instruction(
    resolver: &Resolver<'_>,
    line: &str,
    loc: &Loc,
) -> Result<Instr, GeneratorError> {
    let syntax_err = |detail: String| GeneratorError::OpcodeSyntax { detail, loc: loc.clone() };

    let mut parts = line.split_whitespace();
    let opname = parts.next().unwrap_or_default();
    let operands: Vec<&str> = parts.collect();

    let kind = |name: &str| {
        ValueKind::from_name(name)
            .ok_or_else(|| syntax_err(format!("unknown type tag `{name}`")))
    };
    let register = |name: &str| {
        Register::from_name(name)
            .ok_or_else(|| syntax_err(format!("unknown register `{name}`")))
    };
    let arity = |text: &str| {
        text.parse::<usize>().map_err(|_| GeneratorError::InvalidI32 {
            lexeme: text.to_string(),
            loc: loc.clone(),
        })
    };
    let immediate = |text: &str| -> Result<Operand, GeneratorError> {
        match text.strip_prefix('#') {
            Some("true") => Ok(Operand::True),
            Some("false") => Ok(Operand::False),
            Some(digits) => digits.parse::<i32>().map(Operand::I32).map_err(|_| {
                GeneratorError::InvalidI32 { lexeme: digits.to_string(), loc: loc.clone() }
            }),
            None => resolver.resolve(text, loc).map(Operand::Id),
        }
    };

    let instr = match (opname, operands.as_slice()) {
        ("push", [ty, imm]) => Instr::Push(kind(ty)?, immediate(imm)?),
        ("add", [ty]) => Instr::Add(kind(ty)?),
        ("sub", [ty]) => Instr::Sub(kind(ty)?),
        ("load", [ty, name]) => Instr::Load(kind(ty)?, resolver.resolve(name, loc)?),
        ("store", [ty, name]) => Instr::Store(kind(ty)?, resolver.resolve(name, loc)?),
        ("jz", [name]) => Instr::Jz(resolver.resolve(name, loc)?),
        ("jmp", [name]) => Instr::Jmp(resolver.resolve(name, loc)?),
        ("call", [name]) => Instr::Call(resolver.resolve(name, loc)?),
        ("call0", []) => Instr::Call0,
        ("ret", []) => Instr::Ret,
        ("mov", [reg]) => Instr::Mov(register(reg)?, None),
        ("mov", [reg, imm]) => Instr::Mov(register(reg)?, Some(immediate(imm)?)),
        ("stw", [reg]) => Instr::Stw(register(reg)?),
        ("ldw", [reg]) => Instr::Ldw(register(reg)?),
        ("swap", []) => Instr::Swap,
        ("frame", [n]) => Instr::Frame(arity(n)?),
        ("frame_init", [n]) => Instr::FrameInit(arity(n)?),
        ("concat", []) => Instr::Concat,
        ("println", []) => Instr::Println,
        ("halt", []) => Instr::Halt,
        ("push" | "add" | "sub" | "load" | "store" | "jz" | "jmp" | "call" | "call0" | "ret"
        | "mov" | "stw" | "ldw" | "swap" | "frame" | "frame_init" | "concat" | "println"
        | "halt", _) => {
            return Err(syntax_err(format!("wrong operands for `{opname}`")));
        }
        _ => {
            return Err(GeneratorError::UnknownUserOpcode {
                name: opname.to_string(),
                loc: loc.clone(),
            });
        }
    };

    Ok(instr)
}
