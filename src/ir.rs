//! A small line-oriented IR: the built-in concrete artifact.
//!
//! The reduction core treats artifacts opaquely; this module supplies the
//! concrete representation the worked function-removal pass operates on. A
//! module is a sequence of function declarations (`declare name`) and
//! definitions (`fn name { ... }`) whose bodies hold register-based
//! instructions, including calls. The `undef` placeholder is the neutral
//! value dangling references are patched to during reduction.
//!
//! # Text format
//!
//! ```text
//! declare putchar
//! fn helper {
//!   %0 = const 7
//!   ret %0
//! }
//! fn main {
//!   %0 = call helper
//!   %1 = add %0 %0
//!   ret %1
//! }
//! ```
//!
//! Blank lines and `#` comment lines are ignored.

use std::fmt;
use std::io::{self, Write};

use crate::artifact::Artifact;

/// An instruction operand: a register defined earlier in the body, or the
/// neutral placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(u32),
    Undef,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "%{}", r),
            Operand::Undef => write!(f, "undef"),
        }
    }
}

/// A call target: a named function, or the placeholder left behind when the
/// named function was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Func(String),
    Undef,
}

impl fmt::Display for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callee::Func(name) => f.write_str(name),
            Callee::Undef => f.write_str("undef"),
        }
    }
}

/// One body instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    Const { dest: u32, value: i64 },
    Add { dest: u32, lhs: Operand, rhs: Operand },
    Call { dest: u32, callee: Callee, args: Vec<Operand> },
    Ret { value: Option<Operand> },
}

impl Inst {
    /// Register defined by this instruction, if any.
    pub fn dest(&self) -> Option<u32> {
        match self {
            Inst::Const { dest, .. } | Inst::Add { dest, .. } | Inst::Call { dest, .. } => {
                Some(*dest)
            }
            Inst::Ret { .. } => None,
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Const { dest, value } => write!(f, "%{} = const {}", dest, value),
            Inst::Add { dest, lhs, rhs } => write!(f, "%{} = add {} {}", dest, lhs, rhs),
            Inst::Call { dest, callee, args } => {
                write!(f, "%{} = call {}", dest, callee)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            Inst::Ret { value: Some(v) } => write!(f, "ret {}", v),
            Inst::Ret { value: None } => f.write_str("ret"),
        }
    }
}

/// A top-level function: a declaration (no body) or a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    /// `None` for declarations. Declarations are never reduction targets.
    pub body: Option<Vec<Inst>>,
}

impl Function {
    pub fn declaration(name: impl Into<String>) -> Self {
        Function { name: name.into(), body: None }
    }

    pub fn definition(name: impl Into<String>, body: Vec<Inst>) -> Self {
        Function { name: name.into(), body: Some(body) }
    }

    pub fn is_declaration(&self) -> bool {
        self.body.is_none()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            None => writeln!(f, "declare {}", self.name),
            Some(body) => {
                writeln!(f, "fn {} {{", self.name)?;
                for inst in body {
                    writeln!(f, "  {}", inst)?;
                }
                writeln!(f, "}}")
            }
        }
    }
}

/// A whole module: the unit of parsing, serialization and reduction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub functions: Vec<Function>,
}

/// Errors produced while parsing the text format.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: expected 'declare <name>' or 'fn <name> {{', got '{text}'")]
    MalformedHeader { line: usize, text: String },

    #[error("line {line}: malformed instruction '{text}'")]
    MalformedInst { line: usize, text: String },

    #[error("line {line}: instruction outside a function body")]
    InstOutsideBody { line: usize },

    #[error("line {line}: '}}' without an open function")]
    UnmatchedClose { line: usize },

    #[error("function '{name}' is missing its closing '}}'")]
    UnterminatedBody { name: String },
}

impl Module {
    /// Parse the text format.
    pub fn parse(input: &str) -> Result<Module, ParseError> {
        let mut functions = Vec::new();
        // Name and partial body of the definition currently being parsed.
        let mut open: Option<(String, Vec<Inst>)> = None;

        for (idx, raw) in input.lines().enumerate() {
            let line = idx + 1;
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            if let Some((name, body)) = open.as_mut() {
                if text == "}" {
                    let (name, body) = (name.clone(), std::mem::take(body));
                    functions.push(Function::definition(name, body));
                    open = None;
                } else {
                    body.push(parse_inst(text, line)?);
                }
                continue;
            }

            let mut tokens = text.split_whitespace();
            match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
                (Some("declare"), Some(name), None, _) => {
                    functions.push(Function::declaration(name));
                }
                (Some("fn"), Some(name), Some("{"), None) => {
                    open = Some((name.to_string(), Vec::new()));
                }
                (Some("}"), ..) => return Err(ParseError::UnmatchedClose { line }),
                _ if text.starts_with('%') || text.starts_with("ret") => {
                    return Err(ParseError::InstOutsideBody { line });
                }
                _ => {
                    return Err(ParseError::MalformedHeader { line, text: text.to_string() });
                }
            }
        }

        if let Some((name, _)) = open {
            return Err(ParseError::UnterminatedBody { name });
        }
        Ok(Module { functions })
    }

    /// Structural validity check.
    ///
    /// Holds iff: function names are unique; every register operand refers to
    /// a register defined earlier in the same body; destination registers are
    /// unique per body; every named callee resolves to a function of the
    /// module; and no call targets the `undef` placeholder. A placeholder
    /// callee only ever exists between the patch and sweep phases of a
    /// reduction, so one leaking out of a pass marks a broken candidate.
    pub fn validate(&self) -> bool {
        let mut names = std::collections::HashSet::new();
        for func in &self.functions {
            if !names.insert(func.name.as_str()) {
                return false;
            }
        }

        for func in &self.functions {
            let body = match &func.body {
                Some(body) => body,
                None => continue,
            };
            let mut defined = std::collections::HashSet::new();
            for inst in body {
                let operands_ok = match inst {
                    Inst::Const { .. } => true,
                    Inst::Add { lhs, rhs, .. } => {
                        operand_ok(lhs, &defined) && operand_ok(rhs, &defined)
                    }
                    Inst::Call { callee, args, .. } => {
                        let callee_ok = match callee {
                            Callee::Func(name) => names.contains(name.as_str()),
                            Callee::Undef => false,
                        };
                        callee_ok && args.iter().all(|a| operand_ok(a, &defined))
                    }
                    Inst::Ret { value } => {
                        value.as_ref().map_or(true, |v| operand_ok(v, &defined))
                    }
                };
                if !operands_ok {
                    return false;
                }
                if let Some(dest) = inst.dest() {
                    if !defined.insert(dest) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Definitions only, in module order. The function-removal pass indexes
    /// these 1-based.
    pub fn definitions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter(|f| !f.is_declaration())
    }
}

fn operand_ok(op: &Operand, defined: &std::collections::HashSet<u32>) -> bool {
    match op {
        Operand::Reg(r) => defined.contains(r),
        Operand::Undef => true,
    }
}

fn parse_operand(token: &str, line: usize) -> Result<Operand, ParseError> {
    if token == "undef" {
        return Ok(Operand::Undef);
    }
    token
        .strip_prefix('%')
        .and_then(|r| r.parse().ok())
        .map(Operand::Reg)
        .ok_or_else(|| ParseError::MalformedInst { line, text: token.to_string() })
}

fn parse_inst(text: &str, line: usize) -> Result<Inst, ParseError> {
    let malformed = || ParseError::MalformedInst { line, text: text.to_string() };
    let tokens: Vec<&str> = text.split_whitespace().collect();

    if tokens[0] == "ret" {
        return match tokens.len() {
            1 => Ok(Inst::Ret { value: None }),
            2 => Ok(Inst::Ret { value: Some(parse_operand(tokens[1], line)?) }),
            _ => Err(malformed()),
        };
    }

    // `%d = <op> ...`
    if tokens.len() < 3 || tokens[1] != "=" {
        return Err(malformed());
    }
    let dest: u32 = tokens[0]
        .strip_prefix('%')
        .and_then(|r| r.parse().ok())
        .ok_or_else(malformed)?;

    match tokens[2] {
        "const" if tokens.len() == 4 => {
            let value = tokens[3].parse().map_err(|_| malformed())?;
            Ok(Inst::Const { dest, value })
        }
        "add" if tokens.len() == 5 => Ok(Inst::Add {
            dest,
            lhs: parse_operand(tokens[3], line)?,
            rhs: parse_operand(tokens[4], line)?,
        }),
        "call" if tokens.len() >= 4 => {
            let callee = if tokens[3] == "undef" {
                Callee::Undef
            } else {
                Callee::Func(tokens[3].to_string())
            };
            let args = tokens[4..]
                .iter()
                .map(|t| parse_operand(t, line))
                .collect::<Result<_, _>>()?;
            Ok(Inst::Call { dest, callee, args })
        }
        _ => Err(malformed()),
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for func in &self.functions {
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

impl Artifact for Module {
    fn serialize(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(self.to_string().as_bytes())
    }

    fn is_well_formed(&self) -> bool {
        self.validate()
    }
}
