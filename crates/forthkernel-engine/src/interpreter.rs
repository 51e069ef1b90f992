use std::io::Write;
use std::sync::Arc;

use crate::error::{EngineError, ErrorCode, Result};
use crate::input::Source;
use crate::word::{Control, Definition, Instr, Prim, Word, WordKind, PRIMITIVES};
use crate::{EmitSink, ForthEngine, HostFn};

const MAX_CALL_DEPTH: usize = 1000;
const CELL: i64 = 8;

// Data-space layout: STATE and BASE occupy the first two cells so that
// `STATE @` and `BASE !` work like any other variable.
const STATE_ADDR: i64 = 0;
const BASE_ADDR: i64 = CELL;
const DATA_START: usize = 2 * CELL as usize;

// Interpret-time strings (`S"` outside a definition, `PARSE`, host strings)
// live in a ring buffer addressed from here, so they never interleave with
// data-space allocations.
const TRANSIENT_BASE: i64 = 1 << 32;
const TRANSIENT_SIZE: usize = 64 * 1024;

const MAX_DATA_SPACE: usize = 16 * 1024 * 1024;
const MAX_FIELD_WIDTH: i64 = 4096;

// ============================================================================
// Interpreter
// ============================================================================

/// A compact reference Forth engine.
///
/// Cells are `i64`, data space is byte addressed and only grows, colon
/// definitions compile to threaded code.
pub struct Interpreter {
    data_stack: Vec<i64>,
    return_stack: Vec<i64>,
    /// Data space; `HERE` is its length.
    memory: Vec<u8>,
    transient: Vec<u8>,
    transient_pos: usize,
    words: Vec<Word>,
    host_fns: Vec<HostFn>,
    /// Sources of the active (possibly nested) interpretations.
    inputs: Vec<Source>,
    definition: Option<Definition>,
    sink: EmitSink,
    call_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Create an engine with the built-in word set. Output goes to stdout
    /// until a sink is installed.
    pub fn new() -> Self {
        let mut memory = vec![0u8; DATA_START];
        memory[BASE_ADDR as usize..DATA_START].copy_from_slice(&10i64.to_le_bytes());

        let words = PRIMITIVES
            .iter()
            .map(|(name, prim, immediate)| Word {
                name: (*name).to_string(),
                kind: WordKind::Primitive(*prim),
                immediate: *immediate,
                hidden: false,
            })
            .collect();

        Interpreter {
            data_stack: Vec::with_capacity(64),
            return_stack: Vec::with_capacity(64),
            memory,
            transient: vec![0u8; TRANSIENT_SIZE],
            transient_pos: 0,
            words,
            host_fns: Vec::new(),
            inputs: Vec::new(),
            definition: None,
            sink: Box::new(|c| {
                let mut out = std::io::stdout();
                let _ = write!(out, "{c}");
                if c == '\n' {
                    let _ = out.flush();
                }
            }),
            call_depth: 0,
        }
    }

    /// Current data stack, bottom first.
    pub fn stack(&self) -> &[i64] {
        &self.data_stack
    }

    pub fn is_compiling(&self) -> bool {
        self.read_cell(STATE_ADDR).map(|s| s != 0).unwrap_or(false)
    }

    // ------------------------------------------------------------------------
    // Text interpreter
    // ------------------------------------------------------------------------

    fn interpret_source(&mut self) -> Result<()> {
        while let Some(token) = self.inputs.last_mut().and_then(Source::parse_name) {
            self.interpret_token(&token)?;
        }
        Ok(())
    }

    fn interpret_token(&mut self, token: &str) -> Result<()> {
        if let Some(index) = self.find(token) {
            if self.is_compiling() && !self.words[index].immediate {
                self.compile(Instr::Call(index))
            } else {
                self.execute(index)
            }
        } else if let Some(value) = self.parse_number(token) {
            if self.is_compiling() {
                self.compile(Instr::Lit(value))
            } else {
                self.data_stack.push(value);
                Ok(())
            }
        } else {
            Err(EngineError::UndefinedWord(token.to_string()))
        }
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.words.iter().rposition(|w| !w.hidden && w.name == name)
    }

    fn parse_number(&self, token: &str) -> Option<i64> {
        i64::from_str_radix(token, self.base()).ok()
    }

    /// Return to a clean interpret state after a failed top-level
    /// interpretation.
    fn recover(&mut self, code: ErrorCode) {
        if let Some(def) = self.definition.take() {
            if def.index + 1 == self.words.len() {
                self.words.pop();
            }
        }
        self.set_state(false);
        self.return_stack.clear();
        if matches!(code, ErrorCode::Abort | ErrorCode::Unknown) {
            self.data_stack.clear();
        }
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    fn execute(&mut self, index: usize) -> Result<()> {
        let kind = self.words[index].kind.clone();
        match kind {
            WordKind::Primitive(prim) => self.primitive(prim),
            WordKind::Colon(code) => {
                if self.call_depth >= MAX_CALL_DEPTH {
                    return Err(EngineError::CallDepth(MAX_CALL_DEPTH));
                }
                self.call_depth += 1;
                let result = self.run(&code);
                self.call_depth -= 1;
                result
            }
            WordKind::Address(value) | WordKind::Constant(value) => {
                self.data_stack.push(value);
                Ok(())
            }
            WordKind::Host(slot) => {
                let func = Arc::clone(&self.host_fns[slot]);
                func(self as &mut dyn ForthEngine)
            }
        }
    }

    /// Execute threaded code.
    fn run(&mut self, code: &[Instr]) -> Result<()> {
        let mut ip = 0;
        while let Some(instr) = code.get(ip) {
            ip += 1;
            match instr {
                Instr::Call(index) => self.execute(*index)?,
                Instr::Lit(value) => self.data_stack.push(*value),
                Instr::Print(text) => self.emit_str(text),
                Instr::Compile(index) => self.compile(Instr::Call(*index))?,
                Instr::Branch(target) => ip = *target,
                Instr::ZeroBranch(target) => {
                    if self.pop_value()? == 0 {
                        ip = *target;
                    }
                }
                Instr::Do => {
                    let (limit, start) = self.pop_pair()?;
                    self.return_stack.push(limit);
                    self.return_stack.push(start);
                }
                Instr::QDo(target) => {
                    let (limit, start) = self.pop_pair()?;
                    if limit == start {
                        ip = *target;
                    } else {
                        self.return_stack.push(limit);
                        self.return_stack.push(start);
                    }
                }
                Instr::Loop(body) => {
                    let index = self.rpop()?.wrapping_add(1);
                    if index == self.rpeek(0)? {
                        self.rpop()?;
                    } else {
                        self.return_stack.push(index);
                        ip = *body;
                    }
                }
                Instr::PlusLoop(body) => {
                    let step = self.pop_value()?;
                    let index = self.rpop()?;
                    let limit = self.rpeek(0)?;
                    let before = index.wrapping_sub(limit);
                    let after = before.wrapping_add(step);
                    // Terminate when the index crosses the limit boundary.
                    if (before ^ after) < 0 {
                        self.rpop()?;
                    } else {
                        self.return_stack.push(index.wrapping_add(step));
                        ip = *body;
                    }
                }
                Instr::Leave(target) => {
                    self.rpop()?;
                    self.rpop()?;
                    ip = *target;
                }
                Instr::Exit => return Ok(()),
            }
        }
        Ok(())
    }

    fn primitive(&mut self, prim: Prim) -> Result<()> {
        match prim {
            // stack
            Prim::Dup => {
                let a = self.peek(0)?;
                self.data_stack.push(a);
            }
            Prim::Drop => {
                self.pop_value()?;
            }
            Prim::Swap => {
                let (a, b) = self.pop_pair()?;
                self.data_stack.extend([b, a]);
            }
            Prim::Over => {
                let a = self.peek(1)?;
                self.data_stack.push(a);
            }
            Prim::Rot => {
                let c = self.pop_value()?;
                let (a, b) = self.pop_pair()?;
                self.data_stack.extend([b, c, a]);
            }
            Prim::MinusRot => {
                let c = self.pop_value()?;
                let (a, b) = self.pop_pair()?;
                self.data_stack.extend([c, a, b]);
            }
            Prim::Nip => {
                let (_, b) = self.pop_pair()?;
                self.data_stack.push(b);
            }
            Prim::Tuck => {
                let (a, b) = self.pop_pair()?;
                self.data_stack.extend([b, a, b]);
            }
            Prim::TwoDup => {
                let (a, b) = (self.peek(1)?, self.peek(0)?);
                self.data_stack.extend([a, b]);
            }
            Prim::TwoDrop => {
                self.pop_pair()?;
            }
            Prim::TwoSwap => {
                let (c, d) = self.pop_pair()?;
                let (a, b) = self.pop_pair()?;
                self.data_stack.extend([c, d, a, b]);
            }
            Prim::TwoOver => {
                let (a, b) = (self.peek(3)?, self.peek(2)?);
                self.data_stack.extend([a, b]);
            }
            Prim::QDup => {
                let a = self.peek(0)?;
                if a != 0 {
                    self.data_stack.push(a);
                }
            }
            Prim::Pick => {
                let u = self.pop_value()?;
                let depth = usize::try_from(u).map_err(|_| EngineError::StackUnderflow)?;
                let value = self.peek(depth)?;
                self.data_stack.push(value);
            }
            Prim::Depth => self.data_stack.push(self.data_stack.len() as i64),
            Prim::ToR => {
                let a = self.pop_value()?;
                self.return_stack.push(a);
            }
            Prim::RFrom => {
                let a = self.rpop()?;
                self.data_stack.push(a);
            }
            Prim::RFetch => {
                let a = self.rpeek(0)?;
                self.data_stack.push(a);
            }

            // arithmetic and logic
            Prim::Add => self.binary(i64::wrapping_add)?,
            Prim::Sub => self.binary(i64::wrapping_sub)?,
            Prim::Mul => self.binary(i64::wrapping_mul)?,
            Prim::Div => {
                let (a, b) = self.pop_divisor_pair()?;
                self.data_stack.push(a.wrapping_div(b));
            }
            Prim::Mod => {
                let (a, b) = self.pop_divisor_pair()?;
                self.data_stack.push(a.wrapping_rem(b));
            }
            Prim::DivMod => {
                let (a, b) = self.pop_divisor_pair()?;
                self.data_stack.extend([a.wrapping_rem(b), a.wrapping_div(b)]);
            }
            Prim::Negate => self.unary(i64::wrapping_neg)?,
            Prim::Abs => self.unary(i64::wrapping_abs)?,
            Prim::Min => self.binary(i64::min)?,
            Prim::Max => self.binary(i64::max)?,
            Prim::OnePlus => self.unary(|a| a.wrapping_add(1))?,
            Prim::OneMinus => self.unary(|a| a.wrapping_sub(1))?,
            Prim::TwoStar => self.unary(|a| a.wrapping_shl(1))?,
            Prim::TwoSlash => self.unary(|a| a >> 1)?,
            Prim::And => self.binary(|a, b| a & b)?,
            Prim::Or => self.binary(|a, b| a | b)?,
            Prim::Xor => self.binary(|a, b| a ^ b)?,
            Prim::Invert => self.unary(|a| !a)?,
            Prim::LShift => {
                self.binary(|a, b| (a as u64).checked_shl(b as u32).unwrap_or(0) as i64)?
            }
            Prim::RShift => {
                self.binary(|a, b| (a as u64).checked_shr(b as u32).unwrap_or(0) as i64)?
            }
            Prim::Eq => self.binary(|a, b| flag(a == b))?,
            Prim::Ne => self.binary(|a, b| flag(a != b))?,
            Prim::Lt => self.binary(|a, b| flag(a < b))?,
            Prim::Gt => self.binary(|a, b| flag(a > b))?,
            Prim::ULt => self.binary(|a, b| flag((a as u64) < (b as u64)))?,
            Prim::ZeroEq => self.unary(|a| flag(a == 0))?,
            Prim::ZeroLt => self.unary(|a| flag(a < 0))?,
            Prim::ZeroGt => self.unary(|a| flag(a > 0))?,
            Prim::ZeroNe => self.unary(|a| flag(a != 0))?,
            Prim::True => self.data_stack.push(-1),
            Prim::False => self.data_stack.push(0),

            // memory
            Prim::Fetch => {
                let addr = self.pop_value()?;
                let value = self.read_cell(addr)?;
                self.data_stack.push(value);
            }
            Prim::Store => {
                let (value, addr) = self.pop_pair()?;
                self.write_cell(addr, value)?;
            }
            Prim::CFetch => {
                let addr = self.pop_value()?;
                let byte = self.read_byte(addr)?;
                self.data_stack.push(i64::from(byte));
            }
            Prim::CStore => {
                let (value, addr) = self.pop_pair()?;
                *self.byte_mut(addr)? = value as u8;
            }
            Prim::PlusStore => {
                let (n, addr) = self.pop_pair()?;
                let value = self.read_cell(addr)?.wrapping_add(n);
                self.write_cell(addr, value)?;
            }
            Prim::Here => self.data_stack.push(self.memory.len() as i64),
            Prim::Allot => {
                let n = self.pop_value()?;
                let new_len = (self.memory.len() as i64)
                    .checked_add(n)
                    .ok_or(EngineError::DataSpaceExhausted(n))?;
                if new_len < DATA_START as i64 {
                    return Err(EngineError::InvalidAddress(new_len));
                }
                if new_len as usize > MAX_DATA_SPACE {
                    return Err(EngineError::DataSpaceExhausted(n));
                }
                self.memory.resize(new_len as usize, 0);
            }
            Prim::Comma => {
                let value = self.pop_value()?;
                self.append(&value.to_le_bytes())?;
            }
            Prim::CComma => {
                let value = self.pop_value()?;
                self.append(&[value as u8])?;
            }
            Prim::Cells => self.unary(|a| a.wrapping_mul(CELL))?,
            Prim::CellPlus => self.unary(|a| a.wrapping_add(CELL))?,
            Prim::Chars => {}
            Prim::CharPlus => self.unary(|a| a.wrapping_add(1))?,
            Prim::CMove => {
                let len = self.pop_value()?;
                let (src, dst) = self.pop_pair()?;
                let bytes = self.read_bytes(src, len)?;
                for (offset, byte) in bytes.into_iter().enumerate() {
                    *self.byte_mut(displace(dst, offset as i64)?)? = byte;
                }
            }
            Prim::Fill => {
                let ch = self.pop_value()?;
                let (addr, len) = self.pop_pair()?;
                for offset in 0..len.max(0) {
                    *self.byte_mut(displace(addr, offset)?)? = ch as u8;
                }
            }
            Prim::State => self.data_stack.push(STATE_ADDR),
            Prim::Base => self.data_stack.push(BASE_ADDR),
            Prim::Decimal => self.write_cell(BASE_ADDR, 10)?,
            Prim::Hex => self.write_cell(BASE_ADDR, 16)?,

            // output
            Prim::Dot => {
                let n = self.pop_value()?;
                let text = format_signed(n, self.base());
                self.emit_str(&text);
                self.emit(' ');
            }
            Prim::UDot => {
                let n = self.pop_value()?;
                let text = format_unsigned(n as u64, self.base());
                self.emit_str(&text);
                self.emit(' ');
            }
            Prim::DotR => {
                let (n, width) = self.pop_pair()?;
                if width > MAX_FIELD_WIDTH {
                    return Err(EngineError::FieldWidth(width));
                }
                let text = format_signed(n, self.base());
                let width = usize::try_from(width).unwrap_or(0);
                self.emit_str(&format!("{text:>width$}"));
            }
            Prim::Emit => {
                let c = self.pop_value()?;
                self.emit(u32::try_from(c).ok().and_then(char::from_u32).unwrap_or('?'));
            }
            Prim::Cr => self.emit('\n'),
            Prim::Space => self.emit(' '),
            Prim::Spaces => {
                let n = self.pop_value()?;
                if n > MAX_FIELD_WIDTH {
                    return Err(EngineError::FieldWidth(n));
                }
                for _ in 0..n.max(0) {
                    self.emit(' ');
                }
            }
            Prim::Type => {
                let text = self.pop_string()?;
                self.emit_str(&text);
            }
            Prim::DotS => {
                let mut text = format!("<{}> ", self.data_stack.len());
                for value in &self.data_stack {
                    text.push_str(&format_signed(*value, self.base()));
                    text.push(' ');
                }
                self.emit_str(&text);
            }
            Prim::Words => {
                let names: Vec<&str> = self
                    .words
                    .iter()
                    .rev()
                    .filter(|w| !w.hidden)
                    .map(|w| w.name.as_str())
                    .collect();
                let text = format!("{}\n", names.join(" "));
                self.emit_str(&text);
            }

            // defining
            Prim::Colon => {
                if self.definition.is_some() {
                    return Err(EngineError::ControlMismatch(":".to_string()));
                }
                let name = self.parse_name()?;
                let index = self.words.len();
                self.words.push(Word {
                    name,
                    kind: WordKind::Colon(Arc::new(Vec::new())),
                    immediate: false,
                    hidden: true,
                });
                self.definition = Some(Definition {
                    index,
                    code: Vec::new(),
                    control: Vec::new(),
                });
                self.set_state(true);
            }
            Prim::Semicolon => {
                self.compiling(";")?;
                let Some(def) = self.definition.take() else {
                    return Err(EngineError::CompileOnly(";".to_string()));
                };
                if !def.control.is_empty() {
                    let name = self.words[def.index].name.clone();
                    self.definition = Some(def);
                    return Err(EngineError::ControlMismatch(name));
                }
                let word = &mut self.words[def.index];
                word.kind = WordKind::Colon(Arc::new(def.code));
                word.hidden = false;
                self.set_state(false);
            }
            Prim::Variable => {
                let name = self.parse_name()?;
                let addr = self.memory.len() as i64;
                self.append(&0i64.to_le_bytes())?;
                self.define(name, WordKind::Address(addr));
            }
            Prim::Constant => {
                let value = self.pop_value()?;
                let name = self.parse_name()?;
                self.define(name, WordKind::Constant(value));
            }
            Prim::Create => {
                let name = self.parse_name()?;
                let addr = self.memory.len() as i64;
                self.define(name, WordKind::Address(addr));
            }
            Prim::Immediate => {
                if let Some(word) = self.words.iter_mut().rev().find(|w| !w.hidden) {
                    word.immediate = true;
                }
            }

            // compiling
            Prim::LeftBracket => self.set_state(false),
            Prim::RightBracket => {
                if self.definition.is_none() {
                    return Err(EngineError::NoDefinition);
                }
                self.set_state(true);
            }
            Prim::Literal => {
                self.compiling("LITERAL")?;
                let value = self.pop_value()?;
                self.compile(Instr::Lit(value))?;
            }
            Prim::SLiteral => {
                self.compiling("SLITERAL")?;
                let text = self.pop_string()?;
                self.compile_string(&text)?;
            }
            Prim::Postpone => {
                self.compiling("POSTPONE")?;
                let name = self.parse_name()?;
                let index = self
                    .find(&name)
                    .ok_or(EngineError::UndefinedWord(name))?;
                if self.words[index].immediate {
                    self.compile(Instr::Call(index))?;
                } else {
                    self.compile(Instr::Compile(index))?;
                }
            }
            Prim::Recurse => {
                let index = self.compiling("RECURSE")?.index;
                self.compile(Instr::Call(index))?;
            }
            Prim::Exit => {
                self.compiling("EXIT")?.code.push(Instr::Exit);
            }
            Prim::If => {
                let def = self.compiling("IF")?;
                def.control.push(Control::If(def.code.len()));
                def.code.push(Instr::ZeroBranch(0));
            }
            Prim::Else => {
                let def = self.compiling("ELSE")?;
                let pos = def.code.len();
                def.code.push(Instr::Branch(0));
                match def.control.pop() {
                    Some(Control::If(orig)) => patch(&mut def.code, orig, pos + 1),
                    _ => return Err(EngineError::ControlMismatch("ELSE".to_string())),
                }
                def.control.push(Control::Else(pos));
            }
            Prim::Then => {
                let def = self.compiling("THEN")?;
                let end = def.code.len();
                match def.control.pop() {
                    Some(Control::If(orig)) | Some(Control::Else(orig)) => {
                        patch(&mut def.code, orig, end)
                    }
                    _ => return Err(EngineError::ControlMismatch("THEN".to_string())),
                }
            }
            Prim::Begin => {
                let def = self.compiling("BEGIN")?;
                def.control.push(Control::Begin(def.code.len()));
            }
            Prim::Until | Prim::Again => {
                let name = if prim == Prim::Until { "UNTIL" } else { "AGAIN" };
                let def = self.compiling(name)?;
                let Some(Control::Begin(dest)) = def.control.pop() else {
                    return Err(EngineError::ControlMismatch(name.to_string()));
                };
                def.code.push(if prim == Prim::Until {
                    Instr::ZeroBranch(dest)
                } else {
                    Instr::Branch(dest)
                });
            }
            Prim::While => {
                let def = self.compiling("WHILE")?;
                if !matches!(def.control.last(), Some(Control::Begin(_))) {
                    return Err(EngineError::ControlMismatch("WHILE".to_string()));
                }
                def.control.push(Control::While(def.code.len()));
                def.code.push(Instr::ZeroBranch(0));
            }
            Prim::Repeat => {
                let def = self.compiling("REPEAT")?;
                let (Some(Control::While(orig)), Some(Control::Begin(dest))) =
                    (def.control.pop(), def.control.pop())
                else {
                    return Err(EngineError::ControlMismatch("REPEAT".to_string()));
                };
                def.code.push(Instr::Branch(dest));
                let end = def.code.len();
                patch(&mut def.code, orig, end);
            }
            Prim::Do => {
                let def = self.compiling("DO")?;
                def.code.push(Instr::Do);
                def.control.push(Control::Do {
                    body: def.code.len(),
                    leaves: Vec::new(),
                });
            }
            Prim::QDo => {
                let def = self.compiling("?DO")?;
                let pos = def.code.len();
                def.code.push(Instr::QDo(0));
                def.control.push(Control::Do {
                    body: def.code.len(),
                    leaves: vec![pos],
                });
            }
            Prim::Loop | Prim::PlusLoop => {
                let name = if prim == Prim::Loop { "LOOP" } else { "+LOOP" };
                let def = self.compiling(name)?;
                let Some(Control::Do { body, leaves }) = def.control.pop() else {
                    return Err(EngineError::ControlMismatch(name.to_string()));
                };
                def.code.push(if prim == Prim::Loop {
                    Instr::Loop(body)
                } else {
                    Instr::PlusLoop(body)
                });
                let end = def.code.len();
                for pos in leaves {
                    patch(&mut def.code, pos, end);
                }
            }
            Prim::Leave => {
                let def = self.compiling("LEAVE")?;
                let pos = def.code.len();
                let Some(leaves) = def.control.iter_mut().rev().find_map(|c| match c {
                    Control::Do { leaves, .. } => Some(leaves),
                    _ => None,
                }) else {
                    return Err(EngineError::ControlMismatch("LEAVE".to_string()));
                };
                leaves.push(pos);
                def.code.push(Instr::Leave(0));
            }
            Prim::I => {
                let index = self.rpeek(0)?;
                self.data_stack.push(index);
            }
            Prim::J => {
                let index = self.rpeek(2)?;
                self.data_stack.push(index);
            }

            // parsing
            Prim::DotQuote => {
                let text = self.parse_until('"')?;
                if self.is_compiling() {
                    self.compile(Instr::Print(text))?;
                } else {
                    self.emit_str(&text);
                }
            }
            Prim::SQuote => {
                let text = self.parse_until('"')?;
                if self.is_compiling() {
                    self.compile_string(&text)?;
                } else {
                    self.push_string(&text);
                }
            }
            Prim::DotParen => {
                let text = self.parse_until(')')?;
                self.emit_str(&text);
            }
            Prim::Paren => {
                self.parse_until(')')?;
            }
            Prim::Backslash => {
                if let Some(source) = self.inputs.last_mut() {
                    source.skip_line();
                }
            }
            Prim::Char => {
                let c = self.parse_char()?;
                self.data_stack.push(c);
            }
            Prim::BracketChar => {
                self.compiling("[CHAR]")?;
                let c = self.parse_char()?;
                self.compile(Instr::Lit(c))?;
            }
            Prim::Parse => {
                let delim = self.pop_value()?;
                let delim = u32::try_from(delim)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or(' ');
                let text = self
                    .inputs
                    .last_mut()
                    .map(|source| source.parse_lenient(delim))
                    .unwrap_or_default();
                self.push_string(&text);
            }
            Prim::Evaluate => {
                let code = self.pop_string()?;
                self.interpret(&code, true)
                    .map_err(EngineError::Interpretation)?;
            }

            // control
            Prim::Quit => return Err(EngineError::Quit),
            Prim::Abort => return Err(EngineError::Aborted),
            Prim::Bye => return Err(EngineError::Bye),
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Compilation helpers
    // ------------------------------------------------------------------------

    fn define(&mut self, name: String, kind: WordKind) {
        self.words.push(Word {
            name,
            kind,
            immediate: false,
            hidden: false,
        });
    }

    fn compile(&mut self, instr: Instr) -> Result<()> {
        self.definition
            .as_mut()
            .ok_or(EngineError::NoDefinition)?
            .code
            .push(instr);
        Ok(())
    }

    /// Copy `text` into data space and compile its `c-addr u` pair.
    fn compile_string(&mut self, text: &str) -> Result<()> {
        let addr = self.memory.len() as i64;
        self.append(text.as_bytes())?;
        self.compile(Instr::Lit(addr))?;
        self.compile(Instr::Lit(text.len() as i64))
    }

    /// The definition under construction, for a word that is only valid
    /// while compiling.
    fn compiling(&mut self, word: &str) -> Result<&mut Definition> {
        if !self.is_compiling() {
            return Err(EngineError::CompileOnly(word.to_string()));
        }
        self.definition
            .as_mut()
            .ok_or_else(|| EngineError::CompileOnly(word.to_string()))
    }

    fn set_state(&mut self, compiling: bool) {
        let value: i64 = if compiling { -1 } else { 0 };
        let start = STATE_ADDR as usize;
        self.memory[start..start + CELL as usize].copy_from_slice(&value.to_le_bytes());
    }

    fn base(&self) -> u32 {
        match self.read_cell(BASE_ADDR) {
            Ok(b) if (2..=36).contains(&b) => b as u32,
            _ => 10,
        }
    }

    // ------------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------------

    fn parse_name(&mut self) -> Result<String> {
        self.inputs
            .last_mut()
            .and_then(Source::parse_name)
            .ok_or(EngineError::EndOfInput)
    }

    fn parse_until(&mut self, delim: char) -> Result<String> {
        self.inputs
            .last_mut()
            .and_then(|source| source.parse_until(delim))
            .ok_or(EngineError::EndOfInput)
    }

    fn parse_char(&mut self) -> Result<i64> {
        let name = self.parse_name()?;
        name.chars()
            .next()
            .map(|c| c as i64)
            .ok_or(EngineError::EndOfInput)
    }

    // ------------------------------------------------------------------------
    // Stacks
    // ------------------------------------------------------------------------

    fn pop_value(&mut self) -> Result<i64> {
        self.data_stack.pop().ok_or(EngineError::StackUnderflow)
    }

    /// Pop two values, returning them in stack order (deeper first).
    fn pop_pair(&mut self) -> Result<(i64, i64)> {
        if self.data_stack.len() < 2 {
            return Err(EngineError::StackUnderflow);
        }
        let b = self.pop_value()?;
        let a = self.pop_value()?;
        Ok((a, b))
    }

    fn pop_divisor_pair(&mut self) -> Result<(i64, i64)> {
        let (a, b) = self.pop_pair()?;
        if b == 0 {
            return Err(EngineError::DivisionByZero);
        }
        Ok((a, b))
    }

    fn peek(&self, depth: usize) -> Result<i64> {
        self.data_stack
            .len()
            .checked_sub(depth + 1)
            .map(|i| self.data_stack[i])
            .ok_or(EngineError::StackUnderflow)
    }

    fn unary(&mut self, op: impl FnOnce(i64) -> i64) -> Result<()> {
        let a = self.pop_value()?;
        self.data_stack.push(op(a));
        Ok(())
    }

    fn binary(&mut self, op: impl FnOnce(i64, i64) -> i64) -> Result<()> {
        let (a, b) = self.pop_pair()?;
        self.data_stack.push(op(a, b));
        Ok(())
    }

    fn rpop(&mut self) -> Result<i64> {
        self.return_stack
            .pop()
            .ok_or(EngineError::ReturnStackUnderflow)
    }

    fn rpeek(&self, depth: usize) -> Result<i64> {
        self.return_stack
            .len()
            .checked_sub(depth + 1)
            .map(|i| self.return_stack[i])
            .ok_or(EngineError::ReturnStackUnderflow)
    }

    // ------------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------------

    fn read_byte(&self, addr: i64) -> Result<u8> {
        let byte = if addr >= TRANSIENT_BASE {
            self.transient.get((addr - TRANSIENT_BASE) as usize)
        } else if addr >= 0 {
            self.memory.get(addr as usize)
        } else {
            None
        };
        byte.copied().ok_or(EngineError::InvalidAddress(addr))
    }

    fn byte_mut(&mut self, addr: i64) -> Result<&mut u8> {
        let byte = if addr >= TRANSIENT_BASE {
            self.transient.get_mut((addr - TRANSIENT_BASE) as usize)
        } else if addr >= 0 {
            self.memory.get_mut(addr as usize)
        } else {
            None
        };
        byte.ok_or(EngineError::InvalidAddress(addr))
    }

    fn read_bytes(&self, addr: i64, len: i64) -> Result<Vec<u8>> {
        if len < 0 {
            return Err(EngineError::InvalidAddress(addr));
        }
        (0..len)
            .map(|offset| self.read_byte(displace(addr, offset)?))
            .collect()
    }

    fn read_cell(&self, addr: i64) -> Result<i64> {
        let mut buf = [0u8; CELL as usize];
        for (offset, slot) in buf.iter_mut().enumerate() {
            *slot = self.read_byte(displace(addr, offset as i64)?)?;
        }
        Ok(i64::from_le_bytes(buf))
    }

    fn write_cell(&mut self, addr: i64, value: i64) -> Result<()> {
        for (offset, byte) in value.to_le_bytes().into_iter().enumerate() {
            *self.byte_mut(displace(addr, offset as i64)?)? = byte;
        }
        Ok(())
    }

    /// Append `bytes` at HERE.
    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if self.memory.len() + bytes.len() > MAX_DATA_SPACE {
            return Err(EngineError::DataSpaceExhausted(bytes.len() as i64));
        }
        self.memory.extend_from_slice(bytes);
        Ok(())
    }

    fn alloc_transient(&mut self, bytes: &[u8]) -> i64 {
        if bytes.len() > self.transient.len() {
            self.transient.resize(bytes.len(), 0);
        }
        if self.transient_pos + bytes.len() > self.transient.len() {
            self.transient_pos = 0;
        }
        let start = self.transient_pos;
        self.transient[start..start + bytes.len()].copy_from_slice(bytes);
        self.transient_pos += bytes.len();
        TRANSIENT_BASE + start as i64
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    fn emit(&mut self, c: char) {
        (self.sink)(c);
    }

    fn emit_str(&mut self, text: &str) {
        for c in text.chars() {
            (self.sink)(c);
        }
    }
}

impl ForthEngine for Interpreter {
    fn bind(&mut self, name: &str, func: HostFn) {
        let slot = self.host_fns.len();
        self.host_fns.push(func);
        self.define(name.to_string(), WordKind::Host(slot));
    }

    fn interpret(&mut self, code: &str, silent: bool) -> std::result::Result<(), ErrorCode> {
        let outermost = self.inputs.is_empty();
        self.inputs.push(Source::new(code));
        let result = self.interpret_source();
        self.inputs.pop();

        match result {
            Ok(()) => {
                if outermost && !silent {
                    let status = if self.is_compiling() {
                        " compiled\n"
                    } else {
                        " ok\n"
                    };
                    self.emit_str(status);
                }
                Ok(())
            }
            Err(err) => {
                if let Some(message) = err.diagnostic() {
                    self.emit_str(&message);
                    self.emit('\n');
                }
                let code = err.error_code();
                if outermost {
                    self.recover(code);
                }
                Err(code)
            }
        }
    }

    fn push(&mut self, value: i64) {
        self.data_stack.push(value);
    }

    fn pop(&mut self) -> Result<i64> {
        self.pop_value()
    }

    fn pop_string(&mut self) -> Result<String> {
        let (addr, len) = self.pop_pair()?;
        let bytes = self.read_bytes(addr, len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn push_string(&mut self, s: &str) {
        let addr = self.alloc_transient(s.as_bytes());
        self.data_stack.push(addr);
        self.data_stack.push(s.len() as i64);
    }

    fn replace_sink(&mut self, sink: EmitSink) -> EmitSink {
        std::mem::replace(&mut self.sink, sink)
    }
}

/// `addr + offset`, failing instead of wrapping.
fn displace(addr: i64, offset: i64) -> Result<i64> {
    addr.checked_add(offset).ok_or(EngineError::InvalidAddress(addr))
}

fn flag(b: bool) -> i64 {
    if b {
        -1
    } else {
        0
    }
}

fn patch(code: &mut [Instr], pos: usize, target: usize) {
    match &mut code[pos] {
        Instr::Branch(t) | Instr::ZeroBranch(t) | Instr::QDo(t) | Instr::Leave(t) => *t = target,
        _ => {}
    }
}

fn format_unsigned(mut value: u64, base: u32) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        let digit = (value % u64::from(base)) as u32;
        digits.push(
            char::from_digit(digit, base)
                .unwrap_or('?')
                .to_ascii_uppercase(),
        );
        value /= u64::from(base);
    }
    digits.iter().rev().collect()
}

fn format_signed(value: i64, base: u32) -> String {
    if value < 0 {
        format!("-{}", format_unsigned(value.unsigned_abs(), base))
    } else {
        format_unsigned(value as u64, base)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Interpreter whose output is collected into the returned buffer.
    fn engine() -> (Interpreter, Arc<Mutex<String>>) {
        let out = Arc::new(Mutex::new(String::new()));
        let out_clone = out.clone();
        let mut forth = Interpreter::new();
        drop(forth.replace_sink(Box::new(move |c| out_clone.lock().unwrap().push(c))));
        (forth, out)
    }

    fn eval(code: &str) -> (std::result::Result<(), ErrorCode>, String, Vec<i64>) {
        let (mut forth, out) = engine();
        let result = forth.interpret(code, true);
        let text = out.lock().unwrap().clone();
        (result, text, forth.stack().to_vec())
    }

    fn output(code: &str) -> String {
        let (result, text, _) = eval(code);
        assert_eq!(result, Ok(()), "interpretation failed: {text}");
        text
    }

    #[test]
    fn arithmetic_leaves_result_on_stack() {
        let (result, _, stack) = eval("2 3 + 4 *");
        assert_eq!(result, Ok(()));
        assert_eq!(stack, vec![20]);
    }

    #[test]
    fn dot_prints_with_trailing_space() {
        assert_eq!(output("1 2 + ."), "3 ");
        assert_eq!(output("-7 ."), "-7 ");
    }

    #[test]
    fn oversized_allot_is_an_abort() {
        let (mut forth, out) = engine();
        assert_eq!(
            forth.interpret("9223372036854775807 ALLOT", true),
            Err(ErrorCode::Abort)
        );
        assert!(out.lock().unwrap().contains("data space exhausted"));
        assert_eq!(
            forth.interpret("-9223372036854775807 ALLOT", true),
            Err(ErrorCode::Abort)
        );

        forth.interpret("HERE 8 ALLOT HERE SWAP - .", true).unwrap();
        assert!(out.lock().unwrap().ends_with("8 "));
    }

    #[test]
    fn out_of_range_addresses_are_rejected() {
        let (result, text, _) = eval("0 9223372036854775807 2 CMOVE");
        assert_eq!(result, Err(ErrorCode::Abort));
        assert!(text.contains("invalid memory address"));

        let (result, _, _) = eval("9223372036854775807 4 65 FILL");
        assert_eq!(result, Err(ErrorCode::Abort));
        let (result, _, _) = eval("9223372036854775807 @");
        assert_eq!(result, Err(ErrorCode::Abort));
    }

    #[test]
    fn field_widths_are_bounded() {
        let (result, text, _) = eval("1 9223372036854775807 .R");
        assert_eq!(result, Err(ErrorCode::Abort));
        assert!(text.contains("field width 9223372036854775807 out of range"));

        let (result, _, _) = eval("9223372036854775807 SPACES");
        assert_eq!(result, Err(ErrorCode::Abort));
        assert_eq!(output("7 4 .R"), "   7");
        assert_eq!(output("3 SPACES"), "   ");
    }

    #[test]
    fn colon_definition() {
        assert_eq!(output(": SQUARE DUP * ; 5 SQUARE ."), "25 ");
    }

    #[test]
    fn if_else_then() {
        assert_eq!(
            output(": SIGN 0< IF .\" neg\" ELSE .\" pos\" THEN ; -3 SIGN 4 SIGN"),
            "negpos"
        );
    }

    #[test]
    fn do_loop_counts() {
        assert_eq!(output(": COUNT 5 0 DO I . LOOP ; COUNT"), "0 1 2 3 4 ");
    }

    #[test]
    fn question_do_skips_empty_range() {
        assert_eq!(output(": T 0 0 ?DO I . LOOP .\" done\" ; T"), "done");
    }

    #[test]
    fn plus_loop_steps() {
        assert_eq!(output(": T 10 0 DO I . 3 +LOOP ; T"), "0 3 6 9 ");
    }

    #[test]
    fn leave_exits_loop() {
        assert_eq!(
            output(": T 10 0 DO I 3 = IF LEAVE THEN I . LOOP ; T"),
            "0 1 2 "
        );
    }

    #[test]
    fn nested_loops_see_outer_index() {
        assert_eq!(output(": T 2 0 DO 2 0 DO J . LOOP LOOP ; T"), "0 0 1 1 ");
    }

    #[test]
    fn begin_until() {
        assert_eq!(
            output(": T 3 BEGIN DUP . 1- DUP 0= UNTIL DROP ; T"),
            "3 2 1 "
        );
    }

    #[test]
    fn begin_while_repeat() {
        assert_eq!(
            output(": T 0 BEGIN DUP 3 < WHILE DUP . 1+ REPEAT DROP ; T"),
            "0 1 2 "
        );
    }

    #[test]
    fn recursion() {
        assert_eq!(
            output(": FACT DUP 1 > IF DUP 1- RECURSE * THEN ; 5 FACT ."),
            "120 "
        );
    }

    #[test]
    fn variables_and_constants() {
        assert_eq!(
            output("VARIABLE X 42 X ! X @ . 7 CONSTANT SEVEN SEVEN ."),
            "42 7 "
        );
    }

    #[test]
    fn create_and_allot() {
        assert_eq!(
            output("CREATE BUF 3 CELLS ALLOT 9 BUF CELL+ ! BUF CELL+ @ ."),
            "9 "
        );
    }

    #[test]
    fn strings() {
        assert_eq!(output("S\" hello\" TYPE"), "hello");
        assert_eq!(output(": GREET .\" hi\" ; GREET"), "hi");
        assert_eq!(output(": NAME S\" forth\" ; NAME TYPE NAME NIP ."), "forth5 ");
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(output("( a comment ) 1 . \\ rest of line\n2 ."), "1 2 ");
    }

    #[test]
    fn hex_and_decimal() {
        assert_eq!(output("HEX FF DECIMAL ."), "255 ");
        assert_eq!(output("255 HEX . DECIMAL"), "FF ");
    }

    #[test]
    fn right_justified_number() {
        assert_eq!(output("42 5 .R"), "   42");
        assert_eq!(output("42 0 .R"), "42");
    }

    #[test]
    fn immediate_word_runs_while_compiling() {
        assert_eq!(
            output(": MODE STATE @ IF .\" c\" ELSE .\" i\" THEN ; IMMEDIATE MODE : X MODE ;"),
            "ic"
        );
    }

    #[test]
    fn sliteral_compiles_parsed_text() {
        let code = ": STR\" [CHAR] \" PARSE POSTPONE SLITERAL ; IMMEDIATE \
                    : GREET STR\" hi there\" TYPE ; GREET GREET";
        assert_eq!(output(code), "hi therehi there");
    }

    #[test]
    fn postpone_defers_ordinary_words() {
        let code = ": PLUS POSTPONE + ; IMMEDIATE : ADD PLUS ; 3 4 ADD .";
        assert_eq!(output(code), "7 ");
        let code = ": MY-IF POSTPONE IF ; IMMEDIATE : SIGN 0< MY-IF 1 ELSE 2 THEN . ; -5 SIGN 5 SIGN";
        assert_eq!(output(code), "1 2 ");
    }

    #[test]
    fn postpone_outside_definition_is_compile_only() {
        let (result, text, _) = eval("POSTPONE DUP");
        assert_eq!(result, Err(ErrorCode::Abort));
        assert!(text.contains("POSTPONE is compile-only"));
    }

    #[test]
    fn parse_reads_following_input() {
        assert_eq!(output(": SAY [CHAR] \" PARSE TYPE ; SAY hello there\""), "hello there");
    }

    #[test]
    fn evaluate_interprets_string() {
        assert_eq!(output("S\" 1 2 +\" EVALUATE ."), "3 ");
    }

    #[test]
    fn undefined_word_aborts_and_clears_stack() {
        let (mut forth, out) = engine();
        assert_eq!(forth.interpret("1 2 FOO", true), Err(ErrorCode::Abort));
        assert!(out.lock().unwrap().contains("undefined word: FOO"));
        assert!(forth.stack().is_empty());
    }

    #[test]
    fn underflow_aborts() {
        let (result, text, _) = eval("DROP");
        assert_eq!(result, Err(ErrorCode::Abort));
        assert!(text.contains("stack underflow"));
    }

    #[test]
    fn division_by_zero_aborts() {
        let (result, text, _) = eval("1 0 /");
        assert_eq!(result, Err(ErrorCode::Abort));
        assert!(text.contains("division by zero"));
    }

    #[test]
    fn compile_only_words_rejected_when_interpreting() {
        let (result, text, _) = eval("1 IF");
        assert_eq!(result, Err(ErrorCode::Abort));
        assert!(text.contains("IF is compile-only"));
    }

    #[test]
    fn quit_and_bye_codes() {
        assert_eq!(eval("QUIT").0, Err(ErrorCode::Quit));
        assert_eq!(eval("BYE").0, Err(ErrorCode::Bye));
        assert_eq!(eval("ABORT").0, Err(ErrorCode::Abort));
    }

    #[test]
    fn quit_keeps_data_stack() {
        let (result, _, stack) = eval("1 2 QUIT");
        assert_eq!(result, Err(ErrorCode::Quit));
        assert_eq!(stack, vec![1, 2]);
    }

    #[test]
    fn unterminated_parsing_words_hit_end_of_input() {
        assert_eq!(eval(".\" abc").0, Err(ErrorCode::EndOfInput));
        assert_eq!(eval(":").0, Err(ErrorCode::EndOfInput));
        assert_eq!(eval("VARIABLE").0, Err(ErrorCode::EndOfInput));
    }

    #[test]
    fn failed_definition_is_discarded() {
        let (mut forth, _) = engine();
        assert_eq!(forth.interpret(": BAD FOO ;", true), Err(ErrorCode::Abort));
        assert!(!forth.is_compiling());
        assert_eq!(forth.interpret("BAD", true), Err(ErrorCode::Abort));
    }

    #[test]
    fn unbalanced_control_is_rejected() {
        let (mut forth, out) = engine();
        assert_eq!(forth.interpret(": T IF ;", true), Err(ErrorCode::Abort));
        assert!(out.lock().unwrap().contains("unbalanced control structure in T"));
        assert_eq!(forth.interpret("T", true), Err(ErrorCode::Abort));
    }

    #[test]
    fn definitions_span_interpretations() {
        let (mut forth, out) = engine();
        assert_eq!(forth.interpret(": FOO 1", true), Ok(()));
        assert!(forth.is_compiling());
        assert_eq!(forth.interpret("2 ;", true), Ok(()));
        assert!(!forth.is_compiling());
        assert_eq!(forth.interpret("FOO . .", true), Ok(()));
        assert_eq!(out.lock().unwrap().as_str(), "2 1 ");
    }

    #[test]
    fn hidden_until_complete() {
        let (mut forth, out) = engine();
        forth.interpret(": PARTIAL [ WORDS ]", true).unwrap();
        assert!(!out.lock().unwrap().contains("PARTIAL"));
        forth.interpret(";", true).unwrap();
        out.lock().unwrap().clear();
        forth.interpret("WORDS", true).unwrap();
        assert!(out.lock().unwrap().starts_with("PARTIAL "));
    }

    #[test]
    fn ok_chatter_when_not_silent() {
        let (mut forth, out) = engine();
        forth.interpret("1 2 +", false).unwrap();
        assert_eq!(out.lock().unwrap().as_str(), " ok\n");
        out.lock().unwrap().clear();
        forth.interpret(": X", false).unwrap();
        assert_eq!(out.lock().unwrap().as_str(), " compiled\n");
    }

    #[test]
    fn words_lists_newest_first() {
        let text = output(": ZED ; WORDS");
        assert!(text.starts_with("ZED "));
        assert!(text.contains(" DUP "));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn redefinition_shadows() {
        assert_eq!(output(": X 1 . ; : X 2 . ; X"), "2 ");
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let (result, text, _) = eval(": LOOPY RECURSE ; LOOPY");
        assert_eq!(result, Err(ErrorCode::Abort));
        assert!(text.contains("max call depth exceeded"));
    }

    #[test]
    fn host_function_uses_stack() {
        let (mut forth, out) = engine();
        forth.bind(
            "DOUBLE",
            Arc::new(|f: &mut dyn ForthEngine| -> Result<()> {
                let n = f.pop()?;
                f.push(n * 2);
                Ok(())
            }),
        );
        forth.interpret("21 DOUBLE .", true).unwrap();
        assert_eq!(out.lock().unwrap().as_str(), "42 ");
    }

    #[test]
    fn host_function_string_round_trip() {
        let (mut forth, out) = engine();
        forth.bind(
            "UPPER",
            Arc::new(|f: &mut dyn ForthEngine| -> Result<()> {
                let s = f.pop_string()?;
                f.push_string(&s.to_uppercase());
                Ok(())
            }),
        );
        forth.interpret("S\" abc\" UPPER TYPE", true).unwrap();
        assert_eq!(out.lock().unwrap().as_str(), "ABC");
    }

    #[test]
    fn host_function_can_interpret_nested() {
        let (mut forth, out) = engine();
        forth.bind(
            "LOADIT",
            Arc::new(|f: &mut dyn ForthEngine| -> Result<()> {
                f.interpret(": INNER 7 ;", true)
                    .map_err(EngineError::Interpretation)
            }),
        );
        forth.interpret("LOADIT INNER .", true).unwrap();
        assert_eq!(out.lock().unwrap().as_str(), "7 ");
    }

    #[test]
    fn nested_failure_propagates_once() {
        let (mut forth, out) = engine();
        forth.bind(
            "BROKEN",
            Arc::new(|f: &mut dyn ForthEngine| -> Result<()> {
                f.interpret("NOPE", true)
                    .map_err(EngineError::Interpretation)
            }),
        );
        assert_eq!(forth.interpret("BROKEN 1 .", true), Err(ErrorCode::Abort));
        let text = out.lock().unwrap().clone();
        assert_eq!(text.matches("undefined word: NOPE").count(), 1);
        assert!(!text.contains("1 "));
    }

    #[test]
    fn host_error_aborts() {
        let (mut forth, out) = engine();
        forth.bind(
            "FAILS",
            Arc::new(|_: &mut dyn ForthEngine| -> Result<()> {
                Err(EngineError::Host {
                    name: "FAILS".into(),
                    message: "nope".into(),
                })
            }),
        );
        assert_eq!(forth.interpret("FAILS", true), Err(ErrorCode::Abort));
        assert!(out.lock().unwrap().contains("FAILS: nope"));
    }

    #[test]
    fn replace_sink_redirects_output() {
        let (mut forth, first) = engine();
        let second = Arc::new(Mutex::new(String::new()));
        let second_clone = second.clone();
        let previous = forth.replace_sink(Box::new(move |c| second_clone.lock().unwrap().push(c)));
        forth.interpret("1 .", true).unwrap();
        drop(forth.replace_sink(previous));
        forth.interpret("2 .", true).unwrap();
        assert_eq!(second.lock().unwrap().as_str(), "1 ");
        assert_eq!(first.lock().unwrap().as_str(), "2 ");
    }

    #[test]
    fn invalid_address_aborts() {
        let (result, text, _) = eval("-8 @");
        assert_eq!(result, Err(ErrorCode::Abort));
        assert!(text.contains("invalid memory address"));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_signed(0, 10), "0");
        assert_eq!(format_signed(-255, 16), "-FF");
        assert_eq!(format_unsigned(5, 2), "101");
    }
}
