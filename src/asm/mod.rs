//! Two-pass assembler
//!
//! Translates the line-oriented mnemonic source language into a raw
//! binary image plus a label table. Pass 1 walks every line collecting
//! labels and computing statement sizes; unknown identifiers evaluate
//! to 0 because forward references resolve later. Pass 2 re-walks the
//! source with the full label table and emits bytes; undefined
//! identifiers and out-of-range branches are errors there.
//!
//! Errors carry file, line and column, are logged as they occur, and do
//! not abort the scan, so one run surfaces every problem; assembly
//! fails overall if any error was recorded.

mod scan;

use std::fmt;

use thiserror::Error;

use crate::isa::{opcode, Reg};
use scan::LineScanner;

/// Bounded table sizes
pub const MAX_LABELS: usize = 1000;
pub const MAX_SYMBOLS: usize = 1000;
/// Longest accepted label or symbol name
pub const MAX_NAME_LEN: usize = 64;

/// A recorded error or warning with its source position
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file, self.line, self.column, self.message
        )
    }
}

/// Overall assembly failure, carrying every recorded error
#[derive(Debug, Error)]
pub enum AsmError {
    #[error("assembly failed with {} error(s)", .errors.len())]
    Failed { errors: Vec<Diagnostic> },
}

/// A label collected in pass 1
#[derive(Debug, Clone)]
pub struct Label {
    pub name: String,
    pub address: u16,
    pub line: u32,
}

/// A host-defined symbol, consulted after the label table
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub value: u16,
}

/// Successful assembly output
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Contiguous bytes from `origin` to the highest address written
    pub image: Vec<u8>,
    /// Address of the first image byte
    pub origin: u16,
    pub labels: Vec<Label>,
    pub symbols: Vec<Symbol>,
}

impl Assembly {
    /// Textual listing of labels and symbols
    pub fn listing(&self) -> String {
        let mut out = String::new();
        out.push_str("Assembly listing\n");
        out.push_str("================\n\n");
        out.push_str(&format!(
            "origin 0x{:04X}, {} bytes\n",
            self.origin,
            self.image.len()
        ));

        if !self.labels.is_empty() {
            out.push_str("\nLabels:\n");
            for label in &self.labels {
                out.push_str(&format!(
                    "  {:<24} 0x{:04X}  (line {})\n",
                    label.name, label.address, label.line
                ));
            }
        }
        if !self.symbols.is_empty() {
            out.push_str("\nSymbols:\n");
            for symbol in &self.symbols {
                out.push_str(&format!("  {:<24} 0x{:04X}\n", symbol.name, symbol.value));
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    First,
    Second,
}

/// The assembler. One instance assembles one source; labels, symbols
/// and diagnostics accumulate on it.
pub struct Assembler {
    filename: String,
    pass: Pass,
    line_no: u32,

    buf: Vec<u8>,
    /// Lowest/highest addresses written in pass 2
    written: Option<(u16, u16)>,
    current: u16,
    origin: Option<u16>,

    labels: Vec<Label>,
    symbols: Vec<Symbol>,
    errors: Vec<Diagnostic>,
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            filename: String::from("<input>"),
            pass: Pass::First,
            line_no: 0,
            buf: vec![0; 0x10000],
            written: None,
            current: 0,
            origin: None,
            labels: Vec::new(),
            symbols: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Pre-define a symbol (e.g. from the command line). Returns false
    /// when the bounded symbol table is full; redefinition replaces the
    /// old value.
    pub fn define_symbol(&mut self, name: &str, value: u16) -> bool {
        if let Some(existing) = self.symbols.iter_mut().find(|s| s.name == name) {
            existing.value = value;
            return true;
        }
        if self.symbols.len() >= MAX_SYMBOLS {
            return false;
        }
        self.symbols.push(Symbol {
            name: name.to_string(),
            value,
        });
        true
    }

    /// Assemble a complete source text. `filename` is used for
    /// diagnostics only.
    pub fn assemble(&mut self, source: &str, filename: &str) -> Result<Assembly, AsmError> {
        self.filename = filename.to_string();
        self.errors.clear();
        self.labels.clear();
        self.buf.fill(0);

        for pass in [Pass::First, Pass::Second] {
            self.pass = pass;
            self.current = 0;
            self.origin = None;
            self.written = None;
            self.line_no = 0;

            for line in source.lines() {
                self.line_no += 1;
                self.parse_line(line);
            }
        }

        if !self.errors.is_empty() {
            return Err(AsmError::Failed {
                errors: std::mem::take(&mut self.errors),
            });
        }

        let (image, origin) = match self.written {
            Some((lo, hi)) => (self.buf[lo as usize..=hi as usize].to_vec(), lo),
            None => (Vec::new(), self.origin.unwrap_or(0)),
        };
        Ok(Assembly {
            image,
            origin,
            labels: self.labels.clone(),
            symbols: self.symbols.clone(),
        })
    }

    // ========== Line structure ==========

    fn parse_line(&mut self, line: &str) {
        let mut s = LineScanner::new(line);
        s.skip_whitespace();
        if s.at_end() {
            return;
        }

        // Label: identifier followed by ':' at the start of a statement
        let mark = s.mark();
        if let Some(name) = s.read_identifier() {
            let name = name.to_string();
            s.skip_whitespace();
            if s.eat(':') {
                if self.pass == Pass::First {
                    self.define_label(&name, s.column());
                }
                s.skip_whitespace();
                if s.at_end() {
                    return;
                }
            } else {
                s.rewind(mark);
            }
        }

        if s.eat('.') {
            self.parse_directive(&mut s);
        } else {
            self.parse_instruction(&mut s);
        }

        s.skip_whitespace();
        if !s.at_end() {
            self.error(s.column(), "unexpected characters after statement");
        }
    }

    fn parse_directive(&mut self, s: &mut LineScanner) {
        let column = s.column();
        let Some(name) = s.read_identifier() else {
            self.error(column, "expected directive name after '.'");
            return;
        };

        match name.to_ascii_lowercase().as_str() {
            "org" => {
                let address = self.expr(s);
                self.current = address;
                self.origin = Some(address);
            }
            "byte" => {
                let value = self.expr(s);
                self.emit(value as u8);
            }
            "word" => {
                let value = self.expr(s);
                self.emit_word(value);
            }
            "string" => self.parse_string(s),
            "include" => {
                let _path = self.parse_quoted(s);
                self.warning(column, "'.include' is not implemented; line skipped");
            }
            other => {
                self.error(column, &format!("unknown directive: .{}", other));
                // Consume the rest of the line; there is no way to size it
                while !s.at_end() {
                    s.bump();
                }
            }
        }
    }

    fn parse_string(&mut self, s: &mut LineScanner) {
        s.skip_whitespace();
        if !s.eat('"') {
            self.error(s.column(), "expected '\"' after .string");
            return;
        }
        loop {
            match s.peek() {
                Some('"') => {
                    s.bump();
                    return;
                }
                Some(c) if c != '\n' && c != '\r' => {
                    s.bump();
                    // Characters are emitted verbatim, one byte each
                    self.emit(c as u8);
                }
                _ => {
                    self.error(s.column(), "unterminated string");
                    return;
                }
            }
        }
    }

    /// Consume a quoted path, returning it when well-formed
    fn parse_quoted(&mut self, s: &mut LineScanner) -> Option<String> {
        s.skip_whitespace();
        if !s.eat('"') {
            return None;
        }
        let mut path = String::new();
        while let Some(c) = s.peek() {
            s.bump();
            if c == '"' {
                return Some(path);
            }
            path.push(c);
        }
        None
    }

    // ========== Instructions ==========

    fn parse_instruction(&mut self, s: &mut LineScanner) {
        let column = s.column();
        let Some(name) = s.read_identifier() else {
            self.error(column, "expected instruction");
            // Nothing recognisable; skip the line
            while !s.at_end() {
                s.bump();
            }
            return;
        };
        let mnemonic = name.to_ascii_uppercase();
        s.skip_whitespace();

        match mnemonic.as_str() {
            "LDI" => {
                let value = self.expr(s);
                self.emit(opcode::LDI);
                self.emit(value as u8);
            }
            "LDA" | "STA" => self.parse_load_store(s, &mnemonic, column),
            "MOV" => self.parse_register_op(s, opcode::MOV),
            "INC" => self.parse_register_op(s, opcode::INC),
            "DEC" => self.parse_register_op(s, opcode::DEC),
            "SHL" => self.parse_register_op(s, opcode::SHL),
            "SHR" => self.parse_register_op(s, opcode::SHR),
            "ROL" => self.parse_register_op(s, opcode::ROL),
            "ROR" => self.parse_register_op(s, opcode::ROR),
            "PUSH" => self.parse_register_op(s, opcode::PUSH),
            "POP" => self.parse_register_op(s, opcode::POP),
            "ADD" => self.parse_immediate_op(s, opcode::ADD),
            "SUB" => self.parse_immediate_op(s, opcode::SUB),
            "ADC" => self.parse_immediate_op(s, opcode::ADC),
            "SBC" => self.parse_immediate_op(s, opcode::SBC),
            "CMP" => self.parse_immediate_op(s, opcode::CMP),
            "AND" => self.parse_immediate_op(s, opcode::AND),
            "OR" => self.parse_immediate_op(s, opcode::OR),
            "XOR" => self.parse_immediate_op(s, opcode::XOR),
            "JMP" => {
                let target = self.expr(s);
                self.emit(opcode::JMP);
                self.emit_word(target);
            }
            "JSR" => {
                let target = self.expr(s);
                self.emit(opcode::JSR);
                self.emit_word(target);
            }
            "BEQ" => self.parse_branch(s, opcode::BEQ),
            "BNE" => self.parse_branch(s, opcode::BNE),
            "BCS" => self.parse_branch(s, opcode::BCS),
            "BCC" => self.parse_branch(s, opcode::BCC),
            "BMI" => self.parse_branch(s, opcode::BMI),
            "BPL" => self.parse_branch(s, opcode::BPL),
            "BVS" => self.parse_branch(s, opcode::BVS),
            "BVC" => self.parse_branch(s, opcode::BVC),
            "RTS" => self.emit(opcode::RTS),
            "PHA" => self.emit(opcode::PHA),
            "PLA" => self.emit(opcode::PLA),
            "PHP" => self.emit(opcode::PHP),
            "PLP" => self.emit(opcode::PLP),
            "SEI" => self.emit(opcode::SEI),
            "CLI" => self.emit(opcode::CLI),
            "NOP" => self.emit(opcode::NOP),
            "HLT" => self.emit(opcode::HLT),
            other => {
                self.error(column, &format!("unknown instruction: {}", other));
                while !s.at_end() {
                    s.bump();
                }
            }
        }
    }

    /// LDA/STA operand forms: `#expr` (immediate; a store cannot take
    /// one), `[expr]` absolute, `[X+expr]`, `[Y+expr]`, `[SP+expr]`.
    fn parse_load_store(&mut self, s: &mut LineScanner, mnemonic: &str, column: u32) {
        let store = mnemonic == "STA";
        if s.eat('#') {
            let value = self.number(s);
            if store {
                self.error(column, "immediate operand is not writable");
                return;
            }
            // A load of a literal is exactly the load-immediate opcode
            self.emit(opcode::LDI);
            self.emit(value as u8);
            return;
        }
        if !s.eat('[') {
            self.error(s.column(), "expected '#' or '[' operand");
            return;
        }

        // Index prefix: X+, Y+ or SP+
        let mark = s.mark();
        let index = s
            .read_identifier()
            .map(str::to_ascii_uppercase)
            .filter(|_| {
                s.skip_whitespace();
                s.eat('+')
            })
            .filter(|name| matches!(name.as_str(), "X" | "Y" | "SP"));
        if index.is_none() {
            s.rewind(mark);
        }

        let base = self.expr(s);
        s.skip_whitespace();
        if !s.eat(']') {
            self.error(s.column(), "expected ']'");
            return;
        }

        match index.as_deref() {
            None => {
                self.emit(if store { opcode::STA } else { opcode::LDA });
                self.emit_word(base);
            }
            Some("X") => {
                self.emit(if store { opcode::STA_X } else { opcode::LDA_X });
                self.emit_word(base);
            }
            Some("Y") => {
                self.emit(if store { opcode::STA_Y } else { opcode::LDA_Y });
                self.emit_word(base);
            }
            Some(_) => {
                // SP-indexed carries a single signed displacement byte
                if self.pass == Pass::Second && base > 0x00FF && base < 0xFF80 {
                    self.error(column, &format!("SP displacement out of range: {}", base));
                }
                self.emit(if store { opcode::STA_SP } else { opcode::LDA_SP });
                self.emit(base as u8);
            }
        }
    }

    fn parse_register_op(&mut self, s: &mut LineScanner, op: u8) {
        let column = s.column();
        let Some(name) = s.read_identifier() else {
            self.error(column, "expected register name");
            return;
        };
        let Some(reg) = Reg::from_name(name) else {
            self.error(column, &format!("unknown register: {}", name));
            return;
        };
        self.emit(op);
        self.emit(reg as u8);
    }

    fn parse_immediate_op(&mut self, s: &mut LineScanner, op: u8) {
        let value = self.expr(s);
        self.emit(op);
        self.emit(value as u8);
    }

    /// Branches take an absolute target expression which is converted
    /// to a signed displacement relative to the next instruction.
    fn parse_branch(&mut self, s: &mut LineScanner, op: u8) {
        let column = s.column();
        let target = self.expr(s);
        let next = self.current.wrapping_add(2);
        let displacement = target.wrapping_sub(next) as i16;
        // Range checking waits for pass 2, when forward labels resolve
        if self.pass == Pass::Second && !(-128..=127).contains(&displacement) {
            self.error(
                column,
                &format!("branch offset out of range: {}", displacement),
            );
        }
        self.emit(op);
        self.emit(displacement as u8);
    }

    // ========== Expressions ==========

    /// `expr := term (('+'|'-') term)*`, left-associative, wrapping at
    /// 16 bits. Terms are factors in this grammar.
    fn expr(&mut self, s: &mut LineScanner) -> u16 {
        let mut value = self.factor(s);
        loop {
            s.skip_whitespace();
            if s.eat('+') {
                value = value.wrapping_add(self.factor(s));
            } else if s.eat('-') {
                value = value.wrapping_sub(self.factor(s));
            } else {
                return value;
            }
        }
    }

    /// `factor := '(' expr ')' | '#' number | number | identifier`
    fn factor(&mut self, s: &mut LineScanner) -> u16 {
        s.skip_whitespace();
        if s.eat('(') {
            let value = self.expr(s);
            s.skip_whitespace();
            if !s.eat(')') {
                self.error(s.column(), "expected ')'");
            }
            return value;
        }
        if s.eat('#') {
            return self.number(s);
        }
        if s.at_number() {
            return self.number(s);
        }
        let column = s.column();
        if let Some(name) = s.read_identifier() {
            let name = name.to_string();
            return self.identifier_value(&name, column);
        }
        self.error(column, "expected number or identifier");
        0
    }

    fn number(&mut self, s: &mut LineScanner) -> u16 {
        let column = s.column();
        match s.read_number() {
            Ok(value) => value,
            Err(_) => {
                self.error(column, "malformed number");
                0
            }
        }
    }

    /// Identifier lookup: label table first, then symbols. Unresolved
    /// names are 0 in pass 1 (forward references) and errors in pass 2.
    fn identifier_value(&mut self, name: &str, column: u32) -> u16 {
        if let Some(label) = self.labels.iter().find(|l| l.name == name) {
            return label.address;
        }
        if let Some(symbol) = self.symbols.iter().find(|sym| sym.name == name) {
            return symbol.value;
        }
        if self.pass == Pass::Second {
            self.error(column, &format!("undefined label or symbol: {}", name));
        }
        0
    }

    // ========== Labels ==========

    fn define_label(&mut self, name: &str, column: u32) {
        if name.len() > MAX_NAME_LEN {
            self.error_now(column, "label name too long");
            return;
        }
        if self.labels.iter().any(|l| l.name == name) {
            self.error_now(column, &format!("duplicate label: {}", name));
            return;
        }
        if self.labels.len() >= MAX_LABELS {
            self.error_now(column, "too many labels");
            return;
        }
        self.labels.push(Label {
            name: name.to_string(),
            address: self.current,
            line: self.line_no,
        });
    }

    // ========== Emission ==========

    /// Advance the location counter; bytes land in the buffer only in
    /// pass 2, once every size is known.
    fn emit(&mut self, byte: u8) {
        if self.pass == Pass::Second {
            self.buf[self.current as usize] = byte;
            self.written = Some(match self.written {
                None => (self.current, self.current),
                Some((lo, hi)) => (lo.min(self.current), hi.max(self.current)),
            });
        }
        self.current = self.current.wrapping_add(1);
    }

    fn emit_word(&mut self, value: u16) {
        self.emit(value as u8);
        self.emit((value >> 8) as u8);
    }

    // ========== Diagnostics ==========

    /// Record an error at the current line. Both passes walk the same
    /// text, so syntax errors are recorded in pass 2 only; pass-1-only
    /// checks use [`Assembler::error_now`].
    fn error(&mut self, column: u32, message: &str) {
        if self.pass == Pass::Second {
            self.error_now(column, message);
        }
    }

    fn error_now(&mut self, column: u32, message: &str) {
        let diag = Diagnostic {
            file: self.filename.clone(),
            line: self.line_no,
            column,
            message: message.to_string(),
        };
        log::error!("{}", diag);
        self.errors.push(diag);
    }

    /// Log a warning; warnings never fail the assembly
    fn warning(&mut self, column: u32, message: &str) {
        if self.pass == Pass::Second {
            let diag = Diagnostic {
                file: self.filename.clone(),
                line: self.line_no,
                column,
                message: message.to_string(),
            };
            log::warn!("{}", diag);
        }
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}
