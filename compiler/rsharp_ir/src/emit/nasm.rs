//! x86-64 emission in NASM syntax
//!
//! Binary arithmetic arrives in destructive two-operand form (the pass
//! pipeline guarantees `result == op1`), divisions sit in `rax`, and every
//! instruction maps to a fixed template. Spilled references are addressed
//! through `rbp`-relative slots, materialized via the scratch registers
//! `r10`/`r11` that the allocator never hands out.

use crate::arch::{Architecture, HwRegister};
use crate::ir::*;
use rsharp_common::{RsError, RsResult};
use std::fmt::Write;

pub fn emit(tu: &TranslationUnit, arch: &Architecture) -> RsResult<String> {
    let mut emitter = NasmEmitter {
        tu,
        arch,
        out: String::new(),
        saved_registers: Vec::new(),
        caller_saved_in_use: Vec::new(),
        frame_bytes: 0,
        pending_arg_slots: 0,
    };
    emitter.translation_unit()?;
    Ok(emitter.out)
}

/// Resolved location of an operand
#[derive(Debug, Clone, PartialEq, Eq)]
enum Loc {
    Reg(HwRegister),
    /// Frame slot, `[rbp - (8 + offset)]`
    Slot(u64),
    Imm(i64),
    /// Label or global symbol; its value is the address
    Sym(String),
}

struct NasmEmitter<'a> {
    tu: &'a TranslationUnit,
    arch: &'a Architecture,
    out: String,
    saved_registers: Vec<HwRegister>,
    caller_saved_in_use: Vec<HwRegister>,
    frame_bytes: u64,
    pending_arg_slots: u64,
}

impl<'a> NasmEmitter<'a> {
    fn translation_unit(&mut self) -> RsResult<()> {
        self.out.push_str("; NASM code generated by the R-Sharp compiler (using RSI)\n\n");
        self.out.push_str("BITS 64\nsection .text\n\n");

        for label in &self.tu.extern_labels {
            let _ = writeln!(self.out, "extern {}", self.tu.pool.label(*label).name);
        }
        if !self.tu.extern_labels.is_empty() {
            self.out.push('\n');
        }

        for function in &self.tu.functions {
            let _ = writeln!(self.out, "global {}", self.tu.pool.label(function.label).name);
            self.function(function)?;
            self.out.push('\n');
        }

        if !self.tu.initialized_globals.is_empty() || !self.tu.strings.is_empty() {
            self.out.push_str("section .data\n");
            for (global, value) in &self.tu.initialized_globals {
                let _ = writeln!(self.out, "{}: dq {}", self.tu.pool.global(*global).name, value);
            }
            for (label, bytes) in &self.tu.strings {
                let rendered: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
                let _ = writeln!(
                    self.out,
                    "{}: db {}",
                    self.tu.pool.label(*label).name,
                    rendered.join(", ")
                );
            }
            self.out.push('\n');
        }

        if !self.tu.uninitialized_globals.is_empty() {
            self.out.push_str("section .bss\n");
            for global in &self.tu.uninitialized_globals {
                let _ = writeln!(self.out, "{}: resb 8", self.tu.pool.global(*global).name);
            }
            self.out.push('\n');
        }

        Ok(())
    }

    fn function(&mut self, function: &Function) -> RsResult<()> {
        // everything the function touches except the return value and the
        // frame base is preserved, so calls between compiled functions
        // cannot clobber live registers
        self.saved_registers = function
            .meta
            .all_registers
            .iter()
            .copied()
            .filter(|r| *r != self.arch.return_register && *r != self.arch.frame_pointer)
            .collect();
        self.caller_saved_in_use = function
            .meta
            .all_registers
            .iter()
            .copied()
            .filter(|r| self.arch.is_caller_saved(*r) && *r != self.arch.return_register)
            .collect();
        self.frame_bytes = function.meta.max_stack_usage.div_ceil(16) * 16;
        self.pending_arg_slots = 0;

        for instr in &function.instructions {
            self.instruction(instr)?;
        }
        Ok(())
    }

    fn instruction(&mut self, instr: &Instruction) -> RsResult<()> {
        use Opcode::*;
        match instr.opcode {
            Nop | SetLive | LoadParameter => Ok(()),
            FunctionBegin => self.prologue(),
            DefineLabel => {
                let _ = writeln!(self.out, "{}:", self.label_name(&instr.op1)?);
                Ok(())
            }
            Move => self.move_(instr),
            Return => self.return_(instr),
            Negate => self.unary_destructive(instr, "neg"),
            BinaryNot => self.unary_destructive(instr, "not"),
            LogicalNot => self.logical_not(instr),
            Add => self.binary_destructive(instr, "add"),
            Subtract => self.binary_destructive(instr, "sub"),
            BinaryAnd => self.binary_destructive(instr, "and"),
            Multiply => self.multiply(instr),
            Divide => self.divide(instr, false),
            Modulo => self.divide(instr, true),
            Equal => self.comparison(instr, "e"),
            NotEqual => self.comparison(instr, "ne"),
            LessThan => self.comparison(instr, "l"),
            LessThanOrEqual => self.comparison(instr, "le"),
            GreaterThan => self.comparison(instr, "g"),
            GreaterThanOrEqual => self.comparison(instr, "ge"),
            Jump => {
                let _ = writeln!(self.out, "jmp {}", self.label_name(&instr.op1)?);
                Ok(())
            }
            JumpIfZero => self.jump_if_zero(instr),
            StoreParameter => self.store_parameter(instr),
            Call => self.call(instr),
            StoreMemory => self.store_memory(instr),
            LoadMemory => self.load_memory(instr),
            AddressOf | LogicalAnd | LogicalOr => Err(internal(&format!(
                "opcode {} survived legalization",
                instr.opcode.mnemonic()
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Prologue / epilogue
    // ------------------------------------------------------------------

    fn prologue(&mut self) -> RsResult<()> {
        self.line("push rbp");
        self.line("mov rbp, rsp");
        if self.frame_bytes > 0 {
            let _ = writeln!(self.out, "sub rsp, {}", self.frame_bytes);
        }
        let saved = self.saved_registers.clone();
        for register in &saved {
            let _ = writeln!(self.out, "push {}", self.reg(*register));
        }
        if saved.len() % 2 == 1 {
            // keep rsp 16-byte aligned for call sites
            self.line("sub rsp, 8");
        }
        Ok(())
    }

    fn return_(&mut self, instr: &Instruction) -> RsResult<()> {
        match self.loc(&instr.op1)? {
            Loc::Reg(r) if r == self.arch.return_register => {}
            Loc::Reg(r) => {
                let _ = writeln!(self.out, "mov rax, {}", self.reg(r));
            }
            Loc::Imm(v) => {
                let _ = writeln!(self.out, "mov rax, {}", v);
            }
            Loc::Slot(offset) => {
                let _ = writeln!(self.out, "mov rax, {}", mem(offset));
            }
            Loc::Sym(name) => {
                let _ = writeln!(self.out, "mov rax, {}", name);
            }
        }

        if self.saved_registers.len() % 2 == 1 {
            self.line("add rsp, 8");
        }
        let saved = self.saved_registers.clone();
        for register in saved.iter().rev() {
            let _ = writeln!(self.out, "pop {}", self.reg(*register));
        }
        self.line("mov rsp, rbp");
        self.line("pop rbp");
        self.line("ret");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Data movement
    // ------------------------------------------------------------------

    fn move_(&mut self, instr: &Instruction) -> RsResult<()> {
        let Some(result) = self.result_loc(instr)? else { return Ok(()) };
        let source = self.loc(&instr.op1)?;
        match (result, source) {
            (Loc::Reg(d), Loc::Reg(s)) => {
                if d != s {
                    let _ = writeln!(self.out, "mov {}, {}", self.reg(d), self.reg(s));
                }
            }
            (Loc::Reg(d), Loc::Imm(v)) => {
                let _ = writeln!(self.out, "mov {}, {}", self.reg(d), v);
            }
            (Loc::Reg(d), Loc::Slot(offset)) => {
                let _ = writeln!(self.out, "mov {}, {}", self.reg(d), mem(offset));
            }
            (Loc::Reg(d), Loc::Sym(name)) => {
                let _ = writeln!(self.out, "mov {}, {}", self.reg(d), name);
            }
            (Loc::Slot(offset), Loc::Reg(s)) => {
                let _ = writeln!(self.out, "mov {}, {}", mem(offset), self.reg(s));
            }
            (Loc::Slot(offset), Loc::Imm(v)) if fits_i32(v) => {
                let _ = writeln!(self.out, "mov qword {}, {}", mem(offset), v);
            }
            (Loc::Slot(offset), source) => {
                let scratch = self.read_into_scratch(&source, 0);
                let _ = writeln!(self.out, "mov {}, {}", mem(offset), scratch);
            }
            (Loc::Imm(_) | Loc::Sym(_), _) => {
                return Err(internal("move into a non-reference location"))
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Arithmetic
    // ------------------------------------------------------------------

    fn unary_destructive(&mut self, instr: &Instruction, op: &str) -> RsResult<()> {
        let Some(result) = self.result_loc(instr)? else { return Ok(()) };
        self.require_two_operand_identity(instr)?;
        match result {
            Loc::Reg(r) => {
                let _ = writeln!(self.out, "{} {}", op, self.reg(r));
            }
            Loc::Slot(offset) => {
                let _ = writeln!(self.out, "{} qword {}", op, mem(offset));
            }
            _ => return Err(internal("unary arithmetic into a non-reference location")),
        }
        Ok(())
    }

    fn binary_destructive(&mut self, instr: &Instruction, op: &str) -> RsResult<()> {
        let Some(result) = self.result_loc(instr)? else { return Ok(()) };

        // the address-of pattern: ADD dst, &slot, rbp
        if let Operand::StackOffsetOf(target) = instr.op1 {
            let displacement = self.frame_displacement(target)?;
            match self.loc(&instr.op2)? {
                Loc::Reg(base) => {
                    let address = if displacement < 0 {
                        format!("[{} - {}]", self.reg(base), -displacement)
                    } else {
                        format!("[{} + {}]", self.reg(base), displacement)
                    };
                    match result {
                        Loc::Reg(d) => {
                            let _ = writeln!(self.out, "lea {}, {}", self.reg(d), address);
                        }
                        Loc::Slot(offset) => {
                            let _ = writeln!(self.out, "lea r10, {}", address);
                            let _ = writeln!(self.out, "mov {}, r10", mem(offset));
                        }
                        _ => return Err(internal("address-of into a non-reference location")),
                    }
                    Ok(())
                }
                _ => Err(internal("address-of without a register base")),
            }
        } else {
            self.require_two_operand_identity(instr)?;
            let op2 = self.loc(&instr.op2)?;
            match (result, op2) {
                (Loc::Reg(d), Loc::Reg(s)) => {
                    let _ = writeln!(self.out, "{} {}, {}", op, self.reg(d), self.reg(s));
                }
                (Loc::Reg(d), Loc::Imm(v)) if fits_i32(v) => {
                    let _ = writeln!(self.out, "{} {}, {}", op, self.reg(d), v);
                }
                (Loc::Reg(d), Loc::Slot(offset)) => {
                    let _ = writeln!(self.out, "{} {}, {}", op, self.reg(d), mem(offset));
                }
                (Loc::Reg(d), source) => {
                    let scratch = self.read_into_scratch(&source, 0);
                    let _ = writeln!(self.out, "{} {}, {}", op, self.reg(d), scratch);
                }
                (Loc::Slot(offset), Loc::Reg(s)) => {
                    let _ = writeln!(self.out, "{} qword {}, {}", op, mem(offset), self.reg(s));
                }
                (Loc::Slot(offset), Loc::Imm(v)) if fits_i32(v) => {
                    let _ = writeln!(self.out, "{} qword {}, {}", op, mem(offset), v);
                }
                (Loc::Slot(offset), source) => {
                    let scratch = self.read_into_scratch(&source, 0);
                    let _ = writeln!(self.out, "{} qword {}, {}", op, mem(offset), scratch);
                }
                _ => return Err(internal("binary arithmetic into a non-reference location")),
            }
            Ok(())
        }
    }

    fn multiply(&mut self, instr: &Instruction) -> RsResult<()> {
        let Some(result) = self.result_loc(instr)? else { return Ok(()) };
        self.require_two_operand_identity(instr)?;

        let rax = self.arch.div_register;
        let rdx = self.register_named("rdx")?;

        self.line("push rax");
        self.line("push rdx");
        // the multiplier must survive rax being loaded below
        let op2 = self.loc(&instr.op2)?;
        let multiplier = self.force_into_scratch(&op2, 0);
        match &result {
            Loc::Reg(r) => {
                if *r != rax {
                    let _ = writeln!(self.out, "mov rax, {}", self.reg(*r));
                }
            }
            Loc::Slot(offset) => {
                let _ = writeln!(self.out, "mov rax, {}", mem(*offset));
            }
            _ => return Err(internal("multiply into a non-reference location")),
        }
        let _ = writeln!(self.out, "imul {}", multiplier);
        match &result {
            Loc::Reg(r) => {
                if *r != rax {
                    let _ = writeln!(self.out, "mov {}, rax", self.reg(*r));
                }
            }
            Loc::Slot(offset) => {
                let _ = writeln!(self.out, "mov {}, rax", mem(*offset));
            }
            _ => unreachable!(),
        }
        if result == Loc::Reg(rdx) {
            self.line("add rsp, 8");
        } else {
            self.line("pop rdx");
        }
        if result == Loc::Reg(rax) {
            self.line("add rsp, 8");
        } else {
            self.line("pop rax");
        }
        Ok(())
    }

    fn divide(&mut self, instr: &Instruction, remainder: bool) -> RsResult<()> {
        // division isolation pinned op1 and result to rax
        let rax = self.arch.div_register;
        let result_reg = instr.result.as_ref_id().and_then(|id| self.tu.pool.register_of(id));
        if result_reg != Some(rax) {
            return Err(internal(
                "the result of a division is not in rax; divisions were not isolated",
            ));
        }
        let op1_reg = instr.op1.as_ref_id().and_then(|id| self.tu.pool.register_of(id));
        if op1_reg != Some(rax) {
            return Err(internal(
                "the dividend of a division is not in rax; divisions were not isolated",
            ));
        }

        self.line("push rdx");
        // the divisor must survive cqo clobbering rdx
        let op2 = self.loc(&instr.op2)?;
        let divisor = self.force_into_scratch(&op2, 0);
        self.line("cqo");
        let _ = writeln!(self.out, "idiv {}", divisor);
        if remainder {
            self.line("mov rax, rdx");
        }
        self.line("pop rdx");
        Ok(())
    }

    fn logical_not(&mut self, instr: &Instruction) -> RsResult<()> {
        let Some(result) = self.result_loc(instr)? else { return Ok(()) };
        match self.loc(&instr.op1)? {
            Loc::Reg(r) => {
                let _ = writeln!(self.out, "cmp {}, 0", self.reg(r));
            }
            Loc::Slot(offset) => {
                let _ = writeln!(self.out, "cmp qword {}, 0", mem(offset));
            }
            source => {
                let scratch = self.read_into_scratch(&source, 0);
                let _ = writeln!(self.out, "cmp {}, 0", scratch);
            }
        }
        match result {
            Loc::Reg(r) => {
                let _ = writeln!(self.out, "mov {}, 0", self.reg(r));
                let _ = writeln!(self.out, "sete {}", self.arch.sized_name(r, 1));
            }
            Loc::Slot(offset) => {
                self.line("mov r10, 0");
                self.line("sete r10b");
                let _ = writeln!(self.out, "mov {}, r10", mem(offset));
            }
            _ => return Err(internal("logical not into a non-reference location")),
        }
        Ok(())
    }

    fn comparison(&mut self, instr: &Instruction, cc: &str) -> RsResult<()> {
        let Some(result) = self.result_loc(instr)? else { return Ok(()) };
        self.require_two_operand_identity(instr)?;

        let op1 = self.loc(&instr.op1)?;
        let op2 = self.loc(&instr.op2)?;
        match (&op1, &op2) {
            (Loc::Reg(a), Loc::Reg(b)) => {
                let _ = writeln!(self.out, "cmp {}, {}", self.reg(*a), self.reg(*b));
            }
            (Loc::Reg(a), Loc::Imm(v)) if fits_i32(*v) => {
                let _ = writeln!(self.out, "cmp {}, {}", self.reg(*a), v);
            }
            (Loc::Reg(a), Loc::Slot(offset)) => {
                let _ = writeln!(self.out, "cmp {}, {}", self.reg(*a), mem(*offset));
            }
            (Loc::Reg(a), other) => {
                let scratch = self.read_into_scratch(other, 0);
                let _ = writeln!(self.out, "cmp {}, {}", self.reg(*a), scratch);
            }
            (Loc::Slot(offset), Loc::Reg(b)) => {
                let _ = writeln!(self.out, "cmp qword {}, {}", mem(*offset), self.reg(*b));
            }
            (Loc::Slot(offset), Loc::Imm(v)) if fits_i32(*v) => {
                let _ = writeln!(self.out, "cmp qword {}, {}", mem(*offset), v);
            }
            (Loc::Slot(offset), other) => {
                let scratch = self.read_into_scratch(other, 0);
                let _ = writeln!(self.out, "cmp qword {}, {}", mem(*offset), scratch);
            }
            _ => return Err(internal("comparison with unsupported operand locations")),
        }

        match result {
            Loc::Reg(r) => {
                let _ = writeln!(self.out, "set{} {}", cc, self.arch.sized_name(r, 1));
                let _ = writeln!(
                    self.out,
                    "movzx {}, {}",
                    self.arch.sized_name(r, 4),
                    self.arch.sized_name(r, 1)
                );
            }
            Loc::Slot(offset) => {
                self.line("mov r10, 0");
                let _ = writeln!(self.out, "set{} r10b", cc);
                let _ = writeln!(self.out, "mov {}, r10", mem(offset));
            }
            _ => return Err(internal("comparison into a non-reference location")),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Control flow & calls
    // ------------------------------------------------------------------

    fn jump_if_zero(&mut self, instr: &Instruction) -> RsResult<()> {
        match self.loc(&instr.op1)? {
            Loc::Reg(r) => {
                let _ = writeln!(self.out, "cmp {}, 0", self.reg(r));
            }
            Loc::Slot(offset) => {
                let _ = writeln!(self.out, "cmp qword {}, 0", mem(offset));
            }
            source => {
                let scratch = self.read_into_scratch(&source, 0);
                let _ = writeln!(self.out, "cmp {}, 0", scratch);
            }
        }
        let _ = writeln!(self.out, "je {}", self.label_name(&instr.op2)?);
        Ok(())
    }

    fn store_parameter(&mut self, instr: &Instruction) -> RsResult<()> {
        match self.loc(&instr.op1)? {
            Loc::Reg(r) => {
                let _ = writeln!(self.out, "push {}", self.reg(r));
            }
            Loc::Slot(offset) => {
                let _ = writeln!(self.out, "push qword {}", mem(offset));
            }
            Loc::Imm(v) if fits_i32(v) => {
                let _ = writeln!(self.out, "push {}", v);
            }
            source => {
                let scratch = self.read_into_scratch(&source, 0);
                let _ = writeln!(self.out, "push {}", scratch);
            }
        }
        self.pending_arg_slots += 1;
        Ok(())
    }

    fn call(&mut self, instr: &Instruction) -> RsResult<()> {
        let Operand::Constant(argc) = instr.op2 else {
            return Err(internal("call without a constant argument count"));
        };
        let argc = argc as usize;

        // extern callees follow the C ABI, so everything caller-saved and
        // in use must survive the call
        let saved = self.caller_saved_in_use.clone();

        for register in &saved {
            let _ = writeln!(self.out, "push {}", self.reg(*register));
        }
        let pad = if (self.pending_arg_slots as usize + saved.len()) % 2 == 1 { 8 } else { 0 };
        if pad > 0 {
            self.line("sub rsp, 8");
        }
        for index in 0..argc {
            let offset = pad + saved.len() * 8 + (argc - 1 - index) * 8;
            let _ = writeln!(
                self.out,
                "mov {}, [rsp + {}]",
                self.reg(self.arch.parameter_registers[index]),
                offset
            );
        }
        let _ = writeln!(self.out, "call {}", self.label_name(&instr.op1)?);
        if pad > 0 {
            self.line("add rsp, 8");
        }
        for register in saved.iter().rev() {
            let _ = writeln!(self.out, "pop {}", self.reg(*register));
        }
        if argc > 0 {
            let _ = writeln!(self.out, "add rsp, {}", argc * 8);
        }
        self.pending_arg_slots -= argc as u64;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    /// Addressing expression for a memory opcode's address operand: a
    /// register (indirect) or spilled storage holding the address (load it
    /// first). Stack homes never reach here; the stack-variable pass
    /// materializes their addresses into plain references.
    fn memory_target(&mut self, op: &Operand) -> RsResult<String> {
        let Operand::Ref(id) = op else {
            return Err(internal("memory access without a reference address"));
        };
        let reference = self.tu.pool.reference(*id);
        match reference.storage {
            Some(Storage::Stack(_)) if reference.pinned => {
                Err(internal("stack-homed reference used directly as a memory address"))
            }
            Some(Storage::Register(register)) => Ok(format!("[{}]", self.reg(register))),
            Some(Storage::Stack(slot)) => {
                let _ = writeln!(self.out, "mov r10, {}", mem(slot.offset));
                Ok("[r10]".to_string())
            }
            None => Err(internal("memory access through an unallocated reference")),
        }
    }

    fn store_memory(&mut self, instr: &Instruction) -> RsResult<()> {
        let target = self.memory_target(&instr.op1)?;
        match self.loc(&instr.op2)? {
            Loc::Reg(r) => {
                let _ = writeln!(self.out, "mov {}, {}", target, self.reg(r));
            }
            Loc::Imm(v) if fits_i32(v) => {
                let _ = writeln!(self.out, "mov qword {}, {}", target, v);
            }
            source => {
                // r10 may hold the address; the value goes through r11
                let scratch = self.read_into_scratch(&source, 1);
                let _ = writeln!(self.out, "mov {}, {}", target, scratch);
            }
        }
        Ok(())
    }

    fn load_memory(&mut self, instr: &Instruction) -> RsResult<()> {
        let Some(result) = self.result_loc(instr)? else { return Ok(()) };
        let source = self.memory_target(&instr.op1)?;
        match result {
            Loc::Reg(r) => {
                let _ = writeln!(self.out, "mov {}, {}", self.reg(r), source);
            }
            Loc::Slot(offset) => {
                let _ = writeln!(self.out, "mov r11, {}", source);
                let _ = writeln!(self.out, "mov {}, r11", mem(offset));
            }
            _ => return Err(internal("memory load into a non-reference location")),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Operand plumbing
    // ------------------------------------------------------------------

    fn loc(&self, op: &Operand) -> RsResult<Loc> {
        match op {
            Operand::None => Err(internal("empty RSI operand used")),
            Operand::Constant(value) => Ok(Loc::Imm(*value as i64)),
            Operand::StackOffsetOf(id) => Ok(Loc::Imm(self.frame_displacement(*id)?)),
            Operand::Ref(id) => match self.tu.pool.reference(*id).storage {
                Some(Storage::Register(register)) => Ok(Loc::Reg(register)),
                Some(Storage::Stack(slot)) => Ok(Loc::Slot(slot.offset)),
                None => Err(internal("operand reference without assigned storage")),
            },
            Operand::Label(id) => Ok(Loc::Sym(self.tu.pool.label(*id).name.clone())),
            Operand::Global(id) => Ok(Loc::Sym(self.tu.pool.global(*id).name.clone())),
        }
    }

    /// Dead results (no storage at all) make the instruction a no-op
    fn result_loc(&self, instr: &Instruction) -> RsResult<Option<Loc>> {
        match instr.result {
            Operand::Ref(id) => match self.tu.pool.reference(id).storage {
                None => Ok(None),
                Some(Storage::Register(register)) => Ok(Some(Loc::Reg(register))),
                Some(Storage::Stack(slot)) => Ok(Some(Loc::Slot(slot.offset))),
            },
            _ => Err(internal("instruction without a reference result")),
        }
    }

    /// Emit whatever it takes to have the operand's value in a scratch
    /// register; returns the register name
    fn read_into_scratch(&mut self, source: &Loc, scratch_index: usize) -> String {
        let scratch = self.reg(self.arch.scratch[scratch_index]);
        match source {
            Loc::Reg(r) => return self.reg(*r).to_string(),
            Loc::Imm(v) => {
                let _ = writeln!(self.out, "mov {}, {}", scratch, v);
            }
            Loc::Slot(offset) => {
                let _ = writeln!(self.out, "mov {}, {}", scratch, mem(*offset));
            }
            Loc::Sym(name) => {
                let _ = writeln!(self.out, "mov {}, {}", scratch, name);
            }
        }
        scratch.to_string()
    }

    /// After two-operand legalization `result` and `op1` denote the same
    /// location for destructive templates
    fn require_two_operand_identity(&self, instr: &Instruction) -> RsResult<()> {
        if self.loc(&instr.result)? != self.loc(&instr.op1)? {
            return Err(internal(
                "RSI instruction is not nasm compatible (result and op1 differ)",
            ));
        }
        Ok(())
    }

    /// Like [`Self::read_into_scratch`], but register operands are copied
    /// too; used where the source register may be clobbered before use
    fn force_into_scratch(&mut self, source: &Loc, scratch_index: usize) -> String {
        let scratch = self.reg(self.arch.scratch[scratch_index]).to_string();
        if let Loc::Reg(r) = source {
            let _ = writeln!(self.out, "mov {}, {}", scratch, self.reg(*r));
            return scratch;
        }
        self.read_into_scratch(source, scratch_index)
    }

    fn frame_displacement(&self, id: RefId) -> RsResult<i64> {
        let slot = self
            .tu
            .pool
            .stack_slot_of(id)
            .ok_or_else(|| internal("dynamic constant names a reference without a stack slot"))?;
        Ok(-(8 + slot.offset as i64))
    }

    fn label_name(&self, op: &Operand) -> RsResult<String> {
        match op {
            Operand::Label(id) => Ok(self.tu.pool.label(*id).name.clone()),
            _ => Err(internal("expected a label operand")),
        }
    }

    fn reg(&self, register: HwRegister) -> &'static str {
        self.arch.register_name(register)
    }

    fn register_named(&self, name: &str) -> RsResult<HwRegister> {
        self.arch
            .general_purpose
            .iter()
            .chain(self.arch.scratch.iter())
            .copied()
            .find(|r| self.arch.register_name(*r) == name)
            .ok_or_else(|| internal("unknown register name"))
    }

    fn line(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
    }
}

fn mem(offset: u64) -> String {
    format!("[rbp - {}]", 8 + offset)
}

fn fits_i32(value: i64) -> bool {
    i32::try_from(value).is_ok()
}

fn internal(message: &str) -> RsError {
    RsError::codegen_error(format!("Internal error: {}", message))
}
