//! AArch64 emission (GNU assembler syntax)
//!
//! Binary operations are non-destructive three-operand forms, constants
//! carry a `#` prefix, and large immediates decompose into `movz` plus up
//! to three `movk` shifts. Spilled references go through the IP scratch
//! pair `x16`/`x17`, which the allocator never hands out.

use crate::arch::{Architecture, HwRegister};
use crate::ir::*;
use rsharp_common::{RsError, RsResult};
use std::fmt::Write;

pub fn emit(tu: &TranslationUnit, arch: &Architecture) -> RsResult<String> {
    let mut emitter = A64Emitter {
        tu,
        arch,
        out: String::new(),
        saved_registers: Vec::new(),
        caller_saved_in_use: Vec::new(),
        frame_bytes: 0,
    };
    emitter.translation_unit()?;
    Ok(emitter.out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Loc {
    Reg(HwRegister),
    /// Frame slot, `[x29, #-(8 + offset)]`
    Slot(u64),
    Imm(i64),
    Sym(String),
}

struct A64Emitter<'a> {
    tu: &'a TranslationUnit,
    arch: &'a Architecture,
    out: String,
    saved_registers: Vec<HwRegister>,
    caller_saved_in_use: Vec<HwRegister>,
    frame_bytes: u64,
}

impl<'a> A64Emitter<'a> {
    fn translation_unit(&mut self) -> RsResult<()> {
        self.out.push_str("// AArch64 code generated by the R-Sharp compiler (using RSI)\n\n");
        self.out.push_str(".text\n\n");

        for label in &self.tu.extern_labels {
            let _ = writeln!(self.out, ".extern {}", self.tu.pool.label(*label).name);
        }
        if !self.tu.extern_labels.is_empty() {
            self.out.push('\n');
        }

        for function in &self.tu.functions {
            let _ = writeln!(self.out, ".global {}", self.tu.pool.label(function.label).name);
            self.function(function)?;
            self.out.push('\n');
        }

        if !self.tu.initialized_globals.is_empty() || !self.tu.strings.is_empty() {
            self.out.push_str(".data\n");
            for (global, value) in &self.tu.initialized_globals {
                let _ = writeln!(self.out, "{}: .quad {}", self.tu.pool.global(*global).name, value);
            }
            for (label, bytes) in &self.tu.strings {
                let rendered: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
                let _ = writeln!(
                    self.out,
                    "{}: .byte {}",
                    self.tu.pool.label(*label).name,
                    rendered.join(", ")
                );
            }
            self.out.push('\n');
        }

        if !self.tu.uninitialized_globals.is_empty() {
            self.out.push_str(".bss\n");
            for global in &self.tu.uninitialized_globals {
                let _ = writeln!(self.out, "{}: .skip 8", self.tu.pool.global(*global).name);
            }
            self.out.push('\n');
        }

        Ok(())
    }

    fn function(&mut self, function: &Function) -> RsResult<()> {
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
            Negate => self.unary(instr, "neg"),
            BinaryNot => self.unary(instr, "mvn"),
            LogicalNot => self.logical_not(instr),
            Add => self.binary(instr, "add"),
            Subtract => self.binary(instr, "sub"),
            Multiply => self.binary(instr, "mul"),
            Divide => self.binary(instr, "sdiv"),
            BinaryAnd => self.binary(instr, "and"),
            Equal => self.comparison(instr, "eq"),
            NotEqual => self.comparison(instr, "ne"),
            LessThan => self.comparison(instr, "lt"),
            LessThanOrEqual => self.comparison(instr, "le"),
            GreaterThan => self.comparison(instr, "gt"),
            GreaterThanOrEqual => self.comparison(instr, "ge"),
            Jump => {
                let _ = writeln!(self.out, "b {}", self.label_name(&instr.op1)?);
                Ok(())
            }
            JumpIfZero => {
                let value = self.read_op(&instr.op1, 0)?;
                let _ = writeln!(self.out, "cbz {}, {}", value, self.label_name(&instr.op2)?);
                Ok(())
            }
            StoreParameter => self.store_parameter(instr),
            Call => self.call(instr),
            StoreMemory => self.store_memory(instr),
            LoadMemory => self.load_memory(instr),
            Modulo => Err(internal("modulo survived the div/mul/sub rewrite")),
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
        self.line("stp x29, x30, [sp, #-16]!");
        self.line("mov x29, sp");
        if self.frame_bytes > 0 {
            let _ = writeln!(self.out, "sub sp, sp, #{}", self.frame_bytes);
        }
        let saved = self.saved_registers.clone();
        for register in &saved {
            let _ = writeln!(self.out, "str {}, [sp, #-16]!", self.reg(*register));
        }
        Ok(())
    }

    fn return_(&mut self, instr: &Instruction) -> RsResult<()> {
        let x0 = self.reg(self.arch.return_register).to_string();
        match self.loc(&instr.op1)? {
            Loc::Reg(r) if r == self.arch.return_register => {}
            Loc::Reg(r) => {
                let _ = writeln!(self.out, "mov {}, {}", x0, self.reg(r));
            }
            Loc::Imm(v) => self.load_immediate(&x0, v as u64),
            Loc::Slot(offset) => {
                let _ = writeln!(self.out, "ldur {}, [x29, #-{}]", x0, 8 + offset);
            }
            Loc::Sym(name) => self.load_symbol(&x0, &name),
        }

        let saved = self.saved_registers.clone();
        for register in saved.iter().rev() {
            let _ = writeln!(self.out, "ldr {}, [sp], #16", self.reg(*register));
        }
        self.line("mov sp, x29");
        self.line("ldp x29, x30, [sp], #16");
        self.line("ret");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Data movement & arithmetic
    // ------------------------------------------------------------------

    fn move_(&mut self, instr: &Instruction) -> RsResult<()> {
        let Some(result) = self.result_loc(instr)? else { return Ok(()) };
        let source = self.loc(&instr.op1)?;
        match result {
            Loc::Reg(d) => {
                let dest = self.reg(d).to_string();
                match source {
                    Loc::Reg(s) => {
                        if s != d {
                            let _ = writeln!(self.out, "mov {}, {}", dest, self.reg(s));
                        }
                    }
                    Loc::Imm(v) => self.load_immediate(&dest, v as u64),
                    Loc::Slot(offset) => {
                        let _ = writeln!(self.out, "ldur {}, [x29, #-{}]", dest, 8 + offset);
                    }
                    Loc::Sym(name) => self.load_symbol(&dest, &name),
                }
            }
            Loc::Slot(offset) => {
                let value = self.read_loc(&source, 0);
                let _ = writeln!(self.out, "stur {}, [x29, #-{}]", value, 8 + offset);
            }
            _ => return Err(internal("move into a non-reference location")),
        }
        Ok(())
    }

    fn unary(&mut self, instr: &Instruction, op: &str) -> RsResult<()> {
        let Some(result) = self.result_loc(instr)? else { return Ok(()) };
        let source = self.read_op(&instr.op1, 0)?;
        self.write_result(&result, |out, dest| {
            let _ = writeln!(out, "{} {}, {}", op, dest, source);
        })
    }

    fn binary(&mut self, instr: &Instruction, op: &str) -> RsResult<()> {
        let Some(result) = self.result_loc(instr)? else { return Ok(()) };

        // the address-of pattern: ADD dst, &slot, x29
        if let Operand::StackOffsetOf(target) = instr.op1 {
            let displacement = self.frame_displacement(target)?;
            let base = self.read_op(&instr.op2, 0)?;
            return self.write_result(&result, |out, dest| {
                let _ = writeln!(out, "sub {}, {}, #{}", dest, base, -displacement);
            });
        }

        let lhs = self.read_op(&instr.op1, 0)?;
        let rhs = self.read_op(&instr.op2, 1)?;
        self.write_result(&result, |out, dest| {
            let _ = writeln!(out, "{} {}, {}, {}", op, dest, lhs, rhs);
        })
    }

    fn logical_not(&mut self, instr: &Instruction) -> RsResult<()> {
        let Some(result) = self.result_loc(instr)? else { return Ok(()) };
        let value = self.read_op(&instr.op1, 0)?;
        let _ = writeln!(self.out, "cmp {}, #0", value);
        self.write_result(&result, |out, dest| {
            let _ = writeln!(out, "cset {}, eq", dest);
        })
    }

    fn comparison(&mut self, instr: &Instruction, cc: &str) -> RsResult<()> {
        let Some(result) = self.result_loc(instr)? else { return Ok(()) };
        let lhs = self.read_op(&instr.op1, 0)?;
        let rhs = self.read_op(&instr.op2, 1)?;
        let _ = writeln!(self.out, "cmp {}, {}", lhs, rhs);
        self.write_result(&result, |out, dest| {
            let _ = writeln!(out, "cset {}, {}", dest, cc);
        })
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn store_parameter(&mut self, instr: &Instruction) -> RsResult<()> {
        let value = self.read_op(&instr.op1, 0)?;
        let _ = writeln!(self.out, "str {}, [sp, #-16]!", value);
        Ok(())
    }

    fn call(&mut self, instr: &Instruction) -> RsResult<()> {
        let Operand::Constant(argc) = instr.op2 else {
            return Err(internal("call without a constant argument count"));
        };
        let argc = argc as usize;

        let saved = self.caller_saved_in_use.clone();
        for register in &saved {
            let _ = writeln!(self.out, "str {}, [sp, #-16]!", self.reg(*register));
        }
        for index in 0..argc {
            let offset = saved.len() * 16 + (argc - 1 - index) * 16;
            let _ = writeln!(
                self.out,
                "ldr {}, [sp, #{}]",
                self.reg(self.arch.parameter_registers[index]),
                offset
            );
        }
        let _ = writeln!(self.out, "bl {}", self.label_name(&instr.op1)?);
        for register in saved.iter().rev() {
            let _ = writeln!(self.out, "ldr {}, [sp], #16", self.reg(*register));
        }
        if argc > 0 {
            let _ = writeln!(self.out, "add sp, sp, #{}", argc * 16);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    fn store_memory(&mut self, instr: &Instruction) -> RsResult<()> {
        let value = self.read_op(&instr.op2, 1)?;
        let base = self.memory_target(&instr.op1)?;
        let _ = writeln!(self.out, "str {}, [{}]", value, base);
        Ok(())
    }

    fn load_memory(&mut self, instr: &Instruction) -> RsResult<()> {
        let Some(result) = self.result_loc(instr)? else { return Ok(()) };
        let base = self.memory_target(&instr.op1)?;
        self.write_result(&result, |out, dest| {
            let _ = writeln!(out, "ldr {}, [{}]", dest, base);
        })
    }

    /// Base register holding the address of a memory access. Stack homes
    /// never reach here; the stack-variable pass materializes their
    /// addresses into plain references.
    fn memory_target(&mut self, op: &Operand) -> RsResult<String> {
        let Operand::Ref(id) = op else {
            return Err(internal("memory access without a reference address"));
        };
        let reference = self.tu.pool.reference(*id);
        match reference.storage {
            Some(Storage::Stack(_)) if reference.pinned => {
                Err(internal("stack-homed reference used directly as a memory address"))
            }
            Some(Storage::Register(register)) => Ok(self.reg(register).to_string()),
            Some(Storage::Stack(slot)) => {
                // spilled pointer: fetch the address itself first
                let scratch = self.reg(self.arch.scratch[0]).to_string();
                let _ = writeln!(self.out, "ldur {}, [x29, #-{}]", scratch, 8 + slot.offset);
                Ok(scratch)
            }
            None => Err(internal("memory access through an unallocated reference")),
        }
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

    /// The operand's value as a register name, loading through scratch
    /// where necessary
    fn read_op(&mut self, op: &Operand, scratch_index: usize) -> RsResult<String> {
        let loc = self.loc(op)?;
        Ok(self.read_loc(&loc, scratch_index))
    }

    fn read_loc(&mut self, source: &Loc, scratch_index: usize) -> String {
        match source {
            Loc::Reg(r) => self.reg(*r).to_string(),
            Loc::Slot(offset) => {
                let scratch = self.reg(self.arch.scratch[scratch_index]).to_string();
                let _ = writeln!(self.out, "ldur {}, [x29, #-{}]", scratch, 8 + offset);
                scratch
            }
            Loc::Imm(v) => {
                let scratch = self.reg(self.arch.scratch[scratch_index]).to_string();
                self.load_immediate(&scratch, *v as u64);
                scratch
            }
            Loc::Sym(name) => {
                let scratch = self.reg(self.arch.scratch[scratch_index]).to_string();
                self.load_symbol(&scratch, name);
                scratch
            }
        }
    }

    /// Run `emit_into` against the destination register; spilled results
    /// are computed in scratch and stored to their slot
    fn write_result(
        &mut self,
        result: &Loc,
        emit_into: impl FnOnce(&mut String, &str),
    ) -> RsResult<()> {
        match result {
            Loc::Reg(r) => {
                let dest = self.reg(*r).to_string();
                emit_into(&mut self.out, &dest);
                Ok(())
            }
            Loc::Slot(offset) => {
                let scratch = self.reg(self.arch.scratch[0]).to_string();
                emit_into(&mut self.out, &scratch);
                let _ = writeln!(self.out, "stur {}, [x29, #-{}]", scratch, 8 + offset);
                Ok(())
            }
            _ => Err(internal("result in a non-reference location")),
        }
    }

    /// `movz` plus up to three `movk` 16-bit chunks; zero is a single `movz`
    fn load_immediate(&mut self, dest: &str, value: u64) {
        if value == 0 {
            let _ = writeln!(self.out, "movz {}, #0", dest);
            return;
        }
        let mut shift = 0;
        while shift < 64 && (value >> shift) != 0 {
            let chunk = (value >> shift) & 0xFFFF;
            if shift == 0 {
                let _ = writeln!(self.out, "movz {}, #{}", dest, chunk);
            } else {
                let _ = writeln!(self.out, "movk {}, #{}, lsl #{}", dest, chunk, shift);
            }
            shift += 16;
        }
    }

    /// Position-independent address materialization
    fn load_symbol(&mut self, dest: &str, symbol: &str) {
        let _ = writeln!(self.out, "adrp {}, {}", dest, symbol);
        let _ = writeln!(self.out, "add {}, {}, :lo12:{}", dest, dest, symbol);
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

    fn line(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
    }
}

fn internal(message: &str) -> RsError {
    RsError::codegen_error(format!("Internal error: {}", message))
}
