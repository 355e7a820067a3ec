//! The declarative pass runner
//!
//! A pass is described by a header, the architectures it applies to,
//! positive/negative opcode filter sets, a prefilter predicate and either a
//! per-instruction transformer (which may surround the instruction with new
//! ones) or a per-function transformer. The runner splices inserted
//! instructions around the current one and advances past them so a pass
//! never revisits its own output.

use crate::arch::{Architecture, TargetArch};
use crate::display::stringify_function;
use crate::ir::*;
use rsharp_common::RsResult;

/// Mutable state shared with pass transformers
pub struct PassContext<'a> {
    pub pool: &'a mut IrPool,
    pub arch: &'a Architecture,
}

type InstructionFn =
    fn(&mut PassContext, &mut Instruction, &mut Vec<Instruction>, &mut Vec<Instruction>) -> RsResult<()>;
type FunctionFn = fn(&mut PassContext, &mut Function) -> RsResult<()>;

pub enum PassKind {
    PerInstruction(InstructionFn),
    PerFunction(FunctionFn),
}

pub struct Pass {
    /// Human-readable header; empty means quiet
    pub header: &'static str,
    pub architectures: &'static [TargetArch],
    /// Accepted opcodes; empty accepts all
    pub positive: &'static [Opcode],
    pub negative: &'static [Opcode],
    pub prefilter: fn(&Instruction) -> bool,
    pub kind: PassKind,
}

pub fn accept_all(_: &Instruction) -> bool {
    true
}

impl Pass {
    fn applies_to(&self, instr: &Instruction) -> bool {
        if !self.positive.is_empty() && !self.positive.contains(&instr.opcode) {
            return false;
        }
        if self.negative.contains(&instr.opcode) {
            return false;
        }
        (self.prefilter)(instr)
    }

    pub fn run_on_function(&self, ctx: &mut PassContext, function: &mut Function) -> RsResult<()> {
        match &self.kind {
            PassKind::PerFunction(f) => f(ctx, function),
            PassKind::PerInstruction(f) => {
                let mut i = 0;
                while i < function.instructions.len() {
                    if !self.applies_to(&function.instructions[i]) {
                        i += 1;
                        continue;
                    }

                    let mut before = Vec::new();
                    let mut after = Vec::new();
                    f(ctx, &mut function.instructions[i], &mut before, &mut after)?;

                    let inserted = before.len() + after.len();
                    function.instructions.splice(i + 1..i + 1, after);
                    function.instructions.splice(i..i, before);
                    i += inserted + 1;
                }
                Ok(())
            }
        }
    }

    pub fn run(&self, tu: &mut TranslationUnit, arch: &Architecture) -> RsResult<()> {
        if !self.architectures.contains(&arch.target) {
            return Ok(());
        }

        let verbose = !self.header.is_empty() && log::log_enabled!(log::Level::Debug);
        if verbose {
            log::debug!("--------------| {} |--------------", self.header);
        }

        let TranslationUnit { functions, pool, .. } = tu;
        let mut ctx = PassContext { pool, arch };
        for function in functions.iter_mut() {
            self.run_on_function(&mut ctx, function)?;
            if verbose {
                log::debug!("; Function \"{}\"", function.name);
                log::debug!("{}", stringify_function(function, ctx.pool, arch));
            }
        }
        Ok(())
    }
}
