//! Textual dump of RSI functions, used by verbose pass tracing and tests

use crate::arch::Architecture;
use crate::ir::*;
use std::fmt::Write;

const LIVE_SET_COLUMN: usize = 55;

pub fn stringify_operand(op: &Operand, pool: &IrPool, arch: &Architecture) -> String {
    match op {
        Operand::None => "[none]".to_string(),
        Operand::Constant(value) => format!("{}", value),
        Operand::StackOffsetOf(id) => format!("&{}", pool.reference(*id).name),
        Operand::Ref(id) => {
            let reference = pool.reference(*id);
            let storage = match reference.storage {
                Some(Storage::Register(reg)) => arch.register_name(reg).to_string(),
                Some(Storage::Stack(slot)) => format!("stack+{}", slot.offset),
                None => "None".to_string(),
            };
            format!("{}({})", reference.name, storage)
        }
        Operand::Label(id) => pool.label(*id).name.clone(),
        Operand::Global(id) => format!("@{}", pool.global(*id).name),
    }
}

pub fn stringify_function(function: &Function, pool: &IrPool, arch: &Architecture) -> String {
    let mut result = String::new();
    for instr in &function.instructions {
        let mut prefix = String::from("[");
        for (i, live) in instr.meta.live_before.iter().enumerate() {
            if i > 0 {
                prefix.push_str(", ");
            }
            prefix.push_str(&pool.reference(*live).name);
        }
        prefix.push_str("]  ");
        while prefix.len() < LIVE_SET_COLUMN {
            prefix.push(' ');
        }
        result.push_str(&prefix);

        result.push_str(instr.opcode.mnemonic());

        match instr.opcode {
            Opcode::Return | Opcode::DefineLabel => {
                let _ = writeln!(result, " {}", stringify_operand(&instr.op1, pool, arch));
                continue;
            }
            Opcode::Jump => {
                let _ = writeln!(result, " -> {}", stringify_operand(&instr.op1, pool, arch));
                continue;
            }
            Opcode::JumpIfZero => {
                let _ = writeln!(
                    result,
                    " {} -> {}",
                    stringify_operand(&instr.op1, pool, arch),
                    stringify_operand(&instr.op2, pool, arch)
                );
                continue;
            }
            _ => {}
        }

        match instr.opcode.arguments_used() {
            0 => result.push('\n'),
            1 => {
                let _ = writeln!(
                    result,
                    " {}, {}",
                    stringify_operand(&instr.result, pool, arch),
                    stringify_operand(&instr.op1, pool, arch)
                );
            }
            _ => {
                let _ = writeln!(
                    result,
                    " {}, {}, {}",
                    stringify_operand(&instr.result, pool, arch),
                    stringify_operand(&instr.op1, pool, arch),
                    stringify_operand(&instr.op2, pool, arch)
                );
            }
        }
    }
    result
}
