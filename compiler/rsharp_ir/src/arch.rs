//! Architecture descriptors for the supported back ends
//!
//! A descriptor supplies the assignable register palette (colors map to
//! registers in palette order), the frame base register used for stack
//! slots, the positional parameter registers, the return-value register,
//! and the registers the C ABI lets callees clobber. Register identities
//! are indices into the descriptor's name table; descriptors are built
//! once per compilation, so no process-wide state is involved.

use serde::{Deserialize, Serialize};

/// Back-end selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetArch {
    X86_64,
    Aarch64,
}

/// Opaque identity of one architectural general-purpose register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HwRegister(pub u32);

/// Everything the passes and emitters need to know about a target
#[derive(Debug, Clone)]
pub struct Architecture {
    pub target: TargetArch,
    names: Vec<&'static str>,
    /// Assignable palette, in the order colors are mapped to registers
    pub general_purpose: Vec<HwRegister>,
    /// Withheld from the palette; the emitters materialize spilled
    /// operands through these
    pub scratch: [HwRegister; 2],
    /// Frame base register; stack slots live at negative offsets from it
    pub frame_pointer: HwRegister,
    /// Positional parameter registers
    pub parameter_registers: Vec<HwRegister>,
    /// Return-value register
    pub return_register: HwRegister,
    /// Division quotient register (meaningful on x86-64, where `idiv`
    /// demands its dividend and quotient in a fixed register)
    pub div_register: HwRegister,
    /// Registers an extern (C ABI) callee may clobber
    pub caller_saved: Vec<HwRegister>,
}

// x86-64 register indices, in palette order
const RAX: u32 = 0;
const RBX: u32 = 1;
const RCX: u32 = 2;
const RDX: u32 = 3;
const RSI: u32 = 4;
const RDI: u32 = 5;
const R8: u32 = 6;
const R9: u32 = 7;
const R12: u32 = 8;
const R13: u32 = 9;
const R14: u32 = 10;
const R15: u32 = 11;
const R10: u32 = 12;
const R11: u32 = 13;
const RBP: u32 = 14;

impl Architecture {
    pub fn for_target(target: TargetArch) -> Self {
        match target {
            TargetArch::X86_64 => Self::x86_64(),
            TargetArch::Aarch64 => Self::aarch64(),
        }
    }

    pub fn x86_64() -> Self {
        let names = vec![
            "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "r8", "r9", "r12", "r13", "r14", "r15",
            "r10", "r11", "rbp",
        ];
        let reg = HwRegister;
        Self {
            target: TargetArch::X86_64,
            names,
            general_purpose: (RAX..=R15).map(HwRegister).collect(),
            scratch: [reg(R10), reg(R11)],
            frame_pointer: reg(RBP),
            parameter_registers: vec![reg(RDI), reg(RSI), reg(RDX), reg(RCX), reg(R8), reg(R9)],
            return_register: reg(RAX),
            div_register: reg(RAX),
            caller_saved: vec![
                reg(RAX),
                reg(RCX),
                reg(RDX),
                reg(RSI),
                reg(RDI),
                reg(R8),
                reg(R9),
            ],
        }
    }

    pub fn aarch64() -> Self {
        // x0-x15 and x21-x28 are assignable; x16/x17 (IP0/IP1) are the
        // emitter scratch pair, x29 is the frame base, x18-x20 and
        // x30 are left alone entirely.
        let mut names: Vec<&'static str> = vec![
            "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12",
            "x13", "x14", "x15", "x21", "x22", "x23", "x24", "x25", "x26", "x27", "x28",
        ];
        let scratch_base = names.len() as u32;
        names.extend(["x16", "x17", "x29"]);

        let general_purpose: Vec<HwRegister> = (0..scratch_base).map(HwRegister).collect();
        let parameter_registers: Vec<HwRegister> = (0..8).map(HwRegister).collect();
        let caller_saved: Vec<HwRegister> = (0..16).map(HwRegister).collect();
        Self {
            target: TargetArch::Aarch64,
            names,
            general_purpose,
            scratch: [HwRegister(scratch_base), HwRegister(scratch_base + 1)],
            frame_pointer: HwRegister(scratch_base + 2),
            parameter_registers,
            return_register: HwRegister(0),
            div_register: HwRegister(0),
            caller_saved,
        }
    }

    pub fn register_name(&self, reg: HwRegister) -> &'static str {
        self.names[reg.0 as usize]
    }

    /// The x86-64 name for the low `bytes` of a register (`rax` -> `al`,
    /// `eax`, ...). Used by the comparison templates.
    pub fn sized_name(&self, reg: HwRegister, bytes: u8) -> String {
        debug_assert_eq!(self.target, TargetArch::X86_64);
        let full = self.register_name(reg);
        let legacy = |b: &str, w: &str, d: &str| -> String {
            match bytes {
                1 => b.to_string(),
                2 => w.to_string(),
                4 => d.to_string(),
                _ => full.to_string(),
            }
        };
        match full {
            "rax" => legacy("al", "ax", "eax"),
            "rbx" => legacy("bl", "bx", "ebx"),
            "rcx" => legacy("cl", "cx", "ecx"),
            "rdx" => legacy("dl", "dx", "edx"),
            "rsi" => legacy("sil", "si", "esi"),
            "rdi" => legacy("dil", "di", "edi"),
            "rbp" => legacy("bpl", "bp", "ebp"),
            _ => match bytes {
                1 => format!("{}b", full),
                2 => format!("{}w", full),
                4 => format!("{}d", full),
                _ => full.to_string(),
            },
        }
    }

    pub fn is_caller_saved(&self, reg: HwRegister) -> bool {
        self.caller_saved.contains(&reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palettes_exclude_scratch_and_frame_registers() {
        for arch in [Architecture::x86_64(), Architecture::aarch64()] {
            for reg in &arch.general_purpose {
                assert_ne!(*reg, arch.frame_pointer);
                assert!(!arch.scratch.contains(reg));
            }
        }
    }

    #[test]
    fn x86_64_parameter_registers_follow_the_sysv_order() {
        let arch = Architecture::x86_64();
        let names: Vec<_> = arch
            .parameter_registers
            .iter()
            .map(|r| arch.register_name(*r))
            .collect();
        assert_eq!(names, vec!["rdi", "rsi", "rdx", "rcx", "r8", "r9"]);
    }

    #[test]
    fn sized_names_cover_legacy_and_numbered_registers() {
        let arch = Architecture::x86_64();
        let rax = arch.return_register;
        assert_eq!(arch.sized_name(rax, 1), "al");
        assert_eq!(arch.sized_name(rax, 4), "eax");
        let r9 = arch.parameter_registers[5];
        assert_eq!(arch.sized_name(r9, 1), "r9b");
        assert_eq!(arch.sized_name(r9, 4), "r9d");
    }

    #[test]
    fn aarch64_returns_in_x0() {
        let arch = Architecture::aarch64();
        assert_eq!(arch.register_name(arch.return_register), "x0");
        assert_eq!(arch.register_name(arch.frame_pointer), "x29");
        assert_eq!(arch.register_name(arch.scratch[0]), "x16");
    }
}
