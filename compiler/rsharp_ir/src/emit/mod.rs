//! Assembly emission for the supported targets

pub mod aarch64;
pub mod nasm;

use crate::arch::{Architecture, TargetArch};
use crate::ir::TranslationUnit;
use rsharp_common::RsResult;

/// Render a fully allocated translation unit as target assembly
pub fn emit_translation_unit(tu: &TranslationUnit, arch: &Architecture) -> RsResult<String> {
    match arch.target {
        TargetArch::X86_64 => nasm::emit(tu, arch),
        TargetArch::Aarch64 => aarch64::emit(tu, arch),
    }
}

/// File extension of the textual assembly for a target
pub fn assembly_extension(target: TargetArch) -> &'static str {
    match target {
        TargetArch::X86_64 => "asm",
        TargetArch::Aarch64 => "S",
    }
}
