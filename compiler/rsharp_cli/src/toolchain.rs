//! External assembler and linker invocation

use log::info;
use rsharp_common::{RsError, RsResult};
use rsharp_ir::TargetArch;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Assemble and link the emitted assembly into an executable.
///
/// x86-64 goes through `nasm -f elf64` and then the C compiler as linker
/// with `-no-pie`; AArch64 hands the `.S` file to the C compiler directly.
pub fn assemble_and_link(
    target: TargetArch,
    assembly: &Path,
    output: &Path,
    compiler: &str,
    extra_objects: &[PathBuf],
) -> RsResult<()> {
    match target {
        TargetArch::X86_64 => {
            let object = output.with_extension("o");
            let mut nasm = Command::new("nasm");
            nasm.arg("-g")
                .arg("-f")
                .arg("elf64")
                .arg(assembly)
                .arg("-o")
                .arg(&object);
            run("nasm", &mut nasm)?;

            let mut link = Command::new(compiler);
            link.arg("-no-pie").arg(&object);
            for extra in extra_objects {
                link.arg(extra);
            }
            link.arg("-o").arg(output);
            run(compiler, &mut link)
        }
        TargetArch::Aarch64 => {
            let mut compile = Command::new(compiler);
            compile.arg(assembly);
            for extra in extra_objects {
                compile.arg(extra);
            }
            compile.arg("-o").arg(output);
            run(compiler, &mut compile)
        }
    }
}

fn run(name: &str, command: &mut Command) -> RsResult<()> {
    info!("Executing: {:?}", command);
    let status = command.status().map_err(|e| {
        RsError::toolchain_error(format!("Could not execute '{}': {}", name, e))
    })?;
    if !status.success() {
        return Err(RsError::toolchain_error(format!(
            "'{}' failed with {}",
            name, status
        )));
    }
    Ok(())
}
