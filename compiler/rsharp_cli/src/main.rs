//! R-Sharp compiler command-line interface
//!
//! Drives the full pipeline: tokenize, parse (with imports), validate,
//! lower to RSI, run the pass pipeline, emit assembly and hand the result
//! to the external assembler/linker.

use clap::Parser;
use rsharp_common::RsError;
use std::path::PathBuf;

mod driver;
mod toolchain;

/// The R-Sharp compiler
#[derive(Parser)]
#[command(name = "rsharp")]
#[command(about = "Compiler for the R-Sharp language")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Input source file
    input: PathBuf,

    /// Output executable path
    #[arg(short, long, default_value = "a.out")]
    output: PathBuf,

    /// Output format: nasm | aarch64 (rsi_nasm and rsi_aarch64 are
    /// accepted aliases)
    #[arg(short, long, default_value = "nasm")]
    format: String,

    /// C compiler used for assembling (AArch64) and linking
    #[arg(long, default_value = "gcc")]
    compiler: String,

    /// Additional object file to link; repeatable
    #[arg(long = "link")]
    link: Vec<PathBuf>,

    /// Directory scanned for `std::` import paths
    #[arg(long)]
    stdlib: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }
    builder.format_timestamp(None).init();

    if let Err(error) = run(&cli) {
        log::error!("{:#}", error);
        let code = error
            .downcast_ref::<RsError>()
            .map(RsError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let options = driver::Options {
        input: cli.input.clone(),
        output: cli.output.clone(),
        format: cli.format.clone(),
        compiler: cli.compiler.clone(),
        link: cli.link.clone(),
        stdlib: cli.stdlib.clone(),
    };
    driver::compile(&options)?;
    Ok(())
}
