//! The compilation pipeline, stage by stage

use crate::toolchain;
use log::{debug, info};
use rsharp_common::{render_diagnostic, Diagnostics, RsError, RsResult, SourceMap};
use rsharp_ir::emit::{assembly_extension, emit_translation_unit};
use rsharp_ir::{run_pipeline, Architecture, TargetArch};
use rsharp_lexer::Lexer;
use rsharp_parser::{print_program, Parser, ParsingCache};
use std::path::PathBuf;

pub struct Options {
    pub input: PathBuf,
    pub output: PathBuf,
    pub format: String,
    pub compiler: String,
    pub link: Vec<PathBuf>,
    pub stdlib: Option<PathBuf>,
}

pub fn target_from_format(format: &str) -> RsResult<TargetArch> {
    match format {
        "nasm" | "rsi_nasm" => Ok(TargetArch::X86_64),
        "aarch64" | "rsi_aarch64" => Ok(TargetArch::Aarch64),
        "c" => Err(RsError::io_error(
            "The C backend is not supported; use -f nasm or -f aarch64",
        )),
        other => Err(RsError::io_error(format!(
            "Unknown output format '{}'; use -f nasm or -f aarch64",
            other
        ))),
    }
}

pub fn compile(options: &Options) -> RsResult<()> {
    let target = target_from_format(&options.format)?;
    let source = std::fs::read_to_string(&options.input).map_err(|e| {
        RsError::io_error(format!("Could not open file \"{}\": {}", options.input.display(), e))
    })?;
    let file_name = options.input.display().to_string();

    // imported files register themselves here as the parser reaches them,
    // so every diagnostic renders against the file it actually came from
    let mut sources = SourceMap::new();
    let file_id = sources.add(file_name.clone(), source.clone());

    info!("Tokenizing {}", file_name);
    let mut lexer = Lexer::new(&source, file_id);
    let tokens = lexer.tokenize();
    if lexer.diagnostics().has_errors() {
        report(lexer.diagnostics(), &sources);
        return Err(RsError::lex_error(format!(
            "{} lexical error(s)",
            lexer.diagnostics().error_count()
        )));
    }
    debug!("{} tokens", tokens.len());

    info!("Parsing");
    let mut parser = Parser::new(tokens, options.input.clone(), options.stdlib.clone());
    let mut cache = ParsingCache::new();
    let program = parser.parse_program(&mut cache, &mut sources);
    if parser.diagnostics().has_errors() {
        report(parser.diagnostics(), &sources);
        return Err(RsError::parse_error(format!(
            "{} syntax error(s)",
            parser.diagnostics().error_count()
        )));
    }
    debug!("Parsed {} items\n{}", program.items.len(), print_program(&program));

    info!("Validating");
    let (typed, diagnostics) = rsharp_typechecker::check(&program);
    if diagnostics.has_errors() {
        report(&diagnostics, &sources);
        return Err(RsError::type_error(format!(
            "{} semantic error(s)",
            diagnostics.error_count()
        )));
    }

    info!("Generating RSI");
    let mut tu = rsharp_ir::generate(&typed)?;
    let arch = Architecture::for_target(target);
    run_pipeline(&mut tu, &arch)?;

    info!("Emitting assembly");
    let assembly = emit_translation_unit(&tu, &arch)?;
    let assembly_path = options.output.with_extension(assembly_extension(target));
    std::fs::write(&assembly_path, &assembly).map_err(|e| {
        RsError::io_error(format!("Could not write \"{}\": {}", assembly_path.display(), e))
    })?;
    info!("Wrote {}", assembly_path.display());

    toolchain::assemble_and_link(
        target,
        &assembly_path,
        &options.output,
        &options.compiler,
        &options.link,
    )?;
    info!("Built {}", options.output.display());
    Ok(())
}

fn report(diagnostics: &Diagnostics, sources: &SourceMap) {
    for diagnostic in &diagnostics.messages {
        eprint!("{}", render_diagnostic(diagnostic, sources, true));
    }
}
