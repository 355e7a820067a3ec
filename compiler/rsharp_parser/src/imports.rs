//! Import resolution and the parsing cache
//!
//! An import pulls selected items (or everything, with `*`) out of another
//! source file. Imported files are tokenized and parsed recursively; the
//! cache remembers which `(file, item)` pairs were already imported so that
//! diamond imports do not duplicate definitions.

use crate::{Parser, Program};
use rsharp_common::{Diagnostics, RsError, RsResult, SourceMap};
use rsharp_lexer::Lexer;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Remembers what has been imported so far during one compilation
#[derive(Debug, Default)]
pub struct ParsingCache {
    imported: HashSet<(PathBuf, String)>,
    wildcards: HashSet<PathBuf>,
    in_progress: HashSet<PathBuf>,
}

impl ParsingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &Path, name: &str) -> bool {
        self.wildcards.contains(path) || self.imported.contains(&(path.to_path_buf(), name.to_string()))
    }

    pub fn contains_wildcard(&self, path: &Path) -> bool {
        self.wildcards.contains(path)
    }

    pub fn add(&mut self, path: &Path, name: &str) {
        self.imported.insert((path.to_path_buf(), name.to_string()));
    }

    pub fn add_wildcard(&mut self, path: &Path) {
        self.wildcards.insert(path.to_path_buf());
    }

    pub fn begin_file(&mut self, path: &Path) -> bool {
        self.in_progress.insert(path.to_path_buf())
    }

    pub fn finish_file(&mut self, path: &Path) {
        self.in_progress.remove(path);
    }

    pub fn is_in_progress(&self, path: &Path) -> bool {
        self.in_progress.contains(path)
    }
}

/// Resolve an import path (`a::b::c`) to a file on disk.
///
/// A leading `std` segment resolves against the `--stdlib` directory;
/// anything else is relative to the directory of the importing file.
pub fn resolve_import_path(
    segments: &[String],
    importing_file: &Path,
    stdlib: Option<&Path>,
) -> RsResult<PathBuf> {
    let mut path = if segments.first().map(String::as_str) == Some("std") {
        match stdlib {
            Some(dir) => dir.to_path_buf(),
            None => {
                return Err(RsError::parse_error(
                    "Import uses a std:: path but no standard library directory was given",
                ))
            }
        }
    } else {
        let mut base = importing_file.to_path_buf();
        base.pop();
        base.push(&segments[0]);
        base
    };

    for segment in &segments[1..] {
        path.push(segment);
    }
    path.set_extension("rs");
    Ok(path)
}

/// Tokenize and parse a source file, going through the shared cache.
///
/// The file is registered with `sources` first so that every span it
/// produces — and every diagnostic raised against it, even when surfaced
/// through an importing file's parser — points back at its own text.
pub fn parse_file(
    path: &Path,
    stdlib: Option<&Path>,
    cache: &mut ParsingCache,
    sources: &mut SourceMap,
) -> RsResult<(Program, Diagnostics)> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| RsError::io_error(format!("Could not open file \"{}\": {}", path.display(), e)))?;
    let file_id = sources.add(path.display().to_string(), source.clone());

    let mut lexer = Lexer::new(&source, file_id);
    let tokens = lexer.tokenize();
    let mut diagnostics = lexer.diagnostics().clone();

    let mut parser = Parser::new(tokens, path.to_path_buf(), stdlib.map(Path::to_path_buf));
    let program = parser.parse_program(cache, sources);
    diagnostics.extend(parser.take_diagnostics());

    Ok((program, diagnostics))
}
