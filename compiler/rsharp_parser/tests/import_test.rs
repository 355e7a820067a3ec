//! Import resolution and parsing-cache behavior

use rsharp_common::SourceMap;
use rsharp_parser::{imports, ItemKind, ParsingCache};
use std::fs;
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn function_names(program: &rsharp_parser::Program) -> Vec<String> {
    program
        .items
        .iter()
        .filter_map(|item| match &item.kind {
            ItemKind::Function(f) => Some(f.name.value.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn imports_named_item_from_sibling_file() {
    let dir = TempDir::new().unwrap();
    write_file(&dir, "util.rs", "helper() : i32 { return 7; }\nunused() : i32 { return 0; }");
    let main = write_file(&dir, "main.rs", "helper @ util;\nmain() : i32 { return helper(); }");

    let mut cache = ParsingCache::new();
    let mut sources = SourceMap::new();
    let (program, diagnostics) = imports::parse_file(&main, None, &mut cache, &mut sources).unwrap();
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages);

    let names = function_names(&program);
    assert_eq!(names, vec!["helper".to_string(), "main".to_string()]);
}

#[test]
fn wildcard_import_pulls_everything_once() {
    let dir = TempDir::new().unwrap();
    write_file(&dir, "util.rs", "a() : i32 { return 1; }\nb() : i32 { return 2; }");
    let main = write_file(
        &dir,
        "main.rs",
        "* @ util;\n* @ util;\nmain() : i32 { return a() + b(); }",
    );

    let mut cache = ParsingCache::new();
    let mut sources = SourceMap::new();
    let (program, diagnostics) = imports::parse_file(&main, None, &mut cache, &mut sources).unwrap();
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages);

    let names = function_names(&program);
    // the second wildcard import is a no-op
    assert_eq!(names, vec!["a".to_string(), "b".to_string(), "main".to_string()]);
}

#[test]
fn diamond_imports_do_not_duplicate_items() {
    let dir = TempDir::new().unwrap();
    write_file(&dir, "base.rs", "base() : i32 { return 1; }");
    write_file(&dir, "left.rs", "* @ base;\nleft() : i32 { return base(); }");
    write_file(&dir, "right.rs", "* @ base;\nright() : i32 { return base(); }");
    let main = write_file(
        &dir,
        "main.rs",
        "* @ left;\n* @ right;\nmain() : i32 { return left() + right(); }",
    );

    let mut cache = ParsingCache::new();
    let mut sources = SourceMap::new();
    let (program, diagnostics) = imports::parse_file(&main, None, &mut cache, &mut sources).unwrap();
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages);

    let names = function_names(&program);
    let base_count = names.iter().filter(|n| n.as_str() == "base").count();
    assert_eq!(base_count, 1, "base must only be imported once: {:?}", names);
}

#[test]
fn std_import_resolves_against_stdlib_directory() {
    let stdlib = TempDir::new().unwrap();
    write_file(&stdlib, "io.rs", "[extern] puts(s: *i8) : i32;");
    let dir = TempDir::new().unwrap();
    let main = write_file(&dir, "main.rs", "puts @ std::io;\nmain() : i32 { puts(\"hi\"); return 0; }");

    let mut cache = ParsingCache::new();
    let mut sources = SourceMap::new();
    let (program, diagnostics) =
        imports::parse_file(&main, Some(stdlib.path()), &mut cache, &mut sources).unwrap();
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages);
    assert!(function_names(&program).contains(&"puts".to_string()));
}

#[test]
fn missing_item_is_reported_at_the_import_site() {
    let dir = TempDir::new().unwrap();
    write_file(&dir, "util.rs", "a() : i32 { return 1; }");
    let main = write_file(&dir, "main.rs", "nonexistent @ util;\nmain() : i32 { return 0; }");

    let mut cache = ParsingCache::new();
    let mut sources = SourceMap::new();
    let (_, diagnostics) = imports::parse_file(&main, None, &mut cache, &mut sources).unwrap();
    assert!(diagnostics.has_errors());

    // the name that cannot be found is an error in the *importing* file
    let diag = diagnostics.errors().next().unwrap();
    assert!(
        sources.name(diag.span.file_id).ends_with("main.rs"),
        "expected attribution to main.rs, got {}",
        sources.name(diag.span.file_id)
    );
    assert_eq!(diag.span.start.line, 1);
}

#[test]
fn errors_inside_imported_files_carry_that_files_identity() {
    let dir = TempDir::new().unwrap();
    // the syntax error sits on line 2 of util.rs
    write_file(&dir, "util.rs", "ok() : i32 { return 1; }\nbroken( : i32 {}");
    let main = write_file(&dir, "main.rs", "* @ util;\nmain() : i32 { return ok(); }");

    let mut cache = ParsingCache::new();
    let mut sources = SourceMap::new();
    let (_, diagnostics) = imports::parse_file(&main, None, &mut cache, &mut sources).unwrap();
    assert!(diagnostics.has_errors());

    let attributed: Vec<_> = diagnostics
        .errors()
        .filter(|d| sources.name(d.span.file_id).ends_with("util.rs"))
        .collect();
    assert!(
        !attributed.is_empty(),
        "imported-file errors must point at util.rs: {:?}",
        diagnostics.messages
    );
    assert!(attributed.iter().any(|d| d.span.start.line == 2));
    // and the text behind that id is util.rs's, so the renderer shows the
    // right line
    assert!(sources
        .source(attributed[0].span.file_id)
        .contains("broken( : i32 {}"));
}

#[test]
fn import_cycles_are_reported_not_looped() {
    let dir = TempDir::new().unwrap();
    write_file(&dir, "a.rs", "b @ b;\na() : i32 { return 1; }");
    write_file(&dir, "b.rs", "a @ a;\nb() : i32 { return 2; }");
    let main = write_file(&dir, "main.rs", "a @ a;\nmain() : i32 { return a(); }");

    let mut cache = ParsingCache::new();
    let mut sources = SourceMap::new();
    let (_, diagnostics) = imports::parse_file(&main, None, &mut cache, &mut sources).unwrap();
    assert!(diagnostics.has_errors());
}

#[test]
fn ast_serialization_round_trips() {
    let dir = TempDir::new().unwrap();
    let main = write_file(&dir, "main.rs", "main() : i32 { return 41 + 1; }");

    let mut cache = ParsingCache::new();
    let mut sources = SourceMap::new();
    let (program, _) = imports::parse_file(&main, None, &mut cache, &mut sources).unwrap();

    let json = serde_json::to_string(&program).unwrap();
    let back: rsharp_parser::Program = serde_json::from_str(&json).unwrap();
    assert_eq!(function_names(&program), function_names(&back));
}
