//! Source file registry for multi-file compilations
//!
//! Imports pull additional files into one compilation; every span carries
//! the `file_id` of the file it came from, and the registry maps that id
//! back to the file's name and text so diagnostics render against the
//! right source.

use serde::{Deserialize, Serialize};

/// A source file registered with the compilation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
}

/// Maps the `file_id` carried by every span back to its file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file; the returned id is what the file's spans carry
    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) -> u32 {
        let id = self.files.len() as u32;
        self.files.push(SourceFile { name: name.into(), source: source.into() });
        id
    }

    pub fn get(&self, file_id: u32) -> Option<&SourceFile> {
        self.files.get(file_id as usize)
    }

    pub fn name(&self, file_id: u32) -> &str {
        self.get(file_id).map(|f| f.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn source(&self, file_id: u32) -> &str {
        self.get(file_id).map(|f| f.source.as_str()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_handed_out_in_registration_order() {
        let mut sources = SourceMap::new();
        let main = sources.add("main.rs", "main() : i32 { return 0; }");
        let util = sources.add("util.rs", "helper() : i32 { return 1; }");
        assert_eq!(main, 0);
        assert_eq!(util, 1);
        assert_eq!(sources.name(util), "util.rs");
        assert!(sources.source(main).contains("main"));
    }

    #[test]
    fn unknown_ids_fall_back_gracefully() {
        let sources = SourceMap::new();
        assert_eq!(sources.name(7), "<unknown>");
        assert_eq!(sources.source(7), "");
    }
}
