use crate::error::CodeMarksError;
use globset::{Glob, GlobMatcher};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone)]
enum FilePattern {
    Any,
    Glob(GlobMatcher),
    /// Failed to compile; never matches.
    Invalid,
}

/// Decides which files are eligible for scanning, by file name.
#[derive(Debug, Clone)]
pub struct FileFilter {
    patterns: Vec<(String, FilePattern)>,
}

impl FileFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref().to_string();
                let compiled = Self::compile(&pattern);
                (pattern, compiled)
            })
            .collect();
        Self { patterns }
    }

    fn compile(pattern: &str) -> FilePattern {
        if pattern == "*" {
            return FilePattern::Any;
        }
        match Glob::new(pattern) {
            Ok(glob) => FilePattern::Glob(glob.compile_matcher()),
            Err(source) => {
                let error = CodeMarksError::PatternCompile {
                    pattern: pattern.to_string(),
                    source,
                };
                warn!("{}; pattern ignored", error);
                FilePattern::Invalid
            }
        }
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(pattern, _)| pattern.as_str())
    }

    /// Directories are never scanned; files need a name matching at least
    /// one pattern.
    pub fn should_scan(&self, _path: &Path, file_name: &str, is_directory: bool) -> bool {
        if is_directory {
            return false;
        }
        self.matches_name(file_name)
    }

    /// Convenience for callers that only have a path.
    pub fn should_scan_path(&self, path: &Path, is_directory: bool) -> bool {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        !file_name.is_empty() && self.should_scan(path, &file_name, is_directory)
    }

    pub fn matches_name(&self, file_name: &str) -> bool {
        self.patterns.iter().any(|(_, pattern)| match pattern {
            FilePattern::Any => true,
            FilePattern::Glob(matcher) => matcher.is_match(file_name),
            FilePattern::Invalid => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scan(filter: &FileFilter, name: &str) -> bool {
        filter.should_scan(&PathBuf::from("/ws").join(name), name, false)
    }

    #[test]
    fn test_directories_rejected() {
        let filter = FileFilter::new(["*"]);
        assert!(!filter.should_scan(Path::new("/ws/src"), "src", true));
    }

    #[test]
    fn test_star_matches_everything() {
        let filter = FileFilter::new(["*"]);
        assert!(scan(&filter, "data.json"));
        assert!(scan(&filter, "Makefile"));
        assert!(scan(&filter, ".hidden"));
    }

    #[test]
    fn test_extension_globs() {
        let filter = FileFilter::new(["*.json"]);
        assert!(scan(&filter, "data.json"));
        assert!(!scan(&filter, "data.jsonl"));
        assert!(!scan(&filter, "main.rs"));
    }

    #[test]
    fn test_brace_alternatives_and_question_mark() {
        let filter = FileFilter::new(["*.{kt,java}", "?.md"]);
        assert!(scan(&filter, "Main.kt"));
        assert!(scan(&filter, "Main.java"));
        assert!(scan(&filter, "a.md"));
        assert!(!scan(&filter, "ab.md"));
        assert!(!scan(&filter, "Main.scala"));
    }

    #[test]
    fn test_invalid_pattern_degrades() {
        let filter = FileFilter::new(["*.{rs", "*.py"]);
        assert!(scan(&filter, "tool.py"));
        assert!(!scan(&filter, "lib.rs"));
        assert_eq!(filter.patterns().count(), 2);
    }

    #[test]
    fn test_no_patterns_matches_nothing() {
        let filter = FileFilter::new(Vec::<String>::new());
        assert!(!scan(&filter, "lib.rs"));
    }

    #[test]
    fn test_should_scan_path() {
        let filter = FileFilter::new(["*.rs"]);
        assert!(filter.should_scan_path(Path::new("/ws/src/lib.rs"), false));
        assert!(!filter.should_scan_path(Path::new("/"), false));
    }
}
