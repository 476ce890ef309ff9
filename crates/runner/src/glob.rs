//! Minimal glob matching for case discovery
//!
//! Supported syntax is deliberately small:
//! - `*` matches any run of characters except `/`
//! - `**` splits the pattern into segments that must appear in order, with
//!   anything (including separators) between them
//!
//! Everything else, `.` included, is literal. `?`, `[...]` and `{a,b}` are not
//! special and therefore only match themselves.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::RunnerResult;

const DOUBLE_STAR: &str = "**";

/// A compiled glob pattern
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    normalized: String,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    /// No `**`: the whole path must match
    Anchored(Regex),
    /// Unanchored segments searched left to right
    Segments(Vec<Regex>),
    /// The pattern could not be compiled and matches nothing
    Never,
}

impl GlobPattern {
    /// Compile a pattern. Backslashes are treated as separators and `.`
    /// components are dropped.
    pub fn new(pattern: &str) -> Self {
        let normalized = normalize_pattern(pattern);

        let compiled = if normalized.contains(DOUBLE_STAR) {
            normalized
                .split(DOUBLE_STAR)
                .map(|segment| segment.trim_matches('/'))
                .filter(|segment| !segment.is_empty())
                .map(|segment| compile_segment(segment, false))
                .collect::<Result<Vec<_>, _>>()
                .map(PatternKind::Segments)
        } else {
            compile_segment(&normalized, true).map(PatternKind::Anchored)
        };
        let kind = compiled.unwrap_or_else(|e| {
            warn!(pattern, error = %e, "Glob pattern will not match anything");
            PatternKind::Never
        });

        Self {
            source: pattern.to_string(),
            normalized,
            kind,
        }
    }

    /// The pattern as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern is rooted at `/` (or a drive prefix)
    pub fn is_absolute(&self) -> bool {
        Path::new(&self.source).is_absolute()
    }

    /// Whether the pattern contains `**`
    pub fn is_recursive(&self) -> bool {
        self.normalized.contains(DOUBLE_STAR)
    }

    /// The leading directories of the pattern that contain no wildcard
    pub fn base_dir(&self) -> PathBuf {
        let mut components: Vec<&str> = self.normalized.split('/').collect();
        // the last component names files, never a directory to walk
        components.pop();
        let literal: Vec<&str> = components
            .into_iter()
            .take_while(|c| !c.contains('*'))
            .collect();
        if literal.len() == 1 && literal[0].is_empty() {
            return PathBuf::from("/");
        }
        PathBuf::from(literal.join("/"))
    }

    /// Match a path (already relative or absolute as appropriate)
    pub fn matches(&self, path: &str) -> bool {
        let path = normalize_separators(path);
        match &self.kind {
            PatternKind::Anchored(re) => re.is_match(&path),
            PatternKind::Segments(segments) => {
                let mut offset = 0;
                for segment in segments {
                    match segment.find_at(&path, offset) {
                        Some(m) => offset = m.end(),
                        None => return false,
                    }
                }
                true
            }
            PatternKind::Never => false,
        }
    }
}

fn normalize_separators(s: &str) -> String {
    s.replace('\\', "/")
}

/// `./cases//*.json` and `cases/*.json` name the same files
fn normalize_pattern(s: &str) -> String {
    let normalized = normalize_separators(s);
    let mut components = normalized.split('/').enumerate().filter(|(i, c)| {
        // keep the empty leading component of an absolute pattern
        *c != "." && (*i == 0 || !c.is_empty())
    });
    let mut out = String::with_capacity(normalized.len());
    if let Some((_, first)) = components.next() {
        out.push_str(first);
    }
    for (_, component) in components {
        out.push('/');
        out.push_str(component);
    }
    out
}

fn compile_segment(segment: &str, anchored: bool) -> Result<Regex, regex::Error> {
    let body = segment
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("[^/]*");
    let source = if anchored {
        format!("^{}$", body)
    } else {
        body
    };
    Regex::new(&source)
}

/// Collect every regular file below `root`, depth first, in file-name order
pub fn walk_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

/// Find the files under `root` that match any of `patterns`.
///
/// Relative patterns match paths relative to `root`; absolute patterns match
/// absolute paths. Recursive relative patterns are checked against every file
/// below `root`, since their segments may match at any depth. Anchored
/// patterns only walk their literal base directory. Results are absolute
/// (when `root` is), de-duplicated and kept in discovery order.
pub fn discover(root: &Path, patterns: &[String]) -> RunnerResult<Vec<PathBuf>> {
    let compiled: Vec<GlobPattern> = patterns.iter().map(|p| GlobPattern::new(p)).collect();
    let mut walked: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for pattern in &compiled {
        let walk_root = if pattern.is_absolute() {
            pattern.base_dir()
        } else if pattern.is_recursive() {
            root.to_path_buf()
        } else {
            root.join(pattern.base_dir())
        };
        if !walk_root.is_dir() {
            debug!(pattern = pattern.as_str(), dir = %walk_root.display(), "Pattern base does not exist");
            continue;
        }

        let files = walked
            .entry(walk_root.clone())
            .or_insert_with(|| walk_files(&walk_root));
        for file in files.iter() {
            if seen.contains(file) {
                continue;
            }
            let candidate = if pattern.is_absolute() {
                file.to_string_lossy().into_owned()
            } else {
                match file.strip_prefix(root) {
                    Ok(rel) => rel.to_string_lossy().into_owned(),
                    Err(_) => continue,
                }
            };
            if pattern.matches(&candidate) {
                seen.insert(file.clone());
                found.push(file.clone());
            }
        }
    }

    debug!(count = found.len(), "Discovered case files");
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("dir/**/*.json", "dir/a/b/c.json" => true ; "nested below double star")]
    #[test_case("dir/**/*.json", "dir/c.json" => true ; "directly below double star")]
    #[test_case("dir/**/*.json", "dir/c.txt" => false ; "wrong extension")]
    #[test_case("*.json", "x.json" => true ; "top level")]
    #[test_case("*.json", "sub/x.json" => false ; "star does not cross separators")]
    #[test_case("*.json", "xjson" => false ; "dot is literal")]
    #[test_case("cases/*.json", "cases\\x.json" => true ; "backslash separator")]
    #[test_case("Cases/*.json", "cases/x.json" => false ; "case sensitive")]
    #[test_case("case?.json", "case1.json" => false ; "question mark is literal")]
    #[test_case("[ab].json", "a.json" => false ; "classes are literal")]
    #[test_case("**/fixtures/**/*.json", "tests/fixtures/deep/x.json" => true ; "segments in order")]
    #[test_case("**/b/**/a/*.json", "a/x/b/y.json" => false ; "segments out of order")]
    fn test_matches(pattern: &str, path: &str) -> bool {
        GlobPattern::new(pattern).matches(path)
    }

    #[test_case("./cases/*.json", "cases/*.json" ; "leading current dir")]
    #[test_case("cases/./a//*.json", "cases/a/*.json" ; "inner current dir and doubled separator")]
    #[test_case("/tmp/./cases/*.json", "/tmp/cases/*.json" ; "absolute")]
    #[test_case(".\\cases\\*.json", "cases/*.json" ; "backslashes")]
    fn test_normalize_pattern(pattern: &str, normalized: &str) {
        assert_eq!(normalize_pattern(pattern), normalized);
    }

    #[test]
    fn test_base_dir() {
        assert_eq!(GlobPattern::new("./cases/*.json").base_dir(), PathBuf::from("cases"));
        assert_eq!(GlobPattern::new("tests/integration/**/*.json").base_dir(), PathBuf::from("tests/integration"));
        assert_eq!(GlobPattern::new("*.json").base_dir(), PathBuf::from(""));
        assert_eq!(GlobPattern::new("/tmp/cases/*.json").base_dir(), PathBuf::from("/tmp/cases"));
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "{}").unwrap();
    }

    #[test]
    fn test_discover_relative_patterns() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "x.json");
        touch(tmp.path(), "sub/x.json");
        touch(tmp.path(), "dir/c.json");
        touch(tmp.path(), "dir/c.txt");
        touch(tmp.path(), "dir/a/b/c.json");

        let top = discover(tmp.path(), &["*.json".to_string()]).unwrap();
        assert_eq!(top, vec![tmp.path().join("x.json")]);

        let nested = discover(tmp.path(), &["dir/**/*.json".to_string()]).unwrap();
        assert_eq!(
            nested,
            vec![tmp.path().join("dir/a/b/c.json"), tmp.path().join("dir/c.json")]
        );
    }

    #[test]
    fn test_discover_absolute_pattern_and_dedup() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "cases/one.json");
        touch(tmp.path(), "cases/two.json");

        let absolute = format!("{}/**/*.json", tmp.path().display());
        let found = discover(
            Path::new("/nonexistent-root"),
            &[absolute.clone(), absolute],
        )
        .unwrap();
        assert_eq!(
            found,
            vec![tmp.path().join("cases/one.json"), tmp.path().join("cases/two.json")]
        );
    }

    #[test]
    fn test_discover_recursive_pattern_at_any_depth() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "x/cases/a.json");
        touch(tmp.path(), "cases/b.json");
        touch(tmp.path(), "other/c.json");

        let found = discover(tmp.path(), &["cases/**/*.json".to_string()]).unwrap();
        assert_eq!(
            found,
            vec![tmp.path().join("cases/b.json"), tmp.path().join("x/cases/a.json")]
        );
    }

    #[test]
    fn test_discover_current_dir_prefix() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "cases/a.json");

        let found = discover(tmp.path(), &["./cases/*.json".to_string()]).unwrap();
        assert_eq!(found, vec![tmp.path().join("cases/a.json")]);

        let nested = discover(tmp.path(), &["./cases/**/*.json".to_string()]).unwrap();
        assert_eq!(nested, vec![tmp.path().join("cases/a.json")]);
    }

    #[test]
    fn test_discover_nothing() {
        let tmp = TempDir::new().unwrap();
        let found = discover(tmp.path(), &["tests/integration/**/*.json".to_string()]).unwrap();
        assert!(found.is_empty());
    }
}
