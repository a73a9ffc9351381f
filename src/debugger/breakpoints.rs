use crate::casl2::is_blank_or_comment;
use std::collections::HashMap;

/// Breakpoint ids start here and grow for the whole session.
const FIRST_BREAKPOINT_ID: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: i64,
    pub line: usize,
    pub verified: bool,
}

/// Line breakpoints per source file.
pub struct BreakpointTable {
    files: HashMap<String, Vec<Breakpoint>>,
    next_id: i64,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            next_id: FIRST_BREAKPOINT_ID,
        }
    }

    /// Replaces every breakpoint of `path`. A line is rejected when it is
    /// blank, only a comment, or past the end of `source`.
    pub fn set(&mut self, path: &str, source: Option<&str>, lines: &[usize]) -> Vec<Breakpoint> {
        let source_lines: Vec<&str> = source.map(|s| s.lines().collect()).unwrap_or_default();

        let breakpoints: Vec<Breakpoint> = lines
            .iter()
            .map(|&line| {
                let verified = source_lines
                    .get(line)
                    .is_some_and(|text| !is_blank_or_comment(text));
                let id = self.next_id;
                self.next_id += 1;
                Breakpoint { id, line, verified }
            })
            .collect();

        log::debug!(
            "{} breakpoints for {} ({} verified)",
            breakpoints.len(),
            path,
            breakpoints.iter().filter(|bp| bp.verified).count()
        );
        self.files.insert(path.to_string(), breakpoints.clone());
        breakpoints
    }

    /// Breakpoints of a file never seen are an empty set.
    pub fn get(&self, path: &str) -> &[Breakpoint] {
        self.files.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, path: &str, line: usize) -> bool {
        self.get(path)
            .iter()
            .any(|bp| bp.verified && bp.line == line)
    }
}

impl Default for BreakpointTable {
    fn default() -> Self {
        Self::new()
    }
}
