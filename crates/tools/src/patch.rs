//! Minimal unified-diff application for `patch` changes.
//!
//! Supports the subset produced by `diff -u` / `git diff`: optional
//! `---`/`+++` headers, `@@ -a,b +c,d @@` hunks, and the
//! `\ No newline at end of file` marker.  Each hunk ends once the line counts
//! in its header are used up; a diff spanning several files is rejected.
//! Hunks whose context does not match at the stated line are searched for
//! elsewhere (nearest match wins).

use std::sync::OnceLock;

use regex::Regex;

use fg_domain::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

#[derive(Debug)]
struct Hunk {
    old_start: usize,
    lines: Vec<HunkLine>,
    /// `\ No newline` seen right after an added line.
    new_missing_newline: bool,
    /// `\ No newline` seen right after a context / removed line.
    old_missing_newline: bool,
}

impl Hunk {
    fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }
}

fn hunk_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("static regex")
    })
}

/// Line budget left in the hunk being read, from its `-a,b +c,d` header.
#[derive(Debug, Clone, Copy, Default)]
struct Remaining {
    old: usize,
    new: usize,
}

impl Remaining {
    fn is_done(&self) -> bool {
        self.old == 0 && self.new == 0
    }

    fn take(&mut self, line: &HunkLine) -> bool {
        let (old, new) = match line {
            HunkLine::Context(_) => (1, 1),
            HunkLine::Remove(_) => (1, 0),
            HunkLine::Add(_) => (0, 1),
        };
        if self.old < old || self.new < new {
            return false;
        }
        self.old -= old;
        self.new -= new;
        true
    }
}

fn count(caps: &regex::Captures<'_>, group: usize) -> Result<usize> {
    caps.get(group).map_or(Ok(1), |m| {
        m.as_str()
            .parse::<usize>()
            .map_err(|_| Error::invalid("malformed hunk header"))
    })
}

fn is_file_header(raw: &str) -> bool {
    raw.starts_with("--- ") || raw.starts_with("+++ ") || raw.starts_with("diff ")
}

fn parse(diff: &str) -> Result<Vec<Hunk>> {
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut remaining = Remaining::default();

    for raw in diff.lines() {
        if let Some(caps) = hunk_header().captures(raw) {
            if !remaining.is_done() {
                return Err(truncated(hunks.len()));
            }
            let old_start = caps[1]
                .parse::<usize>()
                .map_err(|_| Error::invalid("malformed hunk header"))?;
            remaining = Remaining {
                old: count(&caps, 2)?,
                new: count(&caps, 4)?,
            };
            hunks.push(Hunk {
                old_start,
                lines: Vec::new(),
                new_missing_newline: false,
                old_missing_newline: false,
            });
            continue;
        }

        let index = hunks.len();
        let Some(hunk) = hunks.last_mut() else {
            // Preamble (`diff --git`, `---`, `+++`, index lines).
            continue;
        };

        if let Some(rest) = raw.strip_prefix('\\') {
            if rest.trim_start().starts_with("No newline") {
                match hunk.lines.last() {
                    Some(HunkLine::Add(_)) => hunk.new_missing_newline = true,
                    Some(_) => hunk.old_missing_newline = true,
                    None => {}
                }
            }
            continue;
        }

        if remaining.is_done() {
            if is_file_header(raw) {
                return Err(Error::invalid("diff touches more than one file"));
            }
            // `-- ` opens the signature trailer of `git format-patch`.
            if raw != "-- " && raw.starts_with(&[' ', '-', '+'][..]) {
                return Err(overrun(index));
            }
            continue;
        }

        let line = match raw.chars().next() {
            Some(' ') => HunkLine::Context(raw[1..].to_string()),
            Some('-') => HunkLine::Remove(raw[1..].to_string()),
            Some('+') => HunkLine::Add(raw[1..].to_string()),
            // Some tools drop the leading space on empty context lines.
            None => HunkLine::Context(String::new()),
            Some(_) => {
                return Err(Error::invalid(format!("unexpected line in diff: '{raw}'")));
            }
        };
        if !remaining.take(&line) {
            return Err(overrun(index));
        }
        hunk.lines.push(line);
    }

    if hunks.is_empty() {
        return Err(Error::invalid("diff contains no hunks"));
    }
    if !remaining.is_done() {
        return Err(truncated(hunks.len()));
    }
    Ok(hunks)
}

fn overrun(hunk: usize) -> Error {
    Error::invalid(format!("hunk {hunk} is longer than its header says"))
}

fn truncated(hunk: usize) -> Error {
    Error::invalid(format!("hunk {hunk} is shorter than its header says"))
}

fn matches_at(lines: &[&str], at: usize, expected: &[&str]) -> bool {
    at + expected.len() <= lines.len()
        && lines[at..at + expected.len()]
            .iter()
            .zip(expected)
            .all(|(a, b)| a == b)
}

/// Locate `expected` at or after `floor`, preferring the position closest to
/// `target`.
fn locate(lines: &[&str], floor: usize, target: usize, expected: &[&str]) -> Option<usize> {
    let target = target.max(floor);
    if matches_at(lines, target, expected) {
        return Some(target);
    }
    let max = lines.len().saturating_sub(expected.len());
    (1..=lines.len()).find_map(|delta| {
        let after = target + delta;
        if after <= max && matches_at(lines, after, expected) {
            return Some(after);
        }
        let before = target.checked_sub(delta)?;
        (before >= floor && matches_at(lines, before, expected)).then_some(before)
    })
}

/// Apply a unified diff to `original`, returning the new content.
pub fn apply(original: &str, diff: &str) -> Result<String> {
    let hunks = parse(diff)?;
    let old: Vec<&str> = original.lines().collect();
    let mut trailing_newline = original.ends_with('\n') || original.is_empty();

    let mut out: Vec<String> = Vec::with_capacity(old.len());
    let mut pos = 0usize;

    for (idx, hunk) in hunks.iter().enumerate() {
        let expected = hunk.old_lines();
        let target = hunk.old_start.saturating_sub(1);
        let at = if expected.is_empty() {
            // Pure insertion: `-N,0` means "after line N".
            hunk.old_start.max(pos).min(old.len())
        } else {
            locate(&old, pos, target, &expected).ok_or_else(|| {
                Error::invalid(format!("hunk {} does not apply to the current content", idx + 1))
            })?
        };

        out.extend(old[pos..at].iter().map(|s| s.to_string()));
        for line in &hunk.lines {
            match line {
                HunkLine::Context(s) | HunkLine::Add(s) => out.push(s.clone()),
                HunkLine::Remove(_) => {}
            }
        }
        pos = at + expected.len();

        if pos >= old.len() {
            if hunk.new_missing_newline {
                trailing_newline = false;
            } else if hunk.old_missing_newline {
                trailing_newline = true;
            }
        }
    }
    out.extend(old[pos..].iter().map(|s| s.to_string()));

    let mut result = out.join("\n");
    if trailing_newline && !out.is_empty() {
        result.push('\n');
    }
    Ok(result)
}

/// Count `(added, removed)` lines between two texts.
///
/// Multiset comparison: cheap, order-insensitive, good enough for previews.
pub fn line_stats(before: &str, after: &str) -> (usize, usize) {
    use std::collections::HashMap;

    let mut counts: HashMap<&str, isize> = HashMap::new();
    for l in before.lines() {
        *counts.entry(l).or_default() -= 1;
    }
    for l in after.lines() {
        *counts.entry(l).or_default() += 1;
    }
    counts.values().fold((0, 0), |(added, removed), &n| {
        if n > 0 {
            (added + n as usize, removed)
        } else {
            (added, removed + (-n) as usize)
        }
    })
}
