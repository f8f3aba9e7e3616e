//! merge::diff3
//!
//! Line-level three-way text merge.
//!
//! The algorithm aligns base/ours/theirs on lines that are unmodified on
//! both sides (computed via longest-common-subsequence matching against the
//! base), interleaves non-overlapping hunks, and flags overlapping hunks as
//! conflicts. Rendering a conflicted result produces the standard inline
//! markers:
//!
//! ```text
//! <<<<<<< HEAD
//! ours lines
//! =======
//! theirs lines
//! >>>>>>> <theirs-label>
//! ```
//!
//! The marker format is byte-reproducible; tests assert on it exactly.

/// Label used for the "ours" side of conflict markers.
pub const OURS_MARKER_LABEL: &str = "HEAD";

/// One merged region: either resolved lines or a conflicting pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hunk {
    Resolved(Vec<String>),
    Conflict {
        ours: Vec<String>,
        theirs: Vec<String>,
    },
}

/// Outcome of a three-way text merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff3Result {
    pub hunks: Vec<Hunk>,
    /// Whether the merged output should end with a newline.
    trailing_newline: bool,
}

impl Diff3Result {
    /// True when no hunk conflicts.
    pub fn is_clean(&self) -> bool {
        self.hunks.iter().all(|h| matches!(h, Hunk::Resolved(_)))
    }

    /// Render the merge result, inserting conflict markers where needed.
    pub fn render(&self, theirs_label: &str) -> String {
        let mut lines: Vec<String> = Vec::new();
        for hunk in &self.hunks {
            match hunk {
                Hunk::Resolved(resolved) => lines.extend(resolved.iter().cloned()),
                Hunk::Conflict { ours, theirs } => {
                    lines.push(format!("<<<<<<< {OURS_MARKER_LABEL}"));
                    lines.extend(ours.iter().cloned());
                    lines.push("=======".to_string());
                    lines.extend(theirs.iter().cloned());
                    lines.push(format!(">>>>>>> {theirs_label}"));
                }
            }
        }
        let mut out = lines.join("\n");
        if self.trailing_newline && !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

/// Merge `ours` and `theirs` relative to `base`, line by line.
pub fn diff3(base: &str, ours: &str, theirs: &str) -> Diff3Result {
    let base_lines: Vec<&str> = base.lines().collect();
    let ours_lines: Vec<&str> = ours.lines().collect();
    let theirs_lines: Vec<&str> = theirs.lines().collect();

    // Match each side against the base independently; a base line matched
    // on both sides is a sync point the merge can anchor on.
    let ours_match = lcs_matches(&base_lines, &ours_lines);
    let theirs_match = lcs_matches(&base_lines, &theirs_lines);

    let mut hunks: Vec<Hunk> = Vec::new();
    let (mut bi, mut oi, mut ti) = (0usize, 0usize, 0usize);

    let mut flush_chunk =
        |hunks: &mut Vec<Hunk>, b: &[&str], o: &[&str], t: &[&str]| {
            if b.is_empty() && o.is_empty() && t.is_empty() {
                return;
            }
            let hunk = classify_chunk(b, o, t);
            // Merge adjacent resolved hunks so rendering stays compact.
            if let (Some(Hunk::Resolved(prev)), Hunk::Resolved(lines)) =
                (hunks.last_mut(), &hunk)
            {
                prev.extend(lines.iter().cloned());
            } else {
                hunks.push(hunk);
            }
        };

    for base_idx in 0..base_lines.len() {
        let (Some(&o_idx), Some(&t_idx)) = (ours_match.get(&base_idx), theirs_match.get(&base_idx))
        else {
            continue;
        };
        // Sync point: everything accumulated since the last one is a chunk.
        flush_chunk(
            &mut hunks,
            &base_lines[bi..base_idx],
            &ours_lines[oi..o_idx],
            &theirs_lines[ti..t_idx],
        );
        flush_chunk(
            &mut hunks,
            &base_lines[base_idx..=base_idx],
            &ours_lines[o_idx..=o_idx],
            &theirs_lines[t_idx..=t_idx],
        );
        bi = base_idx + 1;
        oi = o_idx + 1;
        ti = t_idx + 1;
    }
    flush_chunk(
        &mut hunks,
        &base_lines[bi..],
        &ours_lines[oi..],
        &theirs_lines[ti..],
    );

    // Newline at EOF: keep it when either surviving side keeps it.
    let trailing_newline = ours.ends_with('\n') || theirs.ends_with('\n');
    Diff3Result {
        hunks,
        trailing_newline,
    }
}

fn classify_chunk(base: &[&str], ours: &[&str], theirs: &[&str]) -> Hunk {
    let to_owned = |s: &[&str]| s.iter().map(|l| l.to_string()).collect::<Vec<_>>();
    if ours == base {
        Hunk::Resolved(to_owned(theirs))
    } else if theirs == base || ours == theirs {
        Hunk::Resolved(to_owned(ours))
    } else {
        Hunk::Conflict {
            ours: to_owned(ours),
            theirs: to_owned(theirs),
        }
    }
}

/// Longest-common-subsequence matching: base index → other index.
///
/// Quadratic DP; file sizes here are classroom-scale, and the mapping is
/// strictly monotonic which the chunk walk relies on.
fn lcs_matches(base: &[&str], other: &[&str]) -> std::collections::HashMap<usize, usize> {
    let n = base.len();
    let m = other.len();
    let mut table = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if base[i] == other[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }
    let mut out = std::collections::HashMap::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if base[i] == other[j] {
            out.insert(i, j);
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}
