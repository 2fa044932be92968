//! Line-based unified diff for the manifest and patch events.
//!
//! Output is capped so one pathological rewrite cannot bloat the session
//! report; the written file itself is never truncated, only its diff.

const CONTEXT: usize = 3;

/// Total rendered lines kept per file, headers included.
pub const MAX_DIFF_LINES: usize = 120;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Delete,
    Insert,
}

struct Step {
    op: Op,
    /// Old lines consumed before this step.
    old_pos: usize,
    /// New lines consumed before this step.
    new_pos: usize,
}

fn diff_ops(old: &[&str], new: &[&str]) -> Vec<Op> {
    let n = old.len();
    let m = new.len();
    // LCS table memory guard; past it, degrade to full replacement.
    if n.saturating_add(1).saturating_mul(m + 1) > 16_000_000 {
        let mut ops = vec![Op::Delete; n];
        ops.extend(std::iter::repeat(Op::Insert).take(m));
        return ops;
    }

    let width = m + 1;
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if old[i] == new[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push(Op::Equal);
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            ops.push(Op::Delete);
            i += 1;
        } else {
            ops.push(Op::Insert);
            j += 1;
        }
    }
    ops.extend(std::iter::repeat(Op::Delete).take(n - i));
    ops.extend(std::iter::repeat(Op::Insert).take(m - j));
    ops
}

/// Unified diff of `old_content` against `new_content`, with `a/`/`b/`
/// headers for `rel_path` and at most [`MAX_DIFF_LINES`] lines. Identical
/// inputs yield an empty string.
pub fn unified_diff(old_content: &str, new_content: &str, rel_path: &str) -> String {
    let old: Vec<&str> = old_content.lines().collect();
    let new: Vec<&str> = new_content.lines().collect();

    let ops = diff_ops(&old, &new);

    let mut steps = Vec::with_capacity(ops.len());
    let (mut old_pos, mut new_pos) = (0, 0);
    for op in ops {
        steps.push(Step {
            op,
            old_pos,
            new_pos,
        });
        match op {
            Op::Equal => {
                old_pos += 1;
                new_pos += 1;
            }
            Op::Delete => old_pos += 1,
            Op::Insert => new_pos += 1,
        }
    }

    // Group changed steps into hunks sharing overlapping context.
    let mut groups: Vec<(usize, usize)> = Vec::new();
    for (idx, step) in steps.iter().enumerate() {
        if step.op == Op::Equal {
            continue;
        }
        match groups.last_mut() {
            Some(last) if idx <= last.1 + 2 * CONTEXT + 1 => last.1 = idx,
            _ => groups.push((idx, idx)),
        }
    }
    if groups.is_empty() {
        return String::new();
    }

    let mut out = vec![format!("--- a/{rel_path}"), format!("+++ b/{rel_path}")];
    for (first, last) in groups {
        let lo = first.saturating_sub(CONTEXT);
        let hi = (last + CONTEXT).min(steps.len() - 1);

        let old_count = steps[lo..=hi]
            .iter()
            .filter(|s| s.op != Op::Insert)
            .count();
        let new_count = steps[lo..=hi]
            .iter()
            .filter(|s| s.op != Op::Delete)
            .count();
        let old_start = steps[lo].old_pos + usize::from(old_count > 0);
        let new_start = steps[lo].new_pos + usize::from(new_count > 0);

        out.push(format!(
            "@@ -{old_start},{old_count} +{new_start},{new_count} @@"
        ));
        for step in &steps[lo..=hi] {
            let line = match step.op {
                Op::Equal => format!(" {}", old[step.old_pos]),
                Op::Delete => format!("-{}", old[step.old_pos]),
                Op::Insert => format!("+{}", new[step.new_pos]),
            };
            out.push(line);
        }
    }

    out.truncate(MAX_DIFF_LINES);
    out.join("\n")
}
