//! Healing-branch naming and the protected-branch deny list.

/// Suffix every healing branch carries, verbatim casing.
pub const HEALING_SUFFIX: &str = "_AI_Fix";

/// Branch bases that must never be mutated, compared case-insensitively.
pub const PROTECTED_BRANCHES: [&str; 5] = ["main", "master", "head", "develop", "dev"];

/// Derive the healing branch name from a free-form label.
///
/// Trims, uppercases, collapses whitespace runs to a single underscore,
/// drops everything outside `[A-Z0-9_]`, then appends [`HEALING_SUFFIX`].
/// Total over any input; an empty or all-junk label yields `"_AI_Fix"`.
pub fn format_branch_name(label: &str) -> String {
    let mut name = String::with_capacity(label.len() + HEALING_SUFFIX.len());
    let mut in_gap = false;
    for ch in label.trim().chars() {
        if ch.is_whitespace() {
            if !in_gap {
                name.push('_');
                in_gap = true;
            }
            continue;
        }
        in_gap = false;
        for up in ch.to_uppercase() {
            if up.is_ascii_uppercase() || up.is_ascii_digit() || up == '_' {
                name.push(up);
            }
        }
    }
    name.push_str(HEALING_SUFFIX);
    name
}

/// The comparison form used against [`PROTECTED_BRANCHES`]: suffix stripped,
/// surrounding underscores trimmed, lowercased.
pub fn branch_base(branch: &str) -> String {
    branch
        .strip_suffix(HEALING_SUFFIX)
        .unwrap_or(branch)
        .trim_matches('_')
        .to_lowercase()
}

pub fn is_protected(branch: &str) -> bool {
    let base = branch_base(branch);
    PROTECTED_BRANCHES.contains(&base.as_str())
}
