//! Greedy line-level diff rendering for tool-call previews.
//!
//! This is deliberately not a minimal-edit-distance diff: on a mismatch it
//! prefers draining deletions from the old side before emitting additions,
//! which can over-report changes on reordered content. Callers depend on
//! this exact output shape, so keep the walk order stable.

/// Render a unified-diff-style preview between two versions of `path`.
///
/// Output is a `--- a/<path>` / `+++ b/<path>` header followed by one line
/// per source line: ` ` context, `-` deletion, `+` addition.
pub fn render_unified(path: &str, old: &str, new: &str) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let mut out = String::new();
    out.push_str(&format!("--- a/{path}\n"));
    out.push_str(&format!("+++ b/{path}\n"));

    let mut i = 0;
    let mut j = 0;
    while i < old_lines.len() || j < new_lines.len() {
        if i < old_lines.len() && j < new_lines.len() && old_lines[i] == new_lines[j] {
            out.push_str(&format!(" {}\n", old_lines[i]));
            i += 1;
            j += 1;
        } else if i < old_lines.len() {
            out.push_str(&format!("-{}\n", old_lines[i]));
            i += 1;
        } else {
            out.push_str(&format!("+{}\n", new_lines[j]));
            j += 1;
        }
    }

    out
}
