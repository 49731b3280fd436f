//! Path validation for the repository sandbox.
//!
//! Every path-bearing tool resolves its path here before touching the
//! filesystem. Validation canonicalizes (resolving `.`, `..`, and symlinks
//! through the filesystem) rather than string-prefix checking, so a symlink
//! pointing outside the root fails the same way `../` does.

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

/// Resolve `raw` against the canonical `workspace` root and require the
/// result to exist inside it. Returns the canonical absolute path.
pub fn validate_existing(workspace: &Path, raw: &str) -> Result<PathBuf> {
    let candidate = absolute_candidate(workspace, raw)?;
    let canonical = candidate
        .canonicalize()
        .map_err(|err| anyhow!("failed to resolve path {}: {err}", candidate.display()))?;
    ensure_inside(workspace, &canonical)?;
    Ok(canonical)
}

/// Resolve `raw` as a write target that may not exist yet. The nearest
/// existing ancestor is canonicalized and checked against the root, which
/// covers `..` segments threaded through not-yet-created directories.
pub fn validate_write_target(workspace: &Path, raw: &str) -> Result<PathBuf> {
    let candidate = absolute_candidate(workspace, raw)?;
    if candidate.exists() {
        let canonical = candidate
            .canonicalize()
            .map_err(|err| anyhow!("failed to resolve path {}: {err}", candidate.display()))?;
        ensure_inside(workspace, &canonical)?;
        return Ok(canonical);
    }

    let parent = candidate
        .parent()
        .ok_or_else(|| anyhow!("path {} has no parent directory", candidate.display()))?;
    let anchor = canonicalize_existing_ancestor(parent)?;
    ensure_inside(workspace, &anchor)?;
    Ok(candidate)
}

/// Repository-relative display form with forward slashes, regardless of the
/// host path convention. Falls back to the absolute path for paths that do
/// not sit under the workspace (callers validate first, so that is rare).
pub fn workspace_relative(workspace: &Path, path: &Path) -> String {
    path.strip_prefix(workspace)
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|_| path.to_string_lossy().replace('\\', "/"))
}

fn absolute_candidate(workspace: &Path, raw: &str) -> Result<PathBuf> {
    if raw.trim().is_empty() {
        return Err(anyhow!("path must not be empty"));
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(workspace.join(path))
    }
}

fn ensure_inside(workspace: &Path, canonical: &Path) -> Result<()> {
    if canonical.starts_with(workspace) {
        Ok(())
    } else {
        Err(anyhow!(
            "path escapes repository root: {}",
            canonical.display()
        ))
    }
}

fn canonicalize_existing_ancestor(path: &Path) -> Result<PathBuf> {
    for ancestor in path.ancestors() {
        if ancestor.exists() {
            return ancestor.canonicalize().map_err(|err| {
                anyhow!("failed to resolve path {}: {err}", ancestor.display())
            });
        }
    }
    Err(anyhow!(
        "no existing ancestor found for path {}",
        path.display()
    ))
}
