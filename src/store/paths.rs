//! Path sandboxing for skill directories
//!
//! Every node operation resolves its target through [`resolve_path`], which
//! guarantees the result stays inside the skill's own directory — including
//! against symlink and absolute-path escapes. A fixed text-extension
//! allowlist gates which files may be read or written as text.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SkillError};
use crate::manifest::MANIFEST_FILENAME;

/// Extensions that may be read/written as UTF-8 text
pub const TEXT_FILE_EXTENSIONS: &[&str] = &[
    "md", "txt", "py", "js", "ts", "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "xml",
    "html", "css", "sql", "sh", "bat", "ps1", "env", "csv", "tsv", "rst", "ipynb", "vue", "jsx",
    "tsx",
];

/// Whether a path is eligible for text read/write. The manifest filename is
/// always allowed regardless of extension rules.
pub fn is_text_path(path: &Path) -> bool {
    if path.file_name().map(|n| n == MANIFEST_FILENAME).unwrap_or(false) {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_FILE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Resolve `relative` against `skill_dir`, refusing anything that would
/// land outside the skill directory.
///
/// Returns the resolved absolute path plus the normalized POSIX-style
/// relative path. Fails with `Validation` for empty input (unless
/// `allow_root`) and `PathViolation` for `..` segments or escapes through
/// symlinks/absolute components.
pub fn resolve_path(skill_dir: &Path, relative: &str, allow_root: bool) -> Result<(PathBuf, String)> {
    let rel = relative.trim().replace('\\', "/");
    let rel = rel.trim_start_matches('/');

    if rel.is_empty() && !allow_root {
        return Err(SkillError::validation("path must not be empty"));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in rel.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." {
            return Err(SkillError::PathViolation(format!(
                "parent-directory segment in '{}'",
                relative
            )));
        }
        segments.push(segment);
    }

    let root = skill_dir
        .canonicalize()
        .map_err(|_| SkillError::not_found(format!("skill directory {}", skill_dir.display())))?;

    let normalized = segments.join("/");
    let mut target = root.clone();
    for segment in &segments {
        target.push(segment);
    }

    // Follow whatever part of the target already exists so a symlink cannot
    // smuggle the path out of the skill root.
    let resolved = canonicalize_partial(&target);
    if resolved != root && !resolved.starts_with(&root) {
        return Err(SkillError::PathViolation(format!(
            "'{}' resolves outside the skill directory",
            relative
        )));
    }

    Ok((target, normalized))
}

/// Canonicalize the longest existing prefix of `path`, then re-append the
/// remaining (not yet existing) components.
fn canonicalize_partial(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(resolved) => {
                let mut out = resolved;
                for component in remainder.iter().rev() {
                    out.push(component);
                }
                return out;
            }
            Err(_) => match existing.components().next_back() {
                Some(Component::Normal(name)) => {
                    remainder.push(name.to_os_string());
                    existing.pop();
                }
                _ => {
                    // Nothing on the path exists; return it as-is
                    let mut out = existing;
                    for component in remainder.iter().rev() {
                        out.push(component);
                    }
                    return out;
                }
            },
        }
    }
}
