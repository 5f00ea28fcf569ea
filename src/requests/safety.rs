use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

use thiserror::Error;

use unicode_normalization::UnicodeNormalization;

pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "png", "jpg", "jpeg", "webp", "doc", "docx", "xls", "xlsx", "txt", "csv",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("path escapes {base}")]
pub struct PathTraversal {
    pub base: PathBuf,
}

/// Rejects names that could address anything other than a single entry of one directory.
/// Unsafe input is refused, never rewritten.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().all(|ch| ch == '.')
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
}

fn extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_lowercase())
}

pub fn is_allowed_document(name: &str) -> bool {
    extension(name).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_pdf(name: &str) -> bool {
    extension(name).as_deref() == Some("pdf")
}

/// Safe single-entry name with an allowlisted extension.
pub fn is_listable_document(name: &str) -> bool {
    is_safe_name(name) && is_allowed_document(name)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize(&cwd.join(path)),
        Err(_) => normalize(path),
    }
}

/// Joins `segments` under `base` and checks, lexically, that the result stays inside `base`.
///
/// Containment is a string-prefix test that includes the trailing separator, so a sibling
/// such as `base-evil` is not mistaken for a child of `base`.
pub fn join_within(base: &Path, segments: &[&str]) -> Result<PathBuf, PathTraversal> {
    let base_abs = absolute(base);
    let mut joined = base_abs.clone();
    for segment in segments {
        joined.push(segment);
    }
    let resolved = normalize(&joined);

    let base_text = base_abs.to_string_lossy();
    let resolved_text = resolved.to_string_lossy();
    let prefix = if base_text.ends_with(MAIN_SEPARATOR) {
        base_text.to_string()
    } else {
        format!("{base_text}{MAIN_SEPARATOR}")
    };

    if resolved_text == base_text || resolved_text.starts_with(&prefix) {
        Ok(resolved)
    } else {
        Err(PathTraversal { base: base_abs })
    }
}

/// ASCII-only file name: NFKD-decomposed with non-ASCII code points dropped, whitespace and
/// separators collapsed to `_`, anything outside `[A-Za-z0-9_.-]` dropped, leading and trailing
/// dots or underscores stripped.
pub fn sanitize_filename(name: &str) -> String {
    let spaced: String = name
        .nfkd()
        .filter(char::is_ascii)
        .map(|ch| if ch == '/' || ch == '\\' { ' ' } else { ch })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'))
        .collect();

    kept.trim_matches(|ch| ch == '.' || ch == '_').to_string()
}
