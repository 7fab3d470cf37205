//! Environment variable expansion for local destination paths.
//!
//! Destinations handed over by the recorder may carry `%USERPROFILE%` style
//! or `$HOME` / `${HOME}` style references. Unknown variables are left as
//! written, except an unknown `${VAR}` which expands to nothing.

use std::path::PathBuf;

use crate::constants::FILE_URL_PREFIX;

/// Expand `%VAR%`, `${VAR}` and `$VAR` references in `path`.
pub fn expand_env_vars(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(pos) = rest.find(|c| c == '%' || c == '$') {
        result.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        let consumed = if tail.starts_with('%') {
            expand_percent(tail, &mut result)
        } else if tail.starts_with("${") {
            expand_braced(tail, &mut result)
        } else {
            expand_dollar(tail, &mut result)
        };

        rest = &tail[consumed..];
    }

    result.push_str(rest);
    result
}

/// `%VAR%`. Returns the number of bytes consumed from `tail`.
fn expand_percent(tail: &str, out: &mut String) -> usize {
    match tail[1..].find('%') {
        Some(end) if end > 0 => {
            let name = &tail[1..1 + end];
            match std::env::var(name) {
                Ok(value) => {
                    out.push_str(&value);
                    end + 2
                }
                Err(_) => {
                    // Leave the opening `%` so the closing one can start a new reference
                    out.push('%');
                    1
                }
            }
        }
        _ => {
            out.push('%');
            1
        }
    }
}

/// `${VAR}`. Missing variables expand to nothing.
fn expand_braced(tail: &str, out: &mut String) -> usize {
    match tail[2..].find('}') {
        Some(end) => {
            let name = &tail[2..2 + end];
            if let Ok(value) = std::env::var(name) {
                out.push_str(&value);
            }
            end + 3
        }
        None => {
            out.push_str("${");
            2
        }
    }
}

/// `$VAR`, where the name runs over ASCII alphanumerics and underscores.
fn expand_dollar(tail: &str, out: &mut String) -> usize {
    let name_len = tail[1..]
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();

    if name_len == 0 {
        out.push('$');
        return 1;
    }

    let name = &tail[1..1 + name_len];
    match std::env::var(name) {
        Ok(value) => out.push_str(&value),
        Err(_) => out.push_str(&tail[..1 + name_len]),
    }
    1 + name_len
}

/// Normalize path separators for the current OS
pub fn normalize_path_for_os(path: &str) -> String {
    if cfg!(windows) {
        path.replace('/', "\\")
    } else {
        path.replace('\\', "/")
    }
}

/// Turn a local destination URL (`file:///C:/...`, `file:///tmp/...` or a
/// plain path) into a host path.
pub fn resolve_local_path(url: &str) -> PathBuf {
    let path = match url.strip_prefix(FILE_URL_PREFIX) {
        Some(rest) if cfg!(windows) => rest.trim_start_matches('/'),
        Some(rest) => rest,
        None => url,
    };
    PathBuf::from(normalize_path_for_os(&expand_env_vars(path)))
}
