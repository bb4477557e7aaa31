use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Internal separator. Every path is converted to this form at the gateway
/// boundary so prefix comparisons never mix `/` and `\`.
pub const SEPARATOR: char = '/';

/// An absolute entry path in canonical `/`-separated form.
///
/// Trailing separators are trimmed (except for the root itself) and runs of
/// separators are collapsed, so two spellings of the same folder compare
/// equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct CanonicalPath(String);

impl CanonicalPath {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let unified = raw.as_ref().replace('\\', "/");
        let mut out = String::with_capacity(unified.len());
        let mut last_was_sep = false;
        for ch in unified.chars() {
            if ch == SEPARATOR {
                if !last_was_sep {
                    out.push(ch);
                }
                last_was_sep = true;
            } else {
                out.push(ch);
                last_was_sep = false;
            }
        }
        while out.len() > 1 && out.ends_with(SEPARATOR) && !is_drive_root(&out) {
            out.pop();
        }
        Self(out)
    }

    pub fn from_native(path: &Path) -> Self {
        Self::new(path.to_string_lossy())
    }

    pub fn to_native(&self) -> PathBuf {
        if cfg!(windows) {
            PathBuf::from(self.0.replace(SEPARATOR, "\\"))
        } else {
            PathBuf::from(&self.0)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path component; the whole path for a root.
    pub fn basename(&self) -> &str {
        match self.0.rfind(SEPARATOR) {
            Some(idx) if idx + 1 < self.0.len() => &self.0[idx + 1..],
            _ => &self.0,
        }
    }

    /// Parent folder, or `None` for a root.
    pub fn parent(&self) -> Option<CanonicalPath> {
        let idx = self.0.rfind(SEPARATOR)?;
        if idx + 1 == self.0.len() {
            return None;
        }
        if idx == 0 {
            return Some(Self(String::from("/")));
        }
        let head = &self.0[..idx];
        if head.ends_with(':') {
            // "C:/dir" -> "C:/"
            return Some(Self(format!("{head}/")));
        }
        Some(Self(head.to_string()))
    }

    pub fn join(&self, name: &str) -> CanonicalPath {
        if self.0.ends_with(SEPARATOR) {
            Self::new(format!("{}{}", self.0, name))
        } else {
            Self::new(format!("{}{}{}", self.0, SEPARATOR, name))
        }
    }

    /// True if `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &CanonicalPath) -> bool {
        if self.0.len() <= ancestor.0.len() {
            return false;
        }
        if ancestor.0.ends_with(SEPARATOR) {
            return self.0.starts_with(&ancestor.0);
        }
        self.0.starts_with(&ancestor.0) && self.0[ancestor.0.len()..].starts_with(SEPARATOR)
    }

    pub fn is_same_or_descendant_of(&self, ancestor: &CanonicalPath) -> bool {
        self == ancestor || self.is_descendant_of(ancestor)
    }

    /// Ancestors from the nearest parent outward, stopping at (and including) `stop`.
    pub fn ancestors_up_to(&self, stop: &CanonicalPath) -> Vec<CanonicalPath> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(p) = current {
            if !p.is_same_or_descendant_of(stop) {
                break;
            }
            let done = &p == stop;
            current = p.parent();
            out.push(p);
            if done {
                break;
            }
        }
        out
    }
}

fn is_drive_root(s: &str) -> bool {
    s.len() == 3 && s.ends_with(":/")
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CanonicalPath {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for CanonicalPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<CanonicalPath> for String {
    fn from(value: CanonicalPath) -> Self {
        value.0
    }
}

impl AsRef<str> for CanonicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
