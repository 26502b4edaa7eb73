//! Mount-point matching.
//!
//! # Design Decisions
//! - Matching is case-sensitive and happens on segment boundaries only:
//!   `/media` matches `/media` and `/media/x`, never `/mediax`
//! - A mount of `/` matches every absolute path
//! - No regex, prefix comparison only

/// Matches request paths below one mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountMatcher {
    mount: String,
}

impl MountMatcher {
    /// Trailing slashes are dropped, so `/media/` and `/media` are the same mount.
    pub fn new(mount: impl Into<String>) -> Self {
        let mount = mount.into();
        let trimmed = mount.trim_end_matches('/');
        Self {
            mount: if trimmed.is_empty() {
                "/".to_string()
            } else {
                trimmed.to_string()
            },
        }
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    pub fn matches(&self, path: &str) -> bool {
        if self.mount == "/" {
            return path.starts_with('/');
        }
        match path.strip_prefix(self.mount.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}
