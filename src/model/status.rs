//! Simulated per-stage state.

use std::collections::BTreeMap;

/// Execution state of one build stage, maintained by the stage simulator.
///
/// Created fresh for every stage and discarded at stage end; stages never
/// share state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalStatus {
    /// Current working directory, always trailing-slash terminated.
    pub work_dir: String,
    /// Current user name.
    pub user: String,
    /// Known home directories, trailing-slash terminated.
    pub user_dirs: BTreeMap<String, String>,
}

impl Default for GlobalStatus {
    fn default() -> Self {
        let mut user_dirs = BTreeMap::new();
        user_dirs.insert("root".to_string(), "/root/".to_string());
        Self {
            work_dir: "/".to_string(),
            user: "root".to_string(),
            user_dirs,
        }
    }
}

impl GlobalStatus {
    /// Home directory of the current user, trailing-slash terminated.
    pub fn home_dir(&self) -> &str {
        self.user_dirs
            .get(&self.user)
            .map(String::as_str)
            .unwrap_or("/root/")
    }

    /// The conventional home directory for a user that was never declared.
    pub fn default_home_for(user: &str) -> String {
        if user == "root" {
            "/root/".to_string()
        } else {
            format!("/home/{}/", user)
        }
    }

    /// Replaces `~` with the current user's home directory.
    pub fn expand_home(&self, path: &str) -> String {
        let home = self.home_dir();
        path.replace('~', home.trim_end_matches('/'))
    }

    /// Resolves a path against the working directory. Absolute paths are
    /// returned unchanged; no `..` resolution is attempted.
    pub fn absolute(&self, path: &str) -> String {
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}{}", self.work_dir, path)
        }
    }
}

/// Per-stage, per-package-manager cache state.
///
/// `cache_dirs` stays empty until a cache-dir override command is seen; the
/// rule's default directories are resolved on demand against the current
/// [`GlobalStatus`] so that later `USER` switches are honored.
#[derive(Debug, Clone, Default)]
pub struct PmStatus {
    pub cache_dirs: Vec<String>,
    pub pre_commands_emitted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let status = GlobalStatus::default();
        assert_eq!(status.work_dir, "/");
        assert_eq!(status.user, "root");
        assert_eq!(status.home_dir(), "/root/");
    }

    #[test]
    fn test_expand_home_for_current_user() {
        let mut status = GlobalStatus::default();
        status.user_dirs.insert("panda".into(), "/home/panda/".into());
        status.user = "panda".into();
        assert_eq!(status.expand_home("~/.cache/pip"), "/home/panda/.cache/pip");
    }

    #[test]
    fn test_absolute_resolution() {
        let mut status = GlobalStatus::default();
        status.work_dir = "/app/".into();
        assert_eq!(status.absolute("node_modules"), "/app/node_modules");
        assert_eq!(status.absolute("/opt/cache"), "/opt/cache");
    }

    #[test]
    fn test_default_home_for() {
        assert_eq!(GlobalStatus::default_home_for("root"), "/root/");
        assert_eq!(GlobalStatus::default_home_for("panda"), "/home/panda/");
    }
}
