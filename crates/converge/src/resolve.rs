//! Mount source resolution.
//!
//! Desired mounts may use `~` or paths relative to the config file, while
//! the VM manager reports absolute paths. Both sides are resolved through a
//! [`PathResolver`] before they are compared, so identity never depends on
//! how a path happened to be spelled.

use crate::types::Mount;
use std::path::{Component, Path, PathBuf};

/// Resolves host paths against an explicit home and base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    home: PathBuf,
    base_dir: PathBuf,
}

impl PathResolver {
    /// `home` expands `~`; `base_dir` anchors relative paths (normally the
    /// directory holding the config file).
    pub fn new(home: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            base_dir: base_dir.into(),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Absolute, lexically normalized host path.
    pub fn resolve(&self, source: &str) -> PathBuf {
        let home = self.home.to_string_lossy();
        let expanded = shellexpand::tilde_with_context(source, || Some(&*home));
        let path = Path::new(&*expanded);
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.base_dir.join(path))
        }
    }

    /// The mount with its source resolved and its destination normalized.
    pub fn resolve_mount(&self, mount: &Mount) -> Mount {
        Mount {
            source: self.resolve(&mount.source).to_string_lossy().into_owned(),
            dest: normalize_machine_path(&mount.dest),
        }
    }
}

/// Where `source` appears inside the machine when it lives under an already
/// attached mount. The mount must be resolved.
///
/// `~/dev/blog` under the mount `~/dev => /devbox/sites` maps to
/// `/devbox/sites/blog`.
pub fn webroot_for_mount(mount: &Mount, source: &Path) -> Option<String> {
    let rest = source.strip_prefix(&mount.source).ok()?;
    let mut webroot = mount.dest.trim_end_matches('/').to_string();
    for part in rest.components() {
        webroot.push('/');
        webroot.push_str(&part.as_os_str().to_string_lossy());
    }
    if webroot.is_empty() {
        webroot.push('/');
    }
    Some(webroot)
}

/// Collapse `.`/`..` and duplicate separators without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Normalize a path inside the machine; always `/`-separated.
pub fn normalize_machine_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if path.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    }
}
