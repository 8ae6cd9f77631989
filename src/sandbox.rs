//! Path containment for every filesystem access the tools make.
//!
//! A requested path is accepted only when its canonical form lies under one of
//! the configured roots. Existing targets are checked again after symlink
//! resolution; targets that do not exist yet are accepted when their parent
//! directory resolves inside a root. Case folding only applies to the
//! requested path: resolved paths must match a root exactly.

use crate::errors::{AppError, AppResult};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
struct Root {
    path: PathBuf,
    key: String,
}

/// The directories every path must resolve into. Built once at startup.
#[derive(Debug, Clone)]
pub struct AllowedRoots {
    roots: Vec<Root>,
}

impl AllowedRoots {
    /// Canonicalizes each directory. Fails if any entry is missing or not a directory.
    pub fn new<P: AsRef<Path>>(dirs: &[P]) -> io::Result<Self> {
        let mut roots: Vec<Root> = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let expanded = expand_home(&dir.as_ref().to_string_lossy());
            let canonical = dunce::canonicalize(absolutize(&expanded)?)?;
            if !canonical.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("not a directory: {}", canonical.display()),
                ));
            }
            let key = comparison_key(&canonical);
            if !roots.iter().any(|r| r.key == key) {
                roots.push(Root { path: canonical, key });
            }
        }
        Ok(Self { roots })
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(|r| r.path.as_path())
    }

    /// True if `path` (already absolute) falls under a root after separator and case folding.
    ///
    /// Only a pre-filter for requested paths. Resolved paths go through [`Self::contains_real`].
    pub fn contains(&self, path: &Path) -> bool {
        let candidate = comparison_key(path);
        self.roots.iter().any(|r| key_within(&candidate, &r.key))
    }

    /// Exact, component-wise containment for a path the filesystem has resolved.
    pub fn contains_real(&self, real: &Path) -> bool {
        self.roots.iter().any(|r| real.starts_with(&r.path))
    }

    pub async fn validate(&self, requested: &str) -> AppResult<PathBuf> {
        validate_path(requested, self).await
    }

    /// Like [`Self::validate`], but any number of trailing components may be
    /// missing. Used for recursive directory creation.
    pub async fn validate_tree(&self, requested: &str) -> AppResult<PathBuf> {
        let absolute = requested_absolute(requested, self)?;
        let mut missing = Vec::new();
        let mut existing = absolute.as_path();
        loop {
            match tokio::fs::symlink_metadata(existing).await {
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    let (Some(name), Some(parent)) = (existing.file_name(), existing.parent()) else {
                        return Err(AppError::AccessDenied(absolute.display().to_string()));
                    };
                    missing.push(name.to_os_string());
                    existing = parent;
                }
                Err(e) => return Err(AppError::Io(e)),
            }
        }
        // a dangling link as the nearest ancestor is refused outright
        let real = match tokio::fs::canonicalize(existing).await {
            Ok(real) => dunce::simplified(&real).to_path_buf(),
            Err(_) => return Err(deny(&absolute, existing, "unresolvable ancestor")),
        };
        if !self.contains_real(&real) {
            return Err(deny(&absolute, &real, "ancestor outside allowed directories"));
        }
        Ok(missing.into_iter().rev().fold(real, |acc, name| acc.join(name)))
    }
}

/// Resolves `requested` and proves it lives inside `roots`.
///
/// Returns the real (symlink-free) path for existing targets, the normalized
/// absolute path for targets that are about to be created, and the resolved
/// target for a dangling symlink.
pub async fn validate_path(requested: &str, roots: &AllowedRoots) -> AppResult<PathBuf> {
    let absolute = requested_absolute(requested, roots)?;

    match tokio::fs::canonicalize(&absolute).await {
        Ok(real) => {
            let real = dunce::simplified(&real).to_path_buf();
            if !roots.contains_real(&real) {
                return Err(deny(&absolute, &real, "symlink target outside allowed directories"));
            }
            Ok(real)
        }
        Err(e) => match tokio::fs::symlink_metadata(&absolute).await {
            Ok(meta) if meta.file_type().is_symlink() => dangling_link_target(&absolute, roots).await,
            Ok(_) => Err(AppError::Io(e)),
            Err(_) => new_entry(&absolute, roots).await,
        },
    }
}

fn requested_absolute(requested: &str, roots: &AllowedRoots) -> AppResult<PathBuf> {
    let absolute = absolutize(&expand_home(requested))?;
    if !roots.contains(&absolute) {
        warn!(path = %absolute.display(), "path outside allowed directories");
        return Err(AppError::AccessDenied(absolute.display().to_string()));
    }
    Ok(absolute)
}

fn deny(requested: &Path, resolved: &Path, why: &str) -> AppError {
    warn!(path = %requested.display(), resolved = %resolved.display(), "{why}");
    AppError::AccessDenied(resolved.display().to_string())
}

/// A path that does not exist yet: its parent must resolve inside a root.
async fn new_entry(absolute: &Path, roots: &AllowedRoots) -> AppResult<PathBuf> {
    let Some(parent) = absolute.parent() else {
        return Err(AppError::AccessDenied(absolute.display().to_string()));
    };
    let real_parent = match tokio::fs::canonicalize(parent).await {
        Ok(p) => dunce::simplified(&p).to_path_buf(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(AppError::ParentNotFound(parent.to_path_buf()))
        }
        Err(e) => return Err(AppError::Io(e)),
    };
    if !roots.contains_real(&real_parent) {
        return Err(deny(absolute, &real_parent, "parent outside allowed directories"));
    }
    Ok(absolute.to_path_buf())
}

/// A symlink whose target does not exist. Writing through it creates the
/// target, so the target is held to the same rule as any new entry.
async fn dangling_link_target(link: &Path, roots: &AllowedRoots) -> AppResult<PathBuf> {
    let link_dir = link
        .parent()
        .ok_or_else(|| AppError::AccessDenied(link.display().to_string()))?;
    let link_dir = dunce::canonicalize(link_dir)?;
    let raw = link_dir.join(tokio::fs::read_link(link).await?);
    let (Some(parent), Some(name)) = (raw.parent(), raw.file_name()) else {
        return Err(deny(link, &raw, "unusable symlink target"));
    };
    let real_parent = match tokio::fs::canonicalize(parent).await {
        Ok(p) => dunce::simplified(&p).to_path_buf(),
        Err(_) => return Err(deny(link, &raw, "symlink target parent unresolvable")),
    };
    if !roots.contains_real(&real_parent) {
        return Err(deny(link, &real_parent, "symlink target outside allowed directories"));
    }
    let target = real_parent.join(name);
    // chains and loops of links are not followed further
    if tokio::fs::symlink_metadata(&target).await.is_ok() {
        return Err(deny(link, &target, "symlink chain"));
    }
    Ok(target)
}

/// Expands a leading `~` or `~/` to the current user's home directory.
pub fn expand_home(requested: &str) -> PathBuf {
    let rest = if requested == "~" {
        Some("")
    } else {
        requested.strip_prefix("~/").or_else(|| requested.strip_prefix("~\\"))
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(requested),
    }
}

fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize_lexically(path))
    } else {
        Ok(normalize_lexically(&std::env::current_dir()?.join(path)))
    }
}

/// Drops `.` and folds `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // popping past the root is a no-op
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// Separator- and case-folded form used only for containment checks.
fn comparison_key(path: &Path) -> String {
    let mut key = path.to_string_lossy().replace('\\', "/").to_lowercase();
    while key.len() > 1 && key.ends_with('/') {
        key.pop();
    }
    key
}

fn key_within(candidate: &str, root: &str) -> bool {
    match candidate.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || root.ends_with('/'),
        None => false,
    }
}
