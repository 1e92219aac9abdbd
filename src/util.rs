//! File system helpers shared by the generators.

use log::debug;
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::GenResult;

/// Replaces every placeholder of `subs` in the file at `path`, in order.
pub fn file_replace<P: AsRef<Path>>(path: P, subs: &[(&str, &str)]) -> GenResult<()> {
  let path = path.as_ref();
  let mut text = fs::read_to_string(path)?;
  for (from, to) in subs {
    text = text.replace(from, to);
  }
  fs::write(path, text)?;
  debug!("Updated {}", path.display());
  Ok(())
}

/// Applies `file_replace` to every file under `dir` accepted by `filter`.
pub fn directory_replace<P, F>(dir: P, filter: &F, subs: &[(&str, &str)]) -> GenResult<()> where
  P: AsRef<Path>,
  F: Fn(&Path) -> bool
{
  for entry in fs::read_dir(dir)? {
    let path = entry?.path();
    match path.is_dir() {
      true  => directory_replace(&path, filter, subs)?,
      false => if filter(&path) {
        file_replace(&path, subs)?;
      }
    }
  }
  Ok(())
}

/// Recursively copies the directory `from` into `to`, creating it as needed.
pub fn copy_dir<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> GenResult<()> {
  let to = to.as_ref();
  fs::create_dir_all(to)?;
  for entry in fs::read_dir(from)? {
    let entry = entry?;
    let dest  = to.join(entry.file_name());
    match entry.file_type()?.is_dir() {
      true  => copy_dir(entry.path(), &dest)?,
      false => { fs::copy(entry.path(), &dest)?; }
    }
  }
  Ok(())
}

/// Deletes `dir` if it exists and creates it again, empty.
pub fn remake_dir<P: AsRef<Path>>(dir: P) -> GenResult<()> {
  let dir = dir.as_ref();
  if dir.exists() {
    fs::remove_dir_all(dir)?;
  }
  fs::create_dir_all(dir)?;
  Ok(())
}

/// Renames a file or directory, replacing any existing destination file.
pub fn move_path<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> GenResult<()> {
  let to = to.as_ref();
  if to.is_dir() {
    fs::remove_dir_all(to)?;
  }
  fs::rename(from, to)?;
  Ok(())
}

/// Joins the components of `path` with forward slashes.
pub fn path_to_posix<P: AsRef<Path>>(path: P) -> String {
  join_components(path.as_ref(), "/")
}

/// Joins the components of `path` with backslashes.
pub fn path_to_windows<P: AsRef<Path>>(path: P) -> String {
  join_components(path.as_ref(), "\\")
}

fn join_components(path: &Path, sep: &str) -> String {
  let text   = path.to_string_lossy();
  let joined = text.split(|c| c == '/' || c == '\\')
    .filter(|s| !s.is_empty() && *s != ".")
    .collect::<Vec<&str>>()
    .join(sep);
  match text.starts_with('/') || text.starts_with('\\') {
    true  => [sep, joined.as_str()].concat(),
    false => joined
  }
}

/// Lexically resolves `.` and `..` components without touching the disk.
pub fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for c in path.components() {
    match c {
      Component::CurDir    => {},
      Component::ParentDir => {
        let popped = match out.components().next_back() {
          Some(Component::Normal(_)) => out.pop(),
          _                          => false
        };
        if !popped {
          out.push("..");
        }
      },
      c => out.push(c.as_os_str())
    }
  }
  out
}

/// Path of `path` relative to the directory `base`. Falls back to `path`
/// itself when no relative path exists (different drives).
pub fn relative<P: AsRef<Path>, B: AsRef<Path>>(path: P, base: B) -> PathBuf {
  let path = normalize(path.as_ref());
  let base = normalize(base.as_ref());
  match pathdiff::diff_paths(&path, &base) {
    Some(p) if p.as_os_str().is_empty() => PathBuf::from("."),
    Some(p)                             => p,
    None                                => path
  }
}

/// Operating system running the generator.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum DevPlatform {
  Macos,
  Windows,
  Linux
}

impl DevPlatform {
  pub fn current() -> Self {
    match std::env::consts::OS {
      "macos"   => DevPlatform::Macos,
      "windows" => DevPlatform::Windows,
      _         => DevPlatform::Linux
    }
  }

  /// The detected platform, unless overridden.
  pub fn detect(over: Option<DevPlatform>) -> Self {
    over.unwrap_or_else(Self::current)
  }
}
