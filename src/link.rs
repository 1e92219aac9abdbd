//! Integration of external modules into generated IDE projects.
//!
//! An external module is a library with its own CMake build description. The
//! module is generated into a native project of the host's dialect, its
//! library targets are discovered from the configured roots, renamed so the
//! macOS and iOS variants can live side by side, and spliced into the host
//! project. The include paths, defines and dependencies the libraries need
//! are accumulated in a `LinkData` so the host build configurations can pick
//! them up afterwards.

pub mod apple;
pub mod windows;

use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::ctx::External;
use crate::error::{GenError, GenResult};

/// Include, define and dependency sets collected while linking modules,
/// keyed by platform tag and, for defines and dependencies, by build type.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LinkData {
  pub includes: BTreeMap<String, Vec<String>>,
  pub defines:  BTreeMap<String, BTreeMap<String, Vec<String>>>,
  pub depends:  BTreeMap<String, BTreeMap<String, Vec<String>>>
}

impl LinkData {
  pub fn add_includes<I: IntoIterator<Item = String>>(&mut self, platform: &str, items: I) {
    union(self.includes.entry(platform.to_string()).or_default(), items);
  }

  pub fn add_defines<I: IntoIterator<Item = String>>(&mut self, platform: &str, build: &str, items: I) {
    let list = self.defines
      .entry(platform.to_string()).or_default()
      .entry(build.to_lowercase()).or_default();
    for item in items {
      merge_define(list, item);
    }
  }

  pub fn add_depends<I: IntoIterator<Item = String>>(&mut self, platform: &str, build: &str, items: I) {
    union(self.depends
            .entry(platform.to_string()).or_default()
            .entry(build.to_lowercase()).or_default(),
          items);
  }

  /// Folds `other` into this set. Lists are unioned, and a define given a
  /// value again takes the later value.
  pub fn merge(&mut self, other: LinkData) {
    for (platform, items) in other.includes {
      self.add_includes(&platform, items);
    }
    for (platform, builds) in other.defines {
      for (build, items) in builds {
        self.add_defines(&platform, &build, items);
      }
    }
    for (platform, builds) in other.depends {
      for (build, items) in builds {
        self.add_depends(&platform, &build, items);
      }
    }
  }

  pub fn includes(&self, platform: &str) -> &[String] {
    self.includes.get(platform).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn defines(&self, platform: &str, build: &str) -> &[String] {
    lookup(&self.defines, platform, build)
  }

  pub fn depends(&self, platform: &str, build: &str) -> &[String] {
    lookup(&self.depends, platform, build)
  }

  pub fn is_empty(&self) -> bool {
    self.includes.values().all(Vec::is_empty) &&
      self.defines.values().all(|b| b.values().all(Vec::is_empty)) &&
      self.depends.values().all(|b| b.values().all(Vec::is_empty))
  }
}

fn lookup<'a>(map: &'a BTreeMap<String, BTreeMap<String, Vec<String>>>, platform: &str, build: &str) -> &'a [String] {
  map.get(platform)
    .and_then(|b| b.get(&build.to_lowercase()))
    .map(Vec::as_slice)
    .unwrap_or(&[])
}

fn union<I: IntoIterator<Item = String>>(list: &mut Vec<String>, items: I) {
  for item in items {
    if !list.contains(&item) {
      list.push(item);
    }
  }
}

fn merge_define(list: &mut Vec<String>, item: String) {
  let key = define_name(&item).to_string();
  match list.iter().position(|d| define_name(d) == key) {
    Some(i) => list[i] = item,
    None    => list.push(item)
  }
}

fn define_name(define: &str) -> &str {
  define.split('=').next().unwrap_or(define)
}

/// Where external modules come from and where their projects go.
pub struct LinkEnv<'a> {
  pub builder:    &'a dyn ModuleBuilder,
  /// Module paths are relative to this folder.
  pub input_dir:  &'a Path,
  /// Directory holding the host project.
  pub host_dir:   &'a Path,
  pub engine_dir: &'a Path
}

impl<'a> LinkEnv<'a> {
  pub fn module_source(&self, module: &External) -> PathBuf {
    crate::util::normalize(&self.input_dir.join(&module.path))
  }
}

/// Runs the secondary build description generator of external modules.
pub trait ModuleBuilder {
  /// Generates the project of `module` into `dir` with the given generator
  /// arguments, and returns the project files matching `pattern` found there.
  fn generate(&self, module: &External, source: &Path, dir: &Path, args: &[String],
              pattern: &str) -> GenResult<Vec<PathBuf>>;
}

/// Generates module projects by running CMake.
pub struct CMakeBuilder {
  pub program: String
}

impl CMakeBuilder {
  pub fn new(program: &str) -> Self {
    CMakeBuilder { program: program.to_string() }
  }
}

impl ModuleBuilder for CMakeBuilder {
  fn generate(&self, module: &External, source: &Path, dir: &Path, args: &[String],
              pattern: &str) -> GenResult<Vec<PathBuf>>
  {
    std::fs::create_dir_all(dir)?;

    let mut cmd = Command::new(&self.program);
    cmd.args(module.cmake_options())
      .args(args)
      .arg(source)
      .current_dir(dir);
    debug!("Running {:?}", cmd);

    let status = cmd.status()
      .map_err(|e| GenError::generation(&module.name, format!("failed to run {}: {}", self.program, e)))?;
    if !status.success() {
      return Err(GenError::generation(&module.name, format!("{} exited with {}", self.program, status)));
    }

    find_projects(&module.name, dir, pattern)
  }
}

/// Project files of `module` matching `pattern` directly inside `dir`. A
/// failed search only skips the module.
pub fn find_projects(module: &str, dir: &Path, pattern: &str) -> GenResult<Vec<PathBuf>> {
  let full = dir.join(pattern);
  let full = full.to_str()
    .ok_or_else(|| GenError::generation(module, format!("path is not valid UTF-8: {}", dir.display())))?;

  let paths = glob::glob(full)
    .map_err(|e| GenError::generation(module, format!("invalid pattern {}: {}", full, e)))?;

  let mut found = Vec::new();
  for p in paths {
    found.push(p.map_err(|e| GenError::generation(module, format!("cannot read {}: {}",
                                                                   e.path().display(), e.error())))?);
  }
  found.sort();
  Ok(found)
}

/// The one project generated for a module. None or several are both
/// generation errors.
pub fn single_project(module: &str, found: Vec<PathBuf>) -> GenResult<PathBuf> {
  let mut found = found;
  match found.len() {
    0 => Err(GenError::generation(module, "no project file was generated")),
    1 => {
      let path = found.remove(0);
      info!("Linking module '{}' from {}", module, path.display());
      Ok(path)
    },
    n => Err(GenError::generation(module, format!("found {} project files, expected one", n)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn lists_are_unioned() {
    let mut data = LinkData::default();
    data.add_includes("macos", strings(&["a", "b"]));
    data.add_includes("macos", strings(&["b", "c"]));
    assert_eq!(data.includes("macos"), &strings(&["a", "b", "c"])[..]);
    assert!(data.includes("ios").is_empty());
  }

  #[test]
  fn later_define_values_win() {
    let mut data = LinkData::default();
    data.add_defines("windows", "Debug", strings(&["LEVEL=1", "STATIC"]));
    data.add_defines("windows", "debug", strings(&["LEVEL=2", "STATIC"]));
    assert_eq!(data.defines("windows", "DEBUG"), &strings(&["LEVEL=2", "STATIC"])[..]);
  }

  #[test]
  fn merges_accumulated_data() {
    let mut a = LinkData::default();
    a.add_depends("windows", "release", strings(&["box2d.lib"]));
    let mut b = LinkData::default();
    b.add_depends("windows", "release", strings(&["box2d.lib", "poly.lib"]));
    b.add_includes("windows", strings(&["include"]));

    a.merge(b);
    assert_eq!(a.depends("windows", "release"), &strings(&["box2d.lib", "poly.lib"])[..]);
    assert_eq!(a.includes("windows"), &strings(&["include"])[..]);
    assert!(!a.is_empty());
    assert!(LinkData::default().is_empty());
  }

  #[test]
  fn project_count_must_be_one() {
    assert!(single_project("m", Vec::new()).unwrap_err().is_recoverable());
    assert!(single_project("m", vec![PathBuf::from("a"), PathBuf::from("b")]).is_err());
    assert_eq!(single_project("m", vec![PathBuf::from("a")]).unwrap(), PathBuf::from("a"));
  }

  #[test]
  fn finds_generated_projects() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("box2d.xcodeproj")).unwrap();
    std::fs::write(dir.path().join("CMakeCache.txt"), "").unwrap();

    let found = find_projects("box2d", dir.path(), "*.xcodeproj").unwrap();
    assert_eq!(found, vec![dir.path().join("box2d.xcodeproj")]);
    assert!(find_projects("box2d", dir.path(), "*.sln").unwrap().is_empty());
  }

  #[test]
  fn bad_project_pattern_only_skips_the_module() {
    let dir = tempfile::tempdir().unwrap();
    let err = find_projects("box2d", dir.path(), "[*.sln").unwrap_err();
    assert!(err.is_recoverable());
    assert!(err.to_string().contains("box2d"));
  }
}
