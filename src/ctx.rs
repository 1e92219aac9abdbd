use clap::{App, ArgMatches};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{GenError, GenResult};
use crate::ids::DEFAULT_SALT;
use crate::orientation::Orientation;
use crate::tree::{Platform, SourceTree};
use crate::util::{self, DevPlatform};

pub trait Command {
  fn init<'a, 'b>(&self, cmd: App<'a, 'b>) -> App<'a, 'b>;

  fn run(&self, ctx: &Context) -> RunResult;
}

pub trait Generator {
  /// Whether a target selection of the project is handled by this generator.
  fn supports_target(&self, t: Platform) -> bool;

  fn run(&self, ctx: &Context) -> RunResult;
}

pub type DynResult<T> = Result<T, Box<dyn std::error::Error>>;
pub type RunResult    = DynResult<()>;

pub type Commands   = BTreeMap<&'static str, Box<dyn Command>>;
pub type Generators = BTreeMap<&'static str, Box<dyn Generator>>;

pub struct Context<'a> {
  pub commands:   Commands,
  pub generators: Generators,

  pub input_dir: PathBuf,
  pub build_dir: PathBuf,

  pub env:     &'a Env,
  pub args:    &'a ArgMatches<'a>,
  pub config:  &'a Config,
  pub sources: &'a SourceTree
}

impl<'a> Context<'a> {
  /// Root of the bundled template projects.
  pub fn templates(&self) -> PathBuf {
    match self.config.templates.is_empty() {
      true  => self.engine_dir().join("templates"),
      false => self.input_dir.join(&self.config.templates)
    }
  }

  pub fn engine_dir(&self) -> PathBuf {
    self.input_dir.join(&self.config.framework)
  }

  /// Path from the build directory to the input folder.
  pub fn build_to_root(&self) -> PathBuf {
    util::relative(&self.input_dir, &self.build_dir)
  }

  /// Path from the build directory to the engine.
  pub fn build_to_engine(&self) -> PathBuf {
    util::relative(self.engine_dir(), &self.build_dir)
  }

  pub fn dev_platform(&self) -> DevPlatform {
    DevPlatform::detect(self.env.dev_platform)
  }

  /// Whether `t` was selected, both in the configuration and, when given,
  /// on the command line. Selecting `apple` selects macOS and iOS.
  pub fn is_selected(&self, t: Platform) -> bool {
    if !self.config.targets.iter().any(|&s| covers(s, t)) {
      return false;
    }
    match self.args.subcommand_matches("gen").and_then(|m| m.values_of("platform")) {
      None         => true,
      Some(values) => values.into_iter()
        .filter_map(Platform::parse)
        .any(|s| covers(s, t))
    }
  }
}

fn covers(selection: Platform, t: Platform) -> bool {
  match selection {
    Platform::Apple => t == Platform::Apple || t == Platform::Macos || t == Platform::Ios,
    s               => s == t
  }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Env {
  /// Executable generating external module projects.
  pub cmake: String,

  /// Overrides the detected operating system.
  pub dev_platform: Option<DevPlatform>
}

impl Default for Env {
  fn default() -> Self {
    Env {
      cmake:        "cmake".into(),
      dev_platform: None
    }
  }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
  #[serde(rename = "project")]
  pub info: ProjectInfo,

  #[serde(default)]
  pub sources: BTreeMap<Platform, Vec<String>>,

  #[serde(default)]
  pub includes: BTreeMap<Platform, Vec<String>>,

  #[serde(default)]
  pub defines: BTreeMap<Platform, Defines>,

  #[serde(default)]
  pub modules: BTreeMap<String, bool>,

  #[serde(default)]
  #[serde(rename = "external")]
  pub externals: Vec<External>
}

impl std::ops::Deref for Config {
  type Target = ProjectInfo;

  fn deref(&self) -> &ProjectInfo {
    &self.info
  }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectInfo {
  pub name: String,

  #[serde(default)]
  pub short: String,

  #[serde(default)]
  pub camel: String,

  #[serde(default)]
  pub appid: String,

  #[serde(default = "default_version")]
  pub version: String,

  #[serde(default)]
  pub min_version: String,

  #[serde(default)]
  pub orientation: Orientation,

  #[serde(default)]
  pub targets: Vec<Platform>,

  #[serde(default = "default_assets")]
  pub assets: String,

  #[serde(default)]
  pub templates: String,

  #[serde(default = "default_framework")]
  pub framework: String,

  #[serde(default = "default_engine")]
  pub engine: String,

  #[serde(default)]
  pub headless: bool,

  #[serde(default)]
  pub salt: String
}

fn default_version()   -> String { "1.0".into() }
fn default_assets()    -> String { "assets".into() }
fn default_framework() -> String { ".".into() }
fn default_engine()    -> String { "cugl".into() }

impl ProjectInfo {
  /// Short name, falling back on the display name.
  pub fn short(&self) -> &str {
    match self.short.is_empty() {
      true  => &self.name,
      false => &self.short
    }
  }

  /// Identifier-safe name used for files and project names.
  pub fn camel(&self) -> String {
    match self.camel.is_empty() {
      true  => self.name.chars().filter(|c| c.is_ascii_alphanumeric()).collect(),
      false => self.camel.clone()
    }
  }

  pub fn salt(&self) -> &str {
    match self.salt.is_empty() {
      true  => DEFAULT_SALT,
      false => &self.salt
    }
  }
}

/// Preprocessor definitions of a platform: one list for every build type,
/// or a list per build type.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Defines {
  List(Vec<String>),
  ByBuild(BTreeMap<String, Vec<String>>)
}

impl Defines {
  pub fn for_build(&self, build: &str) -> Vec<String> {
    match self {
      Defines::List(v)    => v.clone(),
      Defines::ByBuild(m) => m.iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case(build))
        .flat_map(|(_, v)| v.iter().cloned())
        .collect()
    }
  }
}

/// An external library built by CMake and linked into the application.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct External {
  pub name: String,

  /// Directory of the module's CMakeLists.txt, relative to the input folder.
  pub path: String,

  #[serde(default)]
  pub targets: Vec<String>,

  #[serde(default)]
  pub options: BTreeMap<String, toml::Value>
}

impl External {
  /// The options as `-D` arguments.
  pub fn cmake_options(&self) -> Vec<String> {
    self.options.iter().map(|(k, v)| {
      let value = match v {
        toml::Value::String (s) => s.clone(),
        toml::Value::Boolean(b) => match b { true => "ON".into(), false => "OFF".into() },
        other                   => other.to_string()
      };
      format!("-D{}={}", k, value)
    }).collect()
  }
}

impl Config {
  /// Checks the keys generation can't do without.
  pub fn validate(&self) -> GenResult<()> {
    let required = [("name", &self.name), ("appid", &self.appid)];
    for (key, value) in &required {
      if value.trim().is_empty() {
        return Err(GenError::config(format!("missing project {}", key)));
      }
    }
    if self.camel().is_empty() {
      return Err(GenError::config("project name has no alphanumeric characters"));
    }
    if self.targets.is_empty() {
      return Err(GenError::config("no targets in project configuration"));
    }
    if self.targets.contains(&Platform::All) {
      return Err(GenError::config("'all' is not a valid target"));
    }
    if self.sources.values().all(Vec::is_empty) {
      return Err(GenError::config("no sources in project configuration"));
    }
    for ext in &self.externals {
      if ext.name.is_empty() || ext.path.is_empty() {
        return Err(GenError::config("external modules need a name and a path"));
      }
    }
    Ok(())
  }

  /// Include directories of `p`, including the ones shared by all platforms
  /// (and by all Apple platforms for macOS and iOS).
  pub fn includes_for(&self, p: Platform) -> Vec<String> {
    let mut out = Vec::new();
    for tag in inherited(p) {
      if let Some(v) = self.includes.get(&tag) {
        for i in v {
          if !out.contains(i) {
            out.push(i.clone());
          }
        }
      }
    }
    out
  }

  /// Defines of `p` for a build type, following the same inheritance as
  /// `includes_for`.
  pub fn defines_for(&self, p: Platform, build: &str) -> Vec<String> {
    let mut out = Vec::new();
    for tag in inherited(p) {
      if let Some(d) = self.defines.get(&tag) {
        for x in d.for_build(build) {
          if !out.contains(&x) {
            out.push(x);
          }
        }
      }
    }
    out
  }

  /// Feature modules are disabled unless turned on, except graphics which
  /// follows the headless flag.
  pub fn module_enabled(&self, name: &str) -> bool {
    match self.modules.get(name) {
      Some(on) => *on,
      None     => name == "graphics" && !self.headless
    }
  }
}

fn inherited(p: Platform) -> Vec<Platform> {
  match p {
    Platform::All                   => vec![Platform::All],
    Platform::Macos | Platform::Ios => vec![Platform::All, Platform::Apple, p],
    _                               => vec![Platform::All, p]
  }
}

/// Scratch project folders for generator tests.
#[cfg(test)]
pub mod testing {
  use clap::{App, Arg, ArgMatches, SubCommand};
  use std::fs;
  use std::path::Path;

  use super::*;
  use crate::tree;

  pub struct Scratch {
    pub dir:     tempfile::TempDir,
    pub env:     Env,
    pub args:    ArgMatches<'static>,
    pub config:  Config,
    pub sources: SourceTree
  }

  impl Scratch {
    pub fn new(config: &str) -> Self {
      Scratch {
        dir:     tempfile::tempdir().unwrap(),
        env:     Env::default(),
        args:    matches(&[]),
        config:  toml::from_str(config).unwrap(),
        sources: SourceTree::new()
      }
    }

    /// Writes a file under the project folder, creating its directory.
    pub fn write(&self, path: &str, text: &str) {
      let full = self.dir.path().join(path);
      fs::create_dir_all(full.parent().unwrap()).unwrap();
      fs::write(full, text).unwrap();
    }

    pub fn source(&mut self, path: &str, platform: Platform) {
      self.write(path, "");
      tree::insert(&mut self.sources, Path::new(path), platform);
    }

    /// Simulates `gen -p <platforms>` on the command line.
    pub fn select(&mut self, platforms: &[&str]) {
      self.args = matches(platforms);
    }

    pub fn read(&self, path: &str) -> String {
      fs::read_to_string(self.dir.path().join(path)).unwrap()
    }

    pub fn context(&self) -> Context<'_> {
      Context {
        commands:   Commands::new(),
        generators: Generators::new(),
        input_dir:  self.dir.path().to_path_buf(),
        build_dir:  self.dir.path().join("build"),
        env:        &self.env,
        args:       &self.args,
        config:     &self.config,
        sources:    &self.sources
      }
    }
  }

  fn matches(platforms: &[&str]) -> ArgMatches<'static> {
    let app = App::new("buildgen")
      .subcommand(SubCommand::with_name("gen")
                  .arg(Arg::with_name("platform").short("p").takes_value(true).multiple(true)));
    let mut argv = vec!["buildgen".to_string()];
    if !platforms.is_empty() {
      argv.push("gen".into());
      argv.push("-p".into());
      argv.extend(platforms.iter().map(|p| p.to_string()));
    }
    app.get_matches_from(argv)
  }
}
