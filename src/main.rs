#![allow(clippy::cognitive_complexity)]
#![allow(clippy::write_with_newline)]

#![cfg_attr(debug_assertions, allow(dead_code))]

mod cmd;
mod ctx;
mod error;
mod gen;
mod ids;
mod link;
mod orientation;
mod pbx;
mod sln;
mod tree;
mod util;
mod vcx;

use clap::{Arg, App, SubCommand};
use log::debug;
use semver::Version;
use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::GenError;

const CONFIG_FILE: &str = "buildgen.toml";

fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
    .format(|buf, record| writeln!(buf, "{}", record.args()))
    .init();

  // Initialize.
  let commands   = cmd::init();
  let generators = gen::init();

  // Parse the environment variables.
  let env: ctx::Env = envy::prefixed("BUILDGEN_").from_env()
    .check(|| "Failed to parse environment variables");

  // Parse the command line.
  let args = App::new(env!("CARGO_PKG_NAME"))
    .version(env!("CARGO_PKG_VERSION"))
    .author(env!("CARGO_PKG_AUTHORS"))
    .about(env!("CARGO_PKG_DESCRIPTION"))
    .arg(Arg::with_name("FOLDER")
         .help("Project folder containing the configuration file")
         .required(true))
    .arg(Arg::with_name("build")
         .short("b")
         .long("build")
         .value_name("FOLDER")
         .help("Where to store the generated project files")
         .takes_value(true))
    .arg(Arg::with_name("config")
         .short("c")
         .long("config")
         .value_name("FILE")
         .help("Name of the configuration file")
         .takes_value(true))
    .subcommands(commands.iter().map(|(name, cmd)| {
      cmd.init(SubCommand::with_name(name))
    }))
    .get_matches();

  let input_dir = PathBuf::from(args.value_of("FOLDER").unwrap_or("."))
    .canonicalize()
    .check(|| "Failed to resolve the project folder");
  let build_dir = match args.value_of("build") {
    None    => input_dir.join("build"),
    Some(b) => {
      let cwd = std::env::current_dir().check(|| "Failed to resolve the current folder");
      util::normalize(&cwd.join(b))
    }
  };

  // Load the project's configuration file.
  let config: ctx::Config = {
    let path = input_dir.join(args.value_of("config").unwrap_or(CONFIG_FILE));
    let text = std::fs::read_to_string(&path)
      .check(|| format!("Failed to load config file ({:?})", path));
    toml::from_str(&text)
      .check(|| format!("Failed to read the config file ({:?})", path))
  };

  config.validate().check(|| "Invalid project");
  is_supported(&config.min_version).check(|| "Min version check failed");

  let sources = find_sources(&input_dir, &config)
    .check(|| "Failed to resolve source files");
  (!sources.is_empty()).check(|| "No source files matched the project configuration");

  // Execute the requested command.
  let ctx = ctx::Context {
    commands,
    generators,
    input_dir,
    build_dir,
    env:     &env,
    args:    &args,
    config:  &config,
    sources: &sources
  };

  let cmd_name = ctx.args.subcommand_name().unwrap_or("gen");
  ctx.commands[cmd_name].run(&ctx)
    .check(|| format!("Failed to run command ({})", cmd_name));
}

fn is_supported(min_version: &str) -> ctx::DynResult<()> {
  if !min_version.is_empty() {
    let expected = Version::parse(min_version)?;
    let current  = Version::parse(env!("CARGO_PKG_VERSION"))?;
    if expected > current {
      return Err(Box::new(GenError::config(
        format!("project requires version {} but running {}", expected, current))));
    }
  }
  Ok(())
}

/// Resolves the source globs of every platform tag into a single tree.
fn find_sources(dir: &Path, config: &ctx::Config) -> ctx::DynResult<tree::SourceTree> {
  let mut sources = tree::SourceTree::new();
  for (platform, patterns) in &config.sources {
    for pattern in patterns {
      let mut count = 0;
      for m in glob::glob(&dir.join(pattern).to_string_lossy())? {
        let path = m?;
        if path.is_file() {
          tree::insert(&mut sources, path.strip_prefix(dir)?, *platform);
          count += 1;
        }
      }
      debug!("{} files match {} ({})", count, pattern, platform);
    }
  }
  Ok(sources)
}

trait Check {
  type R;
  fn check<F, S>(self, msg: F) -> Self::R where F: FnOnce() -> S, S: Display;
}

impl Check for bool {
  type R = ();
  fn check<F, S>(self, msg: F) where F: FnOnce() -> S, S: Display {
    if !self {
      fatal(msg());
    }
  }
}

impl<T, E> Check for Result<T, E> where E: Display {
  type R = T;
  fn check<F, S>(self, msg: F) -> Self::R where F: FnOnce() -> S, S: Display {
    match self {
      Ok (v) => v,
      Err(e) => fatal(format!("{}: {}", msg(), e))
    }
  }
}

fn fatal<S: Display>(msg: S) -> ! {
  eprintln!("{}", msg);
  std::process::exit(1)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tree::{Node, Platform};
  use pretty_assertions::assert_eq;

  #[test]
  fn min_version_gate() {
    assert!(is_supported("").is_ok());
    assert!(is_supported("0.1.0").is_ok());
    assert!(is_supported("99.0.0").is_err());
    assert!(is_supported("not a version").is_err());
  }

  #[test]
  fn platform_globs_win_over_shared_ones() {
    let dir = tempfile::tempdir().unwrap();
    for path in &["source/main.cpp", "source/win/Glue.cpp", "source/notes.txt"] {
      let full = dir.path().join(path);
      std::fs::create_dir_all(full.parent().unwrap()).unwrap();
      std::fs::write(full, "").unwrap();
    }

    let config: ctx::Config = toml::from_str(r#"
[project]
name    = "Rocket"
appid   = "edu.cornell.gdiac.rocket"
targets = ["windows"]

[sources]
all     = ["source/**/*.cpp"]
windows = ["source/win/*.cpp"]
"#).unwrap();

    let sources = find_sources(dir.path(), &config).unwrap();
    assert_eq!(tree::files(&sources), vec![
      ("source/main.cpp".to_string(),     Platform::All),
      ("source/win/Glue.cpp".to_string(), Platform::Windows)
    ]);
    assert!(matches!(sources.get("source"), Some(Node::Directory(_))));
  }
}
