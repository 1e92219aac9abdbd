//! Project generator for CMake desktop builds.
//!
//! The template is a `CMakeLists.txt` with placeholders and a `flatpak/`
//! folder packaging the result on Linux. The lists file is also the base of
//! the Android native build, so its placeholders are shared with the Gradle
//! generator.

use log::{debug, info};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::ctx::{Config, Context, Generator, RunResult};
use crate::error::GenResult;
use crate::tree::{self, Platform, SourceTree};
use crate::util;

pub const SOURCE_EXT: &[&str] = &[".cpp", ".c", ".cc", ".cxx", ".asm", ".asmx"];

/// Placeholder suffix of each feature module flag.
const MODULES: &[(&str, &str)] = &[
  ("graphics",          "GRAPHICS"),
  ("audio",             "AUDIO"),
  ("scene2",            "SCENE2"),
  ("scene3",            "SCENE3"),
  ("netcode",           "NETCODE"),
  ("physics2",          "PHYSICS2"),
  ("physics2::distrib", "PHYSICS2_DISTRIB")
];

pub struct CMake;

impl Generator for CMake {
  fn supports_target(&self, t: Platform) -> bool {
    t == Platform::Cmake
  }

  fn run(&self, ctx: &Context) -> RunResult {
    if !ctx.is_selected(Platform::Cmake) {
      return Ok(());
    }

    let dir = ctx.build_dir.join("cmake");
    util::remake_dir(&dir)?;
    place_project(&ctx.templates().join("cmake"), &dir, &ctx.config.appid)?;

    let sources = tree::filtered(ctx.sources, &|p: Platform| p.in_cmake());
    let subs    = lists_subs(ctx, Path::new(".."), Platform::Cmake, &sources, Switch::CMAKE);
    util::file_replace(dir.join("CMakeLists.txt"), &pairs(&subs))?;

    let flatpak = dir.join("flatpak");
    if flatpak.is_dir() {
      util::directory_replace(&flatpak, &|_: &Path| true, &pairs(&flatpak_subs(ctx.config)))?;
    }

    info!("Generated {} with {} source files", dir.display(), source_files(&sources).len());
    Ok(())
  }
}

fn place_project(templates: &Path, dir: &Path, appid: &str) -> GenResult<()> {
  fs::copy(templates.join("CMakeLists.txt"), dir.join("CMakeLists.txt"))?;

  let readme = templates.join("ReadMe.md");
  if readme.is_file() {
    fs::copy(&readme, dir.join("ReadMe.md"))?;
  }

  let flatpak = templates.join("flatpak");
  if flatpak.is_dir() {
    let dest = dir.join("flatpak");
    util::copy_dir(&flatpak, &dest)?;
    let manifest = dest.join("__APP_ID__.yml");
    if manifest.is_file() {
      util::move_path(&manifest, dest.join([appid, ".yml"].concat()))?;
    }
  }

  // Work folder of the out of source build.
  fs::create_dir_all(dir.join("cmake"))?;
  Ok(())
}

fn flatpak_subs(config: &Config) -> Vec<(String, String)> {
  let shortcut: String = config.name.chars()
    .filter(|c| c.is_alphanumeric() || *c == '_')
    .collect();
  vec![
    ("__APP_ID__".into(),   config.appid.clone()),
    ("__SHORT__".into(),    config.short().to_lowercase()),
    ("__GAME__".into(),     config.name.clone()),
    ("__SHORTCUT__".into(), shortcut)
  ]
}

/// Values written for an enabled and a disabled feature flag.
#[derive(Clone, Copy)]
pub struct Switch {
  pub on:  &'static str,
  pub off: &'static str
}

impl Switch {
  pub const CMAKE: Switch = Switch { on: "ON",   off: "OFF"   };
  pub const MAKE:  Switch = Switch { on: "true", off: "false" };

  fn value(self, enabled: bool) -> &'static str {
    match enabled {
      true  => self.on,
      false => self.off
    }
  }
}

/// `__<ENGINE>_<MODULE>__` flags of the feature modules, plus the headless
/// flag.
pub fn module_flags(config: &Config, switch: Switch) -> Vec<(String, String)> {
  let engine = config.engine.to_uppercase();
  let mut out = vec![(format!("__{}_HEADLESS__", engine), switch.value(config.headless).to_string())];
  for (key, flag) in MODULES {
    out.push((format!("__{}_{}__", engine, flag), switch.value(config.module_enabled(key)).to_string()));
  }
  out
}

/// Compiled files of the tree, relative to the input folder.
pub fn source_files(sources: &SourceTree) -> Vec<String> {
  tree::files(sources).into_iter()
    .map(|(path, _)| path)
    .filter(|path| {
      let name = path.rsplit('/').next().unwrap_or(path);
      SOURCE_EXT.contains(&tree::extension(name))
    })
    .collect()
}

/// Placeholders of a `CMakeLists.txt`. `prefix` leads from the folder of the
/// lists file to the build folder.
pub fn lists_subs(ctx: &Context, prefix: &Path, platform: Platform, sources: &SourceTree,
                  switch: Switch) -> Vec<(String, String)> {
  let root   = prefix.join(ctx.build_to_root());
  let engine = prefix.join(ctx.build_to_engine());
  let under_root = |item: &str| -> String {
    ["${PROJECT_SOURCE_DIR}/", util::path_to_posix(root.join(item)).as_str()].concat()
  };

  let list = source_files(sources).iter()
    .map(|path| under_root(path.as_str()))
    .collect::<Vec<String>>()
    .join("\n    ");

  let mut includes = String::new();
  for item in ctx.config.includes_for(platform) {
    includes.push_str(&format!("list(APPEND EXTRA_INCLUDES \"{}\")\n", under_root(item.as_str())));
  }

  let mut externals = String::new();
  let mut seen      = BTreeSet::new();
  for ext in &ctx.config.externals {
    if !seen.insert(ext.name.as_str()) {
      debug!("Skipping duplicate external module {}", ext.name);
      continue;
    }
    externals.push_str(&format!("\n# External package \"{}\"\nadd_subdirectory(\"{}\" \"{}.dir\")\n",
                                ext.name, under_root(ext.path.as_str()), ext.name));
    for target in &ext.targets {
      externals.push_str(&format!("list(APPEND EXTRA_LIBS {})\n", target));
    }
  }

  let mut subs = vec![
    ("__TARGET__".to_string(),     ctx.config.short().to_string()),
    ("__APPNAME__".to_string(),    ctx.config.name.clone()),
    ("__VERSION__".to_string(),    ctx.config.version.clone()),
    ("__ENGINE_DIR__".to_string(), util::path_to_posix(&engine)),
    ("__ASSET_DIR__".to_string(),  util::path_to_posix(root.join(&ctx.config.assets))),
    ("__SOURCE_LIST__".to_string(),    list),
    ("__EXTRA_INCLUDES__".to_string(), includes),
    ("__EXTERNALS__".to_string(),      externals)
  ];
  subs.extend(module_flags(ctx.config, switch));
  subs
}

/// Borrowed view of owned substitutions, as taken by `util::file_replace`.
pub fn pairs(subs: &[(String, String)]) -> Vec<(&str, &str)> {
  subs.iter().map(|(from, to)| (from.as_str(), to.as_str())).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ctx::testing::Scratch;
  use pretty_assertions::assert_eq;

  const LISTS: &str = "\
project(__TARGET__ VERSION __VERSION__)
set(APP_NAME \"__APPNAME__\")
set(ENGINE_DIR \"__ENGINE_DIR__\")
set(ASSET_DIR \"__ASSET_DIR__\")
set(SOURCES
    __SOURCE_LIST__)
__EXTRA_INCLUDES__
option(CUGL_HEADLESS \"\" __CUGL_HEADLESS__)
option(CUGL_AUDIO \"\" __CUGL_AUDIO__)
option(CUGL_GRAPHICS \"\" __CUGL_GRAPHICS__)
option(CUGL_PHYSICS2_DISTRIB \"\" __CUGL_PHYSICS2_DISTRIB__)
__EXTERNALS__";

  const CONFIG: &str = r#"
[project]
name      = "Rocket Demo!"
short     = "Rocket"
appid     = "edu.cornell.gdiac.rocket"
version   = "2.1"
targets   = ["cmake"]
templates = "templates"

[sources]
all = ["source/**/*.cpp"]

[includes]
all   = ["source"]
cmake = ["linux/include"]

[modules]
audio = true

[[external]]
name    = "box2d"
path    = "external/box2d"
targets = ["box2d", "box2d-utils"]
"#;

  fn scratch() -> Scratch {
    let mut s = Scratch::new(CONFIG);
    s.write("templates/cmake/CMakeLists.txt", LISTS);
    s.write("templates/cmake/ReadMe.md", "Build with cmake");
    s.write("templates/cmake/flatpak/__APP_ID__.yml", "app-id: __APP_ID__\ncommand: __SHORT__");
    s.write("templates/cmake/flatpak/build.sh", "echo __GAME__ > __SHORTCUT__.desktop");

    s.source("source/main.cpp",        Platform::All);
    s.source("source/scenes/Game.cpp", Platform::All);
    s.source("source/scenes/Game.h",   Platform::All);
    s.source("source/linux/Shim.c",    Platform::Cmake);
    s.source("source/win/Shim.cpp",    Platform::Windows);
    s
  }

  #[test]
  fn places_the_template() {
    let s = scratch();
    CMake.run(&s.context()).unwrap();

    let out = s.dir.path().join("build/cmake");
    assert!(out.join("ReadMe.md").is_file());
    assert!(out.join("cmake").is_dir());
    assert!(!out.join("flatpak/__APP_ID__.yml").exists());
    assert_eq!(s.read("build/cmake/flatpak/edu.cornell.gdiac.rocket.yml"),
               "app-id: edu.cornell.gdiac.rocket\ncommand: rocket");
    assert_eq!(s.read("build/cmake/flatpak/build.sh"), "echo Rocket Demo! > RocketDemo.desktop");
  }

  #[test]
  fn fills_the_lists_file() {
    let s = scratch();
    CMake.run(&s.context()).unwrap();

    let lists = s.read("build/cmake/CMakeLists.txt");
    assert_eq!(lists, "\
project(Rocket VERSION 2.1)
set(APP_NAME \"Rocket Demo!\")
set(ENGINE_DIR \"../..\")
set(ASSET_DIR \"../../assets\")
set(SOURCES
    ${PROJECT_SOURCE_DIR}/../../source/linux/Shim.c
    ${PROJECT_SOURCE_DIR}/../../source/main.cpp
    ${PROJECT_SOURCE_DIR}/../../source/scenes/Game.cpp)
list(APPEND EXTRA_INCLUDES \"${PROJECT_SOURCE_DIR}/../../source\")
list(APPEND EXTRA_INCLUDES \"${PROJECT_SOURCE_DIR}/../../linux/include\")

option(CUGL_HEADLESS \"\" OFF)
option(CUGL_AUDIO \"\" ON)
option(CUGL_GRAPHICS \"\" ON)
option(CUGL_PHYSICS2_DISTRIB \"\" OFF)

# External package \"box2d\"
add_subdirectory(\"${PROJECT_SOURCE_DIR}/../../external/box2d\" \"box2d.dir\")
list(APPEND EXTRA_LIBS box2d)
list(APPEND EXTRA_LIBS box2d-utils)
");
  }

  #[test]
  fn flags_follow_the_engine_name() {
    let mut s = Scratch::new(CONFIG);
    s.config.info.engine   = "mylib".into();
    s.config.info.headless = true;
    let flags = module_flags(&s.config, Switch::MAKE);
    assert_eq!(flags[0], ("__MYLIB_HEADLESS__".to_string(), "true".to_string()));
    assert!(flags.contains(&("__MYLIB_GRAPHICS__".to_string(), "false".to_string())));
    assert!(flags.contains(&("__MYLIB_AUDIO__".to_string(), "true".to_string())));
  }

  #[test]
  fn skips_unselected_projects() {
    let mut s = scratch();
    s.select(&["windows"]);
    CMake.run(&s.context()).unwrap();
    assert!(!s.dir.path().join("build/cmake").exists());
  }
}
