//! Project generator for Android Studio.
//!
//! The template is a Gradle project named `__project__` whose native code is
//! built both by `ndk-build` (the `Android.mk` files under `app/jni`) and by
//! CMake. The activity class is moved into the package of the application
//! id.

use log::{info, warn};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::cmake::{self, Switch};
use crate::ctx::{Config, Context, Generator, RunResult};
use crate::error::{GenError, GenResult};
use crate::tree::{self, Node, Platform, SourceTree};
use crate::util;

/// From `app/` up to the build folder.
const APP_PREFIX: &str = "../../..";
/// From `app/jni/` up to the build folder.
const JNI_PREFIX: &str = "../../../..";

pub struct Gradle;

impl Generator for Gradle {
  fn supports_target(&self, t: Platform) -> bool {
    t == Platform::Android
  }

  fn run(&self, ctx: &Context) -> RunResult {
    if !ctx.is_selected(Platform::Android) {
      return Ok(());
    }
    if !ctx.config.appid.contains('.') {
      return Err(GenError::config(format!("appid is missing an internal period: {}", ctx.config.appid)).into());
    }
    if !ctx.config.externals.is_empty() {
      warn!("External modules are only linked by the CMake build of Android");
    }

    let dir = ctx.build_dir.join("android");
    util::remake_dir(&dir)?;

    let camel   = ctx.config.camel();
    let project = dir.join(&camel);
    util::copy_dir(ctx.templates().join("android").join("__project__"), &project)?;
    let java = place_activity(&project, ctx.config)?;

    config_settings(ctx, &project, &java)?;

    let sources = tree::filtered(ctx.sources, &|p: Platform| p.in_android());
    let jni     = project.join("app").join("jni");
    util::directory_replace(&jni, &|p: &Path| p.file_name().map_or(false, |n| n == "Android.mk"),
                            &cmake::pairs(&ndk_subs(ctx, &sources)))?;

    let lists = jni.join("CMakeLists.txt");
    if lists.is_file() {
      let subs = cmake::lists_subs(ctx, Path::new(JNI_PREFIX), Platform::Android, &sources, Switch::CMAKE);
      util::file_replace(&lists, &cmake::pairs(&subs))?;
    }

    info!("Generated {} with {} source files", project.display(), cmake::source_files(&sources).len());
    Ok(())
  }
}

/// Moves the activity class into the folders of its package. Returns its
/// new path.
fn place_activity(project: &Path, config: &Config) -> GenResult<PathBuf> {
  let java    = project.join("app").join("src").join("main").join("java");
  let package = config.appid.split('.').fold(java.clone(), |p, part| p.join(part));
  std::fs::create_dir_all(&package)?;

  let dest = package.join([config.camel().as_str(), ".java"].concat());
  util::move_path(java.join("__GAME__.java"), &dest)?;
  Ok(dest)
}

fn config_settings(ctx: &Context, project: &Path, java: &Path) -> GenResult<()> {
  let config = ctx.config;
  let camel  = config.camel();
  let main   = project.join("app").join("src").join("main");

  util::file_replace(project.join("settings.gradle"), &[("__project__", camel.as_str())])?;

  let prefix   = Path::new(APP_PREFIX);
  let assets   = util::path_to_posix(prefix.join(ctx.build_to_root()).join(&config.assets));
  let licenses = util::path_to_posix(prefix.join(ctx.build_to_engine()).join("licenses"));
  util::file_replace(project.join("app").join("build.gradle"), &[
    ("__NAMESPACE__", config.appid.as_str()),
    ("__VERSION__",   config.version.as_str()),
    ("__ASSET_DIR__", assets.as_str()),
    ("__LICENSES__",  licenses.as_str())
  ])?;

  util::file_replace(main.join("AndroidManifest.xml"), &[
    ("__GAME__",        camel.as_str()),
    ("__ORIENTATION__", config.orientation.android())
  ])?;

  util::file_replace(java, &[("__GAME__", camel.as_str()), ("__NAMESPACE__", config.appid.as_str())])?;

  let strings = main.join("res").join("values").join("strings.xml");
  if strings.is_file() {
    util::file_replace(&strings, &[("__project__", config.name.as_str())])?;
  }
  Ok(())
}

/// Placeholders of the `Android.mk` files.
fn ndk_subs(ctx: &Context, sources: &SourceTree) -> Vec<(String, String)> {
  let prefix = Path::new(JNI_PREFIX);

  // Sources are listed from the only top-level folder when there is one.
  let (top, inner) = tree::collapse_root(sources);
  let local = match top {
    Some(t) => ["$(LOCAL_PATH)/", t].concat(),
    None    => "$(LOCAL_PATH)".to_string()
  };

  let mut files = String::new();
  expand_sources(&local, inner, &mut files);

  let mut includes = ctx.config.includes_for(Platform::Android);
  let mut dirs     = BTreeSet::new();
  expand_includes(top.unwrap_or(""), inner, &mut dirs);
  for d in dirs {
    if !includes.contains(&d) {
      includes.push(d);
    }
  }

  let extra = includes.iter()
    .map(|i| format!("LOCAL_C_INCLUDES += $(PROJ_PATH)/{}\n", util::path_to_posix(i)))
    .collect::<String>();

  let mut subs = vec![
    ("__ENGINE_PATH__".to_string(),    util::path_to_posix(prefix.join(ctx.build_to_engine()))),
    ("__SOURCE_PATH__".to_string(),    util::path_to_posix(prefix.join(ctx.build_to_root()))),
    ("__SOURCE_FILES__".to_string(),   files),
    ("__EXTRA_INCLUDES__".to_string(), extra)
  ];
  subs.extend(cmake::module_flags(ctx.config, Switch::MAKE));
  subs
}

/// Appends a ` \` continued makefile entry for each compiled file.
fn expand_sources(path: &str, tree: &SourceTree, out: &mut String) {
  for (name, node) in tree {
    match node {
      Node::Directory(children) => expand_sources(&[path, "/", name].concat(), children, out),
      Node::File(_)             => if cmake::SOURCE_EXT.contains(&tree::extension(name)) {
        out.push_str(&format!(" \\\n\t{}/{}", path, name));
      }
    }
  }
}

/// Collects the folders holding headers, relative to the input folder.
fn expand_includes(path: &str, tree: &SourceTree, out: &mut BTreeSet<String>) {
  for (name, node) in tree {
    match node {
      Node::Directory(children) => {
        let nested = match path.is_empty() {
          true  => name.clone(),
          false => [path, "/", name].concat()
        };
        expand_includes(&nested, children, out);
      },
      Node::File(_) => if !cmake::SOURCE_EXT.contains(&tree::extension(name)) {
        out.insert(path.to_string());
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ctx::testing::Scratch;
  use pretty_assertions::assert_eq;

  const CONFIG: &str = r#"
[project]
name        = "Rocket Demo"
short       = "Rocket"
appid       = "edu.cornell.gdiac.rocket"
version     = "2.1"
orientation = "landscape-either"
targets     = ["android"]
templates   = "templates"

[sources]
all = ["source/**/*.cpp"]

[includes]
android = ["android/include"]

[modules]
scene2 = true
"#;

  const ROOT: &str = "templates/android/__project__";
  const OUT:  &str = "build/android/RocketDemo";

  fn scratch(config: &str) -> Scratch {
    let mut s = Scratch::new(config);
    s.write(&[ROOT, "/settings.gradle"].concat(), "rootProject.name = '__project__'");
    s.write(&[ROOT, "/app/build.gradle"].concat(),
            "namespace '__NAMESPACE__'\nversionName '__VERSION__'\nassets '__ASSET_DIR__'\nlicenses '__LICENSES__'");
    s.write(&[ROOT, "/app/src/main/AndroidManifest.xml"].concat(),
            "<activity android:name=\"__GAME__\" android:screenOrientation=\"__ORIENTATION__\"/>");
    s.write(&[ROOT, "/app/src/main/java/__GAME__.java"].concat(),
            "package __NAMESPACE__;\npublic class __GAME__ extends SDLActivity {}");
    s.write(&[ROOT, "/app/src/main/res/values/strings.xml"].concat(),
            "<string name=\"app_name\">__project__</string>");
    s.write(&[ROOT, "/app/jni/src/Android.mk"].concat(),
            "PROJ_PATH := __SOURCE_PATH__\nENGINE := __ENGINE_PATH__\nAUDIO := __CUGL_AUDIO__\nLOCAL_SRC_FILES := main.c__SOURCE_FILES__\n__EXTRA_INCLUDES__");
    s.write(&[ROOT, "/app/jni/CMakeLists.txt"].concat(),
            "project(__TARGET__)\nset(SOURCES __SOURCE_LIST__)\nset(SCENE2 __CUGL_SCENE2__)\n");

    s.source("source/main.cpp",         Platform::All);
    s.source("source/scenes/Game.cpp",  Platform::All);
    s.source("source/scenes/Game.h",    Platform::All);
    s.source("source/android/Glue.cpp", Platform::Android);
    s.source("source/ios/Glue.mm",      Platform::Ios);
    s
  }

  #[test]
  fn moves_the_activity_into_its_package() {
    let s = scratch(CONFIG);
    Gradle.run(&s.context()).unwrap();

    assert!(!s.dir.path().join(OUT).join("app/src/main/java/__GAME__.java").exists());
    assert_eq!(s.read(&[OUT, "/app/src/main/java/edu/cornell/gdiac/rocket/RocketDemo.java"].concat()),
               "package edu.cornell.gdiac.rocket;\npublic class RocketDemo extends SDLActivity {}");
  }

  #[test]
  fn configures_gradle_settings() {
    let s = scratch(CONFIG);
    Gradle.run(&s.context()).unwrap();

    assert_eq!(s.read(&[OUT, "/settings.gradle"].concat()), "rootProject.name = 'RocketDemo'");
    assert_eq!(s.read(&[OUT, "/app/build.gradle"].concat()),
               "namespace 'edu.cornell.gdiac.rocket'\nversionName '2.1'\nassets '../../../../assets'\nlicenses '../../../../licenses'");
    assert_eq!(s.read(&[OUT, "/app/src/main/AndroidManifest.xml"].concat()),
               "<activity android:name=\"RocketDemo\" android:screenOrientation=\"sensorLandscape\"/>");
    assert_eq!(s.read(&[OUT, "/app/src/main/res/values/strings.xml"].concat()),
               "<string name=\"app_name\">Rocket Demo</string>");
  }

  #[test]
  fn fills_makefiles() {
    let s = scratch(CONFIG);
    Gradle.run(&s.context()).unwrap();

    assert_eq!(s.read(&[OUT, "/app/jni/src/Android.mk"].concat()), concat!(
      "PROJ_PATH := ../../../../..\n",
      "ENGINE := ../../../../..\n",
      "AUDIO := false\n",
      "LOCAL_SRC_FILES := main.c \\\n",
      "\t$(LOCAL_PATH)/source/android/Glue.cpp \\\n",
      "\t$(LOCAL_PATH)/source/main.cpp \\\n",
      "\t$(LOCAL_PATH)/source/scenes/Game.cpp\n",
      "LOCAL_C_INCLUDES += $(PROJ_PATH)/android/include\n",
      "LOCAL_C_INCLUDES += $(PROJ_PATH)/source/scenes\n"));
  }

  #[test]
  fn fills_the_native_lists_file() {
    let s = scratch(CONFIG);
    Gradle.run(&s.context()).unwrap();

    let lists = s.read(&[OUT, "/app/jni/CMakeLists.txt"].concat());
    assert!(lists.starts_with("project(Rocket)\n"));
    assert!(lists.contains("${PROJECT_SOURCE_DIR}/../../../../../source/android/Glue.cpp"));
    assert!(!lists.contains("Glue.mm"));
    assert!(lists.contains("set(SCENE2 ON)"));
  }

  #[test]
  fn rejects_an_appid_without_period() {
    let s = scratch(&CONFIG.replace("edu.cornell.gdiac.rocket", "rocket"));
    let err = Gradle.run(&s.context()).unwrap_err();
    assert!(err.to_string().contains("internal period"));
    assert!(!s.dir.path().join("build/android").exists());
  }

  #[test]
  fn skips_unselected_projects() {
    let mut s = scratch(CONFIG);
    s.select(&["cmake"]);
    Gradle.run(&s.context()).unwrap();
    assert!(!s.dir.path().join("build/android").exists());
  }
}
