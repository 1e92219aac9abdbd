//! Project generator for Visual Studio.
//!
//! The template is a solution with a single application project, both named
//! `__project__`. Most of its placeholders are plain text and are replaced
//! file by file. The build settings depend on the build type and platform of
//! each `ItemDefinitionGroup`, so the project is then parsed to fill them.

use log::{debug, info};
use quick_xml::escape::escape;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ctx::{Config, Context, Generator, RunResult};
use crate::error::GenResult;
use crate::ids::{Dialect, Ids};
use crate::link::windows as link;
use crate::link::{CMakeBuilder, LinkData, LinkEnv};
use crate::tree::{self, Platform, SourceTree};
use crate::util;
use crate::vcx::{parse_condition, Document};

pub const SOURCE_EXT: &[&str] = &[
  ".cpp", ".c", ".cc", ".cxx", ".m", ".mm", ".def", ".odl", ".idl", ".hpj", ".bat", ".asm", ".asmx"
];

/// Project GUID of the template, replaced by the application's.
const TEMPLATE_GUID: &str = "AAAAAAAA-AAAA-AAAA-AAAA-AAAAAAAAAA01";

/// Engine project suffix and GUID of each feature module. Core is always
/// referenced.
const MODULES: &[(&str, &str, &str)] = &[
  ("core",              "core",             "1EF11169-0BB7-438F-A0A8-E091DDABA512"),
  ("audio",             "audio",            "F8748A4B-09DA-4738-BA8E-A803B972B2DA"),
  ("graphics",          "graphics",         "B6B90309-0F84-4720-8C57-B4F07D0148E1"),
  ("physics2",          "physics2",         "D760AAB9-E462-4798-B80F-F84A9AE30540"),
  ("netcode",           "netcode",          "9C944826-FC11-43A6-A70D-4B5507542E39"),
  ("physics2::distrib", "distrib-physics2", "0B582C4D-2886-494D-A585-1E90152E337F"),
  ("scene2",            "scene2",           "DE320596-02AB-43D4-A9D4-C7D7C4BF9749"),
  ("scene3",            "scene3",           "1BD80952-C4C8-4752-8AF6-799139FA6422")
];

/// Only this architecture receives the settings of external modules.
const LINKED_ARCH: &str = "x64";

pub struct VisualStudio;

impl Generator for VisualStudio {
  fn supports_target(&self, t: Platform) -> bool {
    t == Platform::Windows
  }

  fn run(&self, ctx: &Context) -> RunResult {
    if !ctx.is_selected(Platform::Windows) {
      return Ok(());
    }

    let dir   = ctx.build_dir.join("windows");
    let camel = ctx.config.camel();
    util::remake_dir(&dir)?;

    let files = place_project(&ctx.templates().join("windows"), &dir, &camel)?;
    let mut ids = Ids::new(ctx.config.salt());
    let guid    = ids.windows(&Dialect::Windows.key("PROJECT", &camel));

    reassign(ctx, &files, &guid)?;

    let sources = tree::filtered(ctx.sources, &|p: Platform| p.in_windows());
    let count   = populate_sources(&files, &sources, &source_dir(ctx, &sources), &mut ids)?;

    let eol = line_ending(&files.project)?;
    util::file_replace(&files.project, &[(["__ENGINE_MODULES__", eol].concat().as_str(), engine_modules(ctx, eol).as_str())])?;

    let mut doc = Document::parse(&files.project)?;
    let builder = CMakeBuilder::new(&ctx.env.cmake);
    let engine  = ctx.engine_dir();
    let env = LinkEnv {
      builder:    &builder,
      input_dir:  &ctx.input_dir,
      host_dir:   &files.project_dir,
      engine_dir: &engine
    };
    let data = link::add_externals(&files.solution, &mut doc, &env, &ctx.config.externals, &camel,
                                   &guid, ctx.dev_platform(), &mut ids)?;

    expand_build_configurations(&mut doc, ctx.config, data.as_ref());
    doc.write(&files.project)?;

    info!("Generated {} with {} source files", files.solution.display(), count);
    Ok(())
  }
}

/// The files copied from the template.
struct ProjectFiles {
  solution:    PathBuf,
  project_dir: PathBuf,
  project:     PathBuf,
  filters:     PathBuf,
  props:       PathBuf
}

fn place_project(templates: &Path, dir: &Path, camel: &str) -> GenResult<ProjectFiles> {
  let solution = dir.join([camel, ".sln"].concat());
  fs::copy(templates.join("__project__.sln"), &solution)?;

  let include = templates.join("include");
  if include.is_dir() {
    util::copy_dir(&include, dir.join("include"))?;
  }

  let project_dir = dir.join(camel);
  util::copy_dir(templates.join("__project__"), &project_dir)?;
  for ext in &[".rc", ".props", ".vcxproj", ".vcxproj.filters"] {
    let from = project_dir.join(["__project__", ext].concat());
    if from.is_file() {
      util::move_path(&from, project_dir.join([camel, ext].concat()))?;
    }
  }

  Ok(ProjectFiles {
    project:  project_dir.join([camel, ".vcxproj"].concat()),
    filters:  project_dir.join([camel, ".vcxproj.filters"].concat()),
    props:    project_dir.join([camel, ".props"].concat()),
    solution, project_dir
  })
}

/// Windows path with a trailing separator, prefixed by `..`.
fn parent_relative(path: &Path) -> String {
  util::path_to_windows(Path::new("..").join(path)) + "\\"
}

fn reassign(ctx: &Context, files: &ProjectFiles, guid: &str) -> GenResult<()> {
  let camel  = ctx.config.camel();
  let engine = parent_relative(&ctx.build_to_engine());
  let subs   = [
    ("__project__",        camel.as_str()),
    ("__BUILD_2_ENGINE__", engine.as_str()),
    (TEMPLATE_GUID,        guid)
  ];
  util::file_replace(&files.solution, &subs)?;
  util::file_replace(&files.project, &subs)?;
  if files.filters.is_file() {
    util::file_replace(&files.filters, &subs)?;
  }

  if files.props.is_file() {
    let root   = parent_relative(&ctx.build_to_root());
    let assets = [root.as_str(), util::path_to_windows(&ctx.config.assets).as_str(), "\\"].concat();
    util::file_replace(&files.props, &subs)?;
    util::file_replace(&files.props, &[("__ROOT_DIR__", root.as_str()), ("__ASSET_DIR__", assets.as_str())])?;
  }
  Ok(())
}

/// Directory of the top of the source tree, relative to the build folder.
fn source_dir(ctx: &Context, sources: &SourceTree) -> String {
  let root = Path::new("..").join(ctx.build_to_root());
  match tree::collapse_root(sources).0 {
    Some(top) => util::path_to_windows(root.join(top)),
    None      => util::path_to_windows(root)
  }
}

/// Line ending used by a template file.
fn line_ending(path: &Path) -> GenResult<&'static str> {
  let text = fs::read_to_string(path)?;
  Ok(match text.contains("\r\n") {
    true  => "\r\n",
    false => "\n"
  })
}

/// Fills the filters and the compiled and included files of the project.
/// Returns the number of files.
fn populate_sources(files: &ProjectFiles, sources: &SourceTree, source_dir: &str, ids: &mut Ids) -> GenResult<usize> {
  let (_, inner) = tree::collapse_root(sources);
  let (root, table) = tree::build_groups(source_dir, inner, ids, Dialect::Windows);

  let has_filters = files.filters.is_file();
  let eol  = line_ending(&files.project)?;
  let feol = match has_filters {
    true  => line_ending(&files.filters)?,
    false => "\n"
  };

  let mut filters = String::new();
  tree::walk_groups(&root, &table, '\\', &mut |path, child| {
    filters.push_str(&format!(concat!("{0}    <Filter Include=\"Source Files\\{1}\">",
                                      "{0}      <UniqueIdentifier>{{{2}}}</UniqueIdentifier>",
                                      "{0}    </Filter>"),
                              feol, escape(path), child.id));
  });

  // Projects sit one folder below the build folder.
  let prefix = ["..\\", source_dir].concat();

  let mut compiled        = String::new();
  let mut included        = String::new();
  let mut filter_compiled = String::new();
  let mut filter_included = String::new();
  let mut count           = 0;
  tree::walk_files(&root, &table, '\\', &mut |dir, path, child| {
    let (item, list, filtered) = match SOURCE_EXT.contains(&tree::extension(&child.name)) {
      true  => ("ClCompile", &mut compiled, &mut filter_compiled),
      false => ("ClInclude", &mut included, &mut filter_included)
    };
    let include = [prefix.as_str(), "\\", path].concat();
    let filter  = match dir.is_empty() {
      true  => "Source Files".to_string(),
      false => ["Source Files\\", dir].concat()
    };
    list.push_str(&format!("    <{} Include=\"{}\" />{}", item, escape(include.as_str()), eol));
    filtered.push_str(&format!("{0}    <{1} Include=\"{2}\">{0}      <Filter>{3}</Filter>{0}    </{1}>",
                               feol, item, escape(include.as_str()), escape(filter.as_str())));
    count += 1;
  });

  if has_filters {
    util::file_replace(&files.filters, &[
      ("__FILTER_ENTRIES__", filters.as_str()),
      ("__SOURCE_ENTRIES__", filter_compiled.as_str()),
      ("__HEADER_ENTRIES__", filter_included.as_str())
    ])?;
  }
  // The project placeholders sit on lines of their own.
  util::file_replace(&files.project, &[
    (["__SOURCE_ENTRIES__", eol].concat().as_str(), compiled.as_str()),
    (["__HEADER_ENTRIES__", eol].concat().as_str(), included.as_str())
  ])?;
  debug!("Added {} filters", table.len().saturating_sub(1));
  Ok(count)
}

/// Project references of the engine modules the application uses, one line
/// per `eol`.
fn engine_modules(ctx: &Context, eol: &str) -> String {
  let engine = util::path_to_windows(ctx.build_to_engine());
  let mut out = String::new();
  for (key, suffix, guid) in MODULES {
    if *key != "core" && !ctx.config.module_enabled(key) {
      continue;
    }
    let name = [ctx.config.engine.as_str(), "-", *suffix].concat();
    out.push_str(&format!(concat!("    <ProjectReference Include=\"..\\..\\{0}\\buildfiles\\windows\\{1}\\{1}.vcxproj\">{3}",
                                  "      <Project>{{{2}}}</Project>{3}",
                                  "    </ProjectReference>{3}"),
                          engine, name, guid, eol));
  }
  out
}

fn join_list(items: &[String]) -> String {
  match items.is_empty() {
    true  => String::new(),
    false => items.join(";") + ";"
  }
}

/// Fills the include, define and dependency placeholders of every build
/// configuration. Module data only goes to the x64 configurations.
fn expand_build_configurations(doc: &mut Document, config: &Config, data: Option<&LinkData>) {
  let local: Vec<String> = config.includes_for(Platform::Windows).iter()
    .map(|i| ["$(GameDir)", util::path_to_windows(i).as_str()].concat())
    .collect();

  for group in doc.root.elements_mut().filter(|e| e.name == "ItemDefinitionGroup") {
    let (kind, arch) = group.attr("Condition")
      .and_then(parse_condition)
      .unwrap_or_default();
    let linked = match arch == LINKED_ARCH {
      true  => data,
      false => None
    };
    let platform = Platform::Windows.as_str();

    let mut includes = local.clone();
    let mut defines  = config.defines_for(Platform::Windows, &kind);
    let mut depends  = Vec::new();
    if let Some(d) = linked {
      includes.extend(d.includes(platform).iter().cloned());
      defines.extend(d.defines(platform, &kind).iter().cloned());
      depends.extend(d.depends(platform, &kind).iter().cloned());
    }

    let fills = [
      (["ClCompile", "AdditionalIncludeDirectories"], "__INCLUDE_DIR__",    join_list(&includes)),
      (["ClCompile", "PreprocessorDefinitions"],      "__ENGINE_DEFINES__", join_list(&defines)),
      (["Link",      "AdditionalDependencies"],       "__ENGINE_DEPENDS__", join_list(&depends))
    ];
    for (path, placeholder, value) in &fills {
      group.for_each_mut(path, &mut |e| {
        let text = e.text().replace(placeholder, value);
        e.set_text(&text);
      });
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ctx::testing::Scratch;
  use crate::sln::Solution;
  use pretty_assertions::assert_eq;

  const SLN:     &str = include_str!("../../tests/fixtures/host.sln");
  const PROJECT: &str = include_str!("../../tests/fixtures/host.vcxproj");
  const FILTERS: &str = include_str!("../../tests/fixtures/host.vcxproj.filters");

  const CONFIG: &str = r#"
[project]
name      = "Rocket Demo"
appid     = "edu.cornell.gdiac.rocket"
targets   = ["windows"]
templates = "templates"

[sources]
all = ["source/**/*.cpp"]

[includes]
all     = ["source"]
windows = ["win/include"]

[defines]
all     = ["GAME=1"]
windows = { debug = ["WIN_DEBUG"] }

[modules]
audio = true
"#;

  fn scratch() -> Scratch {
    let mut s = Scratch::new(CONFIG);
    s.write("templates/windows/__project__.sln", SLN);
    s.write("templates/windows/__project__/__project__.vcxproj", PROJECT);
    s.write("templates/windows/__project__/__project__.vcxproj.filters", FILTERS);
    s.write("templates/windows/__project__/__project__.props",
            "<GameDir>__ROOT_DIR__</GameDir><AssetDir>__ASSET_DIR__</AssetDir><Engine>__BUILD_2_ENGINE__</Engine>");
    s.write("templates/windows/__project__/__project__.rc", "IDI_ICON1 ICON \"__project__.ico\"");
    s.write("templates/windows/include/resource.h", "");

    s.source("source/main.cpp",        Platform::All);
    s.source("source/scenes/Game.cpp", Platform::All);
    s.source("source/scenes/Game.h",   Platform::All);
    s.source("source/mac/View.mm",     Platform::Macos);
    s
  }

  const OUT: &str = "build/windows/RocketDemo/RocketDemo";

  #[test]
  fn places_and_renames_the_template() {
    let s = scratch();
    VisualStudio.run(&s.context()).unwrap();

    let out = s.dir.path().join("build/windows");
    assert!(out.join("include/resource.h").is_file());
    assert!(out.join("RocketDemo/RocketDemo.rc").is_file());
    assert!(!out.join("RocketDemo/__project__.vcxproj").exists());

    let mut ids = Ids::new(s.config.salt());
    let guid = ids.windows("PROJECT:\\\\RocketDemo");
    let sln  = Solution::parse(out.join("RocketDemo.sln")).unwrap();
    let app  = sln.project("RocketDemo").unwrap();
    assert_eq!(app.guid, guid);
    assert_eq!(app.path, "RocketDemo\\RocketDemo.vcxproj");

    assert_eq!(s.read(&[OUT, ".props"].concat()),
               "<GameDir>..\\..\\</GameDir><AssetDir>..\\..\\assets\\</AssetDir><Engine>..\\..\\</Engine>");
  }

  #[test]
  fn lists_sources_and_filters() {
    let s = scratch();
    VisualStudio.run(&s.context()).unwrap();

    let project = s.read(&[OUT, ".vcxproj"].concat());
    assert!(project.contains("<ClCompile Include=\"..\\..\\..\\source\\main.cpp\" />"));
    assert!(project.contains("<ClCompile Include=\"..\\..\\..\\source\\scenes\\Game.cpp\" />"));
    assert!(project.contains("<ClInclude Include=\"..\\..\\..\\source\\scenes\\Game.h\" />"));
    assert!(!project.contains("View.mm"));

    let filters = s.read(&[OUT, ".vcxproj.filters"].concat());
    assert!(filters.contains("<Filter Include=\"Source Files\\scenes\">"));
    assert!(filters.contains("<Filter>Source Files\\scenes</Filter>"));
    assert!(!filters.contains("__"));
  }

  #[test]
  fn references_enabled_engine_modules() {
    let s = scratch();
    VisualStudio.run(&s.context()).unwrap();

    let doc  = Document::parse(s.dir.path().join([OUT, ".vcxproj"].concat())).unwrap();
    let refs: Vec<String> = doc.root.find_all(&["ItemGroup", "ProjectReference"]).iter()
      .filter_map(|r| r.attr("Include").map(String::from))
      .collect();
    assert_eq!(refs, vec![
      "..\\..\\..\\buildfiles\\windows\\cugl-core\\cugl-core.vcxproj",
      "..\\..\\..\\buildfiles\\windows\\cugl-audio\\cugl-audio.vcxproj",
      "..\\..\\..\\buildfiles\\windows\\cugl-graphics\\cugl-graphics.vcxproj"
    ]);
  }

  #[test]
  fn fills_placeholders_with_either_line_ending() {
    for eol in &["\r\n", "\n"] {
      let s = scratch();
      s.write("templates/windows/__project__/__project__.vcxproj", &PROJECT.replace("\r\n", eol));
      VisualStudio.run(&s.context()).unwrap();

      let project = s.read(&[OUT, ".vcxproj"].concat());
      assert!(!project.contains("__SOURCE_ENTRIES__"));
      assert!(!project.contains("__HEADER_ENTRIES__"));
      assert!(!project.contains("__ENGINE_MODULES__"));
      assert!(project.contains("<ClInclude Include=\"..\\..\\..\\source\\scenes\\Game.h\" />"));
      assert!(project.contains("cugl-audio.vcxproj"));
    }
  }

  #[test]
  fn escapes_source_names() {
    let mut s = scratch();
    s.source("source/R&D.cpp", Platform::All);
    VisualStudio.run(&s.context()).unwrap();

    let project = s.read(&[OUT, ".vcxproj"].concat());
    assert!(project.contains("<ClCompile Include=\"..\\..\\..\\source\\R&amp;D.cpp\" />"));
    let filters = s.read(&[OUT, ".vcxproj.filters"].concat());
    assert!(filters.contains("source\\R&amp;D.cpp\">"));
    assert!(!filters.contains("R&D"));
  }

  fn setting<'a>(doc: &'a Document, condition: &str, path: &[&str]) -> &'a str {
    doc.root.children("ItemDefinitionGroup")
      .find(|g| g.attr("Condition").map_or(false, |c| c.ends_with(condition)))
      .and_then(|g| g.find_all(path).into_iter().next())
      .map(|e| e.text())
      .unwrap()
  }

  #[test]
  fn fills_build_configurations() {
    let s = scratch();
    VisualStudio.run(&s.context()).unwrap();
    let doc = Document::parse(s.dir.path().join([OUT, ".vcxproj"].concat())).unwrap();

    assert_eq!(setting(&doc, "'Debug|x64'", &["ClCompile", "AdditionalIncludeDirectories"]),
               "$(GameDir)source;$(GameDir)win\\include;%(AdditionalIncludeDirectories)");
    assert_eq!(setting(&doc, "'Debug|Win32'", &["ClCompile", "PreprocessorDefinitions"]),
               "_DEBUG;_CONSOLE;GAME=1;WIN_DEBUG;%(PreprocessorDefinitions)");
    assert_eq!(setting(&doc, "'Release|x64'", &["ClCompile", "PreprocessorDefinitions"]),
               "NDEBUG;_CONSOLE;GAME=1;%(PreprocessorDefinitions)");
    assert_eq!(setting(&doc, "'Release|x64'", &["Link", "AdditionalDependencies"]),
               "%(AdditionalDependencies)");
  }

  #[test]
  fn module_data_only_reaches_x64() {
    let s = scratch();
    let mut doc = Document::parse_str(PROJECT, Path::new("host.vcxproj")).unwrap();
    let mut data = LinkData::default();
    data.add_includes("windows", vec!["C:\\box2d\\include".to_string()]);
    data.add_defines("windows", "debug", vec!["B2_DEBUG".to_string()]);
    data.add_depends("windows", "debug", vec!["lib\\Debug\\box2d.lib".to_string()]);

    expand_build_configurations(&mut doc, &s.config, Some(&data));
    assert_eq!(setting(&doc, "'Debug|x64'", &["Link", "AdditionalDependencies"]),
               "lib\\Debug\\box2d.lib;%(AdditionalDependencies)");
    assert_eq!(setting(&doc, "'Debug|x64'", &["ClCompile", "PreprocessorDefinitions"]),
               "_DEBUG;_CONSOLE;GAME=1;WIN_DEBUG;B2_DEBUG;%(PreprocessorDefinitions)");
    assert_eq!(setting(&doc, "'Debug|Win32'", &["Link", "AdditionalDependencies"]),
               "%(AdditionalDependencies)");
    assert!(!setting(&doc, "'Debug|Win32'", &["ClCompile", "AdditionalIncludeDirectories"]).contains("box2d"));
  }

  #[test]
  fn skips_unselected_projects() {
    let mut s = scratch();
    s.select(&["android"]);
    VisualStudio.run(&s.context()).unwrap();
    assert!(!s.dir.path().join("build/windows").exists());
  }
}
