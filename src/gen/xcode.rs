//! Project generator for XCode.
//!
//! The application template holds a single project with a macOS and an iOS
//! native target. Generation copies it into `<build>/apple`, then edits the
//! copied `project.pbxproj` object by object:
//!
//! - placeholders get the display name, bundle identifiers and the paths of
//!   the sources, assets and engine as seen from the project directory
//! - the template targets are renamed after the short project name
//! - every top-level entry of the assets folder becomes a resource of both
//!   targets, folders by reference
//! - the source tree becomes nested groups under `Source`, and the files
//!   with a compiled extension are added to the targets they are tagged for
//! - disabled engine modules are unlinked and external modules linked in
//! - header paths and defines are expanded per target and build type
//!
//! The shared schemes live next to the project file and are renamed along
//! with the targets.

use log::{debug, info, warn};
use std::fs;
use std::path::Path;

use crate::ctx::{Config, Context, Generator, RunResult};
use crate::error::GenResult;
use crate::ids::{Dialect, Ids, Role};
use crate::link::apple::{self, AppleTarget};
use crate::link::{CMakeBuilder, LinkData, LinkEnv};
use crate::orientation::Orientation;
use crate::pbx::{quote, strip_comment, Block, PbxProject};
use crate::tree::{self, Category, Platform, SourceTree};
use crate::util;

pub const SOURCE_EXT: &[&str] = &[".cpp", ".c", ".cc", ".cxx", ".m", ".mm", ".asm", ".asmx", ".swift"];

const TARGETS: [AppleTarget; 2] = [AppleTarget::Macos, AppleTarget::Ios];

/// Engine library suffix of each feature module.
const MODULES: &[(&str, &str)] = &[
  ("audio",             "audio"),
  ("graphics",          "graphics"),
  ("scene2",            "scene2"),
  ("scene3",            "scene3"),
  ("physics2",          "physics2"),
  ("netcode",           "netcode"),
  ("physics2::distrib", "distrib-physics2")
];

const INDENT:      &str = "\t\t";
const LIST_INDENT: &str = "\t\t\t\t";
const SET_INDENT:  &str = "\t\t\t\t\t";

pub struct XCode;

impl Generator for XCode {
  fn supports_target(&self, t: Platform) -> bool {
    match t {
      Platform::Apple | Platform::Macos | Platform::Ios => true,
      _                                                 => false
    }
  }

  fn run(&self, ctx: &Context) -> RunResult {
    let targets: Vec<AppleTarget> = TARGETS.iter().cloned()
      .filter(|t| ctx.is_selected(t.platform()))
      .collect();
    if targets.is_empty() {
      return Ok(());
    }

    let dir       = ctx.build_dir.join("apple");
    let templates = ctx.templates().join("apple");
    let camel     = ctx.config.camel();
    util::remake_dir(&dir)?;

    let project = dir.join([camel.as_str(), ".xcodeproj"].concat());
    util::copy_dir(templates.join("app.xcodeproj"), &project)?;
    let resources = templates.join("Resources");
    if resources.is_dir() {
      util::copy_dir(&resources, dir.join("Resources"))?;
    }

    let pbx_path = project.join("project.pbxproj");
    let mut pbx  = PbxProject::parse(&pbx_path)?;
    let mut ids  = Ids::new(ctx.config.salt());

    let sources = tree::filtered(ctx.sources, &|p: Platform| p.in_macos() || p.in_ios());
    let layout  = Layout::new(ctx, &sources);

    reassign(&mut pbx, ctx.config, &layout);
    assign_orientation(&mut pbx, ctx.config.orientation);
    let assets = populate_assets(&mut pbx, &ctx.input_dir.join(&ctx.config.assets), &mut ids)?;
    let files  = populate_sources(&mut pbx, &sources, &layout.source, &mut ids);
    filter_modules(&mut pbx, ctx.config);

    let builder = CMakeBuilder::new(&ctx.env.cmake);
    let engine  = ctx.engine_dir();
    let env = LinkEnv {
      builder:    &builder,
      input_dir:  &ctx.input_dir,
      host_dir:   &dir,
      engine_dir: &engine
    };
    let data = apple::add_externals(&mut pbx, &env, &ctx.config.externals, &targets,
                                    ctx.dev_platform(), &mut ids)?;

    expand_includes(&mut pbx, ctx.config, &layout.root, &data);
    expand_defines(&mut pbx, ctx.config, &data);
    filter_targets(&mut pbx, &targets);
    pbx.write(&pbx_path)?;

    update_schemes(&project, ctx.config, &targets)?;

    info!("Generated {} with {} assets and {} source files", project.display(), assets, files);
    Ok(())
  }
}

/// Paths of the project inputs, relative to the project directory.
struct Layout {
  root:      String,
  source:    String,
  assets:    String,
  framework: String
}

impl Layout {
  fn new(ctx: &Context, sources: &SourceTree) -> Self {
    let root   = Path::new("..").join(ctx.build_to_root());
    let source = match tree::collapse_root(sources).0 {
      Some(top) => root.join(top),
      None      => root.clone()
    };
    Layout {
      source:    util::path_to_posix(&source),
      assets:    util::path_to_posix(root.join(&ctx.config.assets)),
      framework: util::path_to_posix(Path::new("..").join(ctx.build_to_engine()).join("buildfiles").join("apple")),
      root:      util::path_to_posix(&root)
    }
  }
}

/// Inserts the platform before the last segment of a bundle identifier.
fn platform_id(appid: &str, platform: &str) -> String {
  match appid.rfind('.') {
    Some(p) => [&appid[..p], ".", platform, &appid[p..]].concat(),
    None    => [platform, ".", appid].concat()
  }
}

fn target_name(config: &Config, target: AppleTarget) -> String {
  [config.short().to_lowercase().as_str(), target.suffix()].concat()
}

fn reassign(pbx: &mut PbxProject, config: &Config, layout: &Layout) {
  pbx.substitute("__SOURCE_DIR__",    &quote(&layout.source));
  pbx.substitute("__ASSET_DIR__",     &quote(&layout.assets));
  pbx.substitute("__FRAMEWORK_DIR__", &quote(&layout.framework));
  pbx.substitute("__MAC_APP_ID__",    &quote(&platform_id(&config.appid, "mac")));
  pbx.substitute("__IOS_APP_ID__",    &quote(&platform_id(&config.appid, "ios")));

  let mac = target_name(config, AppleTarget::Macos);
  let ios = target_name(config, AppleTarget::Ios);
  for section in &["PBXProject", "XCConfigurationList", "PBXNativeTarget"] {
    if pbx.section(section).is_none() {
      continue;
    }
    for block in &mut pbx.section_mut(section).blocks {
      block.substitute("app-mac", &mac);
      block.substitute("app-ios", &ios);
    }
  }

  pbx.substitute("__DISPLAY_NAME__", &config.name.replace('\\', "\\\\").replace('"', "\\\""));
}

fn assign_orientation(pbx: &mut PbxProject, orientation: Orientation) {
  if pbx.section("XCBuildConfiguration").is_none() {
    return;
  }
  let keys = [
    "INFOPLIST_KEY_UISupportedInterfaceOrientations",
    "INFOPLIST_KEY_UISupportedInterfaceOrientations_iPad",
    "INFOPLIST_KEY_UISupportedInterfaceOrientations_iPhone"
  ];
  for block in &mut pbx.section_mut("XCBuildConfiguration").blocks {
    for key in &keys {
      if block.has_setting(key) {
        block.set_setting(key, orientation.apple());
      }
    }
    if orientation.is_portrait() {
      for key in &["INFOPLIST_KEY_UILaunchStoryboardName", "INFOPLIST_KEY_UIMainStoryboardFile"] {
        if block.has_setting(key) {
          block.set_setting(key, "Portrait");
        }
      }
    }
  }
}

/// Identifier of the group whose comment is `name`.
fn group_named(pbx: &PbxProject, name: &str) -> Option<String> {
  pbx.blocks("PBXGroup").iter()
    .find(|b| b.comment() == Some(name))
    .map(|b| b.id().to_string())
}

/// Appends `entries` to the build phase of `target` with the given `isa`.
fn push_to_phase(pbx: &mut PbxProject, target: AppleTarget, isa: &str, entries: &[String]) {
  match apple::build_phase(pbx, target.id(), isa) {
    None        => debug!("No {} in {}", isa, target.dir()),
    Some(phase) => if let Some(block) = pbx.find_mut(&phase) {
      block.push_into_list("files", entries);
    }
  }
}

fn push_to_group(pbx: &mut PbxProject, name: &str, entries: &[String]) {
  match group_named(pbx, name) {
    None        => warn!("The template has no {} group", name),
    Some(group) => if let Some(block) = pbx.find_mut(&group) {
      block.push_into_list("children", entries);
    }
  }
}

fn build_file(pbx: &mut PbxProject, id: &str, file: &str, name: &str, phase: &str) -> String {
  let comment  = [name, " in ", phase].concat();
  let file_ref = [file, " /* ", name, " */"].concat();
  pbx.add("PBXBuildFile", Block::inline(INDENT, id, &comment, &[
    ("isa",     "PBXBuildFile"),
    ("fileRef", file_ref.as_str())
  ]));
  [id, " /* ", comment.as_str(), " */"].concat()
}

/// Adds every top-level entry of the assets folder as a resource of both
/// targets. Returns how many were added.
fn populate_assets(pbx: &mut PbxProject, assets: &Path, ids: &mut Ids) -> GenResult<usize> {
  if !assets.is_dir() {
    warn!("Asset folder {} does not exist", assets.display());
    return Ok(0);
  }

  let mut entries = Vec::new();
  for entry in fs::read_dir(assets)? {
    let entry = entry?;
    let name  = entry.file_name().to_string_lossy().into_owned();
    if !name.starts_with('.') {
      entries.push((name, entry.file_type()?.is_dir()));
    }
  }
  entries.sort();

  let mut children = Vec::new();
  let mut mac      = Vec::new();
  let mut ios      = Vec::new();
  for (name, is_dir) in &entries {
    let id   = ids.tagged(Dialect::Apple, Role::Asset, &Dialect::Apple.key("ASSET", name));
    let path = quote(name);
    let block = match *is_dir {
      true  => Block::inline(INDENT, &id, name, &[
        ("isa",               "PBXFileReference"),
        ("lastKnownFileType", "folder"),
        ("path",              path.as_str()),
        ("sourceTree",        "\"<group>\"")
      ]),
      false => Block::inline(INDENT, &id, name, &[
        ("isa",        "PBXFileReference"),
        ("path",       path.as_str()),
        ("sourceTree", "\"<group>\"")
      ])
    };
    pbx.add("PBXFileReference", block);
    children.push([id.as_str(), " /* ", name.as_str(), " */"].concat());

    let mac_id = ids.tagged(Dialect::Apple, Role::AssetBuildMac, &Dialect::Apple.key("MACOS", &id));
    mac.push(build_file(pbx, &mac_id, &id, name, "Resources"));
    let ios_id = ids.tagged(Dialect::Apple, Role::AssetBuildIos, &Dialect::Apple.key("IOS", &id));
    ios.push(build_file(pbx, &ios_id, &id, name, "Resources"));
  }

  push_to_group(pbx, "Assets", &children);
  push_to_phase(pbx, AppleTarget::Macos, "PBXResourcesBuildPhase", &mac);
  push_to_phase(pbx, AppleTarget::Ios,   "PBXResourcesBuildPhase", &ios);
  Ok(entries.len())
}

fn list_value(entries: &[String]) -> String {
  let mut out = String::from("(\n");
  for e in entries {
    out.push_str(LIST_INDENT);
    out.push_str(e);
    out.push_str(",\n");
  }
  out.push_str("\t\t\t)");
  out
}

/// Adds the source tree as groups under `Source` and its compiled files to
/// the targets they are tagged for. Returns the number of files.
fn populate_sources(pbx: &mut PbxProject, sources: &SourceTree, source_dir: &str, ids: &mut Ids) -> usize {
  let (_, inner) = tree::collapse_root(sources);
  let (root, table) = tree::build_groups(source_dir, inner, ids, Dialect::Apple);

  let mut files = Vec::new();
  for (id, group) in &table {
    let entries: Vec<String> = group.children.iter()
      .map(|c| [c.id.as_str(), " /* ", c.name.as_str(), " */"].concat())
      .collect();
    for c in &group.children {
      if let Category::File(platform) = c.category {
        files.push((c.id.clone(), c.name.clone(), platform));
      }
    }

    match id == &root {
      true  => push_to_group(pbx, "Source", &entries),
      false => pbx.add("PBXGroup", Block::multiline(INDENT, id, &group.name, &[
        ("isa",        "PBXGroup".to_string()),
        ("children",   list_value(&entries)),
        ("path",       quote(&group.name)),
        ("sourceTree", "\"<group>\"".to_string())
      ]))
    }
  }

  let mut mac = Vec::new();
  let mut ios = Vec::new();
  for (id, name, platform) in &files {
    let path = quote(name);
    pbx.add("PBXFileReference", Block::inline(INDENT, id, name, &[
      ("isa",          "PBXFileReference"),
      ("fileEncoding", "4"),
      ("path",         path.as_str()),
      ("sourceTree",   "\"<group>\"")
    ]));

    if !SOURCE_EXT.contains(&tree::extension(name)) {
      continue;
    }
    if platform.in_macos() {
      let build = ids.tagged(Dialect::Apple, Role::SourceBuildMac, &Dialect::Apple.key("MACOS", id));
      mac.push(build_file(pbx, &build, id, name, "Sources"));
    }
    if platform.in_ios() {
      let build = ids.tagged(Dialect::Apple, Role::SourceBuildIos, &Dialect::Apple.key("IOS", id));
      ios.push(build_file(pbx, &build, id, name, "Sources"));
    }
  }

  push_to_phase(pbx, AppleTarget::Macos, "PBXSourcesBuildPhase", &mac);
  push_to_phase(pbx, AppleTarget::Ios,   "PBXSourcesBuildPhase", &ios);
  debug!("Added {} groups, {} macOS and {} iOS sources", table.len(), mac.len(), ios.len());
  files.len()
}

/// Unlinks the engine libraries of disabled feature modules. Only macOS
/// links a separate graphics library.
fn filter_modules(pbx: &mut PbxProject, config: &Config) {
  for &target in &TARGETS {
    let libs: Vec<String> = MODULES.iter()
      .filter(|(key, _)| !config.module_enabled(key))
      .filter(|(key, _)| target == AppleTarget::Macos || *key != "graphics")
      .map(|(_, lib)| ["lib", config.engine.as_str(), "-", *lib, ".a"].concat())
      .collect();
    if libs.is_empty() {
      continue;
    }

    let phase = match apple::frameworks_phase(pbx, target.id()) {
      None    => continue,
      Some(p) => p
    };
    if let Some(block) = pbx.find_mut(&phase) {
      let removed = block.remove_list_items("files", |item| libs.iter().any(|l| item.contains(l.as_str())));
      debug!("Unlinked {} engine modules from {}", removed, target.dir());
    }
  }
}

/// Setting lines for a header path list, sorted without duplicates.
fn include_lines(mut paths: Vec<String>) -> String {
  paths.sort();
  paths.dedup();
  paths.iter().map(|p| [SET_INDENT, p.as_str(), ",\n"].concat()).collect()
}

fn expand_includes(pbx: &mut PbxProject, config: &Config, root: &str, data: &LinkData) {
  let local = |platforms: &[Platform]| -> Vec<String> {
    platforms.iter()
      .filter_map(|p| config.includes.get(p))
      .flatten()
      .map(|i| quote_setting(&util::path_to_posix(Path::new("$(SRCROOT)").join(root).join(i))))
      .collect()
  };
  let linked = |target: AppleTarget| -> Vec<String> {
    data.includes(target.dir()).iter().map(|i| quote_setting(i)).collect()
  };

  let apple = include_lines(local(&[Platform::All, Platform::Apple]));
  let mut mac = local(&[Platform::Macos]);
  mac.extend(linked(AppleTarget::Macos));
  let mut ios = local(&[Platform::Ios]);
  ios.extend(linked(AppleTarget::Ios));

  pbx.substitute(&[SET_INDENT, "__APPLE_INCLUDE__,\n"].concat(), &apple);
  pbx.substitute(&[SET_INDENT, "__MACOS_INCLUDE__,\n"].concat(), &include_lines(mac));
  pbx.substitute(&[SET_INDENT, "__IOS_INCLUDE__,\n"].concat(),   &include_lines(ios));
}

fn quote_setting(value: &str) -> String {
  ["\"", value.replace('"', "\\\"").as_str(), "\""].concat()
}

/// Fills the defines placeholder of each build configuration. The project
/// configurations get the defines shared by both platforms, the target
/// configurations their own and those of linked modules.
fn expand_defines(pbx: &mut PbxProject, config: &Config, data: &LinkData) {
  let placeholder = [SET_INDENT, "__EXTRA_DEFINES__,\n"].concat();

  let root = match pbx.root() {
    None    => return,
    Some(r) => r.id().to_string()
  };
  let mut owners = vec![(root, vec![Platform::All, Platform::Apple], None)];
  for &target in &TARGETS {
    owners.push((target.id().to_string(), vec![target.platform()], Some(target)));
  }

  for (owner, platforms, target) in owners {
    for (id, build) in apple::build_configs(pbx, &owner) {
      let mut defines: Vec<String> = platforms.iter()
        .filter_map(|p| config.defines.get(p))
        .flat_map(|d| d.for_build(&build))
        .collect();
      if let Some(t) = target {
        defines.extend(data.defines(t.dir(), &build).iter().cloned());
      }

      let lines: String = defines.iter()
        .map(|d| [SET_INDENT, quote_setting(d).as_str(), ",\n"].concat())
        .collect();
      if let Some(block) = pbx.find_mut(&id) {
        block.substitute(&placeholder, &lines);
      }
    }
  }
  pbx.substitute(&placeholder, "");
}

/// Removes the native targets that were not selected, along with the objects
/// only they refer to.
fn filter_targets(pbx: &mut PbxProject, targets: &[AppleTarget]) {
  for &target in TARGETS.iter().filter(|t| !targets.contains(t)) {
    if let Some(block) = pbx.remove(target.id()) {
      let owned = owned_objects(pbx, &block);
      for id in &owned {
        pbx.remove(id);
      }
      debug!("Removed {} objects of the {} target", owned.len(), target.dir());
    }
    if let Some(root) = pbx.root_mut() {
      root.remove_list_items("targets", |item| item.starts_with(target.id()));
    }
    info!("Removed the {} target", target.dir());
  }
}

/// Build phases and their build files, the configuration list and its
/// configurations, and the product of a native target. The product is also
/// taken out of the groups listing it.
fn owned_objects(pbx: &mut PbxProject, target: &Block) -> Vec<String> {
  let mut owned = Vec::new();
  for phase in target.list_ids("buildPhases") {
    if let Some(block) = pbx.find(&phase) {
      owned.extend(block.list_ids("files"));
    }
    owned.push(phase);
  }

  if let Some(list) = target.field("buildConfigurationList").map(|v| strip_comment(v).to_string()) {
    if let Some(block) = pbx.find(&list) {
      owned.extend(block.list_ids("buildConfigurations"));
    }
    owned.push(list);
  }

  if let Some(product) = target.field("productReference").map(|v| strip_comment(v).to_string()) {
    for group in pbx.section_mut("PBXGroup").blocks.iter_mut() {
      group.remove_list_items("children", |item| strip_comment(item) == product);
    }
    owned.push(product);
  }
  owned
}

fn update_schemes(project: &Path, config: &Config, targets: &[AppleTarget]) -> GenResult<()> {
  let dir = project.join("xcshareddata").join("xcschemes");
  if !dir.is_dir() {
    debug!("No shared schemes in {}", project.display());
    return Ok(());
  }

  let mac = target_name(config, AppleTarget::Macos);
  let ios = target_name(config, AppleTarget::Ios);

  let management = dir.join("xcschememanagement.plist");
  if management.is_file() {
    util::file_replace(&management, &[
      ("app-mac",          mac.as_str()),
      ("app-ios",          ios.as_str()),
      ("__DISPLAY_NAME__", config.name.as_str())
    ])?;
  }

  let container = ["container:", config.camel().as_str(), ".xcodeproj"].concat();
  for &target in &TARGETS {
    let template = ["app", target.suffix()].concat();
    let src = dir.join([template.as_str(), ".xcscheme"].concat());
    if !src.is_file() {
      continue;
    }

    match targets.contains(&target) {
      false => fs::remove_file(&src)?,
      true  => {
        let name = target_name(config, target);
        let dst  = dir.join([name.as_str(), ".xcscheme"].concat());
        util::move_path(&src, &dst)?;
        util::file_replace(&dst, &[
          (template.as_str(),         name.as_str()),
          ("container:app.xcodeproj", container.as_str())
        ])?;
      }
    }
  }
  Ok(())
}
