//! Linking of CMake generated Xcode projects.
//!
//! Modules are generated once per platform under `macos/<name>` and
//! `ios/<name>` next to the host project. Each generated project is renamed
//! with the platform suffix, its library targets are renamed the same way so
//! that both variants can be referenced by the host, and the host gains:
//!
//! - a file reference to the module project, listed in the engine group
//! - a `projectReferences` entry with a products group
//! - one container proxy, reference proxy and build file per library
//! - the libraries in the Frameworks phase of the matching target
//! - the system frameworks the module's CMake cache resolved

use log::{debug, info, warn};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use crate::ctx::External;
use crate::error::{GenError, GenResult};
use crate::ids::{Dialect, Ids, Role};
use crate::link::{single_project, LinkData, LinkEnv};
use crate::pbx::{quote, strip_comment, Block, PbxProject};
use crate::tree::Platform;
use crate::util::{self, DevPlatform};

pub const MAC_TARGET: &str = "EB0F3C9527FB9DCB0037CC66";
pub const IOS_TARGET: &str = "EBC7AEC127FBB41F001F1467";

const INDENT: &str = "\t\t";

/// The native targets of the application template.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AppleTarget {
  Macos,
  Ios
}

impl AppleTarget {
  pub fn id(self) -> &'static str {
    match self {
      AppleTarget::Macos => MAC_TARGET,
      AppleTarget::Ios   => IOS_TARGET
    }
  }

  /// Name of the per-platform directories and framework groups.
  pub fn dir(self) -> &'static str {
    match self {
      AppleTarget::Macos => "macos",
      AppleTarget::Ios   => "ios"
    }
  }

  pub fn suffix(self) -> &'static str {
    match self {
      AppleTarget::Macos => "-mac",
      AppleTarget::Ios   => "-ios"
    }
  }

  pub fn platform(self) -> Platform {
    match self {
      AppleTarget::Macos => Platform::Macos,
      AppleTarget::Ios   => Platform::Ios
    }
  }

  /// CMake arguments generating an Xcode project for this platform.
  pub fn cmake_args(self, engine_dir: &Path) -> Vec<String> {
    let mut args = match self {
      AppleTarget::Macos => vec!["-DCMAKE_OSX_DEPLOYMENT_TARGET=12.1".to_string()],
      AppleTarget::Ios   => vec![
        format!("-DCMAKE_TOOLCHAIN_FILE={}",
                util::path_to_posix(engine_dir.join("tools").join("ios.toolchain.cmake"))),
        "-DPLATFORM=OS64COMBINED".to_string(),
        "-DDEPLOYMENT_TARGET=13.1".to_string()
      ]
    };
    args.push("-G".into());
    args.push("Xcode".into());
    args
  }
}

/// A library of a module project, as seen from the host.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkTarget {
  /// Target name, with the platform suffix.
  pub name:       String,
  /// Library file name, with the platform suffix.
  pub path:       String,
  pub build_file: String,
  pub proxy:      String,
  pub container:  String,
  /// Identifier of the library product inside the module project.
  pub external:   String
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModuleLink {
  pub name:       String,
  /// File name of the module project.
  pub file:       String,
  /// Module project path, relative to the host project directory.
  pub path:       String,
  pub project:    String,
  pub products:   String,
  pub targets:    Vec<LinkTarget>,
  /// Framework name to SDK relative path.
  pub frameworks: BTreeMap<String, String>
}

/// Native targets needed by `roots`, the roots first, followed by every
/// native target they depend on.
pub fn discover_targets(pbx: &PbxProject, module: &str, roots: &[String]) -> GenResult<Vec<String>> {
  let natives = pbx.blocks("PBXNativeTarget");
  let mut found = Vec::new();
  let mut seen  = HashSet::new();

  for root in roots {
    let id = natives.iter()
      .find(|b| b.field_value("name").as_deref() == Some(root.as_str()))
      .map(|b| b.id().to_string())
      .ok_or_else(|| GenError::link(module, root))?;
    visit(pbx, &id, &mut seen, &mut found);
  }
  Ok(found)
}

fn visit(pbx: &PbxProject, id: &str, seen: &mut HashSet<String>, found: &mut Vec<String>) {
  if !seen.insert(id.to_string()) {
    return;
  }
  let block = match pbx.section("PBXNativeTarget").and_then(|s| s.find(id)) {
    None    => return,
    Some(b) => b
  };
  if is_check_target(block) {
    return;
  }
  found.push(id.to_string());

  for dep in block.list_ids("dependencies") {
    let target = pbx.find(&dep).and_then(|d| d.field_value("target"));
    if let Some(target) = target {
      visit(pbx, &target, seen, found);
    }
  }
}

fn is_check_target(block: &Block) -> bool {
  match block.field_value("name").as_deref() {
    Some("ZERO_CHECK") | Some("ALL_BUILD") => true,
    _                                      => false
  }
}

/// Build configurations of an object with a `buildConfigurationList`, with
/// their lowercase names.
pub fn build_configs(pbx: &PbxProject, id: &str) -> Vec<(String, String)> {
  let list = pbx.find(id)
    .and_then(|b| b.field("buildConfigurationList"))
    .map(|v| strip_comment(v).to_string());

  let list = match list.and_then(|l| pbx.find(&l)) {
    None    => return Vec::new(),
    Some(l) => l.list_ids("buildConfigurations")
  };

  list.into_iter()
    .filter_map(|c| {
      let name = pbx.find(&c)?.field_value("name")?;
      Some((c, name.to_lowercase()))
    })
    .collect()
}

/// Reads the header paths and defines of `targets` into `data`. Header
/// paths are rebased from the module project directory onto the host's.
pub fn extract_link_data(pbx: &PbxProject, targets: &[String], module_dir: &Path, host_dir: &Path,
                         platform: Platform, data: &mut LinkData)
{
  for target in targets {
    for (config, build) in build_configs(pbx, target) {
      let block = match pbx.find(&config) {
        None    => continue,
        Some(b) => b
      };

      let includes = block.setting("HEADER_SEARCH_PATHS").into_iter()
        .filter(|p| p != "$(inherited)")
        .map(|p| rebase(&p, module_dir, host_dir));
      data.add_includes(platform.as_str(), includes);

      let defines = block.setting("GCC_PREPROCESSOR_DEFINITIONS").into_iter()
        .filter(|d| d != "$(inherited)" && !d.contains("CMAKE_INTDIR"));
      data.add_defines(platform.as_str(), &build, defines);
    }
  }
}

fn rebase(include: &str, module_dir: &Path, host_dir: &Path) -> String {
  let abs = match include.strip_prefix("$(SRCROOT)/") {
    Some(rest)                               => module_dir.join(rest),
    None if Path::new(include).is_absolute() => Path::new(include).to_path_buf(),
    None                                     => return include.to_string()
  };
  format!("$(SRCROOT)/{}", util::path_to_posix(util::relative(abs, host_dir)))
}

/// Renames the static libraries of `targets` with the platform suffix and
/// allocates the identifiers the host needs to reference them.
pub fn rename_targets(pbx: &mut PbxProject, targets: &[String], target: AppleTarget,
                      ids: &mut Ids) -> Vec<LinkTarget>
{
  let suffix = target.suffix();
  let mut out = Vec::with_capacity(targets.len());

  for id in targets {
    let (name, product) = match pbx.find(id) {
      None    => continue,
      Some(b) => match (b.field_value("name"), b.field("productReference")) {
        (Some(n), Some(p)) => (n, strip_comment(p).to_string()),
        _                  => continue
      }
    };
    let path = match pbx.find(&product).and_then(|b| b.field_value("path")) {
      Some(p) if p.ends_with(".a") => p,
      _ => {
        warn!("Target {} of {} is not a static library", name, pbx.path.display());
        continue;
      }
    };

    let new_name = [name.as_str(), suffix].concat();
    let new_path = [&path[..path.len() - 2], suffix, ".a"].concat();

    if let Some(file) = pbx.find_mut(&product) {
      file.substitute(&path, &new_path);
    }
    if let Some(section) = pbx.section("PBXGroup") {
      let groups: Vec<String> = section.blocks.iter()
        .filter(|g| g.contains(&product))
        .map(|g| g.id().to_string())
        .collect();
      for g in groups {
        if let Some(group) = pbx.find_mut(&g) {
          group.substitute(&format!("/* {} */", path), &format!("/* {} */", new_path));
        }
      }
    }
    if let Some(native) = pbx.find_mut(id) {
      native.substitute(&format!("{} /* {} */", id, name), &format!("{} /* {} */", id, new_name));
      native.substitute(&format!("/* {} */", path), &format!("/* {} */", new_path));
      native.set_field("name", &quote(&new_name));
      native.set_field("productName", &quote(&new_name));
    }
    for (config, _) in build_configs(pbx, id) {
      if let Some(c) = pbx.find_mut(&config) {
        c.set_setting("PRODUCT_NAME", &quote(&new_name));
      }
    }
    debug!("Renamed {} to {}", path, new_path);

    out.push(LinkTarget {
      build_file: ids.tagged(Dialect::Apple, Role::Library,        &Dialect::Apple.key("LIBRARY", &new_name)),
      proxy:      ids.tagged(Dialect::Apple, Role::ReferenceProxy, &Dialect::Apple.key("PROXY", &new_name)),
      container:  ids.tagged(Dialect::Apple, Role::ContainerProxy, &Dialect::Apple.key("CONTAINER", &new_name)),
      external:   product,
      name:       new_name,
      path:       new_path
    });
  }
  out
}

/// Frameworks resolved by CMake, read from the "Path to a library" entries
/// of a `CMakeCache.txt`. Paths are made relative to the developer directory.
pub fn read_frameworks(cache: &str) -> BTreeMap<String, String> {
  let mut out   = BTreeMap::new();
  let mut lines = cache.lines();
  while let Some(line) = lines.next() {
    if !line.contains("Path to a library") {
      continue;
    }
    let entry = match lines.next() {
      None    => break,
      Some(e) => e.trim()
    };
    if entry.contains("NOTFOUND") {
      continue;
    }
    let value = match entry.find("FILEPATH=") {
      None    => continue,
      Some(p) => &entry[p + "FILEPATH=".len()..]
    };
    let path = match value.find("Developer/") {
      None    => value,
      Some(p) => &value[p + "Developer/".len()..]
    };
    let name = path.rsplit('/').next().unwrap_or(path);
    if !name.is_empty() {
      out.insert(name.to_string(), path.to_string());
    }
  }
  out
}

/// Identifier of the build phase of a native target with the given `isa`.
pub fn build_phase(pbx: &PbxProject, target: &str, isa: &str) -> Option<String> {
  pbx.find(target)?
    .list_ids("buildPhases")
    .into_iter()
    .find(|p| pbx.find(p).and_then(|b| b.isa()) == Some(isa))
}

pub fn frameworks_phase(pbx: &PbxProject, target: &str) -> Option<String> {
  build_phase(pbx, target, "PBXFrameworksBuildPhase")
}

/// Splices the module project and its libraries into the host. Libraries
/// are only linked into `target`.
pub fn link_module(host: &mut PbxProject, link: &ModuleLink, target: AppleTarget) {
  let file_type = quote("wrapper.pb-project");
  let name      = quote(&link.file);
  let path      = quote(&link.path);
  host.add("PBXFileReference", Block::inline(INDENT, &link.project, &link.file, &[
    ("isa",               "PBXFileReference"),
    ("lastKnownFileType", &file_type),
    ("name",              &name),
    ("path",              &path),
    ("sourceTree",        "SOURCE_ROOT")
  ]));

  let entry = format!("{} /* {} */", link.project, link.file);
  match engine_group(host) {
    Some(group) => if let Some(g) = host.find_mut(&group) {
      g.push_into_list("children", &[entry]);
    },
    None => warn!("No group to list {} in", link.file)
  }

  let reference = format!("{{\n\t\t\t\t\tProductGroup = {} /* Products */;\n\t\t\t\t\tProjectRef = {} /* {} */;\n\t\t\t\t}}",
                          link.products, link.project, link.file);
  if let Some(root) = host.root_mut() {
    if !root.push_into_list("projectReferences", &[reference.clone()]) {
      root.set_field("projectReferences", &format!("(\n\t\t\t\t{},\n\t\t\t)", reference));
    }
  }

  let portal   = format!("{} /* {} */", link.project, link.file);
  let mut products = String::from("(\n");
  let mut linked   = Vec::with_capacity(link.targets.len());
  for t in &link.targets {
    host.add("PBXContainerItemProxy", Block::multiline(INDENT, &t.container, "PBXContainerItemProxy", &[
      ("isa",                  "PBXContainerItemProxy".into()),
      ("containerPortal",      portal.clone()),
      ("proxyType",            "2".into()),
      ("remoteGlobalIDString", t.external.clone()),
      ("remoteInfo",           format!("\"{}\"", t.name))
    ]));
    host.add("PBXReferenceProxy", Block::multiline(INDENT, &t.proxy, &t.path, &[
      ("isa",        "PBXReferenceProxy".into()),
      ("fileType",   "archive.ar".into()),
      ("path",       format!("\"{}\"", t.path)),
      ("remoteRef",  format!("{} /* PBXContainerItemProxy */", t.container)),
      ("sourceTree", "BUILT_PRODUCTS_DIR".into())
    ]));

    let file_ref = format!("{} /* {} */", t.proxy, t.path);
    host.add("PBXBuildFile", Block::inline(INDENT, &t.build_file, &format!("{} in Frameworks", t.path), &[
      ("isa",     "PBXBuildFile"),
      ("fileRef", &file_ref)
    ]));

    products.push_str(&format!("\t\t\t\t{},\n", file_ref));
    linked.push(format!("{} /* {} in Frameworks */", t.build_file, t.path));
  }
  products.push_str("\t\t\t)");

  host.add("PBXGroup", Block::multiline(INDENT, &link.products, "Products", &[
    ("isa",        "PBXGroup".into()),
    ("children",   products),
    ("name",       "Products".into()),
    ("sourceTree", "\"<group>\"".into())
  ]));

  match frameworks_phase(host, target.id()).and_then(|p| host.find_mut(&p)) {
    Some(phase) => { phase.push_into_list("files", &linked); },
    None        => warn!("No Frameworks phase for the {} target", target.dir())
  }
}

/// The group listing the engine project, else the main group.
fn engine_group(host: &PbxProject) -> Option<String> {
  host.blocks("PBXGroup").iter()
    .find(|g| g.list_items("children").iter().any(|c| c.contains(".xcodeproj */")))
    .map(|g| g.id().to_string())
    .or_else(|| host.root()?.field("mainGroup").map(|m| strip_comment(m).to_string()))
}

/// Adds the frameworks of a module that the target doesn't already link.
/// Returns how many were added.
pub fn link_frameworks(host: &mut PbxProject, link: &ModuleLink, target: AppleTarget, ids: &mut Ids) -> usize {
  let group = host.blocks("PBXGroup").iter()
    .find(|g| g.field_value("name").as_deref() == Some(target.dir()) ||
              g.comment() == Some(target.dir()))
    .map(|g| g.id().to_string());
  let group = match group {
    Some(g) => g,
    None    => {
      warn!("No {} framework group, skipping frameworks of {}", target.dir(), link.name);
      return 0;
    }
  };

  let mut present = linked_names(host, &group);
  let mut children = Vec::new();
  let mut files    = Vec::new();

  for (name, path) in &link.frameworks {
    let file_type = match name.rsplit('.').next() {
      Some("tbd")       => "\"sourcecode.text-based-dylib-definition\"",
      Some("framework") => "wrapper.framework",
      _                 => continue
    };
    if !present.insert(name.clone()) {
      debug!("{} is already linked", name);
      continue;
    }

    let reference = ids.tagged(Dialect::Apple, Role::FrameworkRef,   &Dialect::Apple.key("REFERENCE", path));
    let build     = ids.tagged(Dialect::Apple, Role::FrameworkBuild, &Dialect::Apple.key("FRAMEWORK", path));
    let qname     = quote(name);
    let qpath     = quote(path);
    let file_ref  = format!("{} /* {} */", reference, name);

    host.add("PBXFileReference", Block::inline(INDENT, &reference, name, &[
      ("isa",               "PBXFileReference"),
      ("lastKnownFileType", file_type),
      ("name",              &qname),
      ("path",              &qpath),
      ("sourceTree",        "DEVELOPER_DIR")
    ]));
    host.add("PBXBuildFile", Block::inline(INDENT, &build, &format!("{} in Frameworks", name), &[
      ("isa",     "PBXBuildFile"),
      ("fileRef", &file_ref)
    ]));

    children.push(file_ref);
    files.push(format!("{} /* {} in Frameworks */", build, name));
  }

  if let Some(g) = host.find_mut(&group) {
    g.push_into_list("children", &children);
  }
  if let Some(phase) = frameworks_phase(host, target.id()).and_then(|p| host.find_mut(&p)) {
    phase.push_into_list("files", &files);
  }
  files.len()
}

/// Names of the files listed in a group.
fn linked_names(host: &PbxProject, group: &str) -> HashSet<String> {
  let children = host.find(group).map(|g| g.list_ids("children")).unwrap_or_default();
  children.iter()
    .filter_map(|c| host.find(c))
    .filter_map(|b| b.field_value("name").or_else(|| {
      b.field_value("path").map(|p| p.rsplit('/').next().unwrap_or("").to_string())
    }))
    .collect()
}

/// Generates, configures and links one module for one platform. Nothing in
/// `host` changes unless the module project was generated and its roots
/// resolved.
pub fn add_module(host: &mut PbxProject, env: &LinkEnv, module: &External, target: AppleTarget,
                  ids: &mut Ids, data: &mut LinkData) -> GenResult<()>
{
  let dir    = env.host_dir.join(target.dir()).join(&module.name);
  let source = env.module_source(module);
  let found  = env.builder.generate(module, &source, &dir, &target.cmake_args(env.engine_dir), "*.xcodeproj")?;
  let xcode  = single_project(&module.name, found)?;

  let stem = xcode.file_stem().and_then(|s| s.to_str()).unwrap_or(&module.name).to_string();
  let file = format!("{}{}.xcodeproj", stem, target.suffix());
  let renamed = dir.join(&file);
  util::move_path(&xcode, &renamed)?;

  let pbx_path = renamed.join("project.pbxproj");
  let mut pbx  = PbxProject::parse(&pbx_path)?;
  let targets  = discover_targets(&pbx, &module.name, &module.targets)?;

  let mut extracted = LinkData::default();
  extract_link_data(&pbx, &targets, &dir, env.host_dir, target.platform(), &mut extracted);

  let libraries = rename_targets(&mut pbx, &targets, target, ids);
  pbx.write(&pbx_path)?;

  let cache = dir.join("CMakeCache.txt");
  let frameworks = match cache.is_file() {
    true  => read_frameworks(&fs::read_to_string(&cache)?),
    false => BTreeMap::new()
  };

  let path = [target.dir(), "/", module.name.as_str(), "/", file.as_str()].concat();
  let link = ModuleLink {
    name:     module.name.clone(),
    project:  ids.tagged(Dialect::Apple, Role::Project,      &Dialect::Apple.key("PROJECT", &path)),
    products: ids.tagged(Dialect::Apple, Role::ProductGroup, &Dialect::Apple.key("CONTAINER", &path)),
    file, path,
    targets:  libraries,
    frameworks
  };

  link_module(host, &link, target);
  let added = link_frameworks(host, &link, target, ids);
  info!("Linked {} libraries and {} frameworks of '{}' for {}",
        link.targets.len(), added, module.name, target.dir());

  data.merge(extracted);
  Ok(())
}

/// Links every external module into each of `targets`. Modules that fail
/// to generate or link are skipped with a warning.
pub fn add_externals(host: &mut PbxProject, env: &LinkEnv, modules: &[External], targets: &[AppleTarget],
                     dev: DevPlatform, ids: &mut Ids) -> GenResult<LinkData>
{
  let mut data = LinkData::default();
  if modules.is_empty() {
    return Ok(data);
  }
  if dev != DevPlatform::Macos {
    let e = GenError::Environment("External libraries require macOS for Xcode integration".into());
    warn!("{}", e);
    return Ok(data);
  }

  for &target in targets {
    for module in modules {
      info!("Expanding '{}' for {}", module.name, target.dir());
      if let Err(e) = add_module(host, env, module, target, ids, &mut data) {
        match e.is_recoverable() {
          true  => warn!("Skipping '{}': {}", module.name, e),
          false => return Err(e)
        }
      }
    }
  }
  Ok(data)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ids::DEFAULT_SALT;
  use crate::link::{find_projects, ModuleBuilder};
  use pretty_assertions::assert_eq;
  use std::path::PathBuf;

  const HOST:   &str = include_str!("../../tests/fixtures/host.pbxproj");
  const MODULE: &str = include_str!("../../tests/fixtures/module.pbxproj");
  const CACHE:  &str = include_str!("../../tests/fixtures/CMakeCache.txt");

  const SHAPES: &str = "5D3F1E2A9C8B7A6F4E3D2CB2";
  const WORLD:  &str = "5D3F1E2A9C8B7A6F4E3D2CB3";

  fn host() -> PbxProject {
    PbxProject::parse_str(HOST, Path::new("host.pbxproj")).unwrap()
  }

  fn module() -> PbxProject {
    PbxProject::parse_str(MODULE, Path::new("module.pbxproj")).unwrap()
  }

  fn external(targets: &[&str]) -> External {
    External {
      name:    "physics2d".into(),
      path:    "external/physics2d".into(),
      targets: targets.iter().map(|s| s.to_string()).collect(),
      options: BTreeMap::new()
    }
  }

  /// Writes the fixture module project, or nothing at all.
  struct FakeBuilder {
    produce: bool
  }

  impl ModuleBuilder for FakeBuilder {
    fn generate(&self, module: &External, _source: &Path, dir: &Path, _args: &[String],
                pattern: &str) -> GenResult<Vec<PathBuf>>
    {
      fs::create_dir_all(dir)?;
      if self.produce {
        let project = dir.join("physics2d.xcodeproj");
        fs::create_dir_all(&project)?;
        fs::write(project.join("project.pbxproj"), MODULE)?;
        fs::write(dir.join("CMakeCache.txt"), CACHE)?;
      }
      find_projects(&module.name, dir, pattern)
    }
  }

  fn phase_files(pbx: &PbxProject, target: AppleTarget) -> Vec<String> {
    let phase = frameworks_phase(pbx, target.id()).unwrap();
    pbx.find(&phase).unwrap().list_items("files")
  }

  #[test]
  fn discovers_dependencies_of_roots() {
    let targets = discover_targets(&module(), "physics2d", &["world".to_string()]).unwrap();
    assert_eq!(targets, vec![WORLD, SHAPES]);

    let targets = discover_targets(&module(), "physics2d", &["shapes".to_string()]).unwrap();
    assert_eq!(targets, vec![SHAPES]);
  }

  #[test]
  fn missing_root_is_a_link_error() {
    let err = discover_targets(&module(), "physics2d", &["gravity".to_string()]).unwrap_err();
    assert!(matches!(err, GenError::Link { .. }));
    assert!(err.is_recoverable());
  }

  #[test]
  fn extracts_link_data() {
    let pbx  = module();
    let mut data = LinkData::default();
    extract_link_data(&pbx, &[WORLD.to_string(), SHAPES.to_string()],
                      Path::new("/work/build/apple/macos/physics2d"), Path::new("/work/build/apple"),
                      Platform::Macos, &mut data);

    assert_eq!(data.includes("macos"), &[
      "$(SRCROOT)/../external/physics2d/include".to_string(),
      "$(SRCROOT)/../external/physics2d/src".to_string()
    ][..]);
    assert_eq!(data.defines("macos", "debug"), &["PHYSICS_DEBUG".to_string(), "SHAPES_STATIC".to_string()][..]);
    assert_eq!(data.defines("macos", "release"), &["PHYSICS_RELEASE".to_string(), "SHAPES_STATIC".to_string()][..]);
    assert!(data.includes("ios").is_empty());
  }

  #[test]
  fn renames_libraries_with_the_platform_suffix() {
    let mut pbx = module();
    let mut ids = Ids::new(DEFAULT_SALT);
    let targets = rename_targets(&mut pbx, &[WORLD.to_string(), SHAPES.to_string()], AppleTarget::Ios, &mut ids);

    let names: Vec<&str> = targets.iter().map(|t| t.path.as_str()).collect();
    assert_eq!(names, vec!["libworld-ios.a", "libshapes-ios.a"]);
    assert_eq!(targets[0].external, "5D3F1E2A9C8B7A6F4E3D2CF3");
    assert!(targets[0].build_file.starts_with("CC"));
    assert!(targets[0].proxy.starts_with("CF"));
    assert!(targets[0].container.starts_with("CE"));

    let world = pbx.find(WORLD).unwrap();
    assert_eq!(world.field_value("name").as_deref(), Some("world-ios"));
    assert!(world.contains("/* libworld-ios.a */"));
    assert_eq!(pbx.find("5D3F1E2A9C8B7A6F4E3D2CF3").unwrap().field_value("path").as_deref(), Some("libworld-ios.a"));
    assert_eq!(pbx.find("5D3F1E2A9C8B7A6F4E3D2C54").unwrap().setting("PRODUCT_NAME"), vec!["world-ios"]);

    // The module project is still well formed.
    let text = pbx.serialize();
    assert!(PbxProject::parse_str(&text, Path::new("renamed")).is_ok());
  }

  #[test]
  fn reads_frameworks_from_the_cache() {
    let frameworks = read_frameworks(CACHE);
    let names: Vec<&str> = frameworks.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["Cocoa.framework", "CoreAudio.framework", "libiconv.tbd"]);
    assert_eq!(frameworks["libiconv.tbd"],
               "Platforms/MacOSX.platform/Developer/SDKs/MacOSX.sdk/usr/lib/libiconv.tbd");
  }

  #[test]
  fn links_module_into_the_current_target_only() {
    let dir  = tempfile::tempdir().unwrap();
    let env  = LinkEnv {
      builder:    &FakeBuilder { produce: true },
      input_dir:  dir.path(),
      host_dir:   &dir.path().join("build/apple"),
      engine_dir: &dir.path().join("cugl")
    };
    let mut host = host();
    let mut ids  = Ids::new(DEFAULT_SALT);
    let ios_before = phase_files(&host, AppleTarget::Ios);

    let data = add_externals(&mut host, &env, &[external(&["world"])], &[AppleTarget::Macos],
                             DevPlatform::Macos, &mut ids).unwrap();

    let mac = phase_files(&host, AppleTarget::Macos);
    assert!(mac.iter().any(|f| f.contains("libworld-mac.a in Frameworks")));
    assert!(mac.iter().any(|f| f.contains("libshapes-mac.a in Frameworks")));
    assert!(mac.iter().any(|f| f.contains("CoreAudio.framework in Frameworks")));
    assert!(mac.iter().any(|f| f.contains("libiconv.tbd in Frameworks")));
    assert_eq!(mac.iter().filter(|f| f.contains("Cocoa.framework")).count(), 1);
    assert_eq!(phase_files(&host, AppleTarget::Ios), ios_before);

    let text = host.serialize();
    assert!(text.contains("path = macos/physics2d/physics2d-mac.xcodeproj;"));
    assert!(text.contains("remoteInfo = \"world-mac\";"));
    assert!(PbxProject::parse_str(&text, Path::new("linked")).is_ok());

    let root = host.root().unwrap();
    assert_eq!(root.list_items("projectReferences").len(), 2);
    assert!(!data.includes("macos").is_empty());

    let module = dir.path().join("build/apple/macos/physics2d/physics2d-mac.xcodeproj/project.pbxproj");
    assert!(fs::read_to_string(module).unwrap().contains("libworld-mac.a"));
  }

  #[test]
  fn missing_project_leaves_host_untouched() {
    let dir  = tempfile::tempdir().unwrap();
    let env  = LinkEnv {
      builder:    &FakeBuilder { produce: false },
      input_dir:  dir.path(),
      host_dir:   &dir.path().join("build/apple"),
      engine_dir: &dir.path().join("cugl")
    };
    let mut host = host();
    let mut ids  = Ids::new(DEFAULT_SALT);
    let data = add_externals(&mut host, &env, &[external(&["world"])],
                             &[AppleTarget::Macos, AppleTarget::Ios], DevPlatform::Macos, &mut ids).unwrap();
    assert_eq!(host.serialize(), HOST);
    assert!(data.is_empty());
  }

  #[test]
  fn unknown_root_leaves_host_untouched() {
    let dir  = tempfile::tempdir().unwrap();
    let env  = LinkEnv {
      builder:    &FakeBuilder { produce: true },
      input_dir:  dir.path(),
      host_dir:   &dir.path().join("build/apple"),
      engine_dir: &dir.path().join("cugl")
    };
    let mut host = host();
    let mut ids  = Ids::new(DEFAULT_SALT);
    add_externals(&mut host, &env, &[external(&["gravity"])], &[AppleTarget::Macos],
                  DevPlatform::Macos, &mut ids).unwrap();
    assert_eq!(host.serialize(), HOST);
  }

  #[test]
  fn skips_linking_off_macos() {
    let dir  = tempfile::tempdir().unwrap();
    let env  = LinkEnv {
      builder:    &FakeBuilder { produce: true },
      input_dir:  dir.path(),
      host_dir:   dir.path(),
      engine_dir: dir.path()
    };
    let mut host = host();
    let mut ids  = Ids::new(DEFAULT_SALT);
    add_externals(&mut host, &env, &[external(&["world"])], &[AppleTarget::Macos],
                  DevPlatform::Windows, &mut ids).unwrap();
    assert_eq!(host.serialize(), HOST);
    assert!(!dir.path().join("macos").exists());
  }

  #[test]
  fn ios_arguments_use_the_toolchain() {
    let args = AppleTarget::Ios.cmake_args(Path::new("/cugl"));
    assert_eq!(args[0], "-DCMAKE_TOOLCHAIN_FILE=/cugl/tools/ios.toolchain.cmake");
    assert_eq!(&args[args.len() - 2..], &["-G".to_string(), "Xcode".to_string()]);
  }
}
