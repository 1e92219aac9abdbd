//! Linking of CMake generated Visual Studio projects.
//!
//! CMake only records the link information of a library once something links
//! against it, so every module is generated through a small bridge
//! application copied from the engine tools. The bridge solution is pruned to
//! the projects the configured roots need, and those projects are added to
//! the host solution and referenced by the host project. Only x64 builds are
//! supported.

use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ctx::External;
use crate::error::{GenError, GenResult};
use crate::ids::{Dialect, Ids, Role};
use crate::link::{single_project, LinkData, LinkEnv};
use crate::sln::{SlnProject, Solution, CPP_PROJECT, FOLDER};
use crate::util::{self, DevPlatform};
use crate::vcx::{filter_list, parse_condition, Document, Element};

/// Build configurations module projects are integrated with.
pub const CONFIGURATIONS: [&str; 2] = ["Debug|x64", "Release|x64"];

const BRIDGE_DIR:  &str = "bridge";
const BRIDGE_MAIN: &str = "Main.vcxproj";

/// Defines of the bridge project that belong to the bridge itself.
const BRIDGE_DEFINES: &[&str] = &["WIN32", "_WINDOWS", "CMAKE_INTDIR", "NDEBUG", "HAVE_CONFIG_H", "_CRT_"];

/// System libraries every Windows application already links.
const SYSTEM_LIBS: &[&str] = &[
  "kernel32", "user32", "gdi32", "winspool", "shell32", "ole32", "oleaut32", "uuid", "comdlg32", "advapi32"
];

/// A project of a module's generated solution.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleProject {
  pub name: String,
  /// Project file, relative to the module directory.
  pub path: String,
  pub guid: String
}

/// The projects a module contributes to the host solution.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleProjects {
  pub module:   String,
  pub projects: Vec<ModuleProject>
}

/// Copies the bridge application into `<module_dir>/bridge` and points it
/// at the module sources.
pub fn install_bridge(engine_dir: &Path, module_dir: &Path, module: &External, source: &Path) -> GenResult<PathBuf> {
  let bridge = module_dir.join(BRIDGE_DIR);
  util::copy_dir(engine_dir.join("tools").join("windows"), &bridge)?;

  let mut externals = format!("# External package '{}'\n", module.name);
  externals.push_str(&format!("add_subdirectory(\"{}\" \"lib\")\n", util::path_to_posix(source)));
  for target in &module.targets {
    externals.push_str(&format!("list(APPEND EXTRA_LIBS {})\n", target));
  }

  util::file_replace(bridge.join("CMakeLists.txt"), &[("__EXTERNALS__", &externals)])?;
  Ok(bridge)
}

/// Arguments generating an x64 Visual Studio solution.
pub fn cmake_args() -> Vec<String> {
  vec!["-G".into(), "Visual Studio 17 2022".into(), "-A".into(), "x64".into()]
}

/// GUIDs of the projects needed by `roots`, roots first. Roots are matched
/// by project name or GUID.
pub fn expand_targets(sln: &Solution, module: &str, roots: &[String]) -> GenResult<Vec<String>> {
  let mut found = Vec::new();
  for root in roots {
    let project = sln.project(root)
      .or_else(|| sln.project_by_guid(root))
      .ok_or_else(|| GenError::link(module, root))?;
    expand(sln, &project.guid, &mut found);
  }
  Ok(found)
}

fn expand(sln: &Solution, guid: &str, found: &mut Vec<String>) {
  if found.iter().any(|g| g.eq_ignore_ascii_case(guid)) {
    return;
  }
  let project = match sln.project_by_guid(guid) {
    None    => return,
    Some(p) => p
  };
  if project.name == "ZERO_CHECK" || project.is_folder() {
    return;
  }
  found.push(project.guid.clone());
  for dep in &project.dependencies {
    expand(sln, dep, found);
  }
}

/// Strips the solution down to the `keep` projects. Folder nesting goes as
/// well, since the folders are dropped.
pub fn prune_solution(sln: &mut Solution, keep: &[String]) -> Vec<ModuleProject> {
  let removed = sln.retain_projects(|p| keep.iter().any(|k| k.eq_ignore_ascii_case(&p.guid)));
  debug!("Pruned {} projects", removed.len());
  sln.remove_global("NestedProjects");

  keep.iter()
    .filter_map(|g| sln.project_by_guid(g))
    .map(|p| ModuleProject {
      name: p.name.clone(),
      path: p.path.clone(),
      guid: p.guid.clone()
    })
    .collect()
}

/// Removes the references to the CMake regeneration project, which is no
/// longer part of the solution.
pub fn remove_zero_checks(module_dir: &Path, projects: &[ModuleProject]) -> GenResult<()> {
  for p in projects {
    let path    = module_dir.join(util::path_to_posix(&p.path));
    let mut doc = Document::parse(&path)?;
    if doc.remove_project_references("ZERO_CHECK") > 0 {
      doc.write(&path)?;
    }
  }
  Ok(())
}

/// Reads the includes, defines and dependencies of each build type from the
/// bridge project. Libraries built by the module itself are dropped.
pub fn extract_link_data(main: &Document, data: &mut LinkData) {
  let platform = "windows";
  for group in main.root.children("ItemDefinitionGroup") {
    let kind = match group.attr("Condition").and_then(parse_condition) {
      None            => continue,
      Some((kind, _)) => kind
    };

    for e in group.find_all(&["ClCompile", "AdditionalIncludeDirectories"]) {
      data.add_includes(platform, filter_list(e.text(), &[]));
    }
    for e in group.find_all(&["ClCompile", "PreprocessorDefinitions"]) {
      data.add_defines(platform, &kind, filter_list(e.text(), BRIDGE_DEFINES));
    }

    let mut depends: Vec<String> = group.find_all(&["Link", "AdditionalDependencies"])
      .into_iter()
      .flat_map(|e| filter_list(e.text(), SYSTEM_LIBS))
      .filter(|d| !d.contains('\\') || d.contains(':'))
      .collect();
    depends.sort();
    depends.dedup();
    data.add_depends(platform, &kind, depends);
  }
}

/// Adds the module projects to the host solution, nested in a folder, and
/// makes the application depend on each of them.
pub fn integrate(sln: &mut Solution, module: &ModuleProjects, camel: &str, host: &str, ids: &mut Ids) {
  let folder = match format!("lib{}", module.module) {
    n if n.eq_ignore_ascii_case(camel) => module.module.clone(),
    n                                  => n
  };
  let guid = ids.tagged(Dialect::Windows, Role::SolutionFolder, &Dialect::Windows.key("GROUP", &module.module));
  sln.projects.push(SlnProject::new(FOLDER, &folder, &folder, &guid));

  for p in &module.projects {
    let path = [camel, "\\", module.module.as_str(), "\\", util::path_to_windows(&p.path).as_str()].concat();
    sln.projects.push(SlnProject::new(CPP_PROJECT, &p.name, &path, &p.guid));

    let configs = sln.global_mut("ProjectConfigurationPlatforms", "postSolution");
    for c in CONFIGURATIONS.iter() {
      configs.values.push(format!("{{{}}}.{}.ActiveCfg = {}", p.guid, c, c));
      configs.values.push(format!("{{{}}}.{}.Build.0 = {}", p.guid, c, c));
    }
    sln.global_mut("NestedProjects", "preSolution")
      .values.push(format!("{{{}}} = {{{}}}", p.guid, guid));
  }

  match sln.project_by_guid_mut(host) {
    Some(app) => for p in &module.projects {
      if !app.depends_on(&p.guid) {
        app.dependencies.push(p.guid.clone());
      }
    },
    None => warn!("Application project {} is missing from the solution", host)
  }
}

/// References the module projects from the host project.
pub fn add_references(doc: &mut Document, modules: &[ModuleProjects]) {
  let group = doc.reference_group_mut();
  for m in modules {
    for p in &m.projects {
      let include = [m.module.as_str(), "\\", util::path_to_windows(&p.path).as_str()].concat();
      group.push(Element::new("ProjectReference")
        .with_attr("Include", &include)
        .with_child(Element::new("Project").with_text(&format!("{{{}}}", p.guid)))
        .with_child(Element::new("Name").with_text(&p.name)));
    }
  }
}

/// DLL names required by the module dependencies. Import libraries given by
/// absolute path are scanned for the DLL names they mention.
pub fn find_dlls(data: &LinkData) -> Vec<String> {
  let mut dlls = Vec::new();
  let libs = data.depends.values()
    .flat_map(|b| b.values())
    .flatten()
    .filter(|d| d.contains(":\\") || Path::new(d.as_str()).is_absolute());

  for lib in libs {
    if lib.to_lowercase().ends_with(".dll") {
      dlls.push(lib.clone());
      continue;
    }
    match fs::read(lib) {
      Ok(bytes) => dlls.extend(dll_names(&bytes)),
      Err(e)    => debug!("Cannot scan {}: {}", lib, e)
    }
  }
  dlls.sort();
  dlls.dedup();
  dlls
}

/// Printable runs of `bytes` ending in `.dll`.
fn dll_names(bytes: &[u8]) -> Vec<String> {
  let printable = |b: u8| b > 31 && b < 127;
  let mut out = Vec::new();
  let mut pos = 0;
  while let Some(off) = find(&bytes[pos..], b".dll") {
    let end   = pos + off + 4;
    let start = bytes[..pos + off].iter().rposition(|&b| !printable(b)).map_or(0, |p| p + 1);
    out.push(String::from_utf8_lossy(&bytes[start..end]).into_owned());
    pos = end;
  }
  out
}

fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
  hay.windows(needle.len()).position(|w| w == needle)
}

/// Generates one module through the bridge and prepares its projects. The
/// host is not touched.
pub fn add_module(env: &LinkEnv, module: &External, data: &mut LinkData) -> GenResult<ModuleProjects> {
  let module_dir = env.host_dir.join(&module.name);
  let source     = env.module_source(module);
  let bridge     = install_bridge(env.engine_dir, &module_dir, module, &source)?;

  let found    = env.builder.generate(module, &bridge, &module_dir, &cmake_args(), "*.sln")?;
  let sln_path = single_project(&module.name, found)?;

  let mut sln  = Solution::parse(&sln_path)?;
  let keep     = expand_targets(&sln, &module.name, &module.targets)?;
  let projects = prune_solution(&mut sln, &keep);
  sln.write(&sln_path, true)?;
  remove_zero_checks(&module_dir, &projects)?;

  let main = module_dir.join(BRIDGE_MAIN);
  match main.is_file() {
    true  => extract_link_data(&Document::parse(&main)?, data),
    false => warn!("No {} generated for '{}'", BRIDGE_MAIN, module.name)
  }

  info!("Prepared {} projects of '{}'", projects.len(), module.name);
  Ok(ModuleProjects { module: module.name.clone(), projects })
}

/// Links every external module into the host solution at `sln_path` and
/// the host project `doc`. Returns `None` when nothing was linked.
pub fn add_externals(sln_path: &Path, doc: &mut Document, env: &LinkEnv, modules: &[External], camel: &str,
                     host: &str, dev: DevPlatform, ids: &mut Ids) -> GenResult<Option<LinkData>>
{
  if modules.is_empty() {
    return Ok(None);
  }
  if dev != DevPlatform::Windows {
    let e = GenError::Environment("External libraries require Windows for Visual Studio integration".into());
    warn!("{}", e);
    return Ok(None);
  }

  let mut sln    = Solution::parse(sln_path)?;
  let mut data   = LinkData::default();
  let mut linked = Vec::new();
  for module in modules {
    info!("Expanding '{}'", module.name);
    let mut found = LinkData::default();
    match add_module(env, module, &mut found) {
      Ok(m)  => {
        integrate(&mut sln, &m, camel, host, ids);
        data.merge(found);
        linked.push(m);
      },
      Err(e) => match e.is_recoverable() {
        true  => warn!("Skipping '{}': {}", module.name, e),
        false => return Err(e)
      }
    }
  }

  if linked.is_empty() {
    return Ok(None);
  }
  sln.write(sln_path, true)?;
  add_references(doc, &linked);
  warn!("External module support is x64 only");

  let dlls = find_dlls(&data);
  if !dlls.is_empty() {
    warn!("External modules depend on these DLLs, copy them to the engine's buildfiles\\windows\\dlls\\x64 directory:");
    for d in &dlls {
      warn!("  - {}", d);
    }
  }
  Ok(Some(data))
}
