//! Reader and writer for Visual Studio solution files.
//!
//! Solutions are line oriented, with three regions:
//!
//! ```text
//! Microsoft Visual Studio Solution File, Format Version 12.00   <- header
//! Project("{KIND}") = "Name", "Path\Name.vcxproj", "{GUID}"     <- projects
//!   ProjectSection(ProjectDependencies) = postProject
//!     {DEP} = {DEP}
//!   EndProjectSection
//! EndProject
//! Global                                                        <- globals
//!   GlobalSection(NAME) = preSolution
//!     values...
//!   EndGlobalSection
//! EndGlobal
//! ```
//!
//! GUIDs are stored without their braces.

use std::fs;
use std::path::Path;

use crate::error::{GenError, GenResult};

/// Project type of C++ projects.
pub const CPP_PROJECT: &str = "8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942";

/// Project type of solution folders.
pub const FOLDER: &str = "2150E333-8FDC-42A3-9474-1A3956D46DE8";

#[derive(Clone, Debug, PartialEq)]
pub struct SlnProject {
  pub kind:         String,
  pub name:         String,
  pub path:         String,
  pub guid:         String,
  pub dependencies: Vec<String>,
  /// Raw lines of any other project section, written back untouched.
  pub extra:        Vec<String>
}

#[derive(Clone, Debug, PartialEq)]
pub struct GlobalSection {
  pub name:   String,
  pub phase:  String,
  pub values: Vec<String>
}

#[derive(Clone, Debug)]
pub struct Solution {
  pub header:   Vec<String>,
  pub projects: Vec<SlnProject>,
  pub globals:  Vec<GlobalSection>,
  bom:          bool,
  crlf:         bool
}

impl SlnProject {
  pub fn new(kind: &str, name: &str, path: &str, guid: &str) -> Self {
    SlnProject {
      kind:         kind.to_string(),
      name:         name.to_string(),
      path:         path.to_string(),
      guid:         guid.to_string(),
      dependencies: Vec::new(),
      extra:        Vec::new()
    }
  }

  pub fn is_folder(&self) -> bool {
    self.kind.eq_ignore_ascii_case(FOLDER)
  }

  pub fn depends_on(&self, guid: &str) -> bool {
    self.dependencies.iter().any(|d| d.eq_ignore_ascii_case(guid))
  }
}

impl Solution {
  pub fn parse<P: AsRef<Path>>(path: P) -> GenResult<Self> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    Self::parse_str(&text, path)
  }

  pub fn parse_str(text: &str, path: &Path) -> GenResult<Self> {
    let err = |line: usize, msg: &str| GenError::format(path, Some(line), msg);

    let bom  = text.starts_with('\u{feff}');
    let text = text.trim_start_matches('\u{feff}');
    let crlf = text.contains("\r\n");

    enum State { Header, Projects, Globals, Done }

    let mut state      = State::Header;
    let mut header     = Vec::new();
    let mut projects   = Vec::<SlnProject>::new();
    let mut globals    = Vec::<GlobalSection>::new();
    let mut project    = None::<SlnProject>;
    let mut section    = None::<GlobalSection>;
    let mut in_deps    = false;
    let mut in_extra   = false;

    for (n, raw) in text.lines().enumerate() {
      let lineno = n + 1;
      let line   = raw.trim();

      match state {
        State::Header | State::Projects if line.starts_with("Project(") => {
          if project.is_some() {
            return Err(err(lineno, "project without EndProject"));
          }
          project = Some(parse_project_line(line).ok_or_else(|| err(lineno, "malformed Project line"))?);
          state   = State::Projects;
        },
        State::Header | State::Projects if line == "Global" => {
          if project.is_some() {
            return Err(err(lineno, "project without EndProject"));
          }
          state = State::Globals;
        },
        State::Header => header.push(raw.to_string()),

        State::Projects => {
          let p = match project.as_mut() {
            Some(p) => p,
            None    => return Err(err(lineno, "unexpected line between projects"))
          };
          if line.starts_with("ProjectSection(ProjectDependencies)") {
            in_deps = true;
          }
          else if line.starts_with("ProjectSection(") {
            in_extra = true;
            p.extra.push(raw.to_string());
          }
          else if line == "EndProjectSection" {
            if in_extra {
              p.extra.push(raw.to_string());
            }
            in_deps  = false;
            in_extra = false;
          }
          else if line == "EndProject" {
            if in_deps || in_extra {
              return Err(err(lineno, "unterminated project section"));
            }
            if let Some(p) = project.take() {
              projects.push(p);
            }
          }
          else if in_deps {
            let dep = braced(line).ok_or_else(|| err(lineno, "malformed dependency"))?;
            p.dependencies.push(dep.to_string());
          }
          else if in_extra {
            p.extra.push(raw.to_string());
          }
        },

        State::Globals => {
          if line == "EndGlobal" {
            if section.is_some() {
              return Err(err(lineno, "unterminated global section"));
            }
            state = State::Done;
          }
          else if line.starts_with("GlobalSection(") {
            if section.is_some() {
              return Err(err(lineno, "nested global section"));
            }
            let open  = line.find('(').unwrap_or(0) + 1;
            let close = line.find(')').ok_or_else(|| err(lineno, "malformed GlobalSection"))?;
            let phase = line[close..].splitn(2, '=').nth(1).unwrap_or("").trim();
            section = Some(GlobalSection {
              name:   line[open..close].to_string(),
              phase:  phase.to_string(),
              values: Vec::new()
            });
          }
          else if line == "EndGlobalSection" {
            match section.take() {
              Some(s) => globals.push(s),
              None    => return Err(err(lineno, "EndGlobalSection without GlobalSection"))
            }
          }
          else if let Some(s) = section.as_mut() {
            s.values.push(raw.trim_start().to_string());
          }
        },

        State::Done => if !line.is_empty() {
          return Err(err(lineno, "content after EndGlobal"));
        }
      }
    }

    match state {
      State::Done   => {},
      State::Header => return Err(err(1, "no projects or globals")),
      _             => return Err(err(text.lines().count(), "missing EndGlobal"))
    }

    Ok(Solution { header, projects, globals, bom, crlf })
  }

  /// Writes the solution. Per-project dependency sections are only emitted
  /// when `dependencies` is set, since projects also carry this information.
  pub fn serialize(&self, dependencies: bool) -> String {
    let mut lines = Vec::with_capacity(self.header.len() + self.projects.len() * 4);
    lines.extend(self.header.iter().cloned());

    for p in &self.projects {
      lines.push(format!("Project(\"{{{}}}\") = \"{}\", \"{}\", \"{{{}}}\"", p.kind, p.name, p.path, p.guid));
      if dependencies && !p.is_folder() && !p.dependencies.is_empty() {
        lines.push("\tProjectSection(ProjectDependencies) = postProject".into());
        for d in &p.dependencies {
          lines.push(format!("\t\t{{{0}}} = {{{0}}}", d));
        }
        lines.push("\tEndProjectSection".into());
      }
      lines.extend(p.extra.iter().cloned());
      lines.push("EndProject".into());
    }

    lines.push("Global".into());
    for s in &self.globals {
      lines.push(format!("\tGlobalSection({}) = {}", s.name, s.phase));
      for v in &s.values {
        lines.push(["\t\t", v].concat());
      }
      lines.push("\tEndGlobalSection".into());
    }
    lines.push("EndGlobal".into());

    let eol = match self.crlf {
      true  => "\r\n",
      false => "\n"
    };
    let mut out = match self.bom {
      true  => String::from("\u{feff}"),
      false => String::new()
    };
    for line in lines {
      out.push_str(&line);
      out.push_str(eol);
    }
    out
  }

  pub fn write<P: AsRef<Path>>(&self, path: P, dependencies: bool) -> GenResult<()> {
    fs::write(path, self.serialize(dependencies))?;
    Ok(())
  }

  pub fn project(&self, name: &str) -> Option<&SlnProject> {
    self.projects.iter().find(|p| p.name.eq_ignore_ascii_case(name))
  }

  pub fn project_by_guid(&self, guid: &str) -> Option<&SlnProject> {
    self.projects.iter().find(|p| p.guid.eq_ignore_ascii_case(guid))
  }

  pub fn project_by_guid_mut(&mut self, guid: &str) -> Option<&mut SlnProject> {
    self.projects.iter_mut().find(|p| p.guid.eq_ignore_ascii_case(guid))
  }

  pub fn global(&self, name: &str) -> Option<&GlobalSection> {
    self.globals.iter().find(|s| s.name == name)
  }

  /// Returns the named global section, appending an empty one if missing.
  pub fn global_mut(&mut self, name: &str, phase: &str) -> &mut GlobalSection {
    let index = match self.globals.iter().position(|s| s.name == name) {
      Some(i) => i,
      None    => {
        self.globals.push(GlobalSection {
          name:   name.to_string(),
          phase:  phase.to_string(),
          values: Vec::new()
        });
        self.globals.len() - 1
      }
    };
    &mut self.globals[index]
  }

  pub fn remove_global(&mut self, name: &str) -> bool {
    let len = self.globals.len();
    self.globals.retain(|s| s.name != name);
    self.globals.len() != len
  }

  /// Solution configurations such as `Debug|x64`.
  pub fn configurations(&self) -> Vec<String> {
    match self.global("SolutionConfigurationPlatforms") {
      None    => Vec::new(),
      Some(s) => s.values.iter()
        .filter_map(|v| v.split('=').next())
        .map(|v| v.trim().to_string())
        .collect()
    }
  }

  /// Removes the projects that `keep` rejects, along with every dependency
  /// on them and their per-configuration entries.
  pub fn retain_projects<F: Fn(&SlnProject) -> bool>(&mut self, keep: F) -> Vec<SlnProject> {
    let (kept, removed): (Vec<_>, Vec<_>) = self.projects.drain(..).partition(|p| keep(p));
    self.projects = kept;

    for r in &removed {
      for p in &mut self.projects {
        p.dependencies.retain(|d| !d.eq_ignore_ascii_case(&r.guid));
      }
      let needle = format!("{{{}}}", r.guid.to_uppercase());
      for s in &mut self.globals {
        s.values.retain(|v| !v.to_uppercase().contains(&needle));
      }
    }
    removed
  }
}

fn braced(text: &str) -> Option<&str> {
  let open  = text.find('{')? + 1;
  let close = text[open..].find('}')? + open;
  Some(&text[open..close])
}

/// Parses `Project("{KIND}") = "Name", "Path", "{GUID}"`.
fn parse_project_line(line: &str) -> Option<SlnProject> {
  let kind = braced(line)?;
  let rest = &line[line.find('=')? + 1..];

  let fields: Vec<&str> = rest.split(',').map(|f| f.trim().trim_matches('"')).collect();
  if fields.len() != 3 {
    return None;
  }
  let guid = braced(fields[2])?;
  Some(SlnProject::new(kind, fields[0], fields[1], guid))
}
