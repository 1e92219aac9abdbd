//! Source file trees and the IDE groups built from them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::path::{Component, Path};

use crate::ids::{Dialect, Ids, Role};

/// Platform tag of a source file. Tags also key the per-platform tables of
/// the configuration, where they are read as plain strings.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Platform {
  All,
  Android,
  Apple,
  Macos,
  Ios,
  Windows,
  Cmake
}

impl Platform {
  pub const ALL: [Platform; 7] = [
    Platform::All, Platform::Android, Platform::Apple, Platform::Macos,
    Platform::Ios, Platform::Windows, Platform::Cmake
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Platform::All     => "all",
      Platform::Android => "android",
      Platform::Apple   => "apple",
      Platform::Macos   => "macos",
      Platform::Ios     => "ios",
      Platform::Windows => "windows",
      Platform::Cmake   => "cmake"
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Self::ALL.iter().cloned().find(|p| p.as_str() == s)
  }

  /// How specific a tag is. A file matched by several tags keeps the most
  /// specific one.
  fn rank(self) -> u8 {
    match self {
      Platform::All   => 0,
      Platform::Apple => 1,
      _               => 2
    }
  }

  pub fn in_macos(self) -> bool {
    match self {
      Platform::All | Platform::Apple | Platform::Macos => true,
      _                                                 => false
    }
  }

  pub fn in_ios(self) -> bool {
    match self {
      Platform::All | Platform::Apple | Platform::Ios => true,
      _                                               => false
    }
  }

  pub fn in_windows(self) -> bool {
    match self {
      Platform::All | Platform::Windows => true,
      _                                 => false
    }
  }

  pub fn in_android(self) -> bool {
    match self {
      Platform::All | Platform::Android => true,
      _                                 => false
    }
  }

  pub fn in_cmake(self) -> bool {
    match self {
      Platform::All | Platform::Cmake => true,
      _                               => false
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl TryFrom<String> for Platform {
  type Error = String;

  fn try_from(s: String) -> Result<Self, Self::Error> {
    Platform::parse(&s).ok_or_else(|| format!("unknown platform '{}'", s))
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
  Directory(SourceTree),
  File(Platform)
}

pub type SourceTree = BTreeMap<String, Node>;

/// Adds `path` to the tree. Re-adding a file keeps its most specific tag.
pub fn insert(tree: &mut SourceTree, path: &Path, platform: Platform) {
  let parts: Vec<String> = path.components()
    .filter_map(|c| match c {
      Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
      _                    => None
    })
    .collect();

  if let Some((file, dirs)) = parts.split_last() {
    let mut node = tree;
    for d in dirs {
      let entry = node.entry(d.clone()).or_insert_with(|| Node::Directory(SourceTree::new()));
      if let Node::File(_) = entry {
        *entry = Node::Directory(SourceTree::new());
      }
      node = match entry {
        Node::Directory(children) => children,
        Node::File(_)             => return
      };
    }

    match node.get(file) {
      Some(Node::File(old)) if old.rank() >= platform.rank() => {},
      Some(Node::Directory(_)) => {},
      _ => {
        node.insert(file.clone(), Node::File(platform));
      }
    }
  }
}

/// Descends into the only top-level directory, if there is exactly one.
/// Returns the directory name (if any) and the tree to build groups from.
pub fn collapse_root(tree: &SourceTree) -> (Option<&str>, &SourceTree) {
  if tree.len() == 1 {
    if let Some((name, Node::Directory(children))) = tree.iter().next() {
      return (Some(name.as_str()), children);
    }
  }
  (None, tree)
}

/// Every file of the tree with its path relative to the root, in tree order.
pub fn files(tree: &SourceTree) -> Vec<(String, Platform)> {
  fn walk(prefix: &str, tree: &SourceTree, out: &mut Vec<(String, Platform)>) {
    for (name, node) in tree {
      let path = match prefix.is_empty() {
        true  => name.clone(),
        false => [prefix, "/", name].concat()
      };
      match node {
        Node::Directory(children) => walk(&path, children, out),
        Node::File(p)             => out.push((path, *p))
      }
    }
  }
  let mut out = Vec::new();
  walk("", tree, &mut out);
  out
}

/// Copy of `tree` with only the files whose tag satisfies `keep`. Directories
/// left empty are dropped.
pub fn filtered<F: Fn(Platform) -> bool>(tree: &SourceTree, keep: &F) -> SourceTree {
  let mut out = SourceTree::new();
  for (name, node) in tree {
    match node {
      Node::File(p) => if keep(*p) {
        out.insert(name.clone(), Node::File(*p));
      },
      Node::Directory(nested) => {
        let inner = filtered(nested, keep);
        if !inner.is_empty() {
          out.insert(name.clone(), Node::Directory(inner));
        }
      }
    }
  }
  out
}

/// What a group child is: a nested group, or a file with its platform tag.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
  Group,
  File(Platform)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Child {
  pub id:       String,
  pub name:     String,
  pub category: Category
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Group {
  pub name:     String,
  pub children: Vec<Child>
}

pub type GroupTable = BTreeMap<String, Group>;

/// Maps a source tree to IDE groups (Xcode) or filters (Visual Studio).
///
/// Groups are keyed `GROUP://<path>` and files `FILE://<path>`, using the
/// dialect's separator, so the same tree always yields the same identifiers.
/// The root group has an empty name.
pub fn build_groups(root: &str, tree: &SourceTree, ids: &mut Ids, dialect: Dialect) -> (String, GroupTable) {
  let mut table = GroupTable::new();
  let id = build_into(root, "", tree, ids, dialect, &mut table);
  (id, table)
}

fn build_into(path: &str, name: &str, tree: &SourceTree, ids: &mut Ids, dialect: Dialect,
              table: &mut GroupTable) -> String
{
  let sep = dialect.separator();
  let id  = ids.tagged(dialect, Role::Group, &dialect.key("GROUP", path));

  let mut children = Vec::with_capacity(tree.len());
  for (item, node) in tree {
    let sub = format!("{}{}{}", path, sep, item);
    match node {
      Node::Directory(nested) => {
        let child = build_into(&sub, item, nested, ids, dialect, table);
        children.push(Child { id: child, name: item.clone(), category: Category::Group });
      },
      Node::File(platform) => {
        let file = ids.tagged(dialect, Role::File, &dialect.key("FILE", &sub));
        children.push(Child { id: file, name: item.clone(), category: Category::File(*platform) });
      }
    }
  }

  table.insert(id.clone(), Group { name: name.to_string(), children });
  id
}

/// Walks the group table depth first, calling `f` with the path of every
/// file relative to the root group (joined with `sep`) and its child entry.
pub fn walk_files<F: FnMut(&str, &str, &Child)>(root: &str, table: &GroupTable, sep: char, f: &mut F) {
  fn walk<F: FnMut(&str, &str, &Child)>(id: &str, dir: &str, table: &GroupTable, sep: char, f: &mut F) {
    if let Some(group) = table.get(id) {
      for c in &group.children {
        match c.category {
          Category::Group   => walk(&c.id, &join(dir, &c.name, sep), table, sep, f),
          Category::File(_) => f(dir, &join(dir, &c.name, sep), c)
        }
      }
    }
  }
  walk(root, "", table, sep, f)
}

/// Walks the groups depth first, calling `f` with each nested group's path.
pub fn walk_groups<F: FnMut(&str, &Child)>(root: &str, table: &GroupTable, sep: char, f: &mut F) {
  fn walk<F: FnMut(&str, &Child)>(id: &str, dir: &str, table: &GroupTable, sep: char, f: &mut F) {
    if let Some(group) = table.get(id) {
      for c in group.children.iter().filter(|c| c.category == Category::Group) {
        let path = join(dir, &c.name, sep);
        f(&path, c);
        walk(&c.id, &path, table, sep, f);
      }
    }
  }
  walk(root, "", table, sep, f)
}

fn join(dir: &str, name: &str, sep: char) -> String {
  match dir.is_empty() {
    true  => name.to_string(),
    false => format!("{}{}{}", dir, sep, name)
  }
}

pub fn extension(name: &str) -> &str {
  match name.rfind('.') {
    Some(i) if i > 0 => &name[i..],
    _                => ""
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ids::DEFAULT_SALT;
  use pretty_assertions::assert_eq;
  use std::path::PathBuf;

  fn sample() -> SourceTree {
    let mut tree = SourceTree::new();
    for (path, p) in &[
      ("source/main.cpp",            Platform::All),
      ("source/App.h",               Platform::All),
      ("source/scenes/Game.cpp",     Platform::All),
      ("source/scenes/Game.h",       Platform::All),
      ("source/platform/MacView.mm", Platform::Macos),
      ("source/platform/Win.cpp",    Platform::Windows)
    ] {
      insert(&mut tree, &PathBuf::from(path), *p);
    }
    tree
  }

  #[test]
  fn keeps_the_most_specific_tag() {
    let mut tree = SourceTree::new();
    insert(&mut tree, Path::new("a/b.cpp"), Platform::Ios);
    insert(&mut tree, Path::new("a/b.cpp"), Platform::All);
    insert(&mut tree, Path::new("a/c.cpp"), Platform::All);
    insert(&mut tree, Path::new("a/c.cpp"), Platform::Apple);
    assert_eq!(files(&tree), vec![
      ("a/b.cpp".to_string(), Platform::Ios),
      ("a/c.cpp".to_string(), Platform::Apple)
    ]);
  }

  #[test]
  fn collapses_a_single_root() {
    let tree = sample();
    let (name, inner) = collapse_root(&tree);
    assert_eq!(name, Some("source"));
    assert_eq!(inner.len(), 4);
  }

  #[test]
  fn builds_groups_with_stable_ids() {
    let tree = sample();
    let (_, inner) = collapse_root(&tree);

    let mut ids = Ids::new(DEFAULT_SALT);
    let (root, table) = build_groups("../../source", inner, &mut ids, Dialect::Apple);
    assert_eq!(table.len(), 3);
    assert!(root.starts_with("CD"));
    assert_eq!(table[&root].name, "");

    let scenes = table[&root].children.iter().find(|c| c.name == "scenes").unwrap();
    assert_eq!(scenes.category, Category::Group);
    assert_eq!(table[&scenes.id].children.len(), 2);
    assert!(table[&scenes.id].children.iter().all(|c| c.id.starts_with("BA")));

    let mut again = Ids::new(DEFAULT_SALT);
    let (root2, table2) = build_groups("../../source", inner, &mut again, Dialect::Apple);
    assert_eq!(root, root2);
    assert_eq!(table, table2);
  }

  #[test]
  fn windows_groups_use_guids() {
    let tree = sample();
    let mut ids = Ids::new(DEFAULT_SALT);
    let (root, table) = build_groups("..\\..\\", &tree, &mut ids, Dialect::Windows);
    assert!(crate::ids::is_guid(&root));
    assert!(table.keys().all(|k| crate::ids::is_guid(k)));
  }

  #[test]
  fn walks_files_and_groups_in_order() {
    let tree = sample();
    let (_, inner) = collapse_root(&tree);
    let mut ids = Ids::new(DEFAULT_SALT);
    let (root, table) = build_groups("..\\source", inner, &mut ids, Dialect::Windows);

    let mut paths = Vec::new();
    walk_files(&root, &table, '\\', &mut |dir, path, _| paths.push((dir.to_string(), path.to_string())));
    assert_eq!(paths[0], ("".to_string(), "App.h".to_string()));
    assert!(paths.contains(&("scenes".to_string(), "scenes\\Game.cpp".to_string())));
    assert_eq!(paths.len(), 6);

    let mut groups = Vec::new();
    walk_groups(&root, &table, '\\', &mut |path, _| groups.push(path.to_string()));
    assert_eq!(groups, vec!["platform", "scenes"]);
  }

  #[test]
  fn serializes_trees_as_nested_maps() {
    let json = serde_json::to_value(&sample()).unwrap();
    assert_eq!(json["source"]["scenes"]["Game.cpp"], "all");
    assert_eq!(json["source"]["platform"]["MacView.mm"], "macos");
  }

  #[test]
  fn filters_by_platform() {
    let tree = sample();
    let windows = filtered(&tree, &|p: Platform| p.in_windows());
    let names: Vec<String> = files(&windows).into_iter().map(|(f, _)| f).collect();
    assert!(names.contains(&"source/platform/Win.cpp".to_string()));
    assert!(!names.contains(&"source/platform/MacView.mm".to_string()));

    let ios = filtered(&tree, &|p: Platform| p.in_ios());
    assert_eq!(files(&ios).len(), 4);
    match &ios["source"] {
      Node::Directory(d) => assert!(!d.contains_key("platform")),
      Node::File(_)      => panic!("expected a directory")
    }
  }

  #[test]
  fn splits_extensions() {
    assert_eq!(extension("main.cpp"), ".cpp");
    assert_eq!(extension(".hidden"), "");
    assert_eq!(extension("Makefile"), "");
  }
}
