//! Visual Studio project files (`.vcxproj`, `.vcxproj.filters`).
//!
//! These are plain MSBuild XML documents, loaded into a small element tree.
//! Visual Studio refuses projects whose root element uses a prefixed
//! namespace, so the tree only ever stores local names: prefixes are
//! stripped while parsing and the namespace is written back as the
//! unprefixed default of the root element.
//!
//! Whitespace between elements is not preserved; documents are written
//! back with the two space indentation Visual Studio itself uses.

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs;
use std::path::Path;

use crate::error::{GenError, GenResult};

pub const MSBUILD_NS: &str = "http://schemas.microsoft.com/developer/msbuild/2003";

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
  Element(Element),
  Comment(String)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
  pub name:     String,
  pub attrs:    Vec<(String, String)>,
  pub text:     Option<String>,
  pub children: Vec<Node>
}

#[derive(Clone, Debug)]
pub struct Document {
  pub root:      Element,
  pub namespace: String,
  bom:           bool,
  crlf:          bool
}

impl Element {
  pub fn new(name: &str) -> Self {
    Element {
      name:     name.to_string(),
      attrs:    Vec::new(),
      text:     None,
      children: Vec::new()
    }
  }

  pub fn with_attr(mut self, key: &str, value: &str) -> Self {
    self.set_attr(key, value);
    self
  }

  pub fn with_text(mut self, text: &str) -> Self {
    self.text = Some(text.to_string());
    self
  }

  pub fn with_child(mut self, child: Element) -> Self {
    self.push(child);
    self
  }

  pub fn attr(&self, key: &str) -> Option<&str> {
    self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
  }

  pub fn set_attr(&mut self, key: &str, value: &str) {
    match self.attrs.iter_mut().find(|(k, _)| k == key) {
      Some(kv) => kv.1 = value.to_string(),
      None     => self.attrs.push((key.to_string(), value.to_string()))
    }
  }

  pub fn text(&self) -> &str {
    self.text.as_deref().unwrap_or("")
  }

  pub fn set_text(&mut self, text: &str) {
    self.text = Some(text.to_string());
  }

  pub fn elements(&self) -> impl Iterator<Item = &Element> {
    self.children.iter().filter_map(|n| match n {
      Node::Element(e) => Some(e),
      Node::Comment(_) => None
    })
  }

  pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
    self.children.iter_mut().filter_map(|n| match n {
      Node::Element(e) => Some(e),
      Node::Comment(_) => None
    })
  }

  pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
    self.elements().filter(move |e| e.name == name)
  }

  pub fn child(&self, name: &str) -> Option<&Element> {
    self.elements().find(|e| e.name == name)
  }

  pub fn push(&mut self, child: Element) {
    self.children.push(Node::Element(child));
  }

  /// Removes the child elements `keep` rejects, returning how many were removed.
  pub fn retain_elements<F: Fn(&Element) -> bool>(&mut self, keep: F) -> usize {
    let len = self.children.len();
    self.children.retain(|n| match n {
      Node::Element(e) => keep(e),
      Node::Comment(_) => true
    });
    len - self.children.len()
  }

  /// Every element reached by following `path`, one element name per level.
  pub fn find_all(&self, path: &[&str]) -> Vec<&Element> {
    match path.split_first() {
      None               => vec![self],
      Some((head, rest)) => self.elements()
        .filter(|e| e.name == *head)
        .flat_map(|c| c.find_all(rest))
        .collect()
    }
  }

  /// Calls `f` on every element reached by following `path`.
  pub fn for_each_mut<F: FnMut(&mut Element)>(&mut self, path: &[&str], f: &mut F) {
    match path.split_first() {
      None               => f(self),
      Some((head, rest)) => for c in self.elements_mut().filter(|e| e.name == *head) {
        c.for_each_mut(rest, f);
      }
    }
  }

  fn from_start(e: &BytesStart, namespace: &mut Option<String>) -> GenResult<Self> {
    let mut el = Element::new(&String::from_utf8_lossy(e.name().local_name().as_ref()));

    for a in e.attributes() {
      let a     = a.map_err(quick_xml::Error::from)?;
      let key   = String::from_utf8_lossy(a.key.as_ref()).into_owned();
      let value = a.unescape_value()?.into_owned();

      if key == "xmlns" || key.starts_with("xmlns:") {
        if namespace.is_none() {
          *namespace = Some(value);
        }
        continue;
      }
      el.attrs.push((key, value));
    }
    Ok(el)
  }

  fn write_to(&self, out: &mut String, depth: usize, eol: &str, xmlns: Option<&str>) {
    let indent = "  ".repeat(depth);
    out.push_str(&indent);
    out.push('<');
    out.push_str(&self.name);
    for (k, v) in &self.attrs {
      out.push_str(&format!(" {}=\"{}\"", k, escape_attr(v)));
    }
    if let Some(ns) = xmlns {
      out.push_str(&format!(" xmlns=\"{}\"", escape_attr(ns)));
    }

    match (self.text.as_deref(), self.children.is_empty()) {
      (None, true) => {
        out.push_str(" />");
      },
      (Some(t), true) => {
        out.push('>');
        out.push_str(&partial_escape(t));
        out.push_str(&format!("</{}>", self.name));
      },
      (text, false) => {
        out.push('>');
        if let Some(t) = text {
          out.push_str(&partial_escape(t));
        }
        out.push_str(eol);
        for c in &self.children {
          match c {
            Node::Element(e) => e.write_to(out, depth + 1, eol, None),
            Node::Comment(t) => {
              out.push_str(&"  ".repeat(depth + 1));
              out.push_str(&format!("<!--{}-->", t));
            }
          }
          out.push_str(eol);
        }
        out.push_str(&indent);
        out.push_str(&format!("</{}>", self.name));
      }
    }
  }
}

impl Document {
  pub fn parse<P: AsRef<Path>>(path: P) -> GenResult<Self> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    Self::parse_str(&text, path)
  }

  pub fn parse_str(text: &str, path: &Path) -> GenResult<Self> {
    let bom  = text.starts_with('\u{feff}');
    let text = text.trim_start_matches('\u{feff}');
    let crlf = text.contains("\r\n");

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut namespace = None;
    let mut stack     = Vec::<Element>::new();
    let mut root      = None::<Element>;

    loop {
      match reader.read_event()? {
        Event::Start(e) => {
          stack.push(Element::from_start(&e, &mut namespace)?);
        },
        Event::Empty(e) => {
          let el = Element::from_start(&e, &mut namespace)?;
          attach(&mut stack, &mut root, el, path)?;
        },
        Event::End(_) => {
          let el = stack.pop().ok_or_else(|| GenError::format(path, None, "unexpected closing tag"))?;
          attach(&mut stack, &mut root, el, path)?;
        },
        Event::Text(t) => {
          let t = t.unescape()?;
          match stack.last_mut() {
            Some(el) => el.text.get_or_insert_with(String::new).push_str(&t),
            None     => if !t.trim().is_empty() {
              return Err(GenError::format(path, None, "text outside of the root element"));
            }
          }
        },
        Event::CData(t) => {
          if let Some(el) = stack.last_mut() {
            el.text.get_or_insert_with(String::new).push_str(&String::from_utf8_lossy(&t));
          }
        },
        Event::Comment(t) => {
          if let Some(el) = stack.last_mut() {
            el.children.push(Node::Comment(String::from_utf8_lossy(&t).into_owned()));
          }
        },
        Event::Eof => break,
        _          => {}
      }
    }

    if !stack.is_empty() {
      return Err(GenError::format(path, None, format!("unclosed element <{}>", stack[stack.len() - 1].name)));
    }
    let root = root.ok_or_else(|| GenError::format(path, None, "no root element"))?;

    Ok(Document {
      root,
      namespace: namespace.unwrap_or_else(|| MSBUILD_NS.to_string()),
      bom,
      crlf
    })
  }

  /// Writes the document with the namespace as the root's unprefixed default.
  pub fn serialize(&self) -> String {
    let eol = match self.crlf {
      true  => "\r\n",
      false => "\n"
    };
    let mut out = match self.bom {
      true  => String::from("\u{feff}"),
      false => String::new()
    };
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>");
    out.push_str(eol);
    self.root.write_to(&mut out, 0, eol, Some(&self.namespace));
    out.push_str(eol);
    out
  }

  pub fn write<P: AsRef<Path>>(&self, path: P) -> GenResult<()> {
    fs::write(path, self.serialize())?;
    Ok(())
  }

  /// The first item group holding project references, created when missing.
  pub fn reference_group_mut(&mut self) -> &mut Element {
    let index = self.root.children.iter().position(|n| match n {
      Node::Element(e) => e.name == "ItemGroup" && e.child("ProjectReference").is_some(),
      Node::Comment(_) => false
    });
    let index = match index {
      Some(i) => i,
      None    => {
        self.root.push(Element::new("ItemGroup"));
        self.root.children.len() - 1
      }
    };
    match &mut self.root.children[index] {
      Node::Element(e) => e,
      Node::Comment(_) => unreachable!()
    }
  }

  /// Removes every project reference named `name`.
  pub fn remove_project_references(&mut self, name: &str) -> usize {
    let mut removed = 0;
    for group in self.root.elements_mut().filter(|e| e.name == "ItemGroup") {
      removed += group.retain_elements(|r| {
        r.name != "ProjectReference" || r.child("Name").map(|n| n.text()) != Some(name)
      });
    }
    removed
  }
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, el: Element, path: &Path) -> GenResult<()> {
  match stack.last_mut() {
    Some(parent) => parent.push(el),
    None         => match root.is_some() {
      true  => return Err(GenError::format(path, None, "multiple root elements")),
      false => *root = Some(el)
    }
  }
  Ok(())
}

fn escape_attr(value: &str) -> String {
  partial_escape(value).replace('"', "&quot;")
}

/// Parses an MSBuild condition such as `'$(Configuration)|$(Platform)'=='Debug|x64'`
/// into its lowercase build type and architecture.
pub fn parse_condition(condition: &str) -> Option<(String, String)> {
  let value = condition.splitn(2, "==").nth(1)?.trim().trim_matches('\'');
  let mut parts = value.splitn(2, '|');
  let kind = parts.next()?.trim();
  let arch = parts.next()?.trim();
  match kind.is_empty() || arch.is_empty() {
    true  => None,
    false => Some((kind.to_lowercase(), arch.to_lowercase()))
  }
}

/// Splits a `;` separated MSBuild list, dropping empty items, `%(...)`
/// inheritance markers and every item starting with one of `excluded`.
pub fn filter_list(text: &str, excluded: &[&str]) -> Vec<String> {
  text.split(';')
    .filter(|i| !i.is_empty() && !i.starts_with('%'))
    .filter(|i| !excluded.iter().any(|x| i.starts_with(x)))
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  const HOST:  &str = include_str!("../tests/fixtures/host.vcxproj");
  const MAIN:  &str = include_str!("../tests/fixtures/Main.vcxproj");
  const WORLD: &str = include_str!("../tests/fixtures/world.vcxproj");

  fn parse(text: &str) -> Document {
    Document::parse_str(text, Path::new("test.vcxproj")).unwrap()
  }

  #[test]
  fn parses_build_definitions() {
    let doc    = parse(HOST);
    let groups = doc.root.find_all(&["ItemDefinitionGroup"]);
    assert_eq!(groups.len(), 4);

    let conditions: Vec<_> = groups.iter()
      .filter_map(|g| g.attr("Condition"))
      .filter_map(parse_condition)
      .collect();
    assert_eq!(conditions[0], ("debug".to_string(), "x64".to_string()));
    assert_eq!(conditions[3], ("release".to_string(), "win32".to_string()));

    let includes = doc.root.find_all(&["ItemDefinitionGroup", "ClCompile", "AdditionalIncludeDirectories"]);
    assert_eq!(includes.len(), 4);
    assert_eq!(includes[0].text(), "__INCLUDE_DIR__%(AdditionalIncludeDirectories)");
  }

  #[test]
  fn found_elements_outlive_the_path() {
    let doc = parse(WORLD);
    let found = {
      let names = vec!["ItemGroup".to_string(), "ProjectReference".to_string()];
      let path: Vec<&str> = names.iter().map(String::as_str).collect();
      doc.root.find_all(&path)
    };
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|e| e.name == "ProjectReference"));
  }

  #[test]
  fn serialization_is_stable() {
    let once  = parse(HOST).serialize();
    let twice = parse(&once).serialize();
    assert_eq!(once, twice);
    assert!(once.contains("Condition=\"'$(Configuration)|$(Platform)'=='Debug|x64'\""));
    assert!(once.contains("<Import Project=\"$(VCTargetsPath)\\Microsoft.Cpp.targets\" />\r\n"));
  }

  #[test]
  fn prefixed_namespaces_become_the_default() {
    let doc  = parse(WORLD);
    let text = doc.serialize();
    assert_eq!(doc.root.name, "Project");
    assert!(!text.contains("ns0:"));
    assert!(text.contains(&format!("<Project DefaultTargets=\"Build\" ToolsVersion=\"17.0\" xmlns=\"{}\">", MSBUILD_NS)));
    assert_eq!(text.matches("xmlns").count(), 1);
  }

  #[test]
  fn removes_zero_check_references() {
    let mut doc = parse(WORLD);
    assert_eq!(doc.remove_project_references("ZERO_CHECK"), 1);
    let names: Vec<_> = doc.root.find_all(&["ItemGroup", "ProjectReference", "Name"])
      .iter()
      .map(|n| n.text().to_string())
      .collect();
    assert_eq!(names, vec!["shapes"]);
  }

  #[test]
  fn appends_project_references() {
    let mut doc = parse(MAIN);
    doc.reference_group_mut().push(Element::new("ProjectReference")
      .with_attr("Include", "box2d\\lib\\box2d.vcxproj")
      .with_child(Element::new("Project").with_text("{B0000000-0000-0000-0000-000000000001}")));
    assert_eq!(doc.root.find_all(&["ItemGroup", "ProjectReference"]).len(), 3);

    let mut bare = parse("<Project><PropertyGroup /></Project>");
    bare.reference_group_mut().push(Element::new("ProjectReference"));
    assert_eq!(bare.root.find_all(&["ItemGroup", "ProjectReference"]).len(), 1);
  }

  #[test]
  fn escapes_text_and_attributes() {
    let mut doc = parse("<Project><A B=\"x &amp; y\">1 &lt; 2</A></Project>");
    let a = doc.root.child("A").unwrap();
    assert_eq!(a.attr("B"), Some("x & y"));
    assert_eq!(a.text(), "1 < 2");

    doc.root.for_each_mut(&["A"], &mut |a| a.set_attr("C", "\"quoted\""));
    let text = doc.serialize();
    assert!(text.contains("B=\"x &amp; y\""));
    assert!(text.contains("C=\"&quot;quoted&quot;\""));
    assert!(text.contains(">1 &lt; 2</A>"));
  }

  #[test]
  fn rejects_unbalanced_documents() {
    assert!(Document::parse_str("<Project><A></Project>", Path::new("a")).is_err());
    assert!(Document::parse_str("<Project><A>", Path::new("a")).is_err());
    assert!(Document::parse_str("", Path::new("a")).is_err());
  }

  #[test]
  fn filters_msbuild_lists() {
    let defines = "WIN32;_WINDOWS;CMAKE_INTDIR=\"Debug\";SHAPES_STATIC;%(PreprocessorDefinitions)";
    assert_eq!(filter_list(defines, &["WIN32", "_WINDOWS", "CMAKE_INTDIR"]), vec!["SHAPES_STATIC"]);
    assert_eq!(filter_list("a;;b", &[]), vec!["a", "b"]);
  }
}
