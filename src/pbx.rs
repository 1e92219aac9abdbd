//! Reader and writer for the Xcode `project.pbxproj` format.
//!
//! The objects dictionary of a project is grouped by type, each group wrapped
//! in comment markers:
//!
//! ```text
//! /* Begin PBXGroup section */
//!     <OBJECT-ID> /* <OBJECT-NAME> */ = { ... };
//! /* End PBXGroup section */
//! ```
//!
//! A project is read into an ordered list of sections, each holding the raw
//! text of its objects. Text outside of the sections (the archive header, the
//! gaps between sections and the trailing `rootObject`) is kept verbatim so
//! that writing an unmodified project reproduces the input byte for byte.
//!
//! Objects are edited through `Block`, which understands just enough of the
//! property list syntax to locate fields, lists and nested build settings.
//! Braces and separators inside quoted strings and comments are ignored.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::{GenError, GenResult};

const BEGIN:  &str = "/* Begin ";
const END:    &str = "/* End ";
const SUFFIX: &str = " section */";

/// One object of the project, stored as its exact source text (including the
/// trailing line break).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block(String);

#[derive(Clone, Debug)]
pub struct Section {
  pub name:   String,
  pub blocks: Vec<Block>,
  begin:      String,
  end:        String,
  trailer:    String
}

#[derive(Clone, Debug)]
pub struct PbxProject {
  pub path: PathBuf,
  header:   String,
  sections: Vec<Section>,
  footer:   String
}

impl Section {
  fn new(name: &str) -> Self {
    Section {
      name:    name.to_string(),
      blocks:  Vec::new(),
      begin:   [BEGIN, name, SUFFIX, "\n"].concat(),
      end:     [END,   name, SUFFIX, "\n"].concat(),
      trailer: String::new()
    }
  }

  pub fn find(&self, id: &str) -> Option<&Block> {
    self.blocks.iter().find(|b| b.id() == id)
  }

  pub fn find_mut(&mut self, id: &str) -> Option<&mut Block> {
    self.blocks.iter_mut().find(|b| b.id() == id)
  }
}

impl PbxProject {
  pub fn parse<P: AsRef<Path>>(path: P) -> GenResult<Self> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    Self::parse_str(&text, path)
  }

  /// Splits `text` into sections and objects. `path` is only used to report
  /// errors.
  pub fn parse_str(text: &str, path: &Path) -> GenResult<Self> {
    let err = |line: usize, msg: String| GenError::format(path, Some(line), msg);

    let mut header   = String::new();
    let mut sections = Vec::<Section>::new();
    let mut gap      = String::new();
    let mut current  = None::<Section>;
    let mut block    = String::new();
    let mut depth    = 0i32; // Within the current object.
    let mut nesting  = 0i32; // Within the whole file.
    let mut lineno   = 0;

    for line in text.split_inclusive('\n') {
      lineno += 1;

      if !track_braces(line, &mut nesting) {
        return Err(err(lineno, "unbalanced '}'".into()));
      }

      let mut closed = false;
      let mut opened = None;
      match current.as_mut() {
        None => match marker(line, BEGIN) {
          Some(name) => {
            let mut section = Section::new(name);
            section.begin   = line.to_string();
            opened = Some(section);
          },
          None => match marker(line, END) {
            Some(name) => return Err(err(lineno, format!("end of section {} without a beginning", name))),
            None       => gap.push_str(line)
          }
        },

        Some(section) => {
          if depth == 0 {
            if let Some(name) = marker(line, END) {
              if name != section.name {
                return Err(err(lineno, format!("section {} closed as {}", section.name, name)));
              }
              section.end = line.to_string();
              closed      = true;
            }
            else if let Some(name) = marker(line, BEGIN) {
              return Err(err(lineno, format!("section {} opened inside {}", name, section.name)));
            }
          }
          else if marker(line, END).is_some() || marker(line, BEGIN).is_some() {
            return Err(err(lineno, format!("unterminated object in section {}", section.name)));
          }

          if !closed {
            if !track_braces(line, &mut depth) {
              return Err(err(lineno, "unbalanced '}'".into()));
            }
            block.push_str(line);
            if depth == 0 {
              section.blocks.push(Block(std::mem::take(&mut block)));
            }
          }
        }
      }

      if opened.is_some() {
        let text = std::mem::take(&mut gap);
        match sections.last_mut() {
          None    => header    = text,
          Some(s) => s.trailer = text
        }
        current = opened;
      }
      if closed {
        if let Some(section) = current.take() {
          sections.push(section);
        }
      }
    }

    if let Some(section) = current {
      return Err(err(lineno, format!("unterminated section {}", section.name)));
    }
    if nesting != 0 {
      return Err(err(lineno, "unbalanced '{'".into()));
    }

    let footer = match sections.is_empty() {
      true  => { header = gap; String::new() },
      false => gap
    };

    Ok(PbxProject { path: path.to_path_buf(), header, sections, footer })
  }

  pub fn serialize(&self) -> String {
    let mut out = String::with_capacity(self.header.len() + self.sections.len() * 1024);
    out.push_str(&self.header);
    for section in &self.sections {
      out.push_str(&section.begin);
      for block in &section.blocks {
        out.push_str(&block.0);
      }
      out.push_str(&section.end);
      out.push_str(&section.trailer);
    }
    out.push_str(&self.footer);
    out
  }

  pub fn write<P: AsRef<Path>>(&self, path: P) -> GenResult<()> {
    fs::write(path, self.serialize())?;
    Ok(())
  }

  pub fn section_names(&self) -> Vec<&str> {
    self.sections.iter().map(|s| s.name.as_str()).collect()
  }

  pub fn section(&self, name: &str) -> Option<&Section> {
    self.sections.iter().find(|s| s.name == name)
  }

  /// Returns the named section, creating it at its sorted position when the
  /// project doesn't have one yet.
  pub fn section_mut(&mut self, name: &str) -> &mut Section {
    let index = match self.sections.iter().position(|s| s.name == name) {
      Some(i) => i,
      None    => {
        let i = self.sections.iter()
          .position(|s| s.name.as_str() > name)
          .unwrap_or_else(|| self.sections.len());

        let mut section = Section::new(name);
        if i == self.sections.len() {
          if let Some(last) = self.sections.last_mut() {
            last.trailer = "\n".into();
          }
        }
        else {
          section.trailer = "\n".into();
        }
        self.sections.insert(i, section);
        i
      }
    };
    &mut self.sections[index]
  }

  /// Objects of the named section, empty if the section doesn't exist.
  pub fn blocks(&self, section: &str) -> &[Block] {
    match self.section(section) {
      None    => &[],
      Some(s) => &s.blocks
    }
  }

  pub fn find(&self, id: &str) -> Option<&Block> {
    self.sections.iter().find_map(|s| s.find(id))
  }

  pub fn find_mut(&mut self, id: &str) -> Option<&mut Block> {
    self.sections.iter_mut().find_map(|s| s.find_mut(id))
  }

  pub fn add(&mut self, section: &str, block: Block) {
    self.section_mut(section).blocks.push(block);
  }

  pub fn remove(&mut self, id: &str) -> Option<Block> {
    for section in &mut self.sections {
      if let Some(i) = section.blocks.iter().position(|b| b.id() == id) {
        return Some(section.blocks.remove(i));
      }
    }
    None
  }

  /// The `PBXProject` object.
  pub fn root(&self) -> Option<&Block> {
    self.blocks("PBXProject").first()
  }

  pub fn root_mut(&mut self) -> Option<&mut Block> {
    self.sections.iter_mut()
      .find(|s| s.name == "PBXProject")
      .and_then(|s| s.blocks.first_mut())
  }

  /// Replaces every occurrence of `from`, including text outside of objects.
  pub fn substitute(&mut self, from: &str, to: &str) {
    self.header = self.header.replace(from, to);
    self.footer = self.footer.replace(from, to);
    for section in &mut self.sections {
      for block in &mut section.blocks {
        block.substitute(from, to);
      }
    }
  }
}

impl Block {
  pub fn new<S: Into<String>>(text: S) -> Self {
    let mut text = text.into();
    if !text.ends_with('\n') {
      text.push('\n');
    }
    Block(text)
  }

  /// Single line object, the way Xcode writes build files and file references.
  pub fn inline(indent: &str, id: &str, comment: &str, fields: &[(&str, &str)]) -> Self {
    let mut text = format!("{}{} /* {} */ = {{", indent, id, comment);
    for (k, v) in fields {
      text.push_str(k);
      text.push_str(" = ");
      text.push_str(v);
      text.push_str("; ");
    }
    text.push_str("};\n");
    Block(text)
  }

  /// Multi-line object, one field per line.
  pub fn multiline(indent: &str, id: &str, comment: &str, fields: &[(&str, String)]) -> Self {
    let mut text = format!("{}{} /* {} */ = {{\n", indent, id, comment);
    for (k, v) in fields {
      text.push_str(&format!("{}\t{} = {};\n", indent, k, v));
    }
    text.push_str(indent);
    text.push_str("};\n");
    Block(text)
  }

  pub fn text(&self) -> &str {
    &self.0
  }

  pub fn id(&self) -> &str {
    self.0.split_whitespace().next().unwrap_or("")
  }

  /// The comment following the object identifier.
  pub fn comment(&self) -> Option<&str> {
    let head  = &self.0[..self.0.find('=')?];
    let start = head.find("/*")? + 2;
    let end   = head[start..].find("*/")? + start;
    Some(head[start..end].trim())
  }

  pub fn isa(&self) -> Option<&str> {
    self.field("isa")
  }

  /// Raw value of a top-level field, comments included.
  pub fn field(&self, name: &str) -> Option<&str> {
    self.find_field(name, 1).map(|r| self.0[r].trim_end())
  }

  /// Value of a top-level field without its comment or quotes.
  pub fn field_value(&self, name: &str) -> Option<String> {
    self.field(name).map(|v| unquote(strip_comment(v)))
  }

  pub fn set_field(&mut self, name: &str, value: &str) {
    match self.find_field(name, 1) {
      Some(range) => self.0.replace_range(range, value),
      None        => {
        if let Some(close) = self.0.rfind('}') {
          self.insert_entry(close, name, value);
        }
      }
    }
  }

  /// Value of an entry in the `buildSettings` dictionary, as a list of
  /// unquoted strings (a scalar value gives a single element).
  pub fn setting(&self, key: &str) -> Vec<String> {
    let range = match self.find_field(key, 2) {
      None    => return Vec::new(),
      Some(r) => r
    };
    let value = self.0[range].trim();
    match value.starts_with('(') {
      true  => split_items(&value[1..value.len() - 1]).into_iter().map(unquote).collect(),
      false => vec![unquote(value)]
    }
  }

  pub fn has_setting(&self, key: &str) -> bool {
    self.find_field(key, 2).is_some()
  }

  /// Sets an entry of the `buildSettings` dictionary, adding it if missing.
  pub fn set_setting(&mut self, key: &str, value: &str) {
    if let Some(range) = self.find_field(key, 2) {
      self.0.replace_range(range, value);
      return;
    }
    if let Some(range) = self.find_field("buildSettings", 1) {
      if let Some(close) = self.0[range.clone()].rfind('}') {
        self.insert_entry(range.start + close, key, value);
      }
    }
  }

  pub fn remove_setting(&mut self, key: &str) -> bool {
    let range = match self.find_field(key, 2) {
      None    => return false,
      Some(r) => r
    };
    let start = self.0[..range.start].rfind('\n').map_or(0, |p| p + 1);
    let end   = self.0[range.end..].find('\n').map_or(self.0.len(), |p| range.end + p + 1);
    self.0.replace_range(start..end, "");
    true
  }

  /// Items of a list field, with their comments.
  pub fn list_items(&self, field: &str) -> Vec<String> {
    match self.list_range(field) {
      None               => Vec::new(),
      Some((open, close)) => split_items(&self.0[open + 1..close])
        .into_iter()
        .map(str::to_string)
        .collect()
    }
  }

  /// Object identifiers referenced by a list field.
  pub fn list_ids(&self, field: &str) -> Vec<String> {
    self.list_items(field).iter().map(|i| unquote(strip_comment(i))).collect()
  }

  /// Inserts `entries` at the start of a list field, right after its opening
  /// line. Returns false if the block has no such field.
  pub fn insert_into_list(&mut self, field: &str, entries: &[String]) -> bool {
    let (open, close) = match self.list_range(field) {
      None    => return false,
      Some(r) => r
    };
    if entries.is_empty() {
      return true;
    }

    match self.0[open..close].find('\n') {
      None    => self.rebuild_list(open, close, entries, true),
      Some(p) => {
        let pos    = open + p + 1;
        let indent = self.entry_indent(open, pos, close);
        let text: String = entries.iter().map(|e| format_entry(&indent, e)).collect();
        self.0.insert_str(pos, &text);
      }
    }
    true
  }

  /// Appends `entries` at the end of a list field. Returns false if the block
  /// has no such field.
  pub fn push_into_list(&mut self, field: &str, entries: &[String]) -> bool {
    let (open, close) = match self.list_range(field) {
      None    => return false,
      Some(r) => r
    };
    if entries.is_empty() {
      return true;
    }

    let line_start = self.0[..close].rfind('\n').map_or(0, |p| p + 1);
    match line_start > open && self.0[line_start..close].trim().is_empty() {
      false => self.rebuild_list(open, close, entries, false),
      true  => {
        let first  = self.0[open..close].find('\n').map_or(close, |p| open + p + 1);
        let indent = self.entry_indent(open, first, close);
        let text: String = entries.iter().map(|e| format_entry(&indent, e)).collect();
        self.0.insert_str(line_start, &text);
      }
    }
    true
  }

  /// Removes the list items for which `pred` holds, returning how many were
  /// removed. The predicate receives the item without its trailing comma.
  pub fn remove_list_items<F: Fn(&str) -> bool>(&mut self, field: &str, pred: F) -> usize {
    let (open, close) = match self.list_range(field) {
      None    => return 0,
      Some(r) => r
    };

    let inner = &self.0[open + 1..close];
    let mut removed = 0;
    let text: String = match inner.contains('\n') {
      true => inner.split_inclusive('\n')
        .filter(|line| {
          let item = line.trim().trim_end_matches(',').trim_end();
          let drop = !item.is_empty() && pred(item);
          if drop {
            removed += 1;
          }
          !drop
        })
        .collect(),
      false => {
        let items = split_items(inner);
        let kept: Vec<&str> = items.iter().cloned().filter(|i| !pred(i)).collect();
        removed = items.len() - kept.len();
        kept.iter().map(|i| [*i, ", "].concat()).collect()
      }
    };

    if removed > 0 {
      self.0.replace_range(open + 1..close, &text);
    }
    removed
  }

  pub fn substitute(&mut self, from: &str, to: &str) {
    if self.0.contains(from) {
      self.0 = self.0.replace(from, to);
    }
  }

  pub fn contains(&self, text: &str) -> bool {
    self.0.contains(text)
  }

  fn list_range(&self, field: &str) -> Option<(usize, usize)> {
    let range = self.find_field(field, 1)?;
    let value = &self.0[range.clone()];
    match value.starts_with('(') {
      false => None,
      true  => Some((range.start, range.start + value.rfind(')')?))
    }
  }

  /// Indentation of list entries: the first entry's if any, else one level
  /// deeper than the line holding the field.
  fn entry_indent(&self, open: usize, first: usize, close: usize) -> String {
    if first < close {
      let line = &self.0[first..close];
      let ws   = leading_ws(line);
      let rest = &line[ws.len()..];
      if !rest.is_empty() && !rest.starts_with(')') {
        return ws.to_string();
      }
    }
    let line_start = self.0[..open].rfind('\n').map_or(0, |p| p + 1);
    [leading_ws(&self.0[line_start..]), "\t"].concat()
  }

  /// Rewrites a single-line list in the multi-line layout, adding entries.
  fn rebuild_list(&mut self, open: usize, close: usize, entries: &[String], front: bool) {
    let line_start = self.0[..open].rfind('\n').map_or(0, |p| p + 1);
    let outer      = leading_ws(&self.0[line_start..]).to_string();
    let indent     = [outer.as_str(), "\t"].concat();

    let existing: Vec<String> = split_items(&self.0[open + 1..close])
      .into_iter()
      .map(str::to_string)
      .collect();
    let items: Vec<&String> = match front {
      true  => entries.iter().chain(existing.iter()).collect(),
      false => existing.iter().chain(entries.iter()).collect()
    };

    let mut text = String::from("\n");
    for item in items {
      text.push_str(&format_entry(&indent, item));
    }
    text.push_str(&outer);
    self.0.replace_range(open + 1..close, &text);
  }

  /// Inserts `name = value;` before the dictionary closing brace at `close`.
  fn insert_entry(&mut self, close: usize, name: &str, value: &str) {
    let line_start = self.0[..close].rfind('\n').map_or(0, |p| p + 1);
    match self.0[line_start..close].trim().is_empty() {
      true  => {
        let indent = [&self.0[line_start..close], "\t"].concat();
        self.0.insert_str(line_start, &format!("{}{} = {};\n", indent, name, value));
      },
      false => self.0.insert_str(close, &format!("{} = {}; ", name, value))
    }
  }

  /// Locates the value of `name` at the given dictionary depth, up to but
  /// excluding the terminating ';'.
  fn find_field(&self, name: &str, depth: i32) -> Option<Range<usize>> {
    let text  = &self.0;
    let code  = code_chars(text);
    let mut level = 0;

    for (k, &(i, c)) in code.iter().enumerate() {
      match c {
        '{' => { level += 1; continue },
        '}' => { level -= 1; continue },
        _   => {}
      }
      if level != depth || !text[i..].starts_with(name) {
        continue;
      }
      if text[..i].chars().last().map_or(false, is_ident) {
        continue;
      }

      let after = i + name.len();
      let rest  = &text[after..];
      let rest  = rest.trim_start_matches(|c: char| c == ' ' || c == '\t');
      if !rest.starts_with('=') {
        continue;
      }
      let eq    = text.len() - rest.len();
      let start = eq + 1 + leading_ws(&text[eq + 1..]).len();

      let mut nested = 0;
      for &(j, c) in &code[k..] {
        if j < start {
          continue;
        }
        match c {
          '{' | '(' => nested += 1,
          '}' | ')' => nested -= 1,
          ';' if nested == 0 => return Some(start..j),
          _ => {}
        }
      }
      return None;
    }
    None
  }
}

/// Inserts `entries` into the list `field` of a single object's text. The
/// text is returned unchanged if the field can't be found.
pub fn insert_into_list(block: &str, entries: &[String], field: &str) -> String {
  let mut b = Block(block.to_string());
  b.insert_into_list(field, entries);
  b.0
}

/// Quotes a value unless it only contains characters allowed in bare strings.
pub fn quote(value: &str) -> String {
  let bare = !value.is_empty() && value.chars().all(|c| {
    c.is_ascii_alphanumeric() || "_$/:.-".contains(c)
  });
  match bare {
    true  => value.to_string(),
    false => format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
  }
}

pub fn unquote(value: &str) -> String {
  let v = value.trim();
  match v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
    true  => v[1..v.len() - 1].replace("\\\"", "\"").replace("\\\\", "\\"),
    false => v.to_string()
  }
}

/// Drops a trailing `/* comment */` from a value.
pub fn strip_comment(value: &str) -> &str {
  match value.find("/*") {
    None    => value.trim(),
    Some(p) => value[..p].trim()
  }
}

fn format_entry(indent: &str, entry: &str) -> String {
  let entry = entry.trim();
  match entry.ends_with(',') {
    true  => format!("{}{}\n", indent, entry),
    false => format!("{}{},\n", indent, entry)
  }
}

fn marker<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
  line.trim().strip_prefix(prefix)?.strip_suffix(SUFFIX)
}

fn leading_ws(s: &str) -> &str {
  &s[..s.len() - s.trim_start_matches(|c: char| c == ' ' || c == '\t').len()]
}

fn is_ident(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

/// Updates `depth` with the braces of `line`. Returns false as soon as the
/// depth goes negative.
fn track_braces(line: &str, depth: &mut i32) -> bool {
  for (_, c) in code_chars(line) {
    match c {
      '{' => *depth += 1,
      '}' => {
        *depth -= 1;
        if *depth < 0 {
          return false;
        }
      },
      _ => {}
    }
  }
  true
}

/// Splits list contents on top-level commas.
fn split_items(inner: &str) -> Vec<&str> {
  let mut items = Vec::new();
  let mut start = 0;
  let mut depth = 0;
  for (i, c) in code_chars(inner) {
    match c {
      '(' | '{' => depth += 1,
      ')' | '}' => depth -= 1,
      ',' if depth == 0 => {
        items.push(inner[start..i].trim());
        start = i + 1;
      },
      _ => {}
    }
  }
  items.push(inner[start..].trim());
  items.retain(|i| !i.is_empty());
  items
}

/// Characters outside of quoted strings and comments, with their offsets.
fn code_chars(text: &str) -> Vec<(usize, char)> {
  let mut out   = Vec::new();
  let mut chars = text.char_indices().peekable();
  while let Some((i, c)) = chars.next() {
    let next = chars.peek().map(|&(_, c)| c);
    match c {
      '"' => {
        while let Some((_, c)) = chars.next() {
          match c {
            '\\' => { chars.next(); },
            '"'  => break,
            _    => {}
          }
        }
      },
      '/' if next == Some('*') => {
        chars.next();
        let mut prev = ' ';
        for (_, c) in chars.by_ref() {
          if prev == '*' && c == '/' {
            break;
          }
          prev = c;
        }
      },
      _ => out.push((i, c))
    }
  }
  out
}
