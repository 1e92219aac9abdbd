//! Deterministic identifier allocation.
//!
//! Every object in a generated project needs a unique identifier: 24 hex
//! digits for Xcode objects, a braced GUID for Visual Studio projects and
//! filters. Identifiers are derived from a SHA-256 digest of a namespaced
//! key (such as `GROUP://../../source/scenes`), so regenerating a project
//! from the same sources yields the same identifiers and diffs stay small.
//!
//! A two character role tag is then written over the first two digits to
//! make objects recognizable when reading the generated files.

use log::warn;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

/// The identifier syntax of a project dialect.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Dialect {
  Apple,
  Windows
}

impl Dialect {
  pub fn separator(self) -> char {
    match self {
      Dialect::Apple   => '/',
      Dialect::Windows => '\\'
    }
  }

  /// Builds a namespaced key, using the dialect's path separator.
  pub fn key(self, category: &str, path: &str) -> String {
    match self {
      Dialect::Apple   => [category, "://", path].concat(),
      Dialect::Windows => [category, ":\\\\", path].concat()
    }
  }
}

/// Semantic role of an identifier. The tag is purely cosmetic, uniqueness
/// comes from the untagged digits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
  Asset,
  AssetBuildMac,
  AssetBuildIos,
  File,
  SourceBuildMac,
  SourceBuildIos,
  Project,
  ProductGroup,
  Library,
  ContainerProxy,
  Group,
  ReferenceProxy,
  FrameworkBuild,
  FrameworkRef,
  SolutionFolder
}

impl Role {
  pub fn tag(self) -> &'static str {
    match self {
      Role::Asset          => "AA",
      Role::AssetBuildMac  => "AB",
      Role::AssetBuildIos  => "AC",
      Role::File           => "BA",
      Role::SourceBuildMac => "BB",
      Role::SourceBuildIos => "BC",
      Role::Project        => "CA",
      Role::ProductGroup   => "CB",
      Role::Library        => "CC",
      Role::Group          => "CD",
      Role::ContainerProxy => "CE",
      Role::ReferenceProxy => "CF",
      Role::FrameworkBuild => "DA",
      Role::FrameworkRef   => "DB",
      Role::SolutionFolder => "DC"
    }
  }
}

pub const DEFAULT_SALT: &str = "buildgen";

/// Allocates identifiers for one generation run.
pub struct Ids {
  salt:       String,
  cache:      HashMap<(Dialect, String), String>,
  seen:       HashMap<String, String>,
  collisions: usize
}

impl Ids {
  pub fn new(salt: &str) -> Self {
    Ids {
      salt:       salt.to_string(),
      cache:      HashMap::new(),
      seen:       HashMap::new(),
      collisions: 0
    }
  }

  /// Returns the identifier for `key`. Identical keys always map to the same
  /// identifier.
  pub fn identifier_for(&mut self, dialect: Dialect, key: &str) -> String {
    if let Some(id) = self.cache.get(&(dialect, key.to_string())) {
      return id.clone();
    }

    let digest = self.digest(key);
    let id = match dialect {
      Dialect::Apple   => apple_id(&digest),
      Dialect::Windows => windows_id(&digest)
    };

    self.record(&id, key);
    self.cache.insert((dialect, key.to_string()), id.clone());
    id
  }

  pub fn apple(&mut self, key: &str) -> String {
    self.identifier_for(Dialect::Apple, key)
  }

  pub fn windows(&mut self, key: &str) -> String {
    self.identifier_for(Dialect::Windows, key)
  }

  /// Allocates an identifier and applies the role tag in one step. The tag
  /// replaces digits, so the tagged identifier is checked again.
  pub fn tagged(&mut self, dialect: Dialect, role: Role, key: &str) -> String {
    let id     = self.identifier_for(dialect, key);
    let tagged = apply_role_prefix(&id, role.tag());
    if tagged != id {
      self.record(&tagged, &[role.tag(), " ", key].concat());
    }
    tagged
  }

  pub fn len(&self) -> usize {
    self.cache.len()
  }

  /// Number of identifiers handed out twice for different keys.
  pub fn collisions(&self) -> usize {
    self.collisions
  }

  fn record(&mut self, id: &str, label: &str) {
    if let Some(other) = self.seen.insert(id.to_string(), label.to_string()) {
      if other != label {
        warn!("Identifier collision between '{}' and '{}'", other, label);
        self.collisions += 1;
      }
    }
  }

  fn digest(&self, key: &str) -> [u8; 32] {
    let mut sha = Sha256::new();
    sha.update(self.salt.as_bytes());
    sha.update(&[0]);
    sha.update(key.as_bytes());

    let mut out = [0u8; 32];
    out.copy_from_slice(&sha.finalize());
    out
  }
}

/// Overwrites the leading characters of `id` with `tag`. Braces around GUIDs
/// are skipped so the tag lands on the digits.
pub fn apply_role_prefix(id: &str, tag: &str) -> String {
  let start = match id.starts_with('{') {
    true  => 1,
    false => 0
  };
  let end = (start + tag.len()).min(id.len());
  [&id[..start], tag, &id[end..]].concat()
}

fn apple_id(digest: &[u8]) -> String {
  let mut id = String::with_capacity(24);
  for b in &digest[..12] {
    id.push(hex_char(b >> 4));
    id.push(hex_char(b & 0xF));
  }
  id
}

fn windows_id(digest: &[u8]) -> String {
  let mut bytes = [0u8; 16];
  bytes.copy_from_slice(&digest[..16]);

  // Mark as a name-based GUID so tools treat it as a regular identifier.
  bytes[6] = (bytes[6] & 0x0F) | 0x50;
  bytes[8] = (bytes[8] & 0x3F) | 0x80;

  Uuid::from_bytes(bytes).to_string().to_uppercase()
}

fn hex_char(b: u8) -> char {
  match b < 10 {
    true  => (b'0' + b)        as char,
    false => (b'A' + (b - 10)) as char
  }
}

/// Checks the Visual Studio GUID syntax: 8-4-4-4-12 uppercase hex digits.
pub fn is_guid(s: &str) -> bool {
  let parts: Vec<&str> = s.split('-').collect();
  parts.len() == 5 &&
    parts.iter().zip([8, 4, 4, 4, 12].iter()).all(|(p, &n)| {
      p.len() == n && p.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
    })
}
