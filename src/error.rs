use std::fmt::Display;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type GenResult<T> = Result<T, GenError>;

#[derive(Debug, Error)]
pub enum GenError {
  /// A required configuration value is missing or invalid. Always fatal.
  #[error("Invalid configuration: {0}")]
  Config(String),

  /// A template or generated project could not be parsed. Fatal for the
  /// platform being generated.
  #[error("Malformed project file {}{}: {message}", path.display(), line_suffix(*line))]
  Format {
    path:    PathBuf,
    line:    Option<usize>,
    message: String
  },

  /// The secondary build tool failed or produced an unexpected output.
  #[error("Failed to generate module '{module}': {message}")]
  Generation {
    module:  String,
    message: String
  },

  /// A configured root target does not exist in the generated project.
  #[error("Failed to link module '{module}': no target named '{target}'")]
  Link {
    module: String,
    target: String
  },

  /// The host cannot perform this kind of IDE integration.
  #[error("{0}")]
  Environment(String),

  #[error(transparent)]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Xml(#[from] quick_xml::Error)
}

fn line_suffix(line: Option<usize>) -> String {
  match line {
    None    => String::new(),
    Some(n) => format!(" (line {})", n)
  }
}

impl GenError {
  pub fn config<S: Into<String>>(msg: S) -> Self {
    GenError::Config(msg.into())
  }

  pub fn format<P: AsRef<Path>, M: Display>(path: P, line: Option<usize>, msg: M) -> Self {
    GenError::Format {
      path:    path.as_ref().to_path_buf(),
      line,
      message: msg.to_string()
    }
  }

  pub fn generation<M: Display>(module: &str, msg: M) -> Self {
    GenError::Generation {
      module:  module.to_string(),
      message: msg.to_string()
    }
  }

  pub fn link(module: &str, target: &str) -> Self {
    GenError::Link {
      module: module.to_string(),
      target: target.to_string()
    }
  }

  /// Recoverable errors skip a single module (or a linking phase) with a
  /// warning. Everything else aborts the platform being generated.
  pub fn is_recoverable(&self) -> bool {
    match self {
      GenError::Generation {..} |
      GenError::Link {..}       |
      GenError::Environment(_)  => true,
      _                         => false
    }
  }
}
