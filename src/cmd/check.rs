use clap::App;
use log::{info, warn};

use crate::ctx::{Command, Context, RunResult};
use crate::error::GenError;
use crate::tree::{self, Platform};

/// Template entry each platform can't generate without.
const TEMPLATES: &[(Platform, &str)] = &[
  (Platform::Macos,   "apple/app.xcodeproj/project.pbxproj"),
  (Platform::Ios,     "apple/app.xcodeproj/project.pbxproj"),
  (Platform::Windows, "windows/__project__.sln"),
  (Platform::Windows, "windows/__project__/__project__.vcxproj"),
  (Platform::Android, "android/__project__"),
  (Platform::Cmake,   "cmake/CMakeLists.txt")
];

pub struct Check;

impl Command for Check {
  fn init<'a, 'b>(&self, cmd: App<'a, 'b>) -> App<'a, 'b> {
    cmd.about("Checks whether the project's configuration is valid")
  }

  fn run(&self, ctx: &Context) -> RunResult {
    let templates = ctx.templates();
    for (platform, entry) in TEMPLATES {
      if ctx.is_selected(*platform) && !templates.join(entry).exists() {
        return Err(GenError::config(format!("missing {} template {}", platform,
                                            templates.join(entry).display())).into());
      }
    }

    for ext in &ctx.config.externals {
      if !ctx.input_dir.join(&ext.path).join("CMakeLists.txt").is_file() {
        warn!("External module {} has no CMakeLists.txt in {}", ext.name, ext.path);
      }
    }

    info!("Configuration of {} is valid ({} source files)", ctx.config.name, tree::files(ctx.sources).len());
    Ok(())
  }
}
