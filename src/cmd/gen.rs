use clap::{App, Arg};
use log::{debug, info, warn};

use crate::ctx::{Command, Context, RunResult};
use crate::tree::Platform;

pub struct Gen;

impl Command for Gen {
  fn init<'a, 'b>(&self, cmd: App<'a, 'b>) -> App<'a, 'b> {
    cmd.about("Generates the project files of the selected platforms")
      .arg(Arg::with_name("platform")
           .short("p")
           .long("platform")
           .value_name("PLATFORM")
           .help("Only generates these platforms")
           .possible_values(&["android", "apple", "macos", "ios", "windows", "cmake"])
           .takes_value(true)
           .multiple(true))
  }

  fn run(&self, ctx: &Context) -> RunResult {
    if !Platform::ALL.iter().any(|&t| ctx.is_selected(t)) {
      warn!("No selected platform is a target of the project");
      return Ok(());
    }

    for (name, g) in &ctx.generators {
      match Platform::ALL.iter().any(|&t| g.supports_target(t) && ctx.is_selected(t)) {
        false => debug!("Skipping {}", name),
        true  => {
          info!("Running the {} generator", name);
          g.run(ctx)?;
        }
      }
    }
    Ok(())
  }
}
