use clap::{App, Arg};
use serde::Serialize;

use crate::ctx::{Command, Context, RunResult};
use crate::ids::{Dialect, Ids};
use crate::tree::{self, GroupTable, SourceTree};

pub struct Show;

#[derive(Serialize)]
struct Listing<'a> {
  sources: &'a SourceTree,
  root:    String,
  groups:  GroupTable
}

impl Command for Show {
  fn init<'a, 'b>(&self, cmd: App<'a, 'b>) -> App<'a, 'b> {
    cmd.about("Displays the source tree and its IDE groups as JSON")
      .arg(Arg::with_name("dialect")
           .short("d")
           .long("dialect")
           .help("Identifier dialect of the groups")
           .possible_values(&["apple", "windows"])
           .default_value("apple"))
  }

  fn run(&self, ctx: &Context) -> RunResult {
    let dialect = match ctx.args.subcommand_matches("show").and_then(|m| m.value_of("dialect")) {
      Some("windows") => Dialect::Windows,
      _               => Dialect::Apple
    };
    println!("{}", listing(ctx, dialect)?);
    Ok(())
  }
}

fn listing(ctx: &Context, dialect: Dialect) -> serde_json::Result<String> {
  let mut ids = Ids::new(ctx.config.salt());
  let (top, inner)   = tree::collapse_root(ctx.sources);
  let (root, groups) = tree::build_groups(top.unwrap_or(""), inner, &mut ids, dialect);
  serde_json::to_string_pretty(&Listing { sources: ctx.sources, root, groups })
}
