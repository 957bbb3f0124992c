//! Parsing Options of the `pn` binary.
//! `pn [-c CONFIG] [-f FORMAT] [-o OUTPUT] [--fire ID]... [--enabled] INPUT`

use clap::{Arg, ArgAction, Command};
use std::error::Error;
use std::path::PathBuf;

use crate::config::OutputFormat;

fn make_options_parser() -> clap::Command {
    let parser = Command::new("pn")
        .no_binary_name(true)
        .version("v0.1.0")
        .about("Load a PNML Petri net, play the token game and write the result")
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .help("PNML file to load"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .default_value("pn.toml"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .help("Output format, overrides the configuration file")
                .value_parser(["pnml", "json", "ron"]),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Where to write the resulting net, stdout when absent"),
        )
        .arg(
            Arg::new("fire")
                .long("fire")
                .value_name("ID")
                .action(ArgAction::Append)
                .help("Transition to fire; repeat to fire several in order"),
        )
        .arg(
            Arg::new("enabled")
                .short('e')
                .long("enabled")
                .action(ArgAction::SetTrue)
                .help("Print the enabled transitions before and after firing"),
        );
    parser
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub input: Option<PathBuf>,
    pub config: PathBuf,
    pub format: Option<OutputFormat>,
    pub output: Option<PathBuf>,
    pub fire: Vec<String>,
    pub list_enabled: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            input: None,
            config: PathBuf::from("pn.toml"),
            format: None,
            output: None,
            fire: Vec::new(),
            list_enabled: false,
        }
    }
}

impl Options {
    pub fn parse_from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let flags = shellwords::split(s)?;
        Self::parse_from_args(&flags)
    }

    pub fn parse_from_args(flags: &[String]) -> Result<Self, Box<dyn Error>> {
        let app = make_options_parser();
        let matches = app.try_get_matches_from(flags.iter())?;

        let format = match matches.get_one::<String>("format") {
            Some(raw) => Some(raw.parse::<OutputFormat>()?),
            None => None,
        };
        let config = matches
            .get_one::<String>("config")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("pn.toml"));

        Ok(Options {
            input: matches.get_one::<String>("input").map(PathBuf::from),
            config,
            format,
            output: matches.get_one::<String>("output").map(PathBuf::from),
            fire: matches
                .get_many::<String>("fire")
                .map(|ids| ids.cloned().collect())
                .unwrap_or_default(),
            list_enabled: matches.get_flag("enabled"),
        })
    }

    /// Fills what `self` left unset from `fallback` (e.g. flags taken from `PN_FLAGS`).
    pub fn merge(mut self, fallback: Options) -> Self {
        if self.input.is_none() {
            self.input = fallback.input;
        }
        if self.format.is_none() {
            self.format = fallback.format;
        }
        if self.output.is_none() {
            self.output = fallback.output;
        }
        if self.fire.is_empty() {
            self.fire = fallback.fire;
        }
        self.list_enabled |= fallback.list_enabled;
        self
    }
}
