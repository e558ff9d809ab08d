//! Command line arguments
//!
//! Arguments use the `--key=value` form of the other Kiwi car programs:
//!
//! ```text
//! kiwi-car --cid=111 --name=img.argb --width=640 --height=480 --verbose
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use kiwi_bus::Direction;
use thiserror::Error;

/// Command line errors
#[derive(Error, Debug, PartialEq)]
pub enum CliError {
    #[error("Missing required argument --{0}")]
    Missing(&'static str),

    #[error("Invalid value for --{arg}: {value}")]
    Invalid { arg: &'static str, value: String },

    #[error("Unknown argument: {0}")]
    Unknown(String),

    /// `--help` was given
    #[error("Help requested")]
    HelpRequested,
}

/// How the leaving direction is picked once it is safe to go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionMode {
    /// Always the same direction
    Fixed(Direction),
    /// Ask the operator on the terminal
    Prompt,
}

impl FromStr for DirectionMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(DirectionMode::Fixed(Direction::Left)),
            "straight" => Ok(DirectionMode::Fixed(Direction::Straight)),
            "right" => Ok(DirectionMode::Fixed(Direction::Right)),
            "prompt" => Ok(DirectionMode::Prompt),
            _ => Err(()),
        }
    }
}

/// Parsed command line
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// Conference id of the bus session
    pub cid: u16,
    /// Name of the camera frame source
    pub name: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Detection stream path, `-` for stdin
    pub detections: String,
    pub direction: DirectionMode,
    /// Optional configuration file
    pub config: Option<PathBuf>,
    pub verbose: bool,
    /// Log as JSON lines instead of text
    pub json_logs: bool,
}

const FLAGS: &[&str] = &["verbose", "json-logs", "help"];
const OPTIONS: &[&str] = &[
    "cid",
    "name",
    "width",
    "height",
    "detections",
    "direction",
    "config",
];

impl CliArgs {
    /// Parse arguments, excluding the program name
    pub fn parse<I, S>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut values: HashMap<&'static str, String> = HashMap::new();
        let mut flags: Vec<&'static str> = Vec::new();

        for arg in args {
            let arg = arg.as_ref();
            let Some(body) = arg.strip_prefix("--") else {
                return Err(CliError::Unknown(arg.to_string()));
            };
            match body.split_once('=') {
                Some((key, value)) => {
                    let key = OPTIONS
                        .iter()
                        .find(|&&k| k == key)
                        .copied()
                        .ok_or_else(|| CliError::Unknown(arg.to_string()))?;
                    values.insert(key, value.to_string());
                }
                None => {
                    let flag = FLAGS
                        .iter()
                        .find(|&&f| f == body)
                        .copied()
                        .ok_or_else(|| CliError::Unknown(arg.to_string()))?;
                    flags.push(flag);
                }
            }
        }

        if flags.contains(&"help") {
            return Err(CliError::HelpRequested);
        }

        let width: u32 = parse_required(&values, "width")?;
        if width == 0 {
            return Err(CliError::Invalid {
                arg: "width",
                value: "0".into(),
            });
        }

        let direction = match values.get("direction") {
            Some(value) => value.parse().map_err(|_| CliError::Invalid {
                arg: "direction",
                value: value.clone(),
            })?,
            None => DirectionMode::Prompt,
        };

        let name = values
            .get("name")
            .filter(|name| !name.is_empty())
            .cloned()
            .ok_or(CliError::Missing("name"))?;

        Ok(Self {
            cid: parse_required(&values, "cid")?,
            name,
            width,
            height: parse_required(&values, "height")?,
            detections: values
                .get("detections")
                .cloned()
                .unwrap_or_else(|| "-".to_string()),
            direction,
            config: values.get("config").map(PathBuf::from),
            verbose: flags.contains(&"verbose"),
            json_logs: flags.contains(&"json-logs"),
        })
    }

    /// Where the direction prompt reads from: stdin, unless stdin already
    /// carries the detection stream
    pub fn prompt_reads_terminal(&self) -> bool {
        self.direction == DirectionMode::Prompt && self.detections == "-"
    }
}

fn parse_required<T: FromStr>(
    values: &HashMap<&'static str, String>,
    arg: &'static str,
) -> Result<T, CliError> {
    let value = values.get(arg).ok_or(CliError::Missing(arg))?;
    value.parse().map_err(|_| CliError::Invalid {
        arg,
        value: value.clone(),
    })
}

/// Usage text
pub fn usage(program: &str) -> String {
    format!(
        "{program} waits at a 4-way stop until the intersection is clear, then \
leaves in the chosen direction.

Usage:   {program} --cid=<OD4 session> --name=<frame source> --width=<W> --height=<H> \
[--detections=<path|->] [--direction=<left|straight|right|prompt>] [--config=<file>] \
[--verbose] [--json-logs]
Example: {program} --cid=111 --name=img.argb --width=640 --height=480 --verbose

  --cid         conference id of the bus session
  --name        name of the camera frame source
  --width       frame width in pixels
  --height      frame height in pixels
  --detections  newline-delimited JSON detections, '-' for stdin (default)
  --direction   direction to leave in, or 'prompt' to ask (default)
  --config      configuration file (TOML, YAML or JSON)
  --verbose     debug logging
  --json-logs   log as JSON lines
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 4] = ["--cid=111", "--name=img.argb", "--width=640", "--height=480"];

    #[test]
    fn test_required_arguments() {
        let args = CliArgs::parse(REQUIRED).unwrap();
        assert_eq!(args.cid, 111);
        assert_eq!(args.name, "img.argb");
        assert_eq!(args.width, 640);
        assert_eq!(args.height, 480);
        assert_eq!(args.detections, "-");
        assert_eq!(args.direction, DirectionMode::Prompt);
        assert!(!args.verbose);
        assert!(args.prompt_reads_terminal());
    }

    #[test]
    fn test_optional_arguments() {
        let mut argv = REQUIRED.to_vec();
        argv.extend([
            "--detections=run.jsonl",
            "--direction=left",
            "--config=kiwi.toml",
            "--verbose",
        ]);
        let args = CliArgs::parse(argv).unwrap();
        assert_eq!(args.detections, "run.jsonl");
        assert_eq!(args.direction, DirectionMode::Fixed(Direction::Left));
        assert_eq!(args.config, Some(PathBuf::from("kiwi.toml")));
        assert!(args.verbose);
        assert!(!args.prompt_reads_terminal());
    }

    #[test]
    fn test_missing_argument() {
        assert_eq!(
            CliArgs::parse(["--cid=111", "--width=640", "--height=480"]),
            Err(CliError::Missing("name"))
        );
        assert_eq!(
            CliArgs::parse(["--name=img.argb", "--width=640", "--height=480"]),
            Err(CliError::Missing("cid"))
        );
    }

    #[test]
    fn test_invalid_values() {
        let mut argv = REQUIRED.to_vec();
        argv[2] = "--width=wide";
        assert!(matches!(
            CliArgs::parse(argv),
            Err(CliError::Invalid { arg: "width", .. })
        ));

        let mut argv = REQUIRED.to_vec();
        argv.push("--direction=back");
        assert!(matches!(
            CliArgs::parse(argv),
            Err(CliError::Invalid { arg: "direction", .. })
        ));

        let mut argv = REQUIRED.to_vec();
        argv[2] = "--width=0";
        assert!(CliArgs::parse(argv).is_err());
    }

    #[test]
    fn test_unknown_and_help() {
        let mut argv = REQUIRED.to_vec();
        argv.push("--speed=3");
        assert_eq!(
            CliArgs::parse(argv),
            Err(CliError::Unknown("--speed=3".into()))
        );
        assert_eq!(CliArgs::parse(["--help"]), Err(CliError::HelpRequested));
        assert!(usage("kiwi-car").contains("--cid"));
    }
}
