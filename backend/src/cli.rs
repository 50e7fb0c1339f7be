//! Minimal CLI parsing for the request runner.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Default, PartialEq)]
pub struct CliOptions {
    /// Read JSON-lines requests from this file instead of stdin
    pub request_file: Option<PathBuf>,
    /// Print entity names and exit
    pub list_entities: bool,
    /// Print one entity descriptor and exit
    pub describe: Option<String>,
}

impl CliOptions {
    pub fn from_args() -> Self {
        Self::parse(env::args().skip(1))
    }

    fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut options = CliOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--entities" => options.list_entities = true,
                "--request" => {
                    if let Some(value) = args.next() {
                        options.request_file = Some(PathBuf::from(value));
                    }
                }
                "--describe" => {
                    if let Some(value) = args.next() {
                        options.describe = Some(value);
                    }
                }
                _ if arg.starts_with("--request=") => {
                    if let Some(value) = arg.split_once('=').map(|(_, v)| v) {
                        options.request_file = Some(PathBuf::from(value));
                    }
                }
                _ if arg.starts_with("--describe=") => {
                    if let Some(value) = arg.split_once('=').map(|(_, v)| v) {
                        options.describe = Some(value.to_string());
                    }
                }
                _ => {}
            }
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliOptions {
        CliOptions::parse(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn test_flags() {
        assert_eq!(parse(&[]), CliOptions::default());
        assert!(parse(&["--entities"]).list_entities);
        assert_eq!(parse(&["--describe", "Monitors"]).describe.as_deref(), Some("Monitors"));
        assert_eq!(
            parse(&["--request=batch.jsonl"]).request_file,
            Some(PathBuf::from("batch.jsonl"))
        );
    }
}
