//! # CLI
//!
//! This module defines the command-line interface of `grpcmd` using `clap`.
//!
//! It is responsible for parsing user input and performing validation (e.g., ensuring headers are `key:value`);
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "grpcmd", version, about = "Call gRPC methods by name")]
pub struct Cli {
    #[command(flatten)]
    pub schema: SchemaArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the schema of the server comes from. Server reflection is used when none is given.
#[derive(Args, Debug, Default)]
pub struct SchemaArgs {
    /// Proto file describing the server (may be repeated)
    #[arg(long = "proto", global = true, conflicts_with = "file_descriptor_set")]
    pub protos: Vec<PathBuf>,

    /// Directory searched for imports of the proto files (may be repeated)
    #[arg(short = 'I', long = "import-path", global = true)]
    pub import_paths: Vec<PathBuf>,

    /// Path to an encoded descriptor set (.bin)
    #[arg(long, global = true)]
    pub file_descriptor_set: Option<PathBuf>,
}

impl SchemaArgs {
    pub fn is_local(&self) -> bool {
        !self.protos.is_empty() || self.file_descriptor_set.is_some()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Call a method of a gRPC server
    ///
    /// The method may be named by any unambiguous part of its fully qualified name.
    /// The request is read from DATA, or from stdin when DATA is omitted: optional
    /// `Key: Value` header lines, a blank line, then zero or more JSON messages.
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// grpcmd call localhost:50051 UnaryEcho '{"message": "hello"}'
    /// printf 'authorization: Bearer 1234\n\n{"message": "hi"}' | grpcmd call localhost:50051 UnaryEcho
    /// ```
    Call {
        /// Server address (host:port or URL)
        address: String,
        /// Method name or any unambiguous part of it
        method: String,
        /// Request text: headers, blank line, JSON body
        data: Option<String>,

        /// Extra request header (may be repeated)
        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<String>,

        /// Print headers, responses and trailers as one JSON document
        #[arg(long)]
        result: bool,

        /// Split headers from the body at the first `{` instead of at a blank line
        #[arg(long)]
        heuristic: bool,
    },

    /// List the services of a server
    List {
        /// Server address, optional with --proto or --file-descriptor-set
        address: Option<String>,
    },

    /// List every service and its methods
    Methods {
        /// Server address, optional with --proto or --file-descriptor-set
        address: Option<String>,

        /// Print the shortest unambiguous name of each method instead
        #[arg(short, long)]
        short: bool,
    },

    /// Describe a method, its request and response messages
    Describe {
        /// Method name or any unambiguous part of it
        method: String,
        /// Server address, optional with --proto or --file-descriptor-set
        address: Option<String>,
    },

    /// Print a JSON request template for a method
    Template {
        /// Method name or any unambiguous part of it
        method: String,
        /// Server address, optional with --proto or --file-descriptor-set
        address: Option<String>,
    },

    /// Read and write persistent settings
    Config {
        #[command(subcommand)]
        sub: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the value of a key
    Get { key: String },
    /// Set the value of a key
    Set { key: String, value: String },
    /// Remove a key
    Remove { key: String },
    /// Print the name of every key changed until interrupted
    Watch,
}

fn parse_header(s: &str) -> Result<String, String> {
    s.split_once(':')
        .filter(|(k, _)| !k.trim().is_empty())
        .map(|(k, v)| format!("{}: {}", k.trim(), v.trim()))
        .ok_or_else(|| "Format must be 'key:value'".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header("x-key:v").unwrap(), "x-key: v");
        assert_eq!(parse_header(" a : b:c ").unwrap(), "a: b:c");
        assert!(parse_header("novalue").is_err());
        assert!(parse_header(":v").is_err());
    }

    #[test]
    fn test_parse_call() {
        let cli = Cli::try_parse_from([
            "grpcmd",
            "call",
            "localhost:50051",
            "Unary",
            "{}",
            "-H",
            "x-a:1",
            "--result",
        ])
        .unwrap();

        match cli.command {
            Commands::Call {
                address,
                method,
                data,
                headers,
                result,
                heuristic,
            } => {
                assert_eq!(address, "localhost:50051");
                assert_eq!(method, "Unary");
                assert_eq!(data.as_deref(), Some("{}"));
                assert_eq!(headers, vec!["x-a: 1"]);
                assert!(result);
                assert!(!heuristic);
            }
            _ => panic!("Expected the call command"),
        }
    }

    #[test]
    fn test_address_optional_with_local_schema() {
        let cli = Cli::try_parse_from(["grpcmd", "list", "--proto", "echo.proto"]).unwrap();

        assert!(cli.schema.is_local());
        assert!(matches!(cli.command, Commands::List { address: None }));
    }
}
