//! fetchmux CLI - Command-line interface
//!
//! Drives the fetchmux request service against real URLs. Useful for
//! observing coalescing: `fetchmux get URL URL URL` performs one transfer.

mod commands;
mod error;
mod logging;

use clap::{Parser, Subcommand};

use commands::common::RequestOptions;
use commands::get::GetArgs;
use commands::post::PostArgs;

#[derive(Parser)]
#[command(name = "fetchmux")]
#[command(version, about = "Coalesced HTTP downloads with progress", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one or more URLs; repeated URLs share one transfer
    Get {
        /// URLs to download
        #[arg(required = true)]
        urls: Vec<String>,

        #[command(flatten)]
        options: RequestOptions,
    },

    /// Send a POST request
    Post {
        /// Target URL
        url: String,

        /// JSON request body
        #[arg(long, conflicts_with = "form")]
        json: Option<String>,

        /// Form field, `key=value` (repeatable)
        #[arg(long, value_name = "KEY=VALUE")]
        form: Vec<String>,

        #[command(flatten)]
        options: RequestOptions,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Get { urls, options } => commands::get::run(GetArgs { urls, options }),
        Commands::Post {
            url,
            json,
            form,
            options,
        } => commands::post::run(PostArgs {
            url,
            json,
            form,
            options,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_get_with_options() {
        let cli = Cli::try_parse_from([
            "fetchmux",
            "-v",
            "get",
            "https://x/a",
            "https://x/a",
            "-H",
            "Accept: */*",
            "--priority",
            "0.9",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Get { urls, options } => {
                assert_eq!(urls.len(), 2);
                assert_eq!(options.headers, vec!["Accept: */*"]);
                assert_eq!(options.priority, 0.9);
                assert!(options.output.is_none());
            }
            _ => panic!("expected get"),
        }
    }

    #[test]
    fn test_parse_get_requires_url() {
        assert!(Cli::try_parse_from(["fetchmux", "get"]).is_err());
    }

    #[test]
    fn test_parse_post_form() {
        let cli = Cli::try_parse_from([
            "fetchmux",
            "post",
            "https://x/b",
            "--form",
            "k=v",
            "--form",
            "a=b",
        ])
        .unwrap();

        match cli.command {
            Commands::Post { form, json, .. } => {
                assert_eq!(form, vec!["k=v", "a=b"]);
                assert!(json.is_none());
            }
            _ => panic!("expected post"),
        }
    }

    #[test]
    fn test_parse_post_rejects_json_with_form() {
        let result = Cli::try_parse_from([
            "fetchmux",
            "post",
            "https://x/b",
            "--json",
            "{}",
            "--form",
            "k=v",
        ]);
        assert!(result.is_err());
    }
}
