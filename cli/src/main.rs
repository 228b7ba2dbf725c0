//! Thin illustrative binary: loads a [`schema_weaver::config::WeaverConfig`]
//! document from disk, weaves the configured endpoints, and prints the
//! resulting schema's SDL to stdout. Wiring this into an actual HTTP server
//! is an external collaborator's job; this binary only exercises the boot
//! path end to end.

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use schema_weaver::client::HttpGraphQlClient;
use schema_weaver::config::WeaverConfig;
use schema_weaver::Weaver;

#[derive(Parser)]
#[command(name = "schema-weaver", about = "Weaves upstream GraphQL endpoints into one schema")]
struct Args {
    /// Path to a JSON weaver configuration document.
    config: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let raw = match fs::read_to_string(&args.config) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("reading `{}`: {err}", args.config);
            return ExitCode::FAILURE;
        }
    };
    let config: WeaverConfig = match serde_json::from_str(&raw) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("parsing `{}`: {err}", args.config);
            return ExitCode::FAILURE;
        }
    };
    let endpoints = match config.validate() {
        Ok(endpoints) => endpoints,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let client = Arc::new(HttpGraphQlClient::default());
    match Weaver::build(endpoints, client).await {
        Ok(woven) => {
            println!("{}", woven.schema.sdl());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("weaving failed: {err}");
            ExitCode::FAILURE
        }
    }
}
