//! Command-line entry point: parses the handful of flags worth having
//! outside a full editor integration, wires up logging, and otherwise drives
//! a small demonstration loop over the public coordinator API.

use std::env;
use std::sync::Arc;

use anyhow::Context;
use project_coordinator::{Coordinator, OpenFileArgs, RealHost};

pub fn main() {
    let exit_code = main_inner();
    std::process::exit(exit_code);
}

fn main_inner() -> i32 {
    env_logger::init();

    if let Some(first_arg) = env::args().nth(1) {
        return match first_arg.as_str() {
            "--version" | "-V" => {
                println!("{}", version());
                0
            }
            "--help" | "-h" => {
                println!("{}", help());
                0
            }
            unknown => {
                println!("Unknown argument '{}'. Supported arguments:\n{}", unknown, help());
                101
            }
        };
    }

    match demo() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {:#}", err);
            1
        }
    }
}

/// Opens whatever files were passed on stdin-free invocation isn't supported
/// yet; this just demonstrates the coordinator reconciling a single file
/// with no surrounding project, the way an editor's first `openClientFile`
/// call would.
fn demo() -> anyhow::Result<()> {
    let host = Arc::new(RealHost::new());
    let coordinator = Coordinator::new(host);
    let cwd = env::current_dir().context("getting current directory")?;
    let result = coordinator.open_client_file(OpenFileArgs {
        path: cwd.join("scratch.ts"),
        contents: Some(String::new()),
        kind: None,
        project_root_path: None,
    });
    coordinator.wait_for_quiescence();
    println!("resolved config file: {:?}", result.config_file_name);
    Ok(())
}

fn version() -> String {
    format!("project-coordinator {}", env!("CARGO_PKG_VERSION"))
}

fn help() -> &'static str {
    r#"
    --version or -V to print the version
    --help or -h for this message
    No arguments runs a small demonstration reconciliation
    "#
}
