//! Code-generation CLI: fetches a database's schema descriptor (or reads it
//! from stdin) and emits a Rust module of typed accessors.
//!
//! ```text
//! stdb-codegen --host http://127.0.0.1:3000 --database mydb --output src/gen.rs
//! stdb-codegen --stdin --output -          # descriptor on stdin, code on stdout
//! ```

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use stdb_client::http::{HttpApi, TcpHttpTransport};
use stdb_client::{codegen, Error, Result, Schema};

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate typed accessors from a database schema")]
struct Args {
    /// Server base URL, e.g. http://127.0.0.1:3000
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    host: String,
    /// Database to fetch the schema for (required unless --stdin)
    #[arg(long)]
    database: Option<String>,
    /// Output path; "-" writes to standard output
    #[arg(long, default_value = "-")]
    output: String,
    /// Read the JSON schema descriptor from standard input instead of
    /// fetching it
    #[arg(long)]
    stdin: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("stdb-codegen: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let schema = if args.stdin {
        let mut descriptor = Vec::new();
        std::io::stdin().read_to_end(&mut descriptor)?;
        Schema::from_json(&descriptor)?
    } else {
        let database = args.database.as_deref().ok_or_else(|| {
            Error::RequestFailed("--database is required unless --stdin is given".into())
        })?;
        let api = HttpApi::new(args.host.clone(), TcpHttpTransport);
        api.schema(database)?
    };

    let code = codegen::generate(&schema)?;

    if args.output == "-" {
        std::io::stdout().write_all(code.as_bytes())?;
    } else {
        let path = PathBuf::from(&args.output);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&path, code)?;
        debug!(path = %path.display(), "wrote generated module");
    }
    Ok(())
}
