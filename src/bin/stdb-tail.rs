//! Subscription tail: connects to a database, subscribes to the given
//! queries, and prints every row change as it streams in. Handy for
//! eyeballing a live subscription and for smoke-testing a deployment.
//!
//! ```text
//! stdb-tail --host 127.0.0.1:3000 --http http://127.0.0.1:3000 \
//!     --database mydb "SELECT * FROM users"
//! ```

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use stdb_client::http::{HttpApi, TcpHttpTransport};
use stdb_client::{
    creds, AuthToken, ConnectionId, DbClient, EventHandler, Identity, ReducerStatus, RequestId,
    Result, Row,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Tail row changes from a live subscription")]
struct Args {
    /// WebSocket host, e.g. 127.0.0.1:3000
    #[arg(long, default_value = "127.0.0.1:3000")]
    host: String,
    /// HTTP base URL for the schema fetch, e.g. http://127.0.0.1:3000
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    http: String,
    /// Database name
    #[arg(long)]
    database: String,
    /// Queries to subscribe; at least one
    #[arg(required = true)]
    queries: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("stdb-tail: {e}");
            ExitCode::FAILURE
        }
    }
}

struct PrintHandler;

fn render(row: &Row) -> String {
    let fields: Vec<String> = row
        .fields
        .iter()
        .map(|f| format!("{}: {:?}", f.name.as_deref().unwrap_or("_"), f.value))
        .collect();
    format!("{{{}}}", fields.join(", "))
}

impl EventHandler for PrintHandler {
    fn on_connect(
        &mut self,
        identity: &Identity,
        _connection_id: &ConnectionId,
        _token: &AuthToken,
    ) {
        println!("# connected as {identity}");
    }
    fn on_disconnect(&mut self, reason: &str) {
        println!("# disconnected: {reason}");
    }
    fn on_subscribe_applied(&mut self, table: &str, count: usize) {
        println!("# {table}: {count} initial rows");
    }
    fn on_insert(&mut self, table: &str, row: &Row) {
        println!("+ {table} {}", render(row));
    }
    fn on_delete(&mut self, table: &str, row: &Row) {
        println!("- {table} {}", render(row));
    }
    fn on_update(&mut self, table: &str, old: &Row, new: &Row) {
        println!("~ {table} {} -> {}", render(old), render(new));
    }
    fn on_reducer_result(&mut self, request_id: RequestId, status: &ReducerStatus, _timestamp: i64) {
        println!("# reducer {request_id}: {status:?}");
    }
    fn on_error(&mut self, message: &str) {
        eprintln!("# frame error: {message}");
    }
}

fn run(args: Args) -> Result<()> {
    let api = HttpApi::new(args.http.clone(), TcpHttpTransport);
    let schema = api.schema(&args.database)?;

    let mut client = DbClient::new(schema, PrintHandler);
    let dir = creds::default_dir();
    if let Some(saved) = creds::load(&dir, &args.database)? {
        client.set_token(AuthToken::new(saved.token));
    }

    client.connect_ws(&args.host, &args.database)?;
    client.subscribe(args.queries)?;

    // Single-consumer polling loop; ^C tears the process (and socket) down.
    while client.frame_tick()? {}

    client.save_credentials(&dir, &args.database).ok();
    Ok(())
}
