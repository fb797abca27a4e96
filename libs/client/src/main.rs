//! Switchboard CLI - issue backend calls and test route tables.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use switchboard_client::Worker;
use switchboard_core::hash::request_key;
use switchboard_core::ClientConfig;
use switchboard_router::Router;

#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(about = "Talk to a switchboard backend and inspect route tables")]
struct Args {
    /// Client configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Call a backend method and print its result
    Call {
        module: String,
        method: String,
        /// Parameters as a JSON array; any other JSON value is sent as the only parameter
        params: Option<String>,
        /// Run the call as part of this request, e.g. `example.com/index`
        #[arg(long)]
        request: Option<String>,
        /// Remember the call in the request's cached plan
        #[arg(long, requires = "request")]
        cacheable: bool,
    },
    /// Resolve a path against a route table
    Route {
        /// TOML file with `[[route]]` entries
        routes: PathBuf,
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --debug; logs go to stderr so stdout stays JSON
    let default_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match args.command {
        Command::Call {
            module,
            method,
            params,
            request,
            cacheable,
        } => {
            let config = match &args.config {
                Some(path) => ClientConfig::load(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => ClientConfig::default(),
            };
            let params = parse_params(params.as_deref())?;
            let result = call(config, module, method, params, request, cacheable).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Route { routes, path } => {
            let router = Router::load(&routes)
                .with_context(|| format!("loading routes from {}", routes.display()))?;
            debug!(routes = router.len(), "Route table loaded");

            let output = match router.resolve(&path) {
                Some(matched) => json!({"target": matched.target, "params": matched.params}),
                None => {
                    info!(path = %path, "No route matched");
                    Value::Null
                }
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

async fn call(
    config: ClientConfig,
    module: String,
    method: String,
    params: Vec<Value>,
    request: Option<String>,
    cacheable: bool,
) -> Result<Value> {
    let mut worker = Worker::start(config).await?;

    let outcome = match request {
        Some(request) => {
            let key = match request.split_once('/') {
                Some((host, path)) => request_key(host, path),
                None => request_key(&request, "/"),
            };
            worker
                .handle(&key, |cache| {
                    Box::pin(async move { cache.call(&module, &method, params, cacheable).await })
                })
                .await
        }
        None => worker.call(&module, &method, params).await,
    };

    let result = outcome.map_err(|err| anyhow::anyhow!(worker.public_message(&err)));
    worker.shutdown().await?;
    result
}

fn parse_params(raw: Option<&str>) -> Result<Vec<Value>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Value>(raw).context("params must be valid JSON")? {
        Value::Array(params) => Ok(params),
        Value::Null => bail!("params must not be null"),
        other => Ok(vec![other]),
    }
}
