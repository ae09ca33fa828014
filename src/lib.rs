//! dap4link: session transport for DAP4 remote datasets.
//!
//! dap4link turns a dataset URL into an open, configured session: it
//! resolves transport configuration from the URL, the environment, and an
//! optional resource file, opens an HTTP transport, fetches the dataset's
//! metadata manifest, and materializes it into a local substrate.
//!
//! # Modules
//!
//! - [`session`]: Session lifecycle (open, fetch, build, close)
//! - [`transport`]: Transport options, resolution, and the HTTP handle
//! - [`auth`]: Authentication and TLS state gathered before resolution
//! - [`context`]: Process context and the resource-file store
//! - [`diag`]: Non-fatal diagnostics collected per session
//! - [`error`]: Error types for dap4link operations

pub mod auth;
pub mod context;
pub mod diag;
pub mod error;
pub mod manifest;
pub mod session;
pub mod substrate;
pub mod transport;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use error::Dap4Error;

use context::RuntimeContext;
use diag::SessionReport;
use session::{Session, SessionOptions};
use transport::resolver::resolve;
use transport::TransportTuning;

/// The dap4link CLI application.
#[derive(Parser)]
#[command(name = "dap4link")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Resolve and display the transport configuration for a URL.
    Config(ConfigArgs),
    /// Open a full session against a URL, then close it.
    Probe(ProbeArgs),
}

/// Arguments for the config subcommand.
#[derive(clap::Args)]
struct ConfigArgs {
    /// Dataset URL, including any fragment controls.
    url: String,

    /// Resource file to read instead of $HOME/.dap4rc.
    #[arg(long)]
    rc_file: Option<PathBuf>,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Arguments for the probe subcommand.
#[derive(clap::Args)]
struct ProbeArgs {
    /// Dataset URL, including any fragment controls.
    url: String,

    /// Resource file to read instead of $HOME/.dap4rc.
    #[arg(long)]
    rc_file: Option<PathBuf>,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Run the dap4link CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), Dap4Error> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config(args)) => run_config(args),
        Some(Commands::Probe(args)) => run_probe(args),
        None => {
            println!("dap4link {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Session transport for DAP4 remote datasets.");
            println!();
            println!("Run 'dap4link --help' for usage information.");
            Ok(())
        }
    }
}

/// Execute the config subcommand: everything a session open does up to,
/// but not including, transport creation.
fn run_config(args: ConfigArgs) -> Result<(), Dap4Error> {
    let ctx = RuntimeContext::from_process(args.rc_file.as_deref());
    let url = url::Url::parse(&args.url).map_err(|source| Dap4Error::UrlParse {
        url: args.url.clone(),
        source,
    })?;

    let mut report = SessionReport::new();
    let auth = auth::AuthContext::load(&ctx, &url, &mut report);
    let controls = session::controls::Controls::from_url(&url, &mut report);
    let tuning = TransportTuning {
        buffer_size: ctx.read_buffersize(&url, &mut report),
        keepalive: ctx.keepalive(&url, &mut report),
    };
    let config = resolve(&auth, &tuning);

    match args.output.as_str() {
        "json" => {
            let rendered = serde_json::json!({
                "url": url.as_str(),
                "config": config,
                "controls": controls,
                "diagnostics": report,
            });
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        _ => {
            println!("url: {}", url);
            println!("accept_encodings: {}", config.accept_encodings);
            println!("netrc: {}", config.netrc.is_some());
            println!("verbose: {}", config.verbose);
            println!(
                "timeout: {}",
                render_optional(config.timeout_secs.map(|s| format!("{}s", s)))
            );
            println!(
                "user_agent: {}",
                render_optional(config.user_agent.clone())
            );
            println!(
                "credentials: {}",
                if config.credentials.is_some() {
                    "set"
                } else {
                    "unset"
                }
            );
            println!(
                "proxy: {}",
                render_optional(
                    config
                        .proxy
                        .as_ref()
                        .map(|p| format!("{}:{}", p.host, p.port))
                )
            );
            println!("verify_peer: {:?}", config.verify_peer);
            println!("verify_host: {:?}", config.verify_host);
            println!(
                "redirects: follow={} max={}",
                config.follow_redirects, config.max_redirects
            );
            println!(
                "buffer_size: {}",
                render_optional(config.buffer_size.map(|b| b.to_string()))
            );
            print!("{}", report);
        }
    }
    Ok(())
}

/// Execute the probe subcommand: a full open/close round trip.
fn run_probe(args: ProbeArgs) -> Result<(), Dap4Error> {
    let ctx = RuntimeContext::from_process(args.rc_file.as_deref());
    let mut session = Session::open(&args.url, SessionOptions::default(), &ctx)?;

    let manifest_len = session.manifest().map(|m| m.raw_len()).unwrap_or(0);
    match args.output.as_str() {
        "json" => {
            let rendered = serde_json::json!({
                "url": session.url().as_str(),
                "state": session.state(),
                "manifest_bytes": manifest_len,
                "controls": session.controls(),
                "diagnostics": session.report(),
            });
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        _ => {
            println!("url: {}", session.url());
            println!("state: {:?}", session.state());
            println!("manifest_bytes: {}", manifest_len);
            print!("{}", session.report());
        }
    }

    session.close()
}

fn render_optional(value: Option<String>) -> String {
    value.unwrap_or_else(|| "unset".to_string())
}
