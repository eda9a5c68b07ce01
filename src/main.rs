use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use reqwest::Client;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod chart;
mod config;
mod dashboard;
mod error;
mod filter;
mod models;
mod page;
mod pipeline;
mod samples;
mod session;
mod source;
mod stats;

use config::{DataArgs, Settings};
use session::{
    CredentialVerifier, DenyAll, FileStore, MemoryStore, Navigation, SessionGate, SessionState,
};

#[derive(Parser)]
#[command(name = "fleet-dash")]
#[command(about = "Static fleet operations dashboard generator", long_about = None)]
struct Cli {
    /// Directory holding the persistent session flag
    #[arg(long, global = true, env = "FLEET_DASH_STATE_DIR")]
    state_dir: Option<PathBuf>,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate every dashboard page
    Build {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long, default_value = "site")]
        out: PathBuf,
    },
    /// Render one page, if the session allows it
    View {
        /// Page file name, e.g. fleet.html or fleet
        page: String,
        #[command(flatten)]
        data: DataArgs,
        /// Also search the page's table for this text
        #[arg(long)]
        search: Option<String>,
        /// Hide chart series whose label contains this text
        #[arg(long)]
        hide_series: Option<String>,
        /// Treat the view as a page restored from browser history
        #[arg(long)]
        from_history: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Sign in with the configured credential
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Clear the session flag
    SignOut {
        #[arg(long)]
        target: Option<String>,
    },
    /// Show whether a session is active
    Status,
}

fn session_gate<V: CredentialVerifier>(state_dir: Option<PathBuf>, verifier: V) -> SessionGate<V> {
    let dir = config::state_dir(state_dir);
    let tab = MemoryStore::new_tab();
    debug!(state_dir = %dir.display(), tab = %tab.tab(), "session scopes");
    SessionGate::new(Box::new(FileStore::in_dir(&dir)), Box::new(tab), verifier)
}

/// Rejected credentials come back as an error so the process exits non-zero.
fn sign_in<V: CredentialVerifier>(
    gate: &mut SessionGate<V>,
    email: &str,
    password: &str,
) -> anyhow::Result<String> {
    match gate.login(email, password)? {
        Navigation::Redirect(target) => Ok(format!("Signed in; redirecting to {target}.")),
        Navigation::Stay => Ok("Signed in.".to_string()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Commands::Build { data, out } => {
            let settings = Settings::from(&data);
            let client = Client::new();
            let mut pages =
                dashboard::load_pages(&client, &settings, config::login_digest()).await;
            std::fs::create_dir_all(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            for page in pages.iter_mut() {
                let html = dashboard::render(page.as_mut());
                let path = out.join(page.file_name());
                std::fs::write(&path, html)?;
                info!(page = page.file_name(), "written");
            }
            println!("Wrote {} pages to {}.", pages.len(), out.display());
        }
        Commands::View {
            page,
            data,
            search,
            hide_series,
            from_history,
            out,
        } => {
            let gate = session_gate(cli.state_dir, DenyAll);
            let settings = Settings::from(&data);
            let client = Client::new();
            let mut pages =
                dashboard::load_pages(&client, &settings, config::login_digest()).await;
            let wanted = if page.ends_with(".html") {
                page.clone()
            } else {
                format!("{page}.html")
            };
            let Some(controller) = pages.iter_mut().find(|p| p.file_name() == wanted) else {
                anyhow::bail!("unknown page {page}");
            };

            let mut doc = controller.document();
            let navigation = if from_history {
                gate.on_page_show(true, doc.requires_auth)?
            } else {
                gate.enforce(doc.requires_auth)?
            };
            if let Navigation::Redirect(target) = navigation {
                println!("Not signed in; redirecting to {target}.");
                return Ok(());
            }
            controller.init(&mut doc);
            if let Some(query) = search.as_deref() {
                match doc.table_mut("data-table") {
                    Some(table) => {
                        let visible = table.set_query(query);
                        info!(query, visible, "table filtered");
                    }
                    None => info!(page = %wanted, "page has no searchable table"),
                }
            }
            if let Some(label) = hide_series.as_deref() {
                if let Some(canvas) = doc.chart_mut("myChart") {
                    let hidden = canvas.set_visible(label, false);
                    info!(label, hidden, "chart series hidden");
                }
            }
            let html = doc.to_html();
            controller.teardown(&mut doc);

            match out {
                Some(path) => {
                    std::fs::write(&path, html)?;
                    println!("Page written to {}.", path.display());
                }
                None => println!("{html}"),
            }
        }
        Commands::Login { email, password } => {
            let mut gate = session_gate(cli.state_dir, config::credential_from_env()?);
            if let Navigation::Redirect(target) = gate.open_login()? {
                println!("Already signed in; redirecting to {target}.");
                return Ok(());
            }
            println!("{}", sign_in(&mut gate, &email, &password)?);
        }
        Commands::SignOut { target } => {
            let mut gate = session_gate(cli.state_dir, DenyAll);
            if let Navigation::Redirect(target) = gate.sign_out(target.as_deref())? {
                println!("Signed out; redirecting to {target}.");
            }
        }
        Commands::Status => {
            let gate = session_gate(cli.state_dir, DenyAll);
            match gate.state()? {
                SessionState::LoggedIn => println!("Signed in."),
                SessionState::LoggedOut => println!("Signed out."),
            }
        }
    }

    Ok(())
}
