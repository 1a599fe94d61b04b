//! prevu - discover service URLs in remote preview environments

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prevu_client::{
    run_discovery_cycle, DockerProxyLocator, LocateOptions, SecureSession, SshSession,
    SshSessionConfig,
};
use prevu_proto::TunnelFilter;

mod ambient;
mod machines;
mod output;
mod store;

/// Discover service URLs in remote preview environments
#[derive(Parser, Debug)]
#[command(name = "prevu")]
#[command(about = "Discover service URLs in remote preview environments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show urls for an existing environment
    Urls {
        /// Service name. If not specified, shows all services
        service: Option<String>,

        /// Service port. If not specified, shows all ports for the service
        port: Option<u16>,

        /// Project name (defaults to the ambient compose project)
        #[arg(long)]
        project: Option<String>,

        /// Environment id (defaults to the ambient environment)
        #[arg(long)]
        id: Option<String>,

        /// Compose file to resolve the ambient project name from
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,

        /// Emit the tunnel list as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Local path for the forwarded control socket
        #[arg(long)]
        socket_path: Option<PathBuf>,

        /// Attempt ceiling while waiting for the proxy to publish its endpoint
        #[arg(long, default_value_t = 30)]
        locate_attempts: u32,

        /// Delay between locate attempts, in milliseconds
        #[arg(long, default_value_t = 1000)]
        locate_delay_ms: u64,

        /// Timeout for each request to the runtime or the proxy, in
        /// milliseconds
        #[arg(long, default_value_t = 5000)]
        request_timeout_ms: u64,

        /// SSH key alias (defaults to the machine's configured alias)
        #[arg(long)]
        key_alias: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Urls {
            service,
            port,
            project,
            id,
            file,
            json,
            socket_path,
            locate_attempts,
            locate_delay_ms,
            request_timeout_ms,
            key_alias,
        } => {
            handle_urls_command(
                service,
                port,
                project,
                id,
                file,
                json,
                socket_path,
                locate_attempts,
                locate_delay_ms,
                request_timeout_ms,
                key_alias,
            )
            .await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_urls_command(
    service: Option<String>,
    port: Option<u16>,
    project: Option<String>,
    id: Option<String>,
    file: Option<PathBuf>,
    json: bool,
    socket_path: Option<PathBuf>,
    locate_attempts: u32,
    locate_delay_ms: u64,
    request_timeout_ms: u64,
    key_alias: Option<String>,
) -> Result<()> {
    let registry = machines::MachineRegistry::load_default()?;
    let key_store = store::SshKeyStore::new()?;

    let project = match project {
        Some(project) => project,
        None => ambient::ambient_project_name(file.as_deref())?,
    };
    debug!("project: {project}");

    let env_id = id.unwrap_or_else(|| ambient::ambient_env_id(&project));
    debug!("envId: {env_id}");

    let machine = registry
        .machine(&env_id)
        .with_context(|| format!("no machine found for envId {env_id}"))?;

    let alias = key_alias.unwrap_or_else(|| machine.key_alias.clone());
    let key = store::require_key(&key_store, &alias)?;

    let session = Arc::new(
        SshSession::connect(SshSessionConfig {
            host: machine.public_ip_address.clone(),
            port: machine.ssh_port,
            username: machine.ssh_username.clone(),
            private_key_pem: key.private_key_pem,
        })
        .await?,
    );

    let request_timeout = Duration::from_millis(request_timeout_ms);
    let locator = DockerProxyLocator::new().with_options(LocateOptions {
        attempts: locate_attempts,
        delay: Duration::from_millis(locate_delay_ms),
        request_timeout,
    });

    // Interruption drops the cycle future, which releases the forwarded
    // socket; the session is then closed here before unwinding.
    let tunnels = tokio::select! {
        result = run_discovery_cycle(session.clone(), &locator, &project, socket_path, request_timeout) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, releasing session");
            if let Err(err) = session.disconnect().await {
                warn!("failed to close session: {err}");
            }
            bail!("interrupted");
        }
    };

    let filter = TunnelFilter { service, port };
    let tunnels = filter.select(&tunnels);

    if json {
        println!("{}", serde_json::to_string_pretty(&tunnels)?);
        return Ok(());
    }

    println!(
        "Preview environment {} provisioned: {}",
        env_id, machine.public_ip_address
    );
    print!("{}", output::render_table(&tunnels));

    Ok(())
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
