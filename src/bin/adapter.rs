use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser};
use oci_sd::{
    actors::DiscoveryHandle,
    config::{AuthMode, DiscoveryConfig, ResolvedConfig, read_config_file},
    discovery::Refresher,
    file_sd::FileSdWriter,
    metrics::PrometheusMetrics,
    provider::oci::{HeaderSigner, OciClient, OciEndpoints},
};
use prometheus::Registry;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding comma separated `name=value` request headers
const HEADERS_ENV: &str = "OCI_SD_HEADERS";

/// Tool to generate file_sd target files from OCI compute instances
#[derive(Debug, Clone, Parser)]
#[command(version)]
struct Args {
    /// Output file for file_sd compatible file
    #[arg(long = "output.file", default_value = "custom_sd.json")]
    output_file: PathBuf,

    /// The ocid of the root compartment for service discovery
    #[arg(long = "sd.root_compartment_id")]
    root_compartment_id: Option<String>,

    /// The ocid of the compartment for service discovery
    #[arg(long = "sd.compartment_id")]
    compartment_id: Option<String>,

    /// Port for service discovery
    #[arg(long = "sd.port")]
    port: Option<u16>,

    /// Display name for service discovery
    #[arg(long = "sd.display_name")]
    display_name: Option<String>,

    /// Whether or not to use instance principals for service discovery
    #[arg(
        long = "sd.use_instance_principals",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    use_instance_principals: Option<bool>,

    /// Seconds between two refreshes
    #[arg(long = "sd.refresh_interval")]
    refresh_interval: Option<u64>,

    /// OCI region, e.g. eu-frankfurt-1
    #[arg(long = "sd.region")]
    region: Option<String>,

    /// Identity service endpoint, replaces the regional one
    #[arg(long = "oci.identity_endpoint")]
    identity_endpoint: Option<String>,

    /// Core service endpoint, replaces the regional one
    #[arg(long = "oci.core_endpoint")]
    core_endpoint: Option<String>,

    /// Header added to every OCI request, as name=value
    #[arg(long = "oci.header")]
    headers: Vec<String>,

    /// Config file (JSON or TOML); flags take precedence
    #[arg(long = "config.file")]
    config_file: Option<PathBuf>,

    /// Address serving /metrics and /healthz
    #[arg(long = "web.listen-address")]
    listen_address: Option<SocketAddr>,

    /// Increase log verbosity
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Config file contents overlaid with the flags that were passed
    fn discovery_config(&self) -> anyhow::Result<DiscoveryConfig> {
        let mut config = match &self.config_file {
            Some(path) => read_config_file(path)?,
            None => DiscoveryConfig::default(),
        };

        if self.compartment_id.is_some() {
            config.compartment_id = self.compartment_id.clone();
        }
        if self.root_compartment_id.is_some() {
            config.root_compartment_id = self.root_compartment_id.clone();
        }
        if self.display_name.is_some() {
            config.display_name = self.display_name.clone();
        }
        if self.region.is_some() {
            config.region = self.region.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(use_instance_principals) = self.use_instance_principals {
            config.use_instance_principals = use_instance_principals;
        }
        if let Some(refresh_interval) = self.refresh_interval {
            config.refresh_interval = refresh_interval;
        }

        Ok(config)
    }

    fn endpoints(&self, config: &ResolvedConfig) -> anyhow::Result<OciEndpoints> {
        let regional = config
            .region
            .as_deref()
            .map(OciEndpoints::for_region)
            .transpose()?;

        let identity = match (&self.identity_endpoint, &regional) {
            (Some(url), _) => url.as_str(),
            (None, Some(endpoints)) => endpoints.identity().as_str(),
            (None, None) => bail!("either --sd.region or --oci.identity_endpoint is required"),
        };
        let core = match (&self.core_endpoint, &regional) {
            (Some(url), _) => url.as_str(),
            (None, Some(endpoints)) => endpoints.core().as_str(),
            (None, None) => bail!("either --sd.region or --oci.core_endpoint is required"),
        };

        Ok(OciEndpoints::new(identity, core)?)
    }

    fn signer(&self, auth: AuthMode) -> anyhow::Result<HeaderSigner> {
        let from_env = std::env::var(HEADERS_ENV).unwrap_or_default();
        let headers: Vec<&str> = self
            .headers
            .iter()
            .map(String::as_str)
            .chain(from_env.split(',').map(str::trim).filter(|h| !h.is_empty()))
            .collect();

        match auth {
            AuthMode::ApiKey if headers.is_empty() => {
                bail!("api key authentication needs --oci.header or {HEADERS_ENV}")
            }
            AuthMode::InstancePrincipal if headers.is_empty() => {
                warn!("no request headers configured, expecting a signing proxy in front of OCI")
            }
            _ => {}
        }

        let mut signer = HeaderSigner::new();
        for header in headers {
            let Some((name, value)) = header.split_once('=') else {
                bail!("malformed header {header:?}, expected name=value");
            };
            signer = signer.with_header(name.trim(), value.trim())?;
        }

        Ok(signer)
    }
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new().with_targets(vec![("oci_sd", level), ("oci_sd_adapter", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = args
        .discovery_config()?
        .resolve()
        .context("invalid discovery configuration")?;
    info!(scope = ?config.scope, auth = ?config.auth, "discovery configured");

    let signer = args.signer(config.auth)?;
    let client = OciClient::new(args.endpoints(&config)?, Arc::new(signer), config.call_timeout)?;

    let metrics = PrometheusMetrics::register(Registry::new())?;
    let cancel = CancellationToken::new();
    let (target_tx, target_rx) = mpsc::channel(1);

    let writer = FileSdWriter::new(&args.output_file);
    let last_write = writer.last_write();
    let writer_task = tokio::spawn(writer.run(target_rx, cancel.clone()));

    let interval = config.refresh_interval;
    let refresher = Refresher::new(Arc::new(client), config, Arc::new(metrics.clone()));
    let discovery = DiscoveryHandle::spawn_with_token(refresher, interval, target_tx, cancel.clone());

    if let Some(addr) = args.listen_address {
        #[cfg(feature = "exporter")]
        {
            use oci_sd::exporter::{ExporterState, spawn_exporter};

            let state = ExporterState {
                metrics,
                loop_state: discovery.subscribe_state(),
                last_write,
            };
            spawn_exporter(addr, state, cancel.clone()).await?;
        }

        #[cfg(not(feature = "exporter"))]
        {
            let _ = (metrics, last_write);
            warn!("built without the exporter feature, ignoring --web.listen-address {addr}");
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("received ctrl-c, shutting down");

    discovery.shutdown();
    discovery.join().await?;
    writer_task.await.context("file_sd writer panicked")?;

    Ok(())
}
