//! Command-line interface for the relay registry daemon.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use relay_registry::{Continent, NodeDescriptor, NodeType, SelectionQuery};

/// Relay registry daemon
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Logging configuration
    #[command(flatten)]
    pub(crate) log_args: LogArgs,

    /// Configuration file
    #[arg(long, global = true, value_name = "PATH", env = "RELAYD_CONFIG", default_value = "relayd.toml")]
    pub(crate) config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Logging configuration
#[derive(Debug, Args, Clone)]
pub(crate) struct LogArgs {
    /// Silence all output
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Verbose mode (-v, -vv, -vvv, etc.)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbosity: u8,

    /// Log filter
    #[arg(long = "log.filter", global = true, value_name = "DIRECTIVE")]
    pub(crate) filter: Option<String>,
}

/// Daemon commands
#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Run the registry
    Run(RunArgs),

    /// Print network statistics for a node file
    Stats(InspectArgs),

    /// Print the contributor leaderboard for a node file
    Leaderboard(LeaderboardArgs),

    /// Run a selection query against a node file
    Select(SelectArgs),

    /// Register a node in a node file and print its receipt
    Register(RegisterArgs),

    /// Manage daemon configuration
    Config(ConfigArgs),
}

/// Arguments for the 'run' command
#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    /// Node file path, overriding the configured one
    #[arg(long, value_name = "PATH")]
    pub(crate) nodes_file: Option<PathBuf>,

    /// Quiet period before a flush, in milliseconds
    #[arg(long, value_name = "MS")]
    pub(crate) debounce_ms: Option<u64>,

    /// Seconds between status reports
    #[arg(long, value_name = "SECS")]
    pub(crate) status_interval: Option<u64>,

    /// Mark nodes offline after this many seconds without contact
    #[arg(long, value_name = "SECS")]
    pub(crate) stale_after: Option<u64>,

    /// Failed health checks before a node is marked offline
    #[arg(long, value_name = "N")]
    pub(crate) health_check_threshold: Option<u32>,
}

/// Node file selection for read-only commands
#[derive(Debug, Args, Clone)]
pub(crate) struct InspectArgs {
    /// Node file path, overriding the configured one
    #[arg(long, value_name = "PATH")]
    pub(crate) nodes_file: Option<PathBuf>,
}

/// Arguments for the 'leaderboard' command
#[derive(Debug, Args)]
pub(crate) struct LeaderboardArgs {
    #[command(flatten)]
    pub(crate) inspect: InspectArgs,

    /// Number of contributors to show
    #[arg(long, default_value = "10")]
    pub(crate) limit: usize,
}

/// Arguments for the 'select' command
#[derive(Debug, Args)]
pub(crate) struct SelectArgs {
    #[command(flatten)]
    pub(crate) inspect: InspectArgs,

    /// Number of nodes to return
    #[arg(long, default_value = "10")]
    pub(crate) count: usize,

    /// ISO country code
    #[arg(long)]
    pub(crate) country: Option<String>,

    /// Continent code (AF, AN, AS, EU, NA, OC, SA)
    #[arg(long, value_parser = parse_continent)]
    pub(crate) continent: Option<Continent>,

    /// Autonomous system number
    #[arg(long)]
    pub(crate) asn: Option<u32>,

    /// Connection type (residential, mobile, datacenter, isp)
    #[arg(long = "type")]
    pub(crate) node_type: Option<NodeType>,

    /// Minimum success rate in [0, 1]
    #[arg(long)]
    pub(crate) min_success_rate: Option<f64>,

    /// Maximum median latency in milliseconds
    #[arg(long)]
    pub(crate) max_latency_ms: Option<u64>,

    /// ASNs to exclude
    #[arg(long = "exclude-asn", value_name = "ASN")]
    pub(crate) exclude_asns: Vec<u32>,

    /// At most one node per ASN after the first half
    #[arg(long)]
    pub(crate) diverse_asns: bool,

    /// At most one node per country after the first half
    #[arg(long)]
    pub(crate) diverse_countries: bool,
}

impl SelectArgs {
    pub(crate) fn query(&self) -> SelectionQuery {
        SelectionQuery {
            country: self.country.clone(),
            continent: self.continent,
            asn: self.asn,
            node_type: self.node_type,
            min_success_rate: self.min_success_rate,
            max_latency_ms: self.max_latency_ms,
            exclude_asns: self.exclude_asns.iter().copied().collect(),
            count: self.count,
            diverse_asns: self.diverse_asns,
            diverse_countries: self.diverse_countries,
        }
    }
}

/// Arguments for the 'register' command
#[derive(Debug, Args)]
pub(crate) struct RegisterArgs {
    #[command(flatten)]
    pub(crate) inspect: InspectArgs,

    /// Node id; generated when absent
    #[arg(long)]
    pub(crate) id: Option<String>,

    /// Contributor that owns the node
    #[arg(long)]
    pub(crate) owner: String,

    /// Relay host name or address
    #[arg(long)]
    pub(crate) host: String,

    /// Relay port
    #[arg(long)]
    pub(crate) port: u16,

    /// Connection type (residential, mobile, datacenter, isp)
    #[arg(long = "type")]
    pub(crate) node_type: NodeType,

    /// Advertised bandwidth in Mbps
    #[arg(long, default_value = "0")]
    pub(crate) bandwidth: f64,

    /// Uptime percentage
    #[arg(long)]
    pub(crate) uptime: Option<f64>,

    /// Relay software version
    #[arg(long = "node-version", default_value = "")]
    pub(crate) node_version: String,
}

impl RegisterArgs {
    pub(crate) fn descriptor(&self) -> NodeDescriptor {
        let mut descriptor =
            NodeDescriptor::new(self.owner.as_str(), self.host.clone(), self.port, self.node_type)
                .with_bandwidth(self.bandwidth)
                .with_version(self.node_version.clone());
        if let Some(id) = &self.id {
            descriptor = descriptor.with_id(id.as_str());
        }
        if let Some(uptime) = self.uptime {
            descriptor = descriptor.with_uptime(uptime);
        }
        descriptor
    }
}

/// Arguments for the 'config' command
#[derive(Debug, Args)]
pub(crate) struct ConfigArgs {
    /// Write the default configuration if the file does not exist
    #[arg(long)]
    pub(crate) init: bool,

    /// Show current configuration
    #[arg(long)]
    pub(crate) show: bool,
}

fn parse_continent(s: &str) -> Result<Continent, String> {
    Continent::from_code(s).ok_or_else(|| format!("unknown continent code: {s}"))
}
