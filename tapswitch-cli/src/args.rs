//! CLI argument parsing

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tapswitch_core::config::DEFAULT_SEND_QUEUE_DEPTH;
use tapswitch_core::{parse_bandwidth, Config, Error, FloodPolicy, Result, ThrottlePolicy, TlsConfig};

#[derive(Parser, Debug)]
#[command(name = "tapswitch")]
#[command(version, about = "Layer-2 Ethernet switch bridging a TAP interface with WebSocket peers", long_about = None)]
pub struct Cli {
    /// Address to listen on for incoming websocket connections; the endpoint URI is '/wstap'
    #[arg(long, default_value = ":8000")]
    pub listen_address: String,

    /// IPv4 address for the TAP interface; used only when the interface is created
    #[arg(long, default_value = "10.3.0.1/16")]
    pub tap_ipv4: String,

    /// Name of the TAP interface to create; empty lets the kernel choose
    #[arg(long, default_value = "")]
    pub tap_name: String,

    /// Max upload bandwidth per peer; leave empty for unlimited
    #[arg(long, default_value = "")]
    pub max_upload_bandwidth: String,

    /// Max download bandwidth per peer; leave empty for unlimited
    #[arg(long, default_value = "")]
    pub max_download_bandwidth: String,

    /// Static files directory to serve at '/'; disabled by default
    #[arg(long)]
    pub static_directory: Option<PathBuf>,

    /// Accept TAP traffic via websockets only when authorized with this key; by default any traffic is accepted
    #[arg(long)]
    pub auth_key: Option<String>,

    /// Accept websockets traffic only with source MACs starting with this prefix; disabled by default
    #[arg(long)]
    pub mac_prefix: Option<String>,

    /// Certificate for listening on TLS connections; by default TLS is disabled
    #[arg(long)]
    pub cert_file: Option<PathBuf>,

    /// Key file for listening on TLS connections
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "warning")]
    pub log_level: LogLevel,

    /// Flood classification: 'compat' keeps the historical broadcast-and-ipv4-multicast
    /// rule, 'standard' floods broadcast or multicast destinations
    #[arg(long, value_enum, default_value = "compat")]
    pub flood_policy: FloodPolicyArg,

    /// Token bucket accounting: 'legacy' keeps the historical single-threshold rule,
    /// 'strict' admits only frames covered by available credit
    #[arg(long, value_enum, default_value = "legacy")]
    pub throttle_policy: ThrottlePolicyArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// The matching tracing level filter.
    pub fn tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodPolicyArg {
    Compat,
    Standard,
}

impl From<FloodPolicyArg> for FloodPolicy {
    fn from(arg: FloodPolicyArg) -> Self {
        match arg {
            FloodPolicyArg::Compat => FloodPolicy::Compat,
            FloodPolicyArg::Standard => FloodPolicy::Standard,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottlePolicyArg {
    Legacy,
    Strict,
}

impl From<ThrottlePolicyArg> for ThrottlePolicy {
    fn from(arg: ThrottlePolicyArg) -> Self {
        match arg {
            ThrottlePolicyArg::Legacy => ThrottlePolicy::Legacy,
            ThrottlePolicyArg::Strict => ThrottlePolicy::Strict,
        }
    }
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the argument surface into the typed configuration.
    pub fn build_config(&self) -> Result<Config> {
        let tls = match (&self.cert_file, &self.key_file) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_file: cert.clone(),
                key_file: key.clone(),
            }),
            (None, None) => None,
            _ => {
                return Err(Error::Tls(
                    "both certificate and key file must be specified to enable TLS".to_string(),
                ))
            }
        };

        let upload_rate =
            parse_bandwidth(&self.max_upload_bandwidth).map_err(Error::UploadBandwidth)?;
        let download_rate =
            parse_bandwidth(&self.max_download_bandwidth).map_err(Error::DownloadBandwidth)?;

        Ok(Config {
            listen_address: self.listen_address.clone(),
            tls,
            auth_key: self.auth_key.clone().filter(|k| !k.is_empty()),
            mac_prefix: self.mac_prefix.clone().filter(|p| !p.is_empty()),
            upload_rate,
            download_rate,
            tap_name: self.tap_name.clone(),
            tap_ipv4: self.tap_ipv4.clone(),
            static_directory: self.static_directory.clone(),
            flood_policy: self.flood_policy.into(),
            throttle_policy: self.throttle_policy.into(),
            send_queue_depth: DEFAULT_SEND_QUEUE_DEPTH,
        })
    }
}
