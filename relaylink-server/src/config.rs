use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "relaylink-server")]
pub struct RelayArgs {
    // 0 is rejected at startup rather than left to mean "let the OS pick".
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    #[arg(long, default_value = "0.0.0.0")]
    pub bind_address: String,

    #[arg(long, default_value_t = 24 * 60 * 60)]
    pub stale_room_after_secs: u64,

    #[arg(long, default_value_t = 5 * 60)]
    pub gc_interval_secs: u64,

    #[arg(long, default_value_t = 30)]
    pub stats_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_address: String,
    pub stale_room_after: Duration,
    pub gc_interval: Duration,
    pub stats_interval: Duration,
}

impl RelayConfig {
    pub fn from_args(args: &RelayArgs) -> Result<Self, crate::errors::RelayError> {
        if args.port == 0 {
            return Err(crate::errors::RelayError::PortOutOfRange(args.port));
        }
        Ok(Self {
            bind_address: format!("{}:{}", args.bind_address, args.port),
            stale_room_after: Duration::from_secs(args.stale_room_after_secs),
            gc_interval: Duration::from_secs(args.gc_interval_secs),
            stats_interval: Duration::from_secs(args.stats_interval_secs),
        })
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_owned(),
            stale_room_after: Duration::from_secs(24 * 60 * 60),
            gc_interval: Duration::from_secs(5 * 60),
            stats_interval: Duration::from_secs(30),
        }
    }
}
