//! Command-line flags.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Webhook-triggered purge of one message from an AMQP queue.
#[derive(Debug, Default, Parser)]
#[command(name = "queue-purge", version, about)]
pub struct Cli {
    /// Path to a YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Host wait timeout
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Duration to wait before retrying
    #[arg(long, value_parser = humantime::parse_duration)]
    pub wait_retry_interval: Option<Duration>,

    /// AMQP connection string
    #[arg(long)]
    pub connection_string: Option<String>,

    /// Consume messages from the given AMQP queue name
    #[arg(long)]
    pub queue_name: Option<String>,

    /// Path of JSON field to read from message queue events
    #[arg(long)]
    pub jsonpath: Option<String>,

    /// Port for the webhook server
    #[arg(long)]
    pub port: Option<u16>,
}
