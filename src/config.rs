//! Process configuration
//!
//! Parsed once at startup and injected; nothing re-reads the environment
//! after that.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration. Every flag can also come from the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "reqflow", about = "Two-stage email approval workflow server")]
pub struct AppConfig {
    /// Address to listen on
    #[arg(long, env = "REQFLOW_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// Database connection string
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:reqflow.db")]
    pub database_url: String,

    /// Public base URL embedded in emailed action links
    #[arg(long, env = "REQFLOW_BASE_URL", default_value = "http://localhost:3000")]
    pub base_url: String,

    /// Stakeholder emails, identical for both approval stages
    #[arg(
        long,
        env = "REQFLOW_STAKEHOLDERS",
        value_delimiter = ',',
        required = true
    )]
    pub stakeholders: Vec<String>,

    /// Mail relay endpoint messages are POSTed to
    #[arg(long, env = "REQFLOW_MAILER_URL", default_value = "http://localhost:8025/messages")]
    pub mailer_url: String,

    /// Sender address on outgoing mail
    #[arg(long, env = "REQFLOW_MAIL_FROM", default_value = "approvals@localhost")]
    pub mail_from: String,

    /// Header carrying the authenticated email of the clicking user,
    /// set by the fronting proxy
    #[arg(long, env = "REQFLOW_IDENTITY_HEADER", default_value = "x-authenticated-email")]
    pub identity_header: String,

    /// Seconds to wait for the document lock before failing a decision
    #[arg(long, env = "REQFLOW_LOCK_TIMEOUT_SECS", default_value_t = 30)]
    pub lock_timeout_secs: u64,
}

impl AppConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}
