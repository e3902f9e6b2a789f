//! Relay configuration.

use std::net::SocketAddr;

use clap::Parser;

use tagwire_core::{KeyPolicy, ProtocolError};

/// Per-connection outbound queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 32;

/// Concurrent connections allowed from one IP address.
pub const DEFAULT_MAX_CONN_PER_IP: usize = 5;

/// Command-line arguments for `tagwire-server`.
#[derive(Debug, Parser)]
#[command(name = "tagwire-server")]
#[command(about = "Relay that encrypts, routes and verifies authenticated messages")]
pub struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "TAGWIRE_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Hex-encoded 32-byte master key (random per run if omitted)
    #[arg(long, env = "TAGWIRE_MASTER_KEY", hide_env_values = true)]
    pub master_key: Option<String>,

    /// Restrict registration to these names (repeatable)
    #[arg(long = "participant", env = "TAGWIRE_PARTICIPANTS", value_delimiter = ',')]
    pub participants: Vec<String>,

    /// Outbound queue depth per connection
    #[arg(long, default_value_t = DEFAULT_QUEUE_DEPTH)]
    pub queue_depth: usize,

    /// Maximum concurrent connections per IP
    #[arg(long, default_value_t = DEFAULT_MAX_CONN_PER_IP)]
    pub max_conn_per_ip: usize,
}

/// Runtime settings for [`run_server`](crate::run_server).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Outbound queue depth per connection. A full queue rejects delivery.
    pub queue_depth: usize,
    /// Connections beyond this count from one IP are dropped at accept.
    pub max_conn_per_ip: usize,
    /// Allowed participant names. Empty means any valid name.
    pub roster: Vec<String>,
    /// Hex master key. `None` generates a fresh one.
    pub master_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_conn_per_ip: DEFAULT_MAX_CONN_PER_IP,
            roster: Vec::new(),
            master_key: None,
        }
    }
}

impl ServerConfig {
    /// Build from parsed arguments.
    pub fn from_args(args: &ServerArgs) -> Self {
        Self {
            queue_depth: args.queue_depth.max(1),
            max_conn_per_ip: args.max_conn_per_ip,
            roster: args
                .participants
                .iter()
                .map(|p| p.trim().to_owned())
                .filter(|p| !p.is_empty())
                .collect(),
            master_key: args.master_key.clone(),
        }
    }

    /// Key policy for this run.
    ///
    /// # Errors
    ///
    /// `InvalidMasterKey` if a configured key is not 64 hex characters.
    pub fn key_policy(&self) -> Result<KeyPolicy, ProtocolError> {
        match &self.master_key {
            Some(hex) => KeyPolicy::from_hex(hex),
            None => Ok(KeyPolicy::generate()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = ServerArgs::parse_from(["tagwire-server"]);
        let config = ServerConfig::from_args(&args);
        assert_eq!(args.listen.port(), 8080);
        assert_eq!(config.queue_depth, DEFAULT_QUEUE_DEPTH);
        assert!(config.roster.is_empty());
        assert!(config.key_policy().is_ok());
    }

    #[test]
    fn test_roster_flags() {
        let args = ServerArgs::parse_from([
            "tagwire-server",
            "--participant",
            "Alice,Bob",
            "--participant",
            "Eve",
        ]);
        assert_eq!(
            ServerConfig::from_args(&args).roster,
            vec!["Alice", "Bob", "Eve"]
        );
    }

    #[test]
    fn test_bad_master_key() {
        let config = ServerConfig {
            master_key: Some("zz".into()),
            ..ServerConfig::default()
        };
        assert_eq!(
            config.key_policy().unwrap_err(),
            ProtocolError::InvalidMasterKey
        );
    }

    #[test]
    fn test_hex_master_key() {
        let config = ServerConfig {
            master_key: Some("ab".repeat(32)),
            ..ServerConfig::default()
        };
        assert!(config.key_policy().is_ok());
    }
}
