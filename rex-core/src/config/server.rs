//! Listener configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listening address
    /// Env: REX_HOST
    /// Default: "127.0.0.1"
    pub host: String,

    /// Listening port
    /// Env: REX_PORT
    /// Default: 8080
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8080 }
    }
}

impl ServerConfig {
    pub fn apply_env_vars(&mut self) {
        if let Ok(host) = env::var("REX_HOST") {
            self.host = host;
        }

        if let Ok(port) = env::var("REX_PORT") {
            if let Ok(p) = port.parse() {
                self.port = p;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            bail!("Invalid host: host cannot be empty");
        }
        Ok(())
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address() {
        let cfg = ServerConfig { port: 3000, ..Default::default() };
        assert_eq!(cfg.address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_empty_host_fails() {
        let cfg = ServerConfig { host: String::new(), ..Default::default() };
        assert!(cfg.validate().unwrap_err().to_string().contains("host cannot be empty"));
    }
}
