use std::net::{IpAddr, SocketAddr};

use anyhow::Context;

const DEFAULT_PORT: u16 = 5005;
const DEFAULT_DATABASE_URL: &str = "sqlite://chat.db?mode=rwc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub store: StoreConfig,
}

impl Config {
    /// Reads `CHAT_HOST`, `PORT` and `DATABASE_URL`, honouring a `.env` file.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host: IpAddr = lookup("CHAT_HOST")
            .as_deref()
            .unwrap_or("0.0.0.0")
            .parse()
            .context("CHAT_HOST is not an IP address")?;
        let port = match lookup("PORT") {
            Some(port) => port.parse().with_context(|| format!("PORT {port:?} is not a port number"))?,
            None => DEFAULT_PORT,
        };
        let store = match lookup("DATABASE_URL").as_deref() {
            Some("memory") => StoreConfig::Memory,
            Some(url) => StoreConfig::Sqlite(url.to_owned()),
            None => StoreConfig::Sqlite(DEFAULT_DATABASE_URL.to_owned()),
        };

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            store,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<_, _> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:5005".parse().unwrap());
        assert_eq!(config.store, StoreConfig::Sqlite(DEFAULT_DATABASE_URL.into()));
    }

    #[test]
    fn overrides() {
        let config = config(&[("CHAT_HOST", "127.0.0.1"), ("PORT", "8080"), ("DATABASE_URL", "memory")]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.store, StoreConfig::Memory);
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(config(&[("PORT", "fifty")]).is_err());
    }
}
