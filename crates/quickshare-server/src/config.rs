use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use quickshare_gateway::PeerId;
use quickshare_transfer::{CHUNK_SIZE, SessionConfig};

/// Runtime settings, read from `QUICKSHARE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub download_dir: PathBuf,
    pub auto_accept: bool,
    pub peer_id: PeerId,
    pub chunk_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = get("QUICKSHARE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("QUICKSHARE_PORT")
            .unwrap_or_else(|| "3210".into())
            .parse()
            .context("QUICKSHARE_PORT must be a port number")?;
        let download_dir: PathBuf = get("QUICKSHARE_DOWNLOAD_DIR")
            .unwrap_or_else(|| "./downloads".into())
            .into();
        let auto_accept = match get("QUICKSHARE_AUTO_ACCEPT") {
            Some(v) => parse_bool(&v).context("QUICKSHARE_AUTO_ACCEPT must be true or false")?,
            None => false,
        };
        let peer_id = match get("QUICKSHARE_PEER_ID") {
            Some(v) => v.parse()?,
            None => PeerId::generate(),
        };
        let chunk_size: usize = match get("QUICKSHARE_CHUNK_SIZE") {
            Some(v) => v.parse().context("QUICKSHARE_CHUNK_SIZE must be a byte count")?,
            None => CHUNK_SIZE,
        };
        if chunk_size == 0 {
            bail!("QUICKSHARE_CHUNK_SIZE must be greater than zero");
        }

        Ok(Self {
            host,
            port,
            download_dir,
            auto_accept,
            peer_id,
            chunk_size,
        })
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig::with_chunk_size(self.chunk_size)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("not a boolean: {:?}", other),
    }
}
