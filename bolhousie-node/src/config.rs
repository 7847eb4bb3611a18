//! Load config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;

/// Node configuration. File: ~/.config/bolhousie/config.toml or /etc/bolhousie/config.toml.
/// Env overrides: BOLHOUSIE_PEER_HOST, BOLHOUSIE_PEER_PORT, BOLHOUSIE_PEER_SECURE,
/// BOLHOUSIE_AUDIO_BASE_URL, BOLHOUSIE_CATALOG.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Rendezvous host (default localhost).
    #[serde(default = "default_peer_host")]
    pub peer_host: String,
    /// Rendezvous port (default 9000).
    #[serde(default = "default_peer_port")]
    pub peer_port: u16,
    /// Encrypt the rendezvous link (default false).
    #[serde(default)]
    pub peer_secure: bool,
    /// Base URL serving `/audio/{id}.mp3`. Unset disables the audio probe.
    #[serde(default)]
    pub audio_base_url: Option<String>,
    /// Catalog JSON path. Unset uses the bundled catalog.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
}

fn default_peer_host() -> String {
    "localhost".to_string()
}
fn default_peer_port() -> u16 {
    9000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            peer_host: default_peer_host(),
            peer_port: default_peer_port(),
            peer_secure: false,
            audio_base_url: None,
            catalog: None,
        }
    }
}

impl Config {
    pub fn peer_addr(&self) -> String {
        format!("{}:{}", self.peer_host, self.peer_port)
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_overrides(&mut c, |key| std::env::var(key).ok());
    c
}

fn apply_overrides(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("BOLHOUSIE_PEER_HOST") {
        if !s.trim().is_empty() {
            c.peer_host = s.trim().to_string();
        }
    }
    if let Some(s) = var("BOLHOUSIE_PEER_PORT") {
        if let Ok(p) = s.trim().parse::<u16>() {
            c.peer_port = p;
        }
    }
    if let Some(s) = var("BOLHOUSIE_PEER_SECURE") {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => c.peer_secure = true,
            "0" | "false" | "no" => c.peer_secure = false,
            _ => {}
        }
    }
    if let Some(s) = var("BOLHOUSIE_AUDIO_BASE_URL") {
        c.audio_base_url = Some(s).filter(|s| !s.trim().is_empty());
    }
    if let Some(s) = var("BOLHOUSIE_CATALOG") {
        c.catalog = Some(PathBuf::from(s)).filter(|p| !p.as_os_str().is_empty());
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/bolhousie/config.toml"));
    }
    out.push(PathBuf::from("/etc/bolhousie/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p).map(|s| toml::from_str::<Config>(&s)) {
                Ok(Ok(c)) => return Some(c),
                Ok(Err(e)) => tracing::warn!(path = %p.display(), error = %e, "ignoring invalid config"),
                Err(e) => tracing::warn!(path = %p.display(), error = %e, "cannot read config"),
            }
            break;
        }
    }
    None
}
