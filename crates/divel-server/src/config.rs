use std::net::{Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Largest evidence body accepted for ingestion or verification.
    pub max_evidence_bytes: usize,
    /// Answer CORS preflights from any origin, for a browser front end
    /// served elsewhere.
    pub allow_any_origin: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8740)),
            max_evidence_bytes: 100 * 1024 * 1024,
            allow_any_origin: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8740".parse::<SocketAddr>().unwrap());
        assert_eq!(c.max_evidence_bytes, 100 * 1024 * 1024);
        assert!(!c.allow_any_origin);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c: ServerConfig = serde_json::from_str(r#"{"bind_addr":"0.0.0.0:9000"}"#).unwrap();
        assert_eq!(c.bind_addr.port(), 9000);
        assert_eq!(c.max_evidence_bytes, ServerConfig::default().max_evidence_bytes);
    }
}
