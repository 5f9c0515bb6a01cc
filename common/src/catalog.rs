//! # Static Catalog
//!
//! Read-only reference data loaded once at startup: the public resolvers
//! queried by the DNS propagation check and the port-to-service names used
//! to label open ports.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BUILTIN_CATALOG: &str = include_str!("../data/catalog.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed catalog: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("catalog lists {0} more than once")]
    DuplicateServer(IpAddr),
}

/// A public recursive resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DnsServer {
    pub name: String,
    pub address: IpAddr,
    pub country: String,
    pub provider: String,
}

impl DnsServer {
    /// A user-supplied server with no catalog metadata.
    pub fn custom(address: IpAddr) -> Self {
        Self {
            name: format!("Custom DNS ({address})"),
            address,
            country: "Custom".to_string(),
            provider: "Custom".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub dns_servers: Vec<DnsServer>,
    #[serde(default)]
    pub port_services: BTreeMap<u16, String>,
}

impl Catalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_json::from_str(text)?;
        catalog.check()?;
        Ok(catalog)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let text: String = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Well-known service name for `port`, `"Unknown"` if none is listed.
    pub fn service_name(&self, port: u16) -> &str {
        self.port_services
            .get(&port)
            .map(String::as_str)
            .unwrap_or("Unknown")
    }

    fn check(&self) -> Result<(), CatalogError> {
        let mut seen = std::collections::HashSet::new();
        for server in &self.dns_servers {
            if !seen.insert(server.address) {
                return Err(CatalogError::DuplicateServer(server.address));
            }
        }
        Ok(())
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_loads() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.dns_servers.len(), 15);
        assert_eq!(catalog.dns_servers[0].address.to_string(), "8.8.8.8");
        assert_eq!(catalog.service_name(22), "SSH");
        assert_eq!(catalog.service_name(5432), "PostgreSQL");
        assert_eq!(catalog.service_name(4), "Unknown");
    }

    #[test]
    fn duplicate_servers_are_rejected() {
        let text = r#"{ "dns_servers": [
            { "name": "a", "address": "1.1.1.1", "country": "x", "provider": "y" },
            { "name": "b", "address": "1.1.1.1", "country": "x", "provider": "y" }
        ] }"#;
        assert!(matches!(
            Catalog::from_json(text),
            Err(CatalogError::DuplicateServer(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Catalog::from_path(Path::new("/nonexistent/catalog.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/catalog.json"));
    }
}
