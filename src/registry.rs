use crate::encoding::fmt_checksum;
use anyhow::{anyhow, bail, Context, Result};
use ethers::abi::{Abi, AbiParser};
use ethers::types::Address;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::{fs, path::Path};
use thiserror::Error;

const BUILTIN_REGISTRY: &str = include_str!("../registry/default.json");

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRaw {
    pub default_factory: String,
    pub networks: Vec<NetworkRaw>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRaw {
    pub chain_id: u64,
    pub name: String,
    pub short_name: String,
    pub block_explorer: String,
    pub entry_point: String,
    #[serde(default)]
    pub is_supported: bool,
    #[serde(default)]
    pub factories: Vec<FactoryRaw>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryRaw {
    pub key: String,
    pub name: String,
    pub address: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Human-readable ABI. Omit when the factory's interface is unknown.
    #[serde(default)]
    pub abi: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct FactoryConfig {
    pub key: String,
    pub name: String,
    pub address: Address,
    pub kind: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub abi: Option<Abi>,
}

impl FactoryConfig {
    /// A factory given only by address (e.g. `--factory-address`); its interface is unknown.
    pub fn adhoc(address: Address) -> Self {
        Self {
            key: "custom".to_string(),
            name: "Custom factory".to_string(),
            address,
            kind: "unknown".to_string(),
            version: None,
            description: None,
            abi: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: String,
    pub short_name: String,
    pub block_explorer: String,
    pub entry_point: Address,
    pub is_supported: bool,
    pub factories: Vec<FactoryConfig>,
}

impl NetworkConfig {
    pub fn factory(&self, key: &str) -> Option<&FactoryConfig> {
        self.factories.iter().find(|f| f.key == key)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("network {0} is not configured")]
    NetworkNotConfigured(u64),

    #[error("network {0} is not supported yet")]
    NetworkNotSupported(String),

    #[error("factory type '{key}' not available on {network}")]
    FactoryNotAvailable { key: String, network: String },
}

/// Chain id -> network/factory table. Built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct Registry {
    default_factory: String,
    networks: BTreeMap<u64, NetworkConfig>,
}

impl Registry {
    /// The table shipped with the crate (`registry/default.json`).
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_REGISTRY, "builtin registry")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read registry json at {}", path.display()))?;
        Self::from_json(&raw, &path.display().to_string())
    }

    pub fn from_json(raw: &str, origin: &str) -> Result<Self> {
        let raw: RegistryRaw = serde_json::from_str(raw)
            .with_context(|| format!("failed to parse registry json ({origin})"))?;
        Self::from_raw(raw).with_context(|| format!("invalid registry ({origin})"))
    }

    pub fn from_raw(raw: RegistryRaw) -> Result<Self> {
        let mut networks = BTreeMap::new();

        for net in raw.networks {
            let entry_point = parse_addr(&net.entry_point)
                .with_context(|| format!("invalid entryPoint for {}", net.name))?;

            let mut seen = HashSet::new();
            let mut factories = Vec::with_capacity(net.factories.len());
            for f in net.factories {
                if !seen.insert(f.key.clone()) {
                    bail!("duplicate factory key '{}' on {}", f.key, net.name);
                }
                factories.push(parse_factory(f)?);
            }

            if net.is_supported && !factories.iter().any(|f| f.key == raw.default_factory) {
                bail!(
                    "default factory '{}' missing on supported network {}",
                    raw.default_factory,
                    net.name
                );
            }

            let network = NetworkConfig {
                chain_id: net.chain_id,
                name: net.name,
                short_name: net.short_name,
                block_explorer: net.block_explorer.trim_end_matches('/').to_string(),
                entry_point,
                is_supported: net.is_supported,
                factories,
            };
            if networks.insert(net.chain_id, network).is_some() {
                bail!("duplicate chainId {}", net.chain_id);
            }
        }

        Ok(Self {
            default_factory: raw.default_factory,
            networks,
        })
    }

    pub fn default_factory_key(&self) -> &str {
        &self.default_factory
    }

    pub fn network(&self, chain_id: u64) -> Option<&NetworkConfig> {
        self.networks.get(&chain_id)
    }

    pub fn networks(&self) -> impl Iterator<Item = &NetworkConfig> {
        self.networks.values()
    }

    pub fn supported_networks(&self) -> impl Iterator<Item = &NetworkConfig> {
        self.networks.values().filter(|n| n.is_supported)
    }

    pub fn is_network_supported(&self, chain_id: u64) -> bool {
        self.network(chain_id).map(|n| n.is_supported).unwrap_or(false)
    }

    pub fn factory(&self, chain_id: u64, key: &str) -> Option<&FactoryConfig> {
        self.network(chain_id)?.factory(key)
    }

    pub fn default_factory(&self, chain_id: u64) -> Option<&FactoryConfig> {
        self.factory(chain_id, &self.default_factory)
    }

    /// Resolve a supported network and one of its factories (`None` = default factory).
    pub fn validate_network_config(
        &self,
        chain_id: u64,
        factory_key: Option<&str>,
    ) -> Result<(&NetworkConfig, &FactoryConfig), RegistryError> {
        let network = self.supported_network(chain_id)?;
        let key = factory_key.unwrap_or(&self.default_factory);
        let factory = network
            .factory(key)
            .ok_or_else(|| RegistryError::FactoryNotAvailable {
                key: key.to_string(),
                network: network.name.clone(),
            })?;
        Ok((network, factory))
    }

    pub fn supported_network(&self, chain_id: u64) -> Result<&NetworkConfig, RegistryError> {
        let network = self
            .network(chain_id)
            .ok_or(RegistryError::NetworkNotConfigured(chain_id))?;
        if !network.is_supported {
            return Err(RegistryError::NetworkNotSupported(network.name.clone()));
        }
        Ok(network)
    }

    pub fn explorer_url(&self, chain_id: u64, address: Address) -> Option<String> {
        self.network(chain_id).map(|n| {
            format!("{}/address/{}", n.block_explorer, fmt_checksum(address))
        })
    }
}

fn parse_factory(raw: FactoryRaw) -> Result<FactoryConfig> {
    let address =
        parse_addr(&raw.address).with_context(|| format!("invalid address for factory '{}'", raw.key))?;

    let abi = match raw.abi {
        Some(lines) => {
            let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
            let abi = AbiParser::default()
                .parse(&lines)
                .map_err(|e| anyhow!("invalid abi for factory '{}': {e}", raw.key))?;
            Some(abi)
        }
        None => None,
    };

    Ok(FactoryConfig {
        key: raw.key,
        name: raw.name,
        address,
        kind: raw.kind,
        version: raw.version,
        description: raw.description,
        abi,
    })
}

pub fn parse_addr(s: &str) -> Result<Address> {
    s.trim()
        .parse::<Address>()
        .map_err(|e| anyhow!("{e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEPOLIA: u64 = 11_155_111;

    #[test]
    fn builtin_registry_loads() {
        let registry = Registry::builtin().unwrap();
        let sepolia = registry.network(SEPOLIA).unwrap();
        assert!(sepolia.is_supported);
        assert_eq!(
            sepolia.entry_point,
            parse_addr("0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789").unwrap()
        );
        assert_eq!(sepolia.factories[0].key, "simple");
        assert!(sepolia.factory("biconomy").unwrap().abi.is_none());
        assert!(sepolia.factory("kernel_v24").unwrap().abi.is_some());
        assert_eq!(registry.supported_networks().count(), 1);
    }

    #[test]
    fn validate_network_config_reports_typed_errors() {
        let registry = Registry::builtin().unwrap();

        let (network, factory) = registry.validate_network_config(SEPOLIA, None).unwrap();
        assert_eq!(network.name, "Sepolia");
        assert_eq!(factory.key, "simple");

        assert_eq!(
            registry.validate_network_config(1, None).unwrap_err(),
            RegistryError::NetworkNotConfigured(1)
        );
        assert!(matches!(
            registry.validate_network_config(SEPOLIA, Some("nope")),
            Err(RegistryError::FactoryNotAvailable { .. })
        ));
    }

    #[test]
    fn unsupported_network_is_rejected() {
        let raw = r#"{
            "defaultFactory": "simple",
            "networks": [{
                "chainId": 84532, "name": "Base Sepolia", "shortName": "base-sepolia",
                "blockExplorer": "https://sepolia.basescan.org/",
                "entryPoint": "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789",
                "isSupported": false
            }]
        }"#;
        let registry = Registry::from_json(raw, "test").unwrap();
        assert!(!registry.is_network_supported(84532));
        assert_eq!(
            registry.supported_network(84532).unwrap_err(),
            RegistryError::NetworkNotSupported("Base Sepolia".to_string())
        );
        assert_eq!(
            registry
                .explorer_url(84532, Address::zero())
                .unwrap(),
            "https://sepolia.basescan.org/address/0x0000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn load_time_validation_catches_bad_entries() {
        let with_factory = |factory: &str| {
            format!(
                r#"{{
                    "defaultFactory": "simple",
                    "networks": [{{
                        "chainId": 1, "name": "X", "shortName": "x", "blockExplorer": "https://x",
                        "entryPoint": "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789",
                        "isSupported": true,
                        "factories": [{factory}]
                    }}]
                }}"#
            )
        };

        let bad_address = with_factory(r#"{"key":"simple","name":"a","address":"0x12","type":"simple"}"#);
        assert!(Registry::from_json(&bad_address, "test").is_err());

        let bad_abi = with_factory(
            r#"{"key":"simple","name":"a","address":"0x9406Cc6185a346906296840746125a0E44976454","type":"simple","abi":["function getAddress(address owner"]}"#,
        );
        assert!(Registry::from_json(&bad_abi, "test").is_err());

        let missing_default = with_factory(
            r#"{"key":"other","name":"a","address":"0x9406Cc6185a346906296840746125a0E44976454","type":"simple"}"#,
        );
        assert!(Registry::from_json(&missing_default, "test").is_err());

        let duplicate = with_factory(
            r#"{"key":"simple","name":"a","address":"0x9406Cc6185a346906296840746125a0E44976454","type":"simple"},
               {"key":"simple","name":"b","address":"0x9406Cc6185a346906296840746125a0E44976454","type":"simple"}"#,
        );
        assert!(Registry::from_json(&duplicate, "test").is_err());
    }
}
