//! rtxspec project configuration
//!
//! Handles loading of the `.rtxspec.yaml` project file, which carries the
//! static device catalog (model capabilities, license tables) and the
//! generation settings. Both are passed explicitly to the generators.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Project config file name
pub const CONFIG_FILE: &str = ".rtxspec.yaml";

/// Root project configuration (`.rtxspec.yaml`)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectConfig {
    /// Schema version for migrations
    pub version: u32,

    #[serde(default)]
    pub catalog: Catalog,

    #[serde(default)]
    pub generation: GenerationConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            version: 1,
            catalog: Catalog::default(),
            generation: GenerationConfig::default(),
        }
    }
}

/// Static device metadata: model capabilities and license tables
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Catalog {
    #[serde(default)]
    pub models: IndexMap<String, ModelInfo>,

    #[serde(default)]
    pub licenses: Vec<LicenseTable>,
}

/// One device model
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ModelInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Firmware revision the catalog describes, e.g. `14.01.38`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,

    /// Base capability limits without any license, e.g. `ipsec_tunnels: 100`
    #[serde(default)]
    pub limits: IndexMap<String, i64>,
}

/// Extended limits granted by holding `quantity` copies of a license SKU
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LicenseTable {
    pub sku: String,

    /// Capability key the license extends
    pub capability: String,

    /// Models the table applies to; empty means all
    #[serde(default)]
    pub models: Vec<String>,

    /// Limit per quantity; index 0 is one license
    pub limits: Vec<i64>,
}

impl LicenseTable {
    pub fn applies_to(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m == model)
    }
}

/// Licenses held: SKU -> quantity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct LicenseContext(pub IndexMap<String, u32>);

impl LicenseContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sku: impl Into<String>, quantity: u32) -> Self {
        self.0.insert(sku.into(), quantity);
        self
    }

    pub fn quantity(&self, sku: &str) -> u32 {
        self.0.get(sku).copied().unwrap_or(0)
    }

    pub fn holds(&self, sku: &str) -> bool {
        self.quantity(sku) > 0
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|q| *q == 0)
    }

    /// Sorted (sku, quantity) pairs with zero quantities dropped
    pub fn normalized(&self) -> Vec<(String, u32)> {
        let mut pairs: Vec<_> = self
            .0
            .iter()
            .filter(|(_, q)| **q > 0)
            .map(|(k, q)| (k.clone(), *q))
            .collect();
        pairs.sort();
        pairs
    }

    /// Parse `SKU=N` (N defaults to 1)
    pub fn parse_grant(arg: &str) -> Result<(String, u32)> {
        match arg.split_once('=') {
            Some((sku, qty)) => {
                let qty = qty
                    .trim()
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid license quantity in '{}'", arg)))?;
                Ok((sku.trim().to_string(), qty))
            }
            None => Ok((arg.trim().to_string(), 1)),
        }
    }
}

/// Generation settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationConfig {
    /// Let generation complete despite coverage gaps
    #[serde(default)]
    pub allow_coverage_gaps: bool,

    /// Fan batch generation out across threads
    #[serde(default)]
    pub parallel: bool,

    /// Token used as the out-of-set enum case
    #[serde(default = "default_out_of_set_token")]
    pub out_of_set_token: String,

    /// License context used when none is given explicitly
    #[serde(default)]
    pub license: LicenseContext,
}

fn default_out_of_set_token() -> String {
    "invalid-value".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            allow_coverage_gaps: false,
            parallel: false,
            out_of_set_token: default_out_of_set_token(),
            license: LicenseContext::default(),
        }
    }
}

impl ProjectConfig {
    /// Load `.rtxspec.yaml` from a directory
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let file = dir.join(CONFIG_FILE);
        if !file.exists() {
            return Ok(None);
        }
        Self::load(&file).map(Some)
    }

    /// Load a config file from an explicit path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        let config: ProjectConfig = serde_norway::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        if config.version != 1 {
            return Err(Error::Config(format!(
                "Unsupported {} version: {}",
                CONFIG_FILE, config.version
            )));
        }

        Ok(config)
    }
}

impl Catalog {
    pub fn knows_model(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.contains_key(model)
    }

    /// Base limit of a capability on a model
    pub fn base_limit(&self, model: &str, capability: &str) -> Option<i64> {
        self.models.get(model)?.limits.get(capability).copied()
    }

    /// License tables extending a capability on a model
    pub fn license_tables<'a>(
        &'a self,
        model: &'a str,
        capability: &'a str,
    ) -> impl Iterator<Item = &'a LicenseTable> + 'a {
        self.licenses
            .iter()
            .filter(move |t| t.capability == capability && t.applies_to(model))
    }

    pub fn firmware(&self, model: &str) -> Option<&str> {
        self.models.get(model)?.firmware.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
version: 1
catalog:
  models:
    RTX1210:
      firmware: "14.01.38"
      limits: { ipsec_tunnels: 100 }
    RTX830:
      firmware: "15.02.10"
      limits: { ipsec_tunnels: 20 }
  licenses:
    - sku: YSL-VPN-EX2
      capability: ipsec_tunnels
      models: [RTX1210]
      limits: [300, 500, 700, 900, 1100]
generation:
  allow_coverage_gaps: true
  license: { YSL-VPN-EX2: 1 }
"#;

    #[test]
    fn test_load_from_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), CONFIG).unwrap();

        let config = ProjectConfig::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(config.catalog.models.len(), 2);
        assert_eq!(config.catalog.base_limit("RTX830", "ipsec_tunnels"), Some(20));
        assert_eq!(config.catalog.firmware("RTX1210"), Some("14.01.38"));
        assert!(config.generation.allow_coverage_gaps);
        assert_eq!(config.generation.license.quantity("YSL-VPN-EX2"), 1);
        assert_eq!(config.generation.out_of_set_token, "invalid-value");
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(ProjectConfig::load_from_dir(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "version: 7\n").unwrap();
        let err = ProjectConfig::load_from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported"));
    }

    #[test]
    fn test_license_tables_filter_by_model() {
        let config: ProjectConfig = serde_norway::from_str(CONFIG).unwrap();
        let catalog = &config.catalog;
        assert_eq!(catalog.license_tables("RTX1210", "ipsec_tunnels").count(), 1);
        assert_eq!(catalog.license_tables("RTX830", "ipsec_tunnels").count(), 0);
    }

    #[test]
    fn test_parse_grant() {
        assert_eq!(
            LicenseContext::parse_grant("YSL-VPN-EX2=3").unwrap(),
            ("YSL-VPN-EX2".to_string(), 3)
        );
        assert_eq!(
            LicenseContext::parse_grant("YSL-VPN-EX2").unwrap(),
            ("YSL-VPN-EX2".to_string(), 1)
        );
        assert!(LicenseContext::parse_grant("X=abc").is_err());
    }
}
