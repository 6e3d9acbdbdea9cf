//! Device port tables used to populate port selects and to correlate a
//! primary CPE port with its backup counterpart.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Error;

const BUILTIN_CATALOG: &str = include_str!("../catalog.json");

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum PortTable {
    PhysicalPorts,
    RethPorts,
}

/// Which column of a paired primary/backup table to read.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum PortRole {
    Primary,
    Backup,
}

impl PortRole {
    fn key_suffix(self) -> &'static str {
        match self {
            PortRole::Primary => "_primary",
            PortRole::Backup => "_backup",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RaisecomModel {
    #[serde(default)]
    pub uplink_ports: Vec<String>,
    #[serde(default)]
    pub client_ports: Vec<String>,
    /// Highest supported port bandwidth, e.g. "1G" or "10G".
    #[serde(default)]
    pub bandwidth: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PortCatalog {
    /// Keyed by `<family>_primary` / `<family>_backup`. Lists at the same
    /// key family are aligned by position.
    #[serde(default)]
    pub physical_ports: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub reth_ports: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub raisecoms: BTreeMap<String, RaisecomModel>,
}

impl PortCatalog {
    pub fn builtin() -> Result<Self, Error> {
        Ok(serde_json::from_str(BUILTIN_CATALOG)?)
    }

    fn table(&self, table: PortTable) -> &BTreeMap<String, Vec<String>> {
        match table {
            PortTable::PhysicalPorts => &self.physical_ports,
            PortTable::RethPorts => &self.reth_ports,
        }
    }

    /// Ports of a device family, e.g. `ports(PhysicalPorts, "SRX300", Primary)`.
    /// The family is matched case-insensitively.
    pub fn ports(&self, table: PortTable, family: &str, role: PortRole) -> Option<&[String]> {
        if family.is_empty() {
            return None;
        }
        let key = format!("{}{}", family.to_lowercase(), role.key_suffix());
        self.table(table).get(&key).map(|v| v.as_slice())
    }

    /// The backup port at the same position as `primary` in the primary list.
    pub fn correlate(&self, table: PortTable, family: &str, primary: &str) -> Option<&str> {
        let primaries = self.ports(table, family, PortRole::Primary)?;
        let position = primaries.iter().position(|p| p == primary)?;
        self.ports(table, family, PortRole::Backup)?
            .get(position)
            .map(|p| p.as_str())
    }

    pub fn raisecom(&self, model: &str) -> Option<&RaisecomModel> {
        self.raisecoms.get(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_aligned_port_lists() {
        let catalog = PortCatalog::builtin().unwrap();
        for table in [PortTable::PhysicalPorts, PortTable::RethPorts] {
            for family in ["srx300", "srx345"] {
                let primary = catalog.ports(table, family, PortRole::Primary).unwrap();
                let backup = catalog.ports(table, family, PortRole::Backup).unwrap();
                assert_eq!(primary.len(), backup.len(), "{table:?} {family}");
            }
        }
    }

    #[test]
    fn ports_lookup_ignores_family_case() {
        let catalog = PortCatalog::builtin().unwrap();
        assert_eq!(
            catalog.ports(PortTable::RethPorts, "SRX300", PortRole::Primary),
            catalog.ports(PortTable::RethPorts, "srx300", PortRole::Primary)
        );
        assert!(catalog.ports(PortTable::RethPorts, "", PortRole::Primary).is_none());
        assert!(catalog.ports(PortTable::RethPorts, "mx204", PortRole::Primary).is_none());
    }

    #[test]
    fn correlate_reads_same_position() {
        let catalog = PortCatalog::builtin().unwrap();
        assert_eq!(
            catalog.correlate(PortTable::PhysicalPorts, "SRX345", "ge-0/0/4"),
            Some("ge-5/0/4")
        );
        assert_eq!(
            catalog.correlate(PortTable::PhysicalPorts, "SRX345", "xe-0/0/9"),
            None
        );
    }

    #[test]
    fn correlate_handles_short_backup_list() {
        let mut catalog = PortCatalog::default();
        catalog
            .physical_ports
            .insert("lab_primary".into(), vec!["a".into(), "b".into()]);
        catalog
            .physical_ports
            .insert("lab_backup".into(), vec!["a'".into()]);
        assert_eq!(catalog.correlate(PortTable::PhysicalPorts, "lab", "a"), Some("a'"));
        assert_eq!(catalog.correlate(PortTable::PhysicalPorts, "lab", "b"), None);
    }
}
