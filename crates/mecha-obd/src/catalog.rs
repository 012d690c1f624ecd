//! DTC catalog - static fault reference data
//!
//! Loaded once at startup from a YAML file and read-only afterwards:
//!
//! ```yaml
//! meta:
//!   name: generic-obd2
//!   version: "1.0"
//! codes:
//!   P0302:
//!     system: engine
//!     severity: high
//!     description: Cylinder 2 misfire detected
//!     action: Inspect ignition coil and spark plug on cylinder 2
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use mecha_core::{DtcCode, FaultCode, Severity, SubsystemTag};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Catalog file metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    meta: Option<CatalogMeta>,
    #[serde(default)]
    codes: BTreeMap<String, CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    system: String,
    severity: Severity,
    description: String,
    #[serde(default)]
    action: Option<String>,
}

/// Read-only `DtcCode -> FaultCode` table
#[derive(Debug, Clone, Default)]
pub struct FaultCatalog {
    codes: BTreeMap<DtcCode, FaultCode>,
    meta: CatalogMeta,
}

impl FaultCatalog {
    /// Load a catalog from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Load a catalog from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        let mut codes = BTreeMap::new();

        for (raw, entry) in file.codes {
            let code: DtcCode = raw.parse().map_err(|reason| CatalogError::InvalidCode {
                code: raw.clone(),
                reason,
            })?;
            let system: SubsystemTag =
                entry
                    .system
                    .parse()
                    .map_err(|reason| CatalogError::InvalidEntry {
                        code: raw.clone(),
                        reason,
                    })?;

            let fault = FaultCode {
                code: code.clone(),
                system,
                severity: entry.severity,
                description: entry.description,
                recommended_action: entry.action,
            };
            // "p0302" and "P0302" normalize to the same code
            if codes.insert(code.clone(), fault).is_some() {
                return Err(CatalogError::DuplicateCode(code));
            }
        }

        Ok(Self {
            codes,
            meta: file.meta.unwrap_or_default(),
        })
    }

    /// Build a catalog from already-typed entries
    pub fn from_codes(entries: impl IntoIterator<Item = FaultCode>) -> Result<Self, CatalogError> {
        let mut codes = BTreeMap::new();
        for fault in entries {
            let code = fault.code.clone();
            if codes.insert(code.clone(), fault).is_some() {
                return Err(CatalogError::DuplicateCode(code));
            }
        }
        Ok(Self {
            codes,
            meta: CatalogMeta::default(),
        })
    }

    pub fn get(&self, code: &DtcCode) -> Option<&FaultCode> {
        self.codes.get(code)
    }

    pub fn contains(&self, code: &DtcCode) -> bool {
        self.codes.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn meta(&self) -> &CatalogMeta {
        &self.meta
    }

    /// Entries in code order
    pub fn iter(&self) -> impl Iterator<Item = &FaultCode> {
        self.codes.values()
    }
}
