//! Service catalog: the static set of services this orchestrator may deploy.
//!
//! Loaded once from configuration and shared read-only for the lifetime of
//! the process. Names are normalized to lower case on construction, so every
//! lookup is case-insensitive.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building a catalog
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Service name must not be empty")]
    EmptyName,

    #[error("Duplicate service in catalog: {0}")]
    Duplicate(String),
}

/// A named, versioned service that must be deployed before its dependent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.version)
        }
    }
}

/// A single catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Service name (lower-cased once inside a catalog)
    pub name: String,

    /// Declared chart version
    #[serde(default)]
    pub version: String,

    /// Direct dependencies, in declaration order
    #[serde(default)]
    pub depends: Vec<Dependency>,
}

impl ServiceEntry {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            depends: Vec::new(),
        }
    }

    /// Add a dependency (builder style)
    pub fn depends_on(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.depends.push(Dependency::new(name, version));
        self
    }
}

/// Immutable, case-normalized service catalog
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    entries: Vec<ServiceEntry>,
}

impl ServiceCatalog {
    /// Build a catalog, normalizing names and rejecting duplicates
    pub fn new(entries: Vec<ServiceEntry>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(entries.len());

        for mut entry in entries {
            entry.name = normalize(&entry.name);
            if entry.name.is_empty() {
                return Err(CatalogError::EmptyName);
            }
            if !seen.insert(entry.name.clone()) {
                return Err(CatalogError::Duplicate(entry.name));
            }
            for dep in &mut entry.depends {
                dep.name = normalize(&dep.name);
            }
            normalized.push(entry);
        }

        Ok(Self {
            entries: normalized,
        })
    }

    /// Look up a service by name (case-insensitive)
    pub fn get(&self, service: &str) -> Option<&ServiceEntry> {
        let wanted = normalize(service);
        self.entries.iter().find(|e| e.name == wanted)
    }

    /// Whether the service is known to the catalog (case-insensitive)
    pub fn has_service(&self, service: &str) -> bool {
        self.get(service).is_some()
    }

    pub fn entries(&self) -> &[ServiceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical form of a service name
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ServiceCatalog {
        ServiceCatalog::new(vec![
            ServiceEntry::new("Postgres", "14.2"),
            ServiceEntry::new("web", "1.0.0")
                .depends_on("postgres", "14.2")
                .depends_on("Redis", "7"),
        ])
        .unwrap()
    }

    #[test]
    fn test_has_service_any_case() {
        let catalog = catalog();

        for name in ["postgres", "POSTGRES", "PostGres", "web", "WEB"] {
            assert!(catalog.has_service(name), "{name} should be known");
        }
        assert!(!catalog.has_service("redis"));
        assert!(!catalog.has_service(""));
    }

    #[test]
    fn test_names_are_normalized() {
        let catalog = catalog();
        let web = catalog.get("Web").unwrap();

        assert_eq!(catalog.entries()[0].name, "postgres");
        assert_eq!(web.depends[1].name, "redis");
        assert_eq!(web.depends[1].version, "7");
    }

    #[test]
    fn test_duplicate_rejected_case_insensitively() {
        let result = ServiceCatalog::new(vec![
            ServiceEntry::new("web", "1"),
            ServiceEntry::new("WEB", "2"),
        ]);

        assert_eq!(result.unwrap_err(), CatalogError::Duplicate("web".into()));
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = ServiceCatalog::new(vec![ServiceEntry::new("  ", "1")]);
        assert_eq!(result.unwrap_err(), CatalogError::EmptyName);
    }

    #[test]
    fn test_dependency_display() {
        assert_eq!(Dependency::new("db", "14").to_string(), "db@14");
        assert_eq!(Dependency::new("db", "").to_string(), "db");
    }
}
