//! Adapter registry for resolving backends from configuration.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::StorageAdapter;
use crate::ipfs::{IpfsAdapter, IpfsConfig};
use crate::memory::MemoryAdapter;
use crate::pinata::{PinataAdapter, PinataConfig};
use crate::sqlite::{SqliteAdapter, SqliteConfig};
use tacostore_common::{Error, Result};

/// Factory function type for creating adapters.
pub type AdapterFactory = Box<dyn Fn(Value) -> Result<Arc<dyn StorageAdapter>> + Send + Sync>;

/// Registry for storage adapter factories.
///
/// Maps an adapter kind (e.g. "sqlite") to a factory that builds the
/// adapter from its JSON options.
pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register an adapter factory.
    ///
    /// # Errors
    /// - `InvalidConfig` if `kind` is already registered
    pub fn register(&mut self, kind: impl Into<String>, factory: AdapterFactory) -> Result<()> {
        let kind = kind.into();
        if self.factories.contains_key(&kind) {
            return Err(Error::InvalidConfig(format!(
                "Adapter '{}' is already registered",
                kind
            )));
        }
        self.factories.insert(kind, factory);
        Ok(())
    }

    /// Build an adapter of `kind` from `options`.
    ///
    /// The adapter is returned uninitialized.
    ///
    /// # Errors
    /// - `InvalidConfig` if `kind` is unknown or the options do not fit it
    pub fn resolve(&self, kind: &str, options: Value) -> Result<Arc<dyn StorageAdapter>> {
        let factory = self.factories.get(kind).ok_or_else(|| {
            Error::InvalidConfig(format!("Adapter '{}' is not registered", kind))
        })?;
        factory(options)
    }

    /// Registered adapter kinds, sorted.
    pub fn adapters(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn has_adapter(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize adapter options, reporting failures as configuration errors.
fn options<T: DeserializeOwned>(kind: &str, options: Value) -> Result<T> {
    serde_json::from_value(options)
        .map_err(|e| Error::InvalidConfig(format!("Invalid {} adapter options: {}", kind, e)))
}

/// Create a registry with the built-in adapters:
/// `memory`, `sqlite`, `ipfs` and `pinata`.
pub fn create_default_registry() -> AdapterRegistry {
    let mut factories: HashMap<String, AdapterFactory> = HashMap::new();

    factories.insert(
        "memory".to_string(),
        Box::new(|_| -> Result<Arc<dyn StorageAdapter>> { Ok(Arc::new(MemoryAdapter::new())) }),
    );
    factories.insert(
        "sqlite".to_string(),
        Box::new(|value| -> Result<Arc<dyn StorageAdapter>> {
            let config: SqliteConfig = options("sqlite", value)?;
            Ok(Arc::new(SqliteAdapter::new(config)))
        }),
    );
    factories.insert(
        "ipfs".to_string(),
        Box::new(|value| -> Result<Arc<dyn StorageAdapter>> {
            // Every field has a default, so missing options mean a local node.
            let value = if value.is_null() {
                Value::Object(Default::default())
            } else {
                value
            };
            let config: IpfsConfig = options("ipfs", value)?;
            Ok(Arc::new(IpfsAdapter::new(config)?))
        }),
    );
    factories.insert(
        "pinata".to_string(),
        Box::new(|value| -> Result<Arc<dyn StorageAdapter>> {
            let config: PinataConfig = options("pinata", value)?;
            Ok(Arc::new(PinataAdapter::new(config)?))
        }),
    );

    AdapterRegistry { factories }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn memory_factory() -> AdapterFactory {
        Box::new(|_| -> Result<Arc<dyn StorageAdapter>> { Ok(Arc::new(MemoryAdapter::new())) })
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = AdapterRegistry::new();

        registry
            .register("test", memory_factory())
            .unwrap();

        let adapter = registry.resolve("test", Value::Null).unwrap();
        assert_eq!(adapter.name(), "memory");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = create_default_registry();

        let result = registry.register("memory", memory_factory());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = AdapterRegistry::new();
        let result = registry.resolve("unknown", Value::Null);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_default_registry_kinds() {
        let registry = create_default_registry();
        assert_eq!(registry.adapters(), vec!["ipfs", "memory", "pinata", "sqlite"]);
        assert!(registry.has_adapter("sqlite"));
        assert!(!registry.has_adapter("gdrive"));
    }

    #[test]
    fn test_resolve_builtin_adapters() {
        let temp = TempDir::new().unwrap();
        let registry = create_default_registry();

        let sqlite = registry
            .resolve("sqlite", json!({"path": temp.path().join("db.sqlite")}))
            .unwrap();
        assert_eq!(sqlite.scheme(), "sqlite");

        let ipfs = registry.resolve("ipfs", Value::Null).unwrap();
        assert_eq!(ipfs.name(), "ipfs");

        let pinata = registry.resolve("pinata", json!({"jwt": "token"})).unwrap();
        assert_eq!(pinata.name(), "pinata");
    }

    #[test]
    fn test_bad_options_are_config_errors() {
        let registry = create_default_registry();

        assert!(matches!(
            registry.resolve("sqlite", json!({})),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            registry.resolve("pinata", json!({"jwt": ""})),
            Err(Error::InvalidConfig(_))
        ));
    }
}
