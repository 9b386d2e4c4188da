//! Named services available to validators, listeners and reducers.
//!
//! Rules sometimes need collaborators that are not state (a product
//! catalog, a rules table). They are registered on the engine by name and
//! looked up with their concrete type.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Name → value map with typed lookup.
#[derive(Default)]
pub struct Services {
    entries: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Services {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a service.
    pub fn register<T: Any + Send + Sync>(&mut self, name: impl Into<String>, service: T) {
        self.entries.insert(name.into(), Box::new(service));
    }

    /// Look up a service by name and type.
    ///
    /// Returns `None` if nothing is registered under `name` or it has another type.
    #[must_use]
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.entries.get(name)?.downcast_ref::<T>()
    }

    /// Whether anything is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("Services").field("names", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ProductCatalog {
        prices: HashMap<&'static str, f64>,
    }

    #[test]
    fn typed_lookup() {
        let mut services = Services::new();
        services.register("catalog", ProductCatalog {
            prices: HashMap::from([("WIDGET-1", 19.99), ("WIDGET-2", 29.99)]),
        });

        let catalog = services.get::<ProductCatalog>("catalog");
        assert_eq!(catalog.and_then(|c| c.prices.get("WIDGET-2")), Some(&29.99));
        assert!(services.contains("catalog"));
    }

    #[test]
    fn missing_or_mistyped_is_none() {
        let mut services = Services::new();
        services.register("limit", 10_u32);

        assert!(services.get::<u32>("does-not-exist").is_none());
        assert!(services.get::<String>("limit").is_none());
        assert_eq!(services.get::<u32>("limit"), Some(&10));
    }
}
