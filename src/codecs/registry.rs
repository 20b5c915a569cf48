//! Entity Registry
//!
//! Maps a [`Cacheable::TYPE_NAME`] to the function that rebuilds the entity, so the
//! codec never has to instantiate types from strings.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::traits::{Cacheable, DynCacheable};

type Reconstruct = fn(&str) -> anyhow::Result<Arc<dyn DynCacheable>>;

fn reconstruct<T: Cacheable>(encoded: &str) -> anyhow::Result<Arc<dyn DynCacheable>> {
    Ok(Arc::new(T::decode(encoded)?))
}

/// Concurrent registry of cacheable types
///
/// Registration may happen at any time, including after tiers were built:
/// tiers share the registry through an `Arc`.
#[derive(Default)]
pub struct EntityRegistry {
    decoders: DashMap<&'static str, Reconstruct>,
}

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`; a later registration under the same name replaces the earlier one
    pub fn register<T: Cacheable>(&self) {
        debug!(type_name = T::TYPE_NAME, "Registered cacheable type");
        self.decoders.insert(T::TYPE_NAME, reconstruct::<T>);
    }

    /// Builder-style [`EntityRegistry::register`]
    #[must_use]
    pub fn with<T: Cacheable>(self) -> Self {
        self.register::<T>();
        self
    }

    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// Rebuild an entity from its stored payload
    ///
    /// # Errors
    ///
    /// `UnregisteredEntity` for unknown names, `Other` when the entity's own decode fails.
    pub fn reconstruct(&self, type_name: &str, payload: &str) -> Result<Arc<dyn DynCacheable>> {
        // Copy the fn pointer out so the shard lock is not held during decode
        let decode = *self
            .decoders
            .get(type_name)
            .ok_or_else(|| CacheError::UnregisteredEntity {
                type_name: type_name.to_string(),
            })?;
        Ok(decode(payload)?)
    }
}

impl fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.decoders.iter().map(|e| *e.key()).collect();
        names.sort_unstable();
        f.debug_struct("EntityRegistry").field("types", &names).finish()
    }
}
