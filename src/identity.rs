//! Identity-scoped cart keys
//!
//! Every identity gets its own cart key. When the session identity changes
//! (typically a guest logging in) the cart is carried over once, so the
//! guest's lines are not lost.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    cart::CartLine,
    storage::{Persistence, PersistenceError, StorageBackend, StorageKey},
};

/// Key namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "larder_cart";

const GUEST_SEGMENT: &str = "guest";

/// Customer identifier issued by the order store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(u64);

impl CustomerId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for CustomerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        self.0.fmt(f)
    }
}

/// Who the current session belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Identity {
    /// Nobody has logged in yet.
    #[default]
    Guest,

    /// A customer identified by phone-number login.
    Customer {
        /// Customer id.
        id: CustomerId,

        /// Display name, sent along with orders.
        name: Option<String>,
    },
}

impl Identity {
    /// A customer identity without a display name.
    #[must_use]
    pub fn customer(id: u64) -> Self {
        Self::Customer {
            id: CustomerId::new(id),
            name: None,
        }
    }

    /// The customer id, if known.
    #[must_use]
    pub fn customer_id(&self) -> Option<CustomerId> {
        match self {
            Self::Guest => None,
            Self::Customer { id, .. } => Some(*id),
        }
    }

    /// The customer's display name, if known.
    #[must_use]
    pub fn customer_name(&self) -> Option<&str> {
        match self {
            Self::Guest => None,
            Self::Customer { name, .. } => name.as_deref(),
        }
    }
}

/// Result of moving a cart between keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Migration {
    /// The previous cart was copied to the new key.
    Copied {
        /// Lines written under the new key.
        lines: Vec<CartLine>,
    },

    /// Nothing was copied: the keys match, the new key already holds a
    /// cart, or the previous one is empty.
    Skipped,
}

/// Derives storage keys from identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyResolver {
    namespace: String,
}

impl KeyResolver {
    /// Resolve keys under `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// The key namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The storage key holding `identity`'s cart.
    pub fn key_for(&self, identity: &Identity) -> StorageKey {
        match identity.customer_id() {
            Some(id) => StorageKey::new(format!("{}:{id}", self.namespace)),
            None => StorageKey::new(format!("{}:{GUEST_SEGMENT}", self.namespace)),
        }
    }

    /// Copy the cart under `previous` to `next` if `next` is empty and
    /// `previous` is not.
    ///
    /// The cart under `previous` is left as it was.
    ///
    /// # Errors
    ///
    /// Returns a storage failure when the persistence policy surfaces them.
    pub fn migrate<B: StorageBackend>(
        &self,
        persistence: &Persistence<B>,
        previous: &StorageKey,
        next: &StorageKey,
    ) -> Result<Migration, PersistenceError> {
        if previous == next {
            return Ok(Migration::Skipped);
        }

        if !persistence.read(next)?.is_empty() {
            debug!(%previous, %next, "target cart already populated; not migrating");
            return Ok(Migration::Skipped);
        }

        let lines = persistence.read(previous)?;

        if lines.is_empty() {
            return Ok(Migration::Skipped);
        }

        persistence.write(next, &lines)?;

        info!(%previous, %next, lines = lines.len(), "cart migrated to new identity");

        Ok(Migration::Copied { lines })
    }
}

impl Default for KeyResolver {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use testresult::TestResult;

    use crate::{
        cart::NewCartLine,
        storage::{MemoryStorage, PersistencePolicy},
    };

    use super::*;

    fn persistence() -> Persistence<MemoryStorage> {
        Persistence::new(MemoryStorage::new(), PersistencePolicy::Surface)
    }

    fn rib() -> CartLine {
        NewCartLine::new("beef", "rib", 2).into_line("KG", Timestamp::now())
    }

    #[test]
    fn keys_are_scoped_by_identity() {
        let resolver = KeyResolver::new("shop");

        assert_eq!(resolver.key_for(&Identity::Guest).as_str(), "shop:guest");
        assert_eq!(resolver.key_for(&Identity::customer(7)).as_str(), "shop:7");
        assert_eq!(
            resolver.key_for(&Identity::Customer {
                id: CustomerId::new(7),
                name: Some("Kim".to_string()),
            }),
            resolver.key_for(&Identity::customer(7)),
        );
    }

    #[test]
    fn migrate_copies_into_empty_target_and_keeps_source() -> TestResult {
        let resolver = KeyResolver::default();
        let persistence = persistence();
        let guest = resolver.key_for(&Identity::Guest);
        let customer = resolver.key_for(&Identity::customer(1));
        let lines = vec![rib()];

        persistence.write(&guest, &lines)?;

        let migration = resolver.migrate(&persistence, &guest, &customer)?;

        assert_eq!(migration, Migration::Copied { lines: lines.clone() });
        assert_eq!(persistence.read(&customer)?, lines);
        assert_eq!(persistence.read(&guest)?, lines);

        Ok(())
    }

    #[test]
    fn migrate_never_overwrites_an_existing_cart() -> TestResult {
        let resolver = KeyResolver::default();
        let persistence = persistence();
        let guest = resolver.key_for(&Identity::Guest);
        let customer = resolver.key_for(&Identity::customer(1));
        let existing = vec![NewCartLine::new("pork", "belly", 1).into_line("KG", Timestamp::now())];

        persistence.write(&guest, &[rib()])?;
        persistence.write(&customer, &existing)?;

        assert_eq!(
            resolver.migrate(&persistence, &guest, &customer)?,
            Migration::Skipped
        );
        assert_eq!(persistence.read(&customer)?, existing);

        Ok(())
    }

    #[test]
    fn migrate_skips_empty_source() -> TestResult {
        let resolver = KeyResolver::default();
        let persistence = persistence();
        let guest = resolver.key_for(&Identity::Guest);
        let customer = resolver.key_for(&Identity::customer(1));

        assert_eq!(
            resolver.migrate(&persistence, &guest, &customer)?,
            Migration::Skipped
        );
        assert!(persistence.backend().is_empty()?);

        Ok(())
    }
}
