//! Cart Store
//!
//! The in-memory cart for one identity, kept in step with durable storage.
//! Every mutation is one [`CartAction`]; after each change the whole cart is
//! written back under the identity's key, except before the first hydration,
//! when a write would replace the stored cart with an empty one.

use jiff::Timestamp;
use tracing::{debug, error, info, warn};

use crate::{
    cart::{
        actions::{Applied, CartAction},
        errors::{CartError, ValidationError},
        lines::{CartLine, CartLinePatch, LineId, NewCartLine},
    },
    identity::{Identity, KeyResolver, Migration},
    orders::{NewOrder, OrderDetails, OrderReceipt, OrdersApi},
    settings::UnitSettings,
    storage::{ChangeSubscription, ExternalChange, Persistence, StorageBackend, StorageKey},
};

/// Options for [`CartStore::add_many`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddManyOptions {
    /// Fold the batch against itself as well as the cart.
    pub merge: bool,
}

impl Default for AddManyOptions {
    fn default() -> Self {
        Self { merge: true }
    }
}

/// The cart of the current identity.
#[derive(Debug)]
pub struct CartStore<B> {
    lines: Vec<CartLine>,
    persistence: Persistence<B>,
    resolver: KeyResolver,
    identity: Identity,
    key: StorageKey,
    hydrated: bool,
    units: UnitSettings,
}

impl<B: StorageBackend> CartStore<B> {
    /// Create an empty, not yet hydrated store for `identity`.
    ///
    /// Nothing is written until [`CartStore::load`] or
    /// [`CartStore::hydrate`] has run.
    pub fn new(
        persistence: Persistence<B>,
        resolver: KeyResolver,
        identity: Identity,
        units: UnitSettings,
    ) -> Self {
        let key = resolver.key_for(&identity);

        Self {
            lines: Vec::new(),
            persistence,
            resolver,
            identity,
            key,
            hydrated: false,
            units,
        }
    }

    /// Create a store and load the identity's stored cart.
    ///
    /// # Errors
    ///
    /// Returns a storage failure when the persistence policy surfaces them.
    pub fn open(
        persistence: Persistence<B>,
        resolver: KeyResolver,
        identity: Identity,
        units: UnitSettings,
    ) -> Result<Self, CartError> {
        let mut store = Self::new(persistence, resolver, identity, units);

        store.load()?;

        Ok(store)
    }

    /// Replace the cart with the one stored under the current key.
    ///
    /// # Errors
    ///
    /// Returns a storage failure when the persistence policy surfaces them;
    /// the store then stays unhydrated.
    pub fn load(&mut self) -> Result<(), CartError> {
        let lines = self.persistence.read(&self.key)?;

        self.hydrate(lines);

        Ok(())
    }

    /// Replace the cart with `lines` and open the write guard.
    ///
    /// Never writes by itself.
    pub fn hydrate(&mut self, lines: Vec<CartLine>) {
        let count = lines.len();

        CartAction::Hydrate(lines).apply(&mut self.lines);
        self.hydrated = true;

        debug!(key = %self.key, lines = count, "cart hydrated");
    }

    /// Add a line, merging it into an equivalent line if there is one.
    ///
    /// Returns the id of the line the quantity landed in.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Invalid`] without touching the cart when the line
    /// is incomplete, or a surfaced storage failure.
    pub fn add(&mut self, line: NewCartLine) -> Result<LineId, CartError> {
        line.validate()?;

        let line = line.into_line(self.units.default_unit(), Timestamp::now());
        let fallback = line.id;

        let applied = self.transition(CartAction::Add(line))?;

        Ok(applied.landed.first().copied().unwrap_or(fallback))
    }

    /// Add several lines at once.
    ///
    /// The whole batch is validated before anything changes. Returns, for
    /// each input line, the id of the line it landed in.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidLine`] for the first incomplete line
    /// without touching the cart, or a surfaced storage failure.
    pub fn add_many(
        &mut self,
        lines: Vec<NewCartLine>,
        options: AddManyOptions,
    ) -> Result<Vec<LineId>, CartError> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        for (index, line) in lines.iter().enumerate() {
            line.validate()
                .map_err(|source| CartError::InvalidLine { index, source })?;
        }

        let now = Timestamp::now();
        let default_unit = self.units.default_unit();
        let lines = lines
            .into_iter()
            .map(|line| line.into_line(default_unit, now))
            .collect();

        let applied = self.transition(CartAction::AddMany {
            lines,
            merge: options.merge,
        })?;

        Ok(applied.landed)
    }

    /// Put the lines of a previous order back into the cart.
    ///
    /// Lines merge with equivalent lines already in the cart and with each
    /// other. Detail rows that could not make a valid cart line (no
    /// category, no label, nothing ordered) are skipped.
    ///
    /// # Errors
    ///
    /// Returns a surfaced storage failure.
    pub fn reorder(&mut self, order: &OrderDetails) -> Result<Vec<LineId>, CartError> {
        let lines: Vec<NewCartLine> = order
            .details
            .iter()
            .map(NewCartLine::from)
            .enumerate()
            .filter_map(|(index, line)| match line.validate() {
                Ok(()) => Some(line),
                Err(reason) => {
                    warn!(order_id = %order.order_id, index, %reason, "skipping order line that cannot go back into the cart");
                    None
                }
            })
            .collect();

        info!(key = %self.key, order_id = %order.order_id, lines = lines.len(), "reordering into cart");

        self.add_many(lines, AddManyOptions { merge: true })
    }

    /// Patch the line with `id`. Returns whether a line was patched.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Invalid`] for a non-positive quantity, or a
    /// surfaced storage failure.
    pub fn update(&mut self, id: LineId, patch: CartLinePatch) -> Result<bool, CartError> {
        patch.validate()?;

        let applied = self.transition(CartAction::Update { id, patch })?;

        Ok(applied.changed)
    }

    /// Remove the line with `id`. Returns whether a line was removed.
    ///
    /// # Errors
    ///
    /// Returns a surfaced storage failure.
    pub fn remove(&mut self, id: LineId) -> Result<bool, CartError> {
        let applied = self.transition(CartAction::Remove(id))?;

        Ok(applied.changed)
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns a surfaced storage failure.
    pub fn clear(&mut self) -> Result<(), CartError> {
        self.transition(CartAction::Clear)?;

        Ok(())
    }

    /// Switch to another identity's cart.
    ///
    /// The current cart is copied to the new identity's key when that key
    /// holds nothing yet; the old key keeps its cart. The store then loads
    /// the new key, and writes stay suppressed until that load succeeds.
    ///
    /// # Errors
    ///
    /// Returns a surfaced storage failure.
    pub fn switch_identity(&mut self, identity: Identity) -> Result<Migration, CartError> {
        let next = self.resolver.key_for(&identity);

        if next == self.key {
            self.identity = identity;
            return Ok(Migration::Skipped);
        }

        let migration = self.resolver.migrate(&self.persistence, &self.key, &next)?;

        info!(previous = %self.key, next = %next, "switching cart identity");

        self.identity = identity;
        self.key = next;
        self.hydrated = false;

        self.load()?;

        Ok(migration)
    }

    /// Subscribe to carts written by other execution contexts.
    pub fn subscribe(&self) -> ChangeSubscription {
        self.persistence.subscribe()
    }

    /// Adopt a cart written by another execution context.
    ///
    /// Changes to other keys are ignored. Returns whether the cart was
    /// replaced.
    pub fn apply_external_change(&mut self, change: ExternalChange) -> bool {
        if change.key != self.key {
            return false;
        }

        debug!(key = %self.key, "adopting cart written elsewhere");

        self.hydrate(change.lines);

        true
    }

    /// Submit the cart as an order.
    ///
    /// The cart is cleared only once the API has accepted the order; on any
    /// failure it is left exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyCart`] without calling the API when
    /// there is nothing to submit, or [`CartError::Submission`] when the
    /// API fails.
    pub async fn submit<A>(
        &mut self,
        api: &A,
        requested_at: Timestamp,
    ) -> Result<OrderReceipt, CartError>
    where
        A: OrdersApi + ?Sized,
    {
        if self.lines.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }

        let order = NewOrder::from_cart(&self.identity, &self.lines, requested_at);

        let receipt = match api.submit_order(&order).await {
            Ok(receipt) => receipt,
            Err(failure) => {
                error!(key = %self.key, lines = self.lines.len(), error = %failure, "order submission failed; cart kept");
                return Err(failure.into());
            }
        };

        info!(key = %self.key, order_id = %receipt.order_id, lines = order.items.len(), "order accepted; clearing cart");

        CartAction::Clear.apply(&mut self.lines);

        // The order exists now; a failed write must not read as a failed submission.
        if let Err(failure) = self.persist() {
            error!(key = %self.key, error = %failure, "cleared cart could not be persisted");
        }

        Ok(receipt)
    }

    /// The lines, in insertion order.
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the cart is empty.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The line with `id`.
    pub fn get(&self, id: LineId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.id == id)
    }

    /// The current identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The key the cart is stored under.
    pub fn key(&self) -> &StorageKey {
        &self.key
    }

    /// Whether stored state has been loaded (and writes are enabled).
    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// The unit settings used to default line units.
    pub fn units(&self) -> &UnitSettings {
        &self.units
    }

    /// Replace the unit settings, e.g. once the provider has answered.
    pub fn set_units(&mut self, units: UnitSettings) {
        self.units = units;
    }

    /// The durable store adapter.
    pub fn persistence(&self) -> &Persistence<B> {
        &self.persistence
    }

    /// Apply `action` to a copy of the cart and keep it only once it is stored.
    fn transition(&mut self, action: CartAction) -> Result<Applied, CartError> {
        let name = action.name();
        let mut next = self.lines.clone();
        let applied = action.apply(&mut next);

        debug!(key = %self.key, action = name, changed = applied.changed, lines = next.len(), "cart transition");

        if applied.changed {
            self.persist_lines(&next)?;
            self.lines = next;
        }

        Ok(applied)
    }

    fn persist(&self) -> Result<(), CartError> {
        self.persist_lines(&self.lines)
    }

    fn persist_lines(&self, lines: &[CartLine]) -> Result<(), CartError> {
        if !self.hydrated {
            debug!(key = %self.key, "write suppressed until hydrated");
            return Ok(());
        }

        self.persistence.write(&self.key, lines)?;

        Ok(())
    }
}
