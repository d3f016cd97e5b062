//! Pending-mutation tracker.
//!
//! Tracks which orders currently have a staff-initiated transition in flight.
//! While an id is tracked, poll snapshots must not overwrite the cached
//! (optimistic) status for it.
//!
//! # Invariants
//!
//! - **Single flight**: at most one entry per order id. A second
//!   [`begin`][PendingMutations::begin] for a tracked id returns [`Busy`].
//! - **Ticketed release**: every entry carries the [`MutationTicket`] issued
//!   by `begin`. [`end_ticket`][PendingMutations::end_ticket] removes the entry
//!   only if the ticket still matches, so a late resolution of an old
//!   mutation never releases a newer one.
//!
//! Not `Sync`; owned by the single-writer engine actor.

use std::collections::BTreeMap;

/// Token identifying one tracked mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationTicket(u64);

impl MutationTicket {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Returned by [`PendingMutations::begin`] when the order already has a
/// mutation in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Busy {
    pub order_id: String,
}

impl std::fmt::Display for Busy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "order {} already has an action in progress", self.order_id)
    }
}

impl std::error::Error for Busy {}

#[derive(Clone, Debug, Default)]
pub struct PendingMutations {
    entries: BTreeMap<String, MutationTicket>,
    next: u64,
}

impl PendingMutations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a mutation for `order_id`.
    pub fn begin(&mut self, order_id: &str) -> Result<MutationTicket, Busy> {
        if self.entries.contains_key(order_id) {
            return Err(Busy {
                order_id: order_id.to_string(),
            });
        }
        self.next += 1;
        let ticket = MutationTicket(self.next);
        self.entries.insert(order_id.to_string(), ticket);
        Ok(ticket)
    }

    /// Stop tracking `order_id` unconditionally. Returns `true` if it was
    /// tracked.
    pub fn end(&mut self, order_id: &str) -> bool {
        self.entries.remove(order_id).is_some()
    }

    /// Stop tracking `order_id` only if its current entry is `ticket`.
    pub fn end_ticket(&mut self, order_id: &str, ticket: MutationTicket) -> bool {
        match self.entries.get(order_id) {
            Some(t) if *t == ticket => {
                self.entries.remove(order_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, order_id: &str) -> bool {
        self.entries.contains_key(order_id)
    }

    pub fn ticket(&self, order_id: &str) -> Option<MutationTicket> {
        self.entries.get(order_id).copied()
    }

    /// Tracked ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_is_busy() {
        let mut p = PendingMutations::new();
        p.begin("A").unwrap();
        assert_eq!(
            p.begin("A"),
            Err(Busy {
                order_id: "A".into()
            })
        );
        assert!(p.begin("B").is_ok());
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn end_releases_and_allows_new_begin() {
        let mut p = PendingMutations::new();
        p.begin("A").unwrap();
        assert!(p.end("A"));
        assert!(!p.is_pending("A"));
        assert!(!p.end("A"));
        assert!(p.begin("A").is_ok());
    }

    #[test]
    fn stale_ticket_does_not_release_newer_mutation() {
        let mut p = PendingMutations::new();
        let old = p.begin("A").unwrap();
        p.end("A");
        let new = p.begin("A").unwrap();
        assert_ne!(old, new);

        assert!(!p.end_ticket("A", old));
        assert!(p.is_pending("A"));
        assert!(p.end_ticket("A", new));
        assert!(p.is_empty());
    }

    #[test]
    fn ids_are_sorted() {
        let mut p = PendingMutations::new();
        p.begin("C").unwrap();
        p.begin("A").unwrap();
        assert_eq!(p.ids().collect::<Vec<_>>(), vec!["A", "C"]);
    }
}
