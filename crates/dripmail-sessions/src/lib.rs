// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory session store: the single source of truth for "does this user
//! have an active address".
//!
//! Maps chat-user identity to mailbox session state and maintains a reverse
//! index from mailbox address back to owner, so the inbound-mail path can
//! resolve the destination user in O(1) instead of scanning.
//!
//! Both maps are dashmaps: reads and writes for unrelated users land on
//! different shards, so there is no global point of serialization. Writes
//! that touch both maps hold the forward-map entry guard while updating the
//! reverse index, so the two are never observed inconsistent.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use dripmail_core::types::{MailboxSession, UserId};

/// Concurrent store binding chat users to their mailbox sessions.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<UserId, MailboxSession>,
    by_address: DashMap<String, UserId>,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the user's session, if any.
    pub fn get(&self, user: &UserId) -> Option<MailboxSession> {
        self.sessions.get(user).map(|s| s.clone())
    }

    /// Inserts or overwrites the user's session.
    ///
    /// Overwriting orphans the previous mailbox: its reverse-index entry is
    /// removed in the same critical section, so `find_by_address` never
    /// resolves an address the user no longer holds.
    pub fn put(&self, session: MailboxSession) {
        let user = session.user_id.clone();
        let address = session.address.clone();

        match self.sessions.entry(user.clone()) {
            Entry::Occupied(mut occupied) => {
                let old_address = occupied.get().address.clone();
                if old_address != address {
                    debug!(user = %user, old_address, "overwriting session, orphaning old address");
                    self.by_address
                        .remove_if(&old_address, |_, owner| *owner == user);
                }
                self.by_address.insert(address, user);
                occupied.insert(session);
            }
            Entry::Vacant(vacant) => {
                self.by_address.insert(address, user);
                vacant.insert(session);
            }
        }
    }

    /// Removes and returns the user's session, cleaning up the reverse index.
    pub fn remove(&self, user: &UserId) -> Option<MailboxSession> {
        match self.sessions.entry(user.clone()) {
            Entry::Occupied(occupied) => {
                // Reverse entry goes first, under the forward-map entry guard,
                // so no reader sees an address resolving to a gone session.
                self.by_address
                    .remove_if(&occupied.get().address, |_, owner| owner == user);
                Some(occupied.remove())
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Resolves the owner of a mailbox address.
    pub fn find_by_address(&self, address: &str) -> Option<UserId> {
        self.by_address.get(address).map(|u| u.clone())
    }

    /// Applies an in-place mutation to the user's session.
    ///
    /// The closure runs under the entry lock, so the mutation is all-or-nothing
    /// from any other worker's point of view. Returns `false` when the user
    /// has no session. The closure must not change `address`; address changes
    /// go through `put` so the reverse index stays coherent.
    pub fn update<F>(&self, user: &UserId, mutate: F) -> bool
    where
        F: FnOnce(&mut MailboxSession),
    {
        match self.sessions.get_mut(user) {
            Some(mut session) => {
                mutate(&mut session);
                true
            }
            None => false,
        }
    }

    /// Records one confirmed inbound delivery for an address.
    ///
    /// Returns the owner and the updated counter, or `None` when no session
    /// maps to the address (an orphaned mailbox — the message is simply not
    /// delivered).
    pub fn record_delivery(&self, address: &str) -> Option<(UserId, u64)> {
        let owner = self.find_by_address(address)?;
        let mut session = self.sessions.get_mut(&owner)?;
        // The session may have been replaced between the two lookups; only
        // count deliveries against the address the session still holds.
        if session.address != address {
            return None;
        }
        session.emails_received += 1;
        Some((owner.clone(), session.emails_received))
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no sessions exist.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use dripmail_core::types::SessionToken;
    use std::sync::Arc;

    fn session(user: &str, address: &str) -> MailboxSession {
        let now = Utc::now();
        MailboxSession {
            user_id: UserId(user.into()),
            address: address.into(),
            token: SessionToken(format!("tok-{address}")),
            created_at: now,
            expires_at: now + TimeDelta::hours(24),
            emails_received: 0,
            forwarding_target: None,
        }
    }

    #[test]
    fn put_then_get_and_find_agree() {
        let store = SessionStore::new();
        store.put(session("u1", "a@drip.example"));

        let got = store.get(&UserId("u1".into())).expect("session exists");
        assert_eq!(got.address, "a@drip.example");
        assert_eq!(
            store.find_by_address("a@drip.example"),
            Some(UserId("u1".into()))
        );
    }

    #[test]
    fn remove_clears_both_maps() {
        let store = SessionStore::new();
        store.put(session("u1", "a@drip.example"));

        let removed = store.remove(&UserId("u1".into()));
        assert!(removed.is_some());
        assert!(store.get(&UserId("u1".into())).is_none());
        assert!(store.find_by_address("a@drip.example").is_none());
    }

    #[test]
    fn overwrite_orphans_old_address() {
        let store = SessionStore::new();
        store.put(session("u1", "old@drip.example"));
        store.put(session("u1", "new@drip.example"));

        assert!(store.find_by_address("old@drip.example").is_none());
        assert_eq!(
            store.find_by_address("new@drip.example"),
            Some(UserId("u1".into()))
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn record_delivery_increments_monotonically() {
        let store = SessionStore::new();
        store.put(session("u1", "a@drip.example"));

        let (owner, count) = store.record_delivery("a@drip.example").unwrap();
        assert_eq!(owner, UserId("u1".into()));
        assert_eq!(count, 1);
        let (_, count) = store.record_delivery("a@drip.example").unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn record_delivery_for_unknown_address_is_none() {
        let store = SessionStore::new();
        assert!(store.record_delivery("ghost@drip.example").is_none());
    }

    #[test]
    fn update_mutates_in_place() {
        let store = SessionStore::new();
        store.put(session("u1", "a@drip.example"));

        let ok = store.update(&UserId("u1".into()), |s| {
            s.forwarding_target = Some("me@example.com".into());
        });
        assert!(ok);
        assert_eq!(
            store.get(&UserId("u1".into())).unwrap().forwarding_target,
            Some("me@example.com".into())
        );
    }

    #[test]
    fn update_missing_user_returns_false() {
        let store = SessionStore::new();
        assert!(!store.update(&UserId("ghost".into()), |_| {}));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_for_distinct_users_do_not_interfere() {
        let store = Arc::new(SessionStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put(session(&format!("u{i}"), &format!("a{i}@drip.example")));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.len(), 32);
        for i in 0..32 {
            assert_eq!(
                store.find_by_address(&format!("a{i}@drip.example")),
                Some(UserId(format!("u{i}")))
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn duplicate_commands_race_last_write_wins() {
        // Two concurrent "new address" writes for the same user: either may
        // win, but the store must end in a coherent state — exactly one
        // session whose address resolves back to the user.
        let store = Arc::new(SessionStore::new());
        let s1 = store.clone();
        let s2 = store.clone();
        let h1 = tokio::spawn(async move { s1.put(session("u1", "first@drip.example")) });
        let h2 = tokio::spawn(async move { s2.put(session("u1", "second@drip.example")) });
        h1.await.unwrap();
        h2.await.unwrap();

        assert_eq!(store.len(), 1);
        let winner = store.get(&UserId("u1".into())).unwrap().address;
        assert_eq!(
            store.find_by_address(&winner),
            Some(UserId("u1".into())),
            "winning address must resolve to the user"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn remove_races_put_without_stranding_the_index() {
        // A delete racing a new-address write for the same user serializes on
        // the forward-map entry guard: whichever order they land in, the
        // reverse index must agree with the surviving session (or be empty).
        let store = Arc::new(SessionStore::new());
        store.put(session("u1", "first@drip.example"));
        let s1 = store.clone();
        let s2 = store.clone();
        let h1 = tokio::spawn(async move { s1.remove(&UserId("u1".into())) });
        let h2 = tokio::spawn(async move { s2.put(session("u1", "second@drip.example")) });
        h1.await.unwrap();
        h2.await.unwrap();

        match store.get(&UserId("u1".into())) {
            Some(survivor) => {
                assert_eq!(
                    store.find_by_address(&survivor.address),
                    Some(UserId("u1".into()))
                );
                assert!(store.find_by_address("first@drip.example").is_none());
            }
            None => {
                assert!(store.find_by_address("first@drip.example").is_none());
                assert!(store.find_by_address("second@drip.example").is_none());
            }
        }
    }
}
