//! Per-session carts held in memory.
//!
//! ```text
//!   x-session-id ──► CartStore ──► Arc<Mutex<Cart>>
//!                       │
//!                       ├── idle longer than `idle` ──► dropped on next insert
//!                       ├── at `capacity`           ──► least recently used evicted
//!                       └── checkout succeeded      ──► removed
//! ```
//!
//! Each cart has its own lock so a slow coupon lookup in one session never
//! blocks another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use checkout_core::cart::Cart;
use checkout_engine::config::ServerSettings;

struct Entry {
    cart: Arc<Mutex<Cart>>,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct CartStore {
    carts: Arc<Mutex<HashMap<String, Entry>>>,
    idle: Duration,
    capacity: usize,
}

impl CartStore {
    pub fn new(idle: Duration, capacity: usize) -> Self {
        CartStore {
            carts: Arc::new(Mutex::new(HashMap::new())),
            idle,
            capacity: capacity.max(1),
        }
    }

    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self::new(Duration::from_secs(settings.cart_idle_secs), settings.max_carts)
    }

    /// The session's cart, created with `new_cart` on first use.
    pub async fn session(&self, session_id: &str, new_cart: impl FnOnce() -> Cart) -> Arc<Mutex<Cart>> {
        let now = Instant::now();
        let mut carts = self.carts.lock().await;

        if let Some(entry) = carts.get_mut(session_id) {
            entry.last_seen = now;
            return entry.cart.clone();
        }

        let before = carts.len();
        carts.retain(|_, entry| now.duration_since(entry.last_seen) < self.idle);
        if carts.len() < before {
            debug!(expired = before - carts.len(), "Dropped idle carts");
        }

        if carts.len() >= self.capacity {
            let oldest = carts
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                carts.remove(&id);
                debug!(session_id = %id, "Evicted least recently used cart");
            }
        }

        let cart = Arc::new(Mutex::new(new_cart()));
        carts.insert(
            session_id.to_string(),
            Entry {
                cart: cart.clone(),
                last_seen: now,
            },
        );
        cart
    }

    /// Forgets a session's cart.
    pub async fn remove(&self, session_id: &str) {
        self.carts.lock().await.remove(session_id);
    }

    pub async fn len(&self) -> usize {
        self.carts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for CartStore {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::Money;

    async fn add_marker(store: &CartStore, session: &str) {
        let cart = store.session(session, Cart::new).await;
        cart.lock()
            .await
            .add_line_snapshot("p", "P", Money::from_cents(100), 1, false)
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_carts_expire() {
        let store = CartStore::new(Duration::from_secs(60), 100);
        add_marker(&store, "a").await;

        tokio::time::advance(Duration::from_secs(30)).await;
        add_marker(&store, "b").await;
        assert_eq!(store.len().await, 2);

        // touching "b" keeps it alive; "a" has been idle for 61s
        tokio::time::advance(Duration::from_secs(31)).await;
        store.session("b", Cart::new).await;
        store.session("c", Cart::new).await;

        assert_eq!(store.len().await, 2);
        let b = store.session("b", Cart::new).await;
        assert!(!b.lock().await.is_empty());
        let a = store.session("a", Cart::new).await;
        assert!(a.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_least_recently_used() {
        let store = CartStore::new(Duration::from_secs(3600), 2);
        add_marker(&store, "a").await;
        tokio::time::advance(Duration::from_secs(1)).await;
        add_marker(&store, "b").await;
        tokio::time::advance(Duration::from_secs(1)).await;
        store.session("a", Cart::new).await;
        tokio::time::advance(Duration::from_secs(1)).await;

        store.session("c", Cart::new).await;
        assert_eq!(store.len().await, 2);

        let a = store.session("a", Cart::new).await;
        assert!(!a.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = CartStore::default();
        add_marker(&store, "a").await;
        store.remove("a").await;
        assert!(store.is_empty().await);
    }
}
