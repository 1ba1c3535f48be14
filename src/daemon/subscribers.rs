// src/daemon/subscribers.rs

//! Notification recipients
//!
//! Mutated by subscribe/unsubscribe workers and read by the broadcaster;
//! lives only as long as the daemon process.

use std::net::SocketAddr;
use std::sync::RwLock;
use tracing::info;

/// Ordered set of subscribed endpoints
#[derive(Debug, Default)]
pub struct Subscribers {
    addrs: RwLock<Vec<SocketAddr>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an endpoint; returns false if it was already subscribed
    pub fn subscribe(&self, addr: SocketAddr) -> bool {
        let mut addrs = self.addrs.write().unwrap_or_else(|p| p.into_inner());
        if addrs.contains(&addr) {
            return false;
        }
        addrs.push(addr);
        info!(subscriber = %addr, "Subscribed");
        true
    }

    /// Remove an endpoint; returns false if it was not subscribed
    pub fn unsubscribe(&self, addr: SocketAddr) -> bool {
        let mut addrs = self.addrs.write().unwrap_or_else(|p| p.into_inner());
        let before = addrs.len();
        addrs.retain(|a| *a != addr);
        let removed = addrs.len() != before;
        if removed {
            info!(subscriber = %addr, "Unsubscribed");
        }
        removed
    }

    /// Current recipients
    pub fn snapshot(&self) -> Vec<SocketAddr> {
        self.addrs.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.addrs.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
