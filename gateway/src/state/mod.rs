//! Shared application state
//!
//! One [`AppState`] is shared by every request. Call sessions own their own
//! relay state; the only thing tracked here is how many calls are open, globally
//! and per client IP.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use thiserror::Error;

use crate::config::ServerConfig;

/// Why a new call connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionLimitError {
    #[error("global call connection limit reached")]
    GlobalLimitReached,
    #[error("per-IP call connection limit reached")]
    PerIpLimitReached,
}

pub struct AppState {
    pub config: ServerConfig,
    active_calls: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            active_calls: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    /// Reserve a slot for a new call from `ip`.
    ///
    /// The global limit is checked first so an overloaded server answers 503
    /// regardless of who is asking.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        match self.config.max_call_connections {
            Some(max) => {
                self.active_calls
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        (n < max).then_some(n + 1)
                    })
                    .map_err(|_| ConnectionLimitError::GlobalLimitReached)?;
            }
            None => {
                self.active_calls.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut count = self.ip_connections.entry(ip).or_insert(0);
        if *count >= self.config.max_connections_per_ip {
            drop(count);
            self.ip_connections.remove_if(&ip, |_, n| *n == 0);
            self.active_calls.fetch_sub(1, Ordering::SeqCst);
            return Err(ConnectionLimitError::PerIpLimitReached);
        }
        *count += 1;
        Ok(())
    }

    /// Give back a slot taken by [`try_acquire_connection`](Self::try_acquire_connection).
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .active_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

        if let Some(mut count) = self.ip_connections.get_mut(&ip) {
            *count = count.saturating_sub(1);
        }
        self.ip_connections.remove_if(&ip, |_, n| *n == 0);
    }

    pub fn call_connection_count(&self) -> usize {
        self.active_calls.load(Ordering::SeqCst)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|n| *n).unwrap_or(0)
    }
}
