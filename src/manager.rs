//! Gateway Manager (C8): a keyed pool of `GatewayClient`s with single-flight coalesced creation.
//!
//! A plain `Arc<Mutex<HashMap<K, V>>>` keyed pool, generalized to a map of `Arc<GatewayClient>`
//! plus an in-flight-creation slot so two callers racing on the same key get the same connection
//! instead of opening two sockets.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::client::GatewayClient;
use crate::config::ResolvedConfig;
use crate::err::GatewayError;
use crate::event::EventReceiver;
use crate::interceptor::Interceptor;

type CreationResult = Result<Arc<GatewayClient>, String>;

enum Slot {
    Ready(Arc<GatewayClient>),
    /// A creation is in flight; latecomers await this instead of starting their own.
    InFlight(watch::Receiver<Option<CreationResult>>),
}

/// Keyed pool of connected [`GatewayClient`]s.
#[derive(Default)]
pub struct GatewayManager {
    clients: Mutex<HashMap<String, Slot>>,
}

impl GatewayManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the client for `key`, creating it via `connect_fn` if it doesn't exist yet.
    ///
    /// If a creation for `key` is already in flight, this call coalesces onto it instead of
    /// opening a second connection.
    ///
    /// # Errors
    /// Returns whatever `connect_fn` fails with, or a connection error if the in-flight creation
    /// this call coalesced onto failed.
    pub async fn get_client<F, Fut>(&self, key: &str, connect_fn: F) -> Result<Arc<GatewayClient>, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<GatewayClient, GatewayError>>,
    {
        let mut watch_rx = {
            let mut clients = self.clients.lock().await;
            match clients.get(key) {
                Some(Slot::Ready(client)) => return Ok(Arc::clone(client)),
                Some(Slot::InFlight(rx)) => rx.clone(),
                None => {
                    let (tx, rx) = watch::channel(None);
                    clients.insert(key.to_owned(), Slot::InFlight(rx));
                    drop(clients);
                    return self.create_and_install(key, connect_fn, tx).await;
                }
            }
        };

        loop {
            if let Some(result) = watch_rx.borrow().clone() {
                return result.map_err(GatewayError::connection);
            }
            if watch_rx.changed().await.is_err() {
                return Err(GatewayError::connection("coalesced connect was abandoned"));
            }
        }
    }

    async fn create_and_install<F, Fut>(
        &self,
        key: &str,
        connect_fn: F,
        tx: watch::Sender<Option<CreationResult>>,
    ) -> Result<Arc<GatewayClient>, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<GatewayClient, GatewayError>>,
    {
        let result = connect_fn().await;
        let mut clients = self.clients.lock().await;
        match result {
            Ok(client) => {
                let client = Arc::new(client);
                clients.insert(key.to_owned(), Slot::Ready(Arc::clone(&client)));
                let _ = tx.send(Some(Ok(client.clone())));
                Ok(client)
            }
            Err(error) => {
                clients.remove(key);
                let _ = tx.send(Some(Err(error.to_string())));
                Err(error)
            }
        }
    }

    /// Disconnects and removes the client for `key`, if present. Idempotent.
    pub async fn remove_client(&self, key: &str) {
        let removed = self.clients.lock().await.remove(key);
        if let Some(Slot::Ready(client)) = removed {
            client.disconnect().await;
        }
    }

    /// Disconnects and removes every client in the pool.
    pub async fn shutdown_all(&self) {
        let drained: Vec<Slot> = self.clients.lock().await.drain().map(|(_, slot)| slot).collect();
        for slot in drained {
            if let Slot::Ready(client) = slot {
                client.disconnect().await;
            }
        }
    }

    /// The keys of every client currently connected.
    pub async fn get_connected_instances(&self) -> Vec<String> {
        let clients = self.clients.lock().await;
        clients
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Ready(client) if client.is_connected() => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    #[must_use]
    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}

/// Convenience wrapper bundling a [`ResolvedConfig`] and an interceptor set so
/// [`GatewayManager::get_client`] can be driven with a plain key, matching how `GatewayClient::connect`
/// is invoked elsewhere.
pub async fn connect_with(
    config: ResolvedConfig,
    interceptors: Vec<Arc<dyn Interceptor>>,
) -> Result<(GatewayClient, EventReceiver), GatewayError> {
    GatewayClient::connect(&config, interceptors).await
}
