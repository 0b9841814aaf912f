// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Admin Event Registry
//!
//! Live audit feed for connected admin consoles. Each console connection is
//! registered under its own connection id and removed again when its stream
//! is dropped (client disconnect, server shutdown or send error).
//!
//! Only console-tenant identities with the admin role can register.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::auth::{AuthError, AuthenticatedUser, Tenant};
use crate::storage::AuditEvent;

/// Events buffered per connection before new ones are dropped.
const DEFAULT_CONNECTION_BUFFER: usize = 64;

struct Connection {
    identity_id: String,
    sender: mpsc::Sender<AuditEvent>,
}

/// Registry of live console connections keyed by connection id.
pub struct EventRegistry {
    connections: Mutex<HashMap<Uuid, Connection>>,
    buffer: usize,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECTION_BUFFER)
    }
}

impl EventRegistry {
    /// Create a registry buffering `buffer` events per connection.
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a console connection for `user`.
    pub fn register(self: &Arc<Self>, user: &AuthenticatedUser) -> Result<Subscription, AuthError> {
        if user.tenant != Tenant::Admin || !user.is_admin() {
            return Err(AuthError::AdminRequired);
        }

        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.buffer);
        let mut connections = self
            .connections
            .lock()
            .map_err(|_| AuthError::Internal("event registry lock poisoned".to_string()))?;
        connections.insert(
            id,
            Connection {
                identity_id: user.user_id.clone(),
                sender,
            },
        );
        tracing::info!(
            connection_id = %id,
            user_id = %user.user_id,
            connections = connections.len(),
            "Console event stream connected"
        );

        Ok(Subscription {
            id,
            receiver,
            registry: Arc::clone(self),
        })
    }

    /// Remove a connection. Returns whether it was registered.
    pub fn deregister(&self, id: Uuid) -> bool {
        let Ok(mut connections) = self.connections.lock() else {
            return false;
        };
        match connections.remove(&id) {
            Some(connection) => {
                tracing::info!(
                    connection_id = %id,
                    user_id = %connection.identity_id,
                    "Console event stream disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Push an event to every connection. Returns the number of deliveries.
    ///
    /// Closed connections are removed; full ones miss this event.
    pub fn publish(&self, event: &AuditEvent) -> usize {
        let Ok(mut connections) = self.connections.lock() else {
            return 0;
        };
        let mut delivered = 0;
        connections.retain(|id, connection| match connection.sender.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %id, "Console event stream lagging, event dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        delivered
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().map(|c| c.len()).unwrap_or(0)
    }
}

/// A registered console connection. Deregisters itself on drop.
pub struct Subscription {
    id: Uuid,
    receiver: mpsc::Receiver<AuditEvent>,
    registry: Arc<EventRegistry>,
}

impl Subscription {
    /// Connection id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<AuditEvent> {
        self.receiver.recv().await
    }

    /// Turn the subscription into a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = AuditEvent> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|event| (event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use futures::StreamExt;

    fn user(tenant: Tenant, role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: "admin-1".to_string(),
            email: "admin@example.com".to_string(),
            name: "Admin".to_string(),
            role,
            tenant,
            verified: true,
            issued_at: 0,
            expires_at: 0,
        }
    }

    #[test]
    fn only_console_admins_register() {
        let registry = Arc::new(EventRegistry::default());
        assert!(matches!(
            registry.register(&user(Tenant::User, Role::Admin)),
            Err(AuthError::AdminRequired)
        ));
        assert!(matches!(
            registry.register(&user(Tenant::Admin, Role::User)),
            Err(AuthError::AdminRequired)
        ));
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let registry = Arc::new(EventRegistry::default());
        let mut sub = registry.register(&user(Tenant::Admin, Role::Admin)).unwrap();

        let delivered = registry.publish(&AuditEvent::new("USER_LOGIN"));
        assert_eq!(delivered, 1);
        assert_eq!(sub.recv().await.unwrap().event, "USER_LOGIN");
    }

    #[tokio::test]
    async fn dropping_stream_deregisters() {
        let registry = Arc::new(EventRegistry::default());
        let sub = registry.register(&user(Tenant::Admin, Role::Admin)).unwrap();
        let id = sub.id();
        assert_eq!(registry.connection_count(), 1);

        let mut stream = Box::pin(sub.into_stream());
        registry.publish(&AuditEvent::new("ADMIN_LOGIN"));
        assert_eq!(stream.next().await.unwrap().event, "ADMIN_LOGIN");

        drop(stream);
        assert_eq!(registry.connection_count(), 0);
        assert!(!registry.deregister(id));
    }

    #[test]
    fn full_buffer_drops_event() {
        let registry = Arc::new(EventRegistry::new(1));
        let _sub = registry.register(&user(Tenant::Admin, Role::Admin)).unwrap();
        assert_eq!(registry.publish(&AuditEvent::new("A")), 1);
        assert_eq!(registry.publish(&AuditEvent::new("B")), 0);
        assert_eq!(registry.connection_count(), 1);
    }
}
