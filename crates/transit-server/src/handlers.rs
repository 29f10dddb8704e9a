//! Channel handlers: apply client commands to the registry and fan out results.

use std::sync::Arc;

use parking_lot::Mutex;
use transit_core::{ClientEvent, PickupRequest, ServerEvent, StateRegistry, TransportState};
use transit_store::PickupStore;

use crate::client::{ClientId, ClientRegistry};

/// Work item for the message processor.
#[derive(Debug)]
pub enum Incoming {
    /// A session just connected and needs the full state.
    Connected(ClientId),
    /// A raw text frame from a session.
    Message(ClientId, String),
}

/// Shared state available to all handlers.
pub struct HandlerState {
    pub registry: Mutex<StateRegistry>,
    pub store: Arc<PickupStore>,
    pub clients: Arc<ClientRegistry>,
}

impl HandlerState {
    pub fn new(registry: StateRegistry, store: Arc<PickupStore>, clients: Arc<ClientRegistry>) -> Self {
        Self {
            registry: Mutex::new(registry),
            store,
            clients,
        }
    }

    pub fn snapshot(&self) -> TransportState {
        self.registry.lock().snapshot()
    }

    pub fn pickup_requests(&self) -> Vec<PickupRequest> {
        self.registry.lock().pickup_requests()
    }
}

/// Process one work item.
pub async fn handle(state: &HandlerState, incoming: Incoming) {
    match incoming {
        Incoming::Connected(client_id) => on_connect(state, &client_id),
        Incoming::Message(client_id, raw) => match ClientEvent::decode(&raw) {
            Ok(event) => dispatch(state, &client_id, event).await,
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "Dropping client message");
            }
        },
    }
}

/// Push full state to a newly connected session only.
pub fn on_connect(state: &HandlerState, client_id: &ClientId) {
    let (transport, pickups) = {
        let registry = state.registry.lock();
        (registry.snapshot(), registry.pickup_requests())
    };
    tracing::info!(client_id = %client_id, "New client connected");
    reply(state, client_id, &ServerEvent::InitialData(transport));
    reply(state, client_id, &ServerEvent::PickupRequestsUpdated(pickups));
    state.clients.subscribe(client_id);
}

/// Apply a decoded client command.
pub async fn dispatch(state: &HandlerState, client_id: &ClientId, event: ClientEvent) {
    let channel = event.channel();
    tracing::debug!(client_id = %client_id, event = %channel, "Handling client event");

    match event {
        ClientEvent::UpdateRoutes(routes) => {
            state.registry.lock().replace_routes(routes.clone());
            broadcast(state, &ServerEvent::RoutesUpdated(routes));
        }
        ClientEvent::UpdateSchedules(schedules) => {
            state.registry.lock().replace_schedules(schedules.clone());
            broadcast(state, &ServerEvent::SchedulesUpdated(schedules));
        }
        ClientEvent::UpdateBusLocation(update) => {
            {
                let mut registry = state.registry.lock();
                if let Some(bus_id) = update.target() {
                    let _ = registry.patch_schedule_seats(
                        bus_id,
                        update.available_seats.as_ref(),
                        update.status.as_ref(),
                    );
                }
                registry.upsert_bus_location(&update);
            }
            broadcast(state, &ServerEvent::BusLocationUpdated(update));
        }
        ClientEvent::UpdateBusLocations(locations) => {
            state.registry.lock().replace_bus_locations(locations.clone());
            broadcast(state, &ServerEvent::BusLocationsUpdated(locations));
        }
        ClientEvent::PickupRequest(fields) => {
            let requests = {
                let mut registry = state.registry.lock();
                let added = registry.add_pickup_request(fields);
                tracing::info!(client_id = %client_id, id = added.id, "Pickup request added");
                registry.pickup_requests()
            };
            broadcast(state, &ServerEvent::PickupRequestsUpdated(requests.clone()));
            persist(state, requests).await;
        }
        ClientEvent::DeletePickupRequest(id) => {
            let requests = {
                let mut registry = state.registry.lock();
                let removed = registry.delete_pickup_request(id);
                tracing::info!(client_id = %client_id, id, removed, "Pickup request delete");
                registry.pickup_requests()
            };
            broadcast(state, &ServerEvent::PickupRequestsUpdated(requests.clone()));
            persist(state, requests).await;
        }
        ClientEvent::GetPickupRequests => {
            let requests = state.pickup_requests();
            reply(state, client_id, &ServerEvent::PickupRequestsUpdated(requests));
        }
    }
}

fn broadcast(state: &HandlerState, event: &ServerEvent) {
    let Some(json) = encode(event) else { return };
    let recipients = state.clients.broadcast_all(&json);
    tracing::debug!(event = event.name(), recipients, "Broadcast event to all");
}

fn reply(state: &HandlerState, client_id: &ClientId, event: &ServerEvent) {
    let Some(json) = encode(event) else { return };
    if !state.clients.send_to(client_id, json) {
        tracing::warn!(client_id = %client_id, event = event.name(), "Failed to send event to client");
    }
}

fn encode(event: &ServerEvent) -> Option<String> {
    match event.encode() {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(event = event.name(), error = %e, "Failed to serialize event");
            None
        }
    }
}

/// Write the pickup collection off the async runtime. Failures are logged only.
async fn persist(state: &HandlerState, requests: Vec<PickupRequest>) {
    let store = Arc::clone(&state.store);
    match tokio::task::spawn_blocking(move || store.save(&requests)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(path = %state.store.path().display(), error = %e, "Error saving pickup requests");
        }
        Err(e) => tracing::error!(error = %e, "Pickup save task failed"),
    }
}
