//! In-memory fleet state and the pickup-request ledger.

use serde_json::{Map, Value};

use crate::models::{BusLocation, BusLocationUpdate, PickupRequest, Route, Schedule, TransportState};

/// Process-wide fleet state plus the pickup-request ledger.
///
/// All operations are synchronous; callers serialize access (the server keeps
/// one instance behind a mutex and mutates it from a single task).
#[derive(Debug)]
pub struct StateRegistry {
    transport: TransportState,
    pickups: Vec<PickupRequest>,
    next_pickup_id: u64,
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new(TransportState::default())
    }
}

impl StateRegistry {
    pub fn new(transport: TransportState) -> Self {
        Self {
            transport,
            pickups: Vec::new(),
            next_pickup_id: 1,
        }
    }

    /// Restore previously persisted pickup requests.
    ///
    /// The counter never goes below `1 + max(id)`, whatever `next_id` says.
    pub fn with_pickups(transport: TransportState, pickups: Vec<PickupRequest>, next_id: u64) -> Self {
        let next_pickup_id = next_id.max(next_pickup_id(&pickups));
        Self {
            transport,
            pickups,
            next_pickup_id,
        }
    }

    pub fn replace_routes(&mut self, routes: Vec<Route>) {
        self.transport.routes = routes;
    }

    pub fn replace_schedules(&mut self, schedules: Vec<Schedule>) {
        self.transport.schedules = schedules;
    }

    pub fn replace_bus_locations(&mut self, locations: Vec<BusLocation>) {
        self.transport.bus_locations = locations;
    }

    /// Merge a position report into the matching bus, or append a new one.
    ///
    /// Only fields present in the report overwrite, copied as sent.
    /// `busNumber` and `routeName` must also be truthy. Reports without a bus
    /// id are ignored.
    pub fn upsert_bus_location(&mut self, update: &BusLocationUpdate) {
        let Some(bus_id) = update.target() else {
            tracing::debug!("bus location update without busId ignored");
            return;
        };

        let locations = &mut self.transport.bus_locations;
        let Some(index) = locations.iter().position(|loc| loc.bus_id() == Some(bus_id)) else {
            locations.push(update.to_location(bus_id));
            return;
        };
        let existing = &mut locations[index];

        for (key, value) in update.readings() {
            if let Some(value) = value {
                existing.set(key, value.clone());
            }
        }
        for (key, value) in update.labels() {
            if let Some(value) = value.filter(|v| is_truthy(v)) {
                existing.set(key, value.clone());
            }
        }
    }

    /// Overwrite seat count and status on the schedule whose `id` equals
    /// `id`. Returns whether a schedule matched.
    pub fn patch_schedule_seats(
        &mut self,
        id: &Value,
        available_seats: Option<&Value>,
        status: Option<&Value>,
    ) -> bool {
        let Some(schedule) = self
            .transport
            .schedules
            .iter_mut()
            .find(|s| s.id() == Some(id))
        else {
            return false;
        };
        if let Some(seats) = available_seats {
            schedule.set("availableSeats", seats.clone());
        }
        if let Some(status) = status {
            schedule.set("status", status.clone());
        }
        true
    }

    /// Store a new pickup request under the next id and return it.
    pub fn add_pickup_request(&mut self, fields: Map<String, Value>) -> PickupRequest {
        let request = PickupRequest::new(self.next_pickup_id, fields);
        self.next_pickup_id += 1;
        self.pickups.push(request.clone());
        request
    }

    /// Remove every request with this id. Returns whether anything was removed.
    pub fn delete_pickup_request(&mut self, id: u64) -> bool {
        let before = self.pickups.len();
        self.pickups.retain(|req| req.id != id);
        self.pickups.len() != before
    }

    pub fn snapshot(&self) -> TransportState {
        self.transport.clone()
    }

    pub fn pickup_requests(&self) -> Vec<PickupRequest> {
        self.pickups.clone()
    }

    pub fn pickup_count(&self) -> usize {
        self.pickups.len()
    }

    /// The id the next pickup request will receive.
    pub fn next_pickup_id(&self) -> u64 {
        self.next_pickup_id
    }
}

/// `1 + max(id)` over the given requests, or `1` when empty.
pub fn next_pickup_id(requests: &[PickupRequest]) -> u64 {
    requests.iter().map(|r| r.id).max().unwrap_or(0) + 1
}

/// `null`, `false`, `0` and `""` are blank labels.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
