//! Fleet data model shared by the registry, the store and the wire protocol.
//!
//! Routes, schedules and bus locations are held exactly as clients sent them.
//! Accessors read the well-known fields without constraining their types, so
//! a replace echoes its payload unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

/// A bus route with its ordered stops.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route(pub Value);

impl Route {
    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    /// Stop descriptors in travel order, each `"name@time"`.
    ///
    /// Accepts either a list of stops or the comma-joined string form.
    pub fn stops(&self) -> Vec<String> {
        match self.0.get("stops") {
            Some(Value::String(joined)) => split_stops(joined),
            Some(Value::Array(stops)) => stops
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Split `"A@08:00, B@08:15"` into `["A@08:00", "B@08:15"]`.
pub fn split_stops(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// A scheduled run of a bus along a route.
///
/// `routeId` is not checked against the route list and `availableSeats`
/// is not checked against `totalSeats`; clients are trusted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule(pub Value);

impl Schedule {
    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    pub fn available_seats(&self) -> Option<&Value> {
        self.0.get("availableSeats")
    }

    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }

    pub(crate) fn set(&mut self, key: &str, value: Value) {
        set_field(&mut self.0, key, value);
    }
}

/// Last reported position of a bus. Identity is `busId`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusLocation(pub Value);

impl BusLocation {
    pub fn bus_id(&self) -> Option<&Value> {
        self.0.get("busId").filter(|id| !id.is_null())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn location(&self) -> Option<&str> {
        self.0.get("location").and_then(Value::as_str)
    }

    pub fn bus_number(&self) -> Option<&str> {
        self.0.get("busNumber").and_then(Value::as_str)
    }

    pub fn route_name(&self) -> Option<&str> {
        self.0.get("routeName").and_then(Value::as_str)
    }

    pub(crate) fn set(&mut self, key: &str, value: Value) {
        set_field(&mut self.0, key, value);
    }
}

fn set_field(entity: &mut Value, key: &str, value: Value) {
    if let Some(map) = entity.as_object_mut() {
        let _ = map.insert(key.to_string(), value);
    }
}

/// Keep an explicit `null` as `Some(Null)`; only a missing key is `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// A single live position report, as sent on `updateBusLocation` and
/// echoed on `busLocationUpdated`.
///
/// Values are kept as sent: `"10"` seats stay a string.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusLocationUpdate {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub bus_id: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub available_seats: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub bus_number: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub route_name: Option<Value>,
}

impl BusLocationUpdate {
    /// The bus this report is for. A `null` id counts as missing.
    pub fn target(&self) -> Option<&Value> {
        self.bus_id.as_ref().filter(|id| !id.is_null())
    }

    /// Fields that overwrite unconditionally when supplied.
    pub fn readings(&self) -> [(&'static str, Option<&Value>); 3] {
        [
            ("location", self.location.as_ref()),
            ("availableSeats", self.available_seats.as_ref()),
            ("status", self.status.as_ref()),
        ]
    }

    /// Label fields. These only overwrite when truthy.
    pub fn labels(&self) -> [(&'static str, Option<&Value>); 2] {
        [
            ("busNumber", self.bus_number.as_ref()),
            ("routeName", self.route_name.as_ref()),
        ]
    }

    /// Build a fresh location entry from this report.
    pub fn to_location(&self, bus_id: &Value) -> BusLocation {
        let mut entry = Map::new();
        let _ = entry.insert("busId".into(), bus_id.clone());
        for (key, value) in self.labels().into_iter().chain(self.readings()) {
            if let Some(value) = value {
                let _ = entry.insert(key.into(), value.clone());
            }
        }
        BusLocation(Value::Object(entry))
    }
}

/// A rider's pickup request. The id is assigned by the server; everything
/// else is whatever the rider sent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PickupRequest {
    pub id: u64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PickupRequest {
    pub fn new(id: u64, mut fields: Map<String, Value>) -> Self {
        let _ = fields.remove("id");
        Self { id, fields }
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    pub fn location(&self) -> Option<&str> {
        self.str_field("location")
    }

    /// The stop the rider asked to be picked up at.
    pub fn stop(&self) -> Option<&str> {
        self.str_field("stop")
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Aggregate of everything viewers see besides pickup requests.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportState {
    pub routes: Vec<Route>,
    pub schedules: Vec<Schedule>,
    pub bus_locations: Vec<BusLocation>,
}

impl TransportState {
    /// The two-route demo fleet a fresh server starts with.
    pub fn seeded() -> Self {
        let schedule = |id: i64,
                        bus: &str,
                        route_name: &str,
                        times: (&str, &str),
                        driver: &str,
                        contact: &str,
                        available: i64| {
            Schedule(json!({
                "id": id,
                "bus": bus,
                "routeId": id,
                "routeName": route_name,
                "departure": times.0,
                "arrival": times.1,
                "driver": driver,
                "contact": contact,
                "totalSeats": 30,
                "availableSeats": available,
                "status": "On Route",
            }))
        };
        let location = |bus_id: i64, bus: &str, route_name: &str, at: &str, available: i64| {
            BusLocation(json!({
                "busId": bus_id,
                "busNumber": bus,
                "routeId": bus_id,
                "routeName": route_name,
                "location": at,
                "availableSeats": available,
                "status": "On Route",
            }))
        };

        Self {
            routes: vec![
                Route(json!({
                    "id": 1,
                    "name": "Route A",
                    "bus": "Bus 1",
                    "stops": "Shewrapara@08:00, Mirpur-10@08:15, Mirpur-11@08:30, Mirpur-12@08:45",
                })),
                Route(json!({
                    "id": 2,
                    "name": "Route B",
                    "bus": "Bus 2",
                    "stops": "Kalshi@09:00, ECB Chottor@09:15, Kuril@09:30, Kanchon@09:45",
                })),
            ],
            schedules: vec![
                schedule(1, "Bus 1", "Route A", ("08:00", "09:00"), "Driver A", "01712345678", 25),
                schedule(2, "Bus 2", "Route B", ("09:00", "10:00"), "Driver B", "01812345678", 20),
            ],
            bus_locations: vec![
                location(1, "Bus 1", "Route A", "Mirpur-10", 25),
                location(2, "Bus 2", "Route B", "ECB Chottor", 20),
            ],
        }
    }
}
