//! Wire protocol: the `{event, data}` envelope and the channel catalog.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{BusLocation, BusLocationUpdate, PickupRequest, Route, Schedule, TransportState};

/// Raw frame as it arrives from a client.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Inbound channel names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    UpdateRoutes,
    UpdateSchedules,
    UpdateBusLocation,
    UpdateBusLocations,
    PickupRequest,
    DeletePickupRequest,
    GetPickupRequests,
}

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::UpdateRoutes,
        Channel::UpdateSchedules,
        Channel::UpdateBusLocation,
        Channel::UpdateBusLocations,
        Channel::PickupRequest,
        Channel::DeletePickupRequest,
        Channel::GetPickupRequests,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpdateRoutes => "updateRoutes",
            Self::UpdateSchedules => "updateSchedules",
            Self::UpdateBusLocation => "updateBusLocation",
            Self::UpdateBusLocations => "updateBusLocations",
            Self::PickupRequest => "pickupRequest",
            Self::DeletePickupRequest => "deletePickupRequest",
            Self::GetPickupRequests => "getPickupRequests",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Frame(serde_json::Error),

    #[error("unknown event: {0}")]
    UnknownChannel(String),

    #[error("bad payload for {channel}: {source}")]
    Payload {
        channel: Channel,
        source: serde_json::Error,
    },
}

/// A decoded client command.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    UpdateRoutes(Vec<Route>),
    UpdateSchedules(Vec<Schedule>),
    UpdateBusLocation(BusLocationUpdate),
    UpdateBusLocations(Vec<BusLocation>),
    PickupRequest(Map<String, Value>),
    DeletePickupRequest(u64),
    GetPickupRequests,
}

impl ClientEvent {
    /// Parse a text frame into a typed command.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(raw).map_err(DecodeError::Frame)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, DecodeError> {
        let channel = Channel::parse(&envelope.event)
            .ok_or_else(|| DecodeError::UnknownChannel(envelope.event.clone()))?;
        let data = envelope.data;
        let payload = |source| DecodeError::Payload { channel, source };

        Ok(match channel {
            Channel::UpdateRoutes => Self::UpdateRoutes(serde_json::from_value(data).map_err(payload)?),
            Channel::UpdateSchedules => {
                Self::UpdateSchedules(serde_json::from_value(data).map_err(payload)?)
            }
            Channel::UpdateBusLocation => {
                Self::UpdateBusLocation(serde_json::from_value(data).map_err(payload)?)
            }
            Channel::UpdateBusLocations => {
                Self::UpdateBusLocations(serde_json::from_value(data).map_err(payload)?)
            }
            Channel::PickupRequest => Self::PickupRequest(serde_json::from_value(data).map_err(payload)?),
            Channel::DeletePickupRequest => {
                Self::DeletePickupRequest(serde_json::from_value(data).map_err(payload)?)
            }
            Channel::GetPickupRequests => Self::GetPickupRequests,
        })
    }

    pub fn channel(&self) -> Channel {
        match self {
            Self::UpdateRoutes(_) => Channel::UpdateRoutes,
            Self::UpdateSchedules(_) => Channel::UpdateSchedules,
            Self::UpdateBusLocation(_) => Channel::UpdateBusLocation,
            Self::UpdateBusLocations(_) => Channel::UpdateBusLocations,
            Self::PickupRequest(_) => Channel::PickupRequest,
            Self::DeletePickupRequest(_) => Channel::DeletePickupRequest,
            Self::GetPickupRequests => Channel::GetPickupRequests,
        }
    }
}

/// Frames the server pushes to clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    InitialData(TransportState),
    RoutesUpdated(Vec<Route>),
    SchedulesUpdated(Vec<Schedule>),
    BusLocationUpdated(BusLocationUpdate),
    BusLocationsUpdated(Vec<BusLocation>),
    PickupRequestsUpdated(Vec<PickupRequest>),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitialData(_) => "initialData",
            Self::RoutesUpdated(_) => "routesUpdated",
            Self::SchedulesUpdated(_) => "schedulesUpdated",
            Self::BusLocationUpdated(_) => "busLocationUpdated",
            Self::BusLocationsUpdated(_) => "busLocationsUpdated",
            Self::PickupRequestsUpdated(_) => "pickupRequestsUpdated",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
