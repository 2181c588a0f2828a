//! Messages exchanged between the display service and its subscribers.
//!
//! Both enums are internally tagged so they read naturally as JSON:
//!
//! ```text
//! {"type":"display_dots","pattern":[1,3,7]}
//! {"type":"state_changed","state":"connected","properties":{...}}
//! ```

use braillink_core::{ConnectionState, DisplayProperties, InputEvent};
use serde::{Deserialize, Serialize};

/// Request from a client to the display service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceRequest {
    /// Start receiving events on this connection.
    Register,

    /// Stop receiving events on this connection.
    Unregister,

    /// Show a cell pattern on the display, one byte per cell.
    DisplayDots { pattern: Vec<u8> },

    /// Ask the service to try connecting to a display.
    Poll,
}

/// Event broadcast by the display service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEvent {
    /// The global connection state changed.
    ///
    /// `properties` is set only for [`ConnectionState::Connected`].
    StateChanged {
        state: ConnectionState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        properties: Option<DisplayProperties>,
    },

    /// Human readable description of the connection step in flight.
    Progress { description: Option<String> },

    /// A key command from the display.
    Input { event: InputEvent },
}

impl ServiceEvent {
    pub fn connected(properties: DisplayProperties) -> Self {
        Self::StateChanged {
            state: ConnectionState::Connected,
            properties: Some(properties),
        }
    }

    pub fn state(state: ConnectionState) -> Self {
        Self::StateChanged {
            state,
            properties: None,
        }
    }

    pub fn progress(description: Option<String>) -> Self {
        Self::Progress { description }
    }
}
