use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Controller,
    Client,
}

// `role` is kept as a raw string rather than `Role` so an unrecognized value produces
// the exact "Invalid role, expected 'controller' or 'client'" error instead of a
// generic deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    #[serde(default)]
    pub room_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthResponse {
    pub fn success(room_code: String) -> Self {
        Self {
            kind: "auth_response",
            success: true,
            room_code: Some(room_code),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            kind: "auth_response",
            success: false,
            room_code: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: &'a str,
}

impl<'a> Notification<'a> {
    pub fn new(message: &'a str) -> Self {
        Self {
            kind: "notification",
            message,
        }
    }
}

pub const NOTIFICATION_CLIENT_CONNECTED: &str = "Client connected";
pub const NOTIFICATION_CONTROLLER_RECONNECTED: &str = "Controller reconnected";
pub const NOTIFICATION_CONTROLLER_DISCONNECTED: &str =
    "Controller disconnected, waiting for reconnection";
pub const NOTIFICATION_CLIENT_DISCONNECTED: &str = "Client disconnected";

#[derive(Debug, Clone, Serialize)]
pub struct Pong {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: i64,
}

impl Pong {
    pub fn now(timestamp_ms: i64) -> Self {
        Self {
            kind: "pong",
            timestamp: timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameHeader {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl FrameHeader {
    // A body that isn't a JSON object, or has no `type` field, is not an error here:
    // the relay forwards it verbatim without interpretation.
    pub fn peek(body: &[u8]) -> Option<String> {
        serde_json::from_slice::<FrameHeader>(body)
            .ok()
            .and_then(|header| header.kind)
    }
}

pub const MESSAGE_TYPE_PING: &str = "ping";
