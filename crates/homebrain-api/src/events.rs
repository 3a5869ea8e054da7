// ── Event stream frame catalogue ──
//
// Every WebSocket text frame is a JSON object discriminated by `type`.
// Frames are decoded once, here, into `BridgeEvent`; nothing downstream
// probes raw JSON.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::{BridgeStatus, RawDevice};

/// A decoded frame from the bridge event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Bridge health changed (`bridge_status`, or the status carried by the
    /// greeting `ws_connected` frame).
    BridgeStatus(BridgeStatus),

    /// Authoritative bulk frame (`device_snapshot` / `discovery_complete`).
    /// Supersedes every device not present in it.
    DeviceSnapshot(DeviceBatch),

    /// A device joined the bridge's registry.
    DeviceAdded { device: Option<RawDevice> },

    /// A device left the bridge's registry.
    DeviceRemoved { device_id: Option<String> },

    /// Partial update for one device (`device_event` / `device_state`).
    /// Touches only the addressed device.
    DeviceUpdate {
        device: Option<RawDevice>,
        detail: Map<String, Value>,
    },

    /// A command was carried out by the bridge.
    CommandAck(CommandAck),

    /// Any `type` this client does not know. Ignored by consumers.
    Unknown { kind: String },
}

/// Payload of a bulk device frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "BatchPayload")]
pub struct DeviceBatch {
    /// Which frame produced the batch (`device_snapshot` or
    /// `discovery_complete`).
    pub kind: String,
    pub devices: Vec<RawDevice>,
    pub mode: Option<String>,
    pub count: Option<usize>,
}

/// Older bridges send `device_count`, newer ones `count`; some send both.
#[derive(Deserialize)]
struct BatchPayload {
    #[serde(default)]
    devices: Vec<RawDevice>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    device_count: Option<usize>,
}

impl From<BatchPayload> for DeviceBatch {
    fn from(p: BatchPayload) -> Self {
        Self {
            kind: String::new(),
            devices: p.devices,
            mode: p.mode,
            count: p.count.or(p.device_count),
        }
    }
}

/// Payload of a `command_ack` frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CommandAck {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub level: Option<Value>,
    /// Present on newer bridges only; absent means "assume success".
    #[serde(default)]
    pub success: Option<bool>,
}

#[derive(Deserialize)]
struct DevicePayload {
    #[serde(default)]
    device: Option<RawDevice>,
}

#[derive(Deserialize)]
struct RemovedPayload {
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct GreetingPayload {
    #[serde(default)]
    status: Option<BridgeStatus>,
}

/// Why a frame could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no string `type` discriminator")]
    MissingType,

    #[error("malformed `{kind}` frame: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BridgeEvent {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text).map_err(FrameError::Json)?;
        let Value::Object(mut frame) = value else {
            return Err(FrameError::NotAnObject);
        };
        let Some(Value::String(kind)) = frame.remove("type") else {
            return Err(FrameError::MissingType);
        };

        let payload = |frame: Map<String, Value>| Value::Object(frame);
        let fail = |kind: &str, source| FrameError::Payload {
            kind: kind.to_owned(),
            source,
        };

        let event = match kind.as_str() {
            "bridge_status" => Self::BridgeStatus(
                serde_json::from_value(payload(frame)).map_err(|e| fail(&kind, e))?,
            ),
            "ws_connected" => {
                let greeting: GreetingPayload =
                    serde_json::from_value(payload(frame)).map_err(|e| fail(&kind, e))?;
                match greeting.status {
                    Some(status) => Self::BridgeStatus(status),
                    None => Self::Unknown { kind },
                }
            }
            "device_snapshot" | "discovery_complete" => {
                let mut batch: DeviceBatch =
                    serde_json::from_value(payload(frame)).map_err(|e| fail(&kind, e))?;
                batch.kind = kind;
                Self::DeviceSnapshot(batch)
            }
            "device_added" => {
                let body: DevicePayload =
                    serde_json::from_value(payload(frame)).map_err(|e| fail(&kind, e))?;
                Self::DeviceAdded {
                    device: body.device,
                }
            }
            "device_removed" => {
                let body: RemovedPayload =
                    serde_json::from_value(payload(frame)).map_err(|e| fail(&kind, e))?;
                Self::DeviceRemoved {
                    device_id: body.device_id.or(body.id),
                }
            }
            "device_event" | "device_state" => {
                let device = match frame.remove("device") {
                    None | Some(Value::Null) => None,
                    Some(Value::Object(map)) => Some(map),
                    Some(other) => {
                        return Err(fail(
                            &kind,
                            serde::de::Error::custom(format!("`device` is not an object: {other}")),
                        ));
                    }
                };
                Self::DeviceUpdate {
                    device,
                    detail: frame,
                }
            }
            "command_ack" => Self::CommandAck(
                serde_json::from_value(payload(frame)).map_err(|e| fail(&kind, e))?,
            ),
            _ => Self::Unknown { kind },
        };
        Ok(event)
    }

    /// Frame kinds that count as evidence of a healthy bridge.
    pub fn is_state_changing(&self) -> bool {
        !matches!(self, Self::Unknown { .. })
    }
}
