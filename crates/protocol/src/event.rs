//! Inbound frame envelope.

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminator carried in `event_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	StepExecution,
	Error,
	Log,
	DeviceInitStatus,
	Connection,
	/// Anything else, including frames without an `event_type`.
	Other,
}

impl EventKind {
	pub fn from_wire(event_type: &str) -> Self {
		match event_type {
			"STEP_EXECUTION" => Self::StepExecution,
			"ERROR" => Self::Error,
			"LOG" => Self::Log,
			"DEVICE_INIT_STATUS" => Self::DeviceInitStatus,
			"CONNECTION" => Self::Connection,
			_ => Self::Other,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::StepExecution => "STEP_EXECUTION",
			Self::Error => "ERROR",
			Self::Log => "LOG",
			Self::DeviceInitStatus => "DEVICE_INIT_STATUS",
			Self::Connection => "CONNECTION",
			Self::Other => "",
		}
	}
}

/// A frame received from the worker, decoded into the generic shape.
///
/// The original bytes are always kept in [`raw`](Self::raw), so a consumer can
/// re-parse the frame into a more specific type with [`parse_as`](Self::parse_as)
/// even when the generic decode failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundEvent {
	/// Primary discriminator (`STEP_EXECUTION`, `LOG`, ...).
	#[serde(default)]
	pub event_type: String,
	/// Secondary discriminator, only used by keepalive probes.
	#[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
	pub probe_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub workflow_run_id: Option<String>,
	/// Opaque payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
	/// Correlation id (ping/pong).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<f64>,
	/// Frame bytes exactly as received.
	#[serde(skip)]
	pub raw: Vec<u8>,
	/// Set when the generic decode failed.
	#[serde(skip)]
	pub decode_error: Option<String>,
}

/// Minimal view used when the full envelope does not decode.
#[derive(Deserialize)]
struct Discriminators {
	#[serde(default)]
	event_type: Option<Value>,
	#[serde(rename = "type", default)]
	probe_type: Option<Value>,
	#[serde(default)]
	status: Option<Value>,
	#[serde(default)]
	id: Option<Value>,
}

impl InboundEvent {
	/// Decodes a frame. Never fails: a frame that does not match the envelope
	/// still comes back with its raw bytes and whatever discriminators could be
	/// salvaged from it.
	pub fn decode(raw: Vec<u8>) -> Self {
		match serde_json::from_slice::<InboundEvent>(&raw) {
			Ok(mut event) => {
				event.raw = raw;
				event
			}
			Err(err) => {
				let salvaged = serde_json::from_slice::<Discriminators>(&raw).ok();
				let text = |v: Option<Value>| v.and_then(|v| v.as_str().map(String::from));
				let Some(d) = salvaged else {
					return Self {
						raw,
						decode_error: Some(err.to_string()),
						..Self::default()
					};
				};
				Self {
					event_type: text(d.event_type).unwrap_or_default(),
					probe_type: text(d.probe_type),
					status: text(d.status),
					id: text(d.id),
					raw,
					decode_error: Some(err.to_string()),
					..Self::default()
				}
			}
		}
	}

	pub fn kind(&self) -> EventKind {
		EventKind::from_wire(&self.event_type)
	}

	/// True for a peer keepalive probe that must be answered, not delivered.
	pub fn is_ping(&self) -> bool {
		self.probe_type.as_deref() == Some("ping")
	}

	/// Re-parses the raw frame into a narrower shape.
	pub fn parse_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
		serde_json::from_slice(&self.raw)
	}

	/// Lossy UTF-8 view of the raw frame, for logging.
	pub fn raw_text(&self) -> Cow<'_, str> {
		String::from_utf8_lossy(&self.raw)
	}
}

/// Body of an `ERROR` event: the worker rejected the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteError {
	#[serde(default)]
	pub message: String,
}

/// Body of a `DEVICE_INIT_STATUS` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInitStatus {
	#[serde(default)]
	pub status: String,
}

impl DeviceInitStatus {
	pub fn is_initialized(&self) -> bool {
		self.status == "initialized"
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decode_keeps_raw_bytes() {
		let raw = br#"{"event_type":"LOG","data":"booting"}"#.to_vec();
		let event = InboundEvent::decode(raw.clone());

		assert_eq!(event.kind(), EventKind::Log);
		assert_eq!(event.raw, raw);
		assert_eq!(event.data, Some(Value::String("booting".into())));
		assert!(event.decode_error.is_none());
	}

	#[test]
	fn undecodable_frame_is_still_captured() {
		let raw = b"not json at all".to_vec();
		let event = InboundEvent::decode(raw.clone());

		assert_eq!(event.kind(), EventKind::Other);
		assert_eq!(event.raw, raw);
		assert!(event.decode_error.is_some());
	}

	#[test]
	fn mistyped_field_keeps_discriminator() {
		// timestamp should be a number; the envelope fails but routing info survives
		let raw = br#"{"event_type":"STEP_EXECUTION","timestamp":"yesterday","step_id":"s1"}"#.to_vec();
		let event = InboundEvent::decode(raw);

		assert_eq!(event.kind(), EventKind::StepExecution);
		assert!(event.decode_error.is_some());
	}

	#[test]
	fn ping_detection() {
		let event = InboundEvent::decode(br#"{"type":"ping","id":"p-1","timestamp":1.5}"#.to_vec());
		assert!(event.is_ping());
		assert_eq!(event.id.as_deref(), Some("p-1"));

		let pong = InboundEvent::decode(br#"{"type":"pong","id":"p-1"}"#.to_vec());
		assert!(!pong.is_ping());
	}

	#[test]
	fn mistyped_field_keeps_correlation_fields() {
		let ping = InboundEvent::decode(br#"{"type":"ping","id":"p-1","timestamp":"2025-01-01T00:00:00Z"}"#.to_vec());
		assert!(ping.decode_error.is_some());
		assert!(ping.is_ping());
		assert_eq!(ping.id.as_deref(), Some("p-1"));

		let status = InboundEvent::decode(br#"{"event_type":"CONNECTION","status":"connected","timestamp":"now"}"#.to_vec());
		assert_eq!(status.kind(), EventKind::Connection);
		assert_eq!(status.status.as_deref(), Some("connected"));
	}

	#[test]
	fn late_parse_into_device_status() {
		let event = InboundEvent::decode(br#"{"event_type":"DEVICE_INIT_STATUS","status":"initialized"}"#.to_vec());
		let status: DeviceInitStatus = event.parse_as().unwrap();
		assert!(status.is_initialized());
	}

	#[test]
	fn unknown_event_type_maps_to_other() {
		assert_eq!(EventKind::from_wire("SCREEN_FRAME"), EventKind::Other);
		assert_eq!(EventKind::from_wire("ERROR").as_str(), "ERROR");
	}
}
