//! Message bus over a host broadcast channel
//!
//! Messages are JSON envelopes `{from, message}` posted on the channel named
//! after the registry key. Nothing is persisted and nothing is acknowledged.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use winsync_hal::Host;

use crate::error::SyncError;

/// Wire envelope for one message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    /// Sender window ID
    pub from: String,
    pub message: P,
}

/// Broadcast channel membership for one context
#[derive(Debug)]
pub struct MessageBus {
    channel: String,
    joined: bool,
}

impl MessageBus {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            joined: false,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_open(&self) -> bool {
        self.joined
    }

    /// Join the channel (no-op if already joined)
    pub fn open<H: Host>(&mut self, host: &H) -> Result<(), SyncError> {
        if !self.joined {
            host.join_channel(&self.channel)?;
            self.joined = true;
        }
        Ok(())
    }

    /// Leave the channel (no-op if not joined)
    pub fn close<H: Host>(&mut self, host: &H) {
        if self.joined {
            host.leave_channel(&self.channel);
            self.joined = false;
        }
    }

    /// Wrap and post a payload
    pub fn send<H: Host, P: Serialize>(
        &self,
        host: &H,
        from: &str,
        message: &P,
    ) -> Result<(), SyncError> {
        #[derive(Serialize)]
        struct Outgoing<'a, P> {
            from: &'a str,
            message: &'a P,
        }

        let data = serde_json::to_string(&Outgoing { from, message })?;
        host.broadcast(&self.channel, &data)?;
        Ok(())
    }

    /// Decode an inbound envelope
    pub fn decode<P: DeserializeOwned>(&self, data: &str) -> Result<Envelope<P>, SyncError> {
        Ok(serde_json::from_str(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use winsync_hal::HostEvent;
    use winsync_hal_mock::MockOrigin;

    #[test]
    fn test_send_reaches_other_members_only() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        let b = origin.open_context();
        let mut bus_a = MessageBus::new("winsync");
        let mut bus_b = MessageBus::new("winsync");
        bus_a.open(&a).unwrap();
        bus_b.open(&b).unwrap();

        bus_a.send(&a, "wa", &json!({"hello": "world"})).unwrap();

        assert!(a.poll_events().is_empty());
        let events = b.poll_events();
        let data = match &events[..] {
            [HostEvent::Message { channel, data }] if channel == "winsync" => data.clone(),
            other => panic!("unexpected events {other:?}"),
        };
        let envelope: Envelope<Value> = bus_b.decode(&data).unwrap();
        assert_eq!(envelope.from, "wa");
        assert_eq!(envelope.message, json!({"hello": "world"}));
    }

    #[test]
    fn test_send_before_open_fails() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        let bus = MessageBus::new("winsync");
        assert!(matches!(
            bus.send(&a, "wa", &1),
            Err(SyncError::Host(winsync_hal::HostError::ChannelUnavailable))
        ));
    }

    #[test]
    fn test_open_close_idempotent() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        let mut bus = MessageBus::new("winsync");

        bus.open(&a).unwrap();
        bus.open(&a).unwrap();
        assert_eq!(a.joined_channels(), vec!["winsync".to_string()]);

        bus.close(&a);
        bus.close(&a);
        assert!(!bus.is_open());
        assert!(a.joined_channels().is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let bus = MessageBus::new("winsync");
        assert!(bus.decode::<Value>("not json").is_err());
        assert!(bus.decode::<Value>(r#"{"message": 1}"#).is_err());
    }

    #[test]
    fn test_envelope_wire_shape() {
        let json = serde_json::to_string(&Envelope {
            from: "w1".to_string(),
            message: 42,
        })
        .unwrap();
        assert_eq!(json, r#"{"from":"w1","message":42}"#);
    }
}
