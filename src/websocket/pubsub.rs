//! Cross-instance event fanout over Redis pub/sub.
//!
//! Each broadcast is published on its room's channel; a listener task on
//! every instance relays foreign messages into the local registry.
//! Payloads carry the publishing instance's id so an instance never
//! re-delivers its own broadcasts.

use crate::websocket::{ConnectionRegistry, RoomId};
use futures_util::StreamExt;
use once_cell::sync::Lazy;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static INSTANCE_ID: Lazy<Uuid> = Lazy::new(Uuid::new_v4);

#[derive(Debug, Serialize, Deserialize)]
struct FanoutEnvelope {
    origin: Uuid,
    payload: String,
}

pub async fn publish(
    client: &redis::Client,
    room: RoomId,
    payload: &str,
) -> redis::RedisResult<()> {
    let envelope = serde_json::to_string(&FanoutEnvelope {
        origin: *INSTANCE_ID,
        payload: payload.to_string(),
    })
    .map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "serialize", e.to_string()))
    })?;

    let mut conn = client.get_multiplexed_async_connection().await?;
    conn.publish::<_, _, ()>(room.channel(), envelope).await
}

/// Relay foreign instances' broadcasts into the local registry. Runs until
/// the Redis connection drops; the caller owns restart policy.
pub async fn start_listener(
    client: redis::Client,
    registry: ConnectionRegistry,
) -> redis::RedisResult<()> {
    let conn = client.get_async_connection().await?;
    let mut pubsub = conn.into_pubsub();
    pubsub.psubscribe("room:*").await?;
    let mut stream = pubsub.on_message();

    while let Some(msg) = stream.next().await {
        let channel: String = msg.get_channel_name().into();
        let raw: String = msg.get_payload()?;

        let Some(room) = RoomId::from_channel(&channel) else {
            continue;
        };
        match serde_json::from_str::<FanoutEnvelope>(&raw) {
            Ok(envelope) if envelope.origin == *INSTANCE_ID => {}
            Ok(envelope) => registry.broadcast(room, envelope.payload).await,
            Err(e) => {
                tracing::warn!(error = %e, %channel, "unparseable fanout payload");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips() {
        let envelope = FanoutEnvelope {
            origin: *INSTANCE_ID,
            payload: r#"{"type":"error","message":"x"}"#.into(),
        };
        let raw = serde_json::to_string(&envelope).unwrap();
        let parsed: FanoutEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.origin, *INSTANCE_ID);
        assert_eq!(parsed.payload, envelope.payload);
    }
}
