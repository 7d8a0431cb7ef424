//! Event de-duplication. Stripe delivers at least once; a Redis marker per
//! event id keeps replays from being processed twice within a day.
//!
//! Redis outages fail open: every handler is replay-safe, so processing a
//! duplicate is preferable to dropping an event.

use tracing::warn;

const EVENT_MARKER_TTL_SECS: u64 = 24 * 60 * 60;

fn event_key(event_id: &str) -> String {
    format!("stripe:event:{event_id}")
}

/// Returns `false` when the event was already claimed by an earlier delivery.
pub async fn claim_event(redis: &redis::Client, event_id: &str) -> bool {
    let result: Result<Option<String>, redis::RedisError> = async {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        redis::cmd("SET")
            .arg(event_key(event_id))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(EVENT_MARKER_TTL_SECS)
            .query_async(&mut conn)
            .await
    }
    .await;

    match result {
        Ok(reply) => reply.is_some(),
        Err(e) => {
            warn!("Could not check webhook event {}: {}", event_id, e);
            true
        }
    }
}

/// Drops the marker so the provider's retry of a failed event is processed.
pub async fn release_event(redis: &redis::Client, event_id: &str) {
    let result: Result<(), redis::RedisError> = async {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        redis::cmd("DEL")
            .arg(event_key(event_id))
            .query_async(&mut conn)
            .await
    }
    .await;

    if let Err(e) = result {
        warn!("Could not release webhook event {}: {}", event_id, e);
    }
}
