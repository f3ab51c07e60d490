//! The transport-agnostic half of the per-service dispatch loop (§4.4):
//! decode → correlation-set → route lookup → dispatch → outcome. Each
//! service's own AMQP consumer loop (out of scope per §1) calls
//! `process_delivery` once per message and translates the returned
//! `DeliveryOutcome` into an ack/nack against the broker.

use crate::correlation::with_correlation_id;
use crate::envelope::Envelope;
use crate::error::ControlError;
use crate::router::Router;

/// What the transport-specific consumer loop should do with the message
/// that produced this outcome.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Dispatch ran (successfully or not — failures are logged by the
    /// caller); acknowledge the message.
    Ack,
    /// Malformed JSON or no matching route; acknowledge and drop.
    Drop { reason: String },
    /// A missing correlation id or a context-corruption assertion failure —
    /// both are programming-error indicators. The caller must abort the
    /// process after this outcome.
    Fatal { reason: String },
}

/// Run one delivery through the dispatch algorithm. `body` is the raw
/// message bytes off the queue.
pub async fn process_delivery<Deps>(body: &[u8], router: &Router<Deps>, deps: Deps) -> DeliveryOutcome
where
    Deps: Clone + Send + Sync + 'static,
{
    // Step 1: generic JSON decode. A JSON syntax error or a non-object
    // top-level value is an ordinary malformed-message drop.
    let raw: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed json");
            return DeliveryOutcome::Drop { reason: e.to_string() };
        }
    };

    // Step 2: a missing/empty correlation id is a distinct, fatal case —
    // a programming error upstream, not a message to silently drop.
    let has_correlation_id = raw
        .get("correlation_id")
        .and_then(|v| v.as_str())
        .map(|s| !s.is_empty())
        .unwrap_or(false);
    if !has_correlation_id {
        tracing::error!("missing correlation id; aborting process");
        return DeliveryOutcome::Fatal {
            reason: "missing correlation id".into(),
        };
    }

    // Step 3/4: full structural parse of the now-known-to-carry-a-correlation-id envelope.
    let envelope = match Envelope::from_wire(body) {
        Ok(e) => e,
        Err(other) => {
            tracing::warn!(error = %other, "dropping envelope that failed validation");
            return DeliveryOutcome::Drop {
                reason: other.to_string(),
            };
        }
    };

    let correlation_id = envelope.correlation_id.clone();
    with_correlation_id(correlation_id.clone(), async move {
        if router.get_route(&envelope).is_none() {
            tracing::warn!(event_type = %envelope.event_type, version = envelope.version, "no route registered");
            return DeliveryOutcome::Drop {
                reason: format!("no route for {} v{}", envelope.event_type, envelope.version),
            };
        }

        match router.dispatch(envelope, deps).await {
            Ok(outcome) => {
                tracing::info!(correlation_id = %outcome.correlation_id, "dispatch completed");
                DeliveryOutcome::Ack
            }
            Err(ControlError::ContextCorruption { expected, found }) => {
                tracing::error!(expected, found, "correlation context corrupted; aborting process");
                DeliveryOutcome::Fatal {
                    reason: format!("context corruption: expected {expected}, found {found}"),
                }
            }
            Err(other) => {
                tracing::warn!(error = %other, "dispatch failed");
                DeliveryOutcome::Ack
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::RouteOptions;
    use serde_json::json;

    #[derive(Clone)]
    struct NoDeps;

    #[tokio::test]
    async fn malformed_json_is_dropped() {
        let router: Router<NoDeps> = Router::new();
        let outcome = process_delivery(b"not json", &router, NoDeps).await;
        assert!(matches!(outcome, DeliveryOutcome::Drop { .. }));
    }

    #[tokio::test]
    async fn missing_correlation_id_is_fatal() {
        let router: Router<NoDeps> = Router::new();
        let body = br#"{"type":"events.telegram.raw","correlation_id":"","timestamp":"2024-01-01T00:00:00Z","payload":{}}"#;
        let outcome = process_delivery(body, &router, NoDeps).await;
        assert!(matches!(outcome, DeliveryOutcome::Drop { .. } | DeliveryOutcome::Fatal { .. }));
    }

    #[tokio::test]
    async fn unmatched_route_is_dropped() {
        let router: Router<NoDeps> = Router::new();
        let envelope = Envelope::create("events.unknown", json!({})).unwrap();
        let outcome = process_delivery(&envelope.to_wire().unwrap(), &router, NoDeps).await;
        assert!(matches!(outcome, DeliveryOutcome::Drop { .. }));
    }

    #[tokio::test]
    async fn matched_route_acks() {
        let mut router: Router<NoDeps> = Router::new();
        router
            .route("events.telegram.raw", 1, RouteOptions::default(), |_e, _d, s| async move {
                (Ok(json!(null)), s)
            })
            .unwrap();
        let envelope = Envelope::create("events.telegram.raw", json!({})).unwrap();
        let outcome = process_delivery(&envelope.to_wire().unwrap(), &router, NoDeps).await;
        assert!(matches!(outcome, DeliveryOutcome::Ack));
    }
}
