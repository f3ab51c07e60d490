//! The two durable-optional queue names every service agrees on (§6).

/// Ingress from the gateway; consumed by the worker for command mapping.
pub const TELEGRAM_EVENTS: &str = "telegram_events";

/// Commands/results destined for the gateway; also where coalescing
/// contenders re-publish a `*.ready` event they couldn't claim (§4.8).
pub const GATEWAY_EVENTS: &str = "gateway_events";
