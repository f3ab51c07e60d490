//! Shared primitives for the control-plane services: the wire envelope,
//! the typed event router and dispatch loop, correlation-id propagation,
//! cache-backed rate limiting and interest coalescing, chat authentication,
//! and the content-addressable staging protocol used by the worker and the
//! gateway to agree on object-store keys without talking to each other.
//!
//! Each service binary (`gateway`, `worker`, `quartermaster`) depends on
//! this crate and supplies its own transport wiring (AMQP, chat client,
//! object store) around the pieces defined here.

#![deny(unsafe_code)]

pub mod auth;
pub mod cache;
pub mod correlation;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod resilience;
pub mod queues;
pub mod router;
pub mod shutdown;
pub mod staging;

pub use correlation::{correlation_id, with_correlation_id};
pub use dispatch::{process_delivery, DeliveryOutcome};
pub use envelope::Envelope;
pub use error::{ControlError, ControlResult, MiddlewarePhase};
pub use router::{DispatchOutcome, Router, RouteOptions, Scratch};
