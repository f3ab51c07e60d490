//! The event router: declarative `(type, version)` route registration, a
//! before/after middleware pipeline, and dispatch.
//!
//! The dispatch algorithm is grounded on
//! `media-pirate/src/core/event_router.py`; the registration-API shape and
//! the manual future-boxing idiom come from the teacher's
//! `router::{Router, Handler, ProtocolAdapter}`. Dynamic parameter injection
//! from that source is replaced, per SPEC_FULL §9, by a uniform
//! `(envelope, deps, scratch)` signature — every handler and every
//! middleware is the same shape, so there is no reflection step left to
//! specify.

mod di;

pub use di::{ContainerBuilder, DependencyError, DependencyRegistry};

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::{ControlError, MiddlewarePhase};

/// Per-dispatch mutable side-band. The typed replacement for writing control
/// flags (`_correlation_snapshot`, `_increase_rate_limit`, ...) into the
/// envelope payload: middleware and handlers read and write this instead,
/// so the envelope itself is never mutated in flight.
#[derive(Debug, Clone, Default)]
pub struct Scratch {
    pub correlation_snapshot: Option<String>,
    pub increase_rate_limit: bool,
    pub cleanup_correlation_start_time: bool,
    pub extra: serde_json::Map<String, Value>,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A handler or middleware callable: takes ownership of the envelope, the
/// service's dependency aggregate, and the scratch side-band, and returns
/// them alongside a result so the router can thread `scratch` through the
/// rest of the pipeline. Taking owned values (rather than borrows) keeps the
/// future `'static`, which is what lets ordinary `async fn`/closures
/// implement this without lifetime gymnastics.
pub trait RouteHandler<Deps>: Send + Sync {
    fn call(&self, envelope: Envelope, deps: Deps, scratch: Scratch) -> BoxFuture<'static, (Result<Value, ControlError>, Scratch)>;
}

impl<Deps, F, Fut> RouteHandler<Deps> for F
where
    F: Fn(Envelope, Deps, Scratch) -> Fut + Send + Sync,
    Fut: Future<Output = (Result<Value, ControlError>, Scratch)> + Send + 'static,
{
    fn call(&self, envelope: Envelope, deps: Deps, scratch: Scratch) -> BoxFuture<'static, (Result<Value, ControlError>, Scratch)> {
        Box::pin((self)(envelope, deps, scratch))
    }
}

/// A middleware: same inputs as a handler, returns a pass/fail signal
/// (the typed narrowing of "truthy"/"falsy", see DESIGN.md) alongside the
/// updated scratch.
pub trait RouteMiddleware<Deps>: Send + Sync {
    fn call(&self, envelope: Envelope, deps: Deps, scratch: Scratch) -> BoxFuture<'static, (Result<bool, ControlError>, Scratch)>;
}

impl<Deps, F, Fut> RouteMiddleware<Deps> for F
where
    F: Fn(Envelope, Deps, Scratch) -> Fut + Send + Sync,
    Fut: Future<Output = (Result<bool, ControlError>, Scratch)> + Send + 'static,
{
    fn call(&self, envelope: Envelope, deps: Deps, scratch: Scratch) -> BoxFuture<'static, (Result<bool, ControlError>, Scratch)> {
        Box::pin((self)(envelope, deps, scratch))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    pub middleware_before: Vec<String>,
    pub middleware_after: Vec<String>,
    /// Advisory; declared for wire/config parity but never read by the
    /// dispatch loop (matches the distilled spec exactly — see DESIGN.md
    /// Open Question 3).
    pub retry_attempt: Option<u32>,
}

struct RouteEntry<Deps> {
    handler: Arc<dyn RouteHandler<Deps>>,
    options: RouteOptions,
}

/// The outcome of a single `dispatch` call.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub handler_result: Value,
    pub correlation_id: String,
    pub middlewares_before_result: HashMap<String, bool>,
    pub middlewares_after_result: HashMap<String, bool>,
}

/// Per-service route table, middleware registry, and dispatcher.
pub struct Router<Deps> {
    routes: HashMap<(String, u32), RouteEntry<Deps>>,
    middlewares: HashMap<String, Arc<dyn RouteMiddleware<Deps>>>,
    global_before: Vec<String>,
    global_after: Vec<String>,
}

impl<Deps: Clone + Send + Sync + 'static> Default for Router<Deps> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Deps: Clone + Send + Sync + 'static> Router<Deps> {
    pub fn new() -> Self {
        Router {
            routes: HashMap::new(),
            middlewares: HashMap::new(),
            global_before: Vec::new(),
            global_after: Vec::new(),
        }
    }

    /// Register (or idempotently replace) a handler for `(event_type, version)`.
    pub fn route(
        &mut self,
        event_type: impl Into<String>,
        version: u32,
        options: RouteOptions,
        handler: impl RouteHandler<Deps> + 'static,
    ) -> Result<(), ControlError> {
        let event_type = event_type.into();
        if event_type.is_empty() {
            return Err(ControlError::HandlerSignatureError(
                "route type must be non-empty".into(),
            ));
        }
        if version < 1 {
            return Err(ControlError::HandlerSignatureError(
                "route version must be >= 1".into(),
            ));
        }
        self.routes.insert(
            (event_type, version),
            RouteEntry {
                handler: Arc::new(handler),
                options,
            },
        );
        Ok(())
    }

    fn register_named(
        &mut self,
        name: impl Into<String>,
        mw: impl RouteMiddleware<Deps> + 'static,
    ) -> Result<(), ControlError> {
        let name = name.into();
        if self.middlewares.contains_key(&name) {
            return Err(ControlError::MiddlewareRegistrationError(format!(
                "middleware '{name}' already registered"
            )));
        }
        self.middlewares.insert(name, Arc::new(mw));
        Ok(())
    }

    /// Register a middleware that runs, in order, before every route.
    pub fn register_before_middleware(
        &mut self,
        name: impl Into<String>,
        mw: impl RouteMiddleware<Deps> + 'static,
    ) -> Result<(), ControlError> {
        let name = name.into();
        self.register_named(name.clone(), mw)?;
        self.global_before.push(name);
        Ok(())
    }

    /// Register a middleware that runs, in order, after every route.
    pub fn register_after_middleware(
        &mut self,
        name: impl Into<String>,
        mw: impl RouteMiddleware<Deps> + 'static,
    ) -> Result<(), ControlError> {
        let name = name.into();
        self.register_named(name.clone(), mw)?;
        self.global_after.push(name);
        Ok(())
    }

    /// Register a named middleware that is only activated when a route's
    /// `RouteOptions` opts into it.
    pub fn register_middleware(
        &mut self,
        name: impl Into<String>,
        mw: impl RouteMiddleware<Deps> + 'static,
    ) -> Result<(), ControlError> {
        self.register_named(name, mw)
    }

    /// Pure lookup, `None` if absent.
    pub fn get_route(&self, envelope: &Envelope) -> Option<()> {
        self.routes
            .get(&(envelope.event_type.clone(), envelope.version))
            .map(|_| ())
    }

    fn effective_list(global: &[String], extra: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for name in global.iter().chain(extra.iter()) {
            if seen.insert(name.clone()) {
                out.push(name.clone());
            }
        }
        out
    }

    async fn run_list(
        &self,
        names: &[String],
        phase: MiddlewarePhase,
        mut envelope: Envelope,
        deps: Deps,
        mut scratch: Scratch,
    ) -> Result<(Envelope, Deps, Scratch, HashMap<String, bool>), ControlError> {
        let mut results = HashMap::new();
        for name in names {
            let mw = self.middlewares.get(name).ok_or_else(|| {
                ControlError::MiddlewareRegistrationError(format!("unresolved middleware '{name}'"))
            })?;
            let (result, next_scratch) = mw.call(envelope.clone(), deps.clone(), scratch).await;
            scratch = next_scratch;
            let passed = result.map_err(|_| ControlError::MiddlewareExecutionError {
                name: name.clone(),
                phase,
            })?;
            if !passed {
                return Err(ControlError::MiddlewareExecutionError {
                    name: name.clone(),
                    phase,
                });
            }
            results.insert(name.clone(), passed);
        }
        Ok((envelope, deps, scratch, results))
    }

    /// Execute the full dispatch algorithm for one envelope: route lookup,
    /// before-middleware, handler, after-middleware.
    pub async fn dispatch(&self, envelope: Envelope, deps: Deps) -> Result<DispatchOutcome, ControlError> {
        let key = (envelope.event_type.clone(), envelope.version);
        let entry = self.routes.get(&key).ok_or_else(|| ControlError::RouteNotFound {
            event_type: envelope.event_type.clone(),
            version: envelope.version,
        })?;

        let before_list = Self::effective_list(&self.global_before, &entry.options.middleware_before);
        let after_list = Self::effective_list(&self.global_after, &entry.options.middleware_after);

        let correlation_id = envelope.correlation_id.clone();
        let scratch = Scratch::default();

        let (envelope, deps, scratch, before_results) = self
            .run_list(&before_list, MiddlewarePhase::Before, envelope, deps, scratch)
            .await?;

        let handler = entry.handler.clone();
        let (handler_result, scratch) = handler.call(envelope.clone(), deps.clone(), scratch).await;
        let handler_result = handler_result?;

        let (_, _, _, after_results) = self
            .run_list(&after_list, MiddlewarePhase::After, envelope, deps, scratch)
            .await?;

        Ok(DispatchOutcome {
            handler_result,
            correlation_id,
            middlewares_before_result: before_results,
            middlewares_after_result: after_results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Clone)]
    struct NoDeps;

    fn envelope(event_type: &str) -> Envelope {
        Envelope::create(event_type, json!({})).unwrap()
    }

    #[tokio::test]
    async fn dispatch_runs_registered_handler() {
        let mut router: Router<NoDeps> = Router::new();
        router
            .route("events.telegram.raw", 1, RouteOptions::default(), |_e, _d, s| async move {
                (Ok(json!({"ok": true})), s)
            })
            .unwrap();

        let outcome = router.dispatch(envelope("events.telegram.raw"), NoDeps).await.unwrap();
        assert_eq!(outcome.handler_result, json!({"ok": true}));
    }

    #[tokio::test]
    async fn missing_route_is_route_not_found() {
        let router: Router<NoDeps> = Router::new();
        let err = router.dispatch(envelope("events.unknown"), NoDeps).await.unwrap_err();
        assert!(matches!(err, ControlError::RouteNotFound { .. }));
    }

    #[tokio::test]
    async fn duplicate_middleware_name_is_registration_error() {
        let mut router: Router<NoDeps> = Router::new();
        router
            .register_before_middleware("guard", |_e, _d, s| async move { (Ok(true), s) })
            .unwrap();
        let err = router
            .register_after_middleware("guard", |_e, _d, s| async move { (Ok(true), s) })
            .unwrap_err();
        assert!(matches!(err, ControlError::MiddlewareRegistrationError(_)));
    }

    #[tokio::test]
    async fn before_middleware_failure_aborts_before_handler_runs() {
        let mut router: Router<NoDeps> = Router::new();
        router
            .register_before_middleware("deny", |_e, _d, s| async move { (Ok(false), s) })
            .unwrap();
        router
            .route("events.telegram.raw", 1, RouteOptions::default(), |_e, _d, s| async move {
                (Ok(json!({"ran": true})), s)
            })
            .unwrap();

        let err = router.dispatch(envelope("events.telegram.raw"), NoDeps).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::MiddlewareExecutionError {
                phase: MiddlewarePhase::Before,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn route_specific_middleware_appends_after_global() {
        use std::sync::Arc as StdArc;

        let order = StdArc::new(std::sync::Mutex::new(Vec::new()));

        let mut router: Router<NoDeps> = Router::new();
        let order_clone = order.clone();
        router
            .register_before_middleware("global_one", move |_e, _d, s| {
                let order = order_clone.clone();
                async move {
                    order.lock().unwrap().push("global_one");
                    (Ok(true), s)
                }
            })
            .unwrap();
        let order_clone = order.clone();
        router
            .register_middleware("route_specific", move |_e, _d, s| {
                let order = order_clone.clone();
                async move {
                    order.lock().unwrap().push("route_specific");
                    (Ok(true), s)
                }
            })
            .unwrap();
        router
            .route(
                "events.telegram.raw",
                1,
                RouteOptions {
                    middleware_before: vec!["route_specific".to_string()],
                    ..Default::default()
                },
                |_e, _d, s| async move { (Ok(json!(null)), s) },
            )
            .unwrap();

        router.dispatch(envelope("events.telegram.raw"), NoDeps).await.unwrap();
        let seen: Vec<_> = order.lock().unwrap().clone();
        assert_eq!(seen, vec!["global_one", "route_specific"]);
    }
}
