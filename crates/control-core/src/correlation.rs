//! Per-causal-chain correlation id propagation.
//!
//! A Python `contextvars.ContextVar` is inherited by every coroutine spawned
//! from the scope that set it, and invisible to sibling chains. `tokio::
//! task_local!` has the same property for everything `.await`ed inside a
//! `.scope(...)` call, so it is the direct replacement here.

tokio::task_local! {
    static CORRELATION_ID: String;
}

/// Run `fut` with the correlation slot set to `id` for its entire lifetime,
/// including everything it awaits. This is what the dispatch loop calls
/// immediately after decoding an envelope, before any handler work runs.
pub async fn with_correlation_id<F: std::future::Future>(id: String, fut: F) -> F::Output {
    CORRELATION_ID.scope(id, fut).await
}

/// Read the correlation id of the causal chain currently executing on this
/// task. Returns `"-"` outside of any scope (mirrors the Python default).
pub fn correlation_id() -> String {
    CORRELATION_ID
        .try_with(|id| id.clone())
        .unwrap_or_else(|_| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get_within_scope() {
        let observed = with_correlation_id("abc-123".into(), async { correlation_id() }).await;
        assert_eq!(observed, "abc-123");
    }

    #[test]
    fn default_outside_scope() {
        assert_eq!(correlation_id(), "-");
    }

    #[tokio::test]
    async fn concurrent_chains_do_not_cross_contaminate() {
        let a = tokio::spawn(with_correlation_id("chain-a".into(), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            correlation_id()
        }));
        let b = tokio::spawn(with_correlation_id("chain-b".into(), async { correlation_id() }));
        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a, "chain-a");
        assert_eq!(b, "chain-b");
    }
}
