//! Named-strategy fallback ladders.
//!
//! A ladder runs its rungs in order and stops at the first success. Failures
//! of earlier rungs are kept on the outcome for logging. If every rung fails
//! the last error is returned.

use crisp_core::EngineError;
use futures::future::BoxFuture;

/// Result of climbing a ladder
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    /// Name of the rung that produced `value`
    pub rung: &'static str,
    pub failures: Vec<(&'static str, EngineError)>,
}

impl<T> Outcome<T> {
    pub fn fell_back(&self) -> bool {
        !self.failures.is_empty()
    }
}

type SyncRung<'a, T> = (&'static str, Box<dyn FnOnce() -> Result<T, EngineError> + 'a>);

/// Ladder of synchronous strategies
pub struct Ladder<'a, T> {
    label: &'static str,
    rungs: Vec<SyncRung<'a, T>>,
}

impl<'a, T> Ladder<'a, T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            rungs: Vec::new(),
        }
    }

    pub fn rung<F>(mut self, name: &'static str, strategy: F) -> Self
    where
        F: FnOnce() -> Result<T, EngineError> + 'a,
    {
        self.rungs.push((name, Box::new(strategy)));
        self
    }

    pub fn climb(self) -> Result<Outcome<T>, EngineError> {
        let mut failures = Vec::new();
        for (name, strategy) in self.rungs {
            match strategy() {
                Ok(value) => {
                    if !failures.is_empty() {
                        tracing::debug!(ladder = self.label, rung = name, "Fallback rung succeeded");
                    }
                    return Ok(Outcome {
                        value,
                        rung: name,
                        failures,
                    });
                }
                Err(e) => {
                    tracing::debug!(ladder = self.label, rung = name, error = %e, "Rung failed");
                    failures.push((name, e));
                }
            }
        }
        Err(exhausted(self.label, failures))
    }
}

type AsyncRung<'a, T> = (
    &'static str,
    Box<dyn FnOnce() -> BoxFuture<'a, Result<T, EngineError>> + Send + 'a>,
);

/// Ladder of asynchronous strategies
pub struct AsyncLadder<'a, T> {
    label: &'static str,
    rungs: Vec<AsyncRung<'a, T>>,
}

impl<'a, T: Send + 'a> AsyncLadder<'a, T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            rungs: Vec::new(),
        }
    }

    pub fn rung<F>(mut self, name: &'static str, strategy: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'a, Result<T, EngineError>> + Send + 'a,
    {
        self.rungs.push((name, Box::new(strategy)));
        self
    }

    pub async fn climb(self) -> Result<Outcome<T>, EngineError> {
        let mut failures = Vec::new();
        for (name, strategy) in self.rungs {
            match strategy().await {
                Ok(value) => {
                    if !failures.is_empty() {
                        tracing::debug!(ladder = self.label, rung = name, "Fallback rung succeeded");
                    }
                    return Ok(Outcome {
                        value,
                        rung: name,
                        failures,
                    });
                }
                Err(e) => {
                    tracing::warn!(ladder = self.label, rung = name, error = %e, "Rung failed");
                    failures.push((name, e));
                }
            }
        }
        Err(exhausted(self.label, failures))
    }
}

fn exhausted(label: &'static str, mut failures: Vec<(&'static str, EngineError)>) -> EngineError {
    match failures.pop() {
        Some((_, last)) => last,
        None => EngineError::Internal(format!("fallback ladder '{}' has no rungs", label)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn test_first_success_wins() {
        let outcome = Ladder::new("test")
            .rung("broken", || Err(EngineError::DecodeFailure("nope".into())))
            .rung("works", || Ok(7))
            .rung("never", || Ok(9))
            .climb()
            .unwrap();
        assert_eq!(outcome.value, 7);
        assert_eq!(outcome.rung, "works");
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.fell_back());
    }

    #[test]
    fn test_all_failing_returns_last_error() {
        let err = Ladder::<u8>::new("test")
            .rung("a", || Err(EngineError::DecodeFailure("a".into())))
            .rung("b", || Err(EngineError::EncodeFailure("b".into())))
            .climb()
            .unwrap_err();
        assert!(matches!(err, EngineError::EncodeFailure(_)));
    }

    #[test]
    fn test_empty_ladder_is_internal_error() {
        let err = Ladder::<u8>::new("empty").climb().unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
    }

    #[tokio::test]
    async fn test_async_ladder_runs_rungs_lazily() {
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c1 = counter.clone();
        let c2 = counter.clone();
        let outcome = AsyncLadder::new("async")
            .rung("first", move || {
                async move {
                    c1.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok("first")
                }
                .boxed()
            })
            .rung("second", move || {
                async move {
                    c2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok("second")
                }
                .boxed()
            })
            .climb()
            .await
            .unwrap();
        assert_eq!(outcome.value, "first");
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
