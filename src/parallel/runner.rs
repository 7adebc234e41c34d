use super::batch::{Batch, Completion};
use crate::core::config::RunConfig;
use crate::core::errors::{ParallelError, Result, RunError};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{oneshot, Semaphore};
use tracing::warn;

type Delivery<T> = Arc<Mutex<Option<oneshot::Sender<T>>>>;

fn deliver<T>(slot: &Delivery<T>, value: T) {
    let sender = slot
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(sender) = sender {
        // The receiver is gone only if the awaiting future was dropped.
        let _ = sender.send(value);
    }
}

/// Runs a batch of futures on the current tokio runtime with the
/// coordinator's ordering and first-error semantics.
#[derive(Debug, Clone, Default)]
pub struct ParallelRunner {
    config: RunConfig,
}

impl ParallelRunner {
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Spawn every future in order and wait until all of them have finished.
    ///
    /// Returns the outputs in input order, or the first error in completion
    /// order once every future has finished. Must be called inside a tokio
    /// runtime.
    pub async fn run<I, Fut, T, E>(&self, tasks: I) -> std::result::Result<Vec<T>, RunError<E>>
    where
        I: IntoIterator<Item = Fut>,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let tx: Delivery<std::result::Result<Vec<T>, RunError<E>>> =
            Arc::new(Mutex::new(Some(tx)));
        let abandon_tx = Arc::clone(&tx);

        let batch = Batch::from_config(&self.config)
            .on_abandoned(move |err| deliver(&abandon_tx, Err(RunError::Coordinator(err))));
        let batch_id = batch.id();

        let limiter = self
            .config
            .max_in_flight
            .map(|limit| Arc::new(Semaphore::new(limit)));

        let tasks = tasks.into_iter().map(|future| {
            let limiter = limiter.clone();
            move |signal: Completion<T, E>| {
                tokio::spawn(async move {
                    let _permit = match limiter {
                        Some(limiter) => limiter.acquire_owned().await.ok(),
                        None => None,
                    };
                    signal.complete(future.await);
                });
            }
        });

        batch.run(tasks, move |outcome| deliver(&tx, outcome.map_err(RunError::Task)));

        // Both delivery paths own a sender: `done` once every task has completed,
        // the abandonment hook if the batch state is freed first. The receiver can
        // only see a closed channel if neither ran, which the batch never allows.
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(batch = %batch_id, "Batch finished without delivering an outcome");
                Err(RunError::Coordinator(ParallelError::internal(format!(
                    "batch {} finished without delivering an outcome",
                    batch_id
                ))))
            }
        }
    }
}

/// Run futures with the default configuration. See [`ParallelRunner::run`].
pub async fn run_all<I, Fut, T, E>(tasks: I) -> std::result::Result<Vec<T>, RunError<E>>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    ParallelRunner::default().run(tasks).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let futures = (0..5u64).map(|n| async move {
            tokio::time::sleep(Duration::from_millis(25 - n * 5)).await;
            Ok::<_, String>(n)
        });

        let results = run_all(futures).await.unwrap();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let results = run_all(Vec::<std::future::Ready<std::result::Result<u8, String>>>::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_max_in_flight_is_respected() {
        let runner = ParallelRunner::new(RunConfig::bounded(2)).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let futures = (0..8).map(|n| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(n)
            }
        });

        let results = runner.run(futures).await.unwrap();
        assert_eq!(results, (0..8).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let err = ParallelRunner::new(RunConfig::bounded(0)).unwrap_err();
        assert_eq!(err.category(), "configuration");
    }
}
