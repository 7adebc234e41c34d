use crate::core::config::RunConfig;
use crate::core::errors::{ParallelError, Result};
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-task completion state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SlotState {
    Pending = 0,
    Succeeded = 1,
    Failed = 2,
}

impl From<u8> for SlotState {
    fn from(value: u8) -> Self {
        match value {
            0 => SlotState::Pending,
            1 => SlotState::Succeeded,
            _ => SlotState::Failed,
        }
    }
}

impl SlotState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SlotState::Pending)
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotState::Pending => "pending",
            SlotState::Succeeded => "succeeded",
            SlotState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A boxed task function, for batches whose tasks are different closures
pub type TaskFn<T, E> = Box<dyn FnOnce(Completion<T, E>) + Send>;

type DoneFn<T, E> = Box<dyn FnOnce(std::result::Result<Vec<T>, E>) + Send>;
type AbandonFn = Box<dyn FnOnce(ParallelError) + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Outcomes<T, E> {
    results: Vec<Option<T>>,
    /// First failure in completion order, with the index it came from
    first_error: Option<(usize, E)>,
    done: Option<DoneFn<T, E>>,
}

impl<T, E> Outcomes<T, E> {
    fn first_error_index(&self) -> Option<usize> {
        self.first_error.as_ref().map(|(index, _)| *index)
    }
}

/// State of one batch, shared by every outstanding [`Completion`]
struct BatchState<T, E> {
    id: Uuid,
    label: Option<String>,
    log_task_events: bool,
    total: usize,
    slots: Box<[AtomicU8]>,
    remaining: AtomicUsize,
    outcomes: Mutex<Outcomes<T, E>>,
    on_abandoned: Mutex<Option<AbandonFn>>,
}

impl<T, E> BatchState<T, E> {
    fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("-")
    }

    fn record(&self, index: usize, outcome: std::result::Result<T, E>) -> Result<()> {
        let next = if outcome.is_ok() {
            SlotState::Succeeded
        } else {
            SlotState::Failed
        };

        // The slot tag is the only gate against a second signal.
        // Nothing else is touched when it rejects one.
        if let Err(actual) = self.slots[index].compare_exchange(
            SlotState::Pending as u8,
            next as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(ParallelError::double_completion(
                self.id,
                self.label.clone(),
                index,
                SlotState::from(actual),
            ));
        }

        {
            let mut outcomes = lock(&self.outcomes);
            match outcome {
                Ok(value) => outcomes.results[index] = Some(value),
                Err(err) => match outcomes.first_error_index() {
                    Some(first) => {
                        debug!(
                            batch = %self.id,
                            label = self.label(),
                            index,
                            first,
                            "Task failed after an earlier failure; error suppressed"
                        );
                    }
                    None => {
                        warn!(
                            batch = %self.id,
                            label = self.label(),
                            index,
                            "Task failed; batch will report this error"
                        );
                        outcomes.first_error = Some((index, err));
                    }
                },
            }
        }

        let before = self.remaining.fetch_sub(1, Ordering::AcqRel);
        if self.log_task_events {
            debug!(
                batch = %self.id,
                label = self.label(),
                index,
                state = %next,
                remaining = before - 1,
                "Task completed"
            );
        }

        if before == 1 {
            self.finish();
        }
        Ok(())
    }

    fn finish(&self) {
        let (done, outcome) = {
            let mut outcomes = lock(&self.outcomes);
            let done = outcomes.done.take();
            let outcome = match outcomes.first_error.take() {
                Some((index, err)) => {
                    info!(
                        batch = %self.id,
                        label = self.label(),
                        total = self.total,
                        failed_index = index,
                        "Parallel batch failed"
                    );
                    Err(err)
                }
                None => {
                    let results: Vec<T> = std::mem::take(&mut outcomes.results)
                        .into_iter()
                        .flatten()
                        .collect();
                    debug_assert_eq!(results.len(), self.total);
                    info!(
                        batch = %self.id,
                        label = self.label(),
                        total = self.total,
                        "Parallel batch succeeded"
                    );
                    Ok(results)
                }
            };
            (done, outcome)
        };

        // Called outside the lock so `done` may start another batch.
        if let Some(done) = done {
            done(outcome);
        }
    }
}

impl<T, E> Drop for BatchState<T, E> {
    fn drop(&mut self) {
        let fired = lock(&self.outcomes).done.is_none();
        if fired {
            return;
        }

        let pending = self.remaining.load(Ordering::Acquire);
        warn!(
            batch = %self.id,
            label = self.label(),
            pending,
            total = self.total,
            "Every completion signal was dropped before the batch finished"
        );
        let hook = lock(&self.on_abandoned).take();
        if let Some(hook) = hook {
            hook(ParallelError::abandoned(self.id, self.label.clone(), pending));
        }
    }
}

/// Single-use completion signal handed to a task function.
///
/// Cloning is allowed so the signal can be moved into whatever callback ends
/// the task, but only the first call to [`complete`](Self::complete) counts.
/// Any later call panics.
pub struct Completion<T, E> {
    state: Arc<BatchState<T, E>>,
    index: usize,
}

impl<T, E> Clone for Completion<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            index: self.index,
        }
    }
}

impl<T, E> fmt::Debug for Completion<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("batch", &self.state.id)
            .field("index", &self.index)
            .field("state", &self.state())
            .finish()
    }
}

impl<T, E> Completion<T, E> {
    /// Position of the task in the batch
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn batch_id(&self) -> Uuid {
        self.state.id
    }

    pub fn state(&self) -> SlotState {
        SlotState::from(self.state.slots[self.index].load(Ordering::Acquire))
    }

    pub fn is_completed(&self) -> bool {
        self.state().is_terminal()
    }

    /// Record the task's outcome.
    ///
    /// # Panics
    ///
    /// If this task has already completed.
    #[track_caller]
    pub fn complete(&self, outcome: std::result::Result<T, E>) {
        if let Err(err) = self.try_complete(outcome) {
            error!(
                batch = %self.state.id,
                label = self.state.label(),
                index = self.index,
                "{}",
                err
            );
            panic!("{}", err);
        }
    }

    /// Record the task's outcome, returning `DoubleCompletion` instead of panicking
    /// if it was already recorded. A rejected outcome is dropped.
    pub fn try_complete(&self, outcome: std::result::Result<T, E>) -> Result<()> {
        self.state.record(self.index, outcome)
    }

    #[track_caller]
    pub fn succeed(&self, value: T) {
        self.complete(Ok(value))
    }

    #[track_caller]
    pub fn fail(&self, error: E) {
        self.complete(Err(error))
    }
}

/// Builder for one parallel batch
pub struct Batch {
    id: Uuid,
    label: Option<String>,
    log_task_events: bool,
    on_abandoned: Option<AbandonFn>,
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("log_task_events", &self.log_task_events)
            .field("on_abandoned", &self.on_abandoned.is_some())
            .finish()
    }
}

impl Batch {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            label: None,
            log_task_events: true,
            on_abandoned: None,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            label: config.label.clone(),
            log_task_events: config.log_task_events,
            ..Self::new()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn log_task_events(mut self, enabled: bool) -> Self {
        self.log_task_events = enabled;
        self
    }

    /// Called if every completion signal is dropped while tasks are still pending.
    /// Without it such a batch is only logged.
    pub fn on_abandoned<H>(mut self, hook: H) -> Self
    where
        H: FnOnce(ParallelError) + Send + 'static,
    {
        self.on_abandoned = Some(Box::new(hook));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Start every task in order and call `done` once all of them have completed.
    ///
    /// Tasks are started without waiting on each other; a task may complete
    /// inside its own call or later from any thread. `done` receives the
    /// results in input order, or the first error in completion order.
    /// Returns as soon as the last task has been started.
    pub fn run<I, F, T, E, D>(self, tasks: I, done: D)
    where
        I: IntoIterator<Item = F>,
        F: FnOnce(Completion<T, E>),
        T: Send + 'static,
        E: Send + 'static,
        D: FnOnce(std::result::Result<Vec<T>, E>) + Send + 'static,
    {
        let tasks: Vec<F> = tasks.into_iter().collect();
        let total = tasks.len();
        let label = self.label.as_deref().unwrap_or("-");

        if total == 0 {
            info!(batch = %self.id, label, "Empty parallel batch, completing immediately");
            done(Ok(Vec::new()));
            return;
        }

        info!(batch = %self.id, label, total, "Starting parallel batch");

        let state = Arc::new(BatchState {
            id: self.id,
            label: self.label,
            log_task_events: self.log_task_events,
            total,
            slots: (0..total)
                .map(|_| AtomicU8::new(SlotState::Pending as u8))
                .collect(),
            remaining: AtomicUsize::new(total),
            outcomes: Mutex::new(Outcomes {
                results: (0..total).map(|_| None).collect(),
                first_error: None,
                done: Some(Box::new(done)),
            }),
            on_abandoned: Mutex::new(self.on_abandoned),
        });

        for (index, task) in tasks.into_iter().enumerate() {
            if state.log_task_events {
                debug!(batch = %state.id, label = state.label(), index, "Dispatching task");
            }
            task(Completion {
                state: Arc::clone(&state),
                index,
            });
        }
    }
}

/// Run `tasks` in parallel with an unlabeled batch. See [`Batch::run`].
pub fn parallel<I, F, T, E, D>(tasks: I, done: D)
where
    I: IntoIterator<Item = F>,
    F: FnOnce(Completion<T, E>),
    T: Send + 'static,
    E: Send + 'static,
    D: FnOnce(std::result::Result<Vec<T>, E>) + Send + 'static,
{
    Batch::new().run(tasks, done)
}
