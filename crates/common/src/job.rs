//! Work-in-progress handles for jobs running on the rayon worker pool.
//!
//! A [`JobHandle`] is the only way to observe a scheduled build or query:
//! wait on it with [`JobHandle::complete`], poll it with
//! [`JobHandle::is_completed`], or chain dependent work with
//! [`JobHandle::then`]. Chaining never blocks a worker; the continuation is
//! spawned by whichever side finishes last.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Errors surfaced when waiting on a job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job panicked: {0}")]
    Panicked(String),
    #[error("job result was already consumed")]
    Disconnected,
}

impl JobError {
    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        JobError::Panicked(message)
    }
}

type Continuation<T> = Box<dyn FnOnce(Result<T, JobError>) + Send>;

enum State<T> {
    Pending(Option<Continuation<T>>),
    Done(Result<T, JobError>),
    Taken,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    done: Condvar,
}

impl<T: Send + 'static> Shared<T> {
    fn pending() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::Pending(None)),
            done: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, result: Result<T, JobError>) {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, State::Taken) {
            State::Pending(Some(continuation)) => {
                drop(state);
                continuation(result);
            }
            State::Pending(None) => {
                *state = State::Done(result);
                drop(state);
                self.done.notify_all();
            }
            // A job finishes exactly once.
            other => *state = other,
        }
    }
}

/// Handle to a job scheduled on the worker pool.
#[must_use = "a scheduled job should be completed or chained"]
pub struct JobHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> JobHandle<T> {
    /// Schedule `job` on the rayon pool.
    pub fn spawn<F>(job: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let shared = Shared::pending();
        let worker_side = Arc::clone(&shared);
        rayon::spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(job)).map_err(JobError::from_panic);
            worker_side.finish(result);
        });
        Self { shared }
    }

    /// A handle whose work is already done.
    pub fn completed(value: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Done(Ok(value))),
                done: Condvar::new(),
            }),
        }
    }

    /// True once the job has finished and its result has not been taken.
    pub fn is_completed(&self) -> bool {
        matches!(*self.shared.lock(), State::Done(_))
    }

    /// Block until the job finishes and take its result.
    ///
    /// On a pool worker the wait keeps executing other pool jobs, so the job
    /// being waited on can still run there.
    pub fn complete(self) -> Result<T, JobError> {
        let mut state = self.shared.lock();
        if rayon::current_thread_index().is_some() {
            while matches!(*state, State::Pending(_)) {
                drop(state);
                if let Some(rayon::Yield::Idle) = rayon::yield_now() {
                    std::thread::yield_now();
                }
                state = self.shared.lock();
            }
        } else {
            while matches!(*state, State::Pending(_)) {
                state = self
                    .shared
                    .done
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        match std::mem::replace(&mut *state, State::Taken) {
            State::Done(result) => result,
            _ => Err(JobError::Disconnected),
        }
    }

    /// Schedule `next` to run on the pool once this job has finished.
    ///
    /// If this job panicked, `next` is skipped and the returned handle
    /// reports the original panic.
    pub fn then<U, F>(self, next: F) -> JobHandle<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let downstream = Shared::pending();
        let downstream_side = Arc::clone(&downstream);
        let continuation: Continuation<T> = Box::new(move |result: Result<T, JobError>| {
            rayon::spawn(move || {
                let out = result.and_then(|value| {
                    catch_unwind(AssertUnwindSafe(|| next(value))).map_err(JobError::from_panic)
                });
                downstream_side.finish(out);
            });
        });

        let mut state = self.shared.lock();
        match std::mem::replace(&mut *state, State::Taken) {
            State::Pending(_) => *state = State::Pending(Some(continuation)),
            State::Done(result) => {
                drop(state);
                continuation(result);
            }
            State::Taken => {
                drop(state);
                continuation(Err(JobError::Disconnected));
            }
        }
        JobHandle { shared: downstream }
    }
}

/// Run `op` on a pool worker and block the caller until it returns.
pub fn run_on_worker<R, F>(op: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    let mut out = None;
    rayon::scope(|s| s.spawn(|_| out = Some(op())));
    match out {
        Some(value) => value,
        None => unreachable!("scoped task completes before rayon::scope returns"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn spawned_job_completes_with_value() {
        let handle = JobHandle::spawn(|| 21 * 2);
        assert_eq!(handle.complete().unwrap(), 42);
    }

    #[test]
    fn completed_handle_is_immediately_done() {
        let handle = JobHandle::completed("ready");
        assert!(handle.is_completed());
        assert_eq!(handle.complete().unwrap(), "ready");
    }

    #[test]
    fn then_chains_in_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&counter);
        let c2 = Arc::clone(&counter);
        let handle = JobHandle::spawn(move || c1.fetch_add(1, Ordering::SeqCst))
            .then(move |first| (first, c2.fetch_add(1, Ordering::SeqCst)));
        assert_eq!(handle.complete().unwrap(), (0, 1));
    }

    #[test]
    fn then_on_completed_handle_runs() {
        let handle = JobHandle::completed(3).then(|v| v + 1).then(|v| v * 10);
        assert_eq!(handle.complete().unwrap(), 40);
    }

    #[test]
    fn panic_is_reported_and_skips_continuation() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        let handle = JobHandle::spawn(|| -> u32 { panic!("boom") }).then(move |v| {
            ran2.fetch_add(1, Ordering::SeqCst);
            v
        });
        match handle.complete() {
            Err(JobError::Panicked(msg)) => assert!(msg.contains("boom")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn complete_on_a_busy_worker_runs_the_job_itself() {
        let pool = match rayon::ThreadPoolBuilder::new().num_threads(1).build() {
            Ok(pool) => pool,
            Err(err) => panic!("pool: {err}"),
        };
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let outer = pool.install(|| {
                let inner = JobHandle::spawn(|| 7).complete();
                inner.map(|v| v * 6)
            });
            let _ = tx.send(outer);
        });
        let result = rx
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("complete() on the only worker never returned");
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn nested_scheduled_jobs_complete_on_the_pool() {
        let outer = JobHandle::spawn(|| {
            let handles: Vec<JobHandle<usize>> =
                (0..32).map(|i| JobHandle::spawn(move || i * 2)).collect();
            handles
                .into_iter()
                .map(|h| h.complete().unwrap())
                .sum::<usize>()
        });
        assert_eq!(outer.complete().unwrap(), (0..32).map(|i| i * 2).sum());
    }

    #[test]
    fn run_on_worker_returns_borrowed_result() {
        let data = vec![1, 2, 3];
        let sum = run_on_worker(|| data.iter().sum::<i32>());
        assert_eq!(sum, 6);
    }
}
