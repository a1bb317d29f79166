//! Execution contexts which [Observer](crate::Observer)s and
//! [RwQueue](crate::RwQueue) write lanes deliver work onto.

use parking_lot::Mutex;
use std::{
    any::Any,
    fmt::Debug,
    io,
    panic::{self, AssertUnwindSafe},
    sync::mpsc,
    thread,
};

/// A unit of work submitted to an [Executor].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// An execution context which runs submitted [Job]s, possibly on
/// another thread. Submission never waits for the job to run.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs every job immediately on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateExecutor;

impl Executor for ImmediateExecutor {
    fn execute(&self, job: Job) {
        job()
    }
}

/// An [Executor] backed by one dedicated worker thread, running jobs
/// one at a time in submission order.
///
/// A job which panics is logged and does not stop the worker.
/// Dropping the executor lets the worker finish the jobs already
/// queued, after which the thread exits.
pub struct SerialExecutor {
    name: String,
    sender: Mutex<mpsc::Sender<Job>>,
}

impl SerialExecutor {
    /// Spawn the worker thread, named `name`.
    pub fn new<S: Into<String>>(name: S) -> io::Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();

        let worker_name = name.clone();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for job in receiver {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                        log::error!(
                            "job on executor {:?} panicked: {}",
                            worker_name,
                            panic_message(&*payload)
                        );
                    }
                }
                log::trace!("executor {:?} stopped", worker_name);
            })?;

        Ok(Self {
            name,
            sender: Mutex::new(sender),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Executor for SerialExecutor {
    fn execute(&self, job: Job) {
        if self.sender.lock().send(job).is_err() {
            log::warn!("executor {:?} is no longer running, job dropped", self.name);
        }
    }
}

impl Debug for SerialExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SerialExecutor({:?})", self.name)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::{Executor, ImmediateExecutor, SerialExecutor};
    use std::sync::{mpsc, Arc, Mutex};

    #[test]
    fn immediate_runs_in_place() {
        let ran = Arc::new(Mutex::new(false));
        let ran_copy = ran.clone();
        ImmediateExecutor.execute(Box::new(move || *ran_copy.lock().unwrap() = true));
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn serial_runs_in_submission_order() {
        let executor = SerialExecutor::new("serial-test").unwrap();
        let (sender, receiver) = mpsc::channel();

        for i in 0..100 {
            let sender = sender.clone();
            executor.execute(Box::new(move || sender.send(i).unwrap()));
        }

        let received: Vec<i32> = receiver.iter().take(100).collect();
        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn serial_survives_panicking_job() {
        let executor = SerialExecutor::new("serial-panic-test").unwrap();
        let (sender, receiver) = mpsc::channel();

        executor.execute(Box::new(|| panic!("boom")));
        executor.execute(Box::new(move || sender.send("after").unwrap()));

        assert_eq!(receiver.recv().unwrap(), "after");
    }

    #[test]
    fn serial_runs_on_named_thread() {
        let executor = SerialExecutor::new("named-worker").unwrap();
        let (sender, receiver) = mpsc::channel();
        executor.execute(Box::new(move || {
            let name = std::thread::current().name().map(String::from);
            sender.send(name).unwrap();
        }));
        assert_eq!(receiver.recv().unwrap().as_deref(), Some("named-worker"));
        assert_eq!(executor.name(), "named-worker");
    }
}
