use crate::executor::{Executor, SerialExecutor};
use parking_lot::{Condvar, Mutex};
use std::{
    cell::RefCell,
    fmt::Debug,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

static NEXT_QUEUE_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// The sections of each [RwQueue] currently held by this thread,
    /// innermost last.
    static HELD_SECTIONS: RefCell<Vec<(usize, Access)>> = RefCell::new(Vec::new());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

/// Bookkeeping for the reader-writer section. Every write, whether it
/// waits or not, is issued a ticket when it is submitted, and writes
/// enter the section strictly in ticket order.
struct Lane {
    next_ticket: u64,
    serving: u64,
    readers: usize,
    writing: bool,
    /// Runs asynchronous writes; spawned on the first
    /// [RwQueue::write()].
    worker: Option<SerialExecutor>,
}

impl Lane {
    fn issue(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    fn writes_pending(&self) -> bool {
        self.serving != self.next_ticket
    }
}

struct Shared {
    id: usize,
    name: String,
    lane: Mutex<Lane>,
    changed: Condvar,
}

impl Shared {
    fn is_held(&self) -> bool {
        HELD_SECTIONS.with(|held| held.borrow().iter().any(|(id, _)| *id == self.id))
    }

    /// Block until no write is running or pending, then join the
    /// readers.
    fn enter_read(&self) -> Section<'_> {
        let mut lane = self.lane.lock();
        while lane.writing || lane.writes_pending() {
            self.changed.wait(&mut lane);
        }
        lane.readers += 1;
        drop(lane);

        Section::enter(self, Access::Read)
    }

    /// Block until `ticket` is being served and every reader has left.
    fn enter_write(&self, ticket: u64) -> Section<'_> {
        let mut lane = self.lane.lock();
        while lane.serving != ticket || lane.readers > 0 {
            self.changed.wait(&mut lane);
        }
        lane.writing = true;
        drop(lane);

        Section::enter(self, Access::Write)
    }
}

/// Held for the duration of one piece of work inside the section.
/// Dropping it, including while unwinding, releases the section.
struct Section<'a> {
    shared: &'a Shared,
    access: Access,
}

impl<'a> Section<'a> {
    fn enter(shared: &'a Shared, access: Access) -> Self {
        HELD_SECTIONS.with(|held| held.borrow_mut().push((shared.id, access)));
        Section { shared, access }
    }
}

impl<'a> Drop for Section<'a> {
    fn drop(&mut self) {
        let id = self.shared.id;
        HELD_SECTIONS.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(index) = held.iter().rposition(|(held_id, _)| *held_id == id) {
                held.remove(index);
            }
        });

        let mut lane = self.shared.lane.lock();
        match self.access {
            Access::Read => lane.readers -= 1,
            Access::Write => {
                lane.writing = false;
                lane.serving += 1;
            }
        }
        drop(lane);
        self.shared.changed.notify_all();
    }
}

/// A reader-writer synchronization domain.
///
/// Any number of [read()](RwQueue::read()) calls may run concurrently,
/// while writes ([write()](RwQueue::write()) and
/// [write_and_wait()](RwQueue::write_and_wait())) run one at a time,
/// excluding all readers. Writes are applied in the order in which
/// they were called, regardless of whether the caller waits for
/// them: the call itself takes the write's place in line. Once a
/// write has been called, readers arriving afterwards wait for it.
///
/// Calling any of these methods from work which is already running
/// inside this queue on the same thread runs the nested work
/// immediately in place, without waiting for the section again. This
/// includes [write()](RwQueue::write()), which then completes before
/// it returns.
pub struct RwQueue {
    shared: Arc<Shared>,
}

impl RwQueue {
    pub fn new() -> Self {
        Self::with_name("rw-queue")
    }

    /// Create a queue whose asynchronous write worker thread is named
    /// after `name`.
    pub fn with_name<S: Into<String>>(name: S) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                lane: Mutex::new(Lane {
                    next_ticket: 0,
                    serving: 0,
                    readers: 0,
                    writing: false,
                    worker: None,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether the current thread is running work inside this queue.
    pub fn is_held_by_current_thread(&self) -> bool {
        self.shared.is_held()
    }

    /// Run `work` with shared access, blocking until it completes.
    pub fn read<R, F: FnOnce() -> R>(&self, work: F) -> R {
        if self.shared.is_held() {
            return work();
        }

        let _section = self.shared.enter_read();
        work()
    }

    /// Run `work` with exclusive access, blocking until it completes.
    pub fn write_and_wait<R, F: FnOnce() -> R>(&self, work: F) -> R {
        if self.shared.is_held() {
            return work();
        }

        let ticket = self.shared.lane.lock().issue();
        let _section = self.shared.enter_write(ticket);
        work()
    }

    /// Schedule `work` to run with exclusive access, without waiting
    /// for it. A panic in `work` is logged and does not affect later
    /// writes.
    pub fn write<F: FnOnce() + Send + 'static>(&self, work: F) {
        if self.shared.is_held() {
            return work();
        }

        let mut lane = self.shared.lane.lock();
        let ticket = lane.issue();

        if lane.worker.is_none() {
            match SerialExecutor::new(format!("{}-writer", self.shared.name)) {
                Ok(worker) => lane.worker = Some(worker),
                Err(error) => {
                    log::error!(
                        "unable to start writer for queue {:?}, writing synchronously: {}",
                        self.shared.name,
                        error
                    );
                    drop(lane);
                    let _section = self.shared.enter_write(ticket);
                    return work();
                }
            }
        }

        log::trace!("queue {:?} scheduled write #{}", self.shared.name, ticket);

        let shared = self.shared.clone();
        // Sending while holding the lane keeps the worker's jobs in
        // ticket order.
        if let Some(worker) = &lane.worker {
            worker.execute(Box::new(move || {
                let _section = shared.enter_write(ticket);
                work();
            }));
        }
    }
}

impl Default for RwQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for RwQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RwQueue({:?})", self.shared.name)
    }
}

#[cfg(test)]
mod tests {
    use super::RwQueue;
    use std::{
        panic::{self, AssertUnwindSafe},
        sync::{
            atomic::{AtomicBool, Ordering},
            mpsc, Arc, Mutex,
        },
        thread,
        time::Duration,
    };

    #[test]
    fn reads_run_concurrently() {
        let queue = Arc::new(RwQueue::new());
        let (entered_sender, entered_receiver) = mpsc::channel();
        let (release_sender, release_receiver) = mpsc::channel();

        let first = {
            let queue = queue.clone();
            thread::spawn(move || {
                queue.read(move || {
                    entered_sender.send(()).unwrap();
                    release_receiver.recv_timeout(Duration::from_secs(5)).is_ok()
                })
            })
        };

        let second = {
            let queue = queue.clone();
            thread::spawn(move || {
                queue.read(move || {
                    entered_receiver.recv().unwrap();
                    release_sender.send(()).unwrap();
                })
            })
        };

        second.join().unwrap();
        assert!(first.join().unwrap(), "second reader was blocked by the first");
    }

    #[test]
    fn writes_exclude_reads() {
        let queue = Arc::new(RwQueue::new());
        let writing = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                let writing = writing.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        queue.read(|| assert!(!writing.load(Ordering::SeqCst)));
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            queue.write_and_wait(|| {
                writing.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_micros(200));
                writing.store(false, Ordering::SeqCst);
            });
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn writes_apply_in_call_order() {
        let queue = RwQueue::with_name("ordering");
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let log = log.clone();
            queue.write(move || log.lock().unwrap().push(i));
        }

        let snapshot = queue.write_and_wait(|| log.lock().unwrap().clone());
        assert_eq!(snapshot, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn read_waits_for_pending_async_write() {
        let queue = RwQueue::new();
        let value = Arc::new(Mutex::new(0));

        {
            let value = value.clone();
            queue.write(move || {
                thread::sleep(Duration::from_millis(20));
                *value.lock().unwrap() = 1;
            });
        }

        assert_eq!(queue.read(|| *value.lock().unwrap()), 1);
    }

    #[test]
    fn nested_calls_run_in_place() {
        let queue = Arc::new(RwQueue::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        {
            let inner_queue = queue.clone();
            let log = log.clone();
            queue.write(move || {
                log.lock().unwrap().push("outer start");
                inner_queue.read(|| log.lock().unwrap().push("read"));
                {
                    let log = log.clone();
                    inner_queue.write(move || log.lock().unwrap().push("write"));
                }
                inner_queue.write_and_wait(|| log.lock().unwrap().push("write and wait"));
                log.lock().unwrap().push("outer end");
            });
        }

        queue.write_and_wait(|| {});
        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer start", "read", "write", "write and wait", "outer end"]
        );
    }

    #[test]
    fn nested_write_inside_read_runs_in_place() {
        let queue = RwQueue::new();
        let value = queue.read(|| queue.write_and_wait(|| 7));
        assert_eq!(value, 7);
    }

    #[test]
    fn panic_releases_section() {
        let queue = RwQueue::new();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            queue.write_and_wait(|| panic!("reducer failed"));
        }));
        assert!(result.is_err());
        assert!(!queue.is_held_by_current_thread());

        assert_eq!(queue.read(|| 1), 1);
        assert_eq!(queue.write_and_wait(|| 2), 2);
    }

    #[test]
    fn panicking_async_write_does_not_stall_the_lane() {
        let queue = RwQueue::new();
        queue.write(|| panic!("middleware failed"));

        let (sender, receiver) = mpsc::channel();
        queue.write(move || sender.send(()).unwrap());
        assert!(receiver.recv_timeout(Duration::from_secs(5)).is_ok());
        assert_eq!(queue.read(|| 3), 3);
    }

    #[test]
    fn held_marker_tracks_the_section() {
        let queue = RwQueue::new();
        assert!(!queue.is_held_by_current_thread());
        assert!(queue.read(|| queue.is_held_by_current_thread()));
        assert!(queue.write_and_wait(|| queue.is_held_by_current_thread()));
        assert!(!queue.is_held_by_current_thread());
    }
}
