use crate::executor::Executor;
use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(0);

/// The identity of an [Observer], shared by all of its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

struct ObserverInner<T> {
    id: ObserverId,
    deliver: Box<dyn Fn(T) + Send + Sync>,
    executor: Option<Arc<dyn Executor>>,
}

/// A callback which receives values from an
/// [Observable](crate::Observable).
///
/// An observer created with an [Executor] hands every value to that
/// executor and returns straight away; otherwise the callback runs on
/// the thread calling [Observer::update()]. Two observers are equal
/// only if one is a clone of the other.
pub struct Observer<T> {
    inner: Arc<ObserverInner<T>>,
}

impl<T> Observer<T> {
    pub fn new<C: Fn(T) + Send + Sync + 'static>(callback: C) -> Self {
        Self::build(Box::new(callback), None)
    }

    /// Create an observer whose callback runs on `executor`.
    pub fn on<C: Fn(T) + Send + Sync + 'static>(executor: Arc<dyn Executor>, callback: C) -> Self {
        Self::build(Box::new(callback), Some(executor))
    }

    fn build(deliver: Box<dyn Fn(T) + Send + Sync>, executor: Option<Arc<dyn Executor>>) -> Self {
        Observer {
            inner: Arc::new(ObserverInner {
                id: ObserverId(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed)),
                deliver,
                executor,
            }),
        }
    }

    pub fn id(&self) -> ObserverId {
        self.inner.id
    }

    pub fn executor(&self) -> Option<&Arc<dyn Executor>> {
        self.inner.executor.as_ref()
    }
}

impl<T: Send + 'static> Observer<T> {
    /// A new observer, with its own identity, which delivers to this
    /// one by way of `executor`.
    pub fn redirect(&self, executor: Arc<dyn Executor>) -> Observer<T> {
        let target = self.clone();
        Observer::on(executor, move |value| target.update(value))
    }

    /// Deliver `value`.
    pub fn update(&self, value: T) {
        match &self.inner.executor {
            Some(executor) => {
                let inner = self.inner.clone();
                executor.execute(Box::new(move || (inner.deliver)(value)));
            }
            None => (self.inner.deliver)(value),
        }
    }
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Observer {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PartialEq for Observer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<T> Eq for Observer<T> {}

impl<T> Debug for Observer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.inner.id)
            .field("redirected", &self.inner.executor.is_some())
            .finish()
    }
}

impl<C, T> From<C> for Observer<T>
where
    C: Fn(T) + Send + Sync + 'static,
{
    fn from(callback: C) -> Self {
        Observer::new(callback)
    }
}
