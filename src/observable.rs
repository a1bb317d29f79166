use crate::{
    atomic::Atomic,
    disposable::{Disposable, DisposableGroup, DisposableId},
    executor::Executor,
    observer::{Observer, ObserverId},
};
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    fmt::Debug,
    sync::{Arc, Weak},
};

/// Subscribes a derived observable to its source. `None` means the
/// source is gone.
type Connect<T> = Box<dyn Fn(&Observable<T>) -> Option<Disposable> + Send + Sync>;

pub(crate) struct ObservableInner<T> {
    observers: Atomic<BTreeMap<ObserverId, Observer<T>>>,
    /// The upstream source, and one entry per live subscription.
    disposables: DisposableGroup,
    /// Set for derived observables, which only listen to their source
    /// while they have subscribers.
    connect: Option<Connect<T>>,
    /// Serializes connecting and disconnecting.
    connecting: Mutex<()>,
    connection: Mutex<Option<Disposable>>,
}

impl<T> ObservableInner<T> {
    fn new(connect: Option<Connect<T>>) -> Self {
        Self {
            observers: Atomic::new(BTreeMap::new()),
            disposables: DisposableGroup::new(),
            connect,
            connecting: Mutex::new(()),
            connection: Mutex::new(None),
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.disposables.is_disposed()
    }

    fn finish(&self) {
        self.disposables.dispose();
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            connection.dispose();
        }
    }

    /// Drop the source connection once the last subscriber has left.
    fn disconnect_if_unobserved(&self) {
        // A finishing observable releases its connection itself.
        if self.connect.is_none() || self.is_finished() {
            return;
        }

        let _connecting = self.connecting.lock();
        if !self.observers.with(BTreeMap::is_empty) {
            return;
        }
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            log::trace!("last subscriber left, disconnecting from source");
            connection.dispose();
        }
    }
}

impl<T: Clone + Send + 'static> ObservableInner<T> {
    fn publish(&self, value: T) {
        // Observers subscribing from here on miss this value.
        let observers: Vec<Observer<T>> = self
            .observers
            .with(|observers| observers.values().cloned().collect());

        if let Some((last, rest)) = observers.split_last() {
            for observer in rest {
                observer.update(value.clone());
            }
            last.update(value);
        }
    }
}

impl<T> Drop for ObservableInner<T> {
    fn drop(&mut self) {
        self.disposables.dispose();
        if let Some(connection) = self.connection.get_mut().take() {
            connection.dispose();
        }
    }
}

/// The publishing end of an [Observable], handed to the `wiring`
/// function of [Observable::create()].
///
/// A [Sink] does not keep its [Observable] alive: once the observable
/// has been dropped, sending does nothing.
pub struct Sink<T> {
    inner: Weak<ObservableInner<T>>,
}

impl<T> Sink<T> {
    /// End the observable: the upstream source and every subscription
    /// are disposed, and later subscriptions are disposed immediately.
    pub fn finish(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.finish();
        }
    }

    /// `true` once the observable has finished or been dropped.
    pub fn is_finished(&self) -> bool {
        self.inner.upgrade().map_or(true, |inner| inner.is_finished())
    }
}

impl<T: Clone + Send + 'static> Sink<T> {
    /// Deliver `value` to every current subscriber.
    pub fn send(&self, value: T) {
        if let Some(inner) = self.inner.upgrade() {
            inner.publish(value);
        }
    }
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Sink {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for Sink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sink(finished: {})", self.is_finished())
    }
}

/// A multicast source of values.
///
/// Each value sent into the observable (see [Sink]) is delivered to
/// every observer subscribed at that moment, once, in the order in
/// which the values were sent. The order in which different observers
/// receive the same value is unspecified.
///
/// Clones share the same subscribers. When the last clone is dropped,
/// or the observable is finished, the upstream source is disposed
/// and so is every subscription which is still live.
pub struct Observable<T> {
    pub(crate) inner: Arc<ObservableInner<T>>,
}

impl<T: 'static> Observable<T> {
    /// Create an observable, calling `wiring` once with the [Sink]
    /// values are sent through. The [Disposable] returned by `wiring`
    /// releases whatever is producing the values, and is disposed
    /// along with this observable.
    pub fn create<W>(wiring: W) -> Self
    where
        W: FnOnce(Sink<T>) -> Disposable,
    {
        let observable = Self::empty();
        let upstream = wiring(observable.sink());
        observable.retain_upstream(upstream);
        observable
    }

    /// An observable along with the [Sink] which drives it.
    pub fn subject() -> (Self, Sink<T>) {
        let observable = Self::empty();
        let sink = observable.sink();
        (observable, sink)
    }

    /// An observable which never produces a value.
    pub fn never() -> Self {
        Self::empty()
    }

    pub(crate) fn empty() -> Self {
        Observable {
            inner: Arc::new(ObservableInner::new(None)),
        }
    }

    /// An observable which calls `connect` to subscribe to its source
    /// when it gains its first subscriber, and disposes that connection
    /// when its last subscriber leaves. It finishes if `connect` reports
    /// that the source is gone.
    pub(crate) fn connectable<C>(connect: C) -> Self
    where
        C: Fn(&Observable<T>) -> Option<Disposable> + Send + Sync + 'static,
    {
        let connect: Connect<T> = Box::new(connect);
        Observable {
            inner: Arc::new(ObservableInner::new(Some(connect))),
        }
    }

    fn connect_if_observed(&self) {
        let connect = match &self.inner.connect {
            Some(connect) => connect,
            None => return,
        };

        let _connecting = self.inner.connecting.lock();
        if self.is_finished()
            || self.inner.connection.lock().is_some()
            || self.inner.observers.with(BTreeMap::is_empty)
        {
            return;
        }

        match connect(self) {
            Some(connection) => {
                let mut current = self.inner.connection.lock();
                if self.is_finished() {
                    drop(current);
                    connection.dispose();
                } else {
                    *current = Some(connection);
                }
            }
            None => self.finish(),
        }
    }

    pub(crate) fn sink(&self) -> Sink<T> {
        Sink {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Tie the lifetime of `upstream` to this observable.
    pub(crate) fn retain_upstream(&self, upstream: Disposable) {
        self.inner.disposables.add(upstream);
    }

    pub(crate) fn finish(&self) {
        self.inner.finish();
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.observers.with(BTreeMap::len)
    }

    /// Subscribe `observer`. The returned [Disposable] unsubscribes
    /// it; it does not keep this observable alive.
    pub fn subscribe<O: Into<Observer<T>>>(&self, observer: O) -> Disposable {
        self.subscribe_until(observer.into(), || {})
    }

    /// Subscribe a callback.
    pub fn subscribe_fn<F: Fn(T) + Send + Sync + 'static>(&self, callback: F) -> Disposable {
        self.subscribe(Observer::new(callback))
    }

    /// Subscribe `observer`, delivering values to it on `executor`.
    pub fn subscribe_on<O: Into<Observer<T>>>(
        &self,
        executor: Arc<dyn Executor>,
        observer: O,
    ) -> Disposable
    where
        T: Send,
    {
        self.subscribe(observer.into().redirect(executor))
    }

    /// Subscribe `observer`, running `on_end` once the subscription
    /// ends, whether it was disposed directly or this observable
    /// finished or was dropped.
    pub(crate) fn subscribe_until<F>(&self, observer: Observer<T>, on_end: F) -> Disposable
    where
        F: FnOnce() + Send + 'static,
    {
        let observer_id = observer.id();
        let id = DisposableId::next();
        let weak = Arc::downgrade(&self.inner);

        let disposable = Disposable::with_id(id, move || {
            if let Some(inner) = weak.upgrade() {
                inner.observers.modify(|observers| {
                    observers.remove(&observer_id);
                });
                inner.disposables.remove_id(id);
                inner.disconnect_if_unobserved();
            }
            on_end();
        });

        self.inner.observers.modify(|observers| {
            observers.insert(observer_id, observer);
        });
        // Disposed right away if this observable has already finished.
        self.inner.disposables.add(disposable.clone());
        self.connect_if_observed();

        log::trace!("observer {:?} subscribed as {:?}", observer_id, id);
        disposable
    }
}

impl<T: Clone + Send + 'static> Observable<T> {
    pub(crate) fn publish(&self, value: T) {
        self.inner.publish(value);
    }
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Observable {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PartialEq for Observable<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("subscribers", &self.subscriber_count())
            .field("finished", &self.is_finished())
            .finish()
    }
}
