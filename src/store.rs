use crate::{
    atomic::Atomic,
    disposable::Disposable,
    executor::Executor,
    middleware::{self, Dispatch, GetState, Middleware},
    observable::Observable,
    observer::Observer,
    queue::RwQueue,
    Reducer,
};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fmt::Debug,
    ops::Deref,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    thread,
};

/// A wrapper for an [Arc] reference to a [Store].
///
/// This wrapper exists to provide a standard interface for re-useable
/// middleware and other components which may require a long living
/// reference to the store in order to dispatch actions or subscribe
/// to it from other threads.
pub struct StoreRef<State, Action>(Arc<Store<State, Action>>);

impl<State, Action> Deref for StoreRef<State, Action> {
    type Target = Store<State, Action>;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl<State, Action> Clone for StoreRef<State, Action> {
    fn clone(&self) -> Self {
        StoreRef(self.0.clone())
    }
}

impl<State, Action> PartialEq for StoreRef<State, Action> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<State: Debug, Action> Debug for StoreRef<State, Action> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Configures and creates a [Store].
pub struct StoreBuilder<State, Action> {
    reducer: Box<dyn Reducer<State, Action>>,
    initial_state: State,
    middleware: Vec<Box<dyn Middleware<State, Action>>>,
    queue_name: String,
}

impl<State, Action> StoreBuilder<State, Action>
where
    State: Clone + Send + Sync + 'static,
    Action: Send + 'static,
{
    /// Start configuring a [Store] which uses `reducer` to handle
    /// `Action`s, starting from `initial_state`.
    pub fn new<R: Reducer<State, Action> + 'static>(reducer: R, initial_state: State) -> Self {
        Self {
            reducer: Box::new(reducer),
            initial_state,
            middleware: Vec::new(),
            queue_name: "store".to_string(),
        }
    }

    /// Add [Middleware] to the dispatch chain. Middleware added first
    /// sees each action first.
    pub fn middleware<M: Middleware<State, Action> + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    /// Name the store's [RwQueue], and with it the thread which runs
    /// actions submitted with [Store::dispatch()].
    pub fn queue_name<S: Into<String>>(mut self, name: S) -> Self {
        self.queue_name = name.into();
        self
    }

    pub fn build(self) -> StoreRef<State, Action> {
        let StoreBuilder {
            reducer,
            initial_state,
            middleware: layers,
            queue_name,
        } = self;

        let store = Arc::new_cyclic(|this: &Weak<Store<State, Action>>| {
            let get_state = {
                let this = this.clone();
                GetState::new(move || this.upgrade().map(|store| store.state()))
            };
            let dispatch = {
                let this = this.clone();
                Dispatch::new(move |action: Action| {
                    if let Some(store) = this.upgrade() {
                        store.dispatch_impl(action);
                    }
                })
            };
            let terminal = {
                let this = this.clone();
                Dispatch::new(move |action: Action| {
                    if let Some(store) = this.upgrade() {
                        store.reduce_and_notify(action);
                    }
                })
            };

            let chain = middleware::compose(&layers, &get_state, &dispatch, terminal);
            log::debug!(
                "store {:?} built with {} middleware",
                queue_name,
                layers.len()
            );

            Store {
                queue: RwQueue::with_name(queue_name),
                state: Atomic::new(initial_state),
                reducer,
                chain,
                observable: Observable::empty(),
                reducing: AtomicBool::new(false),
                dispatch_queue: Mutex::new(VecDeque::new()),
            }
        });

        StoreRef(store)
    }
}

/// How [Store::subscribe_with()] delivers state to a subscriber.
#[derive(Clone)]
pub struct SubscribeOptions {
    executor: Option<Arc<dyn Executor>>,
    include_current_state: bool,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver every state on `executor`, rather than on the thread
    /// which applied the action.
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Whether to deliver the state current at the moment of
    /// subscription before any later change. Defaults to `true`.
    pub fn include_current_state(mut self, include_current_state: bool) -> Self {
        self.include_current_state = include_current_state;
        self
    }

    fn observer<State, F>(&self, callback: F) -> Observer<State>
    where
        State: Send + 'static,
        F: Fn(State) + Send + Sync + 'static,
    {
        match &self.executor {
            Some(executor) => Observer::on(executor.clone(), callback),
            None => Observer::new(callback),
        }
    }
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            executor: None,
            include_current_state: true,
        }
    }
}

impl Debug for SubscribeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("executor", &self.executor.is_some())
            .field("include_current_state", &self.include_current_state)
            .finish()
    }
}

/// This struct is designed to operate as a central source of truth
/// and global "immutable" state within your application.
///
/// The current state of this store ([Store::state()]) can only be
/// modified by dispatching an `Action` via [Store::dispatch()] or
/// [Store::dispatch_and_wait()]. Each action travels through the
/// [Middleware] chain configured with the [StoreBuilder], and is
/// then taken by the [Reducer] to produce the new current state,
/// which is delivered to every subscriber.
///
/// Actions are applied one at a time, in the order in which they
/// were dispatched, even when dispatched from several threads.
/// Reading the state waits for every action dispatched before the
/// read, and never observes an action half applied.
///
/// Subscribers are notified with [Store::subscribe()] and friends, or
/// through the store's [Observable] ([Store::observable()]).
pub struct Store<State, Action> {
    queue: RwQueue,
    state: Atomic<State>,
    reducer: Box<dyn Reducer<State, Action>>,
    /// The composed middleware, ending with
    /// [Store::reduce_and_notify()].
    chain: Dispatch<Action>,
    observable: Observable<State>,
    /// Set while the reducer runs and the new state is published.
    reducing: AtomicBool,
    /// Actions dispatched while `reducing`, by the reducer or by a
    /// synchronous subscriber, to be applied once publishing is done.
    dispatch_queue: Mutex<VecDeque<Action>>,
}

/// Clears [Store::reducing] on drop. Unwinding from a panic in the
/// reducer or a subscriber also discards the queued actions.
struct Reducing<'a, Action> {
    flag: &'a AtomicBool,
    dispatch_queue: &'a Mutex<VecDeque<Action>>,
}

impl<'a, Action> Reducing<'a, Action> {
    fn start(flag: &'a AtomicBool, dispatch_queue: &'a Mutex<VecDeque<Action>>) -> Self {
        flag.store(true, Ordering::Release);
        Reducing {
            flag,
            dispatch_queue,
        }
    }
}

impl<Action> Drop for Reducing<'_, Action> {
    fn drop(&mut self) {
        if thread::panicking() {
            let discarded = std::mem::take(&mut *self.dispatch_queue.lock());
            if !discarded.is_empty() {
                log::warn!("discarding {} actions queued before a panic", discarded.len());
            }
        }
        self.flag.store(false, Ordering::Release);
    }
}

impl<State, Action> Store<State, Action>
where
    State: Clone + Send + Sync + 'static,
    Action: Send + 'static,
{
    /// Get a snapshot of the current `State` stored in this store.
    ///
    /// Modifications to this state need to be performed by
    /// dispatching an `Action` to the store using
    /// [dispatch()](Store::dispatch()).
    pub fn state(&self) -> State {
        self.queue.read(|| self.state.get())
    }

    /// An [Observable] which publishes every new state.
    pub fn observable(&self) -> Observable<State> {
        self.observable.clone()
    }

    /// Dispatch an `Action` to be passed through the middleware to
    /// the [Reducer], without waiting for it to be applied.
    ///
    /// Dispatching from within middleware applies the action
    /// immediately, before this method returns. Dispatching from the
    /// reducer, or from a subscriber notified synchronously by this
    /// store, queues the action until every subscriber has received
    /// the state being published. It is then applied before the
    /// dispatch which produced that state returns.
    pub fn dispatch<A: Into<Action>>(&self, action: A) {
        self.dispatch_impl(action.into());
    }

    /// Concrete version of [Store::dispatch()], so that the queued
    /// closure is not generated once per type which implements
    /// `Into<Action>`.
    fn dispatch_impl(&self, action: Action) {
        let action = match self.queue_if_reducing(action) {
            Some(action) => action,
            None => return,
        };
        log::trace!("store {:?} dispatching action", self.queue.name());
        let chain = self.chain.clone();
        self.queue.write(move || chain.dispatch(action));
    }

    /// Dispatch an `Action`, blocking until it has been through the
    /// middleware, been applied, and every synchronous subscriber has
    /// been notified.
    ///
    /// A panic in a middleware or the reducer propagates to the
    /// caller; the store remains usable, with whatever state the last
    /// completed action left it in.
    ///
    /// Called from the reducer or a synchronous subscriber, this
    /// behaves like [Store::dispatch()] and returns without waiting.
    pub fn dispatch_and_wait<A: Into<Action>>(&self, action: A) {
        let action = match self.queue_if_reducing(action.into()) {
            Some(action) => action,
            None => return,
        };
        log::trace!("store {:?} dispatching action (waiting)", self.queue.name());
        self.queue.write_and_wait(|| self.chain.dispatch(action));
    }

    /// Hold back `action` if this thread is inside
    /// [Store::reduce_and_notify()], returning it otherwise.
    fn queue_if_reducing(&self, action: Action) -> Option<Action> {
        if self.reducing.load(Ordering::Acquire) && self.queue.is_held_by_current_thread() {
            log::trace!("store {:?} queued action dispatched while reducing", self.queue.name());
            self.dispatch_queue.lock().push_back(action);
            None
        } else {
            Some(action)
        }
    }

    /// The bottom of the middleware chain: apply the reducer, store
    /// the result, and publish it, all inside one write section. Then
    /// run the actions which were dispatched meanwhile through the
    /// whole chain, in order.
    fn reduce_and_notify(&self, action: Action) {
        self.queue.write_and_wait(|| {
            {
                let _reducing = Reducing::start(&self.reducing, &self.dispatch_queue);
                let prev_state = self.state.get();
                let next_state = self.reducer.reduce(&prev_state, &action);
                self.state.set(next_state.clone());
                self.observable.publish(next_state);
            }

            loop {
                let queued = self.dispatch_queue.lock().pop_front();
                match queued {
                    Some(action) => self.chain.dispatch(action),
                    None => break,
                }
            }
        });
    }

    /// Subscribe `callback` to changes in the store state, calling it
    /// immediately with the current state.
    pub fn subscribe<F: Fn(State) + Send + Sync + 'static>(&self, callback: F) -> Disposable {
        self.subscribe_with(SubscribeOptions::default(), callback)
    }

    /// Subscribe `callback` to changes in the store state, configured
    /// by `options`.
    ///
    /// No action can be applied between reading the current state
    /// and registering `callback`, so when the current state is
    /// included, the callback misses nothing and sees nothing twice.
    pub fn subscribe_with<F>(&self, options: SubscribeOptions, callback: F) -> Disposable
    where
        F: Fn(State) + Send + Sync + 'static,
    {
        let observer = options.observer(callback);
        let subscription = self.queue.read(|| {
            if options.include_current_state {
                observer.update(self.state.get());
            }
            self.observable.subscribe(observer)
        });

        log::debug!(
            "store {:?} subscribed {:?}",
            self.queue.name(),
            subscription.id()
        );
        subscription
    }
}

impl<State, Action> Store<State, Action>
where
    State: Clone + PartialEq + Send + Sync + 'static,
    Action: Send + 'static,
{
    /// Like [Store::subscribe_with()], but `callback` is only called
    /// when the state differs from the last one it was given. The
    /// state current at the moment of subscription counts as given,
    /// whether or not it is delivered.
    pub fn subscribe_distinct<F>(&self, options: SubscribeOptions, callback: F) -> Disposable
    where
        F: Fn(State) + Send + Sync + 'static,
    {
        let observer = options.observer(callback);
        let subscription = self.queue.read(|| {
            let current = self.state.get();
            if options.include_current_state {
                observer.update(current.clone());
            }

            self.observable
                .skip_repeats_from(Some(current), |a: &State, b: &State| a == b)
                .subscribe(observer)
        });

        log::debug!(
            "store {:?} subscribed {:?} to distinct states",
            self.queue.name(),
            subscription.id()
        );
        subscription
    }
}

impl<State: Debug, Action> Debug for Store<State, Action> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("queue", &self.queue)
            .field("state", &self.state)
            .finish()
    }
}
