//! [Middleware] used to intercept actions between
//! [Store::dispatch()](crate::Store::dispatch()) and the
//! [Reducer](crate::Reducer). This module also contains some simple
//! middleware implementations which can be used as utilities in an
//! application.

#[cfg(feature = "serde_logger")]
pub mod serde_logger;
pub mod simple_logger;

use std::{fmt::Debug, sync::Arc};

/// A callback which sends an `Action` onwards, either to the next
/// [Middleware] in the chain, back to the start of the chain, or to
/// the [Reducer](crate::Reducer).
pub struct Dispatch<Action>(Arc<dyn Fn(Action) + Send + Sync>);

impl<Action> Dispatch<Action> {
    pub fn new<F: Fn(Action) + Send + Sync + 'static>(f: F) -> Self {
        Dispatch(Arc::new(f))
    }

    pub fn dispatch(&self, action: Action) {
        (self.0)(action)
    }
}

impl<Action> Clone for Dispatch<Action> {
    fn clone(&self) -> Self {
        Dispatch(self.0.clone())
    }
}

impl<Action> Debug for Dispatch<Action> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Dispatch(function @ {:p})", Arc::as_ptr(&self.0))
    }
}

impl<F, Action> From<F> for Dispatch<Action>
where
    F: Fn(Action) + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Dispatch::new(f)
    }
}

/// A callback which reads the current state of a
/// [Store](crate::Store), or `None` if the store no longer exists.
pub struct GetState<State>(Arc<dyn Fn() -> Option<State> + Send + Sync>);

impl<State> GetState<State> {
    pub fn new<F: Fn() -> Option<State> + Send + Sync + 'static>(f: F) -> Self {
        GetState(Arc::new(f))
    }

    pub fn get(&self) -> Option<State> {
        (self.0)()
    }
}

impl<State> Clone for GetState<State> {
    fn clone(&self) -> Self {
        GetState(self.0.clone())
    }
}

impl<State> Debug for GetState<State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GetState(function @ {:p})", Arc::as_ptr(&self.0))
    }
}

/// `Middleware` used to modify the behaviour of a
/// [Store](crate::Store) during a
/// [Store::dispatch()](crate::Store::dispatch()).
///
/// Middleware is applied once, when the store is built, producing the
/// [Dispatch] which every action submitted to the store is sent
/// through. The first middleware given to the
/// [StoreBuilder](crate::StoreBuilder) is outermost: it sees each
/// action first, and regains control last.
///
/// Any `Fn(GetState, Dispatch, Dispatch) -> Dispatch` closure is a
/// [Middleware].
pub trait Middleware<State, Action>: Send + Sync {
    /// Wrap `next`, returning the [Dispatch] which this middleware
    /// contributes to the chain.
    ///
    /// + `get_state` reads the store's current state.
    /// + `dispatch` sends a new action through the whole chain,
    ///   starting again from the outermost middleware.
    /// + `next` sends an action on to the following middleware, and
    ///   eventually the [Reducer](crate::Reducer). An action which is
    ///   never passed to `next` is never reduced.
    fn apply(
        &self,
        get_state: GetState<State>,
        dispatch: Dispatch<Action>,
        next: Dispatch<Action>,
    ) -> Dispatch<Action>;
}

impl<F, State, Action> Middleware<State, Action> for F
where
    F: Fn(GetState<State>, Dispatch<Action>, Dispatch<Action>) -> Dispatch<Action> + Send + Sync,
{
    fn apply(
        &self,
        get_state: GetState<State>,
        dispatch: Dispatch<Action>,
        next: Dispatch<Action>,
    ) -> Dispatch<Action> {
        self(get_state, dispatch, next)
    }
}

/// Nest `middleware` around `terminal`, the first middleware ending
/// up outermost.
pub(crate) fn compose<State, Action>(
    middleware: &[Box<dyn Middleware<State, Action>>],
    get_state: &GetState<State>,
    dispatch: &Dispatch<Action>,
    terminal: Dispatch<Action>,
) -> Dispatch<Action> {
    middleware.iter().rev().fold(terminal, |next, middleware| {
        middleware.apply(get_state.clone(), dispatch.clone(), next)
    })
}
