//! Actions which bundle an ordered list of other actions.
//!
//! A batch can be unfolded by the reducer, with [BatchReducer], so the
//! whole batch is applied in one step and subscribers see only the
//! final state; or by the middleware, with [BatchMiddleware], so each
//! child is dispatched on its own and every middleware sees it. Use
//! one or the other: with both, each child would be applied twice.

use crate::{
    middleware::{Dispatch, GetState, Middleware},
    Reducer,
};

/// An `Action` which may be a batch of child actions.
pub trait BatchAction: Sized {
    /// The children of this action, in order, if it is a batch.
    fn batch(&self) -> Option<&[Self]>;
}

/// Wraps a [Reducer], applying it to each action in a batch in
/// order. Nested batches are unfolded depth-first.
pub struct BatchReducer<R> {
    reducer: R,
}

impl<R> BatchReducer<R> {
    pub fn new(reducer: R) -> Self {
        Self { reducer }
    }
}

impl<State, Action, R> Reducer<State, Action> for BatchReducer<R>
where
    State: Clone,
    Action: BatchAction,
    R: Reducer<State, Action>,
{
    fn reduce(&self, prev_state: &State, action: &Action) -> State {
        match action.batch() {
            Some(children) => children
                .iter()
                .fold(prev_state.clone(), |state, child| self.reduce(&state, child)),
            None => self.reducer.reduce(prev_state, action),
        }
    }
}

/// [Middleware] which dispatches each child of a batch back through
/// the whole middleware chain, in order, and passes every other action
/// on unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchMiddleware;

impl<State, Action> Middleware<State, Action> for BatchMiddleware
where
    Action: BatchAction + Clone + 'static,
{
    fn apply(
        &self,
        _get_state: GetState<State>,
        dispatch: Dispatch<Action>,
        next: Dispatch<Action>,
    ) -> Dispatch<Action> {
        Dispatch::new(move |action: Action| match action.batch() {
            Some(children) => {
                log::trace!("unfolding batch of {} actions", children.len());
                for child in children {
                    dispatch.dispatch(child.clone());
                }
            }
            None => next.dispatch(action),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{BatchAction, BatchMiddleware, BatchReducer};
    use crate::{Reducer, StoreBuilder};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Step {
        Apply(&'static str),
        Batch(Vec<Step>),
    }

    impl BatchAction for Step {
        fn batch(&self) -> Option<&[Self]> {
            match self {
                Step::Batch(children) => Some(children.as_slice()),
                Step::Apply(_) => None,
            }
        }
    }

    fn record(state: &Vec<&'static str>, action: &Step) -> Vec<&'static str> {
        let mut state = state.clone();
        if let Step::Apply(name) = action {
            state.push(*name);
        }
        state
    }

    fn nested() -> Step {
        Step::Batch(vec![
            Step::Apply("a"),
            Step::Batch(vec![
                Step::Apply("b"),
                Step::Batch(vec![Step::Apply("c"), Step::Apply("d")]),
            ]),
            Step::Apply("e"),
        ])
    }

    #[test]
    fn reducer_unfolds_depth_first() {
        let reducer = BatchReducer::new(record);
        assert_eq!(
            reducer.reduce(&Vec::new(), &nested()),
            vec!["a", "b", "c", "d", "e"]
        );
    }

    #[test]
    fn reducer_passes_plain_actions_through() {
        let reducer = BatchReducer::new(record);
        assert_eq!(reducer.reduce(&vec!["x"], &Step::Apply("y")), vec!["x", "y"]);
        assert_eq!(reducer.reduce(&vec!["x"], &Step::Batch(Vec::new())), vec!["x"]);
    }

    #[test]
    fn batch_reducer_notifies_once() {
        let store = StoreBuilder::new(BatchReducer::new(record), Vec::new()).build();
        let notified = Arc::new(Mutex::new(Vec::new()));
        let notified_copy = notified.clone();
        let _subscription = store.subscribe(move |state: Vec<&'static str>| {
            notified_copy.lock().unwrap().push(state.len())
        });

        store.dispatch_and_wait(nested());
        assert_eq!(*notified.lock().unwrap(), vec![0, 5]);
    }

    #[test]
    fn middleware_dispatches_each_child() {
        let store = StoreBuilder::new(record, Vec::new())
            .middleware(BatchMiddleware)
            .build();
        let notified = Arc::new(Mutex::new(Vec::new()));
        let notified_copy = notified.clone();
        let _subscription = store.subscribe(move |state: Vec<&'static str>| {
            notified_copy.lock().unwrap().push(state.len())
        });

        store.dispatch_and_wait(nested());

        assert_eq!(store.state(), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(*notified.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }
}
