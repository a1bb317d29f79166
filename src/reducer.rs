/// Using the [reduce()](Reducer::reduce()) method, implementors of
/// this trait take an `Action` submitted to a store via
/// [Store::dispatch()](crate::Store::dispatch()) and produce the next
/// `State` from the current one.
///
/// Reducers are expected to be pure and fast: they run while the
/// store's write lane is held, so no other action can be applied and
/// no state can be read until they return. An `Action` the reducer
/// does not recognise should produce an unchanged `State`.
///
/// Any `Fn(&State, &Action) -> State` closure is a [Reducer].
pub trait Reducer<State, Action>: Send + Sync {
    fn reduce(&self, prev_state: &State, action: &Action) -> State;
}

impl<F, State, Action> Reducer<State, Action> for F
where
    F: Fn(&State, &Action) -> State + Send + Sync,
{
    fn reduce(&self, prev_state: &State, action: &Action) -> State {
        self(prev_state, action)
    }
}

/// A [Reducer] composed of multiple reducers, applied in order: each
/// one receives the action along with the state produced by the
/// previous one.
pub struct CompositeReducer<State, Action> {
    reducers: Vec<Box<dyn Reducer<State, Action>>>,
}

impl<State, Action> CompositeReducer<State, Action> {
    /// Create a new [CompositeReducer].
    pub fn new(reducers: Vec<Box<dyn Reducer<State, Action>>>) -> Self {
        CompositeReducer { reducers }
    }

    /// Append `reducer`, to run after the existing ones.
    pub fn with<R: Reducer<State, Action> + 'static>(mut self, reducer: R) -> Self {
        self.reducers.push(Box::new(reducer));
        self
    }
}

impl<State, Action> Default for CompositeReducer<State, Action> {
    fn default() -> Self {
        CompositeReducer::new(Vec::new())
    }
}

impl<State: Clone, Action> Reducer<State, Action> for CompositeReducer<State, Action> {
    fn reduce(&self, prev_state: &State, action: &Action) -> State {
        let mut reducers = self.reducers.iter();
        let mut state = match reducers.next() {
            Some(first) => first.reduce(prev_state, action),
            None => return prev_state.clone(),
        };

        for reducer in reducers {
            state = reducer.reduce(&state, action);
        }

        state
    }
}
