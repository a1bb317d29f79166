//! Structured logging [Middleware](crate::middleware::Middleware).
//! Publishes each action dispatched to a [Store](crate::Store), along
//! with the state on either side of it, as a single JSON object
//! through the [log] facade.

use super::{simple_logger::LogLevel, Dispatch, GetState, Middleware};
use serde::Serialize;

#[derive(Serialize)]
struct OnDispatchLog<'a, State, Action> {
    action: &'a Action,
    prev_state: &'a Option<State>,
    next_state: &'a Option<State>,
}

/// Which parts of a dispatch to include in each log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayType {
    /// The action, and the state before and after it.
    Full,
    /// The action alone.
    ActionOnly,
}

impl Default for DisplayType {
    fn default() -> Self {
        Self::Full
    }
}

/// Logs a JSON record for every action dispatched through it.
///
/// Serialization failures are logged as warnings and do not affect
/// the dispatch.
#[derive(Debug, Default)]
pub struct SerdeLoggerMiddleware {
    log_level: LogLevel,
    display_type: DisplayType,
}

impl SerdeLoggerMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level at which the data from this middleware will be
    /// logged to.
    pub fn log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// What to include in each record.
    pub fn display_type(mut self, display_type: DisplayType) -> Self {
        self.display_type = display_type;
        self
    }
}

pub(crate) fn render<State, Action>(
    display_type: DisplayType,
    action: &Action,
    prev_state: &Option<State>,
    next_state: &Option<State>,
) -> serde_json::Result<String>
where
    State: Serialize,
    Action: Serialize,
{
    match display_type {
        DisplayType::Full => serde_json::to_string(&OnDispatchLog {
            action,
            prev_state,
            next_state,
        }),
        DisplayType::ActionOnly => serde_json::to_string(&serde_json::json!({
            "action": serde_json::to_value(action)?,
        })),
    }
}

impl<State, Action> Middleware<State, Action> for SerdeLoggerMiddleware
where
    State: Serialize + 'static,
    Action: Serialize + 'static,
{
    fn apply(
        &self,
        get_state: GetState<State>,
        _dispatch: Dispatch<Action>,
        next: Dispatch<Action>,
    ) -> Dispatch<Action> {
        let log_level = self.log_level;
        let display_type = self.display_type;

        Dispatch::new(move |action: Action| {
            let prev_state = match display_type {
                DisplayType::Full => get_state.get(),
                DisplayType::ActionOnly => None,
            };
            let action_json = serde_json::to_value(&action);

            next.dispatch(action);

            let next_state = match display_type {
                DisplayType::Full => get_state.get(),
                DisplayType::ActionOnly => None,
            };

            let record = action_json
                .and_then(|action| render(display_type, &action, &prev_state, &next_state));
            match record {
                Ok(record) => log_level.log(record),
                Err(error) => log::warn!("unable to serialize dispatch record: {}", error),
            }
        })
    }
}
