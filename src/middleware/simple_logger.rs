//! Logging [Middleware] which writes to the [log] facade.

use crate::middleware::{Dispatch, GetState, Middleware};
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Warn,
    Info,
}

impl LogLevel {
    pub fn log<S: AsRef<str>>(&self, message: S) {
        match self {
            LogLevel::Trace => log::trace!("{}", message.as_ref()),
            LogLevel::Debug => log::debug!("{}", message.as_ref()),
            LogLevel::Warn => log::warn!("{}", message.as_ref()),
            LogLevel::Info => log::info!("{}", message.as_ref()),
        }
    }

    fn enabled(&self) -> bool {
        let level = match self {
            LogLevel::Trace => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
        };
        log::log_enabled!(level)
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Debug
    }
}

/// Logs the state before each action, the action itself, and the
/// state after the rest of the chain has run.
#[derive(Debug, Default)]
pub struct SimpleLoggerMiddleware {
    log_level: LogLevel,
}

impl SimpleLoggerMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }
}

impl<State, Action> Middleware<State, Action> for SimpleLoggerMiddleware
where
    State: Debug + 'static,
    Action: Debug + 'static,
{
    fn apply(
        &self,
        get_state: GetState<State>,
        _dispatch: Dispatch<Action>,
        next: Dispatch<Action>,
    ) -> Dispatch<Action> {
        let log_level = self.log_level;

        Dispatch::new(move |action: Action| {
            if !log_level.enabled() {
                return next.dispatch(action);
            }

            log_level.log(format!("prev state: {:?}", get_state.get()));
            log_level.log(format!("action: {:?}", action));

            next.dispatch(action);

            log_level.log(format!("next state: {:?}", get_state.get()));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{LogLevel, SimpleLoggerMiddleware};
    use crate::StoreBuilder;

    #[test]
    fn passes_actions_through() {
        let store = StoreBuilder::new(|state: &i32, action: &i32| state + action, 0)
            .middleware(SimpleLoggerMiddleware::new().log_level(LogLevel::Info))
            .build();

        store.dispatch_and_wait(2);
        store.dispatch_and_wait(3);
        assert_eq!(store.state(), 5);
    }

    #[test]
    fn logs_at_debug_by_default() {
        assert_eq!(SimpleLoggerMiddleware::new().log_level, LogLevel::Debug);
        assert_eq!(
            SimpleLoggerMiddleware::new().log_level(LogLevel::Warn).log_level,
            LogLevel::Warn
        );
    }
}
