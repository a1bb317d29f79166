mod atomic;
pub mod batch;
mod disposable;
mod executor;
pub mod middleware;
mod observable;
mod observer;
mod operators;
mod queue;
mod reducer;
mod store;

pub use atomic::Atomic;
pub use disposable::{Disposable, DisposableGroup, DisposableGuard, DisposableId};
pub use executor::{Executor, ImmediateExecutor, Job, SerialExecutor};
pub use observable::{Observable, Sink};
pub use observer::{Observer, ObserverId};
pub use queue::RwQueue;
pub use reducer::*;
pub use store::{Store, StoreBuilder, StoreRef, SubscribeOptions};
