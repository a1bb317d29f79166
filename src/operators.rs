//! Observables derived from another [Observable].
//!
//! A derived observable subscribes to its source when it gains its
//! first subscriber and unsubscribes when its last one leaves. While
//! subscribed it is kept alive by its source, so it does not need to
//! be held by the caller. It finishes when its source finishes or is
//! dropped.

use crate::{disposable::Disposable, observable::Observable, observer::Observer};
use parking_lot::Mutex;
use std::sync::Arc;

impl<T: Clone + Send + 'static> Observable<T> {
    /// Create an observable fed by this one through `forward`, which
    /// receives the derived observable and each value from this one.
    fn derive<U, F>(&self, forward: F) -> Observable<U>
    where
        U: Clone + Send + 'static,
        F: Fn(&Observable<U>, T) + Send + Sync + 'static,
    {
        let forward = Arc::new(forward);
        // Held only while disconnected. Once connected, the source holds
        // the derived observable instead.
        let idle_source = Arc::new(Mutex::new(Some(self.clone())));

        Observable::<U>::connectable(move |derived: &Observable<U>| {
            let source = idle_source.lock().take()?;
            let target = derived.clone();
            let forward = forward.clone();
            let ended = Arc::downgrade(&derived.inner);
            let watched = Arc::downgrade(&source.inner);

            let subscription = source.subscribe_until(
                Observer::new(move |value| forward(&target, value)),
                move || {
                    let source_ended = watched.upgrade().map_or(true, |inner| inner.is_finished());
                    if source_ended {
                        if let Some(inner) = ended.upgrade() {
                            Observable { inner }.finish();
                        }
                    }
                },
            );

            let watched = Arc::downgrade(&source.inner);
            let idle_source = idle_source.clone();
            Some(Disposable::new(move || {
                // Retake the source first: a derived source may be kept
                // alive only by this subscription.
                if let Some(inner) = watched.upgrade() {
                    *idle_source.lock() = Some(Observable { inner });
                }
                subscription.dispose();
            }))
        })
    }

    pub fn map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Clone + Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.derive(move |out, value| out.publish(f(value)))
    }

    pub fn filter<F>(&self, predicate: F) -> Observable<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.derive(move |out, value| {
            if predicate(&value) {
                out.publish(value)
            }
        })
    }

    pub fn filter_map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Clone + Send + 'static,
        F: Fn(T) -> Option<U> + Send + Sync + 'static,
    {
        self.derive(move |out, value| {
            if let Some(value) = f(value) {
                out.publish(value)
            }
        })
    }

    /// Drop values which `equivalent` considers the same as the last
    /// value forwarded. The first value is always forwarded.
    pub fn skip_repeats_by<F>(&self, equivalent: F) -> Observable<T>
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        self.skip_repeats_from(None, equivalent)
    }

    /// [skip_repeats_by()](Observable::skip_repeats_by()) as though
    /// `seed` had already been forwarded.
    pub(crate) fn skip_repeats_from<F>(&self, seed: Option<T>, equivalent: F) -> Observable<T>
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        let last = Mutex::new(seed);
        self.derive(move |out, value| {
            let repeated = {
                let mut last = last.lock();
                match &*last {
                    Some(previous) if equivalent(previous, &value) => true,
                    _ => {
                        *last = Some(value.clone());
                        false
                    }
                }
            };

            if !repeated {
                out.publish(value)
            }
        })
    }

    /// Skip the first `count` values.
    ///
    /// # Panics
    ///
    /// If `count` is zero.
    pub fn skip(&self, count: usize) -> Observable<T> {
        assert!(count > 0, "skip() requires a count greater than zero");

        let remaining = Mutex::new(count);
        self.derive(move |out, value| {
            let skipped = {
                let mut remaining = remaining.lock();
                if *remaining > 0 {
                    *remaining -= 1;
                    true
                } else {
                    false
                }
            };

            if !skipped {
                out.publish(value)
            }
        })
    }

    /// Skip values until `predicate` first returns `false`, forwarding
    /// that value and everything after it.
    pub fn skip_while<F>(&self, predicate: F) -> Observable<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let skipping = Mutex::new(true);
        self.derive(move |out, value| {
            let skipped = {
                let mut skipping = skipping.lock();
                *skipping = *skipping && predicate(&value);
                *skipping
            };

            if !skipped {
                out.publish(value)
            }
        })
    }

    /// Forward the first `count` values, then finish, disposing the
    /// subscription to this observable and every subscription to the
    /// derived one.
    ///
    /// # Panics
    ///
    /// If `count` is zero.
    pub fn take(&self, count: usize) -> Observable<T> {
        assert!(count > 0, "take() requires a count greater than zero");

        let taken = Mutex::new(0usize);
        self.derive(move |out, value| {
            let (forward, last) = {
                let mut taken = taken.lock();
                if *taken < count {
                    *taken += 1;
                    (true, *taken == count)
                } else {
                    (false, true)
                }
            };

            if forward {
                out.publish(value);
            }
            if last {
                out.finish();
            }
        })
    }

    /// Forward values while `predicate` holds, finishing at the first
    /// value for which it does not.
    pub fn take_while<F>(&self, predicate: F) -> Observable<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let taking = Mutex::new(true);
        self.derive(move |out, value| {
            let forward = {
                let mut taking = taking.lock();
                *taking = *taking && predicate(&value);
                *taking
            };

            if forward {
                out.publish(value)
            } else {
                out.finish()
            }
        })
    }

    /// Emit `(previous, current)` pairs, starting from the second value.
    pub fn combine_previous(&self) -> Observable<(T, T)> {
        self.combine_previous_from(None)
    }

    /// Emit `(previous, current)` pairs, pairing the first value with
    /// `initial`.
    pub fn combine_previous_with(&self, initial: T) -> Observable<(T, T)> {
        self.combine_previous_from(Some(initial))
    }

    fn combine_previous_from(&self, initial: Option<T>) -> Observable<(T, T)> {
        let previous = Mutex::new(initial);
        self.derive(move |out, value| {
            let previous = previous.lock().replace(value.clone());
            if let Some(previous) = previous {
                out.publish((previous, value))
            }
        })
    }
}

impl<T: Clone + PartialEq + Send + 'static> Observable<T> {
    /// Drop values equal to the last value forwarded.
    pub fn skip_repeats(&self) -> Observable<T> {
        self.skip_repeats_by(|a: &T, b: &T| a == b)
    }
}
