use parking_lot::Mutex;
use std::{
    collections::HashMap,
    fmt::Debug,
    hash::{Hash, Hasher},
    iter::FromIterator,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

static NEXT_DISPOSABLE_ID: AtomicU64 = AtomicU64::new(0);

/// The identity of a [Disposable], shared by all of its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisposableId(u64);

impl DisposableId {
    pub(crate) fn next() -> Self {
        DisposableId(NEXT_DISPOSABLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type Action = Box<dyn FnOnce() + Send + 'static>;

struct DisposableInner {
    id: DisposableId,
    disposed: AtomicBool,
    action: Mutex<Option<Action>>,
}

/// A one-shot cleanup action.
///
/// [Disposable::dispose()] runs the action the first time it is
/// called, from whichever thread gets there first; every other call
/// does nothing. Clones refer to the same disposable. Dropping a
/// [Disposable] does not dispose it, see [Disposable::guard()] for
/// that.
#[derive(Clone)]
pub struct Disposable(Arc<DisposableInner>);

impl Disposable {
    /// Create an active disposable which runs `action` when disposed.
    pub fn new<F: FnOnce() + Send + 'static>(action: F) -> Self {
        Self::with_id(DisposableId::next(), action)
    }

    /// Create an active disposable with an identity which was handed
    /// out earlier, so that `action` can refer to it.
    pub(crate) fn with_id<F: FnOnce() + Send + 'static>(id: DisposableId, action: F) -> Self {
        Disposable(Arc::new(DisposableInner {
            id,
            disposed: AtomicBool::new(false),
            action: Mutex::new(Some(Box::new(action))),
        }))
    }

    /// A disposable which is already disposed, and does nothing.
    pub fn nop() -> Self {
        Disposable(Arc::new(DisposableInner {
            id: DisposableId::next(),
            disposed: AtomicBool::new(true),
            action: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> DisposableId {
        self.0.id
    }

    /// Dispose, running the action if this is the first call.
    pub fn dispose(&self) {
        if self.0.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let action = self.0.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    /// `true` as soon as [Disposable::dispose()] has been called, even
    /// if the action is still running.
    pub fn is_disposed(&self) -> bool {
        self.0.disposed.load(Ordering::Acquire)
    }

    /// Wrap this disposable so that it is disposed when the returned
    /// guard is dropped.
    pub fn guard(self) -> DisposableGuard {
        DisposableGuard(Some(self))
    }
}

impl PartialEq for Disposable {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Disposable {}

impl Hash for Disposable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state)
    }
}

impl Debug for Disposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposable")
            .field("id", &self.0.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Disposes the wrapped [Disposable] when dropped.
#[derive(Debug)]
pub struct DisposableGuard(Option<Disposable>);

impl DisposableGuard {
    /// Give up the guard without disposing.
    pub fn release(mut self) -> Disposable {
        self.0.take().unwrap_or_else(Disposable::nop)
    }
}

impl Drop for DisposableGuard {
    fn drop(&mut self) {
        if let Some(disposable) = self.0.take() {
            disposable.dispose();
        }
    }
}

/// A set of [Disposable]s which are disposed together.
///
/// Once the group has been disposed, any disposable added to it is
/// disposed immediately instead of being stored.
pub struct DisposableGroup {
    /// `None` once the group has been disposed.
    members: Mutex<Option<HashMap<DisposableId, Disposable>>>,
}

impl DisposableGroup {
    pub fn new() -> Self {
        Self {
            members: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Add `disposable`, or dispose it right away if this group has
    /// already been disposed.
    pub fn add(&self, disposable: Disposable) {
        let rejected = {
            let mut members = self.members.lock();
            match members.as_mut() {
                Some(members) => {
                    members.insert(disposable.id(), disposable);
                    None
                }
                None => Some(disposable),
            }
        };

        if let Some(disposable) = rejected {
            disposable.dispose();
        }
    }

    pub fn add_all<I: IntoIterator<Item = Disposable>>(&self, disposables: I) {
        let rejected: Vec<Disposable> = {
            let mut members = self.members.lock();
            match members.as_mut() {
                Some(members) => {
                    for disposable in disposables {
                        members.insert(disposable.id(), disposable);
                    }
                    Vec::new()
                }
                None => disposables.into_iter().collect(),
            }
        };

        for disposable in rejected {
            disposable.dispose();
        }
    }

    /// Forget `disposable` without disposing it.
    pub fn remove(&self, disposable: &Disposable) {
        self.remove_id(disposable.id());
    }

    pub(crate) fn remove_id(&self, id: DisposableId) {
        if let Some(members) = self.members.lock().as_mut() {
            members.remove(&id);
        }
    }

    /// Dispose every member, and every disposable added from now on.
    pub fn dispose(&self) {
        let taken = self.members.lock().take();

        // Disposed outside the lock, member actions may call back into
        // this group.
        if let Some(members) = taken {
            for (_, disposable) in members {
                disposable.dispose();
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.members.lock().is_none()
    }

    pub fn len(&self) -> usize {
        self.members.lock().as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DisposableGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Disposable> for DisposableGroup {
    fn from_iter<I: IntoIterator<Item = Disposable>>(disposables: I) -> Self {
        let group = DisposableGroup::new();
        group.add_all(disposables);
        group
    }
}

impl Debug for DisposableGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.members.lock().as_ref() {
            Some(members) => write!(f, "DisposableGroup({} members)", members.len()),
            None => write!(f, "DisposableGroup(disposed)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Disposable, DisposableGroup};
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Barrier,
        },
        thread,
    };

    fn counting() -> (Disposable, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_copy = count.clone();
        let disposable = Disposable::new(move || {
            count_copy.fetch_add(1, Ordering::SeqCst);
        });
        (disposable, count)
    }

    #[test]
    fn dispose_runs_action_once() {
        let (disposable, count) = counting();
        assert!(!disposable.is_disposed());

        disposable.dispose();
        disposable.dispose();
        disposable.clone().dispose();

        assert!(disposable.is_disposed());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_dispose_runs_action_once() {
        let (disposable, count) = counting();
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let disposable = disposable.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    disposable.dispose();
                    assert!(disposable.is_disposed());
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disposed_flag_is_set_before_action_runs() {
        let slot: Arc<parking_lot::Mutex<Option<Disposable>>> = Arc::default();
        let slot_copy = slot.clone();
        let disposable = Disposable::new(move || {
            let inner = slot_copy.lock().clone().unwrap();
            assert!(inner.is_disposed());
        });
        *slot.lock() = Some(disposable.clone());
        disposable.dispose();
    }

    #[test]
    fn nop_is_disposed() {
        let nop = Disposable::nop();
        assert!(nop.is_disposed());
        nop.dispose();
        assert_ne!(nop, Disposable::nop());
    }

    #[test]
    fn guard_disposes_on_drop() {
        let (disposable, count) = counting();
        {
            let _guard = disposable.clone().guard();
        }
        assert!(disposable.is_disposed());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let (disposable, count) = counting();
        let released = disposable.clone().guard().release();
        assert_eq!(released, disposable);
        assert!(!disposable.is_disposed());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn group_disposes_all_members_once() {
        let members: Vec<_> = (0..5).map(|_| counting()).collect();
        let group: DisposableGroup = members.iter().map(|(d, _)| d.clone()).collect();
        // duplicates collapse
        group.add(members[0].0.clone());
        assert_eq!(group.len(), 5);

        group.dispose();
        group.dispose();

        assert!(group.is_disposed());
        assert!(group.is_empty());
        for (disposable, count) in &members {
            assert!(disposable.is_disposed());
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn add_after_dispose_disposes_immediately() {
        let group = DisposableGroup::new();
        group.dispose();

        let (late, count) = counting();
        group.add(late.clone());
        assert!(late.is_disposed());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let (a, a_count) = counting();
        let (b, b_count) = counting();
        group.add_all(vec![a.clone(), b.clone()]);
        assert!(a.is_disposed() && b.is_disposed());
        assert_eq!(a_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_does_not_dispose() {
        let group = DisposableGroup::new();
        let (disposable, count) = counting();
        group.add(disposable.clone());
        group.remove(&disposable);
        group.dispose();

        assert!(!disposable.is_disposed());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn member_may_remove_itself_while_group_disposes() {
        let group = Arc::new(DisposableGroup::new());
        let id = super::DisposableId::next();
        let group_copy = group.clone();
        let member = Disposable::with_id(id, move || group_copy.remove_id(id));
        group.add(member.clone());

        group.dispose();
        assert!(member.is_disposed());
    }

    #[test]
    fn concurrent_add_and_dispose_never_loses_a_member() {
        for _ in 0..50 {
            let group = Arc::new(DisposableGroup::new());
            let barrier = Arc::new(Barrier::new(2));
            let members: Vec<_> = (0..64).map(|_| counting()).collect();

            let adder = {
                let group = group.clone();
                let barrier = barrier.clone();
                let disposables: Vec<_> = members.iter().map(|(d, _)| d.clone()).collect();
                thread::spawn(move || {
                    barrier.wait();
                    for disposable in disposables {
                        group.add(disposable);
                    }
                })
            };

            barrier.wait();
            group.dispose();
            adder.join().unwrap();

            for (disposable, count) in &members {
                assert!(disposable.is_disposed());
                assert_eq!(count.load(Ordering::SeqCst), 1);
            }
        }
    }
}
