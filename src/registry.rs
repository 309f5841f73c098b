//! Name to index-handle store with lazy, single-flight open-or-create.
//!
//! Each name maps to a slot that is initialized at most once. Concurrent
//! resolvers of the same name block on that slot and all observe the same
//! outcome; the map lock is only held to look up or insert slots, so
//! resolving one name never waits on the engine I/O of another.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

use tracing::{debug, info, warn};

use crate::{
    base_dir::BaseDir,
    engine::{Engine, EngineIndex},
    error::{Error, Result},
};

/// Outcome of opening a name, shared by everyone who waited on it.
type Slot<I> = OnceLock<std::result::Result<Arc<I>, SlotError>>;

#[derive(Debug, Clone)]
enum SlotError {
    /// Sealed by `close_all` before any resolver opened it.
    Closed,
    Failed(String),
}

struct Slots<I> {
    by_name: HashMap<String, Arc<Slot<I>>>,
    closed: bool,
}

pub struct IndexRegistry<E: Engine> {
    engine: E,
    base_dir: BaseDir,
    slots: RwLock<Slots<E::Index>>,
}

/// Result of [`IndexRegistry::close_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseSummary {
    pub closed: usize,
    pub failed: usize,
}

impl<E: Engine> IndexRegistry<E> {
    pub fn new(engine: E, base_dir: BaseDir) -> Self {
        Self {
            engine,
            base_dir,
            slots: RwLock::new(Slots {
                by_name: HashMap::new(),
                closed: false,
            }),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Return the open handle for `name`, opening the on-disk index or
    /// creating a new one on first use.
    pub fn resolve(&self, name: &str) -> Result<Arc<E::Index>> {
        let path = self.base_dir.index_path(name)?;
        let slot = self.slot(name)?;
        self.settle(name, &path, &slot)
    }

    /// Wait for `slot` to be initialized, opening the index if nobody has.
    fn settle(
        &self,
        name: &str,
        path: &Path,
        slot: &Arc<Slot<E::Index>>,
    ) -> Result<Arc<E::Index>> {
        match slot.get_or_init(|| self.open_or_create(name, path)) {
            Ok(handle) => Ok(Arc::clone(handle)),
            Err(SlotError::Closed) => Err(Error::RegistryClosed),
            Err(SlotError::Failed(reason)) => {
                self.forget(name, slot);
                Err(Error::OpenFailed {
                    name: name.to_string(),
                    reason: reason.clone(),
                })
            }
        }
    }

    /// Number of names with a slot, open or still opening.
    pub fn len(&self) -> usize {
        self.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every open handle. Later calls, and later resolves, are
    /// no-ops and errors respectively.
    pub fn close_all(&self) -> CloseSummary {
        let drained: Vec<(String, Arc<Slot<E::Index>>)> = {
            let mut slots = self.write();
            if slots.closed {
                return CloseSummary::default();
            }
            slots.closed = true;
            slots.by_name.drain().collect()
        };

        let mut summary = CloseSummary::default();
        for (name, slot) in drained {
            // Waits for an in-flight open to finish, or seals an idle
            // slot so it never opens.
            let outcome = slot.get_or_init(|| Err(SlotError::Closed));
            let Ok(handle) = outcome else {
                continue;
            };
            match handle.close() {
                Ok(()) => {
                    debug!(index = %name, "closed index");
                    summary.closed += 1;
                }
                Err(e) => {
                    warn!(index = %name, error = %e, "failed to close index");
                    summary.failed += 1;
                }
            }
        }

        info!(
            closed = summary.closed,
            failed = summary.failed,
            "index registry closed"
        );
        summary
    }

    fn slot(&self, name: &str) -> Result<Arc<Slot<E::Index>>> {
        {
            let slots = self.read();
            if slots.closed {
                return Err(Error::RegistryClosed);
            }
            if let Some(slot) = slots.by_name.get(name) {
                return Ok(Arc::clone(slot));
            }
        }

        let mut slots = self.write();
        if slots.closed {
            return Err(Error::RegistryClosed);
        }
        Ok(Arc::clone(slots.by_name.entry(name.to_string()).or_default()))
    }

    /// Drop a failed slot so the next resolve retries, unless another
    /// caller already replaced it.
    fn forget(&self, name: &str, failed: &Arc<Slot<E::Index>>) {
        let mut slots = self.write();
        if slots
            .by_name
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, failed))
        {
            slots.by_name.remove(name);
        }
    }

    fn open_or_create(
        &self,
        name: &str,
        path: &Path,
    ) -> std::result::Result<Arc<E::Index>, SlotError> {
        match self.engine.open(path) {
            Ok(index) => {
                info!(index = name, path = %path.display(), "opened index");
                return Ok(Arc::new(index));
            }
            Err(e) => {
                debug!(index = name, error = %e, "open failed, creating index");
            }
        }

        match self.engine.create(path) {
            Ok(index) => {
                info!(index = name, path = %path.display(), "created index");
                Ok(Arc::new(index))
            }
            Err(e) => {
                warn!(index = name, error = %e, "could not open or create index");
                Err(SlotError::Failed(e.to_string()))
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Slots<E::Index>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Slots<E::Index>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Engine> Drop for IndexRegistry<E> {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl<E: Engine> std::fmt::Debug for IndexRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexRegistry")
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Barrier, atomic::Ordering},
        time::Duration,
    };

    use super::*;
    use crate::testing::MockEngine;

    fn registry(engine: MockEngine) -> (tempfile::TempDir, IndexRegistry<MockEngine>) {
        let tmp = tempfile::tempdir().unwrap();
        let base = BaseDir::resolve(tmp.path()).unwrap();
        (tmp, IndexRegistry::new(engine, base))
    }

    #[test]
    fn first_resolve_creates_then_reuses() {
        let (_tmp, reg) = registry(MockEngine::default());

        let a = reg.resolve("articles").unwrap();
        let b = reg.resolve("articles").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.engine().opens.load(Ordering::SeqCst), 1);
        assert_eq!(reg.engine().creates.load(Ordering::SeqCst), 1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn concurrent_resolves_open_once() {
        let (_tmp, reg) =
            registry(MockEngine::with_delay(Duration::from_millis(50)));
        let barrier = Barrier::new(16);

        let handles: Vec<_> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..16)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        reg.resolve("hot").unwrap()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(reg.engine().opens.load(Ordering::SeqCst), 1);
        assert_eq!(reg.engine().creates.load(Ordering::SeqCst), 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    }

    #[test]
    fn concurrent_failures_share_one_attempt() {
        let engine = MockEngine::with_delay(Duration::from_millis(50));
        engine.fail_create.store(true, Ordering::SeqCst);
        let (_tmp, reg) = registry(engine);
        let barrier = Barrier::new(8);

        let results: Vec<_> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        reg.resolve("broken")
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert!(results.iter().all(|r| matches!(
            r,
            Err(Error::OpenFailed { name, reason })
                if name == "broken" && reason.contains("disk full")
        )));
        assert_eq!(reg.engine().creates.load(Ordering::SeqCst), 1);
        assert!(reg.is_empty());

        // A failed name is retried on the next request.
        reg.engine().fail_create.store(false, Ordering::SeqCst);
        assert!(reg.resolve("broken").is_ok());
        assert_eq!(reg.engine().creates.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn different_names_do_not_block_each_other() {
        let (engine, entered, release) = MockEngine::gated("slow");
        let (_tmp, reg) = registry(engine);

        std::thread::scope(|s| {
            let slow = s.spawn(|| reg.resolve("slow"));
            entered
                .recv_timeout(Duration::from_secs(5))
                .expect("slow open never started");

            // "slow" is stuck inside the engine; "fast" must still resolve.
            assert!(reg.resolve("fast").is_ok());

            release.send(()).unwrap();
            assert!(slow.join().unwrap().is_ok());
        });
    }

    #[test]
    fn invalid_names_never_reach_the_engine() {
        let (_tmp, reg) = registry(MockEngine::default());
        assert!(matches!(reg.resolve("../etc"), Err(Error::InvalidName(_))));
        assert_eq!(reg.engine().opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn close_all_closes_each_handle_once() {
        let (_tmp, reg) = registry(MockEngine::default());
        let a = reg.resolve("a").unwrap();
        let b = reg.resolve("b").unwrap();
        b.fail_close.store(true, Ordering::SeqCst);

        let summary = reg.close_all();
        assert_eq!(summary, CloseSummary { closed: 1, failed: 1 });
        assert_eq!(a.closes.load(Ordering::SeqCst), 1);
        assert_eq!(b.closes.load(Ordering::SeqCst), 1);

        assert_eq!(reg.close_all(), CloseSummary::default());
        assert_eq!(a.closes.load(Ordering::SeqCst), 1);
        assert!(matches!(reg.resolve("a"), Err(Error::RegistryClosed)));
    }

    #[test]
    fn slot_sealed_by_close_all_reports_shutdown() {
        let (_tmp, reg) = registry(MockEngine::default());
        let path = reg.base_dir.index_path("late").unwrap();

        // A resolver that fetched its slot just before close_all drained it.
        let slot = reg.slot("late").unwrap();
        reg.close_all();

        assert!(matches!(
            reg.settle("late", &path, &slot),
            Err(Error::RegistryClosed)
        ));
        assert_eq!(reg.engine().opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn drop_releases_handles() {
        let (_tmp, reg) = registry(MockEngine::default());
        let closes = Arc::clone(&reg.resolve("a").unwrap().closes);
        drop(reg);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_all_waits_for_in_flight_open() {
        let (engine, entered, release) = MockEngine::gated("late");
        let (_tmp, reg) = registry(engine);

        std::thread::scope(|s| {
            let opener = s.spawn(|| reg.resolve("late"));
            entered.recv_timeout(Duration::from_secs(5)).unwrap();

            let closer = s.spawn(|| reg.close_all());
            std::thread::sleep(Duration::from_millis(20));
            release.send(()).unwrap();

            let handle = opener.join().unwrap().unwrap();
            assert_eq!(closer.join().unwrap().closed, 1);
            assert_eq!(handle.closes.load(Ordering::SeqCst), 1);
        });
    }
}
