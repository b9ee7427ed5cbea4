use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::lab::LabDefinition;
use crate::protocol::SessionKey;
use crate::sandbox::{EnvironmentSimulator, DEFAULT_HISTORY_LIMIT};

pub type SimulatorHandle = Arc<Mutex<EnvironmentSimulator>>;

#[derive(Debug)]
struct Slot {
    simulator: SimulatorHandle,
    last_used_ms: AtomicU64,
}

/// One live simulator per (user, lab). The map lock is only held to find
/// or insert a slot; callers then lock the simulator itself, so distinct
/// keys never wait on each other.
#[derive(Debug)]
pub struct SessionStore {
    slots: RwLock<HashMap<SessionKey, Arc<Slot>>>,
    history_limit: usize,
    epoch: Instant,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl SessionStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            history_limit,
            epoch: Instant::now(),
        }
    }

    pub async fn get_or_create(&self, key: &SessionKey, lab: &LabDefinition) -> SimulatorHandle {
        if let Some(slot) = self.slots.read().await.get(key) {
            self.touch(slot);
            return Arc::clone(&slot.simulator);
        }

        let mut slots = self.slots.write().await;
        let slot = slots.entry(key.clone()).or_insert_with(|| {
            debug!(session = %key, "Creating simulator");
            Arc::new(Slot {
                simulator: Arc::new(Mutex::new(EnvironmentSimulator::new(&lab.environment, self.history_limit))),
                last_used_ms: AtomicU64::new(0),
            })
        });
        self.touch(slot);
        Arc::clone(&slot.simulator)
    }

    /// Drops the simulator so the next access rebuilds it from the lab's
    /// environment. Returns whether one existed.
    pub async fn reset(&self, key: &SessionKey) -> bool {
        self.slots.write().await.remove(key).is_some()
    }

    /// Called once an attempt completes; the simulator is no longer needed.
    pub async fn discard(&self, key: &SessionKey) -> bool {
        let removed = self.reset(key).await;
        if removed {
            debug!(session = %key, "Discarded simulator");
        }
        removed
    }

    /// Removes simulators unused for at least `max_idle`. Simulators that
    /// are locked by an in-flight command are kept.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let now_ms = self.elapsed_ms();
        let max_idle_ms = max_idle.as_millis() as u64;

        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| {
            let idle_ms = now_ms.saturating_sub(slot.last_used_ms.load(Ordering::Relaxed));
            idle_ms < max_idle_ms || slot.simulator.try_lock().is_err()
        });
        before - slots.len()
    }

    pub async fn contains(&self, key: &SessionKey) -> bool {
        self.slots.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    fn touch(&self, slot: &Slot) {
        slot.last_used_ms.store(self.elapsed_ms(), Ordering::Relaxed);
    }

    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::demo_lab;
    use crate::sandbox::{CommandParser, TerminalPolicy};
    use std::collections::BTreeSet;

    async fn cd(handle: &SimulatorHandle, path: &str) {
        let policy = TerminalPolicy::default();
        let allowed = BTreeSet::new();
        let parsed = CommandParser::new(&policy, &allowed).parse(&format!("cd {}", path));
        handle.lock().await.execute(&parsed);
    }

    #[tokio::test]
    async fn test_same_key_same_simulator() {
        let store = SessionStore::default();
        let lab = demo_lab();
        let key = SessionKey::new("u1", &lab.id);

        let first = store.get_or_create(&key, &lab).await;
        let second = store.get_or_create(&key, &lab).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len().await, 1);

        let other = store.get_or_create(&SessionKey::new("u2", &lab.id), &lab).await;
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_reset_rebuilds_from_environment() {
        let store = SessionStore::default();
        let lab = demo_lab();
        let key = SessionKey::new("u1", &lab.id);

        let handle = store.get_or_create(&key, &lab).await;
        cd(&handle, "/etc").await;
        assert_eq!(handle.lock().await.current_directory(), "/etc");

        assert!(store.reset(&key).await);
        assert!(!store.reset(&key).await);

        let rebuilt = store.get_or_create(&key, &lab).await;
        assert_eq!(rebuilt.lock().await.current_directory(), "/home/student");
        assert_eq!(rebuilt.lock().await.history_len(), 0);
    }

    #[tokio::test]
    async fn test_evict_idle() {
        let store = SessionStore::default();
        let lab = demo_lab();
        store.get_or_create(&SessionKey::new("a", &lab.id), &lab).await;
        store.get_or_create(&SessionKey::new("b", &lab.id), &lab).await;

        assert_eq!(store.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(store.evict_idle(Duration::ZERO).await, 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_evict_keeps_busy_simulator() {
        let store = SessionStore::default();
        let lab = demo_lab();
        let key = SessionKey::new("a", &lab.id);
        let handle = store.get_or_create(&key, &lab).await;

        let _busy = handle.lock().await;
        assert_eq!(store.evict_idle(Duration::ZERO).await, 0);
        assert!(store.contains(&key).await);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let store = Arc::new(SessionStore::default());
        let lab = Arc::new(demo_lab());
        let held = store.get_or_create(&SessionKey::new("a", &lab.id), &lab).await;
        let _guard = held.lock().await;

        let other = {
            let store = Arc::clone(&store);
            let lab = Arc::clone(&lab);
            tokio::spawn(async move {
                let handle = store.get_or_create(&SessionKey::new("b", &lab.id), &lab).await;
                let sim = handle.lock().await;
                sim.current_directory().to_string()
            })
        };

        let cwd = tokio::time::timeout(Duration::from_secs(1), other).await.unwrap().unwrap();
        assert_eq!(cwd, "/home/student");
    }
}
