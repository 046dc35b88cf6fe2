use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

struct DebounceEntry<T> {
    id: u64,
    deadline: Duration,
    payload: T,
}

/// Identifies one scheduled entry. A handle is invalidated when its entry is
/// cancelled or superseded by a newer `schedule` for the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceHandle {
    id: u64,
}

/// Coalesces bursts of triggers for the same key into a single deferred
/// action.
///
/// Scheduling for a key that already has a pending entry replaces it
/// (last-write-wins): N rapid triggers within the debounce window produce
/// exactly one fired payload, carrying the most recent payload. Entries fire
/// when the host advances the clock past their deadline.
pub struct KeyedDebouncer<K, T> {
    delay: Duration,
    now: Duration,
    next_id: u64,
    entries: HashMap<K, DebounceEntry<T>>,
}

impl<K, T> KeyedDebouncer<K, T>
where
    K: Clone + Eq + Hash,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            now: Duration::ZERO,
            next_id: 1,
            entries: HashMap::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules `payload` to fire after the default delay, replacing any
    /// pending entry for `key`.
    pub fn schedule(&mut self, key: K, payload: T) -> DebounceHandle {
        self.schedule_with_delay(key, self.delay, payload)
    }

    pub fn schedule_with_delay(&mut self, key: K, delay: Duration, payload: T) -> DebounceHandle {
        let id = self.next_id;
        self.next_id += 1;

        let entry = DebounceEntry {
            id,
            deadline: self.now + delay,
            payload,
        };
        if self.entries.insert(key, entry).is_some() {
            tracing::trace!(id, "debounce entry superseded");
        }
        DebounceHandle { id }
    }

    /// Cancels the pending entry for `key`. Idempotent: cancelling a key with
    /// no pending entry is a no-op.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Cancels `key` only if its pending entry is the one `handle` refers to.
    pub fn cancel_handle(&mut self, key: &K, handle: DebounceHandle) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.id == handle.id => {
                self.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn pending_len(&self) -> usize {
        self.entries.len()
    }

    /// Advances the virtual clock by `elapsed` and drains every entry whose
    /// deadline has passed, in (deadline, schedule-order) order.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<(K, T)> {
        self.now += elapsed;
        let now = self.now;
        self.drain_where(|entry| entry.deadline <= now)
    }

    /// Drains every pending entry regardless of deadline (host flush, e.g.
    /// on shutdown or in tests that don't care about exact timing).
    pub fn run_all(&mut self) -> Vec<(K, T)> {
        self.drain_where(|_| true)
    }

    fn drain_where(&mut self, mut due: impl FnMut(&DebounceEntry<T>) -> bool) -> Vec<(K, T)> {
        let keys: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| due(entry))
            .map(|(key, _)| key.clone())
            .collect();

        let mut fired: Vec<(K, DebounceEntry<T>)> = keys
            .into_iter()
            .filter_map(|key| {
                let entry = self.entries.remove(&key)?;
                Some((key, entry))
            })
            .collect();
        fired.sort_by_key(|(_, entry)| (entry.deadline, entry.id));
        fired
            .into_iter()
            .map(|(key, entry)| (key, entry.payload))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(250);

    #[test]
    fn bursts_coalesce_to_last_payload() {
        let mut debouncer = KeyedDebouncer::new(DELAY);
        debouncer.schedule("config", 1);
        debouncer.schedule("config", 2);
        debouncer.schedule("config", 3);

        assert_eq!(debouncer.pending_len(), 1);
        assert_eq!(debouncer.advance(DELAY), vec![("config", 3)]);
        assert_eq!(debouncer.pending_len(), 0);
    }

    #[test]
    fn rescheduling_pushes_the_deadline_out() {
        let mut debouncer = KeyedDebouncer::new(DELAY);
        debouncer.schedule("config", 1);
        assert!(debouncer.advance(DELAY / 2).is_empty());

        // A new trigger inside the window restarts it.
        debouncer.schedule("config", 2);
        assert!(debouncer.advance(DELAY / 2).is_empty());
        assert_eq!(debouncer.advance(DELAY / 2), vec![("config", 2)]);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut debouncer = KeyedDebouncer::<&str, u32>::new(DELAY);
        debouncer.schedule("config", 1);
        assert!(debouncer.cancel(&"config"));
        assert!(!debouncer.cancel(&"config"));
        assert!(debouncer.advance(DELAY).is_empty());
    }

    #[test]
    fn stale_handle_does_not_cancel_newer_entry() {
        let mut debouncer = KeyedDebouncer::new(DELAY);
        let stale = debouncer.schedule("config", 1);
        debouncer.schedule("config", 2);

        assert!(!debouncer.cancel_handle(&"config", stale));
        assert_eq!(debouncer.advance(DELAY), vec![("config", 2)]);
    }

    #[test]
    fn fires_in_deadline_order_across_keys() {
        let mut debouncer = KeyedDebouncer::new(DELAY);
        debouncer.schedule("b", 1);
        debouncer.advance(Duration::from_millis(10));
        debouncer.schedule("a", 2);

        let fired = debouncer.advance(DELAY);
        assert_eq!(fired, vec![("b", 1), ("a", 2)]);
    }

    #[test]
    fn run_all_flushes_regardless_of_deadline() {
        let mut debouncer = KeyedDebouncer::new(DELAY);
        debouncer.schedule("a", 1);
        debouncer.schedule("b", 2);
        let mut fired = debouncer.run_all();
        fired.sort();
        assert_eq!(fired, vec![("a", 1), ("b", 2)]);
    }
}
