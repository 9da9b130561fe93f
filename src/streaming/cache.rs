// src/streaming/cache.rs
//
// Two-tier chunk cache.
//
// `live` holds every record the window currently cares about (queued,
// building or ready). `cold` holds finished payloads that fell out of the
// live set but may still be restored without a rebuild. Membership is driven
// purely by the spatial window, so there is no recency ordering here.

use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use super::types::{ChunkState, TileKey};

#[derive(Debug)]
pub struct ChunkRecord<P> {
    pub key: TileKey,
    pub state: ChunkState,
    pub payload: Option<P>,
    pub last_touched: Instant,
    /// Retention deadline; set while the key is outside the retained set.
    pub marked_for_removal_at: Option<Instant>,
}

#[derive(Debug)]
struct ColdEntry<P> {
    payload: P,
    expires_at: Instant,
}

/// Result of reconciling the cache against a new window.
#[derive(Debug, Default)]
pub struct WindowDiff {
    /// Keys that got a fresh `Queued` record and need a build job.
    pub to_build: Vec<TileKey>,
    /// Keys restored from the cold tier as `Ready`.
    pub restored: Vec<TileKey>,
}

/// Result of a retention sweep.
#[derive(Debug)]
pub struct SweepResult<P> {
    /// Ready keys moved from live to cold.
    pub evicted: Vec<TileKey>,
    /// Queued/building keys dropped from live (their jobs are now moot).
    pub cancelled: Vec<TileKey>,
    /// Payloads whose lifetime ended; the caller returns their buffers.
    pub released: Vec<P>,
}

impl<P> Default for SweepResult<P> {
    fn default() -> Self {
        Self { evicted: Vec::new(), cancelled: Vec::new(), released: Vec::new() }
    }
}

pub struct ChunkCache<P> {
    live: HashMap<TileKey, ChunkRecord<P>>,
    cold: HashMap<TileKey, ColdEntry<P>>,
}

impl<P> Default for ChunkCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> ChunkCache<P> {
    pub fn new() -> Self {
        Self { live: HashMap::default(), cold: HashMap::default() }
    }

    #[inline]
    pub fn state(&self, key: TileKey) -> Option<ChunkState> {
        self.live.get(&key).map(|r| r.state)
    }

    #[inline]
    pub fn record(&self, key: TileKey) -> Option<&ChunkRecord<P>> {
        self.live.get(&key)
    }

    #[inline]
    pub fn payload(&self, key: TileKey) -> Option<&P> {
        self.live.get(&key).and_then(|r| r.payload.as_ref())
    }

    #[inline]
    pub fn is_cold(&self, key: TileKey) -> bool {
        self.cold.contains_key(&key)
    }

    #[inline]
    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    #[inline]
    pub fn cold_len(&self) -> usize {
        self.cold.len()
    }

    pub fn records(&self) -> impl Iterator<Item = &ChunkRecord<P>> {
        self.live.values()
    }

    /// Reconciles against a new window. Cold hits are restored as `Ready`,
    /// every other missing required key gets a `Queued` record. Retention
    /// timers start for live keys outside `retained` and clear for keys back
    /// inside it.
    pub fn apply_window(
        &mut self,
        required: &HashSet<TileKey>,
        retained: &HashSet<TileKey>,
        now: Instant,
        evict_delay: Duration,
    ) -> WindowDiff {
        let mut diff = WindowDiff::default();

        for &key in required {
            if self.live.contains_key(&key) {
                continue;
            }
            if let Some(cold) = self.cold.remove(&key) {
                self.live.insert(
                    key,
                    ChunkRecord {
                        key,
                        state: ChunkState::Ready,
                        payload: Some(cold.payload),
                        last_touched: now,
                        marked_for_removal_at: None,
                    },
                );
                diff.restored.push(key);
            } else {
                self.live.insert(
                    key,
                    ChunkRecord {
                        key,
                        state: ChunkState::Queued,
                        payload: None,
                        last_touched: now,
                        marked_for_removal_at: None,
                    },
                );
                diff.to_build.push(key);
            }
        }

        for rec in self.live.values_mut() {
            if retained.contains(&rec.key) {
                rec.marked_for_removal_at = None;
                rec.last_touched = now;
            } else if rec.marked_for_removal_at.is_none() {
                rec.marked_for_removal_at = Some(now + evict_delay);
            }
        }

        diff
    }

    /// Moves expired live records out (ready ones to cold) and destroys
    /// expired cold entries.
    pub fn sweep(&mut self, now: Instant, cold_ttl: Duration) -> SweepResult<P> {
        let mut out = SweepResult::default();

        let expired: Vec<TileKey> = self
            .live
            .values()
            .filter(|r| r.marked_for_removal_at.is_some_and(|t| t <= now))
            .map(|r| r.key)
            .collect();

        for key in expired {
            let Some(rec) = self.live.remove(&key) else { continue };
            match (rec.state, rec.payload) {
                (ChunkState::Ready, Some(payload)) => {
                    if let Some(stale) = self.cold.remove(&key) {
                        out.released.push(stale.payload);
                    }
                    self.cold.insert(key, ColdEntry { payload, expires_at: now + cold_ttl });
                    out.evicted.push(key);
                }
                (_, payload) => {
                    out.released.extend(payload);
                    out.cancelled.push(key);
                }
            }
        }

        let dead: Vec<TileKey> =
            self.cold.iter().filter(|(_, e)| e.expires_at <= now).map(|(k, _)| *k).collect();
        for key in dead {
            if let Some(e) = self.cold.remove(&key) {
                out.released.push(e.payload);
            }
        }

        out
    }

    /// `Queued -> Building`. Returns false if the record is gone or not queued.
    pub fn mark_building(&mut self, key: TileKey) -> bool {
        match self.live.get_mut(&key) {
            Some(r) if r.state == ChunkState::Queued => {
                r.state = ChunkState::Building;
                true
            }
            _ => false,
        }
    }

    /// `Building -> Queued`, after a failed build.
    pub fn requeue(&mut self, key: TileKey) -> bool {
        match self.live.get_mut(&key) {
            Some(r) if r.state == ChunkState::Building => {
                r.state = ChunkState::Queued;
                true
            }
            _ => false,
        }
    }

    /// `Building -> Ready`. Hands the payload back if the record was evicted
    /// or superseded in the meantime.
    pub fn mount(&mut self, key: TileKey, payload: P, now: Instant) -> Result<(), P> {
        match self.live.get_mut(&key) {
            Some(r) if r.state == ChunkState::Building => {
                r.state = ChunkState::Ready;
                r.payload = Some(payload);
                r.last_touched = now;
                Ok(())
            }
            _ => Err(payload),
        }
    }

    /// Drops every record in both tiers. Returns the payloads plus the keys
    /// that were ready (and so mounted by the renderer).
    pub fn invalidate_all(&mut self) -> (Vec<P>, Vec<TileKey>) {
        let mut released = Vec::with_capacity(self.live.len() + self.cold.len());
        let mut unmounted = Vec::new();

        for (key, rec) in self.live.drain() {
            if rec.state == ChunkState::Ready {
                unmounted.push(key);
            }
            released.extend(rec.payload);
        }
        released.extend(self.cold.drain().map(|(_, e)| e.payload));

        (released, unmounted)
    }
}
