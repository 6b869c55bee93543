//! Aggregation of small fluid losses into emitted lava particles.
//!
//! Drips are accumulated per source position into buckets. A bucket is emitted
//! once it is old enough or big enough, so tiny drips batch into particles
//! without lingering forever.

use basalt_utils::BlockPos;
use basalt_utils::codec::{read_int_array, write_int_array};

use crate::config::SimulationConfig;

/// Ints per persisted bucket: tick, low position bits, high position bits, units.
const RECORD_STRIDE: usize = 4;

/// A pending particle bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticleInfo {
    /// Tick the bucket was created on.
    pub tick_created: i64,
    /// Packed source position, see [`BlockPos::as_i64`].
    pub packed_pos: i64,
    /// Accumulated fluid units.
    pub fluid_units: i32,
}

impl ParticleInfo {
    /// The source position.
    #[must_use]
    pub fn pos(&self) -> BlockPos {
        BlockPos::from_i64(self.packed_pos)
    }

    fn age(&self, tick: i64) -> i64 {
        tick.saturating_sub(self.tick_created).max(0)
    }
}

/// Concurrent map of particle buckets keyed by packed position.
///
/// Drips may be added from any thread; polling is done by the tick thread.
pub struct LavaBlobManager {
    buckets: scc::HashMap<i64, ParticleInfo>,
    min_wait_ticks: i64,
    max_wait_ticks: i64,
    units_per_block: i32,
    units_per_level: i32,
}

impl LavaBlobManager {
    /// Creates an empty manager using the wait times and unit sizes in `config`.
    #[must_use]
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            buckets: scc::HashMap::new(),
            min_wait_ticks: i64::from(config.particle_min_wait_ticks),
            max_wait_ticks: i64::from(config.particle_max_wait_ticks),
            units_per_block: config.fluid_units_per_block as i32,
            units_per_level: config.fluid_units_per_level as i32,
        }
    }

    /// Adds `amount` units to the bucket at `pos`, creating it on `tick` if
    /// absent. Non-positive amounts are ignored.
    pub fn add_fluid(&self, pos: BlockPos, amount: i32, tick: i64) {
        if amount <= 0 {
            return;
        }
        let key = pos.as_i64();
        loop {
            if self
                .buckets
                .update_sync(&key, |_, info| {
                    info.fluid_units = info.fluid_units.saturating_add(amount);
                })
                .is_some()
            {
                return;
            }
            let info = ParticleInfo {
                tick_created: tick,
                packed_pos: key,
                fluid_units: amount,
            };
            if self.buckets.insert_sync(key, info).is_ok() {
                return;
            }
        }
    }

    fn is_eligible(&self, info: &ParticleInfo, tick: i64) -> bool {
        let age = info.age(tick);
        age >= self.max_wait_ticks
            || info.fluid_units >= self.units_per_block
            || (age >= self.min_wait_ticks && info.fluid_units >= self.units_per_level)
    }

    /// Removes and returns up to `max_count` eligible buckets, biggest first,
    /// then oldest first.
    pub fn poll_eligible(&self, tick: i64, max_count: usize) -> Vec<ParticleInfo> {
        let mut candidates = Vec::new();
        self.buckets.iter_sync(|_, info| {
            if self.is_eligible(info, tick) {
                candidates.push(*info);
            }
            true
        });

        candidates.sort_by(|a, b| {
            b.fluid_units
                .cmp(&a.fluid_units)
                .then(a.tick_created.cmp(&b.tick_created))
        });
        candidates.truncate(max_count);

        // the removed value may have grown since the scan
        candidates
            .into_iter()
            .filter_map(|info| self.buckets.remove_sync(&info.packed_pos).map(|(_, info)| info))
            .collect()
    }

    /// Number of pending buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns true if no bucket is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Sum of units over all pending buckets.
    #[must_use]
    pub fn total_units(&self) -> i64 {
        let mut total = 0i64;
        self.buckets.iter_sync(|_, info| {
            total += i64::from(info.fluid_units);
            true
        });
        total
    }

    /// Flattens every bucket into `[tick, pos_low, pos_high, units]` records.
    /// Creation ticks outside the `i32` range saturate.
    #[must_use]
    pub fn serialize(&self) -> Vec<i32> {
        let mut record = Vec::with_capacity(self.buckets.len() * RECORD_STRIDE);
        self.buckets.iter_sync(|_, info| {
            record.extend_from_slice(&[
                info.tick_created
                    .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
                info.packed_pos as i32,
                (info.packed_pos >> 32) as i32,
                info.fluid_units,
            ]);
            true
        });
        record
    }

    /// Loads buckets from a flat record and returns how many were added.
    ///
    /// A record whose length is not a multiple of four loads nothing. Entries
    /// for positions that already have a bucket are dropped.
    pub fn deserialize(&self, record: &[i32]) -> usize {
        if record.len() % RECORD_STRIDE != 0 {
            log::warn!(
                "Discarding lava particle record of invalid length {}",
                record.len()
            );
            return 0;
        }

        let mut loaded = 0;
        for entry in record.chunks_exact(RECORD_STRIDE) {
            let packed_pos = i64::from(entry[1] as u32) | (i64::from(entry[2]) << 32);
            let info = ParticleInfo {
                tick_created: i64::from(entry[0]),
                packed_pos,
                fluid_units: entry[3],
            };
            if info.fluid_units < 0 {
                log::warn!("Discarding lava particle with negative amount at {}", info.pos());
                continue;
            }
            if self.buckets.insert_sync(packed_pos, info).is_ok() {
                loaded += 1;
            } else {
                log::warn!("Discarding duplicate lava particle at {}", info.pos());
            }
        }
        loaded
    }

    /// [`LavaBlobManager::serialize`] wrapped in a length-prefixed int array.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        write_int_array(&self.serialize())
    }

    /// Inverse of [`LavaBlobManager::to_bytes`]. Undecodable input loads nothing.
    pub fn from_bytes(&self, bytes: &[u8]) -> usize {
        match read_int_array(bytes) {
            Ok(record) => self.deserialize(&record),
            Err(error) => {
                log::warn!("Discarding unreadable lava particle record: {error}");
                0
            }
        }
    }
}
