//! Partial slot reservation and stealing policy.
//!
//! Every channel reserves a share of the 32 global slots. A note-on
//! first takes idle slots (preferring the channel's own reservation);
//! when none are idle the allocator names victims in two passes:
//! first other channels' voices squatting on the requesting channel's
//! reserved slots, then the channel's own voices. Within a pass the
//! oldest voice goes first, with the lower slot index breaking ties.
//!
//! The allocator only decides; it never touches slot state. Callers
//! apply the returned eviction list so the poly bookkeeping that hangs
//! off each victim can be updated in the same place. A request that
//! cannot be met even with stealing returns `None` and changes
//! nothing, which is what lets a scarce note drop silently.

use crate::partial::{PARTIAL_COUNT, PartialPool};

/// Number of channels sharing the pool. Channel 8 is the rhythm
/// channel.
pub const CHANNEL_COUNT: usize = 9;

/// Power-on reservation shares, one per channel. They sum to the full
/// pool.
pub const DEFAULT_RESERVATIONS: [u8; CHANNEL_COUNT] = [3, 10, 6, 4, 3, 0, 0, 0, 6];

/// One voice the caller must tear down before an allocation proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evicted {
    /// Global slot index to hard-cut.
    pub slot: u8,
    /// Channel that owned the voice.
    pub channel: u8,
    /// Poly slot within that channel.
    pub poly_slot: u8,
    /// Partial index within that poly.
    pub partial_index: u8,
}

/// Slot-to-channel reservation map plus the stealing policy.
#[derive(Debug, Clone)]
pub struct PartialAllocator {
    /// Which channel each slot is reserved for.
    reserved_for: [u8; PARTIAL_COUNT],
}

impl Default for PartialAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialAllocator {
    /// Allocator with the power-on reservation shares.
    pub fn new() -> Self {
        let mut allocator = Self {
            reserved_for: [0; PARTIAL_COUNT],
        };
        allocator.set_reservations(&DEFAULT_RESERVATIONS);
        allocator
    }

    /// Install new per-channel shares.
    ///
    /// Slots are dealt out in channel order until the pool runs dry;
    /// shares past that point are ignored. Slots left over when the
    /// shares sum short of the pool fall to channel 0.
    pub fn set_reservations(&mut self, shares: &[u8; CHANNEL_COUNT]) {
        let mut slot = 0usize;
        for (channel, &share) in shares.iter().enumerate() {
            for _ in 0..share {
                if slot >= PARTIAL_COUNT {
                    return;
                }
                self.reserved_for[slot] = channel as u8;
                slot += 1;
            }
        }
        for remaining in &mut self.reserved_for[slot..] {
            *remaining = 0;
        }
    }

    /// Channel a slot is reserved for.
    #[inline]
    pub fn reserved_channel(&self, slot: usize) -> u8 {
        self.reserved_for[slot]
    }

    /// Number of slots reserved for a channel.
    pub fn reserved_count(&self, channel: u8) -> usize {
        self.reserved_for.iter().filter(|&&c| c == channel).count()
    }

    /// Pick an idle slot for a channel, preferring its own reservation.
    pub fn claim(&self, pool: &PartialPool, channel: u8) -> Option<usize> {
        let idle = |slot: usize| !pool.slot(slot).is_active();
        (0..PARTIAL_COUNT)
            .find(|&slot| self.reserved_for[slot] == channel && idle(slot))
            .or_else(|| (0..PARTIAL_COUNT).find(|&slot| idle(slot)))
    }

    /// Name the voices that must die for `needed` slots to open up.
    ///
    /// Returns `None` when even full stealing cannot cover the request;
    /// nothing is evicted in that case. An empty list means enough
    /// slots are already idle.
    pub fn request_free(
        &self,
        pool: &PartialPool,
        channel: u8,
        needed: usize,
    ) -> Option<Vec<Evicted>> {
        let shortfall = needed.saturating_sub(pool.free_count());
        if shortfall == 0 {
            return Some(Vec::new());
        }

        let mut victims = self.candidates(pool, |slot, owner| {
            self.reserved_for[slot] == channel && owner != channel
        });
        if victims.len() < shortfall {
            let own = self.candidates(pool, |_, owner| owner == channel);
            victims.extend(own);
        }
        if victims.len() < shortfall {
            tracing::debug!(channel, needed, "note dropped, pool exhausted");
            return None;
        }

        victims.truncate(shortfall);
        tracing::debug!(channel, stolen = victims.len(), "stealing partials");
        Some(victims)
    }

    /// Active voices matching `select`, oldest first, lower slot index
    /// breaking ties.
    fn candidates(
        &self,
        pool: &PartialPool,
        select: impl Fn(usize, u8) -> bool,
    ) -> Vec<Evicted> {
        let mut found: Vec<(u64, Evicted)> = (0..PARTIAL_COUNT)
            .filter_map(|slot| {
                let partial = pool.slot(slot);
                let owner = partial.channel()?;
                if !select(slot, owner) {
                    return None;
                }
                Some((
                    partial.age(),
                    Evicted {
                        slot: slot as u8,
                        channel: owner,
                        poly_slot: partial.poly_slot()?,
                        partial_index: partial.partial_index()?,
                    },
                ))
            })
            .collect();
        found.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.slot.cmp(&b.1.slot)));
        found.into_iter().map(|(_, evicted)| evicted).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partial::{Partial, PartialStart};
    use crate::patch::{EnvParam, PartialParam, PatchCache, PatchParam, TimbreParam};
    use crate::rom::testing::small_rom;
    use crate::tables::testing::shared;
    use std::sync::Arc;

    fn test_cache() -> Arc<PatchCache> {
        let param = PartialParam {
            pitch_coarse: 24,
            pitch_fine: 50,
            amp_level: 100,
            amp_velo_sense: 50,
            amp_env: EnvParam {
                levels: [100, 100, 100, 100, 0],
                segments: 4,
                ..EnvParam::default()
            },
            ..PartialParam::default()
        };
        let patch = PatchParam {
            key_shift: 24,
            fine_tune: 50,
            ..PatchParam::default()
        };
        let timbre = TimbreParam {
            name: *b"ALLOCTEST ",
            structure12: 0,
            structure34: 0,
            enable_mask: 0b0001,
            non_sustain: false,
            partials: [param; 4],
        };
        PatchCache::build(&patch, &timbre)
    }

    fn occupy(pool: &mut PartialPool, slot: usize, channel: u8, poly_slot: u8) {
        let rom = small_rom();
        let tables = shared();
        let start = PartialStart {
            channel,
            poly_slot,
            partial_index: 0,
            note: 60,
            velocity: 100,
            cache: test_cache(),
            pair_slot: None,
            bend_ratio: 1.0,
            modulation: 0,
            channel_gain: 1.0,
            pan_left: 0.7,
            pan_right: 0.7,
            extra_gain: 1.0,
            master_tune_ratio: 1.0,
        };
        pool.slot_mut(slot).activate(start, &rom, tables);
    }

    fn fill_pool(pool: &mut PartialPool, channel: u8) {
        for slot in 0..PARTIAL_COUNT {
            if !pool.slot(slot).is_active() {
                occupy(pool, slot, channel, slot as u8 % 8);
            }
        }
    }

    #[test]
    fn test_default_reservations_cover_the_pool() {
        let allocator = PartialAllocator::new();
        let total: usize = (0..CHANNEL_COUNT as u8)
            .map(|c| allocator.reserved_count(c))
            .sum();
        assert_eq!(total, PARTIAL_COUNT);
        assert_eq!(allocator.reserved_count(0), 3);
        assert_eq!(allocator.reserved_count(1), 10);
        assert_eq!(allocator.reserved_count(8), 6, "rhythm share");
        assert_eq!(allocator.reserved_channel(0), 0);
        assert_eq!(allocator.reserved_channel(3), 1, "slots deal in channel order");
    }

    #[test]
    fn test_oversubscribed_reservations_cap_at_pool_size() {
        let mut allocator = PartialAllocator::new();
        allocator.set_reservations(&[8; CHANNEL_COUNT]);
        assert_eq!(allocator.reserved_count(0), 8);
        assert_eq!(allocator.reserved_count(3), 8);
        assert_eq!(allocator.reserved_count(4), 0, "pool ran dry at channel 3");
    }

    #[test]
    fn test_undersubscribed_remainder_falls_to_channel_zero() {
        let mut allocator = PartialAllocator::new();
        allocator.set_reservations(&[0, 4, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(allocator.reserved_count(1), 4);
        assert_eq!(allocator.reserved_count(0), PARTIAL_COUNT - 4);
    }

    #[test]
    fn test_claim_prefers_own_reservation() {
        let allocator = PartialAllocator::new();
        let pool = PartialPool::new();
        // Channel 1's reservation starts after channel 0's three slots.
        assert_eq!(allocator.claim(&pool, 1), Some(3));
        assert_eq!(allocator.claim(&pool, 0), Some(0));
    }

    #[test]
    fn test_claim_falls_back_to_any_idle_slot() {
        let allocator = PartialAllocator::new();
        let mut pool = PartialPool::new();
        // Channel 5 reserves nothing by default.
        assert_eq!(allocator.reserved_count(5), 0);
        occupy(&mut pool, 0, 0, 0);
        assert_eq!(allocator.claim(&pool, 5), Some(1));
    }

    #[test]
    fn test_request_free_is_empty_when_slots_are_idle() {
        let allocator = PartialAllocator::new();
        let pool = PartialPool::new();
        assert_eq!(allocator.request_free(&pool, 0, 4), Some(Vec::new()));
    }

    #[test]
    fn test_steals_squatters_on_reserved_slots_first() {
        let allocator = PartialAllocator::new();
        let mut pool = PartialPool::new();
        fill_pool(&mut pool, 2);
        // Channel 2 squats everywhere, including channel 1's slots 3-12.
        for _ in 0..5 {
            pool.age_tick();
        }
        // Channel 1 also holds one voice of its own; squatters on the
        // reservation must still be named before it.
        occupy(&mut pool, 20, 1, 0);

        let victims = allocator
            .request_free(&pool, 1, 1)
            .expect("stealing must cover one slot");
        assert_eq!(victims.len(), 1);
        assert_eq!(victims[0].channel, 2, "others on my reservation go first");
        assert_eq!(victims[0].slot, 3, "oldest tie broken by lowest slot");
    }

    #[test]
    fn test_steals_own_oldest_when_no_squatters() {
        let allocator = PartialAllocator::new();
        let mut pool = PartialPool::new();
        fill_pool(&mut pool, 1);
        // Restart slot 7 so it is the junior voice.
        pool.age_tick();
        occupy(&mut pool, 7, 1, 3);
        for _ in 0..9 {
            pool.age_tick();
        }

        let victims = allocator
            .request_free(&pool, 1, 2)
            .expect("own voices are stealable");
        assert_eq!(victims.len(), 2);
        assert_eq!(victims[0].channel, 1);
        // All voices aged together except slot 7; oldest-first with the
        // slot index tie-break picks 0 then 1.
        assert_eq!(victims[0].slot, 0);
        assert_eq!(victims[1].slot, 1);
    }

    #[test]
    fn test_oldest_voice_dies_first() {
        let allocator = PartialAllocator::new();
        let mut pool = PartialPool::new();
        occupy(&mut pool, 5, 1, 0);
        pool.age_tick();
        pool.age_tick();
        occupy(&mut pool, 3, 1, 1); // younger, lower slot
        pool.age_tick();
        fill_pool(&mut pool, 1);

        let victims = allocator
            .request_free(&pool, 1, 1)
            .expect("pool is stealable");
        assert_eq!(victims[0].slot, 5, "age outranks slot index");
    }

    #[test]
    fn test_unmeetable_request_changes_nothing() {
        let allocator = PartialAllocator::new();
        let mut pool = PartialPool::new();
        fill_pool(&mut pool, 2);

        // Channel 1 wants more than the whole pool.
        assert_eq!(
            allocator.request_free(&pool, 1, PARTIAL_COUNT + 1),
            None,
            "impossible requests report failure"
        );
        assert_eq!(pool.free_count(), 0, "no eviction happened");
    }

    #[test]
    fn test_request_larger_than_candidates_is_refused() {
        let allocator = PartialAllocator::new();
        let mut pool = PartialPool::new();
        // Channel 2 holds thirty voices; two slots stay idle.
        for slot in 0..PARTIAL_COUNT - 2 {
            occupy(&mut pool, slot, 2, 0);
        }
        assert!(allocator.request_free(&pool, 1, 4).is_some());
        assert!(allocator.request_free(&pool, 1, PARTIAL_COUNT + 4).is_none());
    }
}
