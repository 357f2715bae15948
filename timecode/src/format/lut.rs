//! Reverse lookup from LFSR state to ordinal position.
//!
//! The decoded bitstream register is a point somewhere in a sequence of
//! up to ~5 million states; this table maps it back to its position. It
//! is a linear-probing open-addressed table over the full `u128` state,
//! sized to twice the sequence length so probe chains stay short. The
//! largest table (`traktor_mk2_cd`) weighs in around 200 MB, which is why
//! tables are built once and shared between decoders.

use std::collections::TryReserveError;

const EMPTY: u32 = u32::MAX;

#[derive(Debug)]
pub struct Lut {
    keys: Vec<u128>,
    positions: Vec<u32>,
}

impl Lut {
    /// Allocate a table for a sequence of `length` states. Reports
    /// allocation failure instead of aborting, so the caller can surface
    /// it as a build error.
    pub fn with_capacity(length: u32) -> Result<Self, TryReserveError> {
        let slots = length as usize * 2;

        let mut keys = Vec::new();
        keys.try_reserve_exact(slots)?;
        keys.resize(slots, 0);

        let mut positions = Vec::new();
        positions.try_reserve_exact(slots)?;
        positions.resize(slots, EMPTY);

        Ok(Self { keys, positions })
    }

    fn slot_of(&self, key: u128) -> usize {
        let folded = (key as u64) ^ ((key >> 64) as u64);
        let hash = folded.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        (hash % self.keys.len() as u64) as usize
    }

    /// Record `key` at `position`.
    ///
    /// Panics when the key is already present: the sequence declared in
    /// the catalog must not revisit a state, so a duplicate means the
    /// static definition itself is wrong.
    pub fn insert(&mut self, key: u128, position: u32) {
        debug_assert_ne!(position, EMPTY);

        let mut slot = self.slot_of(key);
        while self.positions[slot] != EMPTY {
            assert_ne!(
                self.keys[slot], key,
                "timecode sequence revisits state {key:#x} at position {position}"
            );
            slot = (slot + 1) % self.keys.len();
        }

        self.keys[slot] = key;
        self.positions[slot] = position;
    }

    /// Position of `key` in the sequence, or `None` when the state is not
    /// part of it.
    pub fn lookup(&self, key: u128) -> Option<u32> {
        let mut slot = self.slot_of(key);
        while self.positions[slot] != EMPTY {
            if self.keys[slot] == key {
                return Some(self.positions[slot]);
            }
            slot = (slot + 1) % self.keys.len();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_inserted_states() {
        let mut lut = Lut::with_capacity(100).unwrap();
        for n in 0..100u32 {
            lut.insert(u128::from(n) << 97 | u128::from(n), n);
        }
        for n in 0..100u32 {
            assert_eq!(lut.lookup(u128::from(n) << 97 | u128::from(n)), Some(n));
        }
    }

    #[test]
    fn absent_states_are_not_found() {
        let mut lut = Lut::with_capacity(10).unwrap();
        lut.insert(0x59017, 0);
        assert_eq!(lut.lookup(0x59018), None);
        assert_eq!(lut.lookup(0), None);
    }

    #[test]
    fn colliding_hashes_probe_to_distinct_slots() {
        let mut lut = Lut::with_capacity(4).unwrap();
        // identical folded hash, distinct keys
        let a = 0xdead_beef_u128;
        let b = a << 64;
        lut.insert(a, 1);
        lut.insert(b, 2);
        assert_eq!(lut.lookup(a), Some(1));
        assert_eq!(lut.lookup(b), Some(2));
    }

    #[test]
    #[should_panic(expected = "revisits state")]
    fn duplicate_states_are_rejected() {
        let mut lut = Lut::with_capacity(10).unwrap();
        lut.insert(0x22c90, 0);
        lut.insert(0x22c90, 5);
    }
}
