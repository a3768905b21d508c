//! Occupancy bit scanning.

use bit_vec::BitVec;

use crate::error::{Error, Result};

const WORD_BITS: usize = u32::BITS as usize;

/// `len` cleared bits, or `AllocationFailure` if the storage cannot be had.
///
/// `BitVec::from_elem` aborts on allocation failure, so the word storage is
/// reserved once up front to find out.
pub(crate) fn try_zeroed(len: usize) -> Result<BitVec> {
    let words = len.div_ceil(WORD_BITS);
    Vec::<u32>::new()
        .try_reserve_exact(words)
        .map_err(|_| Error::alloc::<u32>(words))?;
    Ok(BitVec::from_elem(len, false))
}

/// Index of the first set bit at or after `from`.
///
/// Scans whole storage words, so skipping a run of empty slots costs one
/// comparison per 32 slots.
pub(crate) fn next_set_bit(bits: &BitVec, from: usize) -> Option<usize> {
    let len = bits.len();
    if from >= len {
        return None;
    }

    let storage = bits.storage();
    let mut word = from / WORD_BITS;
    let mut current = storage[word] & (u32::MAX << (from % WORD_BITS));
    loop {
        if current != 0 {
            let idx = word * WORD_BITS + current.trailing_zeros() as usize;
            return (idx < len).then_some(idx);
        }
        word += 1;
        if word >= storage.len() {
            return None;
        }
        current = storage[word];
    }
}
