//! ## cheap-core::exercise
//! **Stress routines for cursor arenas**
//!
//! Each routine drives an arena until it runs out of space and checks the
//! allocator's guarantees along the way. They are used by the test suite and
//! by `cheap exercise` to smoke-test real devices.

use std::ptr::NonNull;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

use crate::alloc::CursorArena;
use crate::error::{ArenaError, ExerciseError};

/// What a routine did to the arena before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExerciseOutcome {
    /// Blocks filled or verified, or zero rounds completed.
    pub count: usize,
    /// Successful allocations.
    pub allocations: usize,
    /// Allocations refused with `OutOfArenaSpace`.
    pub failures: usize,
    /// Allocations rolled back.
    pub rollbacks: usize,
}

/// Allocates `chunk`-byte blocks until the arena is exhausted.
///
/// Checks that every block honours the default alignment, starts after the
/// previous block, and that `used + available == capacity` after each call.
pub fn fill(arena: &mut CursorArena, chunk: usize) -> Result<ExerciseOutcome, ExerciseError> {
    if chunk == 0 {
        return Err(ExerciseError::InvalidRange { min: 0, max: 0 });
    }

    let alignment = arena.alignment();
    let mut previous_end = arena.base().as_ptr() as usize + arena.used();
    let mut outcome = ExerciseOutcome::default();

    loop {
        let ptr = match arena.alloc(chunk) {
            Ok(ptr) => ptr,
            Err(ArenaError::OutOfArenaSpace { .. }) => {
                outcome.failures += 1;
                break;
            }
            Err(e) => return Err(e.into()),
        };
        outcome.allocations += 1;

        let addr = ptr.as_ptr() as usize;
        if addr % alignment != 0 {
            return Err(ExerciseError::Misaligned { addr, alignment });
        }
        if addr < previous_end {
            return Err(ExerciseError::Overlap { addr, previous_end });
        }
        check_accounting(arena)?;

        previous_end = addr + chunk;
        outcome.count += 1;
    }

    debug!(chunk, count = outcome.count, "fill exhausted arena");
    Ok(outcome)
}

/// Stamps randomly sized blocks with a per-block pattern, then checks that
/// every pattern survived once the arena is full.
pub fn verify(
    arena: &mut CursorArena,
    min: usize,
    max: usize,
    seed: u64,
) -> Result<ExerciseOutcome, ExerciseError> {
    check_range(min, max)?;
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut blocks: Vec<(NonNull<u8>, usize)> = Vec::new();
    let mut failures = 0;

    loop {
        let size = rng.random_range(min..=max);
        let ptr = match arena.alloc(size) {
            Ok(ptr) => ptr,
            Err(ArenaError::OutOfArenaSpace { .. }) => {
                failures += 1;
                break;
            }
            Err(e) => return Err(e.into()),
        };
        // SAFETY: the block was just allocated with `size` bytes.
        unsafe { ptr.as_ptr().write_bytes(pattern(blocks.len()), size) };
        blocks.push((ptr, size));
    }
    check_accounting(arena)?;

    for (index, (ptr, size)) in blocks.iter().enumerate() {
        // SAFETY: blocks never overlap and stay valid while the arena lives.
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), *size) };
        let expected = pattern(index);
        if bytes.iter().any(|b| *b != expected) {
            return Err(ExerciseError::Corrupted {
                index,
                addr: ptr.as_ptr() as usize,
            });
        }
    }

    debug!(blocks = blocks.len(), min, max, seed, "verified block patterns");
    Ok(ExerciseOutcome {
        count: blocks.len(),
        allocations: blocks.len(),
        failures,
        rollbacks: 0,
    })
}

/// Checks that zeroed allocations are zero even when they reuse space that a
/// rolled-back allocation dirtied.
///
/// Each round takes a zeroed block, dirties it, rolls it back, and allocates
/// it again zeroed; the second allocation must land at the same address.
/// The count is the number of rounds run before the arena filled up.
pub fn zero(
    arena: &mut CursorArena,
    min: usize,
    max: usize,
    seed: u64,
) -> Result<ExerciseOutcome, ExerciseError> {
    check_range(min, max)?;
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut outcome = ExerciseOutcome::default();

    loop {
        let size = rng.random_range(min..=max);
        let ptr = match arena.alloc_zeroed(size) {
            Ok(ptr) => ptr,
            Err(ArenaError::OutOfArenaSpace { .. }) => {
                outcome.failures += 1;
                break;
            }
            Err(e) => return Err(e.into()),
        };
        outcome.allocations += 1;
        check_zeroed(ptr, size)?;

        // SAFETY: the block was just allocated with `size` bytes.
        unsafe { ptr.as_ptr().write_bytes(0xff, size) };
        arena.rollback(ptr.as_ptr());
        outcome.rollbacks += 1;

        let again = arena.alloc_zeroed(size)?;
        outcome.allocations += 1;
        if again != ptr {
            return Err(ExerciseError::RollbackMismatch {
                expected: ptr.as_ptr() as usize,
                actual: again.as_ptr() as usize,
            });
        }
        check_zeroed(again, size)?;
        outcome.count += 1;
    }

    debug!(rounds = outcome.count, min, max, seed, "zeroed allocations verified");
    Ok(outcome)
}

fn pattern(index: usize) -> u8 {
    (index as u8).wrapping_mul(31).wrapping_add(7)
}

fn check_range(min: usize, max: usize) -> Result<(), ExerciseError> {
    if min == 0 || min > max {
        return Err(ExerciseError::InvalidRange { min, max });
    }
    Ok(())
}

fn check_zeroed(ptr: NonNull<u8>, size: usize) -> Result<(), ExerciseError> {
    // SAFETY: callers pass a live allocation of `size` bytes.
    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
    if bytes.iter().any(|b| *b != 0) {
        return Err(ExerciseError::NotZeroed {
            addr: ptr.as_ptr() as usize,
        });
    }
    Ok(())
}

fn check_accounting(arena: &CursorArena) -> Result<(), ExerciseError> {
    let (used, available, capacity) = (arena.used(), arena.available(), arena.capacity());
    if used + available != capacity {
        return Err(ExerciseError::Accounting {
            used,
            available,
            capacity,
        });
    }
    Ok(())
}
