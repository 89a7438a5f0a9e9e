use proptest::prelude::*;

use cheap_core::{ArenaError, CursorArena};

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    AllocAligned(u32, usize),
    RollbackLast,
    RollbackEarlier(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..200_000).prop_map(Op::Alloc),
        2 => (0u32..13, 0usize..200_000).prop_map(|(exp, size)| Op::AllocAligned(exp, size)),
        2 => Just(Op::RollbackLast),
        1 => any::<usize>().prop_map(Op::RollbackEarlier),
    ]
}

fn default_alignment() -> impl Strategy<Value = usize> {
    prop::sample::select(vec![1usize, 2, 4, 8, 16, 32, 64])
}

proptest! {
    #[test]
    fn allocations_honour_alignment_and_bounds(
        alignment in default_alignment(),
        ops in prop::collection::vec(op_strategy(), 1..64),
    ) {
        let mut arena = CursorArena::anonymous(alignment, 1).unwrap();
        let base = arena.base().as_ptr() as usize;
        let capacity = arena.capacity();
        let mut issued: Vec<usize> = Vec::new();

        for op in ops {
            let used_before = arena.used();
            match op {
                Op::Alloc(size) | Op::AllocAligned(_, size) => {
                    let effective = match op {
                        Op::AllocAligned(exp, _) => 1usize << exp,
                        _ => alignment,
                    };
                    let result = match op {
                        Op::AllocAligned(_, _) => arena.alloc_aligned(effective, size),
                        _ => arena.alloc(size),
                    };
                    match result {
                        Ok(ptr) => {
                            let addr = ptr.as_ptr() as usize;
                            prop_assert_eq!(addr % effective, 0);
                            prop_assert!(addr >= base + used_before);
                            prop_assert!(addr + size <= base + capacity);
                            prop_assert_eq!(arena.used(), addr + size - base);
                            prop_assert_eq!(arena.last_allocation(), Some(addr));
                            issued.push(addr);
                        }
                        Err(ArenaError::OutOfArenaSpace { .. }) => {
                            prop_assert_eq!(arena.used(), used_before);
                        }
                        Err(e) => prop_assert!(false, "unexpected error {e}"),
                    }
                }
                Op::RollbackLast => {
                    if let Some(last) = arena.last_allocation() {
                        arena.rollback(last as *const u8);
                        prop_assert_eq!(arena.used(), last - base);
                        prop_assert_eq!(arena.last_allocation(), None);
                    } else {
                        arena.rollback(base as *const u8);
                        prop_assert_eq!(arena.used(), used_before);
                    }
                }
                Op::RollbackEarlier(pick) => {
                    let earlier: Vec<usize> = issued
                        .iter()
                        .copied()
                        .filter(|addr| Some(*addr) != arena.last_allocation())
                        .collect();
                    if !earlier.is_empty() {
                        let addr = earlier[pick % earlier.len()];
                        arena.rollback(addr as *const u8);
                        prop_assert_eq!(arena.used(), used_before);
                    }
                }
            }

            prop_assert!(arena.used() <= capacity);
            prop_assert_eq!(arena.used() + arena.available(), capacity);
        }
    }

    #[test]
    fn unaligned_rollback_restores_cursor_exactly(
        sizes in prop::collection::vec(1usize..10_000, 1..32),
        extra in 1usize..10_000,
    ) {
        let mut arena = CursorArena::anonymous(1, 1).unwrap();
        for size in sizes {
            arena.alloc(size).unwrap();
        }
        let before = arena.used();
        let ptr = arena.alloc(extra).unwrap();
        arena.rollback(ptr.as_ptr());
        prop_assert_eq!(arena.used(), before);
        arena.rollback(ptr.as_ptr());
        prop_assert_eq!(arena.used(), before);
    }

    #[test]
    fn oversized_requests_always_fail(
        alignment in default_alignment(),
        excess in 1usize..1_000_000,
    ) {
        let mut arena = CursorArena::anonymous(alignment, 1).unwrap();
        let request = arena.capacity() + excess;
        let failed = matches!(arena.alloc(request), Err(ArenaError::OutOfArenaSpace { .. }));
        prop_assert!(failed);
        prop_assert_eq!(arena.used(), 0);
    }
}
