use jobflow::WorkStealingDeque;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const ITEMS: u64 = 100_000;
const THIEVES: usize = 4;

/// One owner pushes `1..=ITEMS`, popping every third push, while
/// `THIEVES` threads steal. Returns everything each side received.
fn run_stress(capacity: usize) -> (Vec<u64>, Vec<Vec<u64>>) {
    let deque = WorkStealingDeque::with_capacity(capacity);
    let done = Arc::new(AtomicBool::new(false));
    let start = Arc::new(Barrier::new(THIEVES + 1));

    let thieves: Vec<_> = (0..THIEVES)
        .map(|_| {
            let stealer = deque.stealer();
            let done = done.clone();
            let start = start.clone();

            thread::spawn(move || {
                let mut stolen = Vec::new();
                start.wait();

                loop {
                    match stealer.steal() {
                        Some(item) => stolen.push(item),
                        None if done.load(Ordering::Acquire) && stealer.is_empty() => break,
                        None => std::hint::spin_loop(),
                    }
                }

                stolen
            })
        })
        .collect();

    start.wait();

    let mut popped = Vec::new();
    for item in 1..=ITEMS {
        deque.push(item);

        if item % 3 == 0 {
            popped.extend(deque.pop());
        }
    }

    while let Some(item) = deque.pop() {
        popped.push(item);
    }
    done.store(true, Ordering::Release);

    let stolen = thieves
        .into_iter()
        .map(|thief| thief.join().unwrap())
        .collect();

    (popped, stolen)
}

fn assert_delivered_exactly_once(popped: &[u64], stolen: &[Vec<u64>]) {
    let mut seen = HashSet::with_capacity(ITEMS as usize);

    for &item in popped.iter().chain(stolen.iter().flatten()) {
        assert!(seen.insert(item), "item {item} delivered twice");
    }

    assert_eq!(seen.len(), ITEMS as usize, "items were lost");
    assert!((1..=ITEMS).all(|item| seen.contains(&item)));
}

#[test]
fn test_stress_every_item_delivered_once() {
    let (popped, stolen) = run_stress(256);
    assert_delivered_exactly_once(&popped, &stolen);
}

#[test]
fn test_stress_with_constant_growth() {
    // Capacity 2 forces a growth on almost every early push, racing steals.
    let (popped, stolen) = run_stress(2);
    assert_delivered_exactly_once(&popped, &stolen);
}

#[test]
fn test_steals_from_one_thief_are_in_push_order() {
    let (_, stolen) = run_stress(64);

    for items in &stolen {
        assert!(
            items.windows(2).all(|pair| pair[0] < pair[1]),
            "a single thief must observe FIFO order"
        );
    }
}

#[test]
fn test_pop_and_steal_race_for_the_last_item() {
    const ROUNDS: usize = 2_000;

    let deque = WorkStealingDeque::with_capacity(2);
    let stealer = deque.stealer();
    let barrier = Arc::new(Barrier::new(2));

    let thief = {
        let barrier = barrier.clone();
        thread::spawn(move || {
            let mut won = Vec::with_capacity(ROUNDS);
            for _ in 0..ROUNDS {
                barrier.wait();
                won.push(stealer.steal());
                barrier.wait();
            }
            won
        })
    };

    let mut owner_won = Vec::with_capacity(ROUNDS);
    for round in 0..ROUNDS {
        deque.push(round);
        barrier.wait();
        owner_won.push(deque.pop());
        barrier.wait();
        assert!(deque.is_empty());
    }

    let thief_won = thief.join().unwrap();

    for round in 0..ROUNDS {
        let winners = [owner_won[round], thief_won[round]]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        assert_eq!(winners, vec![round], "round {round} must have one winner");
    }
}

#[test]
fn test_stealer_outlives_owner() {
    let deque = WorkStealingDeque::new();
    for item in 0..10 {
        deque.push(item);
    }

    let stealer = deque.stealer();
    let handle = thread::spawn(move || std::iter::from_fn(|| stealer.steal()).collect::<Vec<_>>());

    drop(deque);

    let mut stolen = handle.join().unwrap();
    stolen.sort_unstable();
    assert_eq!(stolen, (0..10).collect::<Vec<_>>());
}
