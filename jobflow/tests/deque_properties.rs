use jobflow::WorkStealingDeque;

use proptest::prelude::*;
use std::collections::VecDeque;

const PROPTEST_CASES: u32 = 64;

#[derive(Clone, Debug)]
enum Op {
    Push(u32),
    Pop,
    Steal,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u32>().prop_map(Op::Push),
        1 => Just(Op::Pop),
        1 => Just(Op::Steal),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

    #[test]
    fn sequential_ops_match_a_vecdeque(
        capacity in 0usize..16,
        ops in proptest::collection::vec(op(), 0..512),
    ) {
        let deque = WorkStealingDeque::with_capacity(capacity);
        let stealer = deque.stealer();
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                Op::Push(value) => {
                    deque.push(value);
                    model.push_back(value);
                }
                Op::Pop => prop_assert_eq!(deque.pop(), model.pop_back()),
                Op::Steal => prop_assert_eq!(stealer.steal(), model.pop_front()),
            }

            prop_assert_eq!(deque.len(), model.len());
            prop_assert_eq!(deque.is_empty(), model.is_empty());
            prop_assert!(deque.capacity().is_power_of_two());
            prop_assert!(deque.len() < deque.capacity());
        }
    }

    #[test]
    fn pop_drains_in_reverse_push_order(values in proptest::collection::vec(any::<u64>(), 0..300)) {
        let deque = WorkStealingDeque::with_capacity(2);
        for &value in &values {
            deque.push(value);
        }

        let drained: Vec<_> = std::iter::from_fn(|| deque.pop()).collect();
        let expected: Vec<_> = values.iter().rev().copied().collect();
        prop_assert_eq!(drained, expected);
        prop_assert!(deque.is_empty());
    }

    #[test]
    fn steal_drains_in_push_order(values in proptest::collection::vec(any::<u64>(), 0..300)) {
        let deque = WorkStealingDeque::with_capacity(2);
        let stealer = deque.stealer();
        for &value in &values {
            deque.push(value);
        }

        let drained: Vec<_> = std::iter::from_fn(|| stealer.steal()).collect();
        prop_assert_eq!(drained, values);
        prop_assert!(stealer.is_empty());
    }
}
