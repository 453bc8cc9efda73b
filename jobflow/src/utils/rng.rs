/// Small deterministic RNG used for victim selection.
///
/// XorShift64 with Marsaglia's (13, 7, 17) triple. Victim selection picks
/// among a handful of workers, so statistical quality matters far less than
/// cost. Each worker owns its own instance; the type is not
/// `Copy` so a stream is never duplicated by accident.
#[derive(Clone, Debug)]
pub(crate) struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// Creates a generator from `seed`. Zero is remapped, since it is the
    /// one fixed point of the generator.
    pub(crate) fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self { state }
    }

    /// Derives an independent stream for worker `index` from a shared seed.
    pub(crate) fn for_worker(seed: u64, index: usize) -> Self {
        // SplitMix64 finalizer so neighbouring indices diverge immediately.
        let mut z = seed.wrapping_add((index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        Self::new(z ^ (z >> 31))
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Returns a value in `[0, upper)`.
    ///
    /// Uses Lemire's multiply-shift reduction; the tiny bias it leaves is
    /// irrelevant for scheduling.
    ///
    /// # Panics
    ///
    /// Debug builds panic if `upper == 0`.
    pub(crate) fn next_usize(&mut self, upper: usize) -> usize {
        debug_assert!(upper > 0, "upper bound must be > 0");

        if upper.is_power_of_two() {
            return (self.next_u64() >> 32) as usize & (upper - 1);
        }

        ((self.next_u64() as u128 * upper as u128) >> 64) as usize
    }
}
