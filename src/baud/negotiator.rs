//! Baud rate negotiator
//!
//! The UART clock generator divides the source clock by
//! `divisor * (oversample_rate + 5 + adjust_bits / 11)`, where `adjust_bits`
//! is the number of bits set in the 11-bit oversample adjust mask. The search
//! below works in elevenths of a clock so no floating point is needed.

use crate::config::baud::{
    MAX_BAUD_RATE, MAX_DIVISOR, MIN_BAUD_RATE, OVERSAMPLE_ADJUST_BITS, OVERSAMPLE_MAX,
    OVERSAMPLE_MIN, SOURCE_CLOCK_HZ, TOLERANCE_PERMILLE,
};

/// Offset between the oversample field and the real oversampling factor
const OVERSAMPLE_BASE: u32 = 5;

/// Smallest total oversampling, in elevenths
const ELEVENTHS_MIN: u32 = OVERSAMPLE_ADJUST_BITS * (OVERSAMPLE_MIN as u32 + OVERSAMPLE_BASE);

/// Largest total oversampling, in elevenths
const ELEVENTHS_MAX: u32 =
    OVERSAMPLE_ADJUST_BITS * (OVERSAMPLE_MAX as u32 + OVERSAMPLE_BASE) + OVERSAMPLE_ADJUST_BITS - 1;

/// Clock generator settings for one requested baud rate
///
/// Produced by [`negotiate`]. A config with `valid == false` describes a rate
/// the hardware cannot reach and must not be programmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudConfig {
    /// Requested rate
    pub target: u32,
    /// Rate the hardware will actually produce
    pub actual: u32,
    /// Integer clock divisor
    pub divisor: u16,
    /// Oversample field (total oversampling is this plus 5)
    pub oversample_rate: u8,
    /// Fractional oversample mask, one eleventh per set bit
    pub oversample_adjust: u16,
    /// Whether `actual` is within tolerance of `target`
    pub valid: bool,
}

impl BaudConfig {
    fn invalid(target: u32) -> Self {
        Self {
            target,
            actual: 0,
            divisor: 0,
            oversample_rate: 0,
            oversample_adjust: 0,
            valid: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Rate produced by the divisor fields as programmed
    pub fn effective_rate(&self) -> u32 {
        if self.divisor == 0 {
            return 0;
        }
        let elevenths = OVERSAMPLE_ADJUST_BITS * (self.oversample_rate as u32 + OVERSAMPLE_BASE)
            + self.oversample_adjust.count_ones();
        rate_for(self.divisor, elevenths)
    }

    /// Deviation of the actual rate from the target, in permille
    pub fn deviation_permille(&self) -> u32 {
        if self.target == 0 {
            return u32::MAX;
        }
        (self.actual.abs_diff(self.target) as u64 * 1000 / self.target as u64) as u32
    }
}

/// Compute the clock generator settings for `target`
///
/// Tries every oversampling step, picks the divisor closest to the target for
/// each, and keeps the combination with the smallest error. Targets outside
/// the supported range, or whose best error exceeds the tolerance, produce an
/// invalid config.
pub fn negotiate(target: u32) -> BaudConfig {
    if !(MIN_BAUD_RATE..=MAX_BAUD_RATE).contains(&target) {
        return BaudConfig::invalid(target);
    }

    let clock = SOURCE_CLOCK_HZ as u64 * OVERSAMPLE_ADJUST_BITS as u64;
    // (error, divisor, elevenths, actual)
    let mut best: Option<(u32, u16, u32, u32)> = None;

    for elevenths in ELEVENTHS_MIN..=ELEVENTHS_MAX {
        let step = target as u64 * elevenths as u64;
        let divisor = (clock + step / 2) / step;
        if divisor == 0 || divisor > MAX_DIVISOR as u64 {
            continue;
        }

        let divisor = divisor as u16;
        let actual = rate_for(divisor, elevenths);
        let error = actual.abs_diff(target);
        if best.map_or(true, |(best_error, ..)| error < best_error) {
            best = Some((error, divisor, elevenths, actual));
        }
    }

    match best {
        Some((error, divisor, elevenths, actual))
            if error as u64 * 1000 <= target as u64 * TOLERANCE_PERMILLE as u64 =>
        {
            BaudConfig {
                target,
                actual,
                divisor,
                oversample_rate: (elevenths / OVERSAMPLE_ADJUST_BITS - OVERSAMPLE_BASE) as u8,
                oversample_adjust: adjust_mask(elevenths % OVERSAMPLE_ADJUST_BITS),
                valid: true,
            }
        }
        _ => BaudConfig::invalid(target),
    }
}

/// Rate for a divisor and total oversampling in elevenths, rounded
fn rate_for(divisor: u16, elevenths: u32) -> u32 {
    let denominator = divisor as u64 * elevenths as u64;
    let clock = SOURCE_CLOCK_HZ as u64 * OVERSAMPLE_ADJUST_BITS as u64;
    ((clock + denominator / 2) / denominator) as u32
}

/// Spread `bits` set bits evenly over the adjust mask
fn adjust_mask(bits: u32) -> u16 {
    let mut mask = 0u16;
    for i in 0..OVERSAMPLE_ADJUST_BITS {
        if (i + 1) * bits / OVERSAMPLE_ADJUST_BITS > i * bits / OVERSAMPLE_ADJUST_BITS {
            mask |= 1 << i;
        }
    }
    mask
}
