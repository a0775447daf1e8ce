use rand_core::CryptoRngCore;


/// If the condition is not met, return an `InvalidArgument` error with the
/// given message. Modeled on the macro of the same name in the `anyhow` crate.
macro_rules! ensure {
    ($cond:expr, $msg:expr $(,)?) => {
        if !$cond {
            return Err($crate::Error::InvalidArgument($msg.into()));
        }
    };
}

pub(crate) use ensure; // make available throughout crate


/// Draws a uniform integer in `[0, bound)` from the secure random source.
///
/// Uses rejection sampling so the result is unbiased for every bound; the
/// expected number of draws is below two.
pub(crate) fn random_below(rng: &mut impl CryptoRngCore, bound: u32) -> u32 {
    debug_assert!(bound > 0, "random_below: zero bound");
    if bound <= 1 {
        return 0;
    }
    // u32::MAX = q * bound + r; values below q * bound are unbiased
    let threshold = u32::MAX - (u32::MAX % bound);
    loop {
        let v = rng.next_u32();
        if v < threshold {
            return v % bound;
        }
    }
}
