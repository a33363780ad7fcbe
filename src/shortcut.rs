//! Shortcut target sampling: draws long-range ring targets from a 1/d
//! harmonic distribution, the signature of a Kleinberg small-world overlay.

use crate::address::{full, Address};
use num_bigint::{BigInt, BigUint};
use rand::Rng;

/// Draws one shortcut target for `local`, given a network-size estimate
/// `n` (must be `>= 2` for `log2` to be meaningful; callers get `n` from
/// [`crate::estimator`], which always returns at least `count + 1 >= 2`
/// once there is a single neighbor).
pub fn sample_target(local: &Address, n: u64, rng: &mut impl Rng) -> Address {
    let p: f64 = rng.gen_range(0.0..1.0);
    let log2_n = (n.max(2) as f64).log2();
    let ex = 160.0 - (1.0 - p) * log2_n;
    let ex_i = ex.floor();
    let ex_f = ex - ex_i;

    // d = 2^ex_i * 2^ex_f, truncated toward zero (the open question's
    // conservative resolution — see DESIGN.md).
    let factor = 2f64.powf(ex_f);
    let ex_i = ex_i.max(0.0) as u32;
    let base = BigUint::from(1u8) << ex_i;
    let scaled = (base.clone() * BigUint::from((factor * 1_000_000.0) as u64)) / BigUint::from(1_000_000u64);
    let d = if ex_i >= 1 { scaled } else { base };

    let signed: BigInt = if rng.gen_bool(0.5) { BigInt::from(d) } else { -BigInt::from(d) };
    let signed = signed % BigInt::from(full());
    local.offset_by(&signed)
}
