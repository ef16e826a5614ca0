//! Interesting-value tables (§4.3), transcribed from the reference
//! generator's boundary-constant lists: powers of two, their neighbors, and
//! sign-extension edges for each integer width; zero/one/infinity/NaN and
//! the float-to-int boundary crossings for each float width; a handful of
//! recognizable SIMD lane patterns for `v128`; and 16-byte shuffle-control
//! vectors exercising common lowering idioms for `i8x16.shuffle`.

pub const INTERESTING_I32: &[i32] = &[
    0, 1, 2, 31, 32, 42, 63, 64, 0xff, 0x0fff, 0x1000, 0x1001, 0xffff, 0x7fff_ffff,
    -1, -2, -31, -32, -42, -63, -64, -0xff, -0x0fff, -0x1000, -0x1001, -0xffff, -0x7fff_ffff,
    i32::MIN,
];

pub const INTERESTING_I64: &[i64] = &[
    0, 1, 2, 31, 32, 42, 63, 64, 0xff, 0x0fff, 0x1000, 0x1001, 0xffff, 0x7fff_ffff,
    -1, -2, -31, -32, -42, -63, -64, -0xff, -0x0fff, -0x1000, -0x1001, -0xffff, -0x7fff_ffff,
    i32::MIN as i64,
    0x8000_0000,
    0xffff_ffff,
    -0xffff_ffff,
    i64::MIN,
    i64::MAX,
    -i64::MAX,
];

/// Float boundary constants, including the four powers of two where a
/// float-to-int conversion first overflows its target width (`2^31`,
/// `2^32`, `2^63`, `2^64`, each alongside the representable value just
/// below it), infinities, and NaN.
pub fn interesting_f32() -> [f32; 25] {
    [
        0.0,
        -0.0,
        1.0,
        -1.0,
        4096.0,
        -4096.0,
        2f32.powi(31),
        2f32.powi(31) - 128.0,
        2f32.powi(63),
        2f32.powi(63) - (1u64 << 10) as f32,
        2f32.powi(32),
        2f32.powi(32) - 256.0,
        2f32.powi(64) as f32,
        (2f32.powi(64) - (1u64 << 11) as f32) as f32,
        -(2f32.powi(31)),
        -(2f32.powi(31) - 128.0),
        -(2f32.powi(63)),
        -(2f32.powi(63) - (1u64 << 10) as f32),
        -(2f32.powi(32)),
        -(2f32.powi(32) - 256.0),
        -(2f32.powi(64)),
        -(2f32.powi(64) - (1u64 << 11) as f32),
        f32::INFINITY,
        f32::NEG_INFINITY,
        f32::NAN,
    ]
}

pub fn interesting_f64() -> alloc::vec::Vec<f64> {
    interesting_f32().iter().map(|&v| v as f64).collect()
}

/// Recognizable 128-bit lane patterns: all-zero, two `0x40`/`0x80`/`0xcc`
/// byte splats, all-ones, a mixed ascending/descending byte ramp in each
/// half, and the two one-off-from-splat patterns `0x01..` / `0xfe..`.
pub const INTERESTING_V128: &[u128] = &[
    0x0000_0000_0000_0000_0000_0000_0000_0000,
    0x4040_4040_4040_4040_4040_4040_4040_4040,
    0x8080_8080_8080_8080_8080_8080_8080_8080,
    0xcccc_cccc_cccc_cccc_cccc_cccc_cccc_cccc,
    0xffff_ffff_ffff_ffff_ffff_ffff_ffff_ffff,
    0xfffe_fdfc_cccd_cecf_807f_7e7d_0001_0203,
    0x0001_0203_cccd_cecf_807f_7e7d_fffe_fdfc,
    0x0101_0101_0101_0101_0101_0101_0101_0101,
    0xfefe_fefe_fefe_fefe_fefe_fefe_fefe_fefe,
];

/// Interesting `i8x16.shuffle` control vectors (big-endian lane listing, as
/// the reference corpus writes them): swap-adjacent-pairs, reverse, and
/// interleave idioms at 16/32/64-bit granularities.
pub const INTERESTING_LANEIDX16: &[u128] = &[
    0x0002_0406_080a_0c0e_1012_1416_181a_1c1e,
    0x0103_0507_090b_0d0f_1113_1517_191b_1d1f,
    0x0001_0405_0809_0c0d_1011_1415_1819_1c1d,
    0x0203_0607_0a0b_0e0f_1213_1617_1a1b_1e1f,
    0x0001_0203_0809_0a0b_1011_1213_1819_1a1b,
    0x0405_0607_0c0d_0e0f_1415_1617_1c1d_1e1f,
    0x0001_0203_0405_0607_1011_1213_1415_1617,
    0x0809_0a0b_0c0d_0e0f_1819_1a1b_1c1d_1e1f,
    0x0706_0504_0302_0100_0f0e_0d0c_0b0a_0908,
    0x0605_0407_0201_0003_0e0f_0c0d_0a0b_0809,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_table_contains_exactly_one_nan() {
        let table = interesting_f32();
        assert_eq!(table.iter().filter(|v| v.is_nan()).count(), 1);
    }

    #[test]
    fn i32_table_stays_within_i32_bounds() {
        assert!(INTERESTING_I32.contains(&i32::MIN));
    }
}
