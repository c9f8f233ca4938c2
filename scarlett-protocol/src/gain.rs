//! Mixer gain conversions
//!
//! The device keeps mixer gains as half-dB steps in `[-160, 12]`, the
//! software configuration stores them as IEEE-754 singles and SET_MIX puts a
//! linear 16-bit code on the wire where 8192 is unity gain.

/// Lowest gain level (-80 dB in half-dB steps)
pub const MIXER_LEVEL_MIN: i32 = -160;
/// Highest gain level (+6 dB in half-dB steps)
pub const MIXER_LEVEL_MAX: i32 = 12;

/// SET_MIX code for 0 dB
pub const UNITY_GAIN_CODE: u16 = 8192;

/// Convert the bit pattern of an `f32` into a clamped mixer level.
///
/// Works purely on the bit pattern: magnitudes below 0.5 give 0, exponents
/// past 2^6 saturate to the signed extreme, everything else is the integer
/// part of the significand. NaN and infinity fall out of the exponent test.
pub fn float_bits_to_mixer_level(v: u32) -> i32 {
    let exp = (v >> 23) & 0xff;
    if exp < 0x7e {
        return 0;
    }

    let negative = v >> 31 != 0;
    if exp > 0x85 {
        return if negative {
            MIXER_LEVEL_MIN
        } else {
            MIXER_LEVEL_MAX
        };
    }

    // 24-bit normalised significand, shifted down to its integer part
    let frac = ((v & 0x007f_ffff) | 0x0080_0000) >> (0x95 - exp);
    let level = if negative {
        -(frac as i32)
    } else {
        frac as i32
    };

    level.clamp(MIXER_LEVEL_MIN, MIXER_LEVEL_MAX)
}

/// Convenience wrapper over [`float_bits_to_mixer_level`]
pub fn f32_to_mixer_level(v: f32) -> i32 {
    float_bits_to_mixer_level(v.to_bits())
}

/// Decibel value of a SET_MIX gain code, `20 * log10(code / 8192)`.
///
/// Code 0 yields negative infinity.
pub fn gain_code_to_db(code: u16) -> f64 {
    20.0 * (f64::from(code) / f64::from(UNITY_GAIN_CODE)).log10()
}
