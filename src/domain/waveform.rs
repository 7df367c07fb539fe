//! Infrared Waveform Encoding
//!
//! Converts raw pulse/gap durations into the signed 16-bit samples the
//! blaster firmware consumes.
//!
//! ```text
//! duration (ns) ──► µs = ns / 1000
//!                   µs <= i16::MAX  ──► sample =  µs
//!                   µs >  i16::MAX  ──► sample = -(µs / 1000)   (long gap, ms granularity)
//! ```
//!
//! The conversion is lossy and truncating. It must stay bit-for-bit
//! compatible with the firmware, including 16-bit wrap-around of huge gaps.

const NANOS_PER_MICRO: u32 = 1_000;
const MICROS_PER_MILLI: u32 = 1_000;

/// Encode a single pulse duration in nanoseconds.
pub fn encode_pulse(duration_ns: u32) -> i16 {
    let micros = duration_ns / NANOS_PER_MICRO;
    if micros > i16::MAX as u32 {
        // Truncate to 16 bits before negating, like the firmware's reference encoder.
        ((micros / MICROS_PER_MILLI) as i16).wrapping_neg()
    } else {
        micros as i16
    }
}

/// Encode a pulse sequence. Output has the same length and order as the input.
pub fn encode_pulses(durations_ns: &[u32]) -> Vec<i16> {
    durations_ns.iter().copied().map(encode_pulse).collect()
}
