//! Audio test segment generation
//!
//! Segments are silent mono WAV at a low sample rate: the player only
//! probes their duration, so content does not matter and small is fast.

use hound::{WavSpec, WavWriter};
use std::io::Cursor;

/// Sample rate of generated segments
pub const TEST_SAMPLE_RATE: u32 = 8_000;

/// Silent WAV of `duration_ms` milliseconds
pub fn silent_wav(duration_ms: u64) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).expect("create wav writer");
        let total_frames = (TEST_SAMPLE_RATE as u64 * duration_ms) / 1000;
        for _ in 0..total_frames {
            writer.write_sample(0i16).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }
    cursor.into_inner()
}
