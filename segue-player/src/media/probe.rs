//! Segment duration probing using symphonia
//!
//! The controller only needs the duration of a segment before it can play.
//! Most containers state it in the header, so a prefix of the resource is
//! enough. Streams without a frame count (some MP3s) are scanned packet by
//! packet once the whole resource is available.

use crate::error::MediaError;
use std::io::Cursor;
use std::time::Duration;
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;
use tracing::debug;

/// File extension of a locator, ignoring any query string
pub fn extension_hint(locator: &str) -> Option<String> {
    let path = locator.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

fn open(bytes: Vec<u8>, extension: Option<&str>) -> Result<Box<dyn FormatReader>, MediaError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| MediaError::Decode(format!("Failed to probe format: {}", e)))?;

    Ok(probed.format)
}

fn default_track(format: &dyn FormatReader) -> Result<(u32, Option<TimeBase>, Option<u64>, Option<u32>), MediaError> {
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| MediaError::Decode("No audio track found".to_string()))?;

    let params = &track.codec_params;
    Ok((track.id, params.time_base, params.n_frames, params.sample_rate))
}

fn to_duration(ticks: u64, time_base: Option<TimeBase>, sample_rate: Option<u32>) -> Option<Duration> {
    if let Some(tb) = time_base {
        let time = tb.calc_time(ticks);
        return Some(Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac));
    }
    sample_rate
        .filter(|rate| *rate > 0)
        .map(|rate| Duration::from_secs_f64(ticks as f64 / rate as f64))
}

/// Duration stated in the container header
///
/// `Ok(None)` means the format is readable but does not declare its length;
/// use [`scan_duration`] on the complete resource.
pub fn probe_duration(bytes: Vec<u8>, extension: Option<&str>) -> Result<Option<Duration>, MediaError> {
    let format = open(bytes, extension)?;
    let (_, time_base, n_frames, sample_rate) = default_track(format.as_ref())?;

    let duration = n_frames.and_then(|frames| to_duration(frames, time_base, sample_rate));
    match duration {
        Some(d) if !d.is_zero() => {
            debug!("Probed duration {:.3}s from header", d.as_secs_f64());
            Ok(Some(d))
        }
        _ => Ok(None),
    }
}

/// Duration by summing packet durations of a complete resource
pub fn scan_duration(bytes: Vec<u8>, extension: Option<&str>) -> Result<Duration, MediaError> {
    let mut format = open(bytes, extension)?;
    let (track_id, time_base, _, sample_rate) = default_track(format.as_ref())?;

    let mut ticks: u64 = 0;
    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() == track_id {
                    ticks += packet.dur();
                }
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(MediaError::Decode(format!("Failed to read packet: {}", e))),
        }
    }

    let duration = to_duration(ticks, time_base, sample_rate)
        .filter(|d| !d.is_zero())
        .ok_or_else(|| MediaError::Decode("Segment has no playable audio".to_string()))?;
    debug!("Scanned duration {:.3}s ({} ticks)", duration.as_secs_f64(), ticks);
    Ok(duration)
}

/// Duration of a complete resource: header first, packet scan otherwise
pub fn resource_duration(bytes: Vec<u8>, extension: Option<&str>) -> Result<Duration, MediaError> {
    if let Some(duration) = probe_duration(bytes.clone(), extension)? {
        return Ok(duration);
    }
    scan_duration(bytes, extension)
}
