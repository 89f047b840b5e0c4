//! Decides, per file, whether re-encoding is worth it.

use strum_macros::Display;

use crate::codec::TargetCodec;
use crate::probe::AudioInfo;

/// Lossy sources closer than this (percent of the source rate) to the target
/// bitrate are copied instead of re-encoded.
pub const BITRATE_TOLERANCE_PERCENT: f64 = 10.0;

const LOSSLESS_CODECS: &[&str] = &["flac"];
const LOSSY_CODECS: &[&str] = &["mp3", "aac", "opus", "wma", "ogg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Decision {
    Convert,
    Copy,
}

/// Chooses between transcoding and copying a source file.
///
/// Never re-encodes to a higher nominal bitrate and never re-encodes a lossy
/// file whose bitrate is already within tolerance of the target, whether or
/// not the codecs match.
pub fn decide(source: &AudioInfo, target: TargetCodec, target_bitrate_kbps: u32) -> Decision {
    let source_codec = source.codec.to_lowercase();
    let target_name = target.to_string();
    let source_bps = source.bitrate.unwrap_or(0);
    let target_bps = u64::from(target.effective_bitrate(target_bitrate_kbps)) * 1000;

    if source_codec != target_name {
        if LOSSLESS_CODECS.contains(&source_codec.as_str()) {
            return Decision::Convert;
        }
        if LOSSY_CODECS.contains(&source_codec.as_str())
            && LOSSY_CODECS.contains(&target_name.as_str())
        {
            return if bitrate_difference_percent(source_bps, target_bps)
                < BITRATE_TOLERANCE_PERCENT
            {
                Decision::Copy
            } else {
                Decision::Convert
            };
        }
        return Decision::Convert;
    }

    // Same codec. A lossless target carries no bitrate constraint.
    if target.is_lossless() {
        return Decision::Copy;
    }
    // a re-encode a few kbps down only costs quality
    if bitrate_difference_percent(source_bps, target_bps) < BITRATE_TOLERANCE_PERCENT {
        return Decision::Copy;
    }
    if source_bps > target_bps {
        Decision::Convert
    } else {
        Decision::Copy
    }
}

/// `|source - target| / source * 100`, or 0 when the source rate is unknown
fn bitrate_difference_percent(source_bps: u64, target_bps: u64) -> f64 {
    if source_bps == 0 {
        return 0.0;
    }
    source_bps.abs_diff(target_bps) as f64 / source_bps as f64 * 100.0
}
