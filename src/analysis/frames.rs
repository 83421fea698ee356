//! Frame-rate contract shared by every per-frame descriptor and by the aligner.
//!
//! Frames are centred: frame `k` covers samples around `k * HOP_LENGTH`, so a
//! waveform of `n` samples always yields `1 + n / HOP_LENGTH` frames.

/// Hop between consecutive analysis frames, in samples.
pub const HOP_LENGTH: usize = 512;
/// Analysis window (and FFT) length, in samples.
pub const FFT_SIZE: usize = 2048;
/// Duration of one coarse frame used for framewise pitch and vibrato.
pub const COARSE_FRAME_SECS: f32 = 0.5;

/// Number of fine frames produced for a waveform of `sample_count` samples.
pub fn frame_count(sample_count: usize) -> usize {
    1 + sample_count / HOP_LENGTH
}

pub fn frame_to_sample(frame: usize) -> usize {
    frame * HOP_LENGTH
}

pub fn frame_to_seconds(frame: usize, sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    frame_to_sample(frame) as f32 / sample_rate as f32
}

/// Fine frames per second for the given sample rate.
pub fn frame_rate(sample_rate: u32) -> f32 {
    sample_rate as f32 / HOP_LENGTH as f32
}

/// Number of fine frames grouped into one coarse frame, never less than one.
pub fn coarse_frame_length(sample_rate: u32) -> usize {
    ((COARSE_FRAME_SECS * frame_rate(sample_rate)).floor() as usize).max(1)
}

/// Number of coarse frames covering `fine_frames` fine frames.
pub fn coarse_frame_count(fine_frames: usize, block: usize) -> usize {
    fine_frames.div_ceil(block.max(1))
}
