use crate::types::AudioData;
use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decode an audio file to raw PCM samples (mono, f32) at its native sample rate
pub fn decode_audio<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let path = path.as_ref();

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probe_result = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Failed to probe audio format")?;

    let mut format = probe_result.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio tracks found in file")?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("Sample rate not specified in audio file")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create decoder")?;

    let mut all_samples = Vec::new();
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(err) => return Err(err).context("Failed to read packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => downmix_into(decoded, &mut all_samples),
            Err(SymphoniaError::DecodeError(msg)) => {
                warn!(file = %path.display(), reason = msg, "skipping corrupt packet");
                skipped_packets += 1;
            }
            Err(err) => return Err(err).context("Failed to decode audio packet"),
        }
    }

    debug!(
        file = %path.display(),
        samples = all_samples.len(),
        sample_rate,
        skipped_packets,
        "decoded audio"
    );

    Ok(AudioData {
        samples: all_samples,
        sample_rate,
    })
}

/// Average every interleaved frame of `buffer` down to one mono sample in [-1.0, 1.0]
fn downmix_into(buffer: AudioBufferRef<'_>, output: &mut Vec<f32>) {
    let spec = *buffer.spec();
    let channels = spec.channels.count().max(1);
    let frames = buffer.frames();
    if frames == 0 {
        return;
    }

    let mut interleaved = SampleBuffer::<f32>::new(buffer.capacity() as u64, spec);
    interleaved.copy_interleaved_ref(buffer);

    output.reserve(frames);
    if channels == 1 {
        output.extend_from_slice(&interleaved.samples()[..frames]);
        return;
    }
    let scale = 1.0 / channels as f32;
    output.extend(
        interleaved
            .samples()
            .chunks_exact(channels)
            .take(frames)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}
