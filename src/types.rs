//! Core types shared by the decoder and the analysis pipeline

/// Raw audio data representation (mono, f32 samples)
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples, normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g., 44100)
    pub sample_rate: u32,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds; zero when the sample rate is unknown.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::AudioData;

    #[test]
    fn duration_follows_sample_rate() {
        let audio = AudioData::new(vec![0.0; 8_000], 16_000);
        assert!((audio.duration_secs() - 0.5).abs() < 1e-6);
        assert!(!audio.is_empty());
    }

    #[test]
    fn zero_rate_reports_zero_duration() {
        let audio = AudioData::new(vec![0.0; 10], 0);
        assert_eq!(audio.duration_secs(), 0.0);
    }
}
