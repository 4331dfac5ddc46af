/// RMS-based voice activity detection with a hangover period.
///
/// Audio power above the threshold flips the detector to voiced; when
/// power falls below it, the voiced state persists for the hangover
/// duration so short pauses do not split an utterance in two.
#[derive(Clone, Copy, Debug, PartialEq)]
enum VadState {
    Silence,
    Voice { hangover_remaining_ms: f64 },
}

pub struct VoiceActivityDetector {
    threshold_db: f32,
    hangover_ms: u32,
    sample_rate: u32,
    state: VadState,
}

impl VoiceActivityDetector {
    pub fn new(threshold_db: f32, hangover_ms: u32, sample_rate: u32) -> Self {
        Self {
            threshold_db,
            hangover_ms,
            sample_rate,
            state: VadState::Silence,
        }
    }

    /// Feeds one chunk of mono f32 samples; returns whether the detector
    /// considers the stream voiced after this chunk.
    pub fn process(&mut self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return self.is_voice();
        }

        let db = rms_db(samples);
        let duration_ms = samples.len() as f64 / self.sample_rate as f64 * 1000.0;
        let detected = db > self.threshold_db;

        self.state = match self.state {
            VadState::Silence => {
                if detected {
                    log::debug!("Voice onset ({db:.1} dB)");
                    VadState::Voice {
                        hangover_remaining_ms: self.hangover_ms as f64,
                    }
                } else {
                    VadState::Silence
                }
            }
            VadState::Voice {
                hangover_remaining_ms,
            } => {
                if detected {
                    VadState::Voice {
                        hangover_remaining_ms: self.hangover_ms as f64,
                    }
                } else if hangover_remaining_ms > duration_ms {
                    VadState::Voice {
                        hangover_remaining_ms: hangover_remaining_ms - duration_ms,
                    }
                } else {
                    log::debug!("Voice offset ({db:.1} dB)");
                    VadState::Silence
                }
            }
        };

        self.is_voice()
    }

    pub fn is_voice(&self) -> bool {
        matches!(self.state, VadState::Voice { .. })
    }

    pub fn reset(&mut self) {
        self.state = VadState::Silence;
    }
}

/// Signal power in dBFS. Pure silence maps to -100 dB.
fn rms_db(samples: &[f32]) -> f32 {
    let mean_square: f64 = samples
        .iter()
        .map(|&s| {
            let s = s as f64;
            s * s
        })
        .sum::<f64>()
        / samples.len() as f64;
    let rms = mean_square.sqrt() as f32;
    if rms <= 0.0 {
        -100.0
    } else {
        20.0 * rms.log10()
    }
}
