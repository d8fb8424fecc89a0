use anyhow::{ensure, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

/// Pre-recorded audio served as captured audio after a detection
pub struct CaptureClip {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved 16-bit PCM
    pub samples: Vec<i16>,
}

/// The engine buffers 16-bit PCM only.
fn check_pcm16(spec: &WavSpec) -> Result<()> {
    ensure!(
        spec.sample_format == SampleFormat::Int && spec.bits_per_sample == 16,
        "capture clip must be 16-bit PCM, got {}-bit {:?}",
        spec.bits_per_sample,
        spec.sample_format
    );
    ensure!(spec.channels > 0, "capture clip has no channels");
    Ok(())
}

fn read_pcm16<R: Read>(reader: WavReader<R>) -> Result<(WavSpec, Vec<i16>)> {
    let spec = reader.spec();
    check_pcm16(&spec)?;
    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .context("truncated PCM data")?;
    Ok((spec, samples))
}

impl CaptureClip {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open capture clip {}", path.display()))?;
        let (spec, samples) =
            read_pcm16(reader).with_context(|| format!("Rejected {}", path.display()))?;

        let clip = Self {
            path: path.to_path_buf(),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        };
        info!(
            "Capture clip {}: {} frames at {}Hz ({} ms)",
            path.display(),
            clip.frames(),
            clip.sample_rate,
            clip.duration_ms()
        );
        Ok(clip)
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as u64 * 1000 / u64::from(self.sample_rate)
    }

    /// One sample per frame, the channel mean
    pub fn to_mono(&self) -> Vec<i16> {
        match self.channels {
            0 | 1 => self.samples.clone(),
            n => self
                .samples
                .chunks_exact(usize::from(n))
                .map(|frame| {
                    let sum: i32 = frame.iter().copied().map(i32::from).sum();
                    (sum / i32::from(n)) as i16
                })
                .collect(),
        }
    }
}
