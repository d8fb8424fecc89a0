use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Summary of a finished capture dump
#[derive(Debug, Clone)]
pub struct CaptureMetadata {
    /// File path of the dump
    pub file_path: PathBuf,
    /// Sample rate
    pub sample_rate: u32,
    /// Number of samples written
    pub sample_count: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// Writes buffered audio read from a session to a mono 16-bit WAV file
pub struct CaptureWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    metadata: CaptureMetadata,
    /// Odd trailing byte from the previous write
    pending: Option<u8>,
}

impl CaptureWriter {
    pub fn create(file_path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&file_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", file_path))?;

        Ok(Self {
            writer: Some(writer),
            metadata: CaptureMetadata {
                file_path,
                sample_rate,
                sample_count: 0,
                duration_ms: 0,
            },
            pending: None,
        })
    }

    /// Append little-endian PCM bytes as returned by `read_buffer`
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(writer) = &mut self.writer else {
            return Ok(());
        };

        let mut data = bytes;
        if let Some(low) = self.pending.take() {
            match data.split_first() {
                Some((&high, rest)) => {
                    writer
                        .write_sample(i16::from_le_bytes([low, high]))
                        .context("Failed to write sample to WAV")?;
                    self.metadata.sample_count += 1;
                    data = rest;
                }
                None => {
                    self.pending = Some(low);
                    return Ok(());
                }
            }
        }

        let mut chunks = data.chunks_exact(2);
        for pair in &mut chunks {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .context("Failed to write sample to WAV")?;
            self.metadata.sample_count += 1;
        }
        self.pending = chunks.remainder().first().copied();

        Ok(())
    }

    pub fn finish(mut self) -> Result<CaptureMetadata> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        if self.metadata.sample_rate > 0 {
            self.metadata.duration_ms =
                self.metadata.sample_count as u64 * 1000 / self.metadata.sample_rate as u64;
        }

        info!(
            "Capture saved: {} ({} samples, {}ms)",
            self.metadata.file_path.display(),
            self.metadata.sample_count,
            self.metadata.duration_ms
        );

        Ok(self.metadata.clone())
    }
}

impl Drop for CaptureWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
