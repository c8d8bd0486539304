//! Audio probing
//!
//! Diarisation only works on mono recordings, so batches that request it
//! check the channel count before any model touches the file.

use async_trait::async_trait;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Channel-count probe used to reject diarisation on multi-channel audio
#[async_trait]
pub trait AudioProbe: Send + Sync {
    async fn is_stereo(&self, path: &Path) -> bool;
}

/// Probe backed by the RIFF header for WAV files and ffprobe for
/// everything else. An unreadable file is reported as mono; the
/// transcription step will produce the real error for it.
pub struct WavProbe;

#[async_trait]
impl AudioProbe for WavProbe {
    async fn is_stereo(&self, path: &Path) -> bool {
        match channel_count(path).await {
            Ok(channels) => channels != 1,
            Err(e) => {
                tracing::debug!(path = ?path, error = %e, "Channel probe failed, assuming mono");
                false
            }
        }
    }
}

async fn channel_count(path: &Path) -> anyhow::Result<u16> {
    let is_wav = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));

    if is_wav {
        let path = path.to_owned();
        tokio::task::spawn_blocking(move || wav_channels(&path)).await?
    } else {
        ffprobe_channels(path).await
    }
}

/// Walk the RIFF chunk list to the fmt chunk and read its channel field
fn wav_channels(path: &Path) -> anyhow::Result<u16> {
    let mut file = std::fs::File::open(path)?;

    let mut fourcc = [0u8; 4];
    file.read_exact(&mut fourcc)?;
    if &fourcc != b"RIFF" {
        anyhow::bail!("not a RIFF file");
    }
    file.seek(SeekFrom::Current(4))?;
    file.read_exact(&mut fourcc)?;
    if &fourcc != b"WAVE" {
        anyhow::bail!("not a WAVE file");
    }

    loop {
        file.read_exact(&mut fourcc)?;
        let size = file.read_u32::<LittleEndian>()?;

        if &fourcc == b"fmt " {
            // fmt chunk: format tag (2 bytes), then channel count
            file.seek(SeekFrom::Current(2))?;
            return Ok(file.read_u16::<LittleEndian>()?);
        }

        // Chunks are word-aligned
        file.seek(SeekFrom::Current(i64::from(size) + i64::from(size % 2)))?;
    }
}

async fn ffprobe_channels(path: &Path) -> anyhow::Result<u16> {
    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "a:0",
            "-show_entries",
            "stream=channels",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .output()
        .await?;

    if !output.status.success() {
        anyhow::bail!("ffprobe exited with {}", output.status);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.trim().parse()?)
}
