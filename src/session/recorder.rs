//! WAV file sink for recorded audio

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::events::SessionEvent;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("no recording in progress")]
    NotRecording,
}

struct Take {
    path: PathBuf,
    writer: hound::WavWriter<BufWriter<File>>,
    samples: u64,
}

/// Writes each recording to its own mono 16-bit WAV file
pub struct WavRecorder {
    dir: PathBuf,
    sample_rate: u32,
    current: Option<Take>,
}

impl WavRecorder {
    pub fn new(dir: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            dir: dir.into(),
            sample_rate,
            current: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.current.is_some()
    }

    /// Open a new file, finishing any take still open
    pub fn begin(&mut self) -> Result<PathBuf, RecorderError> {
        if self.current.is_some() {
            warn!("previous recording still open, finishing it");
            self.finish()?;
        }

        let path = next_path(&self.dir);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&path, spec)?;

        info!(path = %path.display(), "recording file opened");
        self.current = Some(Take {
            path: path.clone(),
            writer,
            samples: 0,
        });
        Ok(path)
    }

    /// Append little-endian 16-bit PCM
    pub fn append(&mut self, pcm: &[u8]) -> Result<(), RecorderError> {
        let take = self.current.as_mut().ok_or(RecorderError::NotRecording)?;

        for frame in pcm.chunks_exact(2) {
            take.writer.write_sample(i16::from_le_bytes([frame[0], frame[1]]))?;
            take.samples += 1;
        }
        Ok(())
    }

    /// Finalize the open file, if any
    pub fn finish(&mut self) -> Result<Option<PathBuf>, RecorderError> {
        let Some(take) = self.current.take() else {
            return Ok(None);
        };

        take.writer.finalize()?;
        info!(path = %take.path.display(), samples = take.samples, "recording file written");
        Ok(Some(take.path))
    }

    /// Follow session events and write audio until either channel closes
    pub async fn run(
        mut self,
        mut events: broadcast::Receiver<SessionEvent>,
        mut audio: mpsc::Receiver<Vec<u8>>,
    ) {
        loop {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Ok(SessionEvent::RecordingStarted { .. }) => {
                        if let Err(e) = self.begin() {
                            error!(?e, "failed to open recording file");
                        }
                    }
                    Ok(SessionEvent::RecordingStopped { .. }) => {
                        // chunks sent before the stop may still be queued
                        while let Ok(chunk) = audio.try_recv() {
                            self.write(&chunk);
                        }
                        if let Err(e) = self.finish() {
                            error!(?e, "failed to finalize recording file");
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "recorder event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                chunk = audio.recv() => match chunk {
                    Some(chunk) => self.write(&chunk),
                    None => break,
                },
            }
        }

        if let Err(e) = self.finish() {
            error!(?e, "failed to finalize recording file");
        }
        debug!("recorder exited");
    }

    fn write(&mut self, chunk: &[u8]) {
        if !self.is_recording() {
            debug!(bytes = chunk.len(), "audio outside a recording, discarded");
            return;
        }
        if let Err(e) = self.append(chunk) {
            warn!(?e, "failed to write audio");
        }
    }
}

fn next_path(dir: &Path) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    let path = dir.join(format!("recording-{}.wav", millis));
    if !path.exists() {
        return path;
    }

    (1..)
        .map(|n| dir.join(format!("recording-{}-{}.wav", millis, n)))
        .find(|p| !p.exists())
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("omi-buttond-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn read_samples(path: &Path) -> (hound::WavSpec, Vec<i16>) {
        let mut reader = hound::WavReader::open(path).unwrap();
        let spec = reader.spec();
        let samples = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        (spec, samples)
    }

    #[test]
    fn test_take_written_as_wav() {
        let dir = scratch_dir("take");
        let mut recorder = WavRecorder::new(&dir, 16000);

        let path = recorder.begin().unwrap();
        assert!(recorder.is_recording());
        recorder.append(&[1, 0, 0xff, 0xff]).unwrap();
        recorder.append(&[0, 1]).unwrap();
        assert_eq!(recorder.finish().unwrap(), Some(path.clone()));
        assert!(!recorder.is_recording());

        let (spec, samples) = read_samples(&path);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(samples, vec![1, -1, 256]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_append_without_take_fails() {
        let dir = scratch_dir("idle");
        let mut recorder = WavRecorder::new(&dir, 16000);

        assert!(matches!(recorder.append(&[0, 0]), Err(RecorderError::NotRecording)));
        assert_eq!(recorder.finish().unwrap(), None);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_consecutive_takes_get_distinct_files() {
        let dir = scratch_dir("distinct");
        let mut recorder = WavRecorder::new(&dir, 16000);

        let first = recorder.begin().unwrap();
        let second = recorder.begin().unwrap();
        recorder.finish().unwrap();

        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_run_follows_session_events() {
        let dir = scratch_dir("run");
        let recorder = WavRecorder::new(&dir, 8000);
        let (event_tx, event_rx) = broadcast::channel(16);
        let (audio_tx, audio_rx) = mpsc::channel(16);

        event_tx.send(SessionEvent::RecordingStarted { toggle_count: 1 }).unwrap();
        audio_tx.send(vec![2, 0, 3, 0]).await.unwrap();
        audio_tx.send(vec![4, 0]).await.unwrap();
        event_tx
            .send(SessionEvent::RecordingStopped {
                toggle_count: 2,
                duration_ms: 10,
                bytes: 6,
            })
            .unwrap();
        drop(event_tx);

        recorder.run(event_rx, audio_rx).await;

        let files: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let (spec, samples) = read_samples(&files[0]);
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(samples, vec![2, 3, 4]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
