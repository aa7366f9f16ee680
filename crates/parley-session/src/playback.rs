use async_trait::async_trait;
use parley_core::{AudioRef, PlaybackError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Receives reply audio once a turn has settled.
#[async_trait]
pub trait PlaybackSurface: Send + Sync {
    /// Short identifier used in logs (e.g. `"file"`).
    fn name(&self) -> &str;
    async fn play(&self, audio: &AudioRef) -> Result<(), PlaybackError>;
}

/// Stores each reply clip as `<output_dir>/<audio-id>.<ext>`.
pub struct FilePlayback {
    output_dir: PathBuf,
    play_count: AtomicUsize,
    last_path: Mutex<Option<PathBuf>>,
}

impl FilePlayback {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            play_count: AtomicUsize::new(0),
            last_path: Mutex::new(None),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, audio: &AudioRef) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", audio.id, audio.extension()))
    }

    pub fn play_count(&self) -> usize {
        self.play_count.load(Ordering::Relaxed)
    }

    /// Where the most recent clip was written.
    pub fn last_path(&self) -> Option<PathBuf> {
        self.last_path
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl PlaybackSurface for FilePlayback {
    fn name(&self) -> &str {
        "file"
    }

    async fn play(&self, audio: &AudioRef) -> Result<(), PlaybackError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.path_for(audio);
        tokio::fs::write(&path, &audio.data).await?;

        tracing::info!(
            path = %path.display(),
            bytes = audio.data.len(),
            mime_type = %audio.mime_type,
            "reply audio stored"
        );
        self.play_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_path
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(path);
        Ok(())
    }
}
