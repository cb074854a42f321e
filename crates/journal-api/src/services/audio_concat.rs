//! Concatenation of an entry's audio chunks.
//!
//! Blobs are downloaded in list order into a per-call scratch directory and
//! merged with ffmpeg. When every chunk shares one container the concat
//! demuxer copies the streams as-is into `final.{ext}`. Mixed or unknown
//! containers go through the concat filter and are re-encoded to AAC in
//! `final.m4a`. Only one `final.*` object is kept per entry.
//!
//! The scratch directory is a [`tempfile::TempDir`] owned by the workflow
//! future. It is removed on every exit path: success, any failed step, and
//! cancellation by the overall deadline.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use journal_core::keys::file_extension;
use journal_core::{
    defaults, merged_audio_key, validate_blob_key, validate_entry_id, with_timeout, Error, Result,
};
use journal_db::StorageBackend;

/// How chunk files are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Concat demuxer with `-c copy`. Inputs share one container.
    StreamCopy,
    /// Concat filter, re-encoded to AAC.
    ReencodeAac,
}

/// Merge mode plus the extension of the merged object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub mode: MergeMode,
    pub extension: String,
}

/// Lowercase extension of the last path segment of a blob key.
fn key_extension(key: &str) -> Option<String> {
    key.rsplit('/').next().and_then(file_extension)
}

/// Stream copy when every key carries the same accepted audio extension,
/// re-encode into the default container otherwise.
pub fn plan_merge(file_keys: &[String]) -> MergePlan {
    let shared = file_keys
        .first()
        .and_then(|k| key_extension(k))
        .filter(|ext| {
            file_keys
                .iter()
                .all(|k| key_extension(k).as_deref() == Some(ext.as_str()))
        });

    match shared {
        Some(ext) if defaults::ALLOWED_AUDIO_EXTENSIONS.contains(&ext.as_str()) => MergePlan {
            mode: MergeMode::StreamCopy,
            extension: ext,
        },
        _ => MergePlan {
            mode: MergeMode::ReencodeAac,
            extension: defaults::MERGED_AUDIO_EXTENSION.to_string(),
        },
    }
}

/// Merges local audio files, in order, into one output file.
#[async_trait]
pub trait AudioMerger: Send + Sync {
    async fn merge(&self, inputs: &[PathBuf], output: &Path, mode: MergeMode) -> Result<()>;
}

/// [`AudioMerger`] backed by the ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegMerger {
    ffmpeg_path: String,
}

impl FfmpegMerger {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl Default for FfmpegMerger {
    fn default() -> Self {
        Self::new(defaults::FFMPEG_PATH)
    }
}

/// Render a concat demuxer list. Single quotes inside paths are closed,
/// escaped and reopened.
pub fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|path| {
            let escaped = path.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

/// `[0:a][1:a]…concat=n=N:v=0:a=1[out]`
pub fn concat_filter(input_count: usize) -> String {
    let labels: String = (0..input_count).map(|i| format!("[{}:a]", i)).collect();
    format!("{}concat=n={}:v=0:a=1[out]", labels, input_count)
}

/// ffmpeg arguments for one merge. `list_path` is only read in
/// [`MergeMode::StreamCopy`].
pub fn ffmpeg_args(
    inputs: &[PathBuf],
    list_path: &Path,
    output: &Path,
    mode: MergeMode,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y"]
        .iter()
        .map(OsString::from)
        .collect();

    match mode {
        MergeMode::StreamCopy => {
            args.extend(["-f", "concat", "-safe", "0", "-i"].map(OsString::from));
            args.push(list_path.into());
            args.extend(["-c", "copy"].map(OsString::from));
        }
        MergeMode::ReencodeAac => {
            for input in inputs {
                args.push("-i".into());
                args.push(input.into());
            }
            args.push("-filter_complex".into());
            args.push(concat_filter(inputs.len()).into());
            args.extend(["-map", "[out]", "-c:a", "aac", "-b:a", "128k"].map(OsString::from));
        }
    }

    args.push(output.into());
    args
}

#[async_trait]
impl AudioMerger for FfmpegMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path, mode: MergeMode) -> Result<()> {
        let list_dir = output
            .parent()
            .ok_or_else(|| Error::Storage("merge output has no parent directory".to_string()))?;
        let list_path = list_dir.join("list.txt");
        if mode == MergeMode::StreamCopy {
            tokio::fs::write(&list_path, concat_list(inputs))
                .await
                .map_err(|e| Error::Storage(format!("Failed to write concat list: {}", e)))?;
        }

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(ffmpeg_args(inputs, &list_path, output, mode))
            .kill_on_drop(true);

        let out = cmd
            .output()
            .await
            .map_err(|e| Error::Storage(format!("Failed to execute ffmpeg: {}", e)))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(Error::Storage(format!(
                "ffmpeg failed (exit {}): {}",
                out.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Download-merge-upload workflow for one entry.
pub struct AudioConcatenator {
    blobs: Arc<dyn StorageBackend>,
    merger: Arc<dyn AudioMerger>,
    scratch_dir: Option<PathBuf>,
    concat_timeout: Duration,
}

impl AudioConcatenator {
    pub fn new(
        blobs: Arc<dyn StorageBackend>,
        merger: Arc<dyn AudioMerger>,
        scratch_dir: Option<PathBuf>,
        concat_timeout: Duration,
    ) -> Self {
        Self {
            blobs,
            merger,
            scratch_dir,
            concat_timeout,
        }
    }

    /// Merge `file_keys` in order and store the result.
    ///
    /// An empty list is a no-op returning `None` without touching the blob
    /// store or the merger.
    pub async fn concatenate(
        &self,
        entry_id: &str,
        file_keys: &[String],
    ) -> Result<Option<String>> {
        validate_entry_id(entry_id)?;
        if file_keys.is_empty() {
            debug!(
                subsystem = "storage",
                component = "concatenator",
                entry_id = %entry_id,
                "No file keys, nothing to merge"
            );
            return Ok(None);
        }
        for key in file_keys {
            validate_blob_key(key)?;
        }

        let start = Instant::now();
        let plan = plan_merge(file_keys);
        let merged_key = with_timeout(
            "concatenate",
            self.concat_timeout,
            self.run(entry_id, file_keys, &plan),
        )
        .await?;

        info!(
            subsystem = "storage",
            component = "concatenator",
            entry_id = %entry_id,
            chunk_count = file_keys.len(),
            merged_key = %merged_key,
            mode = ?plan.mode,
            duration_ms = start.elapsed().as_millis() as u64,
            "Audio concatenated"
        );
        Ok(Some(merged_key))
    }

    /// Key of the entry's merged audio, if one has been produced.
    pub async fn merged_key(&self, entry_id: &str) -> Result<Option<String>> {
        for ext in defaults::ALLOWED_AUDIO_EXTENSIONS {
            let key = merged_audio_key(entry_id, ext);
            if self.blobs.exists(&key).await? {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    async fn run(&self, entry_id: &str, file_keys: &[String], plan: &MergePlan) -> Result<String> {
        let scratch = match &self.scratch_dir {
            Some(parent) => TempDir::new_in(parent),
            None => TempDir::new(),
        }
        .map_err(|e| Error::Storage(format!("Failed to create scratch directory: {}", e)))?;

        let mut inputs = Vec::with_capacity(file_keys.len());
        for (i, key) in file_keys.iter().enumerate() {
            let bytes = self.blobs.get(key).await?;
            let ext = key_extension(key).unwrap_or_else(|| "bin".to_string());
            let path = scratch.path().join(format!("chunk-{}.{}", i, ext));
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|e| Error::Storage(format!("Failed to write scratch file: {}", e)))?;
            inputs.push(path);
        }

        let output = scratch.path().join(format!("merged.{}", plan.extension));
        self.merger.merge(&inputs, &output, plan.mode).await?;

        let merged = tokio::fs::read(&output)
            .await
            .map_err(|e| Error::Storage(format!("Failed to read merged audio: {}", e)))?;
        let key = merged_audio_key(entry_id, &plan.extension);
        self.blobs.put(&key, &merged).await?;

        // A previous merge may have used another container
        for ext in defaults::ALLOWED_AUDIO_EXTENSIONS {
            if *ext != plan.extension {
                self.blobs.delete(&merged_audio_key(entry_id, ext)).await?;
            }
        }

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use journal_db::{FilesystemBackend, UrlSigner};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Appends inputs byte-for-byte and remembers the requested modes.
    #[derive(Default)]
    struct ByteMerger {
        calls: AtomicUsize,
        modes: std::sync::Mutex<Vec<MergeMode>>,
    }

    #[async_trait]
    impl AudioMerger for ByteMerger {
        async fn merge(&self, inputs: &[PathBuf], output: &Path, mode: MergeMode) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.modes.lock().unwrap().push(mode);
            let mut out = Vec::new();
            for path in inputs {
                out.extend(tokio::fs::read(path).await?);
            }
            tokio::fs::write(output, out).await?;
            Ok(())
        }
    }

    struct FailingMerger;

    #[async_trait]
    impl AudioMerger for FailingMerger {
        async fn merge(&self, _inputs: &[PathBuf], _output: &Path, _mode: MergeMode) -> Result<()> {
            Err(Error::Storage("ffmpeg failed (exit 1): invalid data".into()))
        }
    }

    fn blob_store(dir: &Path) -> Arc<FilesystemBackend> {
        Arc::new(FilesystemBackend::new(
            dir,
            UrlSigner::new(b"k".to_vec(), "http://localhost", Duration::from_secs(60)),
        ))
    }

    fn entries_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_empty_keys_is_noop() {
        let blobs_dir = tempfile::tempdir().unwrap();
        let merger = Arc::new(ByteMerger::default());
        let concat = AudioConcatenator::new(
            blob_store(blobs_dir.path()),
            merger.clone(),
            None,
            Duration::from_secs(5),
        );

        let result = concat.concatenate("2025-01-05", &[]).await.unwrap();
        assert!(result.is_none());
        assert_eq!(merger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_merges_in_order_and_cleans_scratch() {
        let blobs_dir = tempfile::tempdir().unwrap();
        let scratch_dir = tempfile::tempdir().unwrap();
        let blobs = blob_store(blobs_dir.path());
        blobs.put("entries/e1/originals/2-b.m4a", b"BBB").await.unwrap();
        blobs.put("entries/e1/originals/1-a.m4a", b"AAA").await.unwrap();

        let concat = AudioConcatenator::new(
            blobs.clone(),
            Arc::new(ByteMerger::default()),
            Some(scratch_dir.path().to_path_buf()),
            Duration::from_secs(5),
        );

        let key = concat
            .concatenate(
                "e1",
                &[
                    "entries/e1/originals/1-a.m4a".to_string(),
                    "entries/e1/originals/2-b.m4a".to_string(),
                ],
            )
            .await
            .unwrap();

        assert_eq!(key.as_deref(), Some("entries/e1/merged/final.m4a"));
        assert_eq!(
            blobs.get("entries/e1/merged/final.m4a").await.unwrap(),
            b"AAABBB"
        );
        assert_eq!(entries_in(scratch_dir.path()), 0);
    }

    #[tokio::test]
    async fn test_scratch_removed_when_merge_fails() {
        let blobs_dir = tempfile::tempdir().unwrap();
        let scratch_dir = tempfile::tempdir().unwrap();
        let blobs = blob_store(blobs_dir.path());
        blobs.put("entries/e1/originals/1-a.m4a", b"AAA").await.unwrap();

        let concat = AudioConcatenator::new(
            blobs.clone(),
            Arc::new(FailingMerger),
            Some(scratch_dir.path().to_path_buf()),
            Duration::from_secs(5),
        );

        let err = concat
            .concatenate("e1", &["entries/e1/originals/1-a.m4a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(entries_in(scratch_dir.path()), 0);
        assert!(!blobs.exists("entries/e1/merged/final.m4a").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_blob_fails_and_cleans_scratch() {
        let blobs_dir = tempfile::tempdir().unwrap();
        let scratch_dir = tempfile::tempdir().unwrap();
        let merger = Arc::new(ByteMerger::default());
        let concat = AudioConcatenator::new(
            blob_store(blobs_dir.path()),
            merger.clone(),
            Some(scratch_dir.path().to_path_buf()),
            Duration::from_secs(5),
        );

        let err = concat
            .concatenate("e1", &["entries/e1/originals/missing.m4a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "got {:?}", err);
        assert_eq!(merger.calls.load(Ordering::SeqCst), 0);
        assert_eq!(entries_in(scratch_dir.path()), 0);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected_before_work() {
        let blobs_dir = tempfile::tempdir().unwrap();
        let merger = Arc::new(ByteMerger::default());
        let concat = AudioConcatenator::new(
            blob_store(blobs_dir.path()),
            merger.clone(),
            None,
            Duration::from_secs(5),
        );

        let err = concat
            .concatenate("e1", &["../etc/passwd".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(merger.calls.load(Ordering::SeqCst), 0);
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names
            .iter()
            .map(|n| format!("entries/e1/originals/{}", n))
            .collect()
    }

    #[test]
    fn test_plan_merge_stream_copies_shared_container() {
        for ext in ["wav", "mp3", "m4a", "mp4", "aac"] {
            let plan = plan_merge(&keys(&[&format!("1-a.{}", ext), &format!("2-b.{}", ext)]));
            assert_eq!(plan.mode, MergeMode::StreamCopy, "{}", ext);
            assert_eq!(plan.extension, ext);
        }
        let plan = plan_merge(&keys(&["1-a.WAV", "2-b.wav"]));
        assert_eq!(plan.mode, MergeMode::StreamCopy);
        assert_eq!(plan.extension, "wav");
    }

    #[test]
    fn test_plan_merge_reencodes_mixed_or_unknown() {
        let mixed = plan_merge(&keys(&["1-a.wav", "2-b.m4a"]));
        assert_eq!(mixed.mode, MergeMode::ReencodeAac);
        assert_eq!(mixed.extension, "m4a");

        let unknown = plan_merge(&keys(&["1-a.ogg", "2-b.ogg"]));
        assert_eq!(unknown.mode, MergeMode::ReencodeAac);

        // A dot in the entry id is not an extension
        let bare = plan_merge(&["entries/a.b/originals/1-memo".to_string()]);
        assert_eq!(bare.mode, MergeMode::ReencodeAac);
        assert_eq!(bare.extension, "m4a");
    }

    #[test]
    fn test_ffmpeg_args_stream_copy_uses_concat_demuxer() {
        let inputs = vec![PathBuf::from("/s/chunk-0.wav"), PathBuf::from("/s/chunk-1.wav")];
        let args = ffmpeg_args(
            &inputs,
            Path::new("/s/list.txt"),
            Path::new("/s/merged.wav"),
            MergeMode::StreamCopy,
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            [
                "-hide_banner", "-loglevel", "error", "-y", "-f", "concat", "-safe", "0", "-i",
                "/s/list.txt", "-c", "copy", "/s/merged.wav",
            ]
        );
    }

    #[test]
    fn test_ffmpeg_args_reencode_uses_concat_filter() {
        let inputs = vec![PathBuf::from("/s/chunk-0.wav"), PathBuf::from("/s/chunk-1.mp3")];
        let args = ffmpeg_args(
            &inputs,
            Path::new("/s/list.txt"),
            Path::new("/s/merged.m4a"),
            MergeMode::ReencodeAac,
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            [
                "-hide_banner", "-loglevel", "error", "-y", "-i", "/s/chunk-0.wav", "-i",
                "/s/chunk-1.mp3", "-filter_complex", "[0:a][1:a]concat=n=2:v=0:a=1[out]", "-map",
                "[out]", "-c:a", "aac", "-b:a", "128k", "/s/merged.m4a",
            ]
        );
        assert!(!args.iter().any(|a| a == "copy"));
    }

    #[tokio::test]
    async fn test_wav_chunks_merge_into_wav_and_replace_stale_merge() {
        let blobs_dir = tempfile::tempdir().unwrap();
        let blobs = blob_store(blobs_dir.path());
        blobs.put("entries/e1/originals/1-a.wav", b"AA").await.unwrap();
        blobs.put("entries/e1/originals/2-b.wav", b"BB").await.unwrap();
        blobs.put("entries/e1/originals/3-c.m4a", b"CC").await.unwrap();

        let merger = Arc::new(ByteMerger::default());
        let concat = AudioConcatenator::new(
            blobs.clone(),
            merger.clone(),
            None,
            Duration::from_secs(5),
        );

        let key = concat
            .concatenate("e1", &keys(&["1-a.wav", "2-b.wav"]))
            .await
            .unwrap();
        assert_eq!(key.as_deref(), Some("entries/e1/merged/final.wav"));
        assert_eq!(
            concat.merged_key("e1").await.unwrap().as_deref(),
            Some("entries/e1/merged/final.wav")
        );

        let key = concat
            .concatenate("e1", &keys(&["1-a.wav", "3-c.m4a"]))
            .await
            .unwrap();
        assert_eq!(key.as_deref(), Some("entries/e1/merged/final.m4a"));
        assert!(!blobs.exists("entries/e1/merged/final.wav").await.unwrap());
        assert_eq!(
            *merger.modes.lock().unwrap(),
            vec![MergeMode::StreamCopy, MergeMode::ReencodeAac]
        );
    }

    #[tokio::test]
    async fn test_merged_key_absent_before_merge() {
        let blobs_dir = tempfile::tempdir().unwrap();
        let concat = AudioConcatenator::new(
            blob_store(blobs_dir.path()),
            Arc::new(ByteMerger::default()),
            None,
            Duration::from_secs(5),
        );
        assert!(concat.merged_key("e1").await.unwrap().is_none());
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[
            PathBuf::from("/tmp/x/chunk-0.m4a"),
            PathBuf::from("/tmp/it's/chunk-1.m4a"),
        ]);
        assert_eq!(
            list,
            "file '/tmp/x/chunk-0.m4a'\nfile '/tmp/it'\\''s/chunk-1.m4a'\n"
        );
    }
}
