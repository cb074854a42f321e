//! Service layer for business logic.

pub mod audio_concat;
pub mod ingestion;

pub use audio_concat::{AudioConcatenator, AudioMerger, FfmpegMerger, MergeMode, MergePlan};
pub use ingestion::{
    AudioUpload, IngestionDeps, IngestionOrchestrator, QnaAnswer, RecordedChunk,
};
