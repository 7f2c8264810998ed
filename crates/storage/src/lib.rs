pub mod transcript;

pub use transcript::{TranscriptMeta, TranscriptStore};
