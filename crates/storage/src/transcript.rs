use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use tracing::debug;
use webrover_core::types::ChatMessage;
use webrover_core::{Paths, Result};

/// Header written as the first line of every transcript file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMeta {
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub usage: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_type")]
enum TranscriptLine {
    #[serde(rename = "metadata")]
    Metadata(TranscriptMeta),
    #[serde(untagged)]
    Message(ChatMessage),
}

/// JSONL dump of the payload sent to the model, written in debug mode.
pub struct TranscriptStore {
    paths: Paths,
}

impl TranscriptStore {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    /// Fresh transcript id: UTC timestamp plus a short random suffix.
    pub fn new_transcript_id() -> String {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S"), &uuid[..8])
    }

    pub fn load(&self, transcript_id: &str) -> Result<(Option<TranscriptMeta>, Vec<ChatMessage>)> {
        let path = self.paths.transcript_file(transcript_id);

        if !path.exists() {
            return Ok((None, Vec::new()));
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut meta = None;
        let mut messages = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<TranscriptLine>(&line) {
                Ok(TranscriptLine::Message(msg)) => messages.push(msg),
                Ok(TranscriptLine::Metadata(m)) => meta = Some(m),
                Err(e) => {
                    debug!(error = %e, "Failed to parse transcript line, skipping");
                }
            }
        }

        Ok((meta, messages))
    }

    /// Overwrite the transcript with the latest payload. `created_at` of an
    /// existing file is preserved.
    pub fn save(
        &self,
        transcript_id: &str,
        model: &str,
        task: &str,
        usage: serde_json::Value,
        messages: &[ChatMessage],
    ) -> Result<()> {
        let path = self.paths.transcript_file(transcript_id);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let now = Utc::now().to_rfc3339();
        let created_at = match self.load(transcript_id)? {
            (Some(existing), _) => existing.created_at,
            (None, _) => now.clone(),
        };

        let mut file = File::create(&path)?;
        let metadata = TranscriptLine::Metadata(TranscriptMeta {
            created_at,
            updated_at: now,
            model: model.to_string(),
            task: task.to_string(),
            usage,
        });
        writeln!(file, "{}", serde_json::to_string(&metadata)?)?;

        for msg in messages {
            writeln!(file, "{}", serde_json::to_string(msg)?)?;
        }

        debug!(path = %path.display(), messages = messages.len(), "Transcript saved");
        Ok(())
    }

    pub fn append(&self, transcript_id: &str, message: &ChatMessage) -> Result<()> {
        let path = self.paths.transcript_file(transcript_id);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if !path.exists() {
            let now = Utc::now().to_rfc3339();
            let mut file = File::create(&path)?;
            let metadata = TranscriptLine::Metadata(TranscriptMeta {
                created_at: now.clone(),
                updated_at: now,
                model: String::new(),
                task: String::new(),
                usage: serde_json::Value::Null,
            });
            writeln!(file, "{}", serde_json::to_string(&metadata)?)?;
        }

        let mut file = OpenOptions::new().append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(message)?)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, TranscriptStore) {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        (dir, TranscriptStore::new(paths))
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, store) = store();
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("find the weather")];
        store
            .save("run1", "gpt-4o", "find the weather", serde_json::json!({"total_tokens": 5}), &messages)
            .unwrap();

        let (meta, loaded) = store.load("run1").unwrap();
        let meta = meta.unwrap();
        assert_eq!(meta.model, "gpt-4o");
        assert_eq!(meta.usage["total_tokens"], 5);
        assert_eq!(loaded, messages);
    }

    #[test]
    fn test_save_overwrites_and_keeps_created_at() {
        let (_dir, store) = store();
        store.save("run2", "m", "t", serde_json::Value::Null, &[ChatMessage::user("a")]).unwrap();
        let (first, _) = store.load("run2").unwrap();
        store
            .save("run2", "m", "t", serde_json::Value::Null, &[ChatMessage::user("a"), ChatMessage::assistant("b")])
            .unwrap();
        let (second, loaded) = store.load("run2").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(first.unwrap().created_at, second.unwrap().created_at);
    }

    #[test]
    fn test_append_creates_header() {
        let (_dir, store) = store();
        store.append("run3", &ChatMessage::user("one")).unwrap();
        store
            .append("run3", &ChatMessage::tool_result("call_1", "list_links", "[1] <a> Home"))
            .unwrap();
        let (meta, loaded) = store.load("run3").unwrap();
        assert!(meta.is_some());
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_load_missing_is_empty() {
        let (_dir, store) = store();
        let (meta, loaded) = store.load("nope").unwrap();
        assert!(meta.is_none());
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_transcript_ids_are_unique() {
        assert_ne!(TranscriptStore::new_transcript_id(), TranscriptStore::new_transcript_id());
    }
}
