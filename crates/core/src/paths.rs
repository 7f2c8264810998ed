use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".webrover"))
            .unwrap_or_else(|| PathBuf::from(".webrover"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Default directory for relative `read_file` paths.
    pub fn workspace(&self) -> PathBuf {
        self.base.join("workspace")
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.base.join("transcripts")
    }

    pub fn transcript_file(&self, transcript_id: &str) -> PathBuf {
        let safe_id = transcript_id.replace([':', '/', '\\'], "_");
        self.transcripts_dir().join(format!("{}.jsonl", safe_id))
    }

    /// Chrome user data directory, reused across runs.
    pub fn browser_profile_dir(&self) -> PathBuf {
        self.base.join("browser-profile")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.base.join("downloads")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.workspace())?;
        std::fs::create_dir_all(self.transcripts_dir())?;
        std::fs::create_dir_all(self.browser_profile_dir())?;
        std::fs::create_dir_all(self.downloads_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_file_sanitizes_id() {
        let paths = Paths::with_base(PathBuf::from("/tmp/wr"));
        assert_eq!(
            paths.transcript_file("run:1/a"),
            PathBuf::from("/tmp/wr/transcripts/run_1_a.jsonl")
        );
    }

    #[test]
    fn test_ensure_dirs_creates_layout() {
        let base = std::env::temp_dir().join("webrover_paths_test");
        let _ = std::fs::remove_dir_all(&base);
        let paths = Paths::with_base(base.clone());
        paths.ensure_dirs().unwrap();
        assert!(paths.downloads_dir().is_dir());
        assert!(paths.transcripts_dir().is_dir());
        let _ = std::fs::remove_dir_all(&base);
    }
}
