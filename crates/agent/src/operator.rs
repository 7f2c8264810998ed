//! The human (or automation) on the other side of the agent.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use webrover_core::types::TokenUsage;
use webrover_core::{Error, Result};

pub const PROMPT_MARKER: &str = "<!_PROMPT_!>";
pub const RESPONSE_MARKER: &str = "<!_RESPONSE_!>";
pub const TASK_MARKER: &str = "<!_TASK_!>";
pub const TOKENS_MARKER: &str = "<!_TOKENS_!>";

#[async_trait]
pub trait Operator: Send {
    /// First task of the session. `None` ends the session.
    async fn ask_task(&mut self) -> Result<Option<String>>;

    /// Show agent text and wait for a reply. `None` ends the session.
    async fn respond(&mut self, text: &str) -> Result<Option<String>>;

    async fn confirm(&mut self, question: &str) -> Result<bool>;

    /// One line describing the action being taken.
    async fn progress(&mut self, line: &str) -> Result<()>;

    async fn notice(&mut self, line: &str) -> Result<()>;

    /// Token usage of one completion call.
    async fn usage(&mut self, _usage: &TokenUsage) -> Result<()> {
        Ok(())
    }

    /// No human is present; confirmations are skipped.
    fn unattended(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorMode {
    Interactive,
    /// Sentinel-marked prompts for an external driver.
    Autopilot,
}

/// [`Operator`] over a line reader and a writer.
pub struct LineOperator<R, W> {
    reader: R,
    writer: W,
    mode: OperatorMode,
}

impl LineOperator<BufReader<Stdin>, Stdout> {
    pub fn stdio(mode: OperatorMode) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), mode)
    }
}

impl<R, W> LineOperator<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, mode: OperatorMode) -> Self {
        Self { reader, writer, mode }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// `None` at end of input.
    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Operator(format!("failed to read input: {}", e)))?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    async fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        self.write(prompt).await?;
        self.read_line().await
    }
}

#[async_trait]
impl<R, W> Operator for LineOperator<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn ask_task(&mut self) -> Result<Option<String>> {
        loop {
            let reply = match self.mode {
                OperatorMode::Interactive => {
                    self.ask("Agent: Hello! What would you like to browse today?\nYou: ").await?
                }
                OperatorMode::Autopilot => self.ask(&format!("{}\n", PROMPT_MARKER)).await?,
            };
            match reply {
                None => return Ok(None),
                Some(task) if task.trim().is_empty() => continue,
                Some(task) => {
                    if self.mode == OperatorMode::Interactive {
                        self.write("\n").await?;
                    }
                    return Ok(Some(task.trim().to_string()));
                }
            }
        }
    }

    async fn respond(&mut self, text: &str) -> Result<Option<String>> {
        let prompt = match self.mode {
            OperatorMode::Interactive => format!("\nAgent: {}\nYou: ", text.trim()),
            OperatorMode::Autopilot => format!(
                "{}{}\n",
                RESPONSE_MARKER,
                serde_json::Value::String(text.trim().to_string())
            ),
        };
        let reply = self.ask(&prompt).await?;
        if reply.is_some() && self.mode == OperatorMode::Interactive {
            self.write("\n").await?;
        }
        Ok(reply)
    }

    async fn confirm(&mut self, question: &str) -> Result<bool> {
        if self.unattended() {
            return Ok(true);
        }
        let reply = self.ask(&format!("{} [y/N] ", question)).await?;
        Ok(matches!(
            reply.as_deref().map(|r| r.trim().to_ascii_lowercase()).as_deref(),
            Some("y") | Some("yes")
        ))
    }

    async fn progress(&mut self, line: &str) -> Result<()> {
        match self.mode {
            OperatorMode::Interactive => self.write(&format!("{}\n", line)).await,
            OperatorMode::Autopilot => self.write(&format!("{}{}\n", TASK_MARKER, line)).await,
        }
    }

    async fn notice(&mut self, line: &str) -> Result<()> {
        self.write(&format!("{}\n", line)).await
    }

    async fn usage(&mut self, usage: &TokenUsage) -> Result<()> {
        if self.mode != OperatorMode::Autopilot {
            return Ok(());
        }
        self.write(&format!(
            "{}{} {} {}\n",
            TOKENS_MARKER, usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        ))
        .await
    }

    fn unattended(&self) -> bool {
        self.mode == OperatorMode::Autopilot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(op: LineOperator<&'static [u8], Vec<u8>>) -> String {
        String::from_utf8(op.into_writer()).unwrap()
    }

    #[tokio::test]
    async fn test_interactive_task_skips_blank_lines() {
        let mut op = LineOperator::new(&b"\n  \nfind cats\n"[..], Vec::new(), OperatorMode::Interactive);
        assert_eq!(op.ask_task().await.unwrap().as_deref(), Some("find cats"));
        let out = output(op);
        assert!(out.starts_with("Agent: Hello! What would you like to browse today?\nYou: "));
    }

    #[tokio::test]
    async fn test_autopilot_markers() {
        let mut op = LineOperator::new(&b"task one\nthanks\n"[..], Vec::new(), OperatorMode::Autopilot);
        assert_eq!(op.ask_task().await.unwrap().as_deref(), Some("task one"));
        assert_eq!(op.respond("Answer \"42\"").await.unwrap().as_deref(), Some("thanks"));
        op.progress("Going to https://example.com").await.unwrap();
        op.usage(&TokenUsage { prompt_tokens: 10, completion_tokens: 2, total_tokens: 12 })
            .await
            .unwrap();
        assert!(op.unattended());
        let out = output(op);
        assert!(out.starts_with("<!_PROMPT_!>\n"));
        assert!(out.contains("<!_RESPONSE_!>\"Answer \\\"42\\\"\"\n"));
        assert!(out.contains("<!_TASK_!>Going to https://example.com\n"));
        assert!(out.ends_with("<!_TOKENS_!>10 2 12\n"));
    }

    #[tokio::test]
    async fn test_eof_ends_session() {
        let mut op = LineOperator::new(&b""[..], Vec::new(), OperatorMode::Interactive);
        assert_eq!(op.ask_task().await.unwrap(), None);
        assert_eq!(op.respond("done").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_confirm() {
        let mut op = LineOperator::new(&b"y\nno\n"[..], Vec::new(), OperatorMode::Interactive);
        assert!(op.confirm("Read file?").await.unwrap());
        assert!(!op.confirm("Read file?").await.unwrap());
        assert!(!op.confirm("Read file?").await.unwrap());

        let mut auto = LineOperator::new(&b""[..], Vec::new(), OperatorMode::Autopilot);
        assert!(auto.confirm("Read file?").await.unwrap());
    }

    #[tokio::test]
    async fn test_interactive_usage_is_silent() {
        let mut op = LineOperator::new(&b""[..], Vec::new(), OperatorMode::Interactive);
        op.usage(&TokenUsage::default()).await.unwrap();
        assert!(output(op).is_empty());
    }
}
