//! Local CLI channel adapter.

use std::sync::Arc;

use async_trait::async_trait;
use proto::{AgentResponse, ChannelError, ChannelEvent, ChannelId, SessionId};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::info;

use crate::adapter::ChannelAdapter;

const USER_PROMPT: &str = "Вы: ";
const AGENT_PREFIX: &str = "Агент: ";
const GOODBYE: &str = "До свидания!";
const EXIT_TOKENS: &[&str] = &["пока", "до свидания!", "выход", "exit", "quit"];

/// CLI adapter: reads from stdin, writes to stdout.
///
/// One line is one turn; the next prompt is printed only after the reply
/// for the previous line has been written.
#[derive(Clone)]
pub struct CliAdapter {
    channel_id: ChannelId,
    session_id: SessionId,
    stdout: Arc<Mutex<tokio::io::Stdout>>,
    replied: Arc<Notify>,
}

impl CliAdapter {
    /// Creates a new CLI adapter with a random session id.
    pub fn new() -> Self {
        Self::with_session(SessionId::new())
    }

    /// Creates a new CLI adapter bound to a specific session id.
    pub fn with_session(session_id: SessionId) -> Self {
        Self {
            channel_id: ChannelId::new("cli", "local"),
            session_id,
            stdout: Arc::new(Mutex::new(tokio::io::stdout())),
            replied: Arc::new(Notify::new()),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    async fn write(&self, text: &str) -> Result<(), ChannelError> {
        let mut stdout = self.stdout.lock().await;
        stdout
            .write_all(text.as_bytes())
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    /// REPL over any line source. Returns when the user says goodbye or the
    /// input ends.
    async fn read_loop<R>(
        &self,
        reader: R,
        tx: mpsc::Sender<ChannelEvent>,
    ) -> Result<(), ChannelError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        self.write(USER_PROMPT).await?;

        while let Ok(Some(line)) = lines.next_line().await {
            let Some(line) = normalize_input_line(&line) else {
                self.write(USER_PROMPT).await?;
                continue;
            };

            if is_quit_command(&line) {
                self.write(&format!("{AGENT_PREFIX}{GOODBYE}\n")).await?;
                break;
            }

            let event = ChannelEvent::new(self.channel_id.clone(), self.session_id.clone(), line);
            let replied = self.replied.notified();
            tx.send(event)
                .await
                .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
            replied.await;
        }

        Ok(())
    }
}

impl Default for CliAdapter {
    /// Creates a default CLI adapter.
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for CliAdapter {
    fn channel_id(&self) -> ChannelId {
        self.channel_id.clone()
    }

    async fn run(self, tx: mpsc::Sender<ChannelEvent>) -> Result<(), ChannelError> {
        info!("CLI adapter started (session: {})", self.session_id);
        let stdin = BufReader::new(tokio::io::stdin());
        self.read_loop(stdin, tx).await?;
        info!("CLI adapter stopped");
        Ok(())
    }

    async fn send_response(&self, resp: AgentResponse) -> Result<(), ChannelError> {
        let result = self.write(&format_prompted_response(&resp)).await;
        self.replied.notify_one();
        result
    }
}

/// Trims an input line and drops empty lines.
fn normalize_input_line(raw: &str) -> Option<String> {
    let line = raw.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Returns true when input ends the conversation.
fn is_quit_command(line: &str) -> bool {
    let line = line.trim().to_lowercase();
    EXIT_TOKENS.contains(&line.as_str())
}

/// Formats the agent reply followed by the next prompt.
fn format_prompted_response(resp: &AgentResponse) -> String {
    format!("{AGENT_PREFIX}{}\n\n{USER_PROMPT}", resp.content)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn constructors_set_channel_and_session() {
        let adapter = CliAdapter::new();
        assert_eq!(adapter.channel_id.as_str(), "cli:local");
        assert!(!adapter.session_id.as_str().is_empty());

        let session = SessionId::from("fixed");
        let adapter = CliAdapter::with_session(session.clone());
        assert_eq!(adapter.session_id(), &session);
    }

    #[test]
    fn normalize_input_line_trims_and_filters_empty() {
        assert_eq!(normalize_input_line("  привет "), Some("привет".to_string()));
        assert_eq!(normalize_input_line("   "), None);
        assert_eq!(normalize_input_line(""), None);
    }

    #[test]
    fn exit_tokens_are_case_insensitive() {
        for token in ["пока", "ПОКА", "До свидания!", "Выход", "EXIT", "quit"] {
            assert!(is_quit_command(token), "{token}");
        }
        assert!(!is_quit_command("/quit"));
        assert!(!is_quit_command("/exit"));
        assert!(!is_quit_command("до свидания"));
        assert!(!is_quit_command("пока не знаю"));
    }

    #[test]
    fn prompted_response_uses_agent_prefix() {
        let ok = AgentResponse::new(ChannelId::from("cli:local"), SessionId::from("s1"), "Готово");
        assert_eq!(format_prompted_response(&ok), "Агент: Готово\n\nВы: ");
    }

    #[tokio::test]
    async fn read_loop_waits_for_each_reply_and_stops_on_goodbye() {
        let adapter = CliAdapter::with_session(SessionId::from("repl"));
        let (tx, mut rx) = mpsc::channel::<ChannelEvent>(4);
        let input: &[u8] = "первый вопрос\n\n  второй  \nпока\nнепрочитанное\n".as_bytes();

        let responder = {
            let adapter = adapter.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(event) = rx.recv().await {
                    seen.push(event.user_message.clone());
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    adapter
                        .send_response(AgentResponse::new(
                            event.channel_id,
                            event.session_id,
                            "ok",
                        ))
                        .await
                        .expect("reply");
                }
                seen
            })
        };

        adapter
            .read_loop(BufReader::new(input), tx)
            .await
            .expect("loop");

        let seen = responder.await.expect("join");
        assert_eq!(seen, vec!["первый вопрос", "второй"]);
    }
}
