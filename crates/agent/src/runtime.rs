//! Session-aware entry point used by the channel adapters.

use proto::{AgentResponse, ChannelEvent, Message, SessionId, TurnError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::controller::{TurnController, TurnOutcome};
use crate::session::SessionStore;

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"Ты финансовый консультант по банковским вкладам в России.
Отвечай кратко и по делу, на русском языке.
Для проверки страхования вклада (лимит АСВ) вызывай check_asv.
Для поиска лучшего курса обмена наличной валюты в городе вызывай get_curr_rate.
Для сравнения ставки вклада с инфляцией вызывай calc_real_yield.
Не придумывай цифры: если инструмент вернул ошибку, сообщи об этом пользователю."#;

/// Shown to the user when a turn fails; the session stays usable.
pub const TURN_FAILED_REPLY: &str =
    "Извините, сейчас не получается ответить. Попробуйте еще раз чуть позже.";

/// The main agent runtime: one controller shared by all sessions.
pub struct AgentRuntime {
    controller: TurnController,
    sessions: SessionStore,
}

impl AgentRuntime {
    pub fn new(controller: TurnController, sessions: SessionStore) -> Self {
        Self {
            controller,
            sessions,
        }
    }

    pub fn controller(&self) -> &TurnController {
        &self.controller
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Runs one user turn in `session_id`.
    ///
    /// Turns of the same session queue on the session lock. When the turn
    /// fails, everything it appended, including the user message, is rolled
    /// back.
    pub async fn process(
        &self,
        session_id: &SessionId,
        user_input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let slot = self.sessions.slot(session_id);
        let mut conversation = tokio::select! {
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            guard = slot.lock() => guard,
        };

        let checkpoint = conversation.checkpoint();
        let result = match conversation.append(Message::user(user_input)) {
            Ok(()) => self.controller.run_turn(&mut conversation, cancel).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(outcome) => {
                info!(
                    session = %session_id,
                    rounds = outcome.tool_rounds,
                    status = ?outcome.status,
                    prompt_tokens = outcome.usage.prompt_tokens,
                    completion_tokens = outcome.usage.completion_tokens,
                    "Turn completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(session = %session_id, error = %e, "Turn failed, rolling back");
                conversation.restore(checkpoint);
                Err(e)
            }
        }
    }

    /// Processes a channel event into the response routed back to it.
    pub async fn handle_event(
        &self,
        event: ChannelEvent,
        cancel: &CancellationToken,
    ) -> AgentResponse {
        match self
            .process(&event.session_id, &event.user_message, cancel)
            .await
        {
            Ok(outcome) => AgentResponse::new(event.channel_id, event.session_id, outcome.text),
            Err(_) => AgentResponse::error(event.channel_id, event.session_id, TURN_FAILED_REPLY),
        }
    }
}
