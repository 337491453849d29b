//! Prompt refinement chat.

use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use adreel_genai::{ChatRefinement, RefineRequest};
use adreel_models::cost::GEMINI_TEXT_COST;
use adreel_models::{ChatRole, Locale, ServiceKind};

use crate::error::{ApiError, ApiResult};
use crate::extract::ValidatedJson;
use crate::messages::current_locale;
use crate::response::{ok, ApiJson};
use crate::security::{sanitize_string, MAX_MESSAGE_LENGTH, MAX_PROMPT_LENGTH};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefineChatRequest {
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
    pub session_id: Option<String>,
    #[validate(length(max = 2000))]
    pub current_prompt: Option<String>,
    pub locale: Option<Locale>,
}

/// Refine a commercial prompt with the assistant.
///
/// With a session, the exchange is appended to its chat history.
pub async fn refine_chat(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<RefineChatRequest>,
) -> ApiResult<ApiJson<ChatRefinement>> {
    let message = sanitize_string(&request.message, MAX_MESSAGE_LENGTH);
    if message.is_empty() {
        return Err(ApiError::validation("message must not be blank"));
    }

    let session = match request.session_id.as_deref() {
        Some(id) => Some(state.sessions.get(id).await?),
        None => None,
    };
    let locale = request
        .locale
        .or(session.as_ref().map(|s| s.locale))
        .unwrap_or_else(current_locale);

    state.budget.ensure_can_proceed().await?;

    let refine = RefineRequest {
        message: message.clone(),
        current_prompt: request
            .current_prompt
            .as_deref()
            .map(|p| sanitize_string(p, MAX_PROMPT_LENGTH))
            .or_else(|| session.as_ref().map(|s| s.prompt.clone())),
        history: session.as_ref().map(|s| s.chat_history.clone()).unwrap_or_default(),
        locale,
    };

    let reply = state.creative.refine_prompt(&refine).await.map_err(ApiError::ai)?;
    state
        .budget
        .record_cost(
            ServiceKind::GeminiText,
            GEMINI_TEXT_COST,
            "chat refinement",
            session.as_ref().map(|s| s.id.clone()),
        )
        .await;

    if let Some(session) = session {
        state
            .sessions
            .mutate(&session.id, |s| {
                let now = Utc::now();
                s.push_message(ChatRole::User, message.clone(), now);
                s.push_message(ChatRole::Assistant, reply.response.clone(), now);
                Ok(())
            })
            .await?;
        info!(session_id = %session.id, suggestions = reply.suggestions.len(), "Chat refined");
    }

    Ok(ok(reply))
}
