//! User sessions.
//!
//! A session carries the chat history, the product analysis and the creative
//! strategy for one commercial. It expires `ttl` after creation.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::analysis::{ProductAnalysis, Strategy};
use crate::locale::Locale;

/// Session processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Draft,
    Analyzing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Draft => "draft",
            SessionStatus::Analyzing => "analyzing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (a, b) if *a == b => true,
            (Draft, Analyzing | Completed | Failed) => true,
            (Analyzing, Completed | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session cannot move from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("no pending strategy to confirm")]
    NothingPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A user session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub prompt: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ProductAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_strategy: Option<Strategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_strategy: Option<Strategy>,
    #[serde(default)]
    pub locale: Locale,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Create a new `draft` session expiring `ttl` from now.
    pub fn new(prompt: impl Into<String>, locale: Locale, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            status: SessionStatus::Draft,
            chat_history: Vec::new(),
            analysis: None,
            pending_strategy: None,
            confirmed_strategy: None,
            locale,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        // updatedAt never moves backwards, even with clock skew between writers
        self.updated_at = now.max(self.updated_at);
    }

    fn transition(&mut self, next: SessionStatus, now: DateTime<Utc>) -> Result<(), SessionError> {
        if !self.status.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch(now);
        Ok(())
    }

    pub fn push_message(&mut self, role: ChatRole, content: impl Into<String>, now: DateTime<Utc>) {
        self.chat_history.push(ChatMessage {
            role,
            content: content.into(),
            timestamp: now,
        });
        self.touch(now);
    }

    pub fn begin_analysis(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.transition(SessionStatus::Analyzing, now)
    }

    pub fn complete_analysis(
        &mut self,
        analysis: ProductAnalysis,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.transition(SessionStatus::Completed, now)?;
        self.analysis = Some(analysis);
        Ok(())
    }

    /// Flip to `completed` once a linked video finishes.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.transition(SessionStatus::Completed, now)
    }

    /// Compensation: record why the session could not proceed.
    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.transition(SessionStatus::Failed, now)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Store a freshly proposed strategy, returning the one it replaces.
    pub fn set_pending_strategy(&mut self, strategy: Strategy, now: DateTime<Utc>) -> Option<Strategy> {
        let replaced = self.pending_strategy.replace(strategy);
        self.touch(now);
        replaced
    }

    pub fn confirm_strategy(&mut self, now: DateTime<Utc>) -> Result<&Strategy, SessionError> {
        let strategy = self
            .pending_strategy
            .take()
            .ok_or(SessionError::NothingPending)?;
        self.touch(now);
        Ok(self.confirmed_strategy.insert(strategy))
    }

    pub fn product_name(&self) -> Option<&str> {
        self.analysis.as_ref().map(|a| a.product_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(headline: &str) -> Strategy {
        Strategy {
            headline: headline.into(),
            key_messages: vec!["fresh".into()],
            visual_style: "bright".into(),
            target_audience: None,
            call_to_action: None,
            mood: None,
        }
    }

    #[test]
    fn test_new_session_is_draft_with_ttl() {
        let session = Session::new("coffee ad", Locale::En, Duration::hours(24));
        assert_eq!(session.status, SessionStatus::Draft);
        assert_eq!(session.expires_at - session.created_at, Duration::hours(24));
        assert!(!session.is_expired_at(Utc::now()));
        assert!(session.is_expired_at(Utc::now() + Duration::hours(25)));
    }

    #[test]
    fn test_failed_session_cannot_resume() {
        let mut session = Session::new("", Locale::En, Duration::hours(24));
        session.fail("analysis failed", Utc::now()).unwrap();
        assert_eq!(session.failure_reason.as_deref(), Some("analysis failed"));
        assert!(session.begin_analysis(Utc::now()).is_err());
        assert!(session.mark_completed(Utc::now()).is_err());
    }

    #[test]
    fn test_mutation_advances_updated_at() {
        let mut session = Session::new("", Locale::Ja, Duration::hours(24));
        let later = session.updated_at + Duration::seconds(5);
        session.push_message(ChatRole::User, "make it brighter", later);
        assert_eq!(session.updated_at, later);

        // Earlier timestamps do not rewind
        session.push_message(ChatRole::Assistant, "ok", later - Duration::seconds(60));
        assert_eq!(session.updated_at, later);
    }

    #[test]
    fn test_single_pending_strategy() {
        let mut session = Session::new("", Locale::En, Duration::hours(24));
        assert!(session.set_pending_strategy(strategy("one"), Utc::now()).is_none());
        let replaced = session.set_pending_strategy(strategy("two"), Utc::now());
        assert_eq!(replaced.unwrap().headline, "one");

        let confirmed = session.confirm_strategy(Utc::now()).unwrap().clone();
        assert_eq!(confirmed.headline, "two");
        assert!(session.pending_strategy.is_none());
        assert_eq!(
            session.confirm_strategy(Utc::now()).unwrap_err(),
            SessionError::NothingPending
        );
    }

    #[test]
    fn test_serializes_camel_case() {
        let session = Session::new("p", Locale::En, Duration::hours(1));
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("chatHistory").is_some());
        assert!(json.get("expiresAt").is_some());
        assert_eq!(json["status"], "draft");
    }
}
