//! Server side of session identity: creation with origin dedupe, operator
//! status transitions and the runtime creation policy.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::config::SessionsConfig;
use crate::error::{require_label, WaypointError};
use crate::gateway::Gateway;
use crate::types::{Page, Session, SessionId, SessionOrigin, SessionStatus};

/// Runtime-adjustable creation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionSettings {
    pub allow_new_sessions: bool,
    pub default_pages: Vec<Page>,
}

impl From<&SessionsConfig> for SessionSettings {
    fn from(config: &SessionsConfig) -> Self {
        Self {
            allow_new_sessions: config.allow_new_sessions,
            default_pages: config.pages(),
        }
    }
}

/// Partial update of [`SessionSettings`]
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub allow_new_sessions: Option<bool>,
    #[serde(default)]
    pub default_pages: Option<Vec<Page>>,
}

/// What a create request produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(SessionId),
    /// An open session from the same origin address was reused
    Reused(SessionId),
    /// Creation is administratively disabled
    Closed,
    /// The record store is unreachable; the caller proceeds unpersisted
    Offline,
}

impl CreateOutcome {
    pub fn id(&self) -> Option<&SessionId> {
        match self {
            CreateOutcome::Created(id) | CreateOutcome::Reused(id) => Some(id),
            CreateOutcome::Closed | CreateOutcome::Offline => None,
        }
    }
}

/// Session counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatusCounts {
    pub pending: usize,
    pub active: usize,
    pub ended: usize,
    pub banned: usize,
}

pub struct SessionService {
    gateway: Gateway,
    settings: RwLock<SessionSettings>,
    dedupe_by_address: bool,
}

impl SessionService {
    pub fn new(gateway: Gateway, config: &SessionsConfig) -> Self {
        Self {
            gateway,
            settings: RwLock::new(SessionSettings::from(config)),
            dedupe_by_address: config.dedupe_by_address,
        }
    }

    /// Create a session for a visitor, or reuse the open one from the same
    /// address. Store outages degrade to [`CreateOutcome::Offline`].
    pub async fn create(&self, origin: SessionOrigin) -> Result<CreateOutcome, WaypointError> {
        let settings = self.settings.read().await.clone();
        if !settings.allow_new_sessions {
            tracing::info!("session creation refused, new sessions are closed");
            return Ok(CreateOutcome::Closed);
        }

        let pages = settings.default_pages;
        let created = if self.dedupe_by_address && origin.address.is_some() {
            self.gateway
                .create_or_reuse_for_address(origin, SessionStatus::Pending, pages)
                .await
        } else {
            self.gateway
                .create_session(origin, SessionStatus::Pending, pages)
                .await
                .map(|session| (session, true))
        };

        match created {
            Ok((session, true)) => {
                tracing::info!(session_id = %session.id, "session created");
                Ok(CreateOutcome::Created(session.id))
            }
            Ok((session, false)) => {
                tracing::debug!(session_id = %session.id, "reusing open session for address");
                Ok(CreateOutcome::Reused(session.id))
            }
            Err(e) if e.is_unavailable() => {
                tracing::warn!(error = %e, "record store unreachable, issuing offline session");
                Ok(CreateOutcome::Offline)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: &SessionId) -> Result<Session, WaypointError> {
        self.gateway
            .session(id)
            .await?
            .ok_or_else(|| WaypointError::SessionNotFound(id.clone()))
    }

    pub async fn list_by_status(&self, status: SessionStatus) -> Result<Vec<Session>, WaypointError> {
        Ok(self.gateway.sessions_by_status(status).await?)
    }

    /// Operator-driven status change. Terminal states accept nothing and
    /// the operator id is only recorded on activation. The transition is
    /// checked against the stored status as part of the update.
    pub async fn set_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
        operator_id: Option<String>,
    ) -> Result<Session, WaypointError> {
        let operator_id = operator_id.filter(|_| status == SessionStatus::Active);
        let session = self
            .gateway
            .update_session_status(id, status, operator_id)
            .await
            .map_err(WaypointError::from_store)?;
        tracing::info!(session_id = %id, to = %status, "session status changed");
        Ok(session)
    }

    pub async fn counts(&self) -> Result<StatusCounts, WaypointError> {
        let mut counts = StatusCounts::default();
        for status in SessionStatus::ALL {
            let n = self.gateway.sessions_by_status(status).await?.len();
            match status {
                SessionStatus::Pending => counts.pending = n,
                SessionStatus::Active => counts.active = n,
                SessionStatus::Ended => counts.ended = n,
                SessionStatus::Banned => counts.banned = n,
            }
        }
        Ok(counts)
    }

    pub async fn settings(&self) -> SessionSettings {
        self.settings.read().await.clone()
    }

    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<SessionSettings, WaypointError> {
        if let Some(pages) = &update.default_pages {
            if pages.is_empty() {
                return Err(WaypointError::Validation(
                    "default pages must contain at least one page".to_string(),
                ));
            }
            for page in pages {
                require_label("page name", &page.name)?;
            }
        }

        let mut settings = self.settings.write().await;
        if let Some(allow) = update.allow_new_sessions {
            settings.allow_new_sessions = allow;
        }
        if let Some(pages) = update.default_pages {
            settings.default_pages = pages;
        }
        tracing::info!(
            allow_new_sessions = settings.allow_new_sessions,
            default_pages = settings.default_pages.len(),
            "session settings updated"
        );
        Ok(settings.clone())
    }
}
