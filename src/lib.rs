//! Reqflow server - two-stage email approval workflow for requisitions

pub mod action;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod notify;
pub mod rows;
pub mod token;
pub mod workflow;

use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::notify::{MailTransport, NotificationService};
use crate::rows::{HeaderIndex, RowStore};
use crate::token::TokenStore;
use crate::workflow::ApprovalWorkflow;

/// Application state shared across handlers
pub struct AppState {
    pub workflow: ApprovalWorkflow,
    pub identity_header: String,
}

impl AppState {
    /// Wire the stores, notifier, and workflow from a connected pool.
    /// Loads the header-row snapshot once (it is not re-read per call).
    pub async fn new(
        config: &AppConfig,
        pool: SqlitePool,
        transport: Arc<dyn MailTransport>,
    ) -> error::Result<Arc<Self>> {
        let headers = HeaderIndex::load(&pool).await?;
        let rows = RowStore::new(pool.clone(), headers);
        let tokens = TokenStore::new(pool);
        let notifier = NotificationService::new(transport, config.base_url.clone());
        let workflow = ApprovalWorkflow::new(
            config.stakeholders.clone(),
            config.lock_timeout(),
            rows,
            tokens,
            notifier,
        );

        Ok(Arc::new(Self {
            workflow,
            identity_header: config.identity_header.clone(),
        }))
    }
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/action", get(action::handler))
        .route("/submissions", post(ingest::handler))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
