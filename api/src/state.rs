use std::sync::Arc;

use alumline_core::machine::CallStateMachine;
use sqlx::PgPool;

use crate::store::{PgAccessCodeStore, PgAuditSink, PgDomainGateway, PgSessionStore};

/// The one concrete machine this deployment runs: Postgres-backed stores on
/// every seam.
pub type VoiceMachine =
    CallStateMachine<PgSessionStore, PgAccessCodeStore, PgDomainGateway, PgAuditSink>;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub machine: Arc<VoiceMachine>,
    /// Bearer token gating the access-code admin route. None disables it.
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(db: PgPool, admin_token: Option<String>) -> Self {
        let machine = CallStateMachine::new(
            PgSessionStore::new(db.clone()),
            PgAccessCodeStore::new(db.clone()),
            PgDomainGateway::new(db.clone()),
            PgAuditSink::new(db.clone()),
        );
        AppState {
            db,
            machine: Arc::new(machine),
            admin_token,
        }
    }
}
