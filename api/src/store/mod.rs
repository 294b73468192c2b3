//! Postgres implementations of the core engine seams.

mod access_codes;
mod audit;
mod gateway;
mod sessions;

pub use access_codes::PgAccessCodeStore;
pub use audit::PgAuditSink;
pub use gateway::PgDomainGateway;
pub use sessions::PgSessionStore;
