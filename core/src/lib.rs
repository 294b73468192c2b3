//! Transport-agnostic call engine for Alumline voice self-service.
//!
//! Every turn of a phone call (or browser voice session) is an independent,
//! stateless invocation: the state machine is re-entered fresh, with all
//! cross-turn state reloaded from the persisted [`session::CallSession`]
//! keyed by call id. The engine knows nothing about the telephony carrier or
//! the database — the transport and storage plug in through the traits in
//! [`session`], [`auth`], [`executor`] and [`audit`].

#![allow(async_fn_in_trait)]

pub mod audit;
pub mod auth;
pub mod classifier;
pub mod error;
pub mod executor;
pub mod machine;
pub mod session;
