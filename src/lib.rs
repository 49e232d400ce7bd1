//! # Cerberus Auth
//!
//! Core of a multi-factor authentication platform: a pipeline of
//! cooperating engines that takes an untrusted user through
//! channel-ownership proof, user-existence routing, WebAuthn
//! ceremonies, and bearer-session lifecycle, writing a tamper-evident
//! audit trail throughout.
//!
//! ## Architecture
//!
//! Five engines behind one request boundary, each a state machine
//! whose persistent state lives in the graph store:
//!
//! ```text
//! FrontDoor ─▶ AuthCore ─▶ OtpEngine ──▶ Router ──▶ WebAuthnEngine ──▶ SessionEngine
//!                              │            │             │                 │
//!                              └────────────┴──── AuditLog ────────────────┘
//!                                                    │
//!                                                GraphStore
//! ```
//!
//! External collaborators are traits: [`providers::GraphStore`] (the
//! backing graph database), [`providers::MessageDispatcher`] (outbound
//! email/SMS/push), and [`providers::Clock`]. Production wires Dgraph,
//! SMTP, and the system clock; tests wire the in-memory mocks and a
//! controllable clock.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cerberus_auth::*;
//!
//! let env = CoreEnvironment::new(store, dispatcher, SystemClock::new(), config)?;
//! let core = AuthCore::new(env);
//!
//! // New user, email channel:
//! core.send_otp("email", "a@b.test").await?;
//! let verified = core.verify_otp("a@b.test", &code).await?;   // -> register
//! let challenge = core
//!     .create_webauthn_registration_challenge(&user_id, "a", "A")
//!     .await?;
//! // ... client runs the ceremony ...
//! core.verify_webauthn_registration(&user_id, &challenge.challenge, &cdj, &att)
//!     .await?;
//! let session = core.create_session(&user_id, &did, "register").await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod audit;
pub mod config;
pub mod constants;
pub mod core;
pub mod environment;
pub mod error;
pub mod otp;
pub mod providers;
pub mod router;
pub mod session;
pub mod state;
pub mod stores;
pub mod utils;
pub mod webauthn;

#[cfg(feature = "test-utils")]
pub mod mocks;

// Re-export main types for convenience
pub use crate::core::{
    AuthCore, ValidateSessionResponse, VerifyOtpResponse, WebAuthnSessionResponse,
};
pub use config::{AuditConfig, CoreConfig, OtpConfig, SessionConfig, StoreConfig, WebAuthnConfig};
pub use environment::CoreEnvironment;
pub use error::{CoreError, ErrorClass, Result};
pub use providers::{Clock, GraphStore, MessageDispatcher, SystemClock};
pub use router::{RouteAction, RouteDecision};
pub use state::{ChannelType, UserStatus};
