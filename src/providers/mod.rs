//! Provider traits and implementations.
//!
//! Providers are the seams between the core and its external
//! collaborators: the graph store, the outbound message dispatcher,
//! and the clock. The engines depend on these traits only; the
//! runtime supplies concrete implementations.
//!
//! This enables:
//! - **Testing**: in-memory mocks run the whole protocol suite at
//!   memory speed with a controllable clock
//! - **Production**: Dgraph over HTTP, SMTP, provider gateways
//! - **Development**: console dispatcher that logs instead of sending

pub mod clock;
pub mod console;
pub mod dispatcher;
pub mod smtp;
pub mod store;
pub mod webhook;

pub use clock::{Clock, SystemClock};
pub use console::ConsoleDispatcher;
pub use dispatcher::{DispatchReceipt, MessageDispatcher};
pub use smtp::SmtpDispatcher;
pub use store::GraphStore;
pub use webhook::WebhookDispatcher;
