//! Client half of the sign-in handshake
//!
//! [`ApiClient`] speaks the server's `{ success, data?, error? }` envelope;
//! [`SigninFlow`] drives the start-then-poll state machine and hands the
//! normalized records to the caller.

mod api;
mod flow;

pub use api::{ApiClient, ApiError};
pub use flow::{FlowError, FlowEvent, FlowState, SigninFlow};
