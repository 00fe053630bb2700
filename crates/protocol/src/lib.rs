//! Shared wire types for the PageTurner server and clients.
//!
//! Everything that crosses the HTTP boundary lives here: the response
//! envelope, sign-in hand-off types, the brand transform schema, and the
//! pure record transform.

mod transform;
mod types;

pub use transform::transform;
pub use types::{
    BookRecord, BrandConfig, Envelope, FieldMap, LocationData, PollOutcome, SigninHandle,
    TransformSchema, STATUS_SUCCESS,
};
