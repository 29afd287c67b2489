pub mod client;
pub mod codec;
pub mod model;

pub use client::{ExchangeFailure, FailureKind, Stage, TelemetryClient};
pub use codec::{decode_response, encode_request, encode_response, DecodeError};
pub use model::{Query, Reading, ReadingSet};
