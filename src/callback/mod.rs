//! Inbound callback handling: shape normalization, authenticity and
//! classification of the authentication result.

pub mod classify;
pub mod normalize;
pub mod signature;

pub use classify::{classify, Classification};
pub use normalize::{normalize, InboundCallback, InboundPayload, NormalizeError};
pub use signature::{
    compute_signature, signature_check, verify_signature, SignatureCheck, SignatureError,
};
