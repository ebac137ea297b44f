//! Builds, validates and canonicalizes JSON Web Keys (RFC 7517).

#![forbid(unsafe_code)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod crypto;
mod error;
pub mod factory;
pub mod jwk;
pub mod prelude;

pub use error::{BoxedError, Error, ErrorKind, JwkError};
pub use factory::DispatchingJwkFactory;
pub use jwk::{Jwk, JwkContext};

/// Documentation
pub mod _documentation {
    #[doc = include_str!("../README.md")]
    mod readme {}
    #[doc = include_str!("../CHANGELOG.md")]
    pub mod changelog {}
}

/// Re-export of parts of the `secrecy` crate.
pub mod secrecy {
    pub use ::secrecy::{ExposeSecret, SecretBox};
}
