//! Imports for syntax extensions.

pub use crate::crypto::KeyProvider as _;
pub use crate::factory::FamilyJwkFactory as _;
pub use ::secrecy::ExposeSecret as _;
