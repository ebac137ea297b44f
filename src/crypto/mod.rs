//! Native key material and the cryptographic capability.
//!
//! JWK members are only half of a key: the other half is a native key
//! handle that can actually be used for signing or encryption. This module
//! defines the closed set of native keys this library understands, and the
//! [`KeyProvider`] interface used to construct them from JWK members.
//!
//! A default implementation backed by the RustCrypto crates is provided.
//! Other implementations can be provided externally.

mod key;
mod provider;

pub use key::{Curve, EcPrivateKey, EcPublicKey, KeyFamily, NativeKey, SecretKey};
pub use provider::{
    EcPrivateKeySpec, EcPublicKeySpec, KeyProvider, KeySpec, ProviderError, RsaPrivateKeySpec,
    RsaPublicKeySpec, RustCryptoProvider,
};
