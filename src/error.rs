//! Error types and the [`Error`] trait.
//!
//! All errors in this library implement the [`Error`] trait, which extends
//! [`std::error::Error`] with retry semantics. [`BoxedError`] provides
//! type-erased error handling while preserving retryability.
//!
//! Key construction failures are deterministic, so nothing in this crate
//! retries on its own. The flag exists so that a pluggable
//! [`KeyProvider`](crate::crypto::KeyProvider) can report a transient
//! condition to the caller.

use std::convert::Infallible;

use snafu::{AsErrorSource, Snafu};

use crate::crypto::ProviderError;
use crate::jwk::ConversionError;

/// Errors that may occur in the library.
pub trait Error: std::error::Error + AsErrorSource + Send + Sync + 'static {
    /// If true, this indicates that a failed operation may succeed if retried.
    fn is_retryable(&self) -> bool;
}

impl Error for Infallible {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// A boxed error that can be used without type parameters.
#[derive(Debug, Snafu)]
#[snafu(transparent)]
pub struct BoxedError {
    source: Box<dyn Error>,
}

impl BoxedError {
    /// Create a new boxed error from a generic `Error`.
    pub fn from_err<E: Error + 'static>(err: E) -> Self {
        Self {
            source: Box::new(err),
        }
    }
}

impl Error for BoxedError {
    fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}

/// The broad category of a [`JwkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller violated an API contract. This is a programming error.
    InvalidArgument,
    /// A supplied value could not be decoded, or a required member is missing.
    MalformedKey,
    /// The cryptographic provider could not build the key, or built an inconsistent one.
    InvalidKey,
    /// No family factory recognizes the key or its `kty`.
    UnsupportedKey,
}

/// Errors raised while building or validating a JWK.
///
/// Messages never contain secret member values: those are replaced with
/// [`REDACTED_VALUE`](crate::jwk::REDACTED_VALUE) before the error is built.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum JwkError {
    /// A caller contract was violated.
    #[snafu(display("{message}"))]
    InvalidArgument {
        /// Description of the violated contract.
        message: String,
    },
    /// A member value could not be converted.
    #[snafu(display("Invalid JWK '{id}' ({name}) value [{value}]: {source}"))]
    MalformedValue {
        /// The member id.
        id: &'static str,
        /// The member display name.
        name: &'static str,
        /// The offending value, or the redaction placeholder for secret members.
        value: String,
        /// The underlying conversion failure.
        source: ConversionError,
    },
    /// A member required by the key family is absent.
    #[snafu(display("{key_type} JWK is missing required '{id}' ({name}) value"))]
    MissingField {
        /// The key type being built.
        key_type: &'static str,
        /// The member id.
        id: &'static str,
        /// The member display name.
        name: &'static str,
    },
    /// The members are individually valid but do not form a valid key.
    #[snafu(display("{message}"))]
    MalformedKey {
        /// Description of the structural problem.
        message: String,
    },
    /// The cryptographic provider failed to build the key.
    #[snafu(display("Unable to create {key_type} from JWK {context}: {source}"))]
    InvalidKey {
        /// The key type being built.
        key_type: &'static str,
        /// Redacted rendering of the key context.
        context: String,
        /// The provider failure.
        source: ProviderError,
    },
    /// The provider built a key that disagrees with the supplied members.
    #[snafu(display("Invalid {key_type}: {message}"))]
    InconsistentKey {
        /// The key type being built.
        key_type: &'static str,
        /// Description of the mismatch.
        message: String,
    },
    /// No family factory supports the key or declared `kty`.
    #[snafu(display(
        "Unable to create JWK for unrecognized {reason}: there is no known JWK factory capable of creating JWKs for this key type"
    ))]
    UnsupportedKey {
        /// Description of the unrecognized key or `kty`.
        reason: String,
    },
}

impl JwkError {
    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            JwkError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            JwkError::MalformedValue { .. }
            | JwkError::MissingField { .. }
            | JwkError::MalformedKey { .. } => ErrorKind::MalformedKey,
            JwkError::InvalidKey { .. } | JwkError::InconsistentKey { .. } => {
                ErrorKind::InvalidKey
            }
            JwkError::UnsupportedKey { .. } => ErrorKind::UnsupportedKey,
        }
    }
}

impl Error for JwkError {
    fn is_retryable(&self) -> bool {
        match self {
            JwkError::InvalidKey { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use snafu::IntoError;

    use super::*;

    #[derive(Debug, Snafu)]
    #[snafu(display("try again"))]
    struct Transient;

    impl Error for Transient {
        fn is_retryable(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_kinds() {
        let err = InvalidArgumentSnafu {
            message: "name cannot be empty",
        }
        .build();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.to_string(), "name cannot be empty");

        let err = MissingFieldSnafu {
            key_type: "RSA",
            id: "n",
            name: "Modulus",
        }
        .build();
        assert_eq!(err.kind(), ErrorKind::MalformedKey);
        assert_eq!(err.to_string(), "RSA JWK is missing required 'n' (Modulus) value");

        let err = UnsupportedKeySnafu {
            reason: "kty value 'bogus'",
        }
        .build();
        assert_eq!(err.kind(), ErrorKind::UnsupportedKey);
        assert!(err.to_string().contains("'bogus'"));
    }

    #[test]
    fn test_retryable_defers_to_provider() {
        let err = InvalidKeySnafu {
            key_type: "EC",
            context: "{}",
        }
        .into_error(ProviderError::Provider {
            source: BoxedError::from_err(Transient),
        });
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
        assert!(err.is_retryable());

        let err = MalformedKeySnafu { message: "bad" }.build();
        assert!(!err.is_retryable());
    }
}
