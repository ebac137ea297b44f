//! The cryptographic capability used to turn JWK members into native keys.

use std::fmt;

use bon::Builder;
use rsa::BigUint;
use secrecy::{ExposeSecret as _, SecretBox};
use snafu::prelude::*;

use crate::crypto::{Curve, EcPrivateKey, EcPublicKey, KeyFamily, NativeKey, SecretKey};
use crate::error::BoxedError;

/// Largest RSA modulus accepted by [`RustCryptoProvider`], in bits.
const RSA_MAX_MODULUS_BITS: usize = 16384;

/// Errors reported by a [`KeyProvider`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    /// The provider does not implement the requested key family or spec.
    #[snafu(display("no such algorithm: {algorithm}"))]
    NoSuchAlgorithm {
        /// Description of the unsupported request.
        algorithm: String,
    },
    /// The key material does not describe a valid key.
    #[snafu(display("invalid key spec: {message}"))]
    InvalidKeySpec {
        /// Description of the problem.
        message: String,
    },
    /// A failure inside an external provider.
    #[snafu(display("provider failure: {source}"))]
    Provider {
        /// The underlying error.
        source: BoxedError,
    },
}

impl crate::Error for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Provider { source } => source.is_retryable(),
            ProviderError::NoSuchAlgorithm { .. } | ProviderError::InvalidKeySpec { .. } => false,
        }
    }
}

/// Public elliptic curve key material.
#[derive(Debug, Clone, Builder)]
pub struct EcPublicKeySpec {
    /// The curve.
    pub curve: Curve,
    /// Full-length `x` coordinate.
    #[builder(with = <_>::from_iter)]
    pub x: Vec<u8>,
    /// Full-length `y` coordinate.
    #[builder(with = <_>::from_iter)]
    pub y: Vec<u8>,
}

/// Private elliptic curve key material.
#[derive(Debug, Builder)]
pub struct EcPrivateKeySpec {
    /// The curve.
    pub curve: Curve,
    /// Full-length private scalar.
    pub d: SecretBox<[u8]>,
}

/// Public RSA key material.
#[derive(Debug, Clone, Builder)]
pub struct RsaPublicKeySpec {
    /// Modulus.
    pub n: BigUint,
    /// Public exponent.
    pub e: BigUint,
}

/// Private RSA key material.
///
/// Either `d` or at least two `primes` must be present.
#[derive(Clone, Builder)]
pub struct RsaPrivateKeySpec {
    /// Modulus.
    pub n: BigUint,
    /// Public exponent.
    pub e: BigUint,
    /// Private exponent.
    pub d: Option<BigUint>,
    /// Prime factors in order: `p`, `q`, then any `oth` primes.
    #[builder(default, with = <_>::from_iter)]
    pub primes: Vec<BigUint>,
}

impl fmt::Debug for RsaPrivateKeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPrivateKeySpec")
            .field("bits", &self.n.bits())
            .field("primes", &self.primes.len())
            .finish_non_exhaustive()
    }
}

/// Key material handed to a [`KeyProvider`].
#[derive(Debug)]
pub enum KeySpec {
    /// Symmetric key bytes.
    Secret(SecretKey),
    /// Public elliptic curve key.
    EcPublic(EcPublicKeySpec),
    /// Private elliptic curve key.
    EcPrivate(EcPrivateKeySpec),
    /// Public RSA key.
    RsaPublic(RsaPublicKeySpec),
    /// Private RSA key.
    RsaPrivate(RsaPrivateKeySpec),
}

impl KeySpec {
    fn name(&self) -> &'static str {
        match self {
            KeySpec::Secret(_) => "secret key spec",
            KeySpec::EcPublic(_) => "EC public key spec",
            KeySpec::EcPrivate(_) => "EC private key spec",
            KeySpec::RsaPublic(_) => "RSA public key spec",
            KeySpec::RsaPrivate(_) => "RSA private key spec",
        }
    }
}

/// A source of native key construction.
///
/// Implementations are treated as opaque and synchronous. They must report
/// an unsupported family/spec pairing as [`ProviderError::NoSuchAlgorithm`]
/// and bad key material as [`ProviderError::InvalidKeySpec`].
pub trait KeyProvider: Send + Sync + fmt::Debug {
    /// A name for diagnostics.
    fn name(&self) -> &str;

    /// Builds a native key of `family` from `spec`.
    ///
    /// # Errors
    ///
    /// Returns an error if the family or spec is unsupported, or `spec`
    /// does not describe a valid key.
    fn generate_key(&self, family: KeyFamily, spec: KeySpec) -> Result<NativeKey, ProviderError>;

    /// Derives the public key of an asymmetric key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key has no public counterpart.
    fn public_key(&self, key: &NativeKey) -> Result<NativeKey, ProviderError> {
        key.public_key().context(NoSuchAlgorithmSnafu {
            algorithm: format!("public key for {}", key.type_name()),
        })
    }
}

/// The default provider, backed by the `rsa`, `p256`, `p384` and `p521` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustCryptoProvider;

fn invalid_spec(err: impl fmt::Display) -> ProviderError {
    ProviderError::InvalidKeySpec {
        message: err.to_string(),
    }
}

fn ec_public_key(spec: &EcPublicKeySpec) -> Result<EcPublicKey, ProviderError> {
    let size = spec.curve.field_size();
    ensure!(
        spec.x.len() == size && spec.y.len() == size,
        InvalidKeySpecSnafu {
            message: format!("{} coordinates must be {size} bytes", spec.curve.id()),
        }
    );
    let mut sec1 = Vec::with_capacity(1 + 2 * size);
    sec1.push(0x04);
    sec1.extend_from_slice(&spec.x);
    sec1.extend_from_slice(&spec.y);
    let key = match spec.curve {
        Curve::P256 => p256::PublicKey::from_sec1_bytes(&sec1).map(EcPublicKey::P256),
        Curve::P384 => p384::PublicKey::from_sec1_bytes(&sec1).map(EcPublicKey::P384),
        Curve::P521 => p521::PublicKey::from_sec1_bytes(&sec1).map(EcPublicKey::P521),
    };
    key.map_err(|_| invalid_spec(format!("point is not on curve {}", spec.curve.id())))
}

fn ec_private_key(spec: &EcPrivateKeySpec) -> Result<EcPrivateKey, ProviderError> {
    let d = spec.d.expose_secret();
    let size = spec.curve.field_size();
    ensure!(
        d.len() == size,
        InvalidKeySpecSnafu {
            message: format!("{} private scalar must be {size} bytes", spec.curve.id()),
        }
    );
    let key = match spec.curve {
        Curve::P256 => p256::SecretKey::from_slice(d).map(EcPrivateKey::P256),
        Curve::P384 => p384::SecretKey::from_slice(d).map(EcPrivateKey::P384),
        Curve::P521 => p521::SecretKey::from_slice(d).map(EcPrivateKey::P521),
    };
    key.map_err(|_| invalid_spec(format!("invalid {} private scalar", spec.curve.id())))
}

fn rsa_private_key(spec: RsaPrivateKeySpec) -> Result<rsa::RsaPrivateKey, ProviderError> {
    let RsaPrivateKeySpec { n, e, d, primes } = spec;
    let mut key = match (d, primes.len()) {
        (Some(d), _) => rsa::RsaPrivateKey::from_components(n, e, d, primes),
        (None, 2) => {
            let mut primes = primes.into_iter();
            match (primes.next(), primes.next()) {
                (Some(p), Some(q)) => rsa::RsaPrivateKey::from_p_q(p, q, e),
                _ => return InvalidKeySpecSnafu { message: "missing prime factors" }.fail(),
            }
        }
        (None, count) if count > 2 => rsa::RsaPrivateKey::from_primes(primes, e),
        (None, _) => {
            return InvalidKeySpecSnafu {
                message: "either a private exponent or at least two prime factors is required",
            }
            .fail();
        }
    }
    .map_err(invalid_spec)?;
    key.validate().map_err(invalid_spec)?;
    key.precompute().map_err(invalid_spec)?;
    Ok(key)
}

impl KeyProvider for RustCryptoProvider {
    fn name(&self) -> &str {
        "RustCrypto"
    }

    fn generate_key(&self, family: KeyFamily, spec: KeySpec) -> Result<NativeKey, ProviderError> {
        match (family, spec) {
            (KeyFamily::Secret, KeySpec::Secret(key)) => {
                ensure!(
                    !key.is_empty(),
                    InvalidKeySpecSnafu {
                        message: "secret key cannot be empty",
                    }
                );
                Ok(NativeKey::Secret(key))
            }
            (KeyFamily::Ec, KeySpec::EcPublic(spec)) => ec_public_key(&spec).map(Into::into),
            (KeyFamily::Ec, KeySpec::EcPrivate(spec)) => ec_private_key(&spec).map(Into::into),
            (KeyFamily::Rsa, KeySpec::RsaPublic(RsaPublicKeySpec { n, e })) => {
                rsa::RsaPublicKey::new_with_max_size(n, e, RSA_MAX_MODULUS_BITS)
                    .map(Into::into)
                    .map_err(invalid_spec)
            }
            (KeyFamily::Rsa, KeySpec::RsaPrivate(spec)) => rsa_private_key(spec).map(Into::into),
            (family, spec) => NoSuchAlgorithmSnafu {
                algorithm: format!("{} for family '{family}'", spec.name()),
            }
            .fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use p256::elliptic_curve::rand_core::OsRng;
    use rsa::traits::{PrivateKeyParts as _, PublicKeyParts as _};

    use super::*;

    #[test]
    fn test_mismatched_family_is_no_such_algorithm() {
        let err = RustCryptoProvider
            .generate_key(KeyFamily::Rsa, KeySpec::Secret(SecretKey::new(vec![1u8; 32])))
            .unwrap_err();
        assert!(matches!(err, ProviderError::NoSuchAlgorithm { .. }));
    }

    #[test]
    fn test_ec_point_off_curve_is_invalid_spec() {
        let spec = EcPublicKeySpec::builder()
            .curve(Curve::P256)
            .x(vec![1u8; 32])
            .y(vec![2u8; 32])
            .build();
        let err = RustCryptoProvider
            .generate_key(KeyFamily::Ec, KeySpec::EcPublic(spec))
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidKeySpec { .. }));
    }

    #[test]
    fn test_ec_private_round_trip() {
        let secret = p384::SecretKey::random(&mut OsRng);
        let spec = EcPrivateKeySpec::builder()
            .curve(Curve::P384)
            .d(SecretBox::new(Box::from(&secret.to_bytes()[..])))
            .build();
        let key = RustCryptoProvider
            .generate_key(KeyFamily::Ec, KeySpec::EcPrivate(spec))
            .unwrap();
        assert_eq!(key, NativeKey::EcPrivate(EcPrivateKey::P384(secret)));
    }

    #[test]
    fn test_rsa_private_from_primes_only() {
        let original = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let spec = RsaPrivateKeySpec::builder()
            .n(original.n().clone())
            .e(original.e().clone())
            .primes(original.primes().iter().cloned())
            .build();
        let key = RustCryptoProvider
            .generate_key(KeyFamily::Rsa, KeySpec::RsaPrivate(spec))
            .unwrap();
        let NativeKey::RsaPrivate(key) = key else {
            unreachable!("expected an RSA private key, got {key:?}");
        };
        assert_eq!(key.n(), original.n());
        assert!(key.dp().is_some());
    }

    #[test]
    fn test_rsa_private_requires_d_or_primes() {
        let spec = RsaPrivateKeySpec::builder()
            .n(BigUint::from(3233u32))
            .e(BigUint::from(17u32))
            .build();
        let err = RustCryptoProvider
            .generate_key(KeyFamily::Rsa, KeySpec::RsaPrivate(spec))
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidKeySpec { .. }));
    }
}
