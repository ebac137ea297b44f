//! Native key material.

use std::fmt;

use p256::elliptic_curve::sec1::ToEncodedPoint as _;
use rsa::traits::PublicKeyParts as _;
use secrecy::{ExposeSecret, SecretBox};
use subtle::ConstantTimeEq as _;

/// A key family, identified on the wire by its `kty` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    /// Symmetric keys (`oct`).
    Secret,
    /// Elliptic Curve keys (`EC`).
    Ec,
    /// RSA keys (`RSA`).
    Rsa,
}

impl KeyFamily {
    /// The `kty` value owned by this family.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            KeyFamily::Secret => "oct",
            KeyFamily::Ec => "EC",
            KeyFamily::Rsa => "RSA",
        }
    }

    /// Resolves a `kty` value.
    #[must_use]
    pub fn from_kty(kty: &str) -> Option<Self> {
        match kty {
            "oct" => Some(KeyFamily::Secret),
            "EC" => Some(KeyFamily::Ec),
            "RSA" => Some(KeyFamily::Rsa),
            _ => None,
        }
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Elliptic curves supported for `EC` keys (RFC 7518 §6.2.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    /// NIST P-256.
    P256,
    /// NIST P-384.
    P384,
    /// NIST P-521.
    P521,
}

impl Curve {
    /// The `crv` value for this curve.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Curve::P256 => "P-256",
            Curve::P384 => "P-384",
            Curve::P521 => "P-521",
        }
    }

    /// Resolves a `crv` value.
    #[must_use]
    pub fn from_id(crv: &str) -> Option<Self> {
        match crv {
            "P-256" => Some(Curve::P256),
            "P-384" => Some(Curve::P384),
            "P-521" => Some(Curve::P521),
            _ => None,
        }
    }

    /// Byte length of a field element, which is also the length of the
    /// `x`, `y` and `d` members.
    #[must_use]
    pub const fn field_size(self) -> usize {
        match self {
            Curve::P256 => 32,
            Curve::P384 => 48,
            Curve::P521 => 66,
        }
    }
}

/// Symmetric key bytes.
pub struct SecretKey {
    bytes: SecretBox<[u8]>,
}

impl SecretKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        Self {
            bytes: SecretBox::new(bytes.into()),
        }
    }

    /// Key length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.expose_secret().len()
    }

    /// Whether the key has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ExposeSecret<[u8]> for SecretKey {
    fn expose_secret(&self) -> &[u8] {
        self.bytes.expose_secret()
    }
}

impl From<SecretBox<[u8]>> for SecretKey {
    fn from(bytes: SecretBox<[u8]>) -> Self {
        Self { bytes }
    }
}

impl Clone for SecretKey {
    fn clone(&self) -> Self {
        Self::new(self.expose_secret())
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.expose_secret().ct_eq(other.expose_secret()).into()
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// An elliptic curve public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcPublicKey {
    /// A P-256 public key.
    P256(p256::PublicKey),
    /// A P-384 public key.
    P384(p384::PublicKey),
    /// A P-521 public key.
    P521(p521::PublicKey),
}

impl EcPublicKey {
    /// The curve of this key.
    #[must_use]
    pub fn curve(&self) -> Curve {
        match self {
            EcPublicKey::P256(_) => Curve::P256,
            EcPublicKey::P384(_) => Curve::P384,
            EcPublicKey::P521(_) => Curve::P521,
        }
    }

    /// The full-length affine `x` and `y` coordinates.
    #[must_use]
    pub fn coordinates(&self) -> (Vec<u8>, Vec<u8>) {
        let point = match self {
            EcPublicKey::P256(key) => key.to_encoded_point(false).as_bytes().to_vec(),
            EcPublicKey::P384(key) => key.to_encoded_point(false).as_bytes().to_vec(),
            EcPublicKey::P521(key) => key.to_encoded_point(false).as_bytes().to_vec(),
        };
        // Uncompressed SEC1: 0x04 || x || y
        let size = self.curve().field_size();
        let (x, y) = point[1..].split_at(size);
        (x.to_vec(), y.to_vec())
    }
}

/// An elliptic curve private key.
#[derive(Clone, PartialEq, Eq)]
pub enum EcPrivateKey {
    /// A P-256 private key.
    P256(p256::SecretKey),
    /// A P-384 private key.
    P384(p384::SecretKey),
    /// A P-521 private key.
    P521(p521::SecretKey),
}

impl EcPrivateKey {
    /// The curve of this key.
    #[must_use]
    pub fn curve(&self) -> Curve {
        match self {
            EcPrivateKey::P256(_) => Curve::P256,
            EcPrivateKey::P384(_) => Curve::P384,
            EcPrivateKey::P521(_) => Curve::P521,
        }
    }

    /// Derives the public key.
    #[must_use]
    pub fn public_key(&self) -> EcPublicKey {
        match self {
            EcPrivateKey::P256(key) => EcPublicKey::P256(key.public_key()),
            EcPrivateKey::P384(key) => EcPublicKey::P384(key.public_key()),
            EcPrivateKey::P521(key) => EcPublicKey::P521(key.public_key()),
        }
    }

    /// The full-length private scalar.
    #[must_use]
    pub fn scalar_bytes(&self) -> SecretBox<[u8]> {
        let bytes: Box<[u8]> = match self {
            EcPrivateKey::P256(key) => Box::from(&key.to_bytes()[..]),
            EcPrivateKey::P384(key) => Box::from(&key.to_bytes()[..]),
            EcPrivateKey::P521(key) => Box::from(&key.to_bytes()[..]),
        };
        SecretBox::new(bytes)
    }
}

impl fmt::Debug for EcPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcPrivateKey")
            .field("curve", &self.curve())
            .finish_non_exhaustive()
    }
}

/// Native key material of any supported family.
///
/// This is a closed union: a key's family is always known from its variant.
#[derive(Clone, PartialEq)]
pub enum NativeKey {
    /// A symmetric key.
    Secret(SecretKey),
    /// An elliptic curve public key.
    EcPublic(EcPublicKey),
    /// An elliptic curve private key.
    EcPrivate(EcPrivateKey),
    /// An RSA public key.
    RsaPublic(rsa::RsaPublicKey),
    /// An RSA private key.
    RsaPrivate(rsa::RsaPrivateKey),
}

impl NativeKey {
    /// The family this key belongs to.
    #[must_use]
    pub fn family(&self) -> KeyFamily {
        match self {
            NativeKey::Secret(_) => KeyFamily::Secret,
            NativeKey::EcPublic(_) | NativeKey::EcPrivate(_) => KeyFamily::Ec,
            NativeKey::RsaPublic(_) | NativeKey::RsaPrivate(_) => KeyFamily::Rsa,
        }
    }

    /// Whether this key carries private material.
    ///
    /// Secret keys count as private: their only member is secret.
    #[must_use]
    pub fn is_private(&self) -> bool {
        !matches!(self, NativeKey::EcPublic(_) | NativeKey::RsaPublic(_))
    }

    /// A short name for the concrete key type, used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            NativeKey::Secret(_) => "SecretKey",
            NativeKey::EcPublic(_) => "EcPublicKey",
            NativeKey::EcPrivate(_) => "EcPrivateKey",
            NativeKey::RsaPublic(_) => "RsaPublicKey",
            NativeKey::RsaPrivate(_) => "RsaPrivateKey",
        }
    }

    /// The public half of an asymmetric key; `None` for secret keys.
    #[must_use]
    pub fn public_key(&self) -> Option<NativeKey> {
        match self {
            NativeKey::Secret(_) => None,
            NativeKey::EcPublic(_) | NativeKey::RsaPublic(_) => Some(self.clone()),
            NativeKey::EcPrivate(key) => Some(NativeKey::EcPublic(key.public_key())),
            NativeKey::RsaPrivate(key) => Some(NativeKey::RsaPublic(key.to_public_key())),
        }
    }
}

impl fmt::Debug for NativeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeKey::Secret(key) => key.fmt(f),
            NativeKey::EcPublic(key) => f
                .debug_struct("EcPublicKey")
                .field("curve", &key.curve())
                .finish_non_exhaustive(),
            NativeKey::EcPrivate(key) => key.fmt(f),
            NativeKey::RsaPublic(key) => f
                .debug_struct("RsaPublicKey")
                .field("bits", &key.n().bits())
                .finish_non_exhaustive(),
            NativeKey::RsaPrivate(key) => f
                .debug_struct("RsaPrivateKey")
                .field("bits", &key.n().bits())
                .finish_non_exhaustive(),
        }
    }
}

impl From<SecretKey> for NativeKey {
    fn from(value: SecretKey) -> Self {
        Self::Secret(value)
    }
}

impl From<EcPublicKey> for NativeKey {
    fn from(value: EcPublicKey) -> Self {
        Self::EcPublic(value)
    }
}

impl From<EcPrivateKey> for NativeKey {
    fn from(value: EcPrivateKey) -> Self {
        Self::EcPrivate(value)
    }
}

impl From<rsa::RsaPublicKey> for NativeKey {
    fn from(value: rsa::RsaPublicKey) -> Self {
        Self::RsaPublic(value)
    }
}

impl From<rsa::RsaPrivateKey> for NativeKey {
    fn from(value: rsa::RsaPrivateKey) -> Self {
        Self::RsaPrivate(value)
    }
}

#[cfg(test)]
mod tests {
    use p256::elliptic_curve::rand_core::OsRng;

    use super::*;

    #[test]
    fn test_family_ids_round_trip() {
        for family in [KeyFamily::Secret, KeyFamily::Ec, KeyFamily::Rsa] {
            assert_eq!(KeyFamily::from_kty(family.id()), Some(family));
        }
        assert_eq!(KeyFamily::from_kty("OKP"), None);
    }

    #[test]
    fn test_ec_coordinates_are_full_length() {
        let key = EcPrivateKey::P521(p521::SecretKey::random(&mut OsRng));
        let (x, y) = key.public_key().coordinates();
        assert_eq!(x.len(), 66);
        assert_eq!(y.len(), 66);
        assert_eq!(key.scalar_bytes().expose_secret().len(), 66);
    }

    #[test]
    fn test_public_key_derivation() {
        let private = NativeKey::EcPrivate(EcPrivateKey::P256(p256::SecretKey::random(
            &mut OsRng,
        )));
        assert!(private.is_private());
        let public = private.public_key().unwrap();
        assert!(!public.is_private());
        assert_eq!(public.family(), KeyFamily::Ec);

        assert!(NativeKey::Secret(SecretKey::new(vec![1u8; 16])).public_key().is_none());
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let key = NativeKey::Secret(SecretKey::new(b"super-secret-bytes".to_vec()));
        let debug = format!("{key:?}");
        assert!(!debug.contains("super"));
        assert!(debug.contains("len"));
    }
}
