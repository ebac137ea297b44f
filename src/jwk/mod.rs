//! JSON Web Key (JWK) members, contexts and finished keys per RFC 7517/7518.
//!
//! A JWK is assembled in a [`JwkContext`], which canonicalizes members as
//! they are put, and finished by a [factory](crate::factory) into an
//! immutable [`Jwk`] that pairs the members with a native key.
//!
//! Some values here are sourced from the above RFCs, also with reference to
//! <https://www.iana.org/assignments/jose/jose.xhtml>.

mod context;
pub(crate) mod convert;
mod field;
mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest as _, Sha256};
use url::Url;

use crate::crypto::{KeyFamily, NativeKey};
use crate::error::JwkError;

pub use context::{CopyMode, JwkContext};
pub use convert::{
    BigUintConverter, BytesConverter, CertificateChainConverter, ConversionError, Converter,
    CurveConverter, OtherPrimeInfo, OtherPrimesConverter, StringConverter, StringSetConverter,
    UrlConverter, X509Certificate,
};
pub use field::{
    ALG, CRV, DEFAULT_PRIVATE_NAMES, DP, DQ, E, EC_D, EC_PRIVATE_NAMES, Field, Idiomatic,
    IdiomaticValue, K, KEY_OPS, KID, KTY, N, OTH, P, Q, QI, REDACTED_VALUE, RSA_D,
    RSA_PRIVATE_NAMES, SECRET_PRIVATE_NAMES, USE, X, X5C, X5T, X5T_S256, X5U, Y,
};
pub use registry::CanonicalizerRegistry;

/// A finished, validated JSON Web Key.
///
/// Cloning is cheap. A private key carries its public counterpart, which
/// holds no private members.
#[derive(Clone)]
pub struct Jwk {
    inner: Arc<JwkInner>,
}

struct JwkInner {
    ctx: JwkContext,
    key: NativeKey,
    public_jwk: Option<Jwk>,
}

impl Jwk {
    pub(crate) fn new(ctx: JwkContext, key: NativeKey, public_jwk: Option<Jwk>) -> Self {
        Self {
            inner: Arc::new(JwkInner {
                ctx,
                key,
                public_jwk,
            }),
        }
    }

    /// Key type (`kty`).
    #[must_use]
    pub fn key_type(&self) -> &str {
        self.inner
            .ctx
            .key_type()
            .unwrap_or_else(|| self.family().id())
    }

    /// The key family.
    #[must_use]
    pub fn family(&self) -> KeyFamily {
        self.inner.key.family()
    }

    /// Algorithm (`alg`).
    #[must_use]
    pub fn algorithm(&self) -> Option<&str> {
        self.inner.ctx.algorithm()
    }

    /// Key ID (`kid`).
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        self.inner.ctx.key_id()
    }

    /// Key operations (`key_ops`).
    #[must_use]
    pub fn operations(&self) -> Option<&[String]> {
        self.inner.ctx.operations()
    }

    /// Public key use (`use`).
    #[must_use]
    pub fn public_key_use(&self) -> Option<&str> {
        self.inner.ctx.public_key_use()
    }

    /// X.509 certificate chain (`x5c`).
    #[must_use]
    pub fn x509_certificate_chain(&self) -> Option<&[X509Certificate]> {
        self.inner.ctx.x509_certificate_chain()
    }

    /// X.509 certificate SHA-1 thumbprint (`x5t`).
    #[must_use]
    pub fn x509_sha1_thumbprint(&self) -> Option<&[u8]> {
        self.inner.ctx.x509_sha1_thumbprint()
    }

    /// X.509 certificate SHA-256 thumbprint (`x5t#S256`).
    #[must_use]
    pub fn x509_sha256_thumbprint(&self) -> Option<&[u8]> {
        self.inner.ctx.x509_sha256_thumbprint()
    }

    /// X.509 URL (`x5u`).
    #[must_use]
    pub fn x509_url(&self) -> Option<&Url> {
        self.inner.ctx.x509_url()
    }

    /// The canonical value of a member.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.inner.ctx.get(name)
    }

    /// Reads a member through its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`JwkError::MalformedValue`] if the member cannot be decoded
    /// by `field`.
    pub fn get_field<T: IdiomaticValue>(&self, field: Field<T>) -> Result<Option<T>, JwkError> {
        self.inner.ctx.get_field(field)
    }

    /// Member names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.ctx.names()
    }

    /// The canonical members.
    #[must_use]
    pub fn canonical_values(&self) -> &BTreeMap<String, Value> {
        self.inner.ctx.canonical_values()
    }

    /// The native key.
    #[must_use]
    pub fn key(&self) -> &NativeKey {
        &self.inner.key
    }

    /// Whether this JWK holds private key material.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.inner.key.is_private()
    }

    /// The public counterpart of a private asymmetric key.
    #[must_use]
    pub fn public_jwk(&self) -> Option<&Jwk> {
        self.inner.public_jwk.as_ref()
    }

    /// The JWK as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.canonical_values()
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect::<Map<_, _>>(),
        )
    }

    /// The RFC 7638 thumbprint: the base64url SHA-256 digest of the
    /// required members in lexicographic order.
    #[must_use]
    pub fn thumbprint(&self) -> String {
        let required: &[&str] = match self.family() {
            KeyFamily::Secret => &["k", "kty"],
            KeyFamily::Ec => &["crv", "kty", "x", "y"],
            KeyFamily::Rsa => &["e", "kty", "n"],
        };
        let members: Vec<String> = required
            .iter()
            .filter_map(|name| self.get(name).map(|value| format!(r#""{name}":{value}"#)))
            .collect();
        let canonical_form = format!("{{{}}}", members.join(","));

        let hash = Sha256::digest(canonical_form.as_bytes());
        convert::base64url_encode(&hash)
    }
}

impl PartialEq for Jwk {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_values() == other.canonical_values()
    }
}

impl Serialize for Jwk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.canonical_values().serialize(serializer)
    }
}

impl fmt::Display for Jwk {
    /// Writes the JWK as JSON with private members redacted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner.ctx, f)
    }
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("values", self.inner.ctx.redacted_values())
            .field("key", &self.inner.key)
            .finish_non_exhaustive()
    }
}
