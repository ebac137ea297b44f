//! JWK member descriptors.
//!
//! Member names and display names come from RFC 7517 §4 and RFC 7518 §6,
//! with reference to <https://www.iana.org/assignments/jose/jose.xhtml#web-key-parameters>.

use std::fmt;

use rsa::BigUint;
use serde_json::Value;
use url::Url;

use crate::crypto::Curve;
use crate::error::JwkError;
use crate::jwk::convert::{
    BigUintConverter, BytesConverter, CertificateChainConverter, ConversionError, Converter,
    CurveConverter, OtherPrimeInfo, OtherPrimesConverter, StringConverter, StringSetConverter,
    UrlConverter, X509Certificate,
};

/// Placeholder shown instead of secret member values.
pub const REDACTED_VALUE: &str = "<redacted>";

/// Immutable metadata for one JWK member.
///
/// Identity is the wire `id`.
pub struct Field<T: 'static> {
    id: &'static str,
    name: &'static str,
    secret: bool,
    converter: &'static dyn Converter<T>,
}

impl<T: 'static> Field<T> {
    /// A member whose value may be displayed.
    #[must_use]
    pub const fn new(
        id: &'static str,
        name: &'static str,
        converter: &'static dyn Converter<T>,
    ) -> Self {
        Self {
            id,
            name,
            secret: false,
            converter,
        }
    }

    /// A member holding private key material.
    #[must_use]
    pub const fn secret(
        id: &'static str,
        name: &'static str,
        converter: &'static dyn Converter<T>,
    ) -> Self {
        Self {
            id,
            name,
            secret: true,
            converter,
        }
    }

    /// The wire member name.
    #[must_use]
    pub const fn id(&self) -> &'static str {
        self.id
    }

    /// The human readable name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether values of this member must be redacted.
    #[must_use]
    pub const fn is_secret(&self) -> bool {
        self.secret
    }

    /// Converts an idiomatic value to its canonical form.
    #[must_use]
    pub fn encode(&self, value: &T) -> Value {
        self.converter.encode(value)
    }

    /// Interprets a canonical value.
    ///
    /// # Errors
    ///
    /// Returns [`JwkError::MalformedValue`] if the value cannot be
    /// interpreted. The offending value is redacted for secret members.
    pub fn decode(&self, value: &Value) -> Result<T, JwkError> {
        self.decode_redacting(value, self.secret)
    }

    pub(crate) fn decode_redacting(&self, value: &Value, redact: bool) -> Result<T, JwkError> {
        self.converter
            .decode(value)
            .map_err(|source| self.malformed(value, redact || self.secret, source))
    }

    fn malformed(&self, value: &Value, redact: bool, source: ConversionError) -> JwkError {
        let value = if redact {
            REDACTED_VALUE.to_owned()
        } else {
            match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        };
        JwkError::MalformedValue {
            id: self.id,
            name: self.name,
            value,
            source,
        }
    }
}

impl<T: 'static> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> Copy for Field<T> {}

impl<T: 'static> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("secret", &self.secret)
            .finish_non_exhaustive()
    }
}

/// The idiomatic (type-safe) form of a member value.
#[derive(Clone, PartialEq)]
pub enum Idiomatic {
    /// Text.
    String(String),
    /// A set of strings, in first-seen order.
    Strings(Vec<String>),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// An unsigned integer.
    BigUint(BigUint),
    /// A URI.
    Url(Url),
    /// An X.509 certificate chain.
    Certificates(Vec<X509Certificate>),
    /// A named curve.
    Curve(Curve),
    /// RSA other primes info.
    OtherPrimes(Vec<OtherPrimeInfo>),
    /// A member without a registered descriptor, kept in canonical form.
    Json(Value),
}

impl fmt::Debug for Idiomatic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Idiomatic::String(s) => f.debug_tuple("String").field(s).finish(),
            Idiomatic::Strings(v) => f.debug_tuple("Strings").field(v).finish(),
            Idiomatic::Url(url) => f.debug_tuple("Url").field(&url.as_str()).finish(),
            Idiomatic::Certificates(v) => f.debug_tuple("Certificates").field(v).finish(),
            Idiomatic::Curve(curve) => f.debug_tuple("Curve").field(curve).finish(),
            Idiomatic::Json(value) => f.debug_tuple("Json").field(value).finish(),
            // Possibly key material.
            Idiomatic::Bytes(_) => f.write_str("Bytes(..)"),
            Idiomatic::BigUint(_) => f.write_str("BigUint(..)"),
            Idiomatic::OtherPrimes(_) => f.write_str("OtherPrimes(..)"),
        }
    }
}

/// Types that can be stored as an [`Idiomatic`] value.
pub trait IdiomaticValue: Clone + Send + Sync + 'static {
    /// Wraps the value.
    fn into_idiomatic(self) -> Idiomatic;

    /// Borrows the value back, if `value` holds this type.
    fn from_idiomatic(value: &Idiomatic) -> Option<&Self>;
}

macro_rules! idiomatic_value {
    ($ty:ty, $variant:ident) => {
        impl IdiomaticValue for $ty {
            fn into_idiomatic(self) -> Idiomatic {
                Idiomatic::$variant(self)
            }

            fn from_idiomatic(value: &Idiomatic) -> Option<&Self> {
                match value {
                    Idiomatic::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

idiomatic_value!(String, String);
idiomatic_value!(Vec<String>, Strings);
idiomatic_value!(Vec<u8>, Bytes);
idiomatic_value!(BigUint, BigUint);
idiomatic_value!(Url, Url);
idiomatic_value!(Vec<X509Certificate>, Certificates);
idiomatic_value!(Curve, Curve);
idiomatic_value!(Vec<OtherPrimeInfo>, OtherPrimes);
idiomatic_value!(Value, Json);

/// Whether a value carries no content and should remove its member instead.
pub(crate) fn is_reducible_to_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(members) => members.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

const SHA1_DIGEST: BytesConverter = BytesConverter::exact(20);
const SHA256_DIGEST: BytesConverter = BytesConverter::exact(32);
const BYTES: BytesConverter = BytesConverter::new();

/// Algorithm (`alg`).
pub const ALG: Field<String> = Field::new("alg", "Algorithm", &StringConverter);
/// Key ID (`kid`).
pub const KID: Field<String> = Field::new("kid", "Key ID", &StringConverter);
/// Key Operations (`key_ops`).
pub const KEY_OPS: Field<Vec<String>> =
    Field::new("key_ops", "Key Operations", &StringSetConverter);
/// Key Type (`kty`).
pub const KTY: Field<String> = Field::new("kty", "Key Type", &StringConverter);
/// Public Key Use (`use`).
pub const USE: Field<String> = Field::new("use", "Public Key Use", &StringConverter);
/// X.509 Certificate Chain (`x5c`).
pub const X5C: Field<Vec<X509Certificate>> =
    Field::new("x5c", "X.509 Certificate Chain", &CertificateChainConverter);
/// X.509 Certificate SHA-1 Thumbprint (`x5t`).
pub const X5T: Field<Vec<u8>> =
    Field::new("x5t", "X.509 Certificate SHA-1 Thumbprint", &SHA1_DIGEST);
/// X.509 Certificate SHA-256 Thumbprint (`x5t#S256`).
pub const X5T_S256: Field<Vec<u8>> = Field::new(
    "x5t#S256",
    "X.509 Certificate SHA-256 Thumbprint",
    &SHA256_DIGEST,
);
/// X.509 URL (`x5u`).
pub const X5U: Field<Url> = Field::new("x5u", "X.509 URL", &UrlConverter);

/// Key Value (`k`) of a secret key.
pub const K: Field<Vec<u8>> = Field::secret("k", "Key Value", &BYTES);

/// Curve (`crv`) of an EC key.
pub const CRV: Field<Curve> = Field::new("crv", "Curve", &CurveConverter);
/// X Coordinate (`x`) of an EC key.
pub const X: Field<Vec<u8>> = Field::new("x", "X Coordinate", &BYTES);
/// Y Coordinate (`y`) of an EC key.
pub const Y: Field<Vec<u8>> = Field::new("y", "Y Coordinate", &BYTES);
/// ECC Private Key (`d`).
pub const EC_D: Field<Vec<u8>> = Field::secret("d", "ECC Private Key", &BYTES);

/// Modulus (`n`) of an RSA key.
pub const N: Field<BigUint> = Field::new("n", "Modulus", &BigUintConverter);
/// Public Exponent (`e`) of an RSA key.
pub const E: Field<BigUint> = Field::new("e", "Public Exponent", &BigUintConverter);
/// Private Exponent (`d`) of an RSA key.
pub const RSA_D: Field<BigUint> = Field::secret("d", "Private Exponent", &BigUintConverter);
/// First Prime Factor (`p`).
pub const P: Field<BigUint> = Field::secret("p", "First Prime Factor", &BigUintConverter);
/// Second Prime Factor (`q`).
pub const Q: Field<BigUint> = Field::secret("q", "Second Prime Factor", &BigUintConverter);
/// First Factor CRT Exponent (`dp`).
pub const DP: Field<BigUint> =
    Field::secret("dp", "First Factor CRT Exponent", &BigUintConverter);
/// Second Factor CRT Exponent (`dq`).
pub const DQ: Field<BigUint> =
    Field::secret("dq", "Second Factor CRT Exponent", &BigUintConverter);
/// First CRT Coefficient (`qi`).
pub const QI: Field<BigUint> = Field::secret("qi", "First CRT Coefficient", &BigUintConverter);
/// Other Primes Info (`oth`).
pub const OTH: Field<Vec<OtherPrimeInfo>> =
    Field::secret("oth", "Other Primes Info", &OtherPrimesConverter);

/// Private members of a secret key.
pub const SECRET_PRIVATE_NAMES: &[&str] = &["k"];
/// Private members of an EC key.
pub const EC_PRIVATE_NAMES: &[&str] = &["d"];
/// Private members of an RSA key.
pub const RSA_PRIVATE_NAMES: &[&str] = &["d", "p", "q", "dp", "dq", "qi", "oth"];
/// Union of every family's private members.
///
/// Used when a context does not yet know which family it will hold.
pub const DEFAULT_PRIVATE_NAMES: &[&str] = &["d", "p", "q", "dp", "dq", "qi", "oth", "k"];
