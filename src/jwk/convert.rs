//! Converters between canonical (wire) and idiomatic JWK member values.

use base64::{
    Engine as _,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use bon::Builder;
use num_traits::Zero as _;
use rsa::BigUint;
use serde_json::{Map, Value};
use sha2::{Digest as _, Sha256};
use snafu::prelude::*;
use url::Url;

use crate::crypto::Curve;

/// Base64url without padding on output; accepts padded input.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Standard base64 with padding, as required for `x5c` entries.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encodes bytes as unpadded base64url text.
pub(crate) fn base64url_encode(bytes: &[u8]) -> String {
    BASE64URL.encode(bytes)
}

/// Errors produced when a canonical value cannot be interpreted.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConversionError {
    /// The JSON value has the wrong shape.
    #[snafu(display("expected {expected}"))]
    WrongType {
        /// Description of the expected shape.
        expected: &'static str,
    },
    /// The value is empty where content is required.
    #[snafu(display("value cannot be empty"))]
    Empty,
    /// The text is not valid base64 or base64url.
    #[snafu(display("invalid base64 encoding: {source}"))]
    Base64 {
        /// The underlying error.
        source: base64::DecodeError,
    },
    /// The decoded byte sequence has the wrong length.
    #[snafu(display("expected {expected} bytes, found {actual}"))]
    Length {
        /// The required length.
        expected: usize,
        /// The decoded length.
        actual: usize,
    },
    /// The text is not a valid URI.
    #[snafu(display("invalid URI: {source}"))]
    Url {
        /// The underlying error.
        source: url::ParseError,
    },
    /// An entry of a certificate chain is not a DER-encoded X.509 certificate.
    #[snafu(display("invalid X.509 certificate at index {index}: {reason}"))]
    Certificate {
        /// Position of the entry in the chain.
        index: usize,
        /// Parser diagnostic.
        reason: String,
    },
    /// The curve name is not supported.
    #[snafu(display("unsupported curve '{crv}'"))]
    UnsupportedCurve {
        /// The curve name.
        crv: String,
    },
    /// A member of a nested object is invalid.
    #[snafu(display("invalid '{member}' member: {source}"))]
    Member {
        /// The nested member name.
        member: &'static str,
        /// The underlying error.
        source: Box<ConversionError>,
    },
}

/// A pure, side-effect free pair of functions between an idiomatic value and
/// its canonical JSON form.
///
/// `decode(&encode(v))` must yield `v` for every valid `v`.
pub trait Converter<T>: Send + Sync {
    /// Converts the idiomatic value to its canonical wire form.
    fn encode(&self, value: &T) -> Value;

    /// Interprets a canonical value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be interpreted.
    fn decode(&self, value: &Value) -> Result<T, ConversionError>;
}

fn as_str<'a>(value: &'a Value, expected: &'static str) -> Result<&'a str, ConversionError> {
    value.as_str().context(WrongTypeSnafu { expected })
}

/// Plain, trimmed, non-empty text.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringConverter;

impl Converter<String> for StringConverter {
    fn encode(&self, value: &String) -> Value {
        Value::String(value.clone())
    }

    fn decode(&self, value: &Value) -> Result<String, ConversionError> {
        let s = as_str(value, "a string")?.trim();
        ensure!(!s.is_empty(), EmptySnafu);
        Ok(s.to_owned())
    }
}

/// An array of distinct strings; duplicates are dropped, first occurrence wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSetConverter;

impl Converter<Vec<String>> for StringSetConverter {
    fn encode(&self, value: &Vec<String>) -> Value {
        Value::Array(value.iter().cloned().map(Value::String).collect())
    }

    fn decode(&self, value: &Value) -> Result<Vec<String>, ConversionError> {
        let items = value.as_array().context(WrongTypeSnafu {
            expected: "an array of strings",
        })?;
        ensure!(!items.is_empty(), EmptySnafu);
        let mut out: Vec<String> = Vec::with_capacity(items.len());
        for item in items {
            let s = StringConverter.decode(item)?;
            if !out.contains(&s) {
                out.push(s);
            }
        }
        Ok(out)
    }
}

/// An absolute URI.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlConverter;

impl Converter<Url> for UrlConverter {
    fn encode(&self, value: &Url) -> Value {
        Value::String(value.as_str().to_owned())
    }

    fn decode(&self, value: &Value) -> Result<Url, ConversionError> {
        Url::parse(as_str(value, "a URI string")?.trim()).context(UrlSnafu)
    }
}

/// Base64url encoded bytes, optionally of an exact length.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesConverter {
    length: Option<usize>,
}

impl BytesConverter {
    /// Accepts any number of bytes.
    #[must_use]
    pub const fn new() -> Self {
        Self { length: None }
    }

    /// Requires exactly `length` bytes.
    #[must_use]
    pub const fn exact(length: usize) -> Self {
        Self {
            length: Some(length),
        }
    }
}

impl Converter<Vec<u8>> for BytesConverter {
    fn encode(&self, value: &Vec<u8>) -> Value {
        Value::String(BASE64URL.encode(value))
    }

    fn decode(&self, value: &Value) -> Result<Vec<u8>, ConversionError> {
        let bytes = BASE64URL
            .decode(as_str(value, "a base64url string")?)
            .context(Base64Snafu)?;
        if let Some(expected) = self.length {
            ensure!(
                bytes.len() == expected,
                LengthSnafu {
                    expected,
                    actual: bytes.len()
                }
            );
        }
        Ok(bytes)
    }
}

/// Arbitrary-precision unsigned integers as minimal big-endian base64url.
///
/// Zero encodes as the empty byte sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigUintConverter;

/// Returns the minimal unsigned big-endian encoding of `value`.
pub(crate) fn unsigned_bytes(value: &BigUint) -> Vec<u8> {
    if value.is_zero() {
        Vec::new()
    } else {
        value.to_bytes_be()
    }
}

impl Converter<BigUint> for BigUintConverter {
    fn encode(&self, value: &BigUint) -> Value {
        Value::String(BASE64URL.encode(unsigned_bytes(value)))
    }

    fn decode(&self, value: &Value) -> Result<BigUint, ConversionError> {
        let bytes = BytesConverter::new().decode(value)?;
        Ok(BigUint::from_bytes_be(&bytes))
    }
}

/// A DER-encoded X.509 certificate.
///
/// The encoding is checked when the value is created, so every instance
/// holds a structurally valid certificate.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct X509Certificate {
    der: Vec<u8>,
}

impl X509Certificate {
    /// Parses and wraps a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a single DER-encoded certificate.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self, ConversionError> {
        Self::parse(der.into(), 0)
    }

    fn parse(der: Vec<u8>, index: usize) -> Result<Self, ConversionError> {
        match x509_parser::parse_x509_certificate(&der) {
            Ok((rest, _)) if rest.is_empty() => Ok(Self { der }),
            Ok(_) => CertificateSnafu {
                index,
                reason: "trailing data after certificate",
            }
            .fail(),
            Err(e) => CertificateSnafu {
                index,
                reason: e.to_string(),
            }
            .fail(),
        }
    }

    /// The DER encoding of the certificate.
    #[must_use]
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// The SHA-256 digest of the DER encoding, as used by `x5t#S256`.
    #[must_use]
    pub fn sha256_thumbprint(&self) -> Vec<u8> {
        Sha256::digest(&self.der).to_vec()
    }
}

impl std::fmt::Debug for X509Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X509Certificate")
            .field("der_len", &self.der.len())
            .finish_non_exhaustive()
    }
}

/// A chain of standard-base64 DER certificates (`x5c`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CertificateChainConverter;

impl Converter<Vec<X509Certificate>> for CertificateChainConverter {
    fn encode(&self, value: &Vec<X509Certificate>) -> Value {
        Value::Array(
            value
                .iter()
                .map(|cert| Value::String(BASE64.encode(&cert.der)))
                .collect(),
        )
    }

    fn decode(&self, value: &Value) -> Result<Vec<X509Certificate>, ConversionError> {
        let items = value.as_array().context(WrongTypeSnafu {
            expected: "an array of base64 certificate strings",
        })?;
        ensure!(!items.is_empty(), EmptySnafu);
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let der = BASE64
                    .decode(as_str(item, "a base64 certificate string")?)
                    .context(Base64Snafu)?;
                X509Certificate::parse(der, index)
            })
            .collect()
    }
}

/// A named elliptic curve (`crv`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CurveConverter;

impl Converter<Curve> for CurveConverter {
    fn encode(&self, value: &Curve) -> Value {
        Value::String(value.id().to_owned())
    }

    fn decode(&self, value: &Value) -> Result<Curve, ConversionError> {
        let crv = as_str(value, "a curve name")?.trim();
        Curve::from_id(crv).context(UnsupportedCurveSnafu { crv })
    }
}

/// One entry of the RSA `oth` (other primes info) member.
#[derive(Clone, PartialEq, Eq, Builder)]
pub struct OtherPrimeInfo {
    /// Prime factor.
    pub r: BigUint,
    /// Factor CRT exponent.
    pub d: BigUint,
    /// Factor CRT coefficient.
    pub t: BigUint,
}

impl std::fmt::Debug for OtherPrimeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtherPrimeInfo").finish_non_exhaustive()
    }
}

/// The RSA `oth` member: an ordered sequence of [`OtherPrimeInfo`] objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtherPrimesConverter;

fn other_prime_member(
    object: &Map<String, Value>,
    member: &'static str,
) -> Result<BigUint, ConversionError> {
    object
        .get(member)
        .context(EmptySnafu)
        .and_then(|value| BigUintConverter.decode(value))
        .map_err(|source| ConversionError::Member {
            member,
            source: Box::new(source),
        })
}

impl Converter<Vec<OtherPrimeInfo>> for OtherPrimesConverter {
    fn encode(&self, value: &Vec<OtherPrimeInfo>) -> Value {
        Value::Array(
            value
                .iter()
                .map(|info| {
                    let mut object = Map::new();
                    object.insert("r".to_owned(), BigUintConverter.encode(&info.r));
                    object.insert("d".to_owned(), BigUintConverter.encode(&info.d));
                    object.insert("t".to_owned(), BigUintConverter.encode(&info.t));
                    Value::Object(object)
                })
                .collect(),
        )
    }

    fn decode(&self, value: &Value) -> Result<Vec<OtherPrimeInfo>, ConversionError> {
        let items = value.as_array().context(WrongTypeSnafu {
            expected: "an array of other prime info objects",
        })?;
        ensure!(!items.is_empty(), EmptySnafu);
        items
            .iter()
            .map(|item| {
                let object = item.as_object().context(WrongTypeSnafu {
                    expected: "an other prime info object",
                })?;
                Ok(OtherPrimeInfo {
                    r: other_prime_member(object, "r")?,
                    d: other_prime_member(object, "d")?,
                    t: other_prime_member(object, "t")?,
                })
            })
            .collect()
    }
}
