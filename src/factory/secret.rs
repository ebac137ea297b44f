use secrecy::ExposeSecret as _;
use snafu::prelude::*;

use crate::crypto::{KeyFamily, KeySpec, NativeKey, SecretKey};
use crate::error::{InvalidArgumentSnafu, JwkError, MalformedKeySnafu};
use crate::factory::{FamilyJwkFactory, generate_key, required};
use crate::jwk::{Jwk, JwkContext, K, SECRET_PRIVATE_NAMES, X5C, X5T, X5T_S256, X5U};

const KEY_TYPE: &str = "secret key";

/// Builds `oct` JWKs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretJwkFactory;

/// Minimum key length in bytes for algorithms that fix one.
fn min_key_len(alg: &str) -> Option<usize> {
    match alg {
        "A128KW" | "A128GCM" | "A128GCMKW" => Some(16),
        "A192KW" | "A192GCM" | "A192GCMKW" => Some(24),
        "HS256" | "A256KW" | "A256GCM" | "A256GCMKW" | "A128CBC-HS256" => Some(32),
        "HS384" | "A192CBC-HS384" => Some(48),
        "HS512" | "A256CBC-HS512" => Some(64),
        _ => None,
    }
}

fn validate(ctx: &JwkContext, len: usize) -> Result<(), JwkError> {
    for field in [X5C.id(), X5T.id(), X5T_S256.id(), X5U.id()] {
        ensure!(
            !ctx.contains(field),
            MalformedKeySnafu {
                message: format!("Secret JWKs may not contain the '{field}' member."),
            }
        );
    }
    if let Some(alg) = ctx.algorithm() {
        if let Some(min) = min_key_len(alg) {
            ensure!(
                len >= min,
                MalformedKeySnafu {
                    message: format!(
                        "Secret JWK 'k' value is {} bits, but algorithm '{alg}' requires at least {} bits.",
                        len * 8,
                        min * 8
                    ),
                }
            );
        }
    }
    Ok(())
}

impl FamilyJwkFactory for SecretJwkFactory {
    fn family(&self) -> KeyFamily {
        KeyFamily::Secret
    }

    fn private_names(&self) -> &'static [&'static str] {
        SECRET_PRIVATE_NAMES
    }

    fn create_jwk_from_key(&self, mut ctx: JwkContext, key: NativeKey) -> Result<Jwk, JwkError> {
        let NativeKey::Secret(secret) = &key else {
            return InvalidArgumentSnafu {
                message: format!("Expected a secret key, found {}.", key.type_name()),
            }
            .fail();
        };
        ensure!(
            !secret.is_empty(),
            MalformedKeySnafu {
                message: "Secret key cannot be empty.",
            }
        );
        ctx.store_field(K, secret.expose_secret().to_vec());
        validate(&ctx, secret.len())?;
        Ok(Jwk::new(ctx, key, None))
    }

    fn create_jwk_from_values(&self, mut ctx: JwkContext) -> Result<Jwk, JwkError> {
        let bytes = required(&ctx, "Secret", K)?;
        validate(&ctx, bytes.len())?;
        ctx.store_field(K, bytes.clone());
        let key = generate_key(
            &ctx,
            KeyFamily::Secret,
            KEY_TYPE,
            KeySpec::Secret(SecretKey::new(bytes)),
        )?;
        Ok(Jwk::new(ctx, key, None))
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret as _;
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;
    use crate::jwk::REDACTED_VALUE;

    fn context(members: &[(&str, serde_json::Value)]) -> JwkContext {
        let mut ctx = JwkContext::new();
        ctx.put("kty", "oct").unwrap();
        for (name, value) in members {
            ctx.put(name, value.clone()).unwrap();
        }
        ctx
    }

    #[test]
    fn test_from_key() {
        let ctx = JwkContext::new().with_key(SecretKey::new(vec![0xffu8; 32]));
        let jwk = SecretJwkFactory.create_jwk(ctx).unwrap();
        assert_eq!(jwk.key_type(), "oct");
        assert_eq!(jwk.get("k"), Some(&json!(format!("{}8", "_".repeat(42)))));
        assert!(jwk.is_private());
        assert!(jwk.public_jwk().is_none());
        assert!(jwk.to_string().contains(REDACTED_VALUE));
    }

    #[test]
    fn test_from_values() {
        let ctx = context(&[("k", json!("AAECAwQFBgcICQoLDA0ODw==")), ("alg", json!("A128KW"))]);
        let jwk = SecretJwkFactory.create_jwk(ctx).unwrap();
        // Stored unpadded.
        assert_eq!(jwk.get("k"), Some(&json!("AAECAwQFBgcICQoLDA0ODw")));
        let NativeKey::Secret(key) = jwk.key() else {
            unreachable!("expected a secret key");
        };
        assert_eq!(key.expose_secret(), (0u8..16).collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn test_missing_k() {
        let err = SecretJwkFactory.create_jwk(context(&[])).unwrap_err();
        assert_eq!(err.to_string(), "Secret JWK is missing required 'k' (Key Value) value");
    }

    #[test]
    fn test_malformed_k_is_redacted() {
        let err = SecretJwkFactory
            .create_jwk(context(&[("k", json!("not*base64"))]))
            .unwrap_err();
        assert!(matches!(err, JwkError::MalformedValue { id: "k", .. }));
        assert!(err.to_string().contains(REDACTED_VALUE));
        assert!(!err.to_string().contains("not*base64"));
    }

    #[test]
    fn test_key_too_short_for_alg() {
        let ctx = context(&[("k", json!("AAECAwQFBgcICQoLDA0ODw")), ("alg", json!("HS256"))]);
        let err = SecretJwkFactory.create_jwk(ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedKey);
        assert!(err.to_string().contains("128 bits"));
        assert!(err.to_string().contains("at least 256 bits"));
    }

    #[test]
    fn test_certificate_members_rejected() {
        let ctx = context(&[
            ("k", json!("AAECAwQFBgcICQoLDA0ODw")),
            ("x5u", json!("https://example.com/cert")),
        ]);
        let err = SecretJwkFactory.create_jwk(ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedKey);
        assert!(err.to_string().contains("'x5u'"));
    }

    #[test]
    fn test_empty_native_key_rejected() {
        let ctx = JwkContext::new().with_key(SecretKey::new(Vec::new()));
        let err = SecretJwkFactory.create_jwk(ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedKey);
    }
}
