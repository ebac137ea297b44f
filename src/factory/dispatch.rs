use std::sync::LazyLock;

use snafu::prelude::*;
use tracing::debug;

use crate::error::{InvalidArgumentSnafu, JwkError, UnsupportedKeySnafu};
use crate::factory::{EcJwkFactory, FamilyJwkFactory, RsaJwkFactory, SecretJwkFactory};
use crate::jwk::{Jwk, JwkContext};

static GLOBAL: LazyLock<DispatchingJwkFactory> = LazyLock::new(DispatchingJwkFactory::default);

/// Selects the family factory for a context and delegates to it.
///
/// Families are tried in order; the first that supports the context wins.
#[derive(Debug)]
pub struct DispatchingJwkFactory {
    factories: Vec<Box<dyn FamilyJwkFactory>>,
}

impl DispatchingJwkFactory {
    /// A factory that tries `factories` in order.
    ///
    /// # Errors
    ///
    /// Returns [`JwkError::InvalidArgument`] if `factories` is empty.
    pub fn new(
        factories: impl IntoIterator<Item = Box<dyn FamilyJwkFactory>>,
    ) -> Result<Self, JwkError> {
        let factories: Vec<_> = factories.into_iter().collect();
        ensure!(
            !factories.is_empty(),
            InvalidArgumentSnafu {
                message: "At least one family JWK factory is required.",
            }
        );
        Ok(Self { factories })
    }

    /// The shared factory with the default families.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// The `kty` values of the registered families, in order.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.iter().map(|factory| factory.id())
    }

    /// Builds a JWK with the first family that supports `ctx`.
    ///
    /// If `ctx` has no `kty`, it is set to the selected family's id.
    ///
    /// # Errors
    ///
    /// Returns [`JwkError::InvalidArgument`] if `ctx` has neither a native
    /// key nor a `kty`, [`JwkError::UnsupportedKey`] if no family supports
    /// it, or any error from the selected family.
    pub fn create_jwk(&self, mut ctx: JwkContext) -> Result<Jwk, JwkError> {
        let kty = ctx.key_type().map(str::to_owned);
        ensure!(
            ctx.key().is_some() || kty.is_some(),
            InvalidArgumentSnafu {
                message: "Either a native key or a 'kty' value is required to create a JWK.",
            }
        );

        let Some(factory) = self.factories.iter().find(|factory| factory.supports(&ctx)) else {
            let reason = match ctx.key() {
                Some(key) => format!("key of type {}", key.type_name()),
                None => format!("kty value '{}'", kty.as_deref().unwrap_or_default()),
            };
            return UnsupportedKeySnafu { reason }.fail();
        };

        if kty.is_none() {
            ctx.set_key_type(factory.id())?;
        }
        debug!(
            kty = factory.id(),
            native_key = ctx.key().is_some(),
            "dispatching JWK creation"
        );
        factory.create_jwk(ctx)
    }
}

impl Default for DispatchingJwkFactory {
    /// Secret, EC and RSA families, in that order.
    fn default() -> Self {
        Self {
            factories: vec![
                Box::new(SecretJwkFactory),
                Box::new(EcJwkFactory),
                Box::new(RsaJwkFactory),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use p256::elliptic_curve::rand_core::OsRng;
    use rand::RngCore as _;

    use super::*;
    use crate::crypto::{EcPrivateKey, KeyFamily, NativeKey, SecretKey};
    use crate::error::ErrorKind;
    use crate::jwk::{CanonicalizerRegistry, REDACTED_VALUE, RSA_PRIVATE_NAMES};

    #[test]
    fn test_requires_key_or_kty() {
        let err = DispatchingJwkFactory::global()
            .create_jwk(JwkContext::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            err.to_string(),
            "Either a native key or a 'kty' value is required to create a JWK."
        );
    }

    #[test]
    fn test_unknown_kty() {
        let mut ctx = JwkContext::new();
        ctx.set_key_type("bogus").unwrap();
        let err = DispatchingJwkFactory::global().create_jwk(ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedKey);
        assert!(err.to_string().contains("kty value 'bogus'"));
    }

    #[test]
    fn test_unsupported_native_key() {
        let factory = DispatchingJwkFactory::new([
            Box::new(SecretJwkFactory) as Box<dyn FamilyJwkFactory>,
        ])
        .unwrap();
        let key = EcPrivateKey::P256(p256::SecretKey::random(&mut OsRng));
        let err = factory
            .create_jwk(JwkContext::new().with_key(key))
            .unwrap_err();
        assert!(matches!(err, JwkError::UnsupportedKey { .. }));
        assert!(err.to_string().contains("key of type EcPrivateKey"));
    }

    #[test]
    fn test_empty_factory_list() {
        let err = DispatchingJwkFactory::new(Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_default_order() {
        let ids: Vec<_> = DispatchingJwkFactory::default().ids().collect();
        assert_eq!(ids, ["oct", "EC", "RSA"]);
    }

    #[test]
    fn test_rsa_native_key_sets_kty() {
        let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let jwk = DispatchingJwkFactory::global()
            .create_jwk(JwkContext::new().with_key(key))
            .unwrap();
        assert_eq!(jwk.key_type(), "RSA");
        assert_eq!(jwk.family(), KeyFamily::Rsa);
        for name in RSA_PRIVATE_NAMES.iter().filter(|name| **name != "oth") {
            assert!(jwk.get(name).is_some(), "{name}");
        }
        let public = jwk.public_jwk().unwrap();
        for name in RSA_PRIVATE_NAMES {
            assert!(public.get(name).is_none(), "{name}");
        }
        assert!(!public.to_string().contains(REDACTED_VALUE));
    }

    #[test]
    fn test_oct_members() {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let mut ctx = JwkContext::new();
        ctx.put("kty", "oct").unwrap();
        ctx.put("k", URL_SAFE_NO_PAD.encode(bytes)).unwrap();
        ctx.put("alg", "HS256").unwrap();
        let jwk = DispatchingJwkFactory::global().create_jwk(ctx).unwrap();
        assert_eq!(jwk.key(), &NativeKey::Secret(SecretKey::new(bytes.to_vec())));
        assert_eq!(jwk.algorithm(), Some("HS256"));
    }

    #[test]
    fn test_kty_read_without_registered_setter() {
        let mut ctx = JwkContext::new().with_registry(Arc::new(CanonicalizerRegistry::empty()));
        ctx.put("kty", "oct").unwrap();
        ctx.put("k", URL_SAFE_NO_PAD.encode([5u8; 32])).unwrap();
        let jwk = DispatchingJwkFactory::global().create_jwk(ctx).unwrap();
        assert_eq!(jwk.key_type(), "oct");
        assert_eq!(jwk.key(), &NativeKey::Secret(SecretKey::new(vec![5u8; 32])));
    }

    #[test]
    fn test_kty_defaults_from_key() {
        let jwk = DispatchingJwkFactory::global()
            .create_jwk(JwkContext::new().with_key(SecretKey::new(vec![3u8; 24])))
            .unwrap();
        assert_eq!(jwk.get("kty"), Some(&serde_json::json!("oct")));
    }
}
