use secrecy::{ExposeSecret as _, SecretBox};
use snafu::prelude::*;

use crate::crypto::{
    Curve, EcPrivateKeySpec, EcPublicKey, EcPublicKeySpec, KeyFamily, KeySpec, NativeKey,
};
use crate::error::{InconsistentKeySnafu, InvalidArgumentSnafu, JwkError, MalformedKeySnafu};
use crate::factory::{
    FamilyJwkFactory, generate_key, private_jwk, public_key, public_only_jwk, required,
};
use crate::jwk::{CRV, EC_D, EC_PRIVATE_NAMES, Field, Jwk, JwkContext, X, Y};

const FAMILY: &str = "EC";
const PUBLIC_KEY: &str = "EC public key";
const PRIVATE_KEY: &str = "EC private key";

/// Builds `EC` JWKs on the P-256, P-384 and P-521 curves.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcJwkFactory;

/// Left-pads a field element to the curve's field size.
///
/// Some encoders drop leading zero bytes.
fn field_element(
    ctx: &JwkContext,
    curve: Curve,
    field: Field<Vec<u8>>,
) -> Result<Vec<u8>, JwkError> {
    let bytes = required(ctx, FAMILY, field)?;
    let size = curve.field_size();
    ensure!(
        bytes.len() <= size,
        MalformedKeySnafu {
            message: format!(
                "EC JWK '{}' ({}) value is {} bytes, but {} field elements are {size} bytes.",
                field.id(),
                field.name(),
                bytes.len(),
                curve.id()
            ),
        }
    );
    let mut padded = vec![0u8; size - bytes.len()];
    padded.extend_from_slice(&bytes);
    Ok(padded)
}

fn store_public(ctx: &mut JwkContext, key: &EcPublicKey) {
    let (x, y) = key.coordinates();
    ctx.store_field(CRV, key.curve());
    ctx.store_field(X, x);
    ctx.store_field(Y, y);
}

impl FamilyJwkFactory for EcJwkFactory {
    fn family(&self) -> KeyFamily {
        KeyFamily::Ec
    }

    fn private_names(&self) -> &'static [&'static str] {
        EC_PRIVATE_NAMES
    }

    fn create_jwk_from_key(&self, mut ctx: JwkContext, key: NativeKey) -> Result<Jwk, JwkError> {
        match &key {
            NativeKey::EcPublic(public) => {
                store_public(&mut ctx, public);
                Ok(public_only_jwk(&ctx, key))
            }
            NativeKey::EcPrivate(private) => {
                let public = public_key(&mut ctx, PRIVATE_KEY, &key)?;
                let NativeKey::EcPublic(public_ec) = &public else {
                    return InconsistentKeySnafu {
                        key_type: PRIVATE_KEY,
                        message: format!("public key is a {}", public.type_name()),
                    }
                    .fail();
                };
                store_public(&mut ctx, public_ec);
                ctx.store_field(EC_D, private.scalar_bytes().expose_secret().to_vec());
                Ok(private_jwk(ctx, key, public))
            }
            _ => InvalidArgumentSnafu {
                message: format!("Expected an EC key, found {}.", key.type_name()),
            }
            .fail(),
        }
    }

    fn create_jwk_from_values(&self, mut ctx: JwkContext) -> Result<Jwk, JwkError> {
        let curve = required(&ctx, FAMILY, CRV)?;
        let x = field_element(&ctx, curve, X)?;
        let y = field_element(&ctx, curve, Y)?;
        ctx.store_field(CRV, curve);
        ctx.store_field(X, x.clone());
        ctx.store_field(Y, y.clone());

        if !ctx.contains(EC_D.id()) {
            let spec = EcPublicKeySpec::builder().curve(curve).x(x).y(y).build();
            let key = generate_key(&ctx, KeyFamily::Ec, PUBLIC_KEY, KeySpec::EcPublic(spec))?;
            return Ok(Jwk::new(ctx, key, None));
        }

        let d = field_element(&ctx, curve, EC_D)?;
        ctx.store_field(EC_D, d.clone());
        let spec = EcPrivateKeySpec::builder()
            .curve(curve)
            .d(SecretBox::new(d.into_boxed_slice()))
            .build();
        let key = generate_key(&ctx, KeyFamily::Ec, PRIVATE_KEY, KeySpec::EcPrivate(spec))?;
        let public = public_key(&mut ctx, PRIVATE_KEY, &key)?;
        let NativeKey::EcPublic(public_ec) = &public else {
            return InconsistentKeySnafu {
                key_type: PRIVATE_KEY,
                message: format!("public key is a {}", public.type_name()),
            }
            .fail();
        };
        ensure!(
            public_ec.curve() == curve && public_ec.coordinates() == (x, y),
            InconsistentKeySnafu {
                key_type: PRIVATE_KEY,
                message: "the 'x' and 'y' values do not match the point derived from 'd'",
            }
        );
        Ok(private_jwk(ctx, key, public))
    }
}

#[cfg(test)]
mod tests {
    use p256::elliptic_curve::rand_core::OsRng;
    use serde_json::{Value, json};

    use super::*;
    use crate::crypto::EcPrivateKey;
    use crate::error::ErrorKind;
    use crate::jwk::REDACTED_VALUE;

    // https://www.rfc-editor.org/rfc/rfc7517.html#appendix-A.2
    const A2_X: &str = "MKBCTNIcKUSDii11ySs3526iDZ8AiTo7Tu6KPAqv7D4";
    const A2_Y: &str = "4Etl6SRW2YiLUrN5vfvVHuhp7x8PxltmWWlbbM4IFyM";
    const A2_D: &str = "870MB6gfuTJ4HtUnUvYMyJpr5eUZNP4Bk43bVdj3eAE";

    fn context(members: Value) -> JwkContext {
        let Value::Object(members) = members else {
            unreachable!("members must be an object");
        };
        let mut ctx = JwkContext::new();
        ctx.put_all(members).unwrap();
        ctx
    }

    #[test]
    fn test_private_from_values() {
        let ctx = context(json!({
            "kty": "EC", "crv": "P-256", "x": A2_X, "y": A2_Y, "d": A2_D, "use": "enc", "kid": "1"
        }));
        let jwk = EcJwkFactory.create_jwk(ctx).unwrap();
        assert!(jwk.is_private());
        assert!(matches!(jwk.key(), NativeKey::EcPrivate(EcPrivateKey::P256(_))));
        assert_eq!(jwk.get("d"), Some(&json!(A2_D)));
        assert!(jwk.to_string().contains(REDACTED_VALUE));

        let public = jwk.public_jwk().unwrap();
        assert!(!public.is_private());
        assert!(!public.names().any(|name| name == "d"));
        assert_eq!(public.get("x"), Some(&json!(A2_X)));
        assert_eq!(public.key_id(), Some("1"));
        assert_eq!(public.thumbprint(), jwk.thumbprint());
    }

    #[test]
    fn test_private_with_foreign_coordinates() {
        let other = p256::SecretKey::random(&mut OsRng);
        let (x, _) = EcPublicKey::P256(other.public_key()).coordinates();
        let mut ctx = context(json!({"kty": "EC", "crv": "P-256", "y": A2_Y, "d": A2_D}));
        ctx.put_field(X, &x).unwrap();
        let err = EcJwkFactory.create_jwk(ctx).unwrap_err();
        assert!(matches!(err, JwkError::InconsistentKey { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
    }

    #[test]
    fn test_short_coordinates_are_padded() {
        // P-256 public key whose x coordinate starts with a zero byte.
        let key = std::iter::repeat_with(|| p256::SecretKey::random(&mut OsRng).public_key())
            .map(EcPublicKey::P256)
            .find(|key| key.coordinates().0[0] == 0)
            .unwrap();
        let (x, y) = key.coordinates();
        let mut ctx = context(json!({"kty": "EC", "crv": "P-256"}));
        ctx.put_field(X, &x[1..].to_vec()).unwrap();
        ctx.put_field(Y, &y).unwrap();

        let jwk = EcJwkFactory.create_jwk(ctx).unwrap();
        assert_eq!(jwk.get_field(X).unwrap(), Some(x));
        assert_eq!(jwk.key(), &NativeKey::EcPublic(key));
    }

    #[test]
    fn test_long_coordinate_rejected() {
        let mut ctx = context(json!({"kty": "EC", "crv": "P-256", "y": A2_Y}));
        ctx.put_field(X, &vec![1u8; 33]).unwrap();
        let err = EcJwkFactory.create_jwk(ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedKey);
    }

    #[test]
    fn test_point_off_curve() {
        let ctx = context(json!({"kty": "EC", "crv": "P-256", "x": A2_X, "y": A2_X}));
        let err = EcJwkFactory.create_jwk(ctx).unwrap_err();
        assert!(matches!(err, JwkError::InvalidKey { key_type: PUBLIC_KEY, .. }));
        assert!(err.to_string().starts_with("Unable to create EC public key from JWK {"));
    }

    #[test]
    fn test_unsupported_curve() {
        let ctx = context(json!({"kty": "EC", "crv": "P-192", "x": A2_X, "y": A2_Y}));
        let err = EcJwkFactory.create_jwk(ctx).unwrap_err();
        assert!(matches!(err, JwkError::MalformedValue { id: "crv", .. }));
    }

    #[test]
    fn test_from_native_keys() {
        let secret = p521::SecretKey::random(&mut OsRng);
        let private = EcPrivateKey::P521(secret);
        let jwk = EcJwkFactory
            .create_jwk(JwkContext::new().with_key(private.clone()))
            .unwrap();
        assert_eq!(jwk.key_type(), "EC");
        assert_eq!(jwk.get("crv"), Some(&json!("P-521")));
        assert_eq!(jwk.get_field(EC_D).unwrap().map(|d| d.len()), Some(66));
        let public = jwk.public_jwk().unwrap();
        assert_eq!(public.key(), &NativeKey::EcPublic(private.public_key()));

        let public_only = EcJwkFactory
            .create_jwk(JwkContext::new().with_key(private.public_key()))
            .unwrap();
        assert_eq!(&public_only, public);
    }

    #[test]
    fn test_public_key_drops_private_members() {
        let public = p256::SecretKey::random(&mut OsRng).public_key();
        let mut ctx = JwkContext::new().with_key(EcPublicKey::P256(public));
        ctx.put("d", A2_D).unwrap();
        ctx.put("kid", "1").unwrap();

        let jwk = EcJwkFactory.create_jwk(ctx).unwrap();
        assert!(!jwk.is_private());
        assert!(jwk.get("d").is_none());
        assert_eq!(jwk.names().collect::<Vec<_>>(), ["crv", "kid", "kty", "x", "y"]);
        assert!(!jwk.to_json().to_string().contains(A2_D));
        assert!(!jwk.to_string().contains(REDACTED_VALUE));
    }

    #[test]
    fn test_mismatched_attached_public_key() {
        let private = EcPrivateKey::P256(p256::SecretKey::random(&mut OsRng));
        let other = p256::SecretKey::random(&mut OsRng).public_key();
        let mut ctx = JwkContext::new().with_key(private);
        ctx.set_public_key(EcPublicKey::P256(other));
        let err = EcJwkFactory.create_jwk(ctx).unwrap_err();
        assert!(matches!(err, JwkError::InconsistentKey { .. }));
    }
}
