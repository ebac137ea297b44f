use rsa::traits::{PrivateKeyParts as _, PublicKeyParts as _};
use rsa::{BigUint, RsaPrivateKey};
use snafu::prelude::*;

use crate::crypto::{KeyFamily, KeySpec, NativeKey, RsaPrivateKeySpec, RsaPublicKeySpec};
use crate::error::{InconsistentKeySnafu, InvalidArgumentSnafu, JwkError, MissingFieldSnafu};
use crate::factory::{
    FamilyJwkFactory, generate_key, private_jwk, public_key, public_only_jwk, required,
};
use crate::jwk::{
    DP, DQ, E, Field, Jwk, JwkContext, N, OTH, OtherPrimeInfo, P, Q, QI, RSA_D,
    RSA_PRIVATE_NAMES,
};

const FAMILY: &str = "RSA";
const PUBLIC_KEY: &str = "RSA public key";
const PRIVATE_KEY: &str = "RSA private key";

/// Builds `RSA` JWKs, including multi-prime keys.
///
/// A private JWK needs `d`, or both `p` and `q`. The CRT members `dp`, `dq`
/// and `qi` may be omitted, but when present they must match the prime
/// factors, and they require `p` and `q`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaJwkFactory;

/// `d mod (r - 1)`.
fn crt_exponent(d: &BigUint, prime: &BigUint) -> BigUint {
    d % &(prime.clone() - 1u32)
}

/// `a^-1 mod prime`, by Fermat's little theorem.
fn inverse_mod_prime(a: &BigUint, prime: &BigUint) -> BigUint {
    (a % prime).modpow(&(prime.clone() - 2u32), prime)
}

/// The `oth` entries for primes after `p` and `q` (RFC 7518 §6.3.2.7).
fn other_primes(d: &BigUint, primes: &[BigUint]) -> Vec<OtherPrimeInfo> {
    let [p, q, rest @ ..] = primes else {
        return Vec::new();
    };
    let mut product = p * q;
    rest.iter()
        .map(|r| {
            let info = OtherPrimeInfo {
                r: r.clone(),
                d: crt_exponent(d, r),
                t: inverse_mod_prime(&product, r),
            };
            product = &product * r;
            info
        })
        .collect()
}

struct CrtParams {
    p: BigUint,
    q: BigUint,
    dp: BigUint,
    dq: BigUint,
    qi: BigUint,
    oth: Vec<OtherPrimeInfo>,
}

impl CrtParams {
    fn of(key: &RsaPrivateKey) -> Option<Self> {
        let primes = key.primes();
        let [p, q, ..] = primes else {
            return None;
        };
        let d = key.d();
        Some(Self {
            p: p.clone(),
            q: q.clone(),
            dp: key.dp().cloned().unwrap_or_else(|| crt_exponent(d, p)),
            dq: key.dq().cloned().unwrap_or_else(|| crt_exponent(d, q)),
            qi: key
                .crt_coefficient()
                .unwrap_or_else(|| inverse_mod_prime(q, p)),
            oth: other_primes(d, primes),
        })
    }
}

fn missing<T: 'static>(field: Field<T>) -> JwkError {
    MissingFieldSnafu {
        key_type: FAMILY,
        id: field.id(),
        name: field.name(),
    }
    .build()
}

fn mismatch<T: 'static>(field: Field<T>) -> JwkError {
    InconsistentKeySnafu {
        key_type: PRIVATE_KEY,
        message: format!(
            "the '{}' ({}) value does not match the prime factors",
            field.id(),
            field.name()
        ),
    }
    .build()
}

impl FamilyJwkFactory for RsaJwkFactory {
    fn family(&self) -> KeyFamily {
        KeyFamily::Rsa
    }

    fn private_names(&self) -> &'static [&'static str] {
        RSA_PRIVATE_NAMES
    }

    fn create_jwk_from_key(&self, mut ctx: JwkContext, key: NativeKey) -> Result<Jwk, JwkError> {
        match &key {
            NativeKey::RsaPublic(public) => {
                ctx.store_field(N, public.n().clone());
                ctx.store_field(E, public.e().clone());
                Ok(public_only_jwk(&ctx, key))
            }
            NativeKey::RsaPrivate(private) => {
                let public = public_key(&mut ctx, PRIVATE_KEY, &key)?;
                ctx.store_field(N, private.n().clone());
                ctx.store_field(E, private.e().clone());
                ctx.store_field(RSA_D, private.d().clone());
                if let Some(crt) = CrtParams::of(private) {
                    ctx.store_field(P, crt.p);
                    ctx.store_field(Q, crt.q);
                    ctx.store_field(DP, crt.dp);
                    ctx.store_field(DQ, crt.dq);
                    ctx.store_field(QI, crt.qi);
                    if !crt.oth.is_empty() {
                        ctx.store_field(OTH, crt.oth);
                    }
                }
                Ok(private_jwk(ctx, key, public))
            }
            _ => InvalidArgumentSnafu {
                message: format!("Expected an RSA key, found {}.", key.type_name()),
            }
            .fail(),
        }
    }

    fn create_jwk_from_values(&self, mut ctx: JwkContext) -> Result<Jwk, JwkError> {
        let n = required(&ctx, FAMILY, N)?;
        let e = required(&ctx, FAMILY, E)?;
        ctx.store_field(N, n.clone());
        ctx.store_field(E, e.clone());

        if !RSA_PRIVATE_NAMES.iter().any(|name| ctx.contains(name)) {
            let spec = RsaPublicKeySpec::builder().n(n).e(e).build();
            let key = generate_key(&ctx, KeyFamily::Rsa, PUBLIC_KEY, KeySpec::RsaPublic(spec))?;
            return Ok(Jwk::new(ctx, key, None));
        }

        let d = ctx.get_field(RSA_D)?;
        let p = ctx.get_field(P)?;
        let q = ctx.get_field(Q)?;
        let dp = ctx.get_field(DP)?;
        let dq = ctx.get_field(DQ)?;
        let qi = ctx.get_field(QI)?;
        let oth = ctx.get_field(OTH)?;

        let needs_primes = dp.is_some() || dq.is_some() || qi.is_some() || oth.is_some();
        let factors = match (p, q) {
            (Some(p), Some(q)) => Some((p, q)),
            (None, None) if !needs_primes => None,
            (None, _) => return Err(missing(P)),
            (Some(_), None) => return Err(missing(Q)),
        };
        if factors.is_none() && d.is_none() {
            return Err(missing(RSA_D));
        }

        let mut primes = Vec::new();
        if let Some((p, q)) = &factors {
            primes.push(p.clone());
            primes.push(q.clone());
            primes.extend(oth.iter().flatten().map(|info| info.r.clone()));
        }

        // Rewrite the supplied private members in canonical form.
        if let Some(d) = &d {
            ctx.store_field(RSA_D, d.clone());
        }
        if let Some((p, q)) = &factors {
            ctx.store_field(P, p.clone());
            ctx.store_field(Q, q.clone());
        }
        for (field, value) in [(DP, &dp), (DQ, &dq), (QI, &qi)] {
            if let Some(value) = value {
                ctx.store_field(field, value.clone());
            }
        }
        if let Some(oth) = &oth {
            ctx.store_field(OTH, oth.clone());
        }

        let spec = RsaPrivateKeySpec::builder()
            .n(n.clone())
            .e(e.clone())
            .maybe_d(d)
            .primes(primes)
            .build();
        let key = generate_key(&ctx, KeyFamily::Rsa, PRIVATE_KEY, KeySpec::RsaPrivate(spec))?;
        let NativeKey::RsaPrivate(private) = &key else {
            return InconsistentKeySnafu {
                key_type: PRIVATE_KEY,
                message: format!("provider returned a {}", key.type_name()),
            }
            .fail();
        };
        ensure!(
            private.n() == &n && private.e() == &e,
            InconsistentKeySnafu {
                key_type: PRIVATE_KEY,
                message: "the 'n' and 'e' values do not match the private key",
            }
        );

        if let Some(crt) = CrtParams::of(private) {
            for (field, supplied, expected) in
                [(DP, &dp, &crt.dp), (DQ, &dq, &crt.dq), (QI, &qi, &crt.qi)]
            {
                if supplied.as_ref().is_some_and(|supplied| supplied != expected) {
                    return Err(mismatch(field));
                }
            }
            if oth.as_ref().is_some_and(|oth| oth != &crt.oth) {
                return Err(mismatch(OTH));
            }
        }

        let public = public_key(&mut ctx, PRIVATE_KEY, &key)?;
        Ok(private_jwk(ctx, key, public))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use serde_json::{Value, json};

    use super::*;
    use crate::error::ErrorKind;
    use crate::jwk::REDACTED_VALUE;

    static KEY: LazyLock<RsaPrivateKey> =
        LazyLock::new(|| RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap());

    fn private_jwk() -> Jwk {
        RsaJwkFactory
            .create_jwk(JwkContext::new().with_key(KEY.clone()))
            .unwrap()
    }

    /// A context holding the members of [`private_jwk`] minus `without`.
    fn context(without: &[&str]) -> JwkContext {
        let Value::Object(mut members) = private_jwk().to_json() else {
            unreachable!("a JWK is a JSON object");
        };
        for name in without {
            members.remove(*name);
        }
        let mut ctx = JwkContext::new();
        ctx.put_all(members).unwrap();
        ctx
    }

    #[test]
    fn test_from_private_key() {
        let jwk = private_jwk();
        assert_eq!(jwk.key_type(), "RSA");
        for name in ["n", "e", "d", "p", "q", "dp", "dq", "qi"] {
            assert!(jwk.get(name).is_some(), "{name}");
        }
        assert!(jwk.get("oth").is_none());
        assert!(jwk.is_private());

        let public = jwk.public_jwk().unwrap();
        assert_eq!(public.names().collect::<Vec<_>>(), ["e", "kty", "n"]);
        assert_eq!(public.key(), &NativeKey::RsaPublic(KEY.to_public_key()));

        let display = jwk.to_string();
        assert!(display.contains(REDACTED_VALUE));
        assert!(display.contains(jwk.get("n").unwrap().as_str().unwrap()));
        assert!(!display.contains(jwk.get("d").unwrap().as_str().unwrap()));
    }

    #[test]
    fn test_public_key_drops_private_members() {
        let mut ctx = JwkContext::new().with_key(KEY.to_public_key());
        ctx.put("p", "AQAB").unwrap();
        ctx.put("qi", "AQAB").unwrap();

        let jwk = RsaJwkFactory.create_jwk(ctx).unwrap();
        assert!(!jwk.is_private());
        assert!(jwk.get("p").is_none());
        assert_eq!(jwk.names().collect::<Vec<_>>(), ["e", "kty", "n"]);
        assert!(!jwk.to_string().contains(REDACTED_VALUE));
    }

    #[test]
    fn test_round_trip_from_values() {
        let jwk = RsaJwkFactory.create_jwk(context(&[])).unwrap();
        assert_eq!(jwk, private_jwk());
        assert_eq!(jwk.key(), &NativeKey::RsaPrivate(KEY.clone()));
    }

    #[test]
    fn test_primes_without_d() {
        let jwk = RsaJwkFactory.create_jwk(context(&["d"])).unwrap();
        assert!(jwk.get("d").is_none());
        let NativeKey::RsaPrivate(key) = jwk.key() else {
            unreachable!("expected an RSA private key");
        };
        assert_eq!(key.n(), KEY.n());
    }

    #[test]
    fn test_d_without_primes() {
        let ctx = context(&["p", "q", "dp", "dq", "qi"]);
        let jwk = RsaJwkFactory.create_jwk(ctx).unwrap();
        assert_eq!(jwk.names().collect::<Vec<_>>(), ["d", "e", "kty", "n"]);
        assert!(jwk.public_jwk().is_some());
    }

    #[test]
    fn test_crt_member_requires_primes() {
        let err = RsaJwkFactory
            .create_jwk(context(&["p", "q", "dp", "dq"]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "RSA JWK is missing required 'p' (First Prime Factor) value"
        );

        let err = RsaJwkFactory.create_jwk(context(&["q"])).unwrap_err();
        assert!(matches!(err, JwkError::MissingField { id: "q", .. }));
    }

    #[test]
    fn test_private_requires_d_or_primes() {
        let mut ctx = context(&["d", "p", "q", "dp", "dq"]);
        ctx.remove("qi");
        ctx.put("oth", Value::Null).unwrap();
        // Only public members remain: this is a public key.
        assert!(RsaJwkFactory.create_jwk(ctx).unwrap().public_jwk().is_none());

        let err = RsaJwkFactory
            .create_jwk(context(&["d", "q", "dp", "dq", "qi"]))
            .unwrap_err();
        assert!(matches!(err, JwkError::MissingField { id: "q", .. }));
    }

    #[test]
    fn test_mismatched_crt_member() {
        let mut ctx = context(&[]);
        ctx.put_field(DP, &BigUint::from(3u32)).unwrap();
        let err = RsaJwkFactory.create_jwk(ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
        assert!(err.to_string().contains("'dp' (First Factor CRT Exponent)"));
    }

    #[test]
    fn test_mismatched_modulus() {
        let mut ctx = context(&["d"]);
        ctx.put_field(N, &(KEY.n().clone() + 2u32)).unwrap();
        let err = RsaJwkFactory.create_jwk(ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
    }

    #[test]
    fn test_malformed_public_value() {
        let mut ctx = JwkContext::new();
        ctx.put_all([("kty", json!("RSA")), ("n", json!("AQAB")), ("e", json!(65537))])
            .unwrap();
        let err = RsaJwkFactory.create_jwk(ctx).unwrap_err();
        assert!(matches!(err, JwkError::MalformedValue { id: "e", .. }));
        assert!(err.to_string().contains("[65537]"));
    }

    #[test]
    fn test_other_primes_arithmetic() {
        let primes = [11u32, 13, 17].map(BigUint::from);
        let oth = other_primes(&BigUint::from(100u32), &primes);
        assert_eq!(oth.len(), 1);
        assert_eq!(oth[0].r, BigUint::from(17u32));
        assert_eq!(oth[0].d, BigUint::from(4u32));
        // (11 * 13)^-1 mod 17 = 7^-1 mod 17 = 5
        assert_eq!(oth[0].t, BigUint::from(5u32));
    }

    #[test]
    fn test_multi_prime_round_trip() {
        // Mersenne primes 2^61 - 1, 2^89 - 1 and 2^107 - 1.
        let primes = [61usize, 89, 107]
            .map(|bits| (BigUint::from(1u32) << bits) - 1u32)
            .to_vec();
        let key = RsaPrivateKey::from_primes(primes, BigUint::from(65537u32)).unwrap();
        let jwk = RsaJwkFactory
            .create_jwk(JwkContext::new().with_key(key))
            .unwrap();
        let oth = jwk.get_field(OTH).unwrap().unwrap();
        assert_eq!(oth.len(), 1);

        let Value::Object(members) = jwk.to_json() else {
            unreachable!("a JWK is a JSON object");
        };
        let mut ctx = JwkContext::new();
        ctx.put_all(members).unwrap();
        let rebuilt = RsaJwkFactory.create_jwk(ctx).unwrap();
        assert_eq!(rebuilt, jwk);
        assert_eq!(rebuilt.key(), jwk.key());
    }
}
