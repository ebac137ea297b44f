//! The table of canonicalizing setters for known JWK members.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use serde_json::Value;

use crate::error::JwkError;
use crate::jwk::field::{
    ALG, Field, Idiomatic, IdiomaticValue, KEY_OPS, KID, KTY, USE, X5C, X5T, X5T_S256, X5U,
    is_reducible_to_empty,
};
use crate::jwk::JwkContext;

static GLOBAL: LazyLock<Arc<CanonicalizerRegistry>> =
    LazyLock::new(|| Arc::new(CanonicalizerRegistry::standard()));

/// A setter that stores a member in canonical and idiomatic form.
pub(crate) trait Canonicalize: Send + Sync {
    fn is_secret(&self) -> bool;

    /// Decodes `value`, re-encodes it and writes both forms into `ctx`.
    ///
    /// Returns the previous idiomatic value.
    fn apply(&self, ctx: &mut JwkContext, value: Value) -> Result<Option<Idiomatic>, JwkError>;

    /// The idiomatic form of `value`, if it decodes.
    fn idiomatic(&self, value: &Value) -> Option<Idiomatic>;
}

impl<T: IdiomaticValue> Canonicalize for Field<T> {
    fn is_secret(&self) -> bool {
        Field::is_secret(self)
    }

    fn apply(&self, ctx: &mut JwkContext, value: Value) -> Result<Option<Idiomatic>, JwkError> {
        if is_reducible_to_empty(&value) {
            return Ok(ctx.remove(self.id()));
        }
        let redact = ctx.is_private_name(self.id());
        let idiomatic = self.decode_redacting(&value, redact)?;
        // Round trip through the idiomatic form so equivalent inputs store
        // the same canonical value.
        let canonical = self.encode(&idiomatic);
        Ok(ctx.store(self.id(), canonical, idiomatic.into_idiomatic()))
    }

    fn idiomatic(&self, value: &Value) -> Option<Idiomatic> {
        self.decode(value).ok().map(IdiomaticValue::into_idiomatic)
    }
}

/// The typed view of a standard member stored without canonicalization.
///
/// Lets the typed accessors read `kty`, `alg` and the other standard members
/// of a context whose registry does not cover them.
pub(crate) fn standard_idiomatic(name: &str, value: &Value) -> Option<Idiomatic> {
    GLOBAL.get(name)?.idiomatic(value)
}

/// Immutable mapping from member id to its canonicalizing setter.
///
/// Members without a setter are stored as given.
pub struct CanonicalizerRegistry {
    setters: HashMap<&'static str, Box<dyn Canonicalize>>,
}

impl CanonicalizerRegistry {
    /// A registry without any setters.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            setters: HashMap::new(),
        }
    }

    /// A registry of the standard members common to every key family:
    /// `alg`, `kid`, `key_ops`, `kty`, `use`, `x5c`, `x5t`, `x5t#S256` and `x5u`.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with_field(ALG)
            .with_field(KID)
            .with_field(KEY_OPS)
            .with_field(KTY)
            .with_field(USE)
            .with_field(X5C)
            .with_field(X5T)
            .with_field(X5T_S256)
            .with_field(X5U)
    }

    /// The shared standard registry, built on first use.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Adds a setter for `field`, replacing any setter with the same id.
    #[must_use]
    pub fn with_field<T: IdiomaticValue>(mut self, field: Field<T>) -> Self {
        self.setters.insert(field.id(), Box::new(field));
        self
    }

    /// Whether `id` has a setter.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.setters.contains_key(id)
    }

    /// Whether `id` has a setter for a secret member.
    #[must_use]
    pub fn is_secret(&self, id: &str) -> bool {
        self.setters.get(id).is_some_and(|setter| setter.is_secret())
    }

    /// Ids with setters, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.setters.keys().copied()
    }

    pub(crate) fn get(&self, id: &str) -> Option<&dyn Canonicalize> {
        self.setters.get(id).map(AsRef::as_ref)
    }
}

impl Default for CanonicalizerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for CanonicalizerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.ids().collect();
        ids.sort_unstable();
        f.debug_struct("CanonicalizerRegistry")
            .field("ids", &ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::field::{K, N};

    #[test]
    fn test_standard_ids() {
        let registry = CanonicalizerRegistry::standard();
        for id in ["alg", "kid", "key_ops", "kty", "use", "x5c", "x5t", "x5t#S256", "x5u"] {
            assert!(registry.contains(id), "{id}");
        }
        assert!(!registry.contains("n"));
        assert!(!registry.is_secret("alg"));
    }

    #[test]
    fn test_with_field() {
        let registry = CanonicalizerRegistry::standard().with_field(N).with_field(K);
        assert!(registry.contains("n"));
        assert!(registry.is_secret("k"));
        assert!(!registry.is_secret("n"));
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(
            &CanonicalizerRegistry::global(),
            &CanonicalizerRegistry::global()
        ));
    }
}
