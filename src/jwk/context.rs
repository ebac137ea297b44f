//! The mutable builder that JWKs are assembled in.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use snafu::prelude::*;
use tracing::trace;
use url::Url;

use crate::crypto::{KeyProvider, NativeKey};
use crate::error::{InvalidArgumentSnafu, JwkError};
use crate::jwk::convert::X509Certificate;
use crate::jwk::field::{
    ALG, DEFAULT_PRIVATE_NAMES, Field, Idiomatic, IdiomaticValue, KEY_OPS, KID, KTY,
    REDACTED_VALUE, USE, X5C, X5T, X5T_S256, X5U, is_reducible_to_empty,
};
use crate::jwk::registry::{CanonicalizerRegistry, standard_idiomatic};

/// Whether a copied context keeps private members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Copy every member.
    RetainPrivate,
    /// Remove private members from the copy.
    StripPrivate,
}

/// A JWK under construction.
///
/// Every member is held three ways: its canonical (wire) value, its
/// idiomatic (typed) value, and a redacted value for display in which
/// private members are replaced with [`REDACTED_VALUE`]. A member is present
/// in all three views or in none.
///
/// A context is a single-writer builder. There is no way to clear it;
/// members must be removed one at a time.
pub struct JwkContext {
    registry: Arc<CanonicalizerRegistry>,
    values: BTreeMap<String, Value>,
    idiomatic: BTreeMap<String, Idiomatic>,
    redacted: BTreeMap<String, Value>,
    private_names: BTreeSet<String>,
    key: Option<NativeKey>,
    public_key: Option<NativeKey>,
    provider: Option<Arc<dyn KeyProvider>>,
}

impl JwkContext {
    /// An empty context using the shared standard registry.
    ///
    /// Until a family is known, every family's private members are treated as
    /// private.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: CanonicalizerRegistry::global(),
            values: BTreeMap::new(),
            idiomatic: BTreeMap::new(),
            redacted: BTreeMap::new(),
            private_names: DEFAULT_PRIVATE_NAMES
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
            key: None,
            public_key: None,
            provider: None,
        }
    }

    /// Replaces the set of member names considered private and re-derives
    /// the redacted view.
    ///
    /// # Errors
    ///
    /// Returns [`JwkError::InvalidArgument`] if `names` is empty.
    pub fn with_private_names<I, S>(mut self, names: I) -> Result<Self, JwkError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        ensure!(
            !names.is_empty(),
            InvalidArgumentSnafu {
                message: "Private member names cannot be empty.",
            }
        );
        self.private_names = names;
        self.redacted = self
            .values
            .iter()
            .map(|(name, value)| (name.clone(), self.redact(name, value)))
            .collect();
        Ok(self)
    }

    /// Uses `registry` for members put from now on.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<CanonicalizerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Uses `provider` when native keys are built from this context.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn KeyProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Sets the provider used when native keys are built from this context.
    pub fn set_provider(&mut self, provider: Arc<dyn KeyProvider>) {
        self.provider = Some(provider);
    }

    /// The provider, if one was selected.
    #[must_use]
    pub fn provider(&self) -> Option<&Arc<dyn KeyProvider>> {
        self.provider.as_ref()
    }

    /// Attaches a native key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<NativeKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attaches a native key, replacing any previous one.
    pub fn set_key(&mut self, key: impl Into<NativeKey>) {
        self.key = Some(key.into());
    }

    /// The attached native key.
    #[must_use]
    pub fn key(&self) -> Option<&NativeKey> {
        self.key.as_ref()
    }

    /// Attaches the public counterpart of the native key.
    pub fn set_public_key(&mut self, key: impl Into<NativeKey>) {
        self.public_key = Some(key.into());
    }

    /// The attached public counterpart of the native key.
    #[must_use]
    pub fn public_key(&self) -> Option<&NativeKey> {
        self.public_key.as_ref()
    }

    /// Copies the members of this context.
    ///
    /// Native keys are not copied. The registry, private names and provider
    /// are shared with the copy. Stripped private members are removed, never
    /// replaced with a placeholder.
    #[must_use]
    pub fn copy(&self, mode: CopyMode) -> Self {
        let mut copy = Self {
            registry: Arc::clone(&self.registry),
            values: self.values.clone(),
            idiomatic: self.idiomatic.clone(),
            redacted: self.redacted.clone(),
            private_names: self.private_names.clone(),
            key: None,
            public_key: None,
            provider: self.provider.clone(),
        };
        if mode == CopyMode::StripPrivate {
            let private: Vec<String> = copy
                .values
                .keys()
                .filter(|name| copy.is_redacted(name))
                .cloned()
                .collect();
            for name in private {
                copy.remove(&name);
            }
        }
        copy
    }

    /// Copies the members of this context and attaches `key`.
    ///
    /// Private members are stripped when `key` has no private material.
    #[must_use]
    pub fn copy_with_key(&self, key: impl Into<NativeKey>) -> Self {
        let key = key.into();
        let mode = if key.is_private() {
            CopyMode::RetainPrivate
        } else {
            CopyMode::StripPrivate
        };
        self.copy(mode).with_key(key)
    }

    /// Sets a member, canonicalizing it if the registry knows its name.
    ///
    /// Names and string values are trimmed. A value that is null or empty
    /// removes the member. Returns the previous idiomatic value.
    ///
    /// Standard members the registry does not canonicalize are stored as
    /// given, and stay readable through the typed accessors when they decode.
    ///
    /// # Errors
    ///
    /// Returns [`JwkError::InvalidArgument`] if the name is empty, or
    /// [`JwkError::MalformedValue`] if the value cannot be converted.
    pub fn put(
        &mut self,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Idiomatic>, JwkError> {
        let name = name.trim();
        ensure!(
            !name.is_empty(),
            InvalidArgumentSnafu {
                message: "JWK member name cannot be empty.",
            }
        );
        let value = normalize(value.into());
        let registry = Arc::clone(&self.registry);
        if let Some(setter) = registry.get(name) {
            trace!(member = name, canonicalized = true, "put JWK member");
            return setter.apply(self, value);
        }
        trace!(member = name, canonicalized = false, "put JWK member");
        if is_reducible_to_empty(&value) {
            return Ok(self.remove(name));
        }
        let idiomatic = standard_idiomatic(name, &value)
            .unwrap_or_else(|| Idiomatic::Json(value.clone()));
        Ok(self.store(name, value, idiomatic))
    }

    /// Sets every member in `members`, in iteration order.
    ///
    /// This is not atomic: if a member fails, the members before it remain
    /// set.
    ///
    /// # Errors
    ///
    /// Returns [`JwkError::InvalidArgument`] if `members` is empty, or the
    /// first error returned by [`JwkContext::put`].
    pub fn put_all<I, K, V>(&mut self, members: I) -> Result<(), JwkError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut members = members.into_iter().peekable();
        ensure!(
            members.peek().is_some(),
            InvalidArgumentSnafu {
                message: "JWK members cannot be empty.",
            }
        );
        for (name, value) in members {
            self.put(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// Sets a member from its idiomatic value.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoded value is rejected by [`JwkContext::put`].
    pub fn put_field<T: IdiomaticValue>(
        &mut self,
        field: Field<T>,
        value: &T,
    ) -> Result<Option<Idiomatic>, JwkError> {
        self.put(field.id(), field.encode(value))
    }

    /// Removes a member from every view, returning its idiomatic value.
    pub fn remove(&mut self, name: &str) -> Option<Idiomatic> {
        self.values.remove(name);
        self.redacted.remove(name);
        self.idiomatic.remove(name)
    }

    /// The canonical value of a member.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// The idiomatic value of a member.
    #[must_use]
    pub fn idiomatic_value(&self, name: &str) -> Option<&Idiomatic> {
        self.idiomatic.get(name)
    }

    /// Reads a member through its descriptor.
    ///
    /// Works for members the registry does not canonicalize, by decoding the
    /// stored canonical value.
    ///
    /// # Errors
    ///
    /// Returns [`JwkError::MalformedValue`] if the stored value cannot be
    /// decoded by `field`.
    pub fn get_field<T: IdiomaticValue>(&self, field: Field<T>) -> Result<Option<T>, JwkError> {
        if let Some(value) = self.typed(field) {
            return Ok(Some(value.clone()));
        }
        self.values
            .get(field.id())
            .map(|value| field.decode_redacting(value, self.is_private_name(field.id())))
            .transpose()
    }

    /// Whether the member is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Member names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// The canonical view.
    #[must_use]
    pub fn canonical_values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// The display view, with private members replaced by [`REDACTED_VALUE`].
    #[must_use]
    pub fn redacted_values(&self) -> &BTreeMap<String, Value> {
        &self.redacted
    }

    /// Member names considered private.
    #[must_use]
    pub fn private_names(&self) -> &BTreeSet<String> {
        &self.private_names
    }

    /// Algorithm (`alg`).
    #[must_use]
    pub fn algorithm(&self) -> Option<&str> {
        self.typed(ALG).map(String::as_str)
    }

    /// Sets the algorithm (`alg`).
    ///
    /// # Errors
    ///
    /// Returns an error if the value is rejected by [`JwkContext::put`].
    pub fn set_algorithm(&mut self, alg: impl Into<String>) -> Result<(), JwkError> {
        self.put_field(ALG, &alg.into()).map(drop)
    }

    /// Key ID (`kid`).
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        self.typed(KID).map(String::as_str)
    }

    /// Sets the key ID (`kid`).
    ///
    /// # Errors
    ///
    /// Returns an error if the value is rejected by [`JwkContext::put`].
    pub fn set_key_id(&mut self, kid: impl Into<String>) -> Result<(), JwkError> {
        self.put_field(KID, &kid.into()).map(drop)
    }

    /// Key operations (`key_ops`).
    #[must_use]
    pub fn operations(&self) -> Option<&[String]> {
        self.typed(KEY_OPS).map(Vec::as_slice)
    }

    /// Sets the key operations (`key_ops`). Duplicates are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is rejected by [`JwkContext::put`].
    pub fn set_operations<I, S>(&mut self, ops: I) -> Result<(), JwkError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ops: Vec<String> = ops.into_iter().map(Into::into).collect();
        self.put_field(KEY_OPS, &ops).map(drop)
    }

    /// Key type (`kty`).
    #[must_use]
    pub fn key_type(&self) -> Option<&str> {
        self.typed(KTY).map(String::as_str)
    }

    /// Sets the key type (`kty`).
    ///
    /// # Errors
    ///
    /// Returns an error if the value is rejected by [`JwkContext::put`].
    pub fn set_key_type(&mut self, kty: impl Into<String>) -> Result<(), JwkError> {
        self.put_field(KTY, &kty.into()).map(drop)
    }

    /// Public key use (`use`).
    #[must_use]
    pub fn public_key_use(&self) -> Option<&str> {
        self.typed(USE).map(String::as_str)
    }

    /// Sets the public key use (`use`).
    ///
    /// # Errors
    ///
    /// Returns an error if the value is rejected by [`JwkContext::put`].
    pub fn set_public_key_use(&mut self, key_use: impl Into<String>) -> Result<(), JwkError> {
        self.put_field(USE, &key_use.into()).map(drop)
    }

    /// X.509 certificate chain (`x5c`).
    #[must_use]
    pub fn x509_certificate_chain(&self) -> Option<&[X509Certificate]> {
        self.typed(X5C).map(Vec::as_slice)
    }

    /// Sets the X.509 certificate chain (`x5c`).
    ///
    /// # Errors
    ///
    /// Returns an error if the value is rejected by [`JwkContext::put`].
    pub fn set_x509_certificate_chain(
        &mut self,
        chain: impl IntoIterator<Item = X509Certificate>,
    ) -> Result<(), JwkError> {
        let chain: Vec<X509Certificate> = chain.into_iter().collect();
        self.put_field(X5C, &chain).map(drop)
    }

    /// X.509 certificate SHA-1 thumbprint (`x5t`).
    #[must_use]
    pub fn x509_sha1_thumbprint(&self) -> Option<&[u8]> {
        self.typed(X5T).map(Vec::as_slice)
    }

    /// Sets the X.509 certificate SHA-1 thumbprint (`x5t`).
    ///
    /// # Errors
    ///
    /// Returns [`JwkError::MalformedValue`] unless the thumbprint is 20 bytes.
    pub fn set_x509_sha1_thumbprint(&mut self, thumbprint: &[u8]) -> Result<(), JwkError> {
        self.put_field(X5T, &thumbprint.to_vec()).map(drop)
    }

    /// X.509 certificate SHA-256 thumbprint (`x5t#S256`).
    #[must_use]
    pub fn x509_sha256_thumbprint(&self) -> Option<&[u8]> {
        self.typed(X5T_S256).map(Vec::as_slice)
    }

    /// Sets the X.509 certificate SHA-256 thumbprint (`x5t#S256`).
    ///
    /// # Errors
    ///
    /// Returns [`JwkError::MalformedValue`] unless the thumbprint is 32 bytes.
    pub fn set_x509_sha256_thumbprint(&mut self, thumbprint: &[u8]) -> Result<(), JwkError> {
        self.put_field(X5T_S256, &thumbprint.to_vec()).map(drop)
    }

    /// X.509 URL (`x5u`).
    #[must_use]
    pub fn x509_url(&self) -> Option<&Url> {
        self.typed(X5U)
    }

    /// Sets the X.509 URL (`x5u`).
    ///
    /// # Errors
    ///
    /// Returns an error if the value is rejected by [`JwkContext::put`].
    pub fn set_x509_url(&mut self, url: Url) -> Result<(), JwkError> {
        self.put_field(X5U, &url).map(drop)
    }

    pub(crate) fn take_key(&mut self) -> Option<NativeKey> {
        self.key.take()
    }

    pub(crate) fn take_public_key(&mut self) -> Option<NativeKey> {
        self.public_key.take()
    }

    /// Stores a value the caller has already decoded, bypassing the registry.
    pub(crate) fn store_field<T: IdiomaticValue>(
        &mut self,
        field: Field<T>,
        value: T,
    ) -> Option<Idiomatic> {
        let canonical = field.encode(&value);
        self.store(field.id(), canonical, value.into_idiomatic())
    }

    pub(crate) fn store(
        &mut self,
        name: &str,
        canonical: Value,
        idiomatic: Idiomatic,
    ) -> Option<Idiomatic> {
        let redacted = self.redact(name, &canonical);
        self.redacted.insert(name.to_owned(), redacted);
        self.values.insert(name.to_owned(), canonical);
        self.idiomatic.insert(name.to_owned(), idiomatic)
    }

    pub(crate) fn is_private_name(&self, name: &str) -> bool {
        self.private_names.contains(name)
    }

    /// Whether the member is hidden in the redacted view.
    pub(crate) fn is_redacted(&self, name: &str) -> bool {
        self.is_private_name(name) || self.registry.is_secret(name)
    }

    fn redact(&self, name: &str, value: &Value) -> Value {
        if self.is_redacted(name) {
            Value::String(REDACTED_VALUE.to_owned())
        } else {
            value.clone()
        }
    }

    fn typed<T: IdiomaticValue>(&self, field: Field<T>) -> Option<&T> {
        self.idiomatic.get(field.id()).and_then(T::from_idiomatic)
    }
}

impl Default for JwkContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Trims strings, including those inside arrays.
fn normalize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_owned()),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

impl fmt::Display for JwkContext {
    /// Writes the redacted view as a JSON object.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.redacted).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl fmt::Debug for JwkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwkContext")
            .field("values", &self.redacted)
            .field("private_names", &self.private_names)
            .field("key", &self.key)
            .field("public_key", &self.public_key)
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .finish_non_exhaustive()
    }
}
