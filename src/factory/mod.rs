//! Factories that turn a [`JwkContext`] into a finished [`Jwk`].
//!
//! Each key family has a [`FamilyJwkFactory`] that knows the family's
//! members and how to build its native keys. The [`DispatchingJwkFactory`]
//! selects the right family for a context.

mod dispatch;
mod ec;
mod rsa;
mod secret;

use std::fmt;
use std::sync::Arc;

use snafu::prelude::*;
use tracing::debug;

use crate::crypto::{KeyFamily, KeyProvider, KeySpec, NativeKey, RustCryptoProvider};
use crate::error::{
    InconsistentKeySnafu, InvalidArgumentSnafu, InvalidKeySnafu, JwkError, MalformedKeySnafu,
    MissingFieldSnafu,
};
use crate::jwk::{CopyMode, Field, IdiomaticValue, Jwk, JwkContext};

pub use dispatch::DispatchingJwkFactory;
pub use ec::EcJwkFactory;
pub use rsa::RsaJwkFactory;
pub use secret::SecretJwkFactory;

/// Construction logic for one key family.
///
/// Implementations provide the two construction paths. The dispatch and
/// guard logic lives in [`FamilyJwkFactory::create_jwk`].
pub trait FamilyJwkFactory: Send + Sync + fmt::Debug {
    /// The family this factory builds.
    fn family(&self) -> KeyFamily;

    /// Member names that are private for this family.
    fn private_names(&self) -> &'static [&'static str];

    /// The `kty` value this factory owns.
    fn id(&self) -> &'static str {
        self.family().id()
    }

    /// Whether this factory can build a JWK from `ctx`.
    ///
    /// A context with a native key is supported when the key belongs to this
    /// family. Otherwise the declared `kty` must equal [`FamilyJwkFactory::id`].
    fn supports(&self, ctx: &JwkContext) -> bool {
        match ctx.key() {
            Some(key) => key.family() == self.family(),
            None => ctx.key_type() == Some(self.id()),
        }
    }

    /// Builds a JWK from the native key in `ctx`, or from its members.
    ///
    /// Generally implementations should not override this function.
    ///
    /// # Errors
    ///
    /// Returns [`JwkError::InvalidArgument`] if this factory does not support
    /// `ctx`, [`JwkError::MalformedKey`] if `x5t#S256` does not match the
    /// first `x5c` certificate, or any error from the construction path.
    fn create_jwk(&self, ctx: JwkContext) -> Result<Jwk, JwkError> {
        ensure!(
            self.supports(&ctx),
            InvalidArgumentSnafu {
                message: "Unsupported JwkContext.",
            }
        );
        let mut ctx = ctx.with_private_names(self.private_names().iter().copied())?;
        check_certificate_thumbprint(&ctx)?;
        if let Some(key) = ctx.take_key() {
            ctx.set_key_type(self.id())?;
            debug!(kty = self.id(), key = key.type_name(), "creating JWK from native key");
            self.create_jwk_from_key(ctx, key)
        } else {
            debug!(kty = self.id(), "creating JWK from members");
            self.create_jwk_from_values(ctx)
        }
    }

    /// Writes the members of `key` into `ctx` and builds the JWK.
    ///
    /// `key` always belongs to [`FamilyJwkFactory::family`].
    ///
    /// # Errors
    ///
    /// Returns an error if the members cannot be written or the key is
    /// inconsistent with an attached public key.
    fn create_jwk_from_key(&self, ctx: JwkContext, key: NativeKey) -> Result<Jwk, JwkError>;

    /// Validates the members of `ctx` and builds the native key from them.
    ///
    /// `kty` is always [`FamilyJwkFactory::id`].
    ///
    /// # Errors
    ///
    /// Returns an error if a member is missing or malformed, or the provider
    /// cannot build the key.
    fn create_jwk_from_values(&self, ctx: JwkContext) -> Result<Jwk, JwkError>;
}

/// Checks `x5t#S256` against the first `x5c` certificate when both are present.
fn check_certificate_thumbprint(ctx: &JwkContext) -> Result<(), JwkError> {
    if let (Some([first, ..]), Some(thumbprint)) =
        (ctx.x509_certificate_chain(), ctx.x509_sha256_thumbprint())
    {
        ensure!(
            first.sha256_thumbprint() == thumbprint,
            MalformedKeySnafu {
                message: "The 'x5t#S256' value does not match the first 'x5c' certificate.",
            }
        );
    }
    Ok(())
}

fn provider(ctx: &JwkContext) -> Arc<dyn KeyProvider> {
    ctx.provider()
        .cloned()
        .unwrap_or_else(|| Arc::new(RustCryptoProvider))
}

/// Builds a native key through the context's provider.
fn generate_key(
    ctx: &JwkContext,
    family: KeyFamily,
    key_type: &'static str,
    spec: KeySpec,
) -> Result<NativeKey, JwkError> {
    provider(ctx)
        .generate_key(family, spec)
        .with_context(|_| InvalidKeySnafu {
            key_type,
            context: ctx.to_string(),
        })
}

/// The public counterpart of `key`, checked against any key attached to `ctx`.
fn public_key(
    ctx: &mut JwkContext,
    key_type: &'static str,
    key: &NativeKey,
) -> Result<NativeKey, JwkError> {
    let derived = provider(ctx)
        .public_key(key)
        .with_context(|_| InvalidKeySnafu {
            key_type,
            context: ctx.to_string(),
        })?;
    if let Some(attached) = ctx.take_public_key() {
        ensure!(
            attached == derived,
            InconsistentKeySnafu {
                key_type,
                message: "the attached public key does not match the private key",
            }
        );
    }
    Ok(derived)
}

/// Reads a member the family cannot do without.
fn required<T: IdiomaticValue>(
    ctx: &JwkContext,
    key_type: &'static str,
    field: Field<T>,
) -> Result<T, JwkError> {
    ctx.get_field(field)?.context(MissingFieldSnafu {
        key_type,
        id: field.id(),
        name: field.name(),
    })
}

/// A JWK for a public key. Private members left in `ctx` are removed.
fn public_only_jwk(ctx: &JwkContext, key: NativeKey) -> Jwk {
    Jwk::new(ctx.copy(CopyMode::StripPrivate), key, None)
}

/// Pairs a private JWK with a public one built from a stripped copy.
fn private_jwk(ctx: JwkContext, key: NativeKey, public_key: NativeKey) -> Jwk {
    let public_ctx = ctx.copy_with_key(public_key.clone());
    let public_jwk = Jwk::new(public_ctx, public_key, None);
    Jwk::new(ctx, key, Some(public_jwk))
}
