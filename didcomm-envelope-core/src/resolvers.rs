//! Resolver interfaces consumed by the envelope engine.
//!
//! The engine never resolves DIDs or stores keys itself. Callers inject a
//! [`DidResolver`] and a [`SecretsResolver`] through [`ResolversConfig`].
//!
//! Resolver implementations report failures as [`anyhow::Error`]; the engine
//! treats those as opaque, logs them and maps them to
//! [`Error::DocumentNotResolved`] or [`Error::SecretNotFound`]. The engine
//! never retries a resolver call.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use didcomm_envelope_core::resolvers::{
//!     InMemoryDidResolver, InMemorySecretsResolver, ResolversConfig,
//! };
//!
//! let resolvers = ResolversConfig::new(
//!     Arc::new(InMemoryDidResolver::new(vec![])),
//!     Arc::new(InMemorySecretsResolver::new(vec![])),
//! );
//! # let _ = resolvers;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::did::DidDoc;
use crate::error::{Error, Result};
use crate::keys::{select_sign_alg, KeyMaterial};
use crate::secrets::Secret;
use crate::utils::{did_from_did_url, did_or_url};

/// Resolves DIDs to DID Documents.
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait DidResolver: Send + Sync {
    /// Resolves a DID to its DID Document.
    ///
    /// # Arguments
    /// * `did` - The DID to resolve (e.g., "did:example:123")
    ///
    /// # Returns
    /// `Ok(None)` if the DID is unknown
    ///
    /// # Errors
    /// Any transport or parsing failure of the underlying method
    async fn resolve(&self, did: &str) -> anyhow::Result<Option<DidDoc>>;
}

/// Looks up private keys by DID URL.
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait SecretsResolver: Send + Sync {
    /// Returns the secret for `kid`, if known.
    async fn get_key(&self, kid: &str) -> anyhow::Result<Option<Secret>>;

    /// Returns the subset of `kids` for which a secret is known.
    async fn get_keys(&self, kids: &[String]) -> anyhow::Result<Vec<String>>;
}

/// The resolvers used by one pack or unpack call.
#[derive(Clone)]
pub struct ResolversConfig {
    /// DID resolver
    pub did_resolver: Arc<dyn DidResolver>,
    /// Secrets resolver
    pub secrets_resolver: Arc<dyn SecretsResolver>,
}

impl std::fmt::Debug for ResolversConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolversConfig").finish_non_exhaustive()
    }
}

impl ResolversConfig {
    /// Creates a resolver configuration.
    pub fn new(
        did_resolver: Arc<dyn DidResolver>,
        secrets_resolver: Arc<dyn SecretsResolver>,
    ) -> Self {
        Self {
            did_resolver,
            secrets_resolver,
        }
    }

    /// Resolves `did`, failing with `DocumentNotResolved` if it is unknown or
    /// the resolver errors.
    pub(crate) async fn resolve_doc(&self, did: &str) -> Result<DidDoc> {
        match self.did_resolver.resolve(did).await {
            Ok(Some(doc)) => Ok(doc),
            Ok(None) => Err(Error::DocumentNotResolved(did.to_string())),
            Err(e) => {
                warn!("DID resolver failed for {did}: {e:#}");
                Err(Error::DocumentNotResolved(did.to_string()))
            }
        }
    }

    /// Fetches the secret for `kid`, failing with `SecretNotFound`.
    pub(crate) async fn get_secret(&self, kid: &str) -> Result<Secret> {
        match self.secrets_resolver.get_key(kid).await {
            Ok(Some(secret)) => Ok(secret),
            Ok(None) => Err(Error::SecretNotFound(kid.to_string())),
            Err(e) => {
                warn!("Secrets resolver failed for {kid}: {e:#}");
                Err(Error::SecretNotFound(kid.to_string()))
            }
        }
    }

    /// Fetches and extracts the key pair for `kid`.
    pub(crate) async fn get_secret_key(&self, kid: &str) -> Result<KeyMaterial> {
        let secret = self.get_secret(kid).await?;
        KeyMaterial::from_secret(&secret)
    }

    /// Returns the kids from `kids` that have secrets, in the order given.
    pub(crate) async fn find_secrets(&self, kids: &[String]) -> Result<Vec<String>> {
        let known = match self.secrets_resolver.get_keys(kids).await {
            Ok(known) => known,
            Err(e) => {
                warn!("Secrets resolver failed while probing {} kids: {e:#}", kids.len());
                return Err(Error::SecretNotFound(kids.join(", ")));
            }
        };
        Ok(kids
            .iter()
            .filter(|kid| known.contains(*kid))
            .cloned()
            .collect())
    }

    /// Selects the signing key for a DID or DID URL.
    ///
    /// A DID URL must be listed under the signer's `authentication`. For a bare
    /// DID the authentication keys with a known secret are tried in document
    /// order and the first with a signature algorithm is used.
    ///
    /// # Errors
    ///
    /// `DidUrlNotFound` if the DID URL or DID has no authentication key,
    /// `SecretNotFound` if no secret is known, `Unsupported` if no candidate
    /// key can sign.
    pub(crate) async fn find_signing_key(&self, sign_from: &str) -> Result<(String, KeyMaterial)> {
        let (did, kid) = did_or_url(sign_from);
        let doc = self.resolve_doc(did).await?;
        let authentication: Vec<String> = doc
            .authentication_ids()
            .into_iter()
            .map(str::to_string)
            .collect();

        if let Some(kid) = kid {
            if !authentication.iter().any(|id| id == kid) {
                return Err(Error::DidUrlNotFound(kid.to_string()));
            }
            let key = self.get_secret_key(kid).await?;
            select_sign_alg(&key)?;
            return Ok((kid.to_string(), key));
        }

        if authentication.is_empty() {
            return Err(Error::DidUrlNotFound(format!("{did} has no authentication keys")));
        }
        let known = self.find_secrets(&authentication).await?;
        if known.is_empty() {
            return Err(Error::SecretNotFound(format!(
                "no secret for the authentication keys of {did}"
            )));
        }
        for kid in known {
            let key = self.get_secret_key(&kid).await?;
            if select_sign_alg(&key).is_ok() {
                debug!("Selected signing key {kid}");
                return Ok((kid, key));
            }
        }
        Err(Error::Unsupported(format!(
            "no authentication key of {did} has a supported signature algorithm"
        )))
    }

    /// Resolves the public key named by a DID URL.
    pub(crate) async fn resolve_public_key(&self, kid: &str) -> Result<KeyMaterial> {
        let doc = self.resolve_doc(did_from_did_url(kid)).await?;
        let method = doc
            .find_method(kid)
            .ok_or_else(|| Error::DidUrlNotFound(kid.to_string()))?;
        KeyMaterial::from_verification_method(method)
    }
}

/// A DID resolver over a fixed set of documents.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDidResolver {
    docs: HashMap<String, DidDoc>,
}

impl InMemoryDidResolver {
    /// Creates a resolver serving `docs`.
    pub fn new(docs: Vec<DidDoc>) -> Self {
        Self {
            docs: docs.into_iter().map(|doc| (doc.id.clone(), doc)).collect(),
        }
    }
}

#[async_trait]
impl DidResolver for InMemoryDidResolver {
    async fn resolve(&self, did: &str) -> anyhow::Result<Option<DidDoc>> {
        Ok(self.docs.get(did).cloned())
    }
}

/// A secrets resolver over a fixed set of secrets.
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretsResolver {
    secrets: HashMap<String, Secret>,
}

impl InMemorySecretsResolver {
    /// Creates a resolver serving `secrets`.
    pub fn new(secrets: Vec<Secret>) -> Self {
        Self {
            secrets: secrets
                .into_iter()
                .map(|secret| (secret.id.clone(), secret))
                .collect(),
        }
    }
}

#[async_trait]
impl SecretsResolver for InMemorySecretsResolver {
    async fn get_key(&self, kid: &str) -> anyhow::Result<Option<Secret>> {
        Ok(self.secrets.get(kid).cloned())
    }

    async fn get_keys(&self, kids: &[String]) -> anyhow::Result<Vec<String>> {
        Ok(kids
            .iter()
            .filter(|kid| self.secrets.contains_key(kid.as_str()))
            .cloned()
            .collect())
    }
}
