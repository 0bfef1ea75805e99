//! Session orchestration: PKCE transactions, cached credentials, and single-flight renewal.
//!
//! [`SessionManager`] owns the transaction and credential lifecycles of one OAuth client. It
//! begins and completes authorization transactions, serves credentials from the
//! [`CredentialCache`], and renews them under a [`NamedLock`] so at most one refresh-token
//! exchange runs per key at a time, across every context sharing the lock.

pub mod authorize;
pub mod config;
pub mod hint;
pub mod logout;
pub mod pkce;
pub mod renewal;

mod metrics;
mod single_flight;

pub use authorize::*;
pub use config::*;
pub use hint::SessionHint;
pub use logout::LogoutOptions;
pub use metrics::RenewalMetrics;
pub use pkce::PkceCodeChallengeMethod;
pub use renewal::{CredentialRequest, RENEWAL_LOCK_NAME};

// crates.io
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	auth::{Audience, CredentialKey, CredentialRecord, CredentialRecordBuilderError, TokenSecret},
	cache::CredentialCache,
	clock::{Clock, SystemClock},
	error::{ConfigError, TransientError},
	lock::{MemoryLock, NamedLock},
	oauth::{IsolatedRefreshEndpoint, TokenEndpoint, TokenResponse},
	provider::ProviderDescriptor,
	store::{KeyValueStore, MemoryStore},
	transaction::TransactionStore,
	verify::{IdTokenExpectations, IdTokenVerifier},
};
use single_flight::SingleFlight;

/// Coordinates the session of one OAuth client against one provider.
///
/// Clones share every collaborator, including the in-flight renewal table.
#[derive(Clone)]
pub struct SessionManager {
	descriptor: ProviderDescriptor,
	config: SessionConfig,
	endpoint: Arc<dyn TokenEndpoint>,
	verifier: Arc<dyn IdTokenVerifier>,
	cache: CredentialCache,
	transactions: TransactionStore,
	hint: SessionHint,
	lock: Arc<dyn NamedLock>,
	clock: Arc<dyn Clock>,
	renewals: Arc<SingleFlight<CredentialKey, Result<CredentialRecord>>>,
	metrics: Arc<RenewalMetrics>,
}
impl SessionManager {
	/// Starts a manager for `config` against `descriptor`.
	pub fn builder(descriptor: ProviderDescriptor, config: SessionConfig) -> SessionManagerBuilder {
		SessionManagerBuilder::new(descriptor, config)
	}

	/// Provider the session authenticates against.
	pub fn descriptor(&self) -> &ProviderDescriptor {
		&self.descriptor
	}

	/// Session configuration.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Credential cache of this client.
	pub fn cache(&self) -> &CredentialCache {
		&self.cache
	}

	/// Renewal counters.
	pub fn metrics(&self) -> &RenewalMetrics {
		&self.metrics
	}

	/// Returns `true` when an unexpired credential is cached for the default audience and scope.
	pub async fn has_valid_session(&self) -> Result<bool> {
		Ok(self.get_user(None, None).await?.is_some())
	}

	/// User claims of the cached credential for `audience` and `scope`, if one is valid.
	pub async fn get_user(
		&self,
		audience: Option<&str>,
		scope: Option<&str>,
	) -> Result<Option<Map<String, Value>>> {
		let key = self.credential_key(audience, scope)?;

		Ok(self.cache.get(&key).await?.map(|record| record.claims.user()))
	}

	/// Local-only logout: clears cached credentials and the "previously authenticated" hint.
	pub async fn invalidate(&self) -> Result<()> {
		self.cache.clear_all().await?;
		self.hint.clear().await?;
		self.endpoint.forget_refresh_tokens();

		#[cfg(feature = "tracing")]
		tracing::debug!(client_id = %self.config.client_id, "Local session invalidated.");

		Ok(())
	}

	pub(crate) fn credential_key(
		&self,
		audience: Option<&str>,
		scope: Option<&str>,
	) -> Result<CredentialKey> {
		let audience = match audience {
			Some(raw) if !raw.is_empty() => Audience::new(raw).map_err(ConfigError::from)?,
			_ => self.config.audience.clone(),
		};

		Ok(CredentialKey::new(
			self.config.client_id.clone(),
			audience,
			self.config.effective_scope(scope),
		))
	}

	/// Verifies the response's ID token and assembles the record stored under `key`.
	///
	/// The record expires at the earlier of the access-token lifetime and the ID-token `exp`.
	/// `previous_refresh` is kept when the response did not rotate the refresh token.
	pub(crate) fn build_record(
		&self,
		key: CredentialKey,
		response: TokenResponse,
		nonce: Option<&str>,
		previous_refresh: Option<TokenSecret>,
	) -> Result<CredentialRecord> {
		let now = self.clock.now();
		let claims = self.verifier.verify(
			&response.id_token,
			&IdTokenExpectations {
				issuer: &self.descriptor.issuer,
				audience: &self.config.client_id,
				nonce,
				leeway: self.config.leeway,
				max_age: self.config.max_age,
				now,
			},
		)?;
		let id_token_expiry = claims.exp.and_then(|exp| OffsetDateTime::from_unix_timestamp(exp).ok());
		let mut builder = CredentialRecord::builder(key, claims)
			.id_token(response.id_token)
			.access_token(response.access_token)
			.refresh_token(response.refresh_token.or(previous_refresh))
			.granted_scope(response.scope)
			.issued_at(now)
			.expires_in(response.expires_in);

		if let Some(expiry) = id_token_expiry {
			builder = builder.expires_at(expiry);
		}

		builder.build().map_err(|e| match e {
			CredentialRecordBuilderError::ExpiryOutOfRange =>
				TransientError::malformed("`expires_in` is out of range").into(),
			e => ConfigError::from(e).into(),
		})
	}

	/// Stores `record` and marks the session as previously authenticated.
	pub(crate) async fn persist(&self, record: &CredentialRecord) -> Result<()> {
		self.cache.set(record).await?;
		self.hint.mark().await
	}
}
impl Debug for SessionManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionManager")
			.field("issuer", &self.descriptor.issuer)
			.field("client_id", &self.config.client_id)
			.field("client_secret_set", &self.config.client_secret.is_some())
			.field("isolates_refresh_tokens", &self.endpoint.isolates_refresh_tokens())
			.finish()
	}
}

/// Builder for [`SessionManager`].
///
/// Stores default to [`MemoryStore`], the lock to a fresh [`MemoryLock`], and the clock to
/// [`SystemClock`]. With the `reqwest` feature the token endpoint defaults to an
/// [`OAuth2TokenEndpoint`](crate::oauth::OAuth2TokenEndpoint) built from the descriptor. An
/// ID-token verifier must always be supplied.
pub struct SessionManagerBuilder {
	descriptor: ProviderDescriptor,
	config: SessionConfig,
	endpoint: Option<Arc<dyn TokenEndpoint>>,
	verifier: Option<Arc<dyn IdTokenVerifier>>,
	cache_store: Option<Arc<dyn KeyValueStore>>,
	transaction_store: Option<Arc<dyn KeyValueStore>>,
	lock: Option<Arc<dyn NamedLock>>,
	clock: Option<Arc<dyn Clock>>,
	isolate_refresh_tokens: bool,
}
impl SessionManagerBuilder {
	fn new(descriptor: ProviderDescriptor, config: SessionConfig) -> Self {
		Self {
			descriptor,
			config,
			endpoint: None,
			verifier: None,
			cache_store: None,
			transaction_store: None,
			lock: None,
			clock: None,
			isolate_refresh_tokens: false,
		}
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, endpoint: Arc<dyn TokenEndpoint>) -> Self {
		self.endpoint = Some(endpoint);

		self
	}

	/// Sets the ID-token verifier.
	pub fn id_token_verifier(mut self, verifier: Arc<dyn IdTokenVerifier>) -> Self {
		self.verifier = Some(verifier);

		self
	}

	/// Sets the store backing the credential cache.
	pub fn cache_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
		self.cache_store = Some(store);

		self
	}

	/// Sets the store backing transactions and the session hint.
	pub fn transaction_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
		self.transaction_store = Some(store);

		self
	}

	/// Sets the renewal lock; share one instance across every context that may renew.
	pub fn lock(mut self, lock: Arc<dyn NamedLock>) -> Self {
		self.lock = Some(lock);

		self
	}

	/// Sets the clock.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);

		self
	}

	/// Wraps the token endpoint in an [`IsolatedRefreshEndpoint`], keeping refresh tokens out of
	/// the cache.
	pub fn isolate_refresh_tokens(mut self) -> Self {
		self.isolate_refresh_tokens = true;

		self
	}

	/// Validates the collaborators and builds the manager.
	pub fn build(self) -> Result<SessionManager> {
		let verifier = self.verifier.ok_or(ConfigError::MissingIdTokenVerifier)?;
		let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
		let endpoint = match self.endpoint {
			Some(endpoint) => endpoint,
			None => default_endpoint(&self.descriptor, &self.config)?,
		};
		let endpoint: Arc<dyn TokenEndpoint> = if self.isolate_refresh_tokens {
			Arc::new(IsolatedRefreshEndpoint::new(endpoint))
		} else {
			endpoint
		};
		let cache_store = self.cache_store.unwrap_or_else(|| Arc::new(MemoryStore::default()));
		let transaction_store =
			self.transaction_store.unwrap_or_else(|| Arc::new(MemoryStore::default()));
		let lock = self.lock.unwrap_or_else(|| Arc::new(MemoryLock::new(clock.clone())));
		let client_id = &self.config.client_id;
		let cache = CredentialCache::new(cache_store, client_id.clone(), clock.clone())
			.with_shared_refresh_tokens(self.config.allow_shared_refresh_tokens);
		let transactions = TransactionStore::new(transaction_store.clone(), client_id);
		let hint =
			SessionHint::new(transaction_store, clock.clone(), client_id, self.config.session_hint_ttl);

		Ok(SessionManager {
			descriptor: self.descriptor,
			config: self.config,
			endpoint,
			verifier,
			cache,
			transactions,
			hint,
			lock,
			clock,
			renewals: Arc::new(SingleFlight::new()),
			metrics: Default::default(),
		})
	}
}
impl Debug for SessionManagerBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionManagerBuilder")
			.field("issuer", &self.descriptor.issuer)
			.field("client_id", &self.config.client_id)
			.field("endpoint_set", &self.endpoint.is_some())
			.field("verifier_set", &self.verifier.is_some())
			.field("isolate_refresh_tokens", &self.isolate_refresh_tokens)
			.finish()
	}
}

#[cfg(feature = "reqwest")]
fn default_endpoint(
	descriptor: &ProviderDescriptor,
	config: &SessionConfig,
) -> Result<Arc<dyn TokenEndpoint>> {
	let endpoint = crate::oauth::OAuth2TokenEndpoint::reqwest(
		descriptor,
		&config.client_id,
		config.client_secret.as_ref(),
	)?;

	Ok(Arc::new(endpoint))
}

#[cfg(not(feature = "reqwest"))]
fn default_endpoint(
	_descriptor: &ProviderDescriptor,
	_config: &SessionConfig,
) -> Result<Arc<dyn TokenEndpoint>> {
	Err(ConfigError::MissingTokenEndpoint.into())
}
