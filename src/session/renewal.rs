//! Credential lookup with refresh-ahead renewal.
//!
//! [`SessionManager::get_credential`] serves fresh cache hits without touching the lock.
//! Otherwise concurrent callers for the same key join one in-flight renewal, which takes the
//! client-wide [`RENEWAL_LOCK_NAME`] lock, re-checks the cache, and redeems the refresh token.
//! The lock is released on every path out of the renewal.

// self
use crate::{
	_prelude::*,
	auth::{CredentialKey, CredentialRecord},
	lock,
	obs::{FlowKind, FlowSpan},
	oauth::{TokenGrant, TokenRequest},
	session::SessionManager,
};

/// Name of the lock serializing renewals across contexts.
pub const RENEWAL_LOCK_NAME: &str = "oauth2_session.lock.get_credential";

/// Caller input for [`SessionManager::get_credential`].
#[derive(Clone, Debug, Default)]
pub struct CredentialRequest {
	/// Audience; the configured default when absent.
	pub audience: Option<String>,
	/// Scope in addition to the configured scopes.
	pub scope: Option<String>,
	/// Skips cached credentials and always renews.
	pub ignore_cache: bool,
	/// Additional token request parameters.
	pub extra_params: BTreeMap<String, String>,
}
impl CredentialRequest {
	/// Request for the default audience and scope.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the audience.
	pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
		self.audience = Some(audience.into());

		self
	}

	/// Sets the scope.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Bypasses the cache.
	pub fn force_refresh(mut self) -> Self {
		self.ignore_cache = true;

		self
	}

	/// Adds a token request parameter.
	pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.extra_params.insert(name.into(), value.into());

		self
	}
}

impl SessionManager {
	/// Returns a fresh credential, renewing it when missing or about to expire.
	///
	/// Fails with [`Error::LoginRequired`] when no refresh path exists and with
	/// [`Error::LockTimeout`] when the renewal lock stays busy.
	pub async fn get_credential(&self, request: CredentialRequest) -> Result<CredentialRecord> {
		let span = FlowSpan::begin(FlowKind::GetCredential, &self.config.client_id);
		let result = span.instrument(self.lookup_or_renew(request)).await;

		span.finish(&result);

		result
	}

	/// Silent session check.
	///
	/// Without a "previously authenticated" hint this returns `Ok(None)` without any network
	/// call. Login-required and other recoverable provider errors also yield `Ok(None)`.
	pub async fn check_session(&self, request: CredentialRequest) -> Result<Option<CredentialRecord>> {
		let span = FlowSpan::begin(FlowKind::CheckSession, &self.config.client_id);
		let result = span
			.instrument(async move {
				self.hint.migrate_legacy().await?;

				if !self.hint.is_set().await? {
					return Ok(None);
				}

				match self.get_credential(request).await {
					Ok(record) => Ok(Some(record)),
					Err(e) if e.is_recoverable() => {
						#[cfg(feature = "tracing")]
						tracing::debug!(error = %e, "Silent session check found no session.");

						Ok(None)
					},
					Err(e) => Err(e),
				}
			})
			.await;

		span.finish(&result);

		result
	}

	async fn lookup_or_renew(&self, request: CredentialRequest) -> Result<CredentialRecord> {
		self.metrics.record_attempt();

		let key = self
			.credential_key(request.audience.as_deref(), request.scope.as_deref())
			.inspect_err(|_| self.metrics.record_failure())?;

		if !request.ignore_cache
			&& let Some(record) =
				self.fresh_cached(&key).await.inspect_err(|_| self.metrics.record_failure())?
		{
			self.metrics.record_cache_hit();

			return Ok(record);
		}

		let result = self.renewals.run(&key, || self.renew(key.clone(), request)).await;

		if result.is_err() {
			self.metrics.record_failure();
		}

		result
	}

	async fn renew(&self, key: CredentialKey, request: CredentialRequest) -> Result<CredentialRecord> {
		let handle =
			lock::acquire_with_retry(self.lock.as_ref(), RENEWAL_LOCK_NAME, &self.config.lock).await?;
		let result = self.renew_locked(&key, &request).await;

		if let Err(_e) = self.lock.release(handle).await {
			#[cfg(feature = "tracing")]
			tracing::warn!(lock = RENEWAL_LOCK_NAME, error = %_e, "Failed to release renewal lock.");
		}

		result
	}

	async fn renew_locked(
		&self,
		key: &CredentialKey,
		request: &CredentialRequest,
	) -> Result<CredentialRecord> {
		// Another context may have renewed while this one waited for the lock.
		if !request.ignore_cache && let Some(record) = self.fresh_cached(key).await? {
			self.metrics.record_cache_hit();

			return Ok(record);
		}

		let refresh_token = self.cache.peek(key).await?.and_then(|record| record.refresh_token);

		if refresh_token.is_none() && !self.endpoint.isolates_refresh_tokens() {
			return Err(Error::login_required(format!(
				"No refresh token is available for audience `{}` and scope `{}`.",
				key.audience, key.scope
			)));
		}

		self.metrics.record_exchange();

		let exchanged = self
			.endpoint
			.exchange(
				TokenRequest {
					grant: TokenGrant::RefreshToken { refresh_token: refresh_token.clone() },
					audience: key.audience.clone(),
					scope: key.scope.clone(),
					extra_params: request.extra_params.clone(),
				},
				self.config.http_timeout,
			)
			.await;
		let response = match exchanged {
			Ok(response) => response,
			Err(e) => {
				if e.is_login_required()
					&& let Err(_clear) = self.cache.clear(key).await
				{
					#[cfg(feature = "tracing")]
					tracing::warn!(key = %key, error = %_clear, "Failed to clear rejected credential.");
				}

				#[cfg(feature = "tracing")]
				tracing::debug!(key = %key, error = %e, "Credential renewal failed.");

				return Err(e);
			},
		};
		let record = self.build_record(key.clone(), response, None, refresh_token)?;

		self.persist(&record).await?;

		#[cfg(feature = "tracing")]
		tracing::debug!(key = %key, expires_at = %record.expires_at, "Credential renewed.");

		Ok(record)
	}

	async fn fresh_cached(&self, key: &CredentialKey) -> Result<Option<CredentialRecord>> {
		Ok(self
			.cache
			.get(key)
			.await?
			.filter(|record| self.cache.is_fresh(record, self.config.refresh_leeway)))
	}
}
