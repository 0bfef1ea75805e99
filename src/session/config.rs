//! Session configuration and its builder.

// self
use crate::{
	_prelude::*,
	auth::{Audience, ClientId, ScopeSet, TokenSecret},
	error::ConfigError,
	lock::LockPolicy,
};

/// Scope every session requests.
pub const OPENID_SCOPE: &str = "openid";
/// Scope added when refresh tokens are enabled.
pub const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

/// Policies and identity of one OAuth client session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
	/// OAuth client identifier.
	pub client_id: ClientId,
	/// Client secret for confidential clients.
	pub client_secret: Option<TokenSecret>,
	/// Audience used when a request names none.
	pub audience: Audience,
	/// Scope requested on every call; always contains `openid`.
	pub default_scope: ScopeSet,
	/// Additional scope merged into every request.
	pub scope: ScopeSet,
	/// Requests `offline_access` so the provider issues refresh tokens.
	pub use_refresh_tokens: bool,
	/// Redirect URI used when a transaction does not supply one.
	pub redirect_uri: Option<Url>,
	/// Clock-skew tolerance for ID-token time claims.
	pub leeway: Duration,
	/// Maximum authentication age enforced on ID tokens.
	pub max_age: Option<Duration>,
	/// Deadline of each token endpoint call.
	pub http_timeout: Duration,
	/// Cached credentials expiring within this window are renewed ahead of time.
	pub refresh_leeway: Duration,
	/// Renewal lock lease and retry policy.
	pub lock: LockPolicy,
	/// Lifetime of the "previously authenticated" hint.
	pub session_hint_ttl: Duration,
	/// Accepts stored transactions that carry no `state`.
	pub allow_stateless_transactions: bool,
	/// Permits refresh tokens in caches backed by shared stores.
	pub allow_shared_refresh_tokens: bool,
	/// Extra query parameters added to every authorization URL.
	pub authorize_params: BTreeMap<String, String>,
}
impl SessionConfig {
	/// Starts a configuration for `client_id` with default policies.
	pub fn builder(client_id: ClientId) -> SessionConfigBuilder {
		SessionConfigBuilder::new(client_id)
	}

	/// Scope sent for a request: `openid`, the default and base scopes, `requested`, and
	/// `offline_access` when refresh tokens are enabled.
	pub fn effective_scope(&self, requested: Option<&str>) -> ScopeSet {
		let scope = ScopeSet::merge([Some(OPENID_SCOPE), requested])
			.union(&self.default_scope)
			.union(&self.scope);

		if self.use_refresh_tokens { scope.with(OFFLINE_ACCESS_SCOPE) } else { scope }
	}
}

/// Builder for [`SessionConfig`].
#[derive(Clone, Debug)]
pub struct SessionConfigBuilder {
	config: SessionConfig,
}
impl SessionConfigBuilder {
	/// Creates a builder with default policies.
	pub fn new(client_id: ClientId) -> Self {
		Self {
			config: SessionConfig {
				client_id,
				client_secret: None,
				audience: Audience::fallback(),
				default_scope: ScopeSet::merge([Some(OPENID_SCOPE)]),
				scope: ScopeSet::default(),
				use_refresh_tokens: false,
				redirect_uri: None,
				leeway: Duration::seconds(60),
				max_age: None,
				http_timeout: Duration::seconds(10),
				refresh_leeway: Duration::seconds(60),
				lock: LockPolicy::default(),
				session_hint_ttl: Duration::days(1),
				allow_stateless_transactions: true,
				allow_shared_refresh_tokens: false,
				authorize_params: BTreeMap::new(),
			},
		}
	}

	/// Sets the client secret.
	pub fn client_secret(mut self, secret: impl Into<TokenSecret>) -> Self {
		self.config.client_secret = Some(secret.into());

		self
	}

	/// Sets the default audience.
	pub fn audience(mut self, audience: Audience) -> Self {
		self.config.audience = audience;

		self
	}

	/// Sets the default scope; `openid` is always kept.
	pub fn default_scope(mut self, scope: &str) -> Self {
		self.config.default_scope = ScopeSet::merge([Some(OPENID_SCOPE), Some(scope)]);

		self
	}

	/// Sets the base scope merged into every request.
	pub fn scope(mut self, scope: &str) -> Self {
		self.config.scope = ScopeSet::merge([Some(scope)]);

		self
	}

	/// Enables or disables refresh tokens.
	pub fn use_refresh_tokens(mut self, enabled: bool) -> Self {
		self.config.use_refresh_tokens = enabled;

		self
	}

	/// Sets the default redirect URI.
	pub fn redirect_uri(mut self, uri: Url) -> Self {
		self.config.redirect_uri = Some(uri);

		self
	}

	/// Sets the ID-token leeway.
	pub fn leeway(mut self, leeway: Duration) -> Self {
		self.config.leeway = leeway;

		self
	}

	/// Sets the maximum authentication age.
	pub fn max_age(mut self, max_age: Duration) -> Self {
		self.config.max_age = Some(max_age);

		self
	}

	/// Sets the token endpoint deadline.
	pub fn http_timeout(mut self, timeout: Duration) -> Self {
		self.config.http_timeout = timeout;

		self
	}

	/// Sets the refresh-ahead window.
	pub fn refresh_leeway(mut self, leeway: Duration) -> Self {
		self.config.refresh_leeway = leeway;

		self
	}

	/// Sets the renewal lock policy.
	pub fn lock_policy(mut self, policy: LockPolicy) -> Self {
		self.config.lock = policy;

		self
	}

	/// Sets the lifetime of the "previously authenticated" hint.
	pub fn session_hint_ttl(mut self, ttl: Duration) -> Self {
		self.config.session_hint_ttl = ttl;

		self
	}

	/// Accepts or rejects stored transactions without `state`.
	pub fn allow_stateless_transactions(mut self, allow: bool) -> Self {
		self.config.allow_stateless_transactions = allow;

		self
	}

	/// Permits refresh tokens in shared caches.
	pub fn allow_shared_refresh_tokens(mut self, allow: bool) -> Self {
		self.config.allow_shared_refresh_tokens = allow;

		self
	}

	/// Adds a query parameter to every authorization URL.
	pub fn authorize_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.config.authorize_params.insert(name.into(), value.into());

		self
	}

	/// Validates and returns the configuration.
	pub fn build(self) -> Result<SessionConfig, ConfigError> {
		let config = self.config;

		if config.leeway.is_negative() {
			return Err(invalid("leeway", "must not be negative"));
		}
		if config.refresh_leeway.is_negative() {
			return Err(invalid("refresh_leeway", "must not be negative"));
		}
		if !config.http_timeout.is_positive() {
			return Err(invalid("http_timeout", "must be positive"));
		}
		if config.max_age.is_some_and(Duration::is_negative) {
			return Err(invalid("max_age", "must not be negative"));
		}
		if !config.lock.lease.is_positive() {
			return Err(invalid("lock.lease", "must be positive"));
		}
		if config.lock.attempts == 0 {
			return Err(invalid("lock.attempts", "must be at least one"));
		}
		if config.lock.backoff.is_negative() {
			return Err(invalid("lock.backoff", "must not be negative"));
		}
		if !config.session_hint_ttl.is_positive() {
			return Err(invalid("session_hint_ttl", "must be positive"));
		}

		Ok(config)
	}
}

fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
	ConfigError::InvalidSetting { field, reason }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn builder() -> SessionConfigBuilder {
		SessionConfig::builder(ClientId::new("client").expect("Client identifier should be valid."))
	}

	#[test]
	fn effective_scope_always_requests_openid() {
		let config = builder().default_scope("profile").scope("email").build().expect("Valid config.");

		assert_eq!(config.effective_scope(Some("read  write")).normalized(), "email openid profile read write");
		assert_eq!(config.effective_scope(None).normalized(), "email openid profile");
	}

	#[test]
	fn refresh_tokens_add_offline_access() {
		let config = builder().use_refresh_tokens(true).build().expect("Valid config.");

		assert_eq!(config.effective_scope(Some("read")).normalized(), "offline_access openid read");
	}

	#[test]
	fn defaults_match_documented_policies() {
		let config = builder().build().expect("Default config should build.");

		assert_eq!(config.leeway, Duration::seconds(60));
		assert_eq!(config.http_timeout, Duration::seconds(10));
		assert_eq!(config.refresh_leeway, Duration::seconds(60));
		assert_eq!(config.session_hint_ttl, Duration::days(1));
		assert_eq!(config.lock, LockPolicy::default());
		assert!(config.allow_stateless_transactions);
		assert!(!config.allow_shared_refresh_tokens);
		assert!(config.audience.is_fallback());
	}

	#[test]
	fn out_of_range_settings_are_rejected() {
		let err = builder()
			.http_timeout(Duration::ZERO)
			.build()
			.expect_err("A zero timeout must be rejected.");

		assert!(matches!(err, ConfigError::InvalidSetting { field: "http_timeout", .. }));

		let err = builder()
			.lock_policy(LockPolicy { attempts: 0, ..LockPolicy::default() })
			.build()
			.expect_err("Zero lock attempts must be rejected.");

		assert!(matches!(err, ConfigError::InvalidSetting { field: "lock.attempts", .. }));
	}
}
