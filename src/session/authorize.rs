//! Authorization Code + PKCE transactions: authorize URL construction and callback completion.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{CredentialKey, CredentialRecord, TokenSecret},
	error::{ConfigError, ProviderError},
	obs::{FlowKind, FlowSpan},
	oauth::{TokenGrant, TokenRequest},
	session::{
		SessionManager,
		pkce::{self, NONCE_LEN, PkceCodeChallengeMethod, PkcePair, STATE_LEN},
	},
	transaction::Transaction,
};

/// Query parameters the session controls; extra parameters cannot override them.
const RESERVED_PARAMS: &[&str] = &[
	"client_id",
	"response_type",
	"response_mode",
	"redirect_uri",
	"scope",
	"audience",
	"state",
	"nonce",
	"code_challenge",
	"code_challenge_method",
];

/// Caller input for [`SessionManager::begin_transaction`].
#[derive(Clone, Debug, Default)]
pub struct AuthorizeOptions {
	/// Audience to request; the configured default when absent.
	pub audience: Option<String>,
	/// Scope to request in addition to the configured scopes.
	pub scope: Option<String>,
	/// Redirect URI; the configured one when absent.
	pub redirect_uri: Option<Url>,
	/// Opaque state handed back once the transaction completes.
	pub app_state: Option<Value>,
	/// Additional authorize query parameters.
	pub extra_params: BTreeMap<String, String>,
}
impl AuthorizeOptions {
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

	/// Sets the redirect URI.
	pub fn with_redirect_uri(mut self, uri: Url) -> Self {
		self.redirect_uri = Some(uri);

		self
	}

	/// Sets the application state.
	pub fn with_app_state(mut self, app_state: Value) -> Self {
		self.app_state = Some(app_state);

		self
	}

	/// Adds an authorize query parameter.
	pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.extra_params.insert(name.into(), value.into());

		self
	}
}

/// Authorization URL plus the values it commits to.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
	/// URL the user agent should navigate to.
	pub url: Url,
	/// Anti-CSRF state.
	pub state: String,
	/// Nonce the ID token must echo.
	pub nonce: String,
	/// PKCE challenge derived from the stored verifier.
	pub code_challenge: String,
	/// PKCE challenge method.
	pub code_challenge_method: PkceCodeChallengeMethod,
}

/// Parameters returned to the redirect URI.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorizationResponse {
	/// Returned `state`.
	pub state: Option<String>,
	/// Authorization code.
	pub code: Option<String>,
	/// OAuth `error` code.
	pub error: Option<String>,
	/// OAuth `error_description`.
	pub error_description: Option<String>,
}
impl AuthorizationResponse {
	/// Successful callback carrying `code` and `state`.
	pub fn code(code: impl Into<String>, state: impl Into<String>) -> Self {
		Self { code: Some(code.into()), state: Some(state.into()), ..Default::default() }
	}

	/// Reads the callback parameters from a redirect URL's query string.
	pub fn from_redirect(url: &Url) -> Self {
		let mut response = Self::default();

		for (name, value) in url.query_pairs() {
			let slot = match name.as_ref() {
				"state" => &mut response.state,
				"code" => &mut response.code,
				"error" => &mut response.error,
				"error_description" => &mut response.error_description,
				_ => continue,
			};

			*slot = Some(value.into_owned());
		}

		response
	}
}

/// Result of a completed transaction.
#[derive(Clone, Debug)]
pub struct TransactionOutcome {
	/// Application state supplied when the transaction began.
	pub app_state: Option<Value>,
	/// Credential written to the cache.
	pub credential: CredentialRecord,
}

impl SessionManager {
	/// Starts an authorization transaction and returns the URL to send the user to.
	///
	/// A pending transaction of the same client is replaced.
	pub async fn begin_transaction(&self, options: AuthorizeOptions) -> Result<AuthorizationRequest> {
		let span = FlowSpan::begin(FlowKind::BeginTransaction, &self.config.client_id);
		let result = span
			.instrument(async move {
				let key = self.credential_key(options.audience.as_deref(), options.scope.as_deref())?;
				let redirect_uri = options
					.redirect_uri
					.or_else(|| self.config.redirect_uri.clone())
					.ok_or(ConfigError::MissingRedirectUri)?;
				let state = pkce::random_string(STATE_LEN);
				let nonce = pkce::random_string(NONCE_LEN);
				let pkce = PkcePair::generate();
				let transaction = Transaction {
					state: Some(state.clone()),
					nonce: nonce.clone(),
					code_verifier: Some(TokenSecret::new(pkce.verifier.clone())),
					audience: key.audience.clone(),
					scope: key.scope.clone(),
					redirect_uri: Some(redirect_uri.clone()),
					app_state: options.app_state,
					created_at: self.clock.now(),
				};

				self.transactions.create(&transaction).await?;

				let url = self.build_authorize_url(
					&key,
					&redirect_uri,
					&state,
					&nonce,
					&pkce,
					&options.extra_params,
				);

				Ok(AuthorizationRequest {
					url,
					state,
					nonce,
					code_challenge: pkce.challenge,
					code_challenge_method: pkce.method,
				})
			})
			.await;

		span.finish(&result);

		result
	}

	/// Completes the pending transaction with the callback parameters.
	///
	/// The transaction is consumed whatever the outcome, so a replayed callback fails with
	/// [`Error::InvalidState`].
	pub async fn complete_transaction(
		&self,
		response: AuthorizationResponse,
	) -> Result<TransactionOutcome> {
		let span = FlowSpan::begin(FlowKind::CompleteTransaction, &self.config.client_id);
		let result = span.instrument(self.complete_pending(response)).await;

		span.finish(&result);

		result
	}

	/// Parses `state`, `code`, `error`, and `error_description` from `url` and completes the
	/// pending transaction.
	pub async fn handle_redirect_callback(&self, url: &Url) -> Result<TransactionOutcome> {
		self.complete_transaction(AuthorizationResponse::from_redirect(url)).await
	}

	async fn complete_pending(&self, response: AuthorizationResponse) -> Result<TransactionOutcome> {
		let transaction = self
			.transactions
			.get()
			.await?
			.ok_or_else(|| Error::invalid_state("No pending authorization transaction."))?;

		self.transactions.remove().await?;

		if let Some(error) = response.error {
			return Err(ProviderError::new(error, response.error_description)
				.with_app_state(transaction.app_state)
				.into());
		}

		let code_verifier = transaction
			.code_verifier
			.ok_or_else(|| Error::invalid_state("Pending transaction has no PKCE verifier."))?;

		match (&transaction.state, &response.state) {
			(Some(expected), Some(returned)) if expected == returned => {},
			(None, _) if self.config.allow_stateless_transactions => {},
			_ => return Err(Error::invalid_state("Returned state does not match the transaction.")),
		}

		let code = response
			.code
			.ok_or_else(|| Error::invalid_state("Callback carries no authorization code."))?;
		let key = CredentialKey::new(
			self.config.client_id.clone(),
			transaction.audience,
			transaction.scope,
		);
		let token_response = self
			.endpoint
			.exchange(
				TokenRequest {
					grant: TokenGrant::AuthorizationCode {
						code,
						code_verifier,
						redirect_uri: transaction.redirect_uri,
					},
					audience: key.audience.clone(),
					scope: key.scope.clone(),
					extra_params: BTreeMap::new(),
				},
				self.config.http_timeout,
			)
			.await?;
		let credential = self.build_record(key, token_response, Some(&transaction.nonce), None)?;

		self.persist(&credential).await?;

		#[cfg(feature = "tracing")]
		tracing::debug!(key = %credential.key, "Authorization transaction completed.");

		Ok(TransactionOutcome { app_state: transaction.app_state, credential })
	}

	fn build_authorize_url(
		&self,
		key: &CredentialKey,
		redirect_uri: &Url,
		state: &str,
		nonce: &str,
		pkce: &PkcePair,
		extra_params: &BTreeMap<String, String>,
	) -> Url {
		let mut url = self.descriptor.endpoints.authorization.clone();
		let mut pairs = url.query_pairs_mut();

		pairs.append_pair("client_id", &self.config.client_id);
		pairs.append_pair("response_type", "code");
		pairs.append_pair("response_mode", "query");
		pairs.append_pair("redirect_uri", redirect_uri.as_str());
		pairs.append_pair("scope", &key.scope.normalized());

		if !key.audience.is_fallback() {
			pairs.append_pair("audience", &key.audience);
		}

		pairs.append_pair("state", state);
		pairs.append_pair("nonce", nonce);
		pairs.append_pair("code_challenge", &pkce.challenge);
		pairs.append_pair("code_challenge_method", pkce.method.as_str());

		if let Some(max_age) = self.config.max_age {
			pairs.append_pair("max_age", &max_age.whole_seconds().to_string());
		}

		let mut extras = self.config.authorize_params.clone();

		extras.extend(extra_params.iter().map(|(name, value)| (name.clone(), value.clone())));

		for (name, value) in extras.iter().filter(|(name, _)| !RESERVED_PARAMS.contains(&name.as_str())) {
			pairs.append_pair(name, value);
		}

		drop(pairs);

		url
	}
}
