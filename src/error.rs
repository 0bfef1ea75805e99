//! Session-level error taxonomy shared by transactions, renewal, caches, and locks.

// self
use crate::_prelude::*;

/// Session-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reference-counted error source, which keeps [`Error`] cloneable so a single-flight result can
/// be handed to every joined caller.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

/// Provider `error` codes a silent session check absorbs as "not authenticated".
pub const RECOVERABLE_ERROR_CODES: [&str; 5] = [
	"login_required",
	"consent_required",
	"interaction_required",
	"account_selection_required",
	"access_denied",
];

/// Canonical session error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Callback did not match a pending transaction, or the transaction was unusable.
	#[error("Invalid authorization state: {reason}")]
	InvalidState {
		/// Human-readable description of the mismatch.
		reason: String,
	},
	/// Authorization server returned an OAuth `error` payload.
	#[error(transparent)]
	Provider(#[from] ProviderError),
	/// No silent renewal path exists; interactive login is required.
	#[error("Login required: {reason}")]
	LoginRequired {
		/// Why renewal could not proceed.
		reason: String,
	},
	/// The renewal lock could not be acquired within the retry budget.
	#[error("Timed out acquiring lock `{name}` after {attempts} attempts.")]
	LockTimeout {
		/// Lock name.
		name: String,
		/// Attempts made before giving up.
		attempts: u32,
	},
	/// ID token failed cryptographic or claim validation.
	#[error("ID token validation failed: {0}")]
	Validation(#[from] crate::verify::ValidationError),
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Lock backend failure.
	#[error(transparent)]
	Lock(#[from] crate::lock::LockError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Unexpected or malformed token endpoint response.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS, timeouts).
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl Error {
	/// Returns `true` when retrying the same operation later may succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transport(_) | Self::Transient(_))
	}

	/// Returns `true` when the caller must start an interactive login.
	pub fn is_login_required(&self) -> bool {
		match self {
			Self::LoginRequired { .. } => true,
			Self::Provider(e) => e.error == "login_required",
			_ => false,
		}
	}

	/// Returns `true` for errors a silent session check treats as "no session".
	pub fn is_recoverable(&self) -> bool {
		match self {
			Self::LoginRequired { .. } => true,
			Self::Provider(e) => RECOVERABLE_ERROR_CODES.contains(&e.error.as_str()),
			_ => false,
		}
	}

	pub(crate) fn invalid_state(reason: impl Into<String>) -> Self {
		Self::InvalidState { reason: reason.into() }
	}

	pub(crate) fn login_required(reason: impl Into<String>) -> Self {
		Self::LoginRequired { reason: reason.into() }
	}
}

/// OAuth error payload returned by the authorization server.
#[derive(Clone, Debug, PartialEq, ThisError)]
#[error("Authorization server returned `{error}`{}.", describe(.error_description))]
pub struct ProviderError {
	/// OAuth `error` code.
	pub error: String,
	/// Optional `error_description`.
	pub error_description: Option<String>,
	/// Application state captured when the failed transaction began.
	pub app_state: Option<serde_json::Value>,
}
impl ProviderError {
	/// Creates a provider error without application state.
	pub fn new(error: impl Into<String>, error_description: Option<String>) -> Self {
		Self { error: error.into(), error_description, app_state: None }
	}

	/// Attaches the application state of the failed transaction.
	pub fn with_app_state(mut self, app_state: Option<serde_json::Value>) -> Self {
		self.app_state = app_state;

		self
	}
}

fn describe(description: &Option<String>) -> String {
	description.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

/// Configuration and validation failures raised locally.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying request builder failure.
		#[source]
		source: SharedError,
	},
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// No redirect URI was configured or supplied for the transaction.
	#[error("A redirect URI is required to begin an authorization transaction.")]
	MissingRedirectUri,
	/// Provider descriptor does not expose an end-session endpoint.
	#[error("Provider descriptor does not define an end-session endpoint.")]
	MissingEndSessionEndpoint,
	/// Session manager was built without a token endpoint.
	#[error("Session manager requires a token endpoint.")]
	MissingTokenEndpoint,
	/// Session manager was built without an ID-token verifier.
	#[error("Session manager requires an ID-token verifier.")]
	MissingIdTokenVerifier,
	/// `local_only` and `federated` were both requested.
	#[error("Logout cannot be both local-only and federated.")]
	ConflictingLogoutOptions,
	/// A session setting is out of range.
	#[error("Invalid session setting `{field}`: {reason}.")]
	InvalidSetting {
		/// Offending setting.
		field: &'static str,
		/// Why the value was rejected.
		reason: &'static str,
	},
	/// Identifier failed validation.
	#[error("Identifier is invalid.")]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Credential record builder validation failed.
	#[error("Unable to build credential record.")]
	CredentialBuild(#[from] crate::auth::CredentialRecordBuilderError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}

	/// Wraps a request construction failure inside [`ConfigError`].
	pub fn http_request(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpRequest { source: Arc::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Unexpected token endpoint responses.
#[derive(Clone, Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or locally-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint response could not be parsed or lacked required fields.
	#[error("Token endpoint returned a malformed response: {message}.")]
	MalformedResponse {
		/// What was wrong with the payload.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl TransientError {
	pub(crate) fn malformed(message: impl Into<String>) -> Self {
		Self::MalformedResponse { message: message.into(), status: None }
	}
}

/// Transport-level failures (network, IO, deadlines).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// The exchange exceeded its deadline.
	#[error("Token endpoint call timed out after {after}.")]
	Timeout {
		/// Deadline that elapsed.
		after: Duration,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn provider_errors_render_description() {
		let plain = ProviderError::new("access_denied", None);
		let described = ProviderError::new("access_denied", Some("User cancelled".into()));

		assert_eq!(plain.to_string(), "Authorization server returned `access_denied`.");
		assert_eq!(
			described.to_string(),
			"Authorization server returned `access_denied`: User cancelled."
		);
	}

	#[test]
	fn classification_helpers_match_codes() {
		let login = Error::from(ProviderError::new("login_required", None));
		let consent = Error::from(ProviderError::new("consent_required", None));
		let invalid = Error::from(ProviderError::new("invalid_request", None));

		assert!(login.is_login_required());
		assert!(login.is_recoverable());
		assert!(!consent.is_login_required());
		assert!(consent.is_recoverable());
		assert!(!invalid.is_recoverable());
		assert!(Error::login_required("no refresh token").is_recoverable());
		assert!(
			Error::from(TransportError::Timeout { after: Duration::seconds(10) }).is_retryable()
		);
		assert!(!Error::invalid_state("mismatch").is_retryable());
		assert!(
			!Error::LockTimeout { name: "renew".into(), attempts: 3 }.is_retryable(),
			"Lock timeouts stay distinct from retryable transport failures."
		);
	}

	#[test]
	fn errors_clone_with_shared_sources() {
		let err = Error::from(TransportError::network(std::io::Error::other("reset")));
		let cloned = err.clone();

		assert_eq!(err.to_string(), cloned.to_string());
		assert!(StdError::source(&cloned).is_some());
	}
}
