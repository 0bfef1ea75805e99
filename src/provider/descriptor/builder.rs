// self
use crate::{
	_prelude::*,
	provider::{ClientAuthMethod, ProviderDescriptor, ProviderEndpoints},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderDescriptorError {
	/// Issuer must not be empty.
	#[error("Missing issuer.")]
	MissingIssuer,
	/// Authorization endpoint is required to begin transactions.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is mandatory.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Endpoints must use HTTPS (loopback hosts excepted).
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// A derived endpoint URL could not be parsed.
	#[error("Endpoint URL `{url}` is invalid: {reason}.")]
	InvalidUrl {
		/// Offending URL.
		url: String,
		/// Parser message.
		reason: String,
	},
}

/// Builder for [`ProviderDescriptor`] values.
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	/// Expected ID-token issuer.
	pub issuer: String,
	/// Authorization endpoint.
	pub authorization_endpoint: Option<Url>,
	/// Token endpoint.
	pub token_endpoint: Option<Url>,
	/// Optional end-session endpoint.
	pub end_session_endpoint: Option<Url>,
	/// Preferred client authentication method for the token endpoint.
	pub preferred_client_auth_method: ClientAuthMethod,
}
impl ProviderDescriptorBuilder {
	/// Creates a new builder seeded with `issuer`.
	pub fn new(issuer: impl Into<String>) -> Self {
		Self {
			issuer: issuer.into(),
			authorization_endpoint: None,
			token_endpoint: None,
			end_session_endpoint: None,
			preferred_client_auth_method: ClientAuthMethod::default(),
		}
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the end-session endpoint.
	pub fn end_session_endpoint(mut self, url: Url) -> Self {
		self.end_session_endpoint = Some(url);

		self
	}

	/// Overrides the preferred client authentication method.
	pub fn preferred_client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.preferred_client_auth_method = method;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		if self.issuer.trim().is_empty() {
			return Err(ProviderDescriptorError::MissingIssuer);
		}

		let authorization = self
			.authorization_endpoint
			.ok_or(ProviderDescriptorError::MissingAuthorizationEndpoint)?;
		let token = self.token_endpoint.ok_or(ProviderDescriptorError::MissingTokenEndpoint)?;

		validate_endpoint("authorization", &authorization)?;
		validate_endpoint("token", &token)?;

		if let Some(end_session) = self.end_session_endpoint.as_ref() {
			validate_endpoint("end_session", end_session)?;
		}

		Ok(ProviderDescriptor {
			issuer: self.issuer,
			endpoints: ProviderEndpoints {
				authorization,
				token,
				end_session: self.end_session_endpoint,
			},
			preferred_client_auth_method: self.preferred_client_auth_method,
		})
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));

	if url.scheme() == "https" || (url.scheme() == "http" && loopback) {
		Ok(())
	} else {
		Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}
