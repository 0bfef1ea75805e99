//! Provider descriptor data structures.

/// Builder API for assembling provider descriptors.
pub mod builder;

pub use builder::*;

// self
use crate::_prelude::*;

/// Preferred client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// Public clients that prove possession via PKCE only.
	#[default]
	NoneWithPkce,
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint the user agent is redirected to.
	pub authorization: Url,
	/// Token endpoint used for code exchange and refresh.
	pub token: Url,
	/// Logout endpoint, if the provider supports redirect-based logout.
	pub end_session: Option<Url>,
}

/// Immutable provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Expected `iss` of ID tokens.
	pub issuer: String,
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Preferred client authentication mechanism.
	pub preferred_client_auth_method: ClientAuthMethod,
}
impl ProviderDescriptor {
	/// Creates a new builder for `issuer`.
	pub fn builder(issuer: impl Into<String>) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(issuer)
	}

	/// Descriptor for a provider domain using the conventional endpoint layout.
	///
	/// `domain` may be a bare host (`login.example.com`) or an `https://` origin. The issuer is
	/// the origin with a trailing slash; endpoints are `/authorize`, `/oauth/token`, and
	/// `/v2/logout`.
	pub fn from_domain(domain: &str) -> Result<Self, ProviderDescriptorError> {
		let origin = if domain.starts_with("https://") || domain.starts_with("http://") {
			domain.trim_end_matches('/').to_owned()
		} else {
			format!("https://{}", domain.trim_end_matches('/'))
		};
		let endpoint = |path: &str| {
			Url::parse(&format!("{origin}{path}")).map_err(|e| ProviderDescriptorError::InvalidUrl {
				url: format!("{origin}{path}"),
				reason: e.to_string(),
			})
		};

		Self::builder(format!("{origin}/"))
			.authorization_endpoint(endpoint("/authorize")?)
			.token_endpoint(endpoint("/oauth/token")?)
			.end_session_endpoint(endpoint("/v2/logout")?)
			.build()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn domains_expand_to_conventional_endpoints() {
		let descriptor = ProviderDescriptor::from_domain("login.example.com")
			.expect("Domain descriptor should build.");

		assert_eq!(descriptor.issuer, "https://login.example.com/");
		assert_eq!(descriptor.endpoints.authorization.as_str(), "https://login.example.com/authorize");
		assert_eq!(descriptor.endpoints.token.as_str(), "https://login.example.com/oauth/token");
		assert_eq!(
			descriptor.endpoints.end_session.as_ref().map(Url::as_str),
			Some("https://login.example.com/v2/logout")
		);
		assert_eq!(
			ProviderDescriptor::from_domain("https://login.example.com/")
				.expect("Origin descriptor should build."),
			descriptor
		);
	}

	#[test]
	fn plain_http_domains_are_rejected() {
		assert!(matches!(
			ProviderDescriptor::from_domain("http://login.example.com"),
			Err(ProviderDescriptorError::InsecureEndpoint { .. })
		));
	}
}
