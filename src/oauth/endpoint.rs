//! [`TokenEndpoint`] over HTTP, driven by the `oauth2` crate.

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthorizationCode, Client, ClientId as OAuthClientId, ClientSecret, EndpointNotSet,
	EndpointSet, ExtraTokenFields, HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken,
	RequestTokenError, Scope, StandardRevocableToken, StandardTokenResponse,
	TokenResponse as OAuthTokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
		BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeSet, TokenSecret},
	error::{ConfigError, ProviderError, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	oauth::{GrantType, TokenEndpoint, TokenFuture, TokenGrant, TokenRequest, TokenResponse},
	provider::{ClientAuthMethod, ProviderDescriptor},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

type OidcTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;
type ConfiguredClient = Client<
	BasicErrorResponse,
	OidcTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type OidcRequestTokenError<E> = RequestTokenError<HttpClientError<E>, BasicErrorResponse>;

/// OpenID Connect field carried next to the standard token response members.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenFields {
	/// Raw ID token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

/// Maps HTTP transport failures into session [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a session error.
	fn map_transport_error(
		&self,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
			HttpClientError::Http(inner) => ConfigError::http_request(inner).into(),
			HttpClientError::Io(inner) => TransportError::from(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_generic_transport_error(meta, "unrecognized transport failure"),
		}
	}
}

/// Token endpoint speaking the OAuth 2.0 form protocol.
///
/// Public clients ([`ClientAuthMethod::NoneWithPkce`]) send only `client_id`; confidential
/// clients authenticate with HTTP Basic or form credentials per the descriptor.
pub struct OAuth2TokenEndpoint<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredClient,
	token_url: Url,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> OAuth2TokenEndpoint<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds an endpoint for `client_id` against `descriptor`'s token URL.
	///
	/// `client_secret` is ignored when the descriptor prefers PKCE-only public clients.
	pub fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &ClientId,
		client_secret: Option<&TokenSecret>,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let mut oauth_client: ConfiguredClient =
			Client::new(OAuthClientId::new(client_id.to_string())).set_token_uri(token_url);

		match (descriptor.preferred_client_auth_method, client_secret) {
			(ClientAuthMethod::NoneWithPkce, _) | (_, None) => {},
			(ClientAuthMethod::ClientSecretBasic, Some(secret)) => {
				oauth_client =
					oauth_client.set_client_secret(ClientSecret::new(secret.expose().to_owned()));
			},
			(ClientAuthMethod::ClientSecretPost, Some(secret)) => {
				oauth_client = oauth_client
					.set_client_secret(ClientSecret::new(secret.expose().to_owned()))
					.set_auth_type(AuthType::RequestBody);
			},
		}

		Ok(Self {
			oauth_client,
			token_url: descriptor.endpoints.token.clone(),
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		})
	}

	async fn dispatch(&self, request: TokenRequest, meta: ResponseMetadataSlot) -> Result<TokenResponse> {
		let instrumented = self.http_client.with_metadata(meta.clone());
		let grant = request.grant.kind();
		let mut params = request.extra_params;

		if !request.audience.is_fallback() {
			params.insert("audience".into(), request.audience.to_string());
		}

		let response = match request.grant {
			TokenGrant::AuthorizationCode { code, code_verifier, redirect_uri } => {
				let mut call = self
					.oauth_client
					.exchange_code(AuthorizationCode::new(code))
					.set_pkce_verifier(PkceCodeVerifier::new(code_verifier.expose().to_owned()));

				if let Some(redirect) = redirect_uri {
					let redirect_url = RedirectUrl::new(redirect.to_string())
						.map_err(|source| ConfigError::InvalidRedirect { source })?;

					call = call.set_redirect_uri(Cow::Owned(redirect_url));
				}
				if !request.scope.is_empty() {
					call = call.add_extra_param("scope", request.scope.normalized());
				}
				for (key, value) in params {
					call = call.add_extra_param(key, value);
				}

				call.request_async(&instrumented).await
			},
			TokenGrant::RefreshToken { refresh_token } => {
				let refresh_token = refresh_token
					.ok_or_else(|| Error::login_required("No refresh token is available."))?;
				let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
				let mut call = self.oauth_client.exchange_refresh_token(&refresh_secret);

				for scope in request.scope.iter() {
					call = call.add_scope(Scope::new(scope.to_owned()));
				}
				for (key, value) in params {
					call = call.add_extra_param(key, value);
				}

				call.request_async(&instrumented).await
			},
		}
		.map_err(|err| map_request_error(grant, meta.take(), err, self.error_mapper.as_ref()))?;

		map_token_response(response)
	}
}
#[cfg(feature = "reqwest")]
impl OAuth2TokenEndpoint<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Builds an endpoint over a default reqwest client.
	pub fn reqwest(
		descriptor: &ProviderDescriptor,
		client_id: &ClientId,
		client_secret: Option<&TokenSecret>,
	) -> Result<Self> {
		Self::from_descriptor(
			descriptor,
			client_id,
			client_secret,
			ReqwestHttpClient::default(),
			ReqwestTransportErrorMapper,
		)
	}
}
impl<C, M> TokenEndpoint for OAuth2TokenEndpoint<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange(&self, request: TokenRequest, timeout: Duration) -> TokenFuture<'_> {
		Box::pin(async move {
			let meta = ResponseMetadataSlot::default();

			#[cfg(feature = "tracing")]
			tracing::debug!(grant = %request.grant.kind(), endpoint = %self.token_url, "Calling token endpoint.");

			match tokio::time::timeout(timeout.unsigned_abs(), self.dispatch(request, meta)).await {
				Ok(outcome) => outcome,
				Err(_) => Err(TransportError::Timeout { after: timeout }.into()),
			}
		})
	}
}
impl<C, M> Debug for OAuth2TokenEndpoint<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuth2TokenEndpoint").field("token_url", &self.token_url.as_str()).finish()
	}
}

fn map_token_response(response: OidcTokenResponse) -> Result<TokenResponse> {
	let id_token = response
		.extra_fields()
		.id_token
		.clone()
		.ok_or_else(|| TransientError::malformed("response carries no `id_token`"))?;
	let expires_in = response
		.expires_in()
		.ok_or_else(|| TransientError::malformed("response carries no `expires_in`"))?;
	let expires_in = Duration::try_from(expires_in)
		.map_err(|_| TransientError::malformed("`expires_in` is out of range"))?;

	if !expires_in.is_positive() {
		return Err(TransientError::malformed("`expires_in` must be positive").into());
	}

	Ok(TokenResponse {
		id_token,
		access_token: TokenSecret::new(response.access_token().secret().to_owned()),
		refresh_token: response.refresh_token().map(|token| TokenSecret::new(token.secret().to_owned())),
		expires_in,
		scope: response
			.scopes()
			.map(|scopes| ScopeSet::merge(scopes.iter().map(|scope| Some(scope.as_str())))),
	})
}

fn map_request_error<E, M>(
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: OidcRequestTokenError<E>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(grant, response),
		RequestTokenError::Request(error) => mapper.map_transport_error(grant, meta_ref, error),
		RequestTokenError::Parse(error, _body) => TransientError::MalformedResponse {
			message: error.to_string(),
			status: meta_status(meta_ref),
		}
		.into(),
		RequestTokenError::Other(message) => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta_ref),
			retry_after: meta_retry_after(meta_ref),
		}
		.into(),
	}
}

fn map_server_response_error(grant: GrantType, response: BasicErrorResponse) -> Error {
	let code = response.error().as_ref().to_owned();
	let description = response.error_description().cloned();

	// A rejected refresh token means the session is gone.
	if grant == GrantType::RefreshToken && matches!(code.as_str(), "invalid_grant" | "login_required")
	{
		return Error::login_required(description.unwrap_or(code));
	}

	ProviderError::new(code, description).into()
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: "request timed out while calling the token endpoint".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

#[cfg(feature = "reqwest")]
fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	TransientError::TokenEndpoint {
		message: format!("HTTP client error occurred while calling the token endpoint: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::{AccessToken, basic::BasicErrorResponseType};
	// self
	use super::*;
	use crate::_preludet::*;

	fn oidc_response(id_token: Option<&str>, expires_in: Option<u64>) -> OidcTokenResponse {
		let mut response = OidcTokenResponse::new(
			AccessToken::new("access".into()),
			BasicTokenType::Bearer,
			IdTokenFields { id_token: id_token.map(str::to_owned) },
		);

		response.set_expires_in(expires_in.map(std::time::Duration::from_secs).as_ref());
		response.set_refresh_token(Some(RefreshToken::new("refresh".into())));
		response.set_scopes(Some(vec![Scope::new("profile".into()), Scope::new("openid".into())]));

		response
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn builds_clients_for_every_auth_method() {
		let client_id = ClientId::new("client-id").expect("Client identifier should be valid.");
		let secret = TokenSecret::new("secret");

		for method in [
			ClientAuthMethod::NoneWithPkce,
			ClientAuthMethod::ClientSecretBasic,
			ClientAuthMethod::ClientSecretPost,
		] {
			let descriptor = ProviderDescriptor::builder(TEST_ISSUER)
				.authorization_endpoint(
					Url::parse("https://login.example.com/authorize")
						.expect("Authorization endpoint should parse."),
				)
				.token_endpoint(
					Url::parse("https://login.example.com/oauth/token")
						.expect("Token endpoint should parse."),
				)
				.preferred_client_auth_method(method)
				.build()
				.expect("Descriptor should build.");

			assert!(
				<OAuth2TokenEndpoint<ReqwestHttpClient, ReqwestTransportErrorMapper>>::reqwest(
					&descriptor,
					&client_id,
					Some(&secret),
				)
				.is_ok()
			);
		}
	}

	#[test]
	fn token_responses_require_id_token_and_lifetime() {
		let mapped = map_token_response(oidc_response(Some("raw.id.token"), Some(3_600)))
			.expect("Complete response should map.");

		assert_eq!(mapped.id_token, "raw.id.token");
		assert_eq!(mapped.expires_in, Duration::hours(1));
		assert_eq!(mapped.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh"));
		assert_eq!(
			mapped.scope.as_ref().map(ScopeSet::normalized).as_deref(),
			Some("openid profile")
		);

		for broken in [oidc_response(None, Some(3_600)), oidc_response(Some("t"), None)] {
			assert!(matches!(
				map_token_response(broken),
				Err(Error::Transient(TransientError::MalformedResponse { .. }))
			));
		}
		assert!(map_token_response(oidc_response(Some("t"), Some(0))).is_err());
	}

	#[test]
	fn rejected_refresh_grants_require_login() {
		let invalid_grant = || {
			BasicErrorResponse::new(
				BasicErrorResponseType::InvalidGrant,
				Some("Unknown or invalid refresh token.".into()),
				None,
			)
		};

		assert!(matches!(
			map_server_response_error(GrantType::RefreshToken, invalid_grant()),
			Error::LoginRequired { .. }
		));

		let err = map_server_response_error(GrantType::AuthorizationCode, invalid_grant());

		assert!(
			matches!(err, Error::Provider(ProviderError { ref error, .. }) if error == "invalid_grant")
		);

		let login = BasicErrorResponse::new(
			BasicErrorResponseType::Extension("login_required".into()),
			None,
			None,
		);

		assert!(map_server_response_error(GrantType::RefreshToken, login).is_login_required());
	}
}
