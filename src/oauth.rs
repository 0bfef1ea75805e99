//! Token endpoint contract and its implementations.
//!
//! [`TokenEndpoint`] is the seam renewal and transaction completion call through.
//! [`OAuth2TokenEndpoint`] speaks OAuth 2.0 over HTTP via the `oauth2` crate, and
//! [`IsolatedRefreshEndpoint`] keeps refresh tokens out of the caller's cache.

pub mod endpoint;
pub mod isolated;

pub use endpoint::*;
pub use isolated::IsolatedRefreshEndpoint;
pub use oauth2;

// self
use crate::{
	_prelude::*,
	auth::{Audience, ScopeSet, TokenSecret},
};

/// Boxed future returned by [`TokenEndpoint::exchange`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenResponse>> + 'a + Send>>;

/// Grant labels used for instrumentation and error classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Authorization Code with PKCE.
	AuthorizationCode,
	/// Refresh Token grant.
	RefreshToken,
}
impl GrantType {
	/// Wire name of the grant.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::AuthorizationCode => "authorization_code",
			Self::RefreshToken => "refresh_token",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Grant-specific request material.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenGrant {
	/// Exchange an authorization code.
	AuthorizationCode {
		/// Code returned to the redirect URI.
		code: String,
		/// PKCE verifier of the transaction.
		code_verifier: TokenSecret,
		/// Redirect URI the code was issued for.
		redirect_uri: Option<Url>,
	},
	/// Redeem a refresh token.
	///
	/// `None` asks an isolating endpoint to supply the token it holds.
	RefreshToken {
		/// Refresh token read from the cache, if it lives there.
		refresh_token: Option<TokenSecret>,
	},
}
impl TokenGrant {
	/// Grant label.
	pub fn kind(&self) -> GrantType {
		match self {
			Self::AuthorizationCode { .. } => GrantType::AuthorizationCode,
			Self::RefreshToken { .. } => GrantType::RefreshToken,
		}
	}
}

/// Token endpoint request.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenRequest {
	/// Grant material.
	pub grant: TokenGrant,
	/// Requested audience; the `default` placeholder is not sent.
	pub audience: Audience,
	/// Requested scope.
	pub scope: ScopeSet,
	/// Additional form parameters passed through verbatim.
	pub extra_params: BTreeMap<String, String>,
}

/// Successful token endpoint response.
#[derive(Clone, Debug)]
pub struct TokenResponse {
	/// Raw ID token.
	pub id_token: String,
	/// Access token.
	pub access_token: TokenSecret,
	/// Refresh token, when issued or rotated.
	pub refresh_token: Option<TokenSecret>,
	/// Server-reported lifetime of the access token.
	pub expires_in: Duration,
	/// Scope reported by the server.
	pub scope: Option<ScopeSet>,
}

/// Exchanges grants for tokens.
pub trait TokenEndpoint
where
	Self: Send + Sync,
{
	/// Performs one exchange, failing with a timeout error once `timeout` elapses.
	fn exchange(&self, request: TokenRequest, timeout: Duration) -> TokenFuture<'_>;

	/// Returns `true` when this endpoint holds refresh tokens itself.
	///
	/// Renewal then proceeds without a cached refresh token.
	fn isolates_refresh_tokens(&self) -> bool {
		false
	}

	/// Drops any refresh tokens held by the endpoint itself.
	fn forget_refresh_tokens(&self) {}
}
impl<T> TokenEndpoint for Arc<T>
where
	T: ?Sized + TokenEndpoint,
{
	fn exchange(&self, request: TokenRequest, timeout: Duration) -> TokenFuture<'_> {
		(**self).exchange(request, timeout)
	}

	fn isolates_refresh_tokens(&self) -> bool {
		(**self).isolates_refresh_tokens()
	}

	fn forget_refresh_tokens(&self) {
		(**self).forget_refresh_tokens()
	}
}
