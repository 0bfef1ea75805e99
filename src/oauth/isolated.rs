//! Refresh-token custody outside the credential cache.

// self
use crate::{
	_prelude::*,
	auth::{Audience, ScopeSet, TokenSecret},
	oauth::{TokenEndpoint, TokenFuture, TokenGrant, TokenRequest},
};

/// Wraps another [`TokenEndpoint`] and keeps refresh tokens to itself.
///
/// Refresh tokens returned by the inner endpoint are captured per audience and scope and
/// stripped from the response, so the session never caches them. Refresh grants get the held
/// token injected, preferring an exact scope match and otherwise the narrowest held scope that
/// covers the request; without one the exchange fails with [`Error::LoginRequired`].
pub struct IsolatedRefreshEndpoint {
	inner: Arc<dyn TokenEndpoint>,
	vault: Mutex<HashMap<VaultSlot, TokenSecret>>,
}
impl IsolatedRefreshEndpoint {
	/// Isolates refresh tokens issued through `inner`.
	pub fn new(inner: Arc<dyn TokenEndpoint>) -> Self {
		Self { inner, vault: Default::default() }
	}

	/// Returns `true` when a held refresh token covers `audience` and `scope`.
	pub fn holds_refresh_token(&self, audience: &Audience, scope: &ScopeSet) -> bool {
		self.covering_slot(audience, scope).is_some()
	}

	fn covering_slot(&self, audience: &Audience, scope: &ScopeSet) -> Option<VaultSlot> {
		let vault = self.vault.lock();
		let exact = (audience.clone(), scope.clone());

		if vault.contains_key(&exact) {
			return Some(exact);
		}

		vault
			.keys()
			.filter(|(held_audience, held_scope)| {
				held_audience == audience && held_scope.is_superset_of(scope)
			})
			.min_by_key(|(_, held_scope)| held_scope.len())
			.cloned()
	}
}
impl TokenEndpoint for IsolatedRefreshEndpoint {
	fn exchange(&self, mut request: TokenRequest, timeout: Duration) -> TokenFuture<'_> {
		Box::pin(async move {
			let mut slot = (request.audience.clone(), request.scope.clone());

			if let TokenGrant::RefreshToken { refresh_token } = &mut request.grant {
				slot = self.covering_slot(&request.audience, &request.scope).ok_or_else(|| {
					Error::login_required(format!(
						"No refresh token is held for `{}|{}`.",
						request.audience,
						request.scope.normalized()
					))
				})?;
				*refresh_token = self.vault.lock().get(&slot).cloned();
			}

			let is_refresh = matches!(request.grant, TokenGrant::RefreshToken { .. });
			let mut response = self.inner.exchange(request, timeout).await?;

			match response.refresh_token.take() {
				Some(token) => {
					self.vault.lock().insert(slot, token);
				},
				// A refresh answered without rotation leaves nothing to reuse safely.
				None if is_refresh => {
					self.vault.lock().remove(&slot);
				},
				None => {},
			}

			Ok(response)
		})
	}

	fn isolates_refresh_tokens(&self) -> bool {
		true
	}

	fn forget_refresh_tokens(&self) {
		self.vault.lock().clear();
	}
}
impl Debug for IsolatedRefreshEndpoint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IsolatedRefreshEndpoint").field("held", &self.vault.lock().len()).finish()
	}
}

type VaultSlot = (Audience, ScopeSet);

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, oauth::TokenResponse};

	fn refresh_request(scope: &ScopeSet) -> TokenRequest {
		TokenRequest {
			grant: TokenGrant::RefreshToken { refresh_token: None },
			audience: Audience::fallback(),
			scope: scope.clone(),
			extra_params: BTreeMap::new(),
		}
	}

	#[tokio::test]
	async fn captures_and_injects_refresh_tokens() {
		let now = OffsetDateTime::now_utc();
		let stub = Arc::new(StubTokenEndpoint::new(move |request: &TokenRequest| {
			Ok(token_response(now, None, "at", Some("rt-next"), Duration::hours(1)))
				.map(|response: TokenResponse| match &request.grant {
					TokenGrant::RefreshToken { refresh_token } => {
						assert_eq!(
							refresh_token.as_ref().map(TokenSecret::expose),
							Some("rt-first"),
							"The held refresh token must be injected."
						);

						response
					},
					TokenGrant::AuthorizationCode { .. } => response,
				})
		}));
		let isolated = IsolatedRefreshEndpoint::new(stub.clone());
		let scope: ScopeSet = "openid offline_access".parse().expect("Scope should parse.");

		stub.push(Ok(token_response(now, None, "at", Some("rt-first"), Duration::hours(1))));

		let first = isolated
			.exchange(
				TokenRequest {
					grant: TokenGrant::AuthorizationCode {
						code: "code".into(),
						code_verifier: "verifier".into(),
						redirect_uri: None,
					},
					..refresh_request(&scope)
				},
				Duration::seconds(5),
			)
			.await
			.expect("Code exchange should succeed.");

		assert!(first.refresh_token.is_none(), "Refresh tokens must not leave the endpoint.");
		assert!(isolated.holds_refresh_token(&Audience::fallback(), &scope));

		let renewed = isolated
			.exchange(refresh_request(&scope), Duration::seconds(5))
			.await
			.expect("Refresh should use the held token.");

		assert!(renewed.refresh_token.is_none());
		assert_eq!(stub.calls(), 2);

		isolated.forget_refresh_tokens();

		assert!(!isolated.holds_refresh_token(&Audience::fallback(), &scope));
	}

	#[tokio::test]
	async fn missing_refresh_token_requires_login() {
		let stub = Arc::new(StubTokenEndpoint::unreachable());
		let isolated = IsolatedRefreshEndpoint::new(stub.clone());
		let err = isolated
			.exchange(refresh_request(&ScopeSet::default()), Duration::seconds(5))
			.await
			.expect_err("Refresh without a held token must fail.");

		assert!(matches!(err, Error::LoginRequired { .. }));
		assert_eq!(stub.calls(), 0);
		assert!(isolated.isolates_refresh_tokens());
	}

	#[tokio::test]
	async fn narrower_refreshes_use_a_covering_token() {
		let now = OffsetDateTime::now_utc();
		let stub = Arc::new(StubTokenEndpoint::new(move |request: &TokenRequest| {
			match &request.grant {
				TokenGrant::RefreshToken { refresh_token } => assert_eq!(
					refresh_token.as_ref().map(TokenSecret::expose),
					Some("rt-wide"),
					"The covering refresh token must be injected."
				),
				TokenGrant::AuthorizationCode { .. } => {},
			}

			Ok(token_response(now, None, "at", Some("rt-rotated"), Duration::hours(1)))
		}));
		let isolated = IsolatedRefreshEndpoint::new(stub.clone());
		let wide: ScopeSet = "openid read write".parse().expect("Scope should parse.");
		let narrow: ScopeSet = "openid read".parse().expect("Scope should parse.");

		stub.push(Ok(token_response(now, None, "at", Some("rt-wide"), Duration::hours(1))));
		isolated
			.exchange(
				TokenRequest {
					grant: TokenGrant::AuthorizationCode {
						code: "code".into(),
						code_verifier: "verifier".into(),
						redirect_uri: None,
					},
					..refresh_request(&wide)
				},
				Duration::seconds(5),
			)
			.await
			.expect("Code exchange should succeed.");

		assert!(isolated.holds_refresh_token(&Audience::fallback(), &narrow));

		isolated
			.exchange(refresh_request(&narrow), Duration::seconds(5))
			.await
			.expect("A covering refresh token should be used.");

		assert_eq!(stub.calls(), 2);
		assert!(
			isolated.holds_refresh_token(&Audience::fallback(), &wide),
			"The rotated token replaces the covering one."
		);
		assert_eq!(isolated.vault.lock().len(), 1);
	}
}
