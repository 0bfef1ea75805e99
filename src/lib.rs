//! OAuth 2.0 + PKCE session core: transaction bookkeeping, expiry-aware credential caches, and
//! single-flight token renewal guarded by lease-based named locks.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod clock;
pub mod error;
pub mod http;
pub mod lock;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod session;
pub mod store;
pub mod transaction;
pub mod verify;

#[cfg(any(test, feature = "test"))]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and fixtures shared by unit and integration tests; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicBool, AtomicUsize, Ordering},
	};
	// crates.io
	use jsonwebtoken::{Algorithm, EncodingKey, Header};
	// self
	use crate::{
		auth::ClientId,
		clock::{Clock, ManualClock},
		lock::{MemoryLock, NamedLock},
		oauth::{TokenEndpoint, TokenFuture, TokenRequest, TokenResponse},
		provider::ProviderDescriptor,
		session::{SessionConfig, SessionManager},
		store::{KeyValueStore, MemoryStore, StoreError, StoreFuture},
		verify::JwtIdTokenVerifier,
	};

	/// Issuer used by every fixture ID token.
	pub const TEST_ISSUER: &str = "https://login.example.com/";
	/// Client identifier used by fixture sessions.
	pub const TEST_CLIENT_ID: &str = "client-test";
	/// HMAC secret used to sign fixture ID tokens.
	pub const TEST_SECRET: &[u8] = b"oauth2-session-test-secret-0123456789";

	/// Builds a descriptor pointing at `login.example.com`.
	pub fn test_descriptor() -> ProviderDescriptor {
		ProviderDescriptor::builder(TEST_ISSUER)
			.authorization_endpoint(
				Url::parse("https://login.example.com/authorize")
					.expect("Fixture authorization endpoint should parse."),
			)
			.token_endpoint(
				Url::parse("https://login.example.com/oauth/token")
					.expect("Fixture token endpoint should parse."),
			)
			.end_session_endpoint(
				Url::parse("https://login.example.com/v2/logout")
					.expect("Fixture end-session endpoint should parse."),
			)
			.build()
			.expect("Fixture descriptor should build.")
	}

	/// Builds a session configuration with a redirect URI and default policies.
	pub fn test_config() -> SessionConfig {
		SessionConfig::builder(
			ClientId::new(TEST_CLIENT_ID).expect("Fixture client identifier should be valid."),
		)
		.redirect_uri(
			Url::parse("https://app.example.com/callback").expect("Fixture redirect URI should parse."),
		)
		.build()
		.expect("Fixture session configuration should build.")
	}

	/// HS256 verifier matching [`mint_id_token`].
	pub fn test_verifier() -> JwtIdTokenVerifier {
		JwtIdTokenVerifier::hs256(TEST_SECRET)
	}

	/// Mints an HS256 ID token for the fixture issuer and client.
	///
	/// `extra` is merged over the default claim set, so callers can override or add claims.
	pub fn mint_id_token(now: OffsetDateTime, nonce: Option<&str>, extra: serde_json::Value) -> String {
		let issued = now.unix_timestamp();
		let mut claims = serde_json::json!({
			"iss": TEST_ISSUER,
			"sub": "user-1",
			"aud": TEST_CLIENT_ID,
			"iat": issued,
			"exp": issued + 36_000,
			"name": "Test User",
		});

		if let Some(nonce) = nonce {
			claims["nonce"] = serde_json::Value::from(nonce);
		}
		if let (Some(target), serde_json::Value::Object(overrides)) = (claims.as_object_mut(), extra)
		{
			target.extend(overrides);
		}

		jsonwebtoken::encode(
			&Header::new(Algorithm::HS256),
			&claims,
			&EncodingKey::from_secret(TEST_SECRET),
		)
		.expect("Fixture ID token should encode.")
	}

	/// Token response fixture with a freshly minted ID token.
	pub fn token_response(
		now: OffsetDateTime,
		nonce: Option<&str>,
		access: &str,
		refresh: Option<&str>,
		expires_in: Duration,
	) -> TokenResponse {
		TokenResponse {
			id_token: mint_id_token(now, nonce, serde_json::json!({})),
			access_token: access.into(),
			refresh_token: refresh.map(Into::into),
			expires_in,
			scope: None,
		}
	}

	type Responder = Box<dyn Fn(&TokenRequest) -> Result<TokenResponse> + Send + Sync>;

	/// Programmable [`TokenEndpoint`] that records every request it receives.
	pub struct StubTokenEndpoint {
		responder: Responder,
		queued: Mutex<VecDeque<Result<TokenResponse>>>,
		requests: Mutex<Vec<TokenRequest>>,
		calls: AtomicUsize,
		delay: std::time::Duration,
	}
	impl StubTokenEndpoint {
		/// Stub answering every request through `responder`.
		pub fn new(
			responder: impl Fn(&TokenRequest) -> Result<TokenResponse> + Send + Sync + 'static,
		) -> Self {
			Self {
				responder: Box::new(responder),
				queued: Default::default(),
				requests: Default::default(),
				calls: AtomicUsize::new(0),
				delay: std::time::Duration::ZERO,
			}
		}

		/// Stub that fails every request unless a queued result is available.
		pub fn unreachable() -> Self {
			Self::new(|_| {
				Err(Error::InvalidState { reason: "Stub endpoint has no programmed response.".into() })
			})
		}

		/// Delays every exchange, which keeps concurrent callers in flight together.
		pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
			self.delay = delay;

			self
		}

		/// Queues a one-shot result served before the responder.
		pub fn push(&self, result: Result<TokenResponse>) {
			self.queued.lock().push_back(result);
		}

		/// Number of exchanges performed so far.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		/// Snapshot of every request received so far.
		pub fn requests(&self) -> Vec<TokenRequest> {
			self.requests.lock().clone()
		}
	}
	impl TokenEndpoint for StubTokenEndpoint {
		fn exchange(&self, request: TokenRequest, _timeout: Duration) -> TokenFuture<'_> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);
				self.requests.lock().push(request.clone());

				if !self.delay.is_zero() {
					tokio::time::sleep(self.delay).await;
				}

				let queued = self.queued.lock().pop_front();

				match queued {
					Some(result) => result,
					None => (self.responder)(&request),
				}
			})
		}
	}

	/// [`MemoryStore`] whose reads can be switched to fail with a backend error.
	#[derive(Clone, Debug, Default)]
	pub struct UnreliableStore {
		/// Backing store; still reachable while reads fail.
		pub inner: MemoryStore,
		failing: Arc<AtomicBool>,
	}
	impl UnreliableStore {
		/// Makes every subsequent `get` fail (or succeed again).
		pub fn fail_reads(&self, failing: bool) {
			self.failing.store(failing, Ordering::SeqCst);
		}
	}
	impl KeyValueStore for UnreliableStore {
		fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<serde_json::Value>> {
			if self.failing.load(Ordering::SeqCst) {
				return Box::pin(async {
					Err(StoreError::Backend { message: "storage offline".into() })
				});
			}

			self.inner.get(key)
		}

		fn set<'a>(&'a self, key: &'a str, value: serde_json::Value) -> StoreFuture<'a, ()> {
			self.inner.set(key, value)
		}

		fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
			self.inner.remove(key)
		}

		fn lists_keys(&self) -> bool {
			self.inner.lists_keys()
		}

		fn keys(&self) -> StoreFuture<'_, Vec<String>> {
			self.inner.keys()
		}
	}

	/// Shared collaborators handed to fixture sessions, so tests can inspect them afterwards.
	#[derive(Clone)]
	pub struct TestHarness {
		/// Deterministic clock shared by every component.
		pub clock: ManualClock,
		/// Credential cache backend.
		pub cache_store: Arc<MemoryStore>,
		/// Transaction backend.
		pub transaction_store: Arc<MemoryStore>,
		/// Renewal lock.
		pub lock: Arc<MemoryLock>,
		/// Token endpoint stub.
		pub endpoint: Arc<StubTokenEndpoint>,
	}
	impl TestHarness {
		/// Harness with fresh in-memory collaborators around `endpoint`.
		pub fn new(endpoint: StubTokenEndpoint) -> Self {
			let clock = ManualClock::new(OffsetDateTime::now_utc());
			let lock_clock: Arc<dyn Clock> = Arc::new(clock.clone());

			Self {
				clock,
				cache_store: Arc::new(MemoryStore::default()),
				transaction_store: Arc::new(MemoryStore::default()),
				lock: Arc::new(MemoryLock::new(lock_clock)),
				endpoint: Arc::new(endpoint),
			}
		}

		/// Builds a session manager over the harness collaborators.
		pub fn session(&self, config: SessionConfig) -> SessionManager {
			let cache_store: Arc<dyn KeyValueStore> = self.cache_store.clone();
			let transaction_store: Arc<dyn KeyValueStore> = self.transaction_store.clone();
			let lock: Arc<dyn NamedLock> = self.lock.clone();
			let endpoint: Arc<dyn TokenEndpoint> = self.endpoint.clone();

			SessionManager::builder(test_descriptor(), config)
				.token_endpoint(endpoint)
				.id_token_verifier(Arc::new(test_verifier()))
				.cache_store(cache_store)
				.transaction_store(transaction_store)
				.lock(lock)
				.clock(Arc::new(self.clock.clone()))
				.build()
				.expect("Fixture session manager should build.")
		}
	}

	#[cfg(feature = "reqwest")]
	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> crate::http::ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		crate::http::ReqwestHttpClient::with_client(client)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
