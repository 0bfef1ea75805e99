// std
use std::{env, path::PathBuf, process};
// self
use oauth2_session::{
	_preludet::*,
	auth::ClientId,
	clock::{Clock, ManualClock},
	lock::FileLock,
	oauth::TokenEndpoint,
	session::{
		AuthorizationResponse, AuthorizeOptions, CredentialRequest, SessionConfig, SessionManager,
	},
	store::FileStore,
};

struct Context {
	dir: PathBuf,
	clock: ManualClock,
	endpoint: Arc<StubTokenEndpoint>,
}
impl Context {
	fn new(label: &str) -> Self {
		let dir = env::temp_dir().join(format!(
			"oauth2_session_{label}_{}_{}",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		));

		Self {
			dir,
			clock: ManualClock::new(OffsetDateTime::now_utc()),
			endpoint: Arc::new(
				StubTokenEndpoint::unreachable().with_delay(std::time::Duration::from_millis(20)),
			),
		}
	}

	/// A manager as another process would build it: its own handles on the same files.
	fn session(&self, config: SessionConfig) -> SessionManager {
		let clock: Arc<dyn Clock> = Arc::new(self.clock.clone());
		let endpoint: Arc<dyn TokenEndpoint> = self.endpoint.clone();
		let store = FileStore::open(self.dir.join("session.json")).expect("File store should open.");
		let lock = FileLock::new(self.dir.join("locks"), clock.clone()).expect("File lock should open.");

		SessionManager::builder(test_descriptor(), config)
			.token_endpoint(endpoint)
			.id_token_verifier(Arc::new(test_verifier()))
			.cache_store(Arc::new(store.clone()))
			.transaction_store(Arc::new(store))
			.lock(Arc::new(lock))
			.clock(clock)
			.build()
			.expect("Session should build.")
	}

	async fn sign_in(&self, session: &SessionManager, lifetime: Duration) {
		let now = self.clock.now();
		let request = session
			.begin_transaction(AuthorizeOptions::default())
			.await
			.expect("Transaction should begin.");

		self.endpoint.push(Ok(token_response(
			now,
			Some(&request.nonce),
			"access-0",
			Some("refresh-0"),
			lifetime,
		)));
		session
			.complete_transaction(AuthorizationResponse::code("abc", request.state))
			.await
			.expect("Sign-in should complete.");
	}
}
impl Drop for Context {
	fn drop(&mut self) {
		let _ = std::fs::remove_dir_all(&self.dir);
	}
}

fn shared_config() -> SessionConfig {
	SessionConfig::builder(
		ClientId::new(TEST_CLIENT_ID).expect("Fixture client identifier should be valid."),
	)
	.redirect_uri(Url::parse("https://app.example.com/callback").expect("URL should parse."))
	.allow_shared_refresh_tokens(true)
	.build()
	.expect("Config should build.")
}

#[tokio::test]
async fn contexts_on_shared_files_renew_once() {
	let context = Context::new("renew_once");
	let first = context.session(shared_config());
	let second = context.session(shared_config());

	context.sign_in(&first, Duration::seconds(20)).await;

	assert!(second.has_valid_session().await.expect("Session check should succeed."));

	let now = context.clock.now();

	context.endpoint.push(Ok(token_response(now, None, "access-1", None, Duration::hours(1))));

	let (a, b) = tokio::join!(
		first.get_credential(CredentialRequest::new()),
		second.get_credential(CredentialRequest::new()),
	);

	assert_eq!(a.expect("First context should renew.").access_token.expose(), "access-1");
	assert_eq!(b.expect("Second context should reuse the renewal.").access_token.expose(), "access-1");
	assert_eq!(context.endpoint.calls(), 2, "One code exchange plus one refresh.");
}

#[tokio::test]
async fn shared_files_keep_refresh_tokens_out_by_default() {
	let context = Context::new("no_refresh");
	let session = context.session(test_config());

	context.sign_in(&session, Duration::seconds(20)).await;

	let err = session
		.get_credential(CredentialRequest::new().force_refresh())
		.await
		.expect_err("Without a persisted refresh token renewal requires login.");

	assert!(err.is_login_required());
	assert_eq!(context.endpoint.calls(), 1);
}
