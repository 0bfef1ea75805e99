// self
use oauth2_session::{
	_preludet::*,
	auth::{Audience, ClientId, ScopeSet, TokenSecret},
	error::{ConfigError, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	oauth::{
		GrantType, OAuth2TokenEndpoint, TokenEndpoint, TokenGrant, TokenRequest,
		TransportErrorMapper,
		oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse},
	},
	provider::ProviderDescriptor,
};

#[derive(Debug)]
enum FakeTransportError {
	Throttled,
}
impl Display for FakeTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Throttled => write!(f, "Transport throttled."),
		}
	}
}
impl StdError for FakeTransportError {}

/// Transport that answers every request with a throttling failure after recording a 429.
#[derive(Clone, Copy)]
struct ThrottledHttpClient {
	retry_after: Duration,
}
impl TokenHttpClient for ThrottledHttpClient {
	type Handle = ThrottledHandle;
	type TransportError = FakeTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ThrottledHandle { slot, retry_after: self.retry_after }
	}
}

struct ThrottledHandle {
	slot: ResponseMetadataSlot,
	retry_after: Duration,
}
impl<'a> AsyncHttpClient<'a> for ThrottledHandle {
	type Error = HttpClientError<FakeTransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'a + Send + Sync>>;

	fn call(&'a self, _request: HttpRequest) -> Self::Future {
		let slot = self.slot.clone();
		let retry_after = self.retry_after;

		Box::pin(async move {
			assert!(slot.take().is_none(), "The metadata slot must start empty.");
			slot.store(ResponseMetadata { status: Some(429), retry_after: Some(retry_after) });

			Err(HttpClientError::Reqwest(Box::new(FakeTransportError::Throttled)))
		})
	}
}

#[derive(Clone, Default)]
struct RecordingMapper {
	seen: Arc<Mutex<Vec<(GrantType, Option<ResponseMetadata>)>>>,
}
impl TransportErrorMapper<FakeTransportError> for RecordingMapper {
	fn map_transport_error(
		&self,
		grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<FakeTransportError>,
	) -> Error {
		self.seen.lock().push((grant, meta.cloned()));

		let status = meta.and_then(|value| value.status);
		let retry_after = meta.and_then(|value| value.retry_after);

		match err {
			HttpClientError::Reqwest(inner) => TransientError::TokenEndpoint {
				message: format!("Fake transport error: {inner}"),
				status,
				retry_after,
			}
			.into(),
			HttpClientError::Http(inner) => ConfigError::http_request(inner).into(),
			HttpClientError::Io(inner) => TransportError::from(inner).into(),
			other => TransientError::TokenEndpoint {
				message: format!("Unhandled transport failure: {other:?}"),
				status,
				retry_after,
			}
			.into(),
		}
	}
}

fn endpoint(
	retry_after: Duration,
	mapper: Arc<RecordingMapper>,
) -> OAuth2TokenEndpoint<ThrottledHttpClient, RecordingMapper> {
	OAuth2TokenEndpoint::from_descriptor(
		&test_descriptor(),
		&ClientId::new(TEST_CLIENT_ID).expect("Client identifier should be valid."),
		None,
		ThrottledHttpClient { retry_after },
		mapper,
	)
	.expect("Endpoint should build.")
}

fn refresh_request() -> TokenRequest {
	TokenRequest {
		grant: TokenGrant::RefreshToken { refresh_token: Some(TokenSecret::new("refresh-0")) },
		audience: Audience::fallback(),
		scope: ScopeSet::merge([Some("openid")]),
		extra_params: BTreeMap::new(),
	}
}

#[tokio::test]
async fn custom_transports_surface_response_metadata() {
	let mapper = Arc::new(RecordingMapper::default());
	let err = endpoint(Duration::seconds(5), mapper.clone())
		.exchange(refresh_request(), Duration::seconds(5))
		.await
		.expect_err("Throttled transports must fail.");

	match &err {
		Error::Transient(TransientError::TokenEndpoint { status, retry_after, .. }) => {
			assert_eq!(*status, Some(429));
			assert_eq!(*retry_after, Some(Duration::seconds(5)));
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	assert!(err.is_retryable());

	let seen = mapper.seen.lock().clone();

	assert_eq!(seen.len(), 1, "The mapper must run once per exchange.");
	assert_eq!(seen[0].0, GrantType::RefreshToken);
	assert_eq!(seen[0].1.as_ref().and_then(|meta| meta.retry_after), Some(Duration::seconds(5)));
}

#[tokio::test]
async fn refresh_grants_without_a_token_never_reach_the_transport() {
	let mapper = Arc::new(RecordingMapper::default());
	let err = endpoint(Duration::seconds(5), mapper.clone())
		.exchange(
			TokenRequest {
				grant: TokenGrant::RefreshToken { refresh_token: None },
				..refresh_request()
			},
			Duration::seconds(5),
		)
		.await
		.expect_err("A refresh grant needs a token.");

	assert!(err.is_login_required());
	assert!(mapper.seen.lock().is_empty());
}

#[test]
fn descriptors_reject_plain_http_endpoints() {
	let err = ProviderDescriptor::builder(TEST_ISSUER)
		.authorization_endpoint(
			Url::parse("https://login.example.com/authorize").expect("URL should parse."),
		)
		.token_endpoint(Url::parse("http://login.example.com/oauth/token").expect("URL should parse."))
		.build()
		.expect_err("Non-loopback HTTP endpoints must be rejected.");

	assert!(err.to_string().contains("must use HTTPS"));
}
