//! ID-token verification: signature and issuer/audience via `jsonwebtoken`, OIDC claim rules on
//! top.

// crates.io
use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
// self
use crate::{_prelude::*, auth::DecodedClaims};

/// What a returned ID token must satisfy.
#[derive(Clone, Debug)]
pub struct IdTokenExpectations<'a> {
	/// Expected `iss`.
	pub issuer: &'a str,
	/// Expected member of `aud` (the client identifier).
	pub audience: &'a str,
	/// Nonce from the originating transaction; `None` skips the check (renewals).
	pub nonce: Option<&'a str>,
	/// Clock-skew tolerance for time-based claims.
	pub leeway: Duration,
	/// Maximum authentication age; requires `auth_time` when set.
	pub max_age: Option<Duration>,
	/// Instant the checks are evaluated at.
	pub now: OffsetDateTime,
}

/// Verifies raw ID tokens.
pub trait IdTokenVerifier
where
	Self: Send + Sync,
{
	/// Checks `raw` against `expected` and returns its claims.
	fn verify(
		&self,
		raw: &str,
		expected: &IdTokenExpectations<'_>,
	) -> Result<DecodedClaims, ValidationError>;
}

/// Reasons an ID token is rejected.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ValidationError {
	/// Token is not a decodable JWT.
	#[error("ID token is malformed: {message}.")]
	Malformed {
		/// Decoder message.
		message: String,
	},
	/// Signature or algorithm check failed.
	#[error("ID token signature is invalid.")]
	Signature,
	/// Header algorithm is not accepted by this verifier.
	#[error("ID token algorithm `{algorithm}` is not accepted.")]
	UnsupportedAlgorithm {
		/// Header algorithm.
		algorithm: String,
	},
	/// A required claim is absent.
	#[error("ID token is missing the `{claim}` claim.")]
	MissingClaim {
		/// Claim name.
		claim: String,
	},
	/// `iss` does not match the provider.
	#[error("ID token issuer does not match `{expected}`.")]
	IssuerMismatch {
		/// Expected issuer.
		expected: String,
	},
	/// `aud` does not include the client.
	#[error("ID token audience does not include `{expected}`.")]
	AudienceMismatch {
		/// Expected audience member.
		expected: String,
	},
	/// Multi-audience token whose `azp` is not the client.
	#[error("ID token authorized party does not match `{expected}`.")]
	AuthorizedPartyMismatch {
		/// Expected authorized party.
		expected: String,
	},
	/// `nonce` differs from the transaction.
	#[error("ID token nonce does not match the transaction.")]
	NonceMismatch,
	/// `exp` (plus leeway) has passed.
	#[error("ID token has expired.")]
	Expired,
	/// `nbf` (minus leeway) is still in the future.
	#[error("ID token is not valid yet.")]
	NotYetValid,
	/// `auth_time` is older than the permitted maximum age.
	#[error("End-user authentication is older than the permitted maximum age.")]
	AuthenticationTooOld,
}

/// [`IdTokenVerifier`] backed by a fixed `jsonwebtoken` key.
#[derive(Clone)]
pub struct JwtIdTokenVerifier {
	key: DecodingKey,
	algorithms: Vec<Algorithm>,
}
impl JwtIdTokenVerifier {
	/// Verifier accepting `algorithms` signed with `key`.
	pub fn new(key: DecodingKey, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
		Self { key, algorithms: algorithms.into_iter().collect() }
	}

	/// HS256 verifier sharing `secret` with the provider.
	pub fn hs256(secret: &[u8]) -> Self {
		Self::new(DecodingKey::from_secret(secret), [Algorithm::HS256])
	}

	/// RS256 verifier for a PEM-encoded public key.
	pub fn rs256_pem(pem: &[u8]) -> Result<Self, ValidationError> {
		let key = DecodingKey::from_rsa_pem(pem)
			.map_err(|e| ValidationError::Malformed { message: e.to_string() })?;

		Ok(Self::new(key, [Algorithm::RS256]))
	}
}
impl IdTokenVerifier for JwtIdTokenVerifier {
	fn verify(
		&self,
		raw: &str,
		expected: &IdTokenExpectations<'_>,
	) -> Result<DecodedClaims, ValidationError> {
		let header = jsonwebtoken::decode_header(raw).map_err(map_jwt_error)?;

		if !self.algorithms.contains(&header.alg) {
			return Err(ValidationError::UnsupportedAlgorithm {
				algorithm: format!("{:?}", header.alg),
			});
		}

		let mut validation = Validation::new(header.alg);

		// Time claims are checked below against the injected clock.
		validation.validate_exp = false;
		validation.validate_nbf = false;
		validation.leeway = 0;
		validation.set_issuer(&[expected.issuer]);
		validation.set_audience(&[expected.audience]);
		validation.set_required_spec_claims(&["iss", "aud", "sub"]);

		let claims = jsonwebtoken::decode::<DecodedClaims>(raw, &self.key, &validation)
			.map_err(|e| match e.kind() {
				ErrorKind::InvalidIssuer =>
					ValidationError::IssuerMismatch { expected: expected.issuer.to_owned() },
				ErrorKind::InvalidAudience =>
					ValidationError::AudienceMismatch { expected: expected.audience.to_owned() },
				_ => map_jwt_error(e),
			})?
			.claims;

		check_claims(&claims, expected)?;

		Ok(claims)
	}
}
impl Debug for JwtIdTokenVerifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("JwtIdTokenVerifier").field("algorithms", &self.algorithms).finish()
	}
}

/// OIDC claim rules applied after the signature, issuer, and audience checks.
pub fn check_claims(
	claims: &DecodedClaims,
	expected: &IdTokenExpectations<'_>,
) -> Result<(), ValidationError> {
	let now = expected.now.unix_timestamp();
	let leeway = expected.leeway.whole_seconds();

	if claims.sub.is_empty() {
		return Err(missing("sub"));
	}
	if claims.aud.len() > 1 {
		match claims.azp.as_deref() {
			None => return Err(missing("azp")),
			Some(azp) if azp != expected.audience =>
				return Err(ValidationError::AuthorizedPartyMismatch {
					expected: expected.audience.to_owned(),
				}),
			Some(_) => {},
		}
	}
	if let Some(nonce) = expected.nonce {
		match claims.nonce.as_deref() {
			None => return Err(missing("nonce")),
			Some(actual) if actual != nonce => return Err(ValidationError::NonceMismatch),
			Some(_) => {},
		}
	}
	if let Some(max_age) = expected.max_age {
		let auth_time = claims.auth_time.ok_or_else(|| missing("auth_time"))?;

		if now > auth_time.saturating_add(max_age.whole_seconds()).saturating_add(leeway) {
			return Err(ValidationError::AuthenticationTooOld);
		}
	}

	let exp = claims.exp.ok_or_else(|| missing("exp"))?;

	if now > exp.saturating_add(leeway) {
		return Err(ValidationError::Expired);
	}
	if let Some(nbf) = claims.nbf
		&& now < nbf.saturating_sub(leeway)
	{
		return Err(ValidationError::NotYetValid);
	}
	if claims.iat.is_none() {
		return Err(missing("iat"));
	}

	Ok(())
}

fn missing(claim: &str) -> ValidationError {
	ValidationError::MissingClaim { claim: claim.to_owned() }
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> ValidationError {
	match e.kind() {
		ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::InvalidKeyFormat =>
			ValidationError::Signature,
		ErrorKind::MissingRequiredClaim(claim) => ValidationError::MissingClaim { claim: claim.clone() },
		_ => ValidationError::Malformed { message: e.to_string() },
	}
}
