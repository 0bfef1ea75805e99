//! Cached credential records, lifecycle helpers, and builders.

// self
use crate::{
	_prelude::*,
	auth::{
		DecodedClaims, ScopeSet,
		token::{key::CredentialKey, secret::TokenSecret},
	},
};

/// Lifecycle status of a credential at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// Usable without renewal.
	Active,
	/// Still valid but inside the refresh-ahead window.
	ExpiringSoon,
	/// Past its expiry instant.
	Expired,
}

/// Errors produced by [`CredentialRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialRecordBuilderError {
	/// No raw ID token was provided.
	#[error("ID token is required.")]
	MissingIdToken,
	/// No access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// No expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// The computed lifetime is zero or negative.
	#[error("Credential lifetime must be positive.")]
	NonPositiveLifetime,
	/// The relative expiry overflows the representable date range.
	#[error("Credential lifetime is out of range.")]
	ExpiryOutOfRange,
}

/// Credential stored under a [`CredentialKey`].
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
	/// Cache identity of the record.
	pub key: CredentialKey,
	/// Raw ID token.
	pub id_token: String,
	/// Claims decoded from the ID token.
	pub claims: DecodedClaims,
	/// Access token secret.
	pub access_token: TokenSecret,
	/// Refresh token secret, when issued and allowed to reside here.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Scope reported by the token endpoint, when it differs from the request.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub granted_scope: Option<ScopeSet>,
	/// Local instant the credential was obtained.
	pub issued_at: OffsetDateTime,
	/// Absolute expiry instant.
	pub expires_at: OffsetDateTime,
}
impl CredentialRecord {
	/// Returns a builder for a record stored under `key`.
	pub fn builder(key: CredentialKey, claims: DecodedClaims) -> CredentialRecordBuilder {
		CredentialRecordBuilder::new(key, claims)
	}

	/// Status at `instant`, treating the last `leeway` before expiry as [`ExpiringSoon`].
	///
	/// [`ExpiringSoon`]: CredentialStatus::ExpiringSoon
	pub fn status_at(&self, instant: OffsetDateTime, leeway: Duration) -> CredentialStatus {
		if instant >= self.expires_at {
			return CredentialStatus::Expired;
		}
		if instant + leeway >= self.expires_at {
			return CredentialStatus::ExpiringSoon;
		}

		CredentialStatus::Active
	}

	/// Returns `true` when the record is still valid at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at
	}

	/// Returns `true` when the record remains valid for at least `leeway` past `instant`.
	pub fn is_fresh_at(&self, instant: OffsetDateTime, leeway: Duration) -> bool {
		matches!(self.status_at(instant, leeway), CredentialStatus::Active)
	}

	/// Copy of the record without its refresh token.
	pub fn without_refresh_token(&self) -> Self {
		Self { refresh_token: None, ..self.clone() }
	}
}
impl Debug for CredentialRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialRecord")
			.field("key", &self.key)
			.field("id_token", &"<redacted>")
			.field("sub", &self.claims.sub)
			.field("access_token", &self.access_token)
			.field("refresh_token", &self.refresh_token)
			.field("granted_scope", &self.granted_scope)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`CredentialRecord`].
#[derive(Clone, Debug)]
pub struct CredentialRecordBuilder {
	key: CredentialKey,
	claims: DecodedClaims,
	id_token: Option<String>,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	granted_scope: Option<ScopeSet>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CredentialRecordBuilder {
	fn new(key: CredentialKey, claims: DecodedClaims) -> Self {
		Self {
			key,
			claims,
			id_token: None,
			access_token: None,
			refresh_token: None,
			granted_scope: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Provides the raw ID token.
	pub fn id_token(mut self, token: impl Into<String>) -> Self {
		self.id_token = Some(token.into());

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.access_token = Some(token.into());

		self
	}

	/// Provides the refresh token value, if any.
	pub fn refresh_token(mut self, token: Option<TokenSecret>) -> Self {
		self.refresh_token = token;

		self
	}

	/// Records the scope reported by the token endpoint.
	pub fn granted_scope(mut self, scope: Option<ScopeSet>) -> Self {
		self.granted_scope = scope;

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`CredentialRecord`].
	///
	/// When both an absolute and a relative expiry are supplied, the earlier one wins.
	pub fn build(self) -> Result<CredentialRecord, CredentialRecordBuilderError> {
		let id_token = self.id_token.ok_or(CredentialRecordBuilderError::MissingIdToken)?;
		let access_token =
			self.access_token.ok_or(CredentialRecordBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let relative = match self.expires_in {
			Some(delta) => Some(
				issued_at
					.checked_add(delta)
					.ok_or(CredentialRecordBuilderError::ExpiryOutOfRange)?,
			),
			None => None,
		};
		let expires_at = match (self.expires_at, relative) {
			(Some(absolute), Some(relative)) => absolute.min(relative),
			(Some(instant), None) | (None, Some(instant)) => instant,
			(None, None) => return Err(CredentialRecordBuilderError::MissingExpiry),
		};

		if expires_at <= issued_at {
			return Err(CredentialRecordBuilderError::NonPositiveLifetime);
		}

		Ok(CredentialRecord {
			key: self.key,
			id_token,
			claims: self.claims,
			access_token,
			refresh_token: self.refresh_token,
			granted_scope: self.granted_scope,
			issued_at,
			expires_at,
		})
	}
}
