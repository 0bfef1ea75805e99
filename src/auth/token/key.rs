//! Credential cache keys derived from client, audience, and scope.

// self
use crate::{
	_prelude::*,
	auth::{Audience, ClientId, ScopeSet},
};

/// Prefix shared by every credential entry written to a key-value store.
pub const CACHE_KEY_PREFIX: &str = "@@oauth2_session@@";

/// Identity of a cached credential: `(client_id, audience, normalized scope)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialKey {
	/// OAuth client the credential was issued to.
	pub client_id: ClientId,
	/// API audience; `default` when the caller named none.
	pub audience: Audience,
	/// Normalized scope set.
	pub scope: ScopeSet,
}
impl CredentialKey {
	/// Creates a key from its components.
	pub fn new(client_id: ClientId, audience: Audience, scope: ScopeSet) -> Self {
		Self { client_id, audience, scope }
	}

	/// Store key of the form `@@oauth2_session@@::{client_id}::{audience}::{scope}`.
	pub fn storage_key(&self) -> String {
		format!("{}{}::{}", client_prefix(&self.client_id), self.audience, self.scope)
	}

	/// Parses a store key produced by [`storage_key`](Self::storage_key).
	///
	/// Returns `None` for keys that do not belong to the credential namespace.
	pub fn parse_storage_key(raw: &str) -> Option<Self> {
		let rest = raw.strip_prefix(CACHE_KEY_PREFIX)?.strip_prefix("::")?;
		let (client_id, rest) = rest.split_once("::")?;
		let (audience, scope) = rest.rsplit_once("::")?;

		Some(Self {
			client_id: ClientId::new(client_id).ok()?,
			audience: Audience::new(audience).ok()?,
			scope: ScopeSet::merge([Some(scope)]),
		})
	}

	/// Returns `true` when a record stored under `self` can serve a request for `requested`.
	///
	/// Client and audience must match exactly; the stored scope must include every requested
	/// scope.
	pub fn covers(&self, requested: &Self) -> bool {
		self.client_id == requested.client_id
			&& self.audience == requested.audience
			&& self.scope.is_superset_of(&requested.scope)
	}
}
impl Display for CredentialKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.storage_key())
	}
}

/// Store-key prefix shared by every credential of `client_id`.
pub fn client_prefix(client_id: &ClientId) -> String {
	format!("{CACHE_KEY_PREFIX}::{client_id}::")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn key(audience: &str, scope: &str) -> CredentialKey {
		CredentialKey::new(
			ClientId::new("spa").expect("Client fixture should be valid."),
			Audience::new(audience).expect("Audience fixture should be valid."),
			ScopeSet::merge([Some(scope)]),
		)
	}

	#[test]
	fn storage_keys_round_trip_with_url_audiences() {
		let key = key("https://api.example.com/v1", "read openid");
		let raw = key.storage_key();

		assert_eq!(raw, "@@oauth2_session@@::spa::https://api.example.com/v1::openid read");
		assert_eq!(CredentialKey::parse_storage_key(&raw), Some(key));
		assert_eq!(CredentialKey::parse_storage_key("oauth2_session.tx.spa"), None);
		assert_eq!(CredentialKey::parse_storage_key("@@oauth2_session@@::spa"), None);
	}

	#[test]
	fn whitespace_variants_share_a_key() {
		assert_eq!(key("api", "openid  read").storage_key(), key("api", " read openid ").storage_key());
	}

	#[test]
	fn coverage_requires_matching_audience() {
		let wide = key("api", "openid read write");

		assert!(wide.covers(&key("api", "read openid")));
		assert!(!wide.covers(&key("other", "read")));
		assert!(!key("api", "openid").covers(&wide));
	}
}
