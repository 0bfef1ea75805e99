//! Pending authorization transactions persisted between redirect and callback.

// self
use crate::{
	_prelude::*,
	auth::{Audience, ClientId, ScopeSet, TokenSecret},
	store::{self, KeyValueStore},
};

/// State captured when an authorization redirect begins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
	/// Anti-CSRF `state`; absent for transactions written by stateless integrations.
	#[serde(default)]
	pub state: Option<String>,
	/// Nonce the returned ID token must echo.
	pub nonce: String,
	/// PKCE verifier matching the challenge sent with the redirect.
	#[serde(default)]
	pub code_verifier: Option<TokenSecret>,
	/// Audience requested for the resulting credential.
	#[serde(default)]
	pub audience: Audience,
	/// Normalized scope requested for the resulting credential.
	#[serde(default)]
	pub scope: ScopeSet,
	/// Redirect URI the code is bound to.
	#[serde(default)]
	pub redirect_uri: Option<Url>,
	/// Caller state returned once the transaction completes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub app_state: Option<serde_json::Value>,
	/// Creation instant.
	pub created_at: OffsetDateTime,
}

/// Stores at most one pending [`Transaction`] per client.
#[derive(Clone)]
pub struct TransactionStore {
	store: Arc<dyn KeyValueStore>,
	storage_key: String,
}
impl TransactionStore {
	/// Creates the transaction slot of `client_id`.
	pub fn new(store: Arc<dyn KeyValueStore>, client_id: &ClientId) -> Self {
		Self { store, storage_key: format!("oauth2_session.tx.{client_id}") }
	}

	/// Persists `transaction`, replacing any pending one.
	pub async fn create(&self, transaction: &Transaction) -> Result<()> {
		store::set_typed(self.store.as_ref(), &self.storage_key, transaction).await?;

		Ok(())
	}

	/// Loads the pending transaction.
	pub async fn get(&self) -> Result<Option<Transaction>> {
		Ok(store::get_typed(self.store.as_ref(), &self.storage_key).await?)
	}

	/// Drops the pending transaction.
	pub async fn remove(&self) -> Result<()> {
		self.store.remove(&self.storage_key).await?;

		Ok(())
	}
}
impl Debug for TransactionStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TransactionStore").field("storage_key", &self.storage_key).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::MemoryStore;

	fn transaction() -> Transaction {
		Transaction {
			state: Some("state-1".into()),
			nonce: "nonce-1".into(),
			code_verifier: Some("verifier".into()),
			audience: Audience::new("api").expect("Audience fixture should be valid."),
			scope: ScopeSet::merge([Some("openid profile")]),
			redirect_uri: Some(
				Url::parse("https://app.example.com/cb").expect("Redirect fixture should parse."),
			),
			app_state: Some(serde_json::json!({ "return_to": "/inbox" })),
			created_at: OffsetDateTime::now_utc(),
		}
	}

	#[tokio::test]
	async fn one_slot_per_client() {
		let store = MemoryStore::default();
		let transactions = TransactionStore::new(
			Arc::new(store.clone()),
			&ClientId::new("spa").expect("Client fixture should be valid."),
		);
		let first = transaction();
		let second = Transaction { state: Some("state-2".into()), ..transaction() };

		transactions.create(&first).await.expect("Create should succeed.");
		transactions.create(&second).await.expect("Create should succeed.");

		assert_eq!(transactions.get().await.expect("Load should succeed."), Some(second));
		assert!(store.raw("oauth2_session.tx.spa").is_some());

		transactions.remove().await.expect("Remove should succeed.");

		assert_eq!(transactions.get().await.expect("Load should succeed."), None);
	}

	#[tokio::test]
	async fn legacy_payloads_without_state_decode() {
		let store = MemoryStore::default();
		let transactions = TransactionStore::new(
			Arc::new(store.clone()),
			&ClientId::new("spa").expect("Client fixture should be valid."),
		);
		let mut raw = serde_json::to_value(transaction()).expect("Fixture should encode.");

		if let Some(object) = raw.as_object_mut() {
			object.remove("state");
			object.remove("code_verifier");
			object.remove("audience");
		}

		store.set("oauth2_session.tx.spa", raw).await.expect("Raw write should succeed.");

		let loaded = transactions
			.get()
			.await
			.expect("Load should succeed.")
			.expect("Transaction should be present.");

		assert_eq!(loaded.state, None);
		assert_eq!(loaded.code_verifier, None);
		assert!(loaded.audience.is_fallback());
	}
}
