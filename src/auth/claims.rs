//! Decoded ID-token claims and the user profile derived from them.

// crates.io
use serde::Deserializer;
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// Registered and protocol claims stripped from the user profile.
const PROTOCOL_CLAIMS: &[&str] = &[
	"iss", "aud", "exp", "nbf", "iat", "jti", "azp", "nonce", "auth_time", "at_hash", "c_hash",
	"acr", "amr", "sub_jwk", "cnf", "sid", "vot", "vtm",
];

/// Claims carried by a validated ID token.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedClaims {
	/// Issuer.
	pub iss: String,
	/// Subject.
	pub sub: String,
	/// Audience; a single string on the wire is normalized to one entry.
	#[serde(default, deserialize_with = "one_or_many")]
	pub aud: Vec<String>,
	/// Authorized party.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub azp: Option<String>,
	/// Expiry (seconds since epoch).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exp: Option<i64>,
	/// Not-before (seconds since epoch).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nbf: Option<i64>,
	/// Issued-at (seconds since epoch).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub iat: Option<i64>,
	/// Time of the end-user authentication (seconds since epoch).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auth_time: Option<i64>,
	/// Nonce echoed from the authorization request.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nonce: Option<String>,
	/// Organization identifier, when the provider issues one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub org_id: Option<String>,
	/// Remaining claims.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl DecodedClaims {
	/// User profile: the subject, the organization, and every non-protocol claim.
	pub fn user(&self) -> Map<String, Value> {
		let mut user = Map::new();

		user.insert("sub".into(), Value::from(self.sub.clone()));

		if let Some(org_id) = &self.org_id {
			user.insert("org_id".into(), Value::from(org_id.clone()));
		}

		user.extend(
			self.extra
				.iter()
				.filter(|(name, _)| !PROTOCOL_CLAIMS.contains(&name.as_str()))
				.map(|(name, value)| (name.clone(), value.clone())),
		);

		user
	}
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		One(String),
		Many(Vec<String>),
	}

	Ok(match Raw::deserialize(deserializer)? {
		Raw::One(value) => vec![value],
		Raw::Many(values) => values,
	})
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn audience_accepts_string_or_array() {
		let single: DecodedClaims =
			serde_json::from_str(r#"{"iss":"i","sub":"s","aud":"client"}"#)
				.expect("Single audience should decode.");
		let many: DecodedClaims =
			serde_json::from_str(r#"{"iss":"i","sub":"s","aud":["client","api"]}"#)
				.expect("Audience array should decode.");

		assert_eq!(single.aud, vec!["client"]);
		assert_eq!(many.aud, vec!["client", "api"]);
	}

	#[test]
	fn user_profile_drops_protocol_claims() {
		let claims: DecodedClaims = serde_json::from_str(
			r#"{"iss":"i","sub":"user-1","aud":"c","nonce":"n","exp":10,"org_id":"org-9",
				"jti":"abc","at_hash":"h","name":"Ada","email":"ada@example.com"}"#,
		)
		.expect("Claims fixture should decode.");
		let user = claims.user();

		assert_eq!(user.get("sub"), Some(&Value::from("user-1")));
		assert_eq!(user.get("org_id"), Some(&Value::from("org-9")));
		assert_eq!(user.get("name"), Some(&Value::from("Ada")));
		assert!(user.get("jti").is_none());
		assert!(user.get("at_hash").is_none());
		assert!(user.get("nonce").is_none());
		assert_eq!(user.len(), 4);
	}
}
