//! Validated identifiers for OAuth clients and API audiences.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 256;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (client, audience).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (client, audience).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (client, audience).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { ClientId, "OAuth client identifier registered with the authorization server.", "Client" }
def_id! { Audience, "API audience a credential is requested for.", "Audience" }
impl Audience {
	/// Placeholder audience used when the caller does not name one.
	pub const DEFAULT: &'static str = "default";

	/// Returns the placeholder audience.
	pub fn fallback() -> Self {
		Self(Self::DEFAULT.to_owned())
	}

	/// Returns `true` for the placeholder audience, which is never sent to the provider.
	pub fn is_fallback(&self) -> bool {
		self.0 == Self::DEFAULT
	}

	/// Resolves an optional caller-supplied audience, falling back to `default`.
	pub fn resolve(value: Option<&str>) -> Result<Self, IdentifierError> {
		match value {
			Some(raw) if !raw.is_empty() => Self::new(raw),
			_ => Ok(Self::fallback()),
		}
	}
}
impl Default for Audience {
	fn default() -> Self {
		Self::fallback()
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn client_ids_reject_padding_and_blanks() {
		assert!(ClientId::new(" spa-client").is_err(), "Leading whitespace must be rejected.");
		assert!(ClientId::new("").is_err());

		let client = ClientId::new("spa-client").expect("Client fixture should be valid.");

		assert_eq!(client.as_ref(), "spa-client");
		assert!(serde_json::from_str::<ClientId>("\"with space\"").is_err());
	}

	#[test]
	fn audiences_fall_back_to_placeholder() {
		assert!(Audience::resolve(None).expect("Missing audience should resolve.").is_fallback());
		assert!(Audience::resolve(Some("")).expect("Empty audience should resolve.").is_fallback());

		let api = Audience::resolve(Some("https://api.example.com"))
			.expect("URL audiences should be valid.");

		assert!(!api.is_fallback());
		assert_eq!(Audience::default().as_ref(), "default");
		assert!(Audience::new("a".repeat(IDENTIFIER_MAX_LEN + 1)).is_err());
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<ClientId, u8> = HashMap::from_iter([(
			ClientId::new("spa-client").expect("Client used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("spa-client"), Some(&7));
	}
}
