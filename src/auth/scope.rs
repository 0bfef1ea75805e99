//! Normalized scope sets used for cache keys and request composition.

// std
use std::collections::BTreeSet;
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeSeq};
// self
use crate::_prelude::*;

/// Errors emitted when validating explicit scope entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Deduplicated, sorted set of OAuth scopes.
///
/// Two scope strings that differ only in ordering, duplication, or whitespace normalize to the
/// same set, which is what makes them usable as cache-key components.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeSet(Arc<[String]>);
impl ScopeSet {
	/// Creates a normalized scope set from explicit entries.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut set = BTreeSet::new();

		for scope in scopes {
			let owned: String = scope.into();

			if owned.is_empty() {
				return Err(ScopeValidationError::Empty);
			}
			if owned.chars().any(char::is_whitespace) {
				return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
			}

			set.insert(owned);
		}

		Ok(Self::from_set(set))
	}

	/// Merges any number of space-delimited scope strings.
	///
	/// Missing and blank inputs contribute nothing.
	pub fn merge<'a, I>(parts: I) -> Self
	where
		I: IntoIterator<Item = Option<&'a str>>,
	{
		Self::from_set(
			parts.into_iter().flatten().flat_map(str::split_whitespace).map(str::to_owned).collect(),
		)
	}

	/// Returns the union of `self` and `other`.
	pub fn union(&self, other: &Self) -> Self {
		Self::from_set(self.iter().chain(other.iter()).map(str::to_owned).collect())
	}

	/// Returns a copy with `scope` added.
	pub fn with(&self, scope: &str) -> Self {
		Self::merge([Some(self.normalized().as_str()), Some(scope)])
	}

	/// Returns `true` if every scope in `other` is also present in `self`.
	pub fn is_superset_of(&self, other: &Self) -> bool {
		other.iter().all(|scope| self.contains(scope))
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns true if the normalized set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.0.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}

	/// Space-delimited wire representation.
	pub fn normalized(&self) -> String {
		self.0.join(" ")
	}

	fn from_set(set: BTreeSet<String>) -> Self {
		Self(Arc::from(set.into_iter().collect::<Vec<_>>()))
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.0).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = std::convert::Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self::merge([Some(s)]))
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut seq = serializer.serialize_seq(Some(self.0.len()))?;

		for scope in self.0.iter() {
			seq.serialize_element(scope)?;
		}

		seq.end()
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::new(values).map_err(DeError::custom)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn whitespace_and_order_do_not_matter() {
		let lhs = ScopeSet::merge([Some("  profile openid   email profile ")]);
		let rhs = ScopeSet::merge([Some("openid"), None, Some("email\tprofile")]);

		assert_eq!(lhs, rhs);
		assert_eq!(lhs.normalized(), "email openid profile");
		assert!(ScopeSet::merge([Some("   ")]).is_empty());
	}

	#[test]
	fn explicit_entries_are_validated() {
		assert!(matches!(
			ScopeSet::new([" profile "]),
			Err(ScopeValidationError::ContainsWhitespace { .. })
		));
		assert_eq!(ScopeSet::new([""]), Err(ScopeValidationError::Empty));
	}

	#[test]
	fn union_and_superset_follow_set_semantics() {
		let base = ScopeSet::merge([Some("openid profile")]);
		let wide = base.union(&ScopeSet::merge([Some("read:messages")])).with("offline_access");

		assert_eq!(wide.len(), 4);
		assert!(wide.is_superset_of(&base));
		assert!(!base.is_superset_of(&wide));
		assert!(base.is_superset_of(&ScopeSet::default()));
	}

	#[test]
	fn serde_uses_sorted_arrays() {
		let scopes = ScopeSet::merge([Some("write read")]);
		let json = serde_json::to_string(&scopes).expect("Scope set should serialize.");

		assert_eq!(json, "[\"read\",\"write\"]");
		assert_eq!(
			serde_json::from_str::<ScopeSet>(&json).expect("Scope set should deserialize."),
			scopes
		);
		assert!(serde_json::from_str::<ScopeSet>("[\"bad scope\"]").is_err());
	}
}
