//! Auth-domain identifiers, scope sets, ID-token claims, and credential models.

pub mod claims;
pub mod id;
pub mod scope;
pub mod token {
	//! Credential keys, records, and redacted secrets.

	pub mod key;
	pub mod record;
	pub mod secret;
}

pub use claims::*;
pub use id::*;
pub use scope::*;
pub use token::{key::*, record::*, secret::*};
