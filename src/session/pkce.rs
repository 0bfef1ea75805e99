//! PKCE verifiers, S256 challenges, and the random `state` and `nonce` values of a transaction.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

pub(crate) const STATE_LEN: usize = 43;
pub(crate) const NONCE_LEN: usize = 43;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

#[derive(Clone)]
pub(crate) struct PkcePair {
	pub(crate) verifier: String,
	pub(crate) challenge: String,
	pub(crate) method: PkceCodeChallengeMethod,
}
impl PkcePair {
	pub(crate) fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}
}

pub(crate) fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn challenge_matches_rfc7636_example() {
		assert_eq!(
			compute_pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
			"E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
		);
	}

	#[test]
	fn generated_pairs_are_unique() {
		let first = PkcePair::generate();
		let second = PkcePair::generate();

		assert_eq!(first.verifier.len(), PKCE_VERIFIER_LEN);
		assert_ne!(first.verifier, second.verifier);
		assert_eq!(first.challenge, compute_pkce_challenge(&first.verifier));
		assert_eq!(first.method.as_str(), "S256");
	}
}
