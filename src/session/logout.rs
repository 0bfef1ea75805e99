//! Logout: local state teardown and the provider's end-session URL.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	obs::{FlowKind, FlowSpan},
	session::SessionManager,
};

/// Caller input for [`SessionManager::logout`].
#[derive(Clone, Debug, Default)]
pub struct LogoutOptions {
	/// Clears local state only and returns no URL.
	pub local_only: bool,
	/// Asks the provider to also end the upstream identity provider session.
	pub federated: bool,
	/// Where the provider sends the user afterwards.
	pub return_to: Option<Url>,
}
impl LogoutOptions {
	fn validate(&self) -> Result<(), ConfigError> {
		if self.local_only && self.federated {
			return Err(ConfigError::ConflictingLogoutOptions);
		}

		Ok(())
	}
}

impl SessionManager {
	/// End-session URL carrying `client_id`, `returnTo`, and a bare `federated` flag.
	pub fn build_logout_url(&self, options: &LogoutOptions) -> Result<Url> {
		let _span = FlowSpan::new(FlowKind::Logout, &self.config.client_id).entered();

		options.validate()?;

		let mut url = self
			.descriptor
			.endpoints
			.end_session
			.clone()
			.ok_or(ConfigError::MissingEndSessionEndpoint)?;

		{
			let mut pairs = url.query_pairs_mut();

			pairs.append_pair("client_id", &self.config.client_id);

			if let Some(return_to) = &options.return_to {
				pairs.append_pair("returnTo", return_to.as_str());
			}
		}

		if options.federated {
			let query = match url.query() {
				Some(query) if !query.is_empty() => format!("{query}&federated"),
				_ => "federated".to_owned(),
			};

			url.set_query(Some(&query));
		}

		Ok(url)
	}

	/// Clears local session state and returns the end-session URL to navigate to.
	///
	/// Returns `Ok(None)` for local-only logouts.
	pub async fn logout(&self, options: LogoutOptions) -> Result<Option<Url>> {
		let span = FlowSpan::begin(FlowKind::Logout, &self.config.client_id);
		let result = span
			.instrument(async move {
				options.validate()?;

				let url =
					if options.local_only { None } else { Some(self.build_logout_url(&options)?) };

				self.invalidate().await?;

				Ok(url)
			})
			.await;

		span.finish(&result);

		result
	}
}
