// self
use crate::obs::{FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_session_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_prelude::*;

	#[test]
	fn outcomes_follow_results() {
		let failed: Result<()> = Err(Error::login_required("no session"));

		assert_eq!(FlowOutcome::of(&Ok::<_, Error>(())), FlowOutcome::Success);
		assert_eq!(FlowOutcome::of(&failed), FlowOutcome::Failure);

		record_flow_outcome(FlowKind::GetCredential, FlowOutcome::of(&failed));
	}
}
