// self
use crate::{
	_prelude::*,
	auth::ClientId,
	obs::{self, FlowKind, FlowOutcome},
};

/// Instrumented future when tracing is enabled, the future itself otherwise.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Instrumented future when tracing is enabled, the future itself otherwise.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span around one session operation of one client.
///
/// The `outcome` field stays empty until [`finish`](Self::finish) records it.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	kind: FlowKind,
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Opens a span for `kind` on behalf of `client_id`.
	pub fn new(kind: FlowKind, client_id: &ClientId) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"oauth2_session.flow",
				flow = kind.as_str(),
				client_id = %client_id,
				outcome = tracing::field::Empty,
			);

			Self { kind, span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = client_id;

			Self { kind }
		}
	}

	/// Opens the span and counts an attempt.
	pub fn begin(kind: FlowKind, client_id: &ClientId) -> Self {
		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		Self::new(kind, client_id)
	}

	/// Records the outcome of `result` on the span and the flow counter.
	pub fn finish<T>(&self, result: &Result<T>) {
		let outcome = FlowOutcome::of(result);

		#[cfg(feature = "tracing")]
		self.span.record("outcome", outcome.as_str());

		obs::record_flow_outcome(self.kind, outcome);
	}

	/// Enters the span for a synchronous section.
	pub fn entered(self) -> FlowSpanGuard {
		#[cfg(feature = "tracing")]
		{
			FlowSpanGuard { _guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			FlowSpanGuard {}
		}
	}

	/// Runs `fut` inside the span; no guard is held across `.await`.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Guard returned by [`FlowSpan::entered`].
pub struct FlowSpanGuard {
	#[cfg(feature = "tracing")]
	_guard: tracing::span::EnteredSpan,
}
impl Debug for FlowSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FlowSpanGuard(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn client() -> ClientId {
		ClientId::new("spa").expect("Client fixture should be valid.")
	}

	#[tokio::test]
	async fn spans_pass_results_through() {
		let span = FlowSpan::begin(FlowKind::GetCredential, &client());
		let result: Result<u8> = span.instrument(async { Ok(42) }).await;

		span.finish(&result);

		assert_eq!(result.ok(), Some(42));

		let _guard = FlowSpan::new(FlowKind::Logout, &client()).entered();
	}
}
