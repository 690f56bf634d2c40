//! Telemetry metric name constants.
//!
//! Centralised metric names for ollamux operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `ollamux_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider` — provider name (e.g. "openrouter", "groq")
//! - `status` — outcome: "ok" or "error"

/// Total dispatch loops completed.
///
/// Labels: `status` ("ok" | "error").
pub const DISPATCH_TOTAL: &str = "ollamux_dispatch_total";

/// End-to-end dispatch duration in seconds, from the first provider
/// attempt to the terminal chunk.
pub const DISPATCH_DURATION_SECONDS: &str = "ollamux_dispatch_duration_seconds";

/// Total failovers — a provider attempt was abandoned and the loop
/// reselected.
///
/// Labels: `provider` (the provider that failed).
pub const FAILOVERS_TOTAL: &str = "ollamux_failovers_total";

/// Time spent waiting for a provider's rate-limit slot, in seconds.
///
/// Labels: `provider`.
pub const PROVIDER_WAIT_SECONDS: &str = "ollamux_provider_wait_seconds";
