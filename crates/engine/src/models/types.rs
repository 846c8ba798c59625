use std::borrow::Cow;

/// Provider identifier - static for built-in adapters, owned for configured ones
pub type ProviderId = Cow<'static, str>;

/// Capability name (e.g. "tokens", "performance")
pub type Capability = String;

/// Canonical metric key within a capability (e.g. "token_count")
pub type MetricKey = String;

/// Domain or network qualifier (e.g. "web", "ethereum")
pub type Domain = String;
