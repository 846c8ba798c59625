//! Provider adapters.
//!
//! - `traits` - The `AnalysisProvider` trait every adapter implements
//! - `descriptor` - Static provider descriptors (capabilities, domains, reliability, quota)
//! - `http_json` - Configuration-driven HTTP/JSON adapter

mod descriptor;
mod http_json;
mod traits;

pub use descriptor::{ProviderDescriptor, RateQuota, DEFAULT_RELIABILITY};
pub use http_json::{
    load_provider_configs, render_url, HttpEndpointConfig, HttpJsonProvider,
    HttpJsonProviderConfig,
};
pub use traits::AnalysisProvider;
