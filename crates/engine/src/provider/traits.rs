//! Provider adapter trait.

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::descriptor::ProviderDescriptor;
use crate::errors::ProviderError;
use crate::models::{Capability, ProviderPayload, ProviderRequest};

/// An external data provider.
///
/// Implement this trait to plug a new data source into the engine. The
/// registry reads the descriptor to decide when the provider is eligible;
/// the fanout executor calls [`fetch`](AnalysisProvider::fetch) once per
/// requested capability the provider supports.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use vantage_engine::provider::{AnalysisProvider, ProviderDescriptor};
///
/// struct ChainScanner {
///     descriptor: ProviderDescriptor,
/// }
///
/// #[async_trait]
/// impl AnalysisProvider for ChainScanner {
///     fn descriptor(&self) -> &ProviderDescriptor {
///         &self.descriptor
///     }
///
///     async fn fetch(&self, request: &ProviderRequest<'_>) -> Result<ProviderPayload, ProviderError> {
///         // call the API for request.capability
///     }
/// }
/// ```
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Unique identifier, used for provenance, rate limiting and circuit
    /// breaker tracking.
    fn id(&self) -> &str {
        &self.descriptor().name
    }

    fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.descriptor().capabilities
    }

    /// Whether the provider can be called at all (e.g. credentials present).
    fn is_available(&self) -> bool {
        self.descriptor().has_credentials
    }

    /// Fetch the raw payload for one capability.
    ///
    /// Failures are typed; the engine never sees a panic or an untyped
    /// error from an adapter.
    async fn fetch(&self, request: &ProviderRequest<'_>) -> Result<ProviderPayload, ProviderError>;
}
