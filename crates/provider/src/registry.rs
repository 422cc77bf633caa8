use std::collections::HashMap;
use std::sync::Arc;

use watchloop_core::ids::ProviderId;

use crate::provider::FetchProvider;

/// Holds every configured provider by id. The orchestrator asks the
/// registry for a provider by id and builds candidate order itself
/// (§4.8) — the registry does not encode any ordering policy.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderId, Arc<dyn FetchProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn FetchProvider>) {
        self.providers.insert(provider.id(), provider);
    }

    pub fn get(&self, id: &ProviderId) -> Option<Arc<dyn FetchProvider>> {
        self.providers.get(id).cloned()
    }

    pub fn contains(&self, id: &ProviderId) -> bool {
        self.providers.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use crate::error::ProviderError;
    use crate::request::{FetchRequest, FetchResult};

    use super::*;

    struct StubProvider(&'static str);

    #[async_trait]
    impl FetchProvider for StubProvider {
        fn id(&self) -> ProviderId {
            ProviderId::new(self.0)
        }

        async fn fetch(&self, _request: &FetchRequest) -> Result<FetchResult, ProviderError> {
            Ok(FetchResult::default())
        }
    }

    #[test]
    fn register_then_get_round_trips() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider("http")));
        assert!(registry.contains(&ProviderId::new("http")));
        assert!(registry.get(&ProviderId::new("http")).is_some());
        assert!(registry.get(&ProviderId::new("brightdata")).is_none());
    }
}
