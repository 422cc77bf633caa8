use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::NotificationAdapter;

/// Holds every configured notification adapter by channel name. The Alert
/// Dispatch Handler (C12) looks channels up here for each name listed on
/// the job and fans out concurrently — missing channels are the caller's
/// problem to report, not this registry's.
#[derive(Default, Clone)]
pub struct NotificationRegistry {
    adapters: HashMap<String, Arc<dyn NotificationAdapter>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn NotificationAdapter>) {
        self.adapters.insert(adapter.channel().to_owned(), adapter);
    }

    pub fn get(&self, channel: &str) -> Option<Arc<dyn NotificationAdapter>> {
        self.adapters.get(channel).cloned()
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.adapters.contains_key(channel)
    }
}
