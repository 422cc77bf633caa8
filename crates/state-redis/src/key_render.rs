use watchloop_state::StateKey;

/// Render a [`StateKey`] into a Redis key string with the given prefix.
pub fn render_key(prefix: &str, key: &StateKey) -> String {
    format!("{}:{}", prefix, key.canonical())
}

#[cfg(test)]
mod tests {
    use watchloop_core::ids::{ProviderId, WorkspaceId};

    use super::*;

    #[test]
    fn renders_circuit_breaker_key() {
        let key = StateKey::circuit_breaker(&WorkspaceId::new("ws1"), "etsy.com", &ProviderId::new("brightdata"));
        assert_eq!(render_key("watchloop", &key), "watchloop:cb:ws1:etsy.com:brightdata");
    }

    #[test]
    fn renders_rate_limit_key() {
        let key = StateKey::rate_limit(&ProviderId::new("http"), "shop.example");
        assert_eq!(render_key("pfx", &key), "pfx:ratelimit:http:shop.example");
    }
}
