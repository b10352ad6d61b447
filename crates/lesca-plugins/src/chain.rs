//! The ordered hook chain (spec.md §4.K).

use std::sync::Arc;

use tracing::warn;

use crate::plugin::Plugin;

pub struct PluginChain<Req, Res, Data> {
    plugins: Vec<Arc<dyn Plugin<Req, Res, Data>>>,
}

impl<Req, Res, Data> Default for PluginChain<Req, Res, Data> {
    fn default() -> Self {
        Self { plugins: Vec::new() }
    }
}

impl<Req, Res, Data> PluginChain<Req, Res, Data>
where
    Req: Clone + Send + 'static,
    Res: Clone + Send + 'static,
    Data: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a plugin; hooks run in registration order.
    pub fn register(&mut self, plugin: Arc<dyn Plugin<Req, Res, Data>>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub async fn init(&self) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.on_init().await {
                warn!(plugin = plugin.name(), error = %e, "plugin onInit failed");
            }
        }
    }

    pub async fn run_scrape(&self, request: Req) -> Req {
        let mut current = request;
        for plugin in &self.plugins {
            match plugin.on_scrape(current.clone()).await {
                Ok(Some(next)) => current = next,
                Ok(None) => {}
                Err(e) => warn!(plugin = plugin.name(), error = %e, "plugin onScrape failed"),
            }
        }
        current
    }

    pub async fn run_scrape_result(&self, result: Res) -> Res {
        let mut current = result;
        for plugin in &self.plugins {
            match plugin.on_scrape_result(current.clone()).await {
                Ok(Some(next)) => current = next,
                Ok(None) => {}
                Err(e) => warn!(plugin = plugin.name(), error = %e, "plugin onScrapeResult failed"),
            }
        }
        current
    }

    pub async fn run_save(&self, data: Data) -> Data {
        let mut current = data;
        for plugin in &self.plugins {
            match plugin.on_save(current.clone()).await {
                Ok(Some(next)) => current = next,
                Ok(None) => {}
                Err(e) => warn!(plugin = plugin.name(), error = %e, "plugin onSave failed"),
            }
        }
        current
    }

    pub async fn cleanup(&self) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.on_cleanup().await {
                warn!(plugin = plugin.name(), error = %e, "plugin onCleanup failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PluginError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Uppercase;

    #[async_trait]
    impl Plugin<String, String, String> for Uppercase {
        fn name(&self) -> &str {
            "uppercase"
        }
        async fn on_scrape(&self, request: String) -> crate::plugin::PluginResult<String> {
            Ok(Some(request.to_uppercase()))
        }
    }

    struct PassThrough;

    #[async_trait]
    impl Plugin<String, String, String> for PassThrough {
        fn name(&self) -> &str {
            "passthrough"
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Plugin<String, String, String> for AlwaysFails {
        fn name(&self) -> &str {
            "always-fails"
        }
        async fn on_scrape(&self, _request: String) -> crate::plugin::PluginResult<String> {
            Err(PluginError::new("boom"))
        }
    }

    struct CountsCleanup(Arc<AtomicUsize>);

    #[async_trait]
    impl Plugin<String, String, String> for CountsCleanup {
        fn name(&self) -> &str {
            "counts-cleanup"
        }
        async fn on_cleanup(&self) -> Result<(), PluginError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn none_preserves_prior_value() {
        let mut chain: PluginChain<String, String, String> = PluginChain::new();
        chain.register(Arc::new(Uppercase));
        chain.register(Arc::new(PassThrough));
        let out = chain.run_scrape("hello".to_string()).await;
        assert_eq!(out, "HELLO");
    }

    #[tokio::test]
    async fn failing_plugin_does_not_abort_chain() {
        let mut chain: PluginChain<String, String, String> = PluginChain::new();
        chain.register(Arc::new(Uppercase));
        chain.register(Arc::new(AlwaysFails));
        chain.register(Arc::new(PassThrough));
        let out = chain.run_scrape("hello".to_string()).await;
        // AlwaysFails' error is swallowed; the uppercased value survives.
        assert_eq!(out, "HELLO");
    }

    #[tokio::test]
    async fn cleanup_runs_every_plugin_in_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut chain: PluginChain<String, String, String> = PluginChain::new();
        chain.register(Arc::new(CountsCleanup(counter.clone())));
        chain.register(Arc::new(CountsCleanup(counter.clone())));
        chain.cleanup().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_chain_is_identity() {
        let chain: PluginChain<String, String, String> = PluginChain::new();
        assert!(chain.is_empty());
        let out = chain.run_scrape("unchanged".to_string()).await;
        assert_eq!(out, "unchanged");
    }
}
