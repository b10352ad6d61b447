//! The per-plugin hook surface (spec.md §4.K).
//!
//! Grounded on the teacher's `riptide-intelligence::plugin` trait shape
//! (async hooks, a `name()` identity method), pared down from that
//! crate's full LLM-provider lifecycle (capabilities negotiation,
//! resource limits, health checks) to the four hook points the spec
//! actually names: the loader and capability model are out of scope
//! here, only hook order and transform semantics are.
//!
//! Each transform hook returns `Ok(Some(value'))` to replace the
//! in-flight value, `Ok(None)` to leave it unchanged, or `Err` if the
//! plugin failed — the chain logs the error and keeps the prior value
//! either way.

use async_trait::async_trait;

use crate::error::PluginError;

pub type PluginResult<T> = Result<Option<T>, PluginError>;

#[async_trait]
pub trait Plugin<Req, Res, Data>: Send + Sync
where
    Req: Send + 'static,
    Res: Send + 'static,
    Data: Send + 'static,
{
    fn name(&self) -> &str;

    async fn on_init(&self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn on_scrape(&self, request: Req) -> PluginResult<Req> {
        let _ = request;
        Ok(None)
    }

    async fn on_scrape_result(&self, result: Res) -> PluginResult<Res> {
        let _ = result;
        Ok(None)
    }

    async fn on_save(&self, data: Data) -> PluginResult<Data> {
        let _ = data;
        Ok(None)
    }

    async fn on_cleanup(&self) -> Result<(), PluginError> {
        Ok(())
    }
}
