//! `lesca`: a session-aware, circuit-broken headless browser execution
//! substrate. This crate is a thin facade re-exporting the workspace's
//! member crates under one name, the way `riptide-facade` sits over its
//! sibling crates — there is no additional logic here, just the public
//! surface an embedder pulls in with a single dependency.

pub use lesca_batch as batch;
pub use lesca_cache as cache;
pub use lesca_events as events;
pub use lesca_metrics as metrics;
pub use lesca_plugins as plugins;
pub use lesca_pool as pool;
pub use lesca_reliability as reliability;
pub use lesca_session as session;
pub use lesca_stealth as stealth;
pub use lesca_types as types;

pub use lesca_events::EventBus;
pub use lesca_metrics::MetricsCollector;
pub use lesca_pool::SessionPoolManager;
pub use lesca_session::SessionStore;
