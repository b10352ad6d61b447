//! Ordered plugin hook chain around scrape/save (spec.md §4.K).
//!
//! `onInit`/`onCleanup` are fire-and-forget lifecycle notifications;
//! `onScrape`/`onScrapeResult`/`onSave` are transforms that chain
//! through every registered plugin in order. A plugin that returns
//! `None` leaves the in-flight value untouched; one that errors is
//! logged and otherwise ignored. Loading and capability negotiation are
//! out of scope — plugins are constructed and registered by the caller.

pub mod chain;
pub mod error;
pub mod plugin;

pub use chain::PluginChain;
pub use error::PluginError;
pub use plugin::{Plugin, PluginResult};
