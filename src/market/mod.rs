pub mod client;
pub mod filter;
pub mod models;

use anyhow::Result;
use async_trait::async_trait;

use crate::market::models::{ItemId, ItemMarketResponse};

/// Boundary to the marketplace API.
///
/// The scheduler and tracker only ever see this trait, so tests drive them
/// with scripted in-process fetchers instead of a live HTTP client.
#[async_trait]
pub trait MarketFetcher: Send + Sync {
    /// Fetch the current market snapshot for one item.
    ///
    /// The response is best-effort JSON shaped and may carry an empty or
    /// absent listings collection; transport failures are errors.
    async fn fetch_item_market(&self, item_id: ItemId) -> Result<ItemMarketResponse>;
}
