//! Torn v2 API client.
//!
//! Thin reqwest wrapper around the item-market endpoint with a bounded
//! per-request timeout and API-key header auth.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::TornConfig;
use crate::market::models::{ItemId, ItemMarketResponse};
use crate::market::MarketFetcher;

pub struct TornClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TornClient {
    pub fn new(config: &TornConfig, api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl MarketFetcher for TornClient {
    async fn fetch_item_market(&self, item_id: ItemId) -> Result<ItemMarketResponse> {
        let url = format!("{}/v2/market/{}/itemmarket", self.base_url, item_id);

        let resp = self
            .http
            .get(&url)
            .query(&[("bonus", "Any"), ("offset", "0")])
            .header("accept", "application/json")
            .header("Authorization", format!("ApiKey {}", self.api_key))
            .send()
            .await
            .with_context(|| format!("Failed to reach Torn API for item {item_id}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Torn API {status} for item {item_id}: {body}");
        }

        resp.json::<ItemMarketResponse>()
            .await
            .with_context(|| format!("Malformed Torn API body for item {item_id}"))
    }
}
