//! Discord webhook notifications.
//!
//! Renders diff events into channel messages. Delivery is best-effort:
//! webhook failures are logged and never propagated, since the next cycle
//! re-reports anything still worth knowing.

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::market::models::{EventKind, ListingEvent};

/// Notification boundary consumed by the scheduler.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: &ListingEvent);
}

/// Discord webhook client.
pub struct DiscordNotifier {
    webhook_url: Option<String>,
    http: reqwest::Client,
    enabled: bool,
}

/// Discord webhook message format.
#[derive(Debug, Serialize)]
struct DiscordMessage {
    content: String,
    username: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: Option<String>, enabled: bool) -> Self {
        Self {
            enabled: enabled && webhook_url.is_some(),
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, message: &str) {
        if !self.enabled {
            return;
        }

        let Some(ref url) = self.webhook_url else {
            return;
        };

        let payload = DiscordMessage {
            content: message.to_string(),
            username: "Torn Market Tracker".to_string(),
        };

        match self.http.post(url).json(&payload).send().await {
            Ok(response) => {
                if !response.status().is_success() {
                    warn!(
                        status = %response.status(),
                        "Discord webhook returned non-success status"
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to send Discord notification");
            }
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn publish(&self, event: &ListingEvent) {
        self.send(&render_event(event)).await;
    }
}

/// Render one diff event as a channel message. Vanished listings mention
/// the tracking owner, matching the urgency of "someone just bought it".
pub fn render_event(event: &ListingEvent) -> String {
    let listing = &event.listing;
    let body = format!(
        "**Item {} — Quality {}**\n\
         Price: ${}\n\
         Damage: {} | Accuracy: {}\n\
         UID: {}",
        event.item_id,
        listing.quality,
        format_price(listing.price),
        listing.stats.damage,
        listing.stats.accuracy,
        event.listing_id,
    );

    match event.kind {
        EventKind::Persisted => format!("🟢 {body}\nStill in market."),
        EventKind::Vanished => format!(
            "<@{}>\n🔻 {body}\nListing has been bought!",
            event.owner
        ),
    }
}

/// Thousands-separated currency rendering, e.g. 1250000 -> "1,250,000".
fn format_price(price: u64) -> String {
    let digits = price.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
