//! Quality filtering of raw market responses.
//!
//! Reduces a raw Torn API snapshot to the listings whose quality is an
//! exact member of the desired set.

use std::collections::BTreeSet;

use rust_decimal::Decimal;

use crate::market::models::{ConditionStats, ItemMarketResponse, ListingInfo, Snapshot};

/// Build the filtered snapshot for one item.
///
/// A response with no `itemmarket` or `listings` section yields an empty
/// snapshot — the market having zero or unparseable listings is a normal
/// transient condition, not a fault. Listings missing their uid, stats, or
/// price are skipped. Quality membership is exact, no tolerance.
pub fn matching_listings(
    response: &ItemMarketResponse,
    desired_qualities: &BTreeSet<Decimal>,
) -> Snapshot {
    let mut results = Snapshot::new();

    let Some(listings) = response
        .itemmarket
        .as_ref()
        .and_then(|body| body.listings.as_ref())
    else {
        return results;
    };

    for listing in listings {
        let Some(details) = listing.item_details.as_ref() else {
            continue;
        };
        let (Some(uid), Some(stats)) = (details.uid, details.stats.as_ref()) else {
            continue;
        };
        let (Some(quality), Some(price)) = (stats.quality, listing.price) else {
            continue;
        };

        if desired_qualities.contains(&quality) {
            results.insert(
                uid,
                ListingInfo {
                    quality,
                    stats: ConditionStats {
                        damage: stats.damage.unwrap_or_default(),
                        accuracy: stats.accuracy.unwrap_or_default(),
                    },
                    price,
                },
            );
        }
    }

    results
}
