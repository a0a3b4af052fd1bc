//! Common test infrastructure
//!
//! Spawns an isolated agent instance per test, together with an in-process
//! HTTP host that plays the role of remote feed publishers. Tests should only
//! import from this module, not from internal submodules.

mod client;
mod server;

pub use client::TestClient;
pub use server::{FeedHost, TestServer};

pub const SOURCE_UUID: &str = "11111111-1111-1111-1111-111111111111";
pub const APPLIANCE_UUID: &str = "22222222-2222-2222-2222-222222222222";
pub const APPLIANCE_2_UUID: &str = "33333333-3333-3333-3333-333333333333";

/// A minimal valid feed advertising the given (uuid, title, enclosure url)
/// triples.
pub fn feed_xml(source_uuid: &str, title: &str, entries: &[(&str, &str, &str)]) -> String {
    let items: String = entries
        .iter()
        .map(|(uuid, title, url)| {
            format!(
                "<item><title>{title}</title><description>e2e appliance</description>\
                 <enclosure url=\"{url}\" length=\"10\"/>\
                 <pubDate>Mon, 07 Jul 2025 08:30:00 +0000</pubDate>\
                 <uuid>{uuid}</uuid></item>"
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <rss version=\"2.0\"><channel>\
         <title>{title}</title><description>e2e feed</description>\
         <uuid>{source_uuid}</uuid>{items}</channel></rss>"
    )
}
