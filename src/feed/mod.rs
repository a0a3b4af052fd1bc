//! Appliance feed documents.
//!
//! A feed is an RSS-style syndication document: channel-level
//! uuid/title/description plus one `<item>` per advertised appliance
//! (title, description, enclosure url+length, pubDate, uuid). This module
//! owns the document model, the parser used when syncing remote sources,
//! and the writer used when publishing the node's own feed.

mod parse;
mod write;

pub use parse::parse_feed;
pub use write::write_feed;

/// A parsed feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    pub uuid: String,
    pub title: String,
    pub description: String,
    pub entries: Vec<FeedEntry>,
}

/// One advertised appliance within a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub uuid: String,
    pub title: String,
    pub description: String,
    pub enclosure_url: String,
    pub enclosure_length: i64,
    pub pub_date: String,
}
