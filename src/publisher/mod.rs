//! Own-feed publishing.
//!
//! Scans the node's share directory for appliance bundles and keeps an XML
//! feed of them on disk, so peer nodes can register this node as a source.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::feed::{write_feed, FeedDocument, FeedEntry};

pub struct PublisherConfig {
    /// Directory scanned for shared bundles. The feed file lives here too.
    pub share_path: PathBuf,
    pub feed_filename: String,
    /// Public URL prefix under which the share directory is served.
    pub base_url: String,
    pub feed_uuid: String,
    pub feed_name: String,
    pub feed_description: String,
    pub refresh_interval: Duration,
}

pub struct OwnFeedPublisher {
    config: PublisherConfig,
}

impl OwnFeedPublisher {
    pub fn new(config: PublisherConfig) -> Self {
        Self { config }
    }

    fn feed_path(&self) -> PathBuf {
        self.config.share_path.join(&self.config.feed_filename)
    }

    /// Rebuild the feed from the current directory contents.
    ///
    /// Only files whose stem is a parseable uuid are advertised; everything
    /// else in the directory (including the feed file itself) is ignored.
    /// The feed is written to a sibling temp file first and renamed over the
    /// old one, so readers never observe a half-written document.
    pub fn publish_once(&self) -> Result<()> {
        let mut entries = Vec::new();
        let dir = std::fs::read_dir(&self.config.share_path)
            .with_context(|| format!("failed to read share directory {:?}", self.config.share_path))?;
        for dir_entry in dir {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let file_name = dir_entry.file_name().to_string_lossy().into_owned();
            if file_name == self.config.feed_filename {
                continue;
            }
            let path = dir_entry.path();
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            if uuid::Uuid::parse_str(&stem).is_err() {
                debug!("ignoring non-appliance file {:?}", file_name);
                continue;
            }
            let metadata = dir_entry.metadata()?;
            let modified: DateTime<Utc> = metadata
                .modified()
                .with_context(|| format!("no modification time for {path:?}"))?
                .into();
            entries.push(FeedEntry {
                uuid: stem,
                title: file_name.clone(),
                description: format!("Shared appliance {file_name}"),
                enclosure_url: format!(
                    "{}/{}",
                    self.config.base_url.trim_end_matches('/'),
                    file_name
                ),
                enclosure_length: metadata.len() as i64,
                pub_date: modified.to_rfc2822(),
            });
        }
        entries.sort_by(|a, b| a.title.cmp(&b.title));

        let doc = FeedDocument {
            uuid: self.config.feed_uuid.clone(),
            title: self.config.feed_name.clone(),
            description: self.config.feed_description.clone(),
            entries,
        };
        let xml = write_feed(&doc)?;

        let feed_path = self.feed_path();
        let tmp_path = feed_path.with_extension("tmp");
        std::fs::write(&tmp_path, &xml)
            .with_context(|| format!("failed to write {tmp_path:?}"))?;
        std::fs::rename(&tmp_path, &feed_path)
            .with_context(|| format!("failed to move feed into place at {feed_path:?}"))?;

        info!(
            "published own feed with {} appliance(s) to {:?}",
            doc.entries.len(),
            feed_path
        );
        Ok(())
    }

    /// Republish on a fixed interval until cancelled. A failing pass is
    /// logged and retried on the next tick.
    pub async fn run(&self, cancellation_token: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.refresh_interval);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("own feed publisher stopped");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(err) = self.publish_once() {
                        warn!("own feed refresh failed: {:#}", err);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::feed::parse_feed;

    use super::*;

    const UUID_A: &str = "11111111-1111-1111-1111-111111111111";
    const UUID_B: &str = "22222222-2222-2222-2222-222222222222";

    fn publisher(share_path: PathBuf) -> OwnFeedPublisher {
        OwnFeedPublisher::new(PublisherConfig {
            share_path,
            feed_filename: "feed.xml".to_string(),
            base_url: "http://node01/shared/".to_string(),
            feed_uuid: "99999999-9999-9999-9999-999999999999".to_string(),
            feed_name: "node01".to_string(),
            feed_description: "appliances shared by node01".to_string(),
            refresh_interval: Duration::from_secs(300),
        })
    }

    #[test]
    fn test_publish_advertises_uuid_named_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(format!("{UUID_B}.bundle")), b"bb").unwrap();
        std::fs::write(dir.path().join(format!("{UUID_A}.bundle")), b"a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let publisher = publisher(dir.path().to_path_buf());
        publisher.publish_once().unwrap();

        let xml = std::fs::read_to_string(dir.path().join("feed.xml")).unwrap();
        let doc = parse_feed(&xml).unwrap();
        assert_eq!(doc.uuid, "99999999-9999-9999-9999-999999999999");
        assert_eq!(doc.entries.len(), 2);
        assert_eq!(doc.entries[0].uuid, UUID_A);
        assert_eq!(doc.entries[0].enclosure_length, 1);
        assert_eq!(
            doc.entries[0].enclosure_url,
            format!("http://node01/shared/{UUID_A}.bundle")
        );
        assert!(!doc.entries[0].pub_date.is_empty());
        assert_eq!(doc.entries[1].uuid, UUID_B);
    }

    #[test]
    fn test_republish_reflects_directory_changes() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = publisher(dir.path().to_path_buf());

        publisher.publish_once().unwrap();
        let doc = parse_feed(&std::fs::read_to_string(dir.path().join("feed.xml")).unwrap()).unwrap();
        assert!(doc.entries.is_empty());

        std::fs::write(dir.path().join(format!("{UUID_A}.bundle")), b"abc").unwrap();
        publisher.publish_once().unwrap();
        let doc = parse_feed(&std::fs::read_to_string(dir.path().join("feed.xml")).unwrap()).unwrap();
        assert_eq!(doc.entries.len(), 1);
        // No stray temp file is left behind
        assert!(!dir.path().join("feed.tmp").exists());
    }

    #[test]
    fn test_feed_file_is_not_advertised() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = publisher(dir.path().to_path_buf());
        publisher.publish_once().unwrap();
        publisher.publish_once().unwrap();
        let doc = parse_feed(&std::fs::read_to_string(dir.path().join("feed.xml")).unwrap()).unwrap();
        assert!(doc.entries.is_empty());
    }

    #[test]
    fn test_missing_share_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = publisher(dir.path().join("nope"));
        assert!(publisher.publish_once().is_err());
    }
}
