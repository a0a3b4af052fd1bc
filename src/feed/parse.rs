//! Feed document parser.
//!
//! Any structural problem (malformed XML, no channel element, an item
//! without uuid or enclosure) fails the whole document; callers treat that
//! as a bad feed, not as a partial result.

use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{FeedDocument, FeedEntry};

#[derive(Debug, Default)]
struct EntryBuilder {
    uuid: Option<String>,
    title: String,
    description: String,
    enclosure_url: Option<String>,
    enclosure_length: Option<i64>,
    pub_date: String,
}

impl EntryBuilder {
    fn build(self) -> Result<FeedEntry> {
        let uuid = self.uuid.context("feed item is missing a uuid")?;
        let enclosure_url = self
            .enclosure_url
            .with_context(|| format!("feed item {uuid} is missing an enclosure"))?;
        Ok(FeedEntry {
            uuid,
            title: self.title,
            description: self.description,
            enclosure_url,
            enclosure_length: self.enclosure_length.unwrap_or(0),
            pub_date: self.pub_date,
        })
    }
}

fn read_enclosure(element: &BytesStart, entry: &mut EntryBuilder) -> Result<()> {
    let url = element
        .try_get_attribute("url")?
        .context("enclosure is missing a url attribute")?
        .unescape_value()?
        .into_owned();
    entry.enclosure_url = Some(url);

    if let Some(length) = element.try_get_attribute("length")? {
        let raw = length.unescape_value()?;
        let parsed = raw
            .parse::<i64>()
            .with_context(|| format!("enclosure length is not a number: {raw}"))?;
        entry.enclosure_length = Some(parsed);
    }
    Ok(())
}

/// Parse a feed document into a [`FeedDocument`].
pub fn parse_feed(xml: &str) -> Result<FeedDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut channel_seen = false;
    let mut uuid = String::new();
    let mut title = String::new();
    let mut description = String::new();
    let mut entries = Vec::new();
    let mut item: Option<EntryBuilder> = None;

    loop {
        let event = reader.read_event().context("malformed feed document")?;
        match event {
            Event::Start(element) => {
                let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "channel" => channel_seen = true,
                    "item" if channel_seen => {
                        if item.is_some() {
                            bail!("nested item elements");
                        }
                        item = Some(EntryBuilder::default());
                    }
                    "enclosure" => {
                        if let Some(entry) = item.as_mut() {
                            read_enclosure(&element, entry)?;
                        }
                    }
                    _ => {}
                }
                path.push(name);
            }
            Event::Empty(element) => {
                let name = element.local_name();
                if name.as_ref() == b"enclosure" {
                    if let Some(entry) = item.as_mut() {
                        read_enclosure(&element, entry)?;
                    }
                }
            }
            Event::End(_) => {
                if path.pop().as_deref() == Some("item") {
                    if let Some(builder) = item.take() {
                        entries.push(builder.build()?);
                    }
                }
            }
            Event::Text(text) => {
                let value = text.unescape().context("malformed text content")?;
                assign_text(&path, item.as_mut(), &mut uuid, &mut title, &mut description, &value);
            }
            Event::CData(cdata) => {
                let value = String::from_utf8_lossy(&cdata).into_owned();
                assign_text(&path, item.as_mut(), &mut uuid, &mut title, &mut description, &value);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !channel_seen {
        bail!("document has no channel element");
    }

    Ok(FeedDocument {
        uuid,
        title,
        description,
        entries,
    })
}

fn assign_text(
    path: &[String],
    item: Option<&mut EntryBuilder>,
    channel_uuid: &mut String,
    channel_title: &mut String,
    channel_description: &mut String,
    value: &str,
) {
    let Some(element) = path.last() else {
        return;
    };
    let parent = path.len().checked_sub(2).map(|i| path[i].as_str());

    if let Some(entry) = item {
        if parent == Some("item") {
            match element.as_str() {
                "uuid" => entry.uuid = Some(value.to_string()),
                "title" => entry.title = value.to_string(),
                "description" => entry.description = value.to_string(),
                "pubDate" => entry.pub_date = value.to_string(),
                _ => {}
            }
        }
    } else if parent == Some("channel") {
        match element.as_str() {
            "uuid" => *channel_uuid = value.to_string(),
            "title" => *channel_title = value.to_string(),
            "description" => *channel_description = value.to_string(),
            _ => {}
        }
    }
}
