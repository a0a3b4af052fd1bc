//! Feed document writer.

use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::FeedDocument;

fn text_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, value: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Render a [`FeedDocument`] as an RSS-style XML document.
pub fn write_feed(doc: &FeedDocument) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;

    text_element(&mut writer, "title", &doc.title)?;
    text_element(&mut writer, "description", &doc.description)?;
    text_element(&mut writer, "uuid", &doc.uuid)?;

    for entry in &doc.entries {
        writer.write_event(Event::Start(BytesStart::new("item")))?;
        text_element(&mut writer, "title", &entry.title)?;
        text_element(&mut writer, "description", &entry.description)?;
        let mut enclosure = BytesStart::new("enclosure");
        enclosure.push_attribute(("url", entry.enclosure_url.as_str()));
        let length = entry.enclosure_length.to_string();
        enclosure.push_attribute(("length", length.as_str()));
        writer.write_event(Event::Empty(enclosure))?;
        text_element(&mut writer, "pubDate", &entry.pub_date)?;
        text_element(&mut writer, "uuid", &entry.uuid)?;
        writer.write_event(Event::End(BytesEnd::new("item")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;

    Ok(String::from_utf8(writer.into_inner())?)
}
