use chrono::{DateTime, Utc};
use feed_rs::parser;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// A single item of a syndication feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub id: String,
    pub title: String,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub summary: Option<String>,
}

/// Structured view of a fetched RSS/Atom document.
///
/// `malformed` is set when the document is not well-formed or could not be
/// parsed as a whole; in the latter case `title`, `link` and `entries` hold
/// whatever could be recovered and `entries` may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Feed {
    pub title: Option<String>,
    pub link: Option<String>,
    pub entries: Vec<Entry>,
    pub malformed: bool,
}

/// Converts raw response bytes into a [`Feed`].
///
/// Implementations must not fail: input that cannot be parsed is reported
/// through [`Feed::malformed`].
pub trait FeedParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Feed;
}

/// [`FeedParser`] backed by the `feed-rs` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedRsParser;

impl FeedParser for FeedRsParser {
    fn parse(&self, bytes: &[u8]) -> Feed {
        match parser::parse(bytes) {
            Ok(feed) => {
                // feed-rs accepts some documents that are not well-formed XML,
                // so the flag comes from a separate strict pass
                let defect = xml_defect(bytes);
                if let Some(defect) = &defect {
                    tracing::debug!(error = %defect, "Feed parsed but is not well-formed XML");
                }
                Feed {
                    title: feed.title.map(|t| t.content),
                    link: feed.links.first().map(|l| l.href.clone()),
                    entries: feed.entries.into_iter().map(convert_entry).collect(),
                    malformed: defect.is_some(),
                }
            }
            Err(e) => {
                let text = String::from_utf8_lossy(bytes);
                let (title, link) = salvage_header(&text);
                let entries = salvage_entries(&text);
                tracing::debug!(
                    error = %e,
                    salvaged = entries.len(),
                    "Feed document malformed, returning recovered entries"
                );
                Feed {
                    title,
                    link,
                    entries,
                    malformed: true,
                }
            }
        }
    }
}

/// Strict XML pass over the document. Returns a description of the first
/// defect: reader errors (mismatched tags, bad syntax), undeclared or
/// unterminated entities in text and attributes, or unclosed elements.
///
/// JSON Feed documents are not XML and are never reported.
fn xml_defect(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if bytes.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{') {
        return None;
    }

    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut depth: usize = 0;

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => return Some(e.to_string()),
        };
        let checked = match event {
            Event::Start(e) => {
                depth += 1;
                check_attributes(&e, &reader)
            }
            Event::Empty(e) => check_attributes(&e, &reader),
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                Ok(())
            }
            Event::Text(t) => t.unescape().map(|_| ()).map_err(|e| e.to_string()),
            Event::Eof => break,
            _ => Ok(()),
        };
        if let Err(defect) = checked {
            return Some(defect);
        }
        buf.clear();
    }

    (depth > 0).then(|| format!("document ends with {depth} unclosed element(s)"))
}

fn check_attributes(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<(), String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        attr.decode_and_unescape_value(reader.decoder())
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn convert_entry(entry: feed_rs::model::Entry) -> Entry {
    let link = entry.links.first().map(|l| l.href.clone());
    let published = entry.published.or(entry.updated);
    let summary = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body));
    let title = entry
        .title
        .map(|t| t.content)
        .unwrap_or_else(|| "Untitled".to_string());

    let existing_id = if entry.id.is_empty() {
        None
    } else {
        Some(entry.id.as_str())
    };
    let id = generate_id(existing_id, link.as_deref(), &title, published);

    Entry {
        id,
        title,
        link,
        published,
        summary,
    }
}

fn generate_id(
    existing: Option<&str>,
    link: Option<&str>,
    title: &str,
    published: Option<DateTime<Utc>>,
) -> String {
    if let Some(id) = existing {
        let trimmed = id.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        link.unwrap_or(""),
        title,
        published.map(|p| p.timestamp().to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}

/// Element names that delimit one entry, with the envelope needed to parse
/// a lone element of that kind.
const ENTRY_ENVELOPES: [(&str, &str, &str); 2] = [
    (
        "item",
        r#"<?xml version="1.0"?><rss version="2.0"><channel>"#,
        "</channel></rss>",
    ),
    (
        "entry",
        r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom">"#,
        "</feed>",
    ),
];

/// Best-effort recovery of entries from a document that failed to parse.
///
/// Each complete `<item>` or `<entry>` element is re-parsed on its own inside
/// a minimal RSS or Atom envelope. Elements that still fail are dropped.
fn salvage_entries(text: &str) -> Vec<Entry> {
    let mut entries = Vec::new();

    for (tag, head, tail) in ENTRY_ENVELOPES {
        for element in complete_elements(text, tag) {
            let doc = format!("{head}{element}{tail}");
            if let Ok(feed) = parser::parse(doc.as_bytes()) {
                entries.extend(feed.entries.into_iter().map(convert_entry));
            }
        }
    }

    entries
}

/// Recovers the feed-level title and link from the part of the document
/// before the first entry, using the same envelope re-parse as entries.
fn salvage_header(text: &str) -> (Option<String>, Option<String>) {
    let header_end = ["<item", "<entry"]
        .iter()
        .filter_map(|tag| text.find(tag))
        .min()
        .unwrap_or(text.len());
    let header = &text[..header_end];

    let (_, head, tail) = if header.contains("<feed") {
        ENTRY_ENVELOPES[1]
    } else {
        ENTRY_ENVELOPES[0]
    };

    let mut parts = String::new();
    for tag in ["title", "link"] {
        if let Some(element) = complete_elements(header, tag).first() {
            parts.push_str(element);
        }
    }
    if parts.is_empty() {
        return (None, None);
    }

    match parser::parse(format!("{head}{parts}{tail}").as_bytes()) {
        Ok(feed) => (
            feed.title.map(|t| t.content),
            feed.links.first().map(|l| l.href.clone()),
        ),
        Err(_) => (None, None),
    }
}

/// Returns each `<tag ...>...</tag>` span in document order, skipping
/// elements whose name merely starts with `tag` and unterminated trailers.
fn complete_elements<'a>(text: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find(&open) {
        let start = cursor + rel;
        let after_name = start + open.len();
        let boundary = text[after_name..].chars().next();
        if !matches!(boundary, Some(c) if c == '>' || c == '/' || c.is_whitespace()) {
            cursor = after_name;
            continue;
        }
        match text[after_name..].find(&close) {
            Some(rel_end) => {
                let end = after_name + rel_end + close.len();
                found.push(&text[start..end]);
                cursor = end;
            }
            None => break,
        }
    }

    found
}
