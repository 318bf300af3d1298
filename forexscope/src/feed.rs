use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::FeedParseError;

/// One feed entry as extracted from the document, before any interpretation.
/// All fields are best-effort: a missing element simply stays `None`.
/// `pub_date` carries the original feed date text verbatim, not normalized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub pub_date: Option<String>,
    pub creator: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Format {
    Rss,
    Atom,
}

/// Target slot for the text of the element currently being read.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Title,
    Link,
    Summary,
    Content,
    Date,
    DateFallback,
    Creator,
    AuthorFallback,
    AuthorName,
}

/// Per-entry accumulator; resolved into a [`RawEntry`] when the entry closes.
#[derive(Default)]
struct EntryAcc {
    title: Option<String>,
    link: Option<String>,
    summary: Option<String>,
    content: Option<String>,
    date: Option<String>,
    date_fallback: Option<String>,
    creator: Option<String>,
    author_fallback: Option<String>,
    author_name: Option<String>,
}

impl EntryAcc {
    fn commit(&mut self, slot: Slot, text: String) {
        let value = Some(text);
        match slot {
            Slot::Title => self.title = value,
            Slot::Link => self.link = value,
            Slot::Summary => self.summary = value,
            Slot::Content => self.content = value,
            Slot::Date => self.date = value,
            Slot::DateFallback => self.date_fallback = value,
            Slot::Creator => self.creator = value,
            Slot::AuthorFallback => self.author_fallback = value,
            Slot::AuthorName => self.author_name = value,
        }
    }

    fn resolve(self) -> RawEntry {
        RawEntry {
            title: self.title,
            link: self.link,
            summary: self.summary,
            content: self.content,
            // RSS: pubDate; Atom: published, falling back to updated
            pub_date: self.date.or(self.date_fallback),
            // dc:creator wins over plain author / <author><name>
            creator: self.creator.or(self.author_fallback).or(self.author_name),
        }
    }
}

fn slot_for(format: Format, name: &[u8], in_author: bool) -> Option<Slot> {
    match format {
        Format::Rss => match name {
            b"title" => Some(Slot::Title),
            b"link" => Some(Slot::Link),
            b"description" => Some(Slot::Summary),
            b"content:encoded" => Some(Slot::Content),
            b"pubDate" => Some(Slot::Date),
            b"dc:creator" => Some(Slot::Creator),
            b"author" => Some(Slot::AuthorFallback),
            _ => None,
        },
        Format::Atom => match name {
            b"title" => Some(Slot::Title),
            b"summary" => Some(Slot::Summary),
            b"content" => Some(Slot::Content),
            b"published" => Some(Slot::Date),
            b"updated" => Some(Slot::DateFallback),
            b"name" if in_author => Some(Slot::AuthorName),
            _ => None,
        },
    }
}

/// Apply an Atom `<link href=".." rel=".."/>` element to the accumulator.
/// `rel="alternate"` (or no rel at all) identifies the article link; other
/// relations (self, enclosure, ...) are ignored.
fn apply_atom_link(
    acc: &mut EntryAcc,
    e: &quick_xml::events::BytesStart<'_>,
) -> Result<(), quick_xml::Error> {
    let mut href: Option<String> = None;
    let mut rel: Option<String> = None;
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        match attr.key.as_ref() {
            b"href" => href = Some(attr.unescape_value()?.into_owned()),
            b"rel" => rel = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }
    if let Some(href) = href {
        match rel.as_deref() {
            Some("alternate") => acc.link = Some(href),
            None if acc.link.is_none() => acc.link = Some(href),
            _ => {}
        }
    }
    Ok(())
}

/// Parse an RSS 2.0 or Atom document into its entries, in document order.
///
/// Best-effort field extraction: each entry keeps whatever subset of
/// title/link/summary/content/date/author the document provides. Ill-formed
/// XML and well-formed documents that are neither RSS nor Atom are rejected
/// outright; there is no partial recovery.
pub fn parse(xml: &str) -> Result<Vec<RawEntry>, FeedParseError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut entries = Vec::new();
    let mut format: Option<Format> = None;
    let mut in_entry = false;
    let mut in_author = false;
    let mut acc = EntryAcc::default();
    // The element whose text we are currently collecting, if any
    let mut field: Option<(Vec<u8>, Slot)> = None;
    let mut buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name().as_ref().to_vec();
                match format {
                    None => {
                        format = Some(match name.as_slice() {
                            b"rss" => Format::Rss,
                            b"feed" => Format::Atom,
                            _ => return Err(FeedParseError::UnrecognizedFormat),
                        });
                    }
                    Some(fmt) if !in_entry => {
                        let entry_tag: &[u8] = match fmt {
                            Format::Rss => b"item",
                            Format::Atom => b"entry",
                        };
                        if name == entry_tag {
                            in_entry = true;
                            in_author = false;
                            acc = EntryAcc::default();
                        }
                    }
                    Some(fmt) => {
                        if field.is_some() {
                            // Markup nested inside a field (e.g. HTML in a
                            // description): keep collecting its text nodes.
                        } else if fmt == Format::Atom && name == b"author" {
                            in_author = true;
                        } else if fmt == Format::Atom && name == b"link" {
                            apply_atom_link(&mut acc, &e)?;
                        } else if let Some(slot) = slot_for(fmt, &name, in_author) {
                            field = Some((name, slot));
                            buf.clear();
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.name().as_ref().to_vec();
                if in_entry && field.is_none() && format == Some(Format::Atom) && name == b"link" {
                    apply_atom_link(&mut acc, &e)?;
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name().as_ref().to_vec();
                if let Some((tag, slot)) = field.take() {
                    if name == tag {
                        acc.commit(slot, buf.trim().to_string());
                    } else {
                        // End of markup nested inside the field, not the
                        // field itself: keep collecting.
                        field = Some((tag, slot));
                    }
                    continue;
                }
                if in_entry {
                    if format == Some(Format::Atom) && name == b"author" {
                        in_author = false;
                    } else {
                        let entry_tag: &[u8] = match format {
                            Some(Format::Rss) => b"item",
                            _ => b"entry",
                        };
                        if name == entry_tag {
                            in_entry = false;
                            entries.push(std::mem::take(&mut acc).resolve());
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if field.is_some() {
                    // Trimmed nodes split by inline markup rejoin with a
                    // space so "word <em>x</em> word" keeps its separation.
                    let text = e.unescape()?;
                    if !buf.is_empty() && !text.is_empty() {
                        buf.push(' ');
                    }
                    buf.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if field.is_some() {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    if !buf.is_empty() && !text.is_empty() {
                        buf.push(' ');
                    }
                    buf.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FeedParseError::Xml(e)),
            _ => {}
        }
    }

    if format.is_none() {
        return Err(FeedParseError::UnrecognizedFormat);
    }

    Ok(entries)
}
