//! Parsed page content
//!
//! A [`Parser`] turns fetched bytes into a [`Document`] that exposes the page
//! text and its outgoing links. HTML goes through scraper, XML (feeds and
//! sitemaps) through quick-xml, and `text/plain` is taken verbatim.
//! Documents keep only owned strings so they can cross thread boundaries
//! after parsing on a blocking thread.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

/// Elements whose text is never page content
const NON_CONTENT_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

const LINK_SELECTOR: &str = "a[href], area[href], link[href], iframe[src], frame[src]";

/// Why content could not be turned into a document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unsupported content type: {0}")]
    UnsupportedContent(String),
    #[error("content contains NUL bytes")]
    EmbeddedNul,
    #[error("malformed content: {0}")]
    Malformed(String),
}

/// Page content with its links
pub trait Document: Send {
    /// Rewrite every link as an absolute URL against `base_url`
    ///
    /// Links that cannot be resolved are dropped.
    fn resolve_links_absolute(&mut self, base_url: &str);

    fn extract_text(&self) -> String;

    fn iter_links(&self) -> Box<dyn Iterator<Item = &str> + '_>;
}

/// Turns fetched bytes into a document
pub trait Parser: Send + Sync {
    fn parse(&self, content: &[u8], content_type: &str) -> Result<Box<dyn Document>, ParseError>;
}

/// Document kind chosen from a MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    Html,
    Xml,
    PlainText,
}

impl ContentKind {
    fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "text/html" | "application/xhtml+xml" => Some(ContentKind::Html),
            "text/xml" | "application/xml" => Some(ContentKind::Xml),
            "text/plain" => Some(ContentKind::PlainText),
            m if m.ends_with("+xml") => Some(ContentKind::Xml),
            _ => None,
        }
    }
}

/// Dispatches on content type to the HTML, XML or plain-text document
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentParser;

impl Parser for ContentParser {
    fn parse(&self, content: &[u8], content_type: &str) -> Result<Box<dyn Document>, ParseError> {
        let kind = ContentKind::from_content_type(content_type)
            .ok_or_else(|| ParseError::UnsupportedContent(content_type.to_string()))?;

        if content.contains(&0) {
            return Err(ParseError::EmbeddedNul);
        }
        let text = String::from_utf8_lossy(content);

        Ok(match kind {
            ContentKind::Html => Box::new(HtmlDocument::parse(&text)?),
            ContentKind::Xml => Box::new(XmlDocument::parse(&text)?),
            ContentKind::PlainText => Box::new(PlainTextDocument::new(text.into_owned())),
        })
    }
}

/// Rewrite `links` against `base_url`, dropping the ones that don't resolve
fn resolve_all(links: &mut Vec<String>, base_url: &str) {
    let base = Url::parse(base_url).ok();
    links.retain_mut(|link| {
        let resolved = match &base {
            Some(base) => base.join(link),
            None => Url::parse(link),
        };
        match resolved {
            Ok(url) => {
                *link = url.to_string();
                true
            }
            Err(_) => false,
        }
    });
}

/// HTML page
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    text: String,
    links: Vec<String>,
}

impl HtmlDocument {
    pub fn parse(html: &str) -> Result<Self, ParseError> {
        let document = Html::parse_document(html);
        let selector =
            Selector::parse(LINK_SELECTOR).map_err(|e| ParseError::Malformed(format!("{:?}", e)))?;

        let links = document
            .select(&selector)
            .filter_map(|el| el.value().attr("href").or_else(|| el.value().attr("src")))
            .map(str::trim)
            .filter(|link| !link.is_empty())
            .map(str::to_string)
            .collect();

        let mut parts: Vec<&str> = Vec::new();
        for node in document.root_element().descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let t = text.trim();
            if t.is_empty() {
                continue;
            }
            // Skip text inside script, style and similar
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| NON_CONTENT_ELEMENTS.contains(&el.name()))
            });
            if !hidden {
                parts.push(t);
            }
        }

        Ok(Self {
            text: parts.join(" "),
            links,
        })
    }
}

impl Document for HtmlDocument {
    fn resolve_links_absolute(&mut self, base_url: &str) {
        resolve_all(&mut self.links, base_url);
    }

    fn extract_text(&self) -> String {
        self.text.clone()
    }

    fn iter_links(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.links.iter().map(String::as_str))
    }
}

/// XML document (RSS/Atom feeds, sitemaps)
///
/// Links come from `href`/`src` attributes and `<loc>` elements; text is the
/// concatenation of all character data.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    text: String,
    links: Vec<String>,
}

impl XmlDocument {
    pub fn parse(xml: &str) -> Result<Self, ParseError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut parts: Vec<String> = Vec::new();
        let mut links = Vec::new();
        let mut in_loc = false;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| ParseError::Malformed(format!("XML error at {}: {}", reader.buffer_position(), e)))?;

            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    for attr in e.attributes().flatten() {
                        if matches!(attr.key.local_name().as_ref(), b"href" | b"src") {
                            if let Ok(value) = attr.unescape_value() {
                                let value = value.trim();
                                if !value.is_empty() {
                                    links.push(value.to_string());
                                }
                            }
                        }
                    }
                    if matches!(event, Event::Start(_)) && e.local_name().as_ref() == b"loc" {
                        in_loc = true;
                    }
                }
                Event::End(ref e) => {
                    if e.local_name().as_ref() == b"loc" {
                        in_loc = false;
                    }
                }
                Event::Text(ref e) => {
                    let text = e
                        .unescape()
                        .map_err(|err| ParseError::Malformed(err.to_string()))?;
                    if in_loc {
                        links.push(text.trim().to_string());
                    }
                    parts.push(text.into_owned());
                }
                Event::CData(ref e) => {
                    parts.push(String::from_utf8_lossy(e).into_owned());
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Self {
            text: parts.join(" "),
            links,
        })
    }
}

impl Document for XmlDocument {
    fn resolve_links_absolute(&mut self, base_url: &str) {
        resolve_all(&mut self.links, base_url);
    }

    fn extract_text(&self) -> String {
        self.text.clone()
    }

    fn iter_links(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.links.iter().map(String::as_str))
    }
}

/// Plain text; has no links
#[derive(Debug, Clone)]
pub struct PlainTextDocument {
    text: String,
}

impl PlainTextDocument {
    pub fn new(text: String) -> Self {
        Self { text }
    }
}

impl Document for PlainTextDocument {
    fn resolve_links_absolute(&mut self, _base_url: &str) {}

    fn extract_text(&self) -> String {
        self.text.clone()
    }

    fn iter_links(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(std::iter::empty())
    }
}
