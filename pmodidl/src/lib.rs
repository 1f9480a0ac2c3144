//! # pmodidl - DIDL-Lite Parser
//!
//! Parser en flux pour le format DIDL-Lite utilisé dans UPnP/DLNA.
//!
//! The parser walks the document with a `quick_xml` reader and yields one
//! [`DidlObject`] per `<container>` or `<item>`, in document order, as soon as
//! its closing tag has been read. Nothing else of the listing is kept.
//!
//! ```
//! use pmodidl::DidlParser;
//!
//! let xml = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/"
//!                         xmlns:dc="http://purl.org/dc/elements/1.1/"
//!                         xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">
//!   <container id="1" parentID="0"><dc:title>Music</dc:title><upnp:class>object.container</upnp:class></container>
//! </DIDL-Lite>"#;
//!
//! let objects: Vec<_> = DidlParser::new(xml).collect::<Result<_, _>>().unwrap();
//! assert_eq!(objects[0].title.as_deref(), Some("Music"));
//! ```

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DidlError {
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("XML encoding error: {0}")]
    Encoding(#[from] quick_xml::encoding::EncodingError),

    #[error("Unknown entity reference &{0};")]
    UnknownEntity(String),

    #[error("DIDL-Lite {kind} is missing required {field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("Unexpected end of DIDL-Lite document inside {0}")]
    UnexpectedEof(&'static str),
}

/// Nature d'un objet DIDL-Lite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Container,
    Item,
}

impl ObjectKind {
    pub fn tag(self) -> &'static str {
        match self {
            ObjectKind::Container => "container",
            ObjectKind::Item => "item",
        }
    }
}

/// A `<res>` element of an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub protocol_info: String,
    pub uri: String,
}

impl Resource {
    /// Content format (MIME type) announced by the `protocolInfo` attribute.
    pub fn mime_type(&self) -> Option<&str> {
        ProtocolInfo::parse(&self.protocol_info).map(|info| info.content_format)
    }
}

/// Split view over a `protocol:network:contentFormat:additionalInfo` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolInfo<'a> {
    pub protocol: &'a str,
    pub network: &'a str,
    pub content_format: &'a str,
    pub additional_info: &'a str,
}

impl<'a> ProtocolInfo<'a> {
    /// Returns `None` unless the four fields are present. Only the first three
    /// colons split: the additional info may contain its own.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let mut parts = raw.trim().splitn(4, ':');
        let protocol = parts.next()?;
        let network = parts.next()?;
        let content_format = parts.next()?;
        let additional_info = parts.next()?;

        if content_format.is_empty() {
            return None;
        }

        Some(Self {
            protocol,
            network,
            content_format,
            additional_info,
        })
    }
}

/// One container or item, as read from the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DidlObject {
    pub kind: ObjectKind,
    pub id: String,
    pub parent_id: String,
    pub title: Option<String>,
    pub class: String,
    pub resources: Vec<Resource>,
}

impl DidlObject {
    pub fn first_resource(&self) -> Option<&Resource> {
        self.resources.first()
    }
}

#[derive(Debug)]
struct PartialObject {
    kind: ObjectKind,
    depth: usize,
    id: Option<String>,
    parent_id: Option<String>,
    title: Option<String>,
    class: Option<String>,
    resources: Vec<Resource>,
}

impl PartialObject {
    fn finish(self) -> Result<DidlObject, DidlError> {
        let kind = self.kind.tag();
        Ok(DidlObject {
            kind: self.kind,
            id: self.id.ok_or(DidlError::MissingField { kind, field: "id" })?,
            parent_id: self.parent_id.ok_or(DidlError::MissingField {
                kind,
                field: "parentID",
            })?,
            title: self.title,
            class: self.class.ok_or(DidlError::MissingField {
                kind,
                field: "upnp:class",
            })?,
            resources: self.resources,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Class,
    Resource,
}

/// Streaming DIDL-Lite reader.
///
/// Objects nested inside a container are reported too, each one when its own
/// end tag is reached. Only direct children of an object fill its title, class
/// and resources: a `<desc>` block or any other extension is skipped.
pub struct DidlParser<'a> {
    reader: Reader<&'a [u8]>,
    depth: usize,
    stack: Vec<PartialObject>,
    field: Option<Field>,
    text: String,
    pending_protocol_info: Option<String>,
    done: bool,
}

impl<'a> DidlParser<'a> {
    pub fn new(xml: &'a str) -> Self {
        // Text is trimmed per field: entity references split text events and
        // reader-side trimming would eat the spaces around them.
        let reader = Reader::from_str(xml);

        Self {
            reader,
            depth: 0,
            stack: Vec::new(),
            field: None,
            text: String::new(),
            pending_protocol_info: None,
            done: false,
        }
    }

    fn start_element(
        &mut self,
        e: &BytesStart<'_>,
        depth: usize,
        empty: bool,
    ) -> Result<Option<DidlObject>, DidlError> {
        match e.local_name().as_ref() {
            b"container" | b"item" => {
                let kind = if e.local_name().as_ref() == b"container" {
                    ObjectKind::Container
                } else {
                    ObjectKind::Item
                };
                let mut object = PartialObject {
                    kind,
                    depth,
                    id: None,
                    parent_id: None,
                    title: None,
                    class: None,
                    resources: Vec::new(),
                };
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.local_name().as_ref() {
                        b"id" => object.id = Some(attr.unescape_value()?.into_owned()),
                        b"parentID" => {
                            object.parent_id = Some(attr.unescape_value()?.into_owned())
                        }
                        _ => {}
                    }
                }

                if empty {
                    return object.finish().map(Some);
                }
                self.stack.push(object);
            }
            b"title" | b"class" | b"res" if self.is_object_child(depth) => {
                let field = match e.local_name().as_ref() {
                    b"title" => Field::Title,
                    b"class" => Field::Class,
                    _ => Field::Resource,
                };

                if field == Field::Resource {
                    self.pending_protocol_info = None;
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.local_name().as_ref() == b"protocolInfo" {
                            self.pending_protocol_info = Some(attr.unescape_value()?.into_owned());
                        }
                    }
                }

                self.text.clear();
                self.field = Some(field);
                if empty {
                    self.end_field();
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn is_object_child(&self, depth: usize) -> bool {
        self.stack
            .last()
            .is_some_and(|object| depth == object.depth + 1)
    }

    fn end_field(&mut self) {
        let Some(field) = self.field.take() else {
            return;
        };
        let Some(object) = self.stack.last_mut() else {
            return;
        };
        let text = std::mem::take(&mut self.text);
        let text = text.trim();

        match field {
            Field::Title => object.title = Some(text.to_string()),
            Field::Class => object.class = Some(text.to_string()),
            Field::Resource => {
                // <res> without URI cannot be opened
                if text.is_empty() {
                    return;
                }
                object.resources.push(Resource {
                    protocol_info: self.pending_protocol_info.take().unwrap_or_default(),
                    uri: text.to_string(),
                });
            }
        }
    }

    fn push_text(&mut self, text: Cow<'_, str>) {
        if self.field.is_some() {
            self.text.push_str(&text);
        }
    }

    fn next_object(&mut self) -> Result<Option<DidlObject>, DidlError> {
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => {
                    self.depth += 1;
                    if let Some(object) = self.start_element(&e, self.depth, false)? {
                        return Ok(Some(object));
                    }
                }
                Event::Empty(e) => {
                    if let Some(object) = self.start_element(&e, self.depth + 1, true)? {
                        return Ok(Some(object));
                    }
                }
                Event::End(e) => {
                    let depth = self.depth;
                    self.depth = self.depth.saturating_sub(1);
                    match e.local_name().as_ref() {
                        b"container" | b"item"
                            if self.stack.last().is_some_and(|o| o.depth == depth) =>
                        {
                            self.field = None;
                            if let Some(object) = self.stack.pop() {
                                return object.finish().map(Some);
                            }
                        }
                        b"title" | b"class" | b"res" if self.is_object_child(depth) => {
                            self.end_field()
                        }
                        _ => {}
                    }
                }
                Event::Text(e) => {
                    let text = e.decode()?;
                    self.push_text(text);
                }
                Event::CData(e) => {
                    let text = e.decode()?;
                    self.push_text(text);
                }
                Event::GeneralRef(e) => {
                    if self.field.is_none() {
                        continue;
                    }
                    if let Some(ch) = e.resolve_char_ref()? {
                        self.text.push(ch);
                    } else {
                        let name = e.decode()?;
                        let resolved = resolve_predefined_entity(&name)
                            .ok_or_else(|| DidlError::UnknownEntity(name.to_string()))?;
                        self.text.push_str(resolved);
                    }
                }
                Event::Eof => {
                    return match self.stack.last() {
                        Some(object) => Err(DidlError::UnexpectedEof(object.kind.tag())),
                        None => Ok(None),
                    };
                }
                _ => {}
            }
        }
    }
}

impl Iterator for DidlParser<'_> {
    type Item = Result<DidlObject, DidlError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_object() {
            Ok(Some(object)) => Some(Ok(object)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Parse a whole listing. An empty payload is an empty listing.
pub fn parse_didl(xml: &str) -> Result<Vec<DidlObject>, DidlError> {
    let trimmed = xml.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    DidlParser::new(trimmed).collect()
}
