use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use xz::bufread::XzDecoder;

use crate::data::osm::{Element, ElementKind, RawTag};
use crate::errors::{Error, Result};

pub const DEFAULT_KINDS: [ElementKind; 3] =
    [ElementKind::Node, ElementKind::Way, ElementKind::Relation];

/// Pull-based iterator over top-level elements of the requested kinds.
///
/// The file is never materialized: one event buffer is reused, and each
/// yielded [`Element`] owns its subtree outright, so peak memory is bounded
/// by the largest single element regardless of document size. Parse errors
/// surface as [`Error::MalformedSource`] and end the stream.
pub struct ElementReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    kinds: Vec<ElementKind>,
    current: Option<Element>,
}

impl<R: BufRead> ElementReader<R> {
    pub fn from_reader(source: R, kinds: &[ElementKind]) -> ElementReader<R> {
        ElementReader {
            reader: Reader::from_reader(source),
            buf: Vec::new(),
            kinds: kinds.to_vec(),
            current: None,
        }
    }

    fn element_from_start(kind: ElementKind, el: &BytesStart) -> Result<Element> {
        let mut element = Element::new(kind);
        for attribute in el.attributes() {
            let attribute = attribute?;
            let key = str::from_utf8(attribute.key.as_ref())?.to_string();
            let value = attribute.unescape_value()?.into_owned();
            element.attributes.insert(key, value);
        }
        Ok(element)
    }

    /// Records a nested `<tag>` or `<nd>` child on the element currently
    /// being assembled. Children of elements we are not collecting, and
    /// child kinds we do not know, are ignored.
    fn push_child(current: &mut Option<Element>, el: &BytesStart) -> Result<()> {
        let Some(element) = current.as_mut() else {
            return Ok(());
        };
        match el.name().as_ref() {
            b"tag" => {
                let mut key = None;
                let mut value = None;
                for attribute in el.attributes() {
                    let attribute = attribute?;
                    match attribute.key.as_ref() {
                        b"k" => key = Some(attribute.unescape_value()?.into_owned()),
                        b"v" => value = Some(attribute.unescape_value()?.into_owned()),
                        _ => (),
                    }
                }
                element.tags.push(RawTag {
                    key: key.ok_or_else(|| Error::missing_field("tag", "k"))?,
                    value: value.ok_or_else(|| Error::missing_field("tag", "v"))?,
                });
            }
            b"nd" => {
                let mut node_ref = None;
                for attribute in el.attributes() {
                    let attribute = attribute?;
                    if attribute.key.as_ref() == b"ref" {
                        node_ref = Some(attribute.unescape_value()?.into_owned());
                    }
                }
                element
                    .node_refs
                    .push(node_ref.ok_or_else(|| Error::missing_field("nd", "ref"))?);
            }
            _ => (),
        }
        Ok(())
    }
}

impl ElementReader<Box<dyn BufRead>> {
    /// Opens an .osm file, transparently decompressing `.xz` exports.
    pub fn from_path(path: &Path, kinds: &[ElementKind]) -> Result<ElementReader<Box<dyn BufRead>>> {
        let file = File::open(path)?;
        let compressed = path.extension().map_or(false, |ext| ext == "xz");
        let source: Box<dyn BufRead> = if compressed {
            Box::new(BufReader::new(XzDecoder::new(BufReader::new(file))))
        } else {
            Box::new(BufReader::new(file))
        };
        Ok(ElementReader::from_reader(source, kinds))
    }
}

impl<R: BufRead> Iterator for ElementReader<R> {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(err) => return Some(Err(err.into())),
            };
            match event {
                Event::Eof => return None,
                Event::Start(el) => match ElementKind::from_name(el.name().as_ref()) {
                    Some(kind) => {
                        if self.kinds.contains(&kind) {
                            match Self::element_from_start(kind, &el) {
                                Ok(element) => self.current = Some(element),
                                Err(err) => return Some(Err(err)),
                            }
                        }
                    }
                    None => {
                        if let Err(err) = Self::push_child(&mut self.current, &el) {
                            return Some(Err(err));
                        }
                    }
                },
                Event::Empty(el) => match ElementKind::from_name(el.name().as_ref()) {
                    Some(kind) => {
                        if self.kinds.contains(&kind) {
                            return Some(Self::element_from_start(kind, &el));
                        }
                    }
                    None => {
                        if let Err(err) = Self::push_child(&mut self.current, &el) {
                            return Some(Err(err));
                        }
                    }
                },
                Event::End(el) => {
                    if ElementKind::from_name(el.name().as_ref()).is_some() {
                        if let Some(element) = self.current.take() {
                            return Some(Ok(element));
                        }
                    }
                }
                // Declarations, comments and inter-element whitespace.
                _ => (),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="test">
  <node id="1" lat="46.39" lon="-117.00" user="alice" uid="7" version="2" changeset="11" timestamp="2013-01-01T00:00:00Z">
    <tag k="addr:street" v="5 N. Elm Ave"/>
  </node>
  <node id="2" lat="46.40" lon="-117.01" user="bob" uid="8" version="1" changeset="12" timestamp="2013-01-02T00:00:00Z"/>
  <way id="10" user="alice" uid="7" version="1" changeset="13" timestamp="2013-01-03T00:00:00Z">
    <nd ref="1"/>
    <nd ref="2"/>
    <tag k="highway" v="residential"/>
  </way>
  <relation id="20" user="bob" uid="8" version="1" changeset="14" timestamp="2013-01-04T00:00:00Z">
    <member type="way" ref="10" role="outer"/>
    <tag k="type" v="multipolygon"/>
  </relation>
</osm>
"#;

    fn read_all(kinds: &[ElementKind]) -> Vec<Element> {
        ElementReader::from_reader(Cursor::new(SAMPLE.as_bytes()), kinds)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn yields_only_requested_kinds() {
        let elements = read_all(&[ElementKind::Node, ElementKind::Way]);
        let kinds: Vec<ElementKind> = elements.iter().map(|el| el.kind).collect();
        assert_eq!(
            kinds,
            vec![ElementKind::Node, ElementKind::Node, ElementKind::Way]
        );
    }

    #[test]
    fn collects_attributes_and_children() {
        let elements = read_all(&DEFAULT_KINDS);

        let node = &elements[0];
        assert_eq!(node.attributes["id"], "1");
        assert_eq!(node.attributes["user"], "alice");
        assert_eq!(node.tags.len(), 1);
        assert_eq!(node.tags[0].key, "addr:street");
        assert_eq!(node.tags[0].value, "5 N. Elm Ave");

        let way = &elements[2];
        assert_eq!(way.kind, ElementKind::Way);
        assert_eq!(way.node_refs, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(way.tags[0].key, "highway");
    }

    #[test]
    fn relation_members_are_not_node_refs() {
        let elements = read_all(&[ElementKind::Relation]);
        assert_eq!(elements.len(), 1);
        assert!(elements[0].node_refs.is_empty());
        assert_eq!(elements[0].tags[0].value, "multipolygon");
    }

    #[test]
    fn malformed_source_halts_the_stream() {
        let broken = r#"<osm><node id="1" lat="0.0" lon="#;
        let mut reader =
            ElementReader::from_reader(Cursor::new(broken.as_bytes()), &DEFAULT_KINDS);
        let result = reader.next().unwrap();
        assert!(matches!(result, Err(Error::MalformedSource(_))));
    }

    #[test]
    fn empty_document_yields_nothing() {
        let mut reader = ElementReader::from_reader(
            Cursor::new(&b"<osm></osm>"[..]),
            &DEFAULT_KINDS,
        );
        assert!(reader.next().is_none());
    }
}
