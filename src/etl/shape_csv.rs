use std::fs::{self, File};
use std::io::BufRead;
use std::path::Path;

use log::info;

use crate::clean::TagCleaner;
use crate::data::osm::{Element, ElementKind};
use crate::data::records::{
    NodeRecord, TagRecord, WayNodeRecord, WayRecord, NODE_FIELDS, NODE_TAGS_FIELDS, WAY_FIELDS,
    WAY_NODES_FIELDS, WAY_TAGS_FIELDS,
};
use crate::errors::{Error, Result};
use crate::etl::Etl;
use crate::reader::ElementReader;
use crate::UserConfig;

pub const ETL_NAME: &str = "shape_csv";

pub const NODES_FILE_NAME: &str = "nodes.csv";
pub const NODE_TAGS_FILE_NAME: &str = "nodes_tags.csv";
pub const WAYS_FILE_NAME: &str = "ways.csv";
pub const WAY_TAGS_FILE_NAME: &str = "ways_tags.csv";
pub const WAY_NODES_FILE_NAME: &str = "ways_nodes.csv";

pub const OUTPUT_FILE_NAMES: [&str; 5] = [
    NODES_FILE_NAME,
    NODE_TAGS_FILE_NAME,
    WAYS_FILE_NAME,
    WAY_TAGS_FILE_NAME,
    WAY_NODES_FILE_NAME,
];

// Only nodes and ways are shaped; relations never reach the shaper.
const SHAPED_KINDS: [ElementKind; 2] = [ElementKind::Node, ElementKind::Way];

/// Owns the five CSV writers. Headers are written up front so every relation
/// carries its field list even when no records follow.
pub struct CsvEmitter {
    nodes: csv::Writer<File>,
    node_tags: csv::Writer<File>,
    ways: csv::Writer<File>,
    way_tags: csv::Writer<File>,
    way_nodes: csv::Writer<File>,
}

impl CsvEmitter {
    pub fn create(dir: &Path) -> Result<CsvEmitter> {
        let mut nodes = Self::writer(dir, NODES_FILE_NAME)?;
        let mut node_tags = Self::writer(dir, NODE_TAGS_FILE_NAME)?;
        let mut ways = Self::writer(dir, WAYS_FILE_NAME)?;
        let mut way_tags = Self::writer(dir, WAY_TAGS_FILE_NAME)?;
        let mut way_nodes = Self::writer(dir, WAY_NODES_FILE_NAME)?;

        nodes.write_record(NODE_FIELDS)?;
        node_tags.write_record(NODE_TAGS_FIELDS)?;
        ways.write_record(WAY_FIELDS)?;
        way_tags.write_record(WAY_TAGS_FIELDS)?;
        way_nodes.write_record(WAY_NODES_FIELDS)?;

        Ok(CsvEmitter {
            nodes,
            node_tags,
            ways,
            way_tags,
            way_nodes,
        })
    }

    fn writer(dir: &Path, file_name: &str) -> Result<csv::Writer<File>> {
        Ok(csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(dir.join(file_name))?)
    }

    pub fn write_node(&mut self, record: &NodeRecord, tags: &[TagRecord]) -> Result<()> {
        self.nodes.serialize(record)?;
        for tag in tags {
            self.node_tags.serialize(tag)?;
        }
        Ok(())
    }

    pub fn write_way(
        &mut self,
        record: &WayRecord,
        node_refs: &[WayNodeRecord],
        tags: &[TagRecord],
    ) -> Result<()> {
        self.ways.serialize(record)?;
        for node_ref in node_refs {
            self.way_nodes.serialize(node_ref)?;
        }
        for tag in tags {
            self.way_tags.serialize(tag)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.nodes.flush()?;
        self.node_tags.flush()?;
        self.ways.flush()?;
        self.way_tags.flush()?;
        self.way_nodes.flush()?;
        Ok(())
    }
}

fn require(element: &Element, field: &str) -> Result<String> {
    element
        .attributes
        .get(field)
        .cloned()
        .ok_or_else(|| Error::missing_field(element.kind.as_str(), field))
}

fn clean_tags(cleaner: &TagCleaner, owner_id: &str, element: &Element) -> Vec<TagRecord> {
    element
        .tags
        .iter()
        .filter_map(|tag| cleaner.clean_tag(owner_id, &tag.key, &tag.value))
        .collect()
}

/// Shapes one `<node>` element into its record plus cleaned tags.
pub fn shape_node(cleaner: &TagCleaner, element: &Element) -> Result<(NodeRecord, Vec<TagRecord>)> {
    let record = NodeRecord {
        id: require(element, "id")?,
        lat: require(element, "lat")?,
        lon: require(element, "lon")?,
        user: require(element, "user")?,
        uid: require(element, "uid")?,
        version: require(element, "version")?,
        changeset: require(element, "changeset")?,
        timestamp: require(element, "timestamp")?,
    };
    let tags = clean_tags(cleaner, &record.id, element);
    Ok((record, tags))
}

/// Shapes one `<way>` element into its record, its ordered node references
/// and its cleaned tags. Positions are dense and follow document order.
pub fn shape_way(
    cleaner: &TagCleaner,
    element: &Element,
) -> Result<(WayRecord, Vec<WayNodeRecord>, Vec<TagRecord>)> {
    let record = WayRecord {
        id: require(element, "id")?,
        user: require(element, "user")?,
        uid: require(element, "uid")?,
        version: require(element, "version")?,
        changeset: require(element, "changeset")?,
        timestamp: require(element, "timestamp")?,
    };
    let node_refs = element
        .node_refs
        .iter()
        .enumerate()
        .map(|(position, node_id)| WayNodeRecord {
            id: record.id.clone(),
            node_id: node_id.clone(),
            position,
        })
        .collect();
    let tags = clean_tags(cleaner, &record.id, element);
    Ok((record, node_refs, tags))
}

#[derive(Debug, Default)]
pub struct ShapeReport {
    pub nodes: u64,
    pub node_tags: u64,
    pub ways: u64,
    pub way_tags: u64,
    pub way_nodes: u64,
}

pub struct ShapeInput {
    reader: ElementReader<Box<dyn BufRead>>,
    emitter: CsvEmitter,
}

pub struct ShapeOutput {
    emitter: CsvEmitter,
    report: ShapeReport,
}

/// Stage 1: streams the OSM export and writes the five CSV relations.
pub struct ShapeCsvEtl<'a> {
    config: &'a UserConfig,
    cleaner: TagCleaner,
}

impl<'a> ShapeCsvEtl<'a> {
    pub fn new(config: &UserConfig) -> ShapeCsvEtl {
        ShapeCsvEtl {
            config,
            cleaner: TagCleaner::new(),
        }
    }
}

impl Etl for ShapeCsvEtl<'_> {
    type Input = ShapeInput;
    type Output = ShapeOutput;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(OUTPUT_FILE_NAMES
            .iter()
            .all(|file_name| dir.join(file_name).exists()))
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        for file_name in OUTPUT_FILE_NAMES {
            let path = dir.join(file_name);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    // All output handles are acquired here, before the stream starts.
    fn extract(&mut self, dir: &Path) -> Result<Self::Input> {
        let reader = ElementReader::from_path(Path::new(&self.config.data_path), &SHAPED_KINDS)?;
        let emitter = CsvEmitter::create(dir)?;
        Ok(ShapeInput { reader, emitter })
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let ShapeInput { reader, mut emitter } = input;
        let mut report = ShapeReport::default();

        for element in reader {
            let element = element?;
            match element.kind {
                ElementKind::Node => {
                    let (record, tags) = shape_node(&self.cleaner, &element)?;
                    emitter.write_node(&record, &tags)?;
                    report.nodes += 1;
                    report.node_tags += tags.len() as u64;
                }
                ElementKind::Way => {
                    let (record, node_refs, tags) = shape_way(&self.cleaner, &element)?;
                    emitter.write_way(&record, &node_refs, &tags)?;
                    report.ways += 1;
                    report.way_nodes += node_refs.len() as u64;
                    report.way_tags += tags.len() as u64;
                }
                ElementKind::Relation => (),
            }
        }

        Ok(ShapeOutput { emitter, report })
    }

    fn load(&mut self, _dir: &Path, output: Self::Output) -> Result<()> {
        let ShapeOutput { mut emitter, report } = output;
        emitter.flush()?;
        info!(
            nodes = report.nodes,
            node_tags = report.node_tags,
            ways = report.ways,
            way_tags = report.way_tags,
            way_nodes = report.way_nodes;
            "Wrote CSV relations"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::osm::RawTag;

    fn node_element() -> Element {
        let mut element = Element::new(ElementKind::Node);
        for (key, value) in [
            ("id", "1"),
            ("lat", "46.39"),
            ("lon", "-117.00"),
            ("user", "alice"),
            ("uid", "7"),
            ("version", "2"),
            ("changeset", "11"),
            ("timestamp", "2013-01-01T00:00:00Z"),
        ] {
            element.attributes.insert(key.to_string(), value.to_string());
        }
        element
    }

    #[test]
    fn shapes_a_node_with_cleaned_address_tags() {
        let cleaner = TagCleaner::new();
        let mut element = node_element();
        element.tags.push(RawTag {
            key: "addr:street".to_string(),
            value: "5 N. Elm Ave".to_string(),
        });
        element.tags.push(RawTag {
            key: "addr:postcode".to_string(),
            value: "83501-99".to_string(),
        });

        let (record, tags) = shape_node(&cleaner, &element).unwrap();
        assert_eq!(record.id, "1");
        assert_eq!(record.lat, "46.39");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].id, "1");
        assert_eq!(tags[0].key, "street");
        assert_eq!(tags[0].value, "5 North Elm Avenue");
        assert_eq!(tags[0].tag_type, "addr");
        assert_eq!(tags[1].key, "postcode");
        assert_eq!(tags[1].value, "83501");
    }

    #[test]
    fn forbidden_keys_are_dropped_during_shaping() {
        let cleaner = TagCleaner::new();
        let mut element = node_element();
        element.tags.push(RawTag {
            key: "bad key".to_string(),
            value: "x".to_string(),
        });
        let (_, tags) = shape_node(&cleaner, &element).unwrap();
        assert!(tags.is_empty());
    }

    #[test]
    fn missing_attribute_is_an_error() {
        let cleaner = TagCleaner::new();
        let mut element = node_element();
        element.attributes.remove("uid");
        let err = shape_node(&cleaner, &element).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingField { ref field, .. } if field == "uid"
        ));
    }

    #[test]
    fn way_node_refs_get_dense_positions() {
        let cleaner = TagCleaner::new();
        let mut element = Element::new(ElementKind::Way);
        for (key, value) in [
            ("id", "10"),
            ("user", "alice"),
            ("uid", "7"),
            ("version", "1"),
            ("changeset", "13"),
            ("timestamp", "2013-01-03T00:00:00Z"),
        ] {
            element.attributes.insert(key.to_string(), value.to_string());
        }
        element.node_refs = vec!["5".to_string(), "3".to_string(), "9".to_string()];

        let (record, node_refs, _) = shape_way(&cleaner, &element).unwrap();
        assert_eq!(record.id, "10");
        let positions: Vec<usize> = node_refs.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(node_refs[1].node_id, "3");
        assert!(node_refs.iter().all(|r| r.id == "10"));
    }

    #[test]
    fn emitter_writes_headers_even_without_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut emitter = CsvEmitter::create(dir.path()).unwrap();
        emitter.flush().unwrap();

        let header = fs::read_to_string(dir.path().join(WAY_NODES_FILE_NAME)).unwrap();
        assert_eq!(header.trim_end(), "id,node_id,position");
    }
}
