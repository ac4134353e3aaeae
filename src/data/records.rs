use serde::Serialize;

// Field order in the CSVs must match the column order of the SQL schemas.
pub const NODE_FIELDS: [&str; 8] = [
    "id",
    "lat",
    "lon",
    "user",
    "uid",
    "version",
    "changeset",
    "timestamp",
];
pub const NODE_TAGS_FIELDS: [&str; 4] = ["id", "key", "value", "type"];
pub const WAY_FIELDS: [&str; 6] = ["id", "user", "uid", "version", "changeset", "timestamp"];
pub const WAY_TAGS_FIELDS: [&str; 4] = ["id", "key", "value", "type"];
pub const WAY_NODES_FIELDS: [&str; 3] = ["id", "node_id", "position"];

/// One `<node>` element's attributes. Values stay as the strings they were in
/// the source; typing happens when the SQL tables are created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    pub id: String,
    pub lat: String,
    pub lon: String,
    pub user: String,
    pub uid: String,
    pub version: String,
    pub changeset: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WayRecord {
    pub id: String,
    pub user: String,
    pub uid: String,
    pub version: String,
    pub changeset: String,
    pub timestamp: String,
}

/// A cleaned tag, owned by a node or a way through `id`. Shared by both tag
/// relations; they have the same shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagRecord {
    pub id: String,
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub tag_type: String,
}

/// One ordered point reference within a way. `position` is a dense 0-based
/// ordinal in document traversal order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WayNodeRecord {
    pub id: String,
    pub node_id: String,
    pub position: usize,
}
