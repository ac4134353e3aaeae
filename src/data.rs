/// Raw elements as parsed from the .osm file, and the flat records they are
/// shaped into. The record field-order constants are the contract between the
/// CSV writers and the SQL table schemas.

pub mod osm;
pub mod records;
