use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use log::{debug, info};
use regex::Regex;
use rusqlite::Connection;

use crate::errors::Result;
use crate::etl::shape_csv;
use crate::etl::Etl;

pub const ETL_NAME: &str = "load_sql";
pub const DB_FILE_NAME: &str = "osm_idaho.db";

const CREATE_NODES: &str = "\
CREATE TABLE nodes (
    id INTEGER PRIMARY KEY NOT NULL,
    lat REAL,
    lon REAL,
    user TEXT,
    uid INTEGER,
    version INTEGER,
    changeset INTEGER,
    timestamp TEXT
);";

const CREATE_NODES_TAGS: &str = "\
CREATE TABLE nodes_tags (
    id INTEGER,
    key TEXT,
    value TEXT,
    type TEXT,
    FOREIGN KEY (id) REFERENCES nodes(id)
);";

const CREATE_WAYS: &str = "\
CREATE TABLE ways (
    id INTEGER PRIMARY KEY NOT NULL,
    user TEXT,
    uid INTEGER,
    version TEXT,
    changeset INTEGER,
    timestamp TEXT
);";

const CREATE_WAYS_TAGS: &str = "\
CREATE TABLE ways_tags (
    id INTEGER NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    type TEXT,
    FOREIGN KEY (id) REFERENCES ways(id)
);";

const CREATE_WAYS_NODES: &str = "\
CREATE TABLE ways_nodes (
    id INTEGER NOT NULL,
    node_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    FOREIGN KEY (id) REFERENCES ways(id),
    FOREIGN KEY (node_id) REFERENCES nodes(id)
);";

// Table name, source CSV and schema, in parent-before-child load order.
const TABLE_LOADS: [(&str, &str, &str); 5] = [
    ("nodes", shape_csv::NODES_FILE_NAME, CREATE_NODES),
    ("nodes_tags", shape_csv::NODE_TAGS_FILE_NAME, CREATE_NODES_TAGS),
    ("ways", shape_csv::WAYS_FILE_NAME, CREATE_WAYS),
    ("ways_tags", shape_csv::WAY_TAGS_FILE_NAME, CREATE_WAYS_TAGS),
    ("ways_nodes", shape_csv::WAY_NODES_FILE_NAME, CREATE_WAYS_NODES),
];

/// Prepares one CSV field for splicing into an INSERT statement: forbidden
/// characters other than whitespace are stripped, double-space runs collapse
/// to one, and anything not purely numeric is single-quoted. Deliberately a
/// string-building strategy rather than parameter binding; rows the database
/// rejects become InsertFailure entries rather than aborting the load.
pub struct FieldSanitizer {
    strip: Regex,
    double_space: Regex,
    non_numeric: Regex,
}

impl FieldSanitizer {
    pub fn new() -> FieldSanitizer {
        FieldSanitizer {
            strip: Regex::new(r#"[=+/&<>;'"?%#$@,.\t\r\n]"#).unwrap(),
            double_space: Regex::new(r"  ").unwrap(),
            non_numeric: Regex::new(r"[^0-9.\-]").unwrap(),
        }
    }

    pub fn sanitize(&self, field: &str) -> String {
        let cleaned = self.strip.replace_all(field, "");
        let cleaned = self.double_space.replace_all(&cleaned, " ");
        if self.non_numeric.is_match(&cleaned) {
            format!("'{}'", cleaned)
        } else {
            cleaned.into_owned()
        }
    }
}

impl Default for FieldSanitizer {
    fn default() -> FieldSanitizer {
        FieldSanitizer::new()
    }
}

/// Outcome of loading one relation. `errors` holds the full statement text of
/// every insert the database rejected.
#[derive(Debug)]
pub struct TableLoad {
    pub table: String,
    pub inserted: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub tables: Vec<TableLoad>,
}

impl LoadReport {
    pub fn inserted(&self) -> u64 {
        self.tables.iter().map(|load| load.inserted).sum()
    }

    pub fn failed(&self) -> usize {
        self.tables.iter().map(|load| load.errors.len()).sum()
    }
}

pub struct LoadInput {
    conn: Connection,
    sources: Vec<(&'static str, csv::Reader<File>)>,
}

/// Stage 2: drops and recreates the five tables, then replays the CSVs into
/// them row by row.
pub struct LoadSqlEtl {
    sanitizer: FieldSanitizer,
}

impl LoadSqlEtl {
    pub fn new() -> LoadSqlEtl {
        LoadSqlEtl {
            sanitizer: FieldSanitizer::new(),
        }
    }

    fn initialize_tables(conn: &Connection) -> Result<()> {
        for (table, _, schema) in TABLE_LOADS {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", table))?;
            conn.execute_batch(schema)?;
        }
        Ok(())
    }

    /// Inserts every data row of one CSV, using the header row as the column
    /// list. Rejected rows are collected, never retried; the whole relation
    /// loads inside one transaction.
    fn fill_table<R: Read>(
        &self,
        conn: &mut Connection,
        table: &str,
        reader: &mut csv::Reader<R>,
    ) -> Result<TableLoad> {
        let mut load = TableLoad {
            table: table.to_string(),
            inserted: 0,
            errors: Vec::new(),
        };

        let tx = conn.transaction()?;
        let mut rows = reader.records();
        let columns = match rows.next() {
            Some(header) => header?.iter().collect::<Vec<_>>().join(","),
            None => return Ok(load),
        };

        for row in rows {
            let row = row?;
            let values: Vec<String> = row
                .iter()
                .map(|field| self.sanitizer.sanitize(field))
                .collect();
            let cmd = format!(
                "INSERT INTO {}({}) VALUES({});",
                table,
                columns,
                values.join(",")
            );
            match tx.execute(&cmd, []) {
                Ok(_) => load.inserted += 1,
                Err(_) => load.errors.push(cmd),
            }
        }
        tx.commit()?;

        Ok(load)
    }
}

impl Default for LoadSqlEtl {
    fn default() -> LoadSqlEtl {
        LoadSqlEtl::new()
    }
}

impl Etl for LoadSqlEtl {
    type Input = LoadInput;
    type Output = LoadReport;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    // The load recreates the schema every run; there is no cached state.
    fn is_cached(&self, _dir: &Path) -> Result<bool> {
        Ok(false)
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        let path = dir.join(DB_FILE_NAME);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    // Connection and all five CSV readers are opened before any row moves.
    fn extract(&mut self, dir: &Path) -> Result<Self::Input> {
        let conn = Connection::open(dir.join(DB_FILE_NAME))?;
        let mut sources = Vec::with_capacity(TABLE_LOADS.len());
        for (table, file_name, _) in TABLE_LOADS {
            let reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .from_path(dir.join(file_name))?;
            sources.push((table, reader));
        }
        Ok(LoadInput { conn, sources })
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let LoadInput { mut conn, sources } = input;
        Self::initialize_tables(&conn)?;

        let mut report = LoadReport::default();
        for (table, mut reader) in sources {
            report
                .tables
                .push(self.fill_table(&mut conn, table, &mut reader)?);
        }
        Ok(report)
    }

    fn load(&mut self, _dir: &Path, report: Self::Output) -> Result<()> {
        for table in &report.tables {
            info!(
                table = table.table.as_str(),
                inserted = table.inserted,
                failed = table.errors.len() as u64;
                "Table loaded"
            );
            for cmd in &table.errors {
                debug!(table = table.table.as_str(), cmd = cmd.as_str(); "Insert failed");
            }
        }
        info!(inserted = report.inserted(), failed = report.failed() as u64; "Database load finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_fields_stay_bare() {
        let sanitizer = FieldSanitizer::new();
        assert_eq!(sanitizer.sanitize("83501"), "83501");
        assert_eq!(sanitizer.sanitize("-117.035"), "-117.035");
    }

    #[test]
    fn text_fields_are_stripped_collapsed_and_quoted() {
        let sanitizer = FieldSanitizer::new();
        assert_eq!(sanitizer.sanitize("alice o'malley"), "'alice omalley'");
        assert_eq!(sanitizer.sanitize("a  b"), "'a b'");
        // Colons are not forbidden; timestamps keep them.
        assert_eq!(
            sanitizer.sanitize("2013-01-01T00:00:00Z"),
            "'2013-01-01T00:00:00Z'"
        );
        assert_eq!(sanitizer.sanitize("no, really?"), "'no really'");
    }

    fn csv_reader(data: &str) -> csv::Reader<&[u8]> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(data.as_bytes())
    }

    #[test]
    fn rejected_rows_are_recorded_and_skipped() {
        let etl = LoadSqlEtl::new();
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_NODES).unwrap();

        // The second row collides with the first one's primary key.
        let data = "id,lat,lon,user,uid,version,changeset,timestamp\n\
                    1,46.39,-117.00,alice,7,2,11,2013-01-01T00:00:00Z\n\
                    1,46.40,-117.01,bob,8,1,12,2013-01-02T00:00:00Z\n\
                    2,46.41,-117.02,carol,9,1,13,2013-01-03T00:00:00Z\n";
        let load = etl
            .fill_table(&mut conn, "nodes", &mut csv_reader(data))
            .unwrap();

        assert_eq!(load.inserted, 2);
        assert_eq!(load.errors.len(), 1);
        assert!(load.errors[0].starts_with("INSERT INTO nodes"));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
        let survivor: String = conn
            .query_row("SELECT user FROM nodes WHERE id = 2", [], |row| row.get(0))
            .unwrap();
        assert_eq!(survivor, "carol");
    }

    #[test]
    fn header_only_relation_loads_nothing() {
        let etl = LoadSqlEtl::new();
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_WAYS_NODES).unwrap();

        let load = etl
            .fill_table(&mut conn, "ways_nodes", &mut csv_reader("id,node_id,position\n"))
            .unwrap();
        assert_eq!(load.inserted, 0);
        assert!(load.errors.is_empty());
    }

    #[test]
    fn schema_is_recreated_on_initialize() {
        let conn = Connection::open_in_memory().unwrap();
        LoadSqlEtl::initialize_tables(&conn).unwrap();
        conn.execute("INSERT INTO nodes(id) VALUES(1)", []).unwrap();
        // A second initialize drops the old contents.
        LoadSqlEtl::initialize_tables(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
