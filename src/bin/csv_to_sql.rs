use osm_wrangle::errors::Result;
use osm_wrangle::etl::load_sql::LoadSqlEtl;
use osm_wrangle::etl::Etl;
use osm_wrangle::{create_output_dir, load_user_config, setup_logging, CONFIG_FILE_NAME};

/// Stage 2: load the CSV relations into the SQLite database.
fn main() -> Result<()> {
    setup_logging();

    let config = load_user_config(CONFIG_FILE_NAME)?;
    let output_dir = create_output_dir(&config)?;
    LoadSqlEtl::new().process(&output_dir)
}
