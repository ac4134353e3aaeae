use osm_wrangle::errors::Result;
use osm_wrangle::etl::shape_csv::ShapeCsvEtl;
use osm_wrangle::etl::Etl;
use osm_wrangle::{create_output_dir, load_user_config, setup_logging, CONFIG_FILE_NAME};

/// Stage 1: shape the OSM export into the five CSV relations.
fn main() -> Result<()> {
    setup_logging();

    let config = load_user_config(CONFIG_FILE_NAME)?;
    let output_dir = create_output_dir(&config)?;
    ShapeCsvEtl::new(&config).process(&output_dir)
}
