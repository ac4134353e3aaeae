pub mod load_sql;
pub mod shape_csv;

use std::path::Path;

use log::{error, info};

use crate::errors::Result;

/// One stage of the wrangling pipeline. `process` drives the
/// extract/transform/load steps with stage-level logging and skips stages
/// whose output already exists.
pub trait Etl {
    type Input;
    type Output;

    fn etl_name(&self) -> &str;

    fn is_cached(&self, dir: &Path) -> Result<bool>;
    fn clean(&self, dir: &Path) -> Result<()>;

    fn extract(&mut self, dir: &Path) -> Result<Self::Input>;
    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;
    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()>;

    fn process(&mut self, dir: &Path) -> Result<()> {
        info!(etl_name = self.etl_name(); "Starting ETL process");
        if self.is_cached(dir)? {
            info!(etl_name = self.etl_name(); "Using cached value");
        } else {
            info!(etl_name = self.etl_name(); "Extracting");
            let input = match self.extract(dir) {
                Ok(input) => Ok(input),
                Err(err) => {
                    error!(etl_name = self.etl_name(), err = err.to_string(); "Extraction failed with error");
                    Err(err)
                }
            }?;

            info!(etl_name = self.etl_name(); "Transforming");
            let output = match self.transform(input) {
                Ok(output) => Ok(output),
                Err(err) => {
                    error!(etl_name = self.etl_name(), err = err.to_string(); "Transformation failed with error");
                    Err(err)
                }
            }?;

            info!(etl_name = self.etl_name(); "Loading");
            match self.load(dir, output) {
                Ok(_) => Ok(()),
                Err(err) => {
                    error!(etl_name = self.etl_name(), err = err.to_string(); "Loading failed with error");
                    Err(err)
                }
            }?;
        }
        info!(etl_name = self.etl_name(); "Process finished");
        Ok(())
    }
}
