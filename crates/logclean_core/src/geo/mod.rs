pub mod enricher;
pub mod lookup;

pub use enricher::*;
pub use lookup::*;

use std::sync::Arc;

use crate::error::GeoDbError;

/// Load a JSON geo table from disk as a shareable lookup handle.
pub fn from_json_file(path: &str) -> Result<Arc<dyn GeoLookup>, GeoDbError> {
    Ok(Arc::new(lookup::StaticGeoDb::from_file(path)?))
}
