// logclean_core: pure Rust library for cleaning raw web-log fields before they are stored.
//
// Raw values go through a field type's step pipeline (null sentinels, decoding,
// escaping, validation, truncation) and, for structured fields, a leaf parser
// that yields referer, error payload or geolocation records.

pub mod cleaners;
pub mod error;
pub mod error_payload;
pub mod fields;
pub mod geo;
pub mod pipeline;
pub mod record;
pub mod referer;
pub mod schema;
pub mod urlsplit;
pub mod value;

pub use error::{FormatError, GeoDbError, RecordError, SchemaError};
pub use fields::{FieldSpec, Leaf, BUILTIN_FIELD_TYPES};
pub use geo::{GeoEnricher, GeoLookup, GeoProjection, StaticGeoDb};
pub use pipeline::{Pipeline, Step};
pub use record::{clean_ndjson, raw_from_bool, raw_from_json, RecordCleaner};
pub use schema::{cached_schema, ensure_schema_loaded, load_schema_internal, LoadedSchema, SCHEMA_CACHE};
pub use value::Cleaned;
