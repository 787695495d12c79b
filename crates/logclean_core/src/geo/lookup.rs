// geo/lookup.rs: geolocation capability and the records it returns
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::error::GeoDbError;

/// A named place from the City database (city, subdivision or country).
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoName {
    #[serde(default)]
    pub geoname_id: Option<u32>,
    #[serde(default)]
    pub iso_code: Option<String>,
    /// Localized names keyed by language code (`en`, `ru`, ...).
    #[serde(default)]
    pub names: HashMap<String, String>,
}

impl GeoName {
    pub fn name(&self, lang: &str) -> Option<String> {
        self.names.get(lang).cloned()
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CityRecord {
    #[serde(default)]
    pub city: Option<GeoName>,
    #[serde(default)]
    pub subdivisions: Vec<GeoName>,
    #[serde(default)]
    pub country: Option<GeoName>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct IspRecord {
    #[serde(default)]
    pub isp: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub autonomous_system_number: Option<u32>,
    #[serde(default)]
    pub autonomous_system_organization: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionTypeRecord {
    #[serde(default)]
    pub connection_type: Option<String>,
}

/// Offline IP databases. `None` means "address not found"; implementations
/// do no caching of their own.
pub trait GeoLookup: Send + Sync {
    fn city(&self, ip: &str) -> Option<CityRecord>;
    fn isp(&self, ip: &str) -> Option<IspRecord>;
    fn connection_type(&self, ip: &str) -> Option<ConnectionTypeRecord>;
}

/// In-memory tables keyed by IP string, loaded from JSON:
/// `{"city": {ip: record}, "isp": {ip: record}, "connection_type": {ip: record}}`.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct StaticGeoDb {
    #[serde(default)]
    pub city: HashMap<String, CityRecord>,
    #[serde(default)]
    pub isp: HashMap<String, IspRecord>,
    #[serde(default)]
    pub connection_type: HashMap<String, ConnectionTypeRecord>,
}

impl StaticGeoDb {
    pub fn from_json(json: &str) -> Result<Self, GeoDbError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &str) -> Result<Self, GeoDbError> {
        let data = fs::read_to_string(path).map_err(|source| GeoDbError::Io { path: path.to_string(), source })?;
        Self::from_json(&data)
    }

    pub fn len(&self) -> usize {
        self.city.len() + self.isp.len() + self.connection_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GeoLookup for StaticGeoDb {
    fn city(&self, ip: &str) -> Option<CityRecord> {
        self.city.get(ip).cloned()
    }

    fn isp(&self, ip: &str) -> Option<IspRecord> {
        self.isp.get(ip).cloned()
    }

    fn connection_type(&self, ip: &str) -> Option<ConnectionTypeRecord> {
        self.connection_type.get(ip).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_db_from_json() {
        let json = r#"{
          "city": {
            "1.2.3.4": {
              "city": { "geoname_id": 524901, "names": { "en": "Moscow", "ru": "Москва" } },
              "subdivisions": [ { "geoname_id": 524894, "iso_code": "MOW", "names": { "en": "Moscow" } } ],
              "country": { "geoname_id": 2017370, "iso_code": "RU", "names": { "en": "Russia", "ru": "Россия" } }
            }
          },
          "isp": { "1.2.3.4": { "isp": "Example Telecom", "autonomous_system_number": 64500 } }
        }"#;
        let db = StaticGeoDb::from_json(json).expect("geo json");
        assert_eq!(db.len(), 2);

        let rec = db.city("1.2.3.4").unwrap();
        assert_eq!(rec.city.unwrap().name("ru").as_deref(), Some("Москва"));
        assert_eq!(rec.subdivisions[0].iso_code.as_deref(), Some("MOW"));
        assert_eq!(db.isp("1.2.3.4").unwrap().autonomous_system_number, Some(64500));
        assert!(db.connection_type("1.2.3.4").is_none());
        assert!(db.city("8.8.8.8").is_none());
    }

    #[test]
    fn test_static_db_rejects_bad_json() {
        assert!(matches!(StaticGeoDb::from_json("{"), Err(GeoDbError::Json(_))));
    }
}
