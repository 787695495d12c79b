// geo/enricher.rs: single-slot lookup memoization and record projections
use std::sync::Arc;
use tracing::debug;

use super::lookup::{CityRecord, ConnectionTypeRecord, GeoLookup, GeoName, IspRecord};
use crate::value::{AreaInfo, CityInfo, Cleaned};

/// Remembers the result for the last IP only. Log lines for the same client
/// usually arrive back to back, so this catches most repeats without a real
/// cache.
#[derive(Debug)]
pub struct LookupSlot<T> {
    last_ip: Option<String>,
    cached: Option<T>,
    lookups: u64,
}

impl<T> Default for LookupSlot<T> {
    fn default() -> Self {
        Self { last_ip: None, cached: None, lookups: 0 }
    }
}

impl<T> LookupSlot<T> {
    /// Return the record for `ip`, calling `lookup` only when `ip` differs
    /// from the previous call. Misses are cached too.
    pub fn get_or_lookup(&mut self, ip: &str, lookup: impl FnOnce(&str) -> Option<T>) -> Option<&T> {
        if self.last_ip.as_deref() != Some(ip) {
            self.cached = lookup(ip);
            self.lookups += 1;
            if self.cached.is_none() {
                debug!(ip, "geo lookup miss");
            }
            self.last_ip = Some(ip.to_string());
        }
        self.cached.as_ref()
    }

    pub fn last_ip(&self) -> Option<&str> {
        self.last_ip.as_deref()
    }

    pub fn lookups(&self) -> u64 {
        self.lookups
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeoProjection {
    City,
    Region,
    Country,
    Isp,
    Asn,
    ConnectionType,
}

impl GeoProjection {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeoProjection::City => "geo_city",
            GeoProjection::Region => "geo_region",
            GeoProjection::Country => "geo_country",
            GeoProjection::Isp => "geo_isp",
            GeoProjection::Asn => "geo_asn",
            GeoProjection::ConnectionType => "geo_connection_type",
        }
    }
}

fn city_info(place: Option<&GeoName>) -> CityInfo {
    place.map_or_else(CityInfo::default, |p| CityInfo {
        id: p.geoname_id,
        title: p.name("en"),
        title_ru: p.name("ru"),
    })
}

fn area_info(place: Option<&GeoName>) -> AreaInfo {
    place.map_or_else(AreaInfo::default, |p| AreaInfo {
        id: p.geoname_id,
        iso_code: p.iso_code.clone(),
        title: p.name("en"),
        title_ru: p.name("ru"),
    })
}

pub fn project_city(rec: Option<&CityRecord>, projection: GeoProjection) -> Cleaned {
    match projection {
        GeoProjection::City => Cleaned::City(city_info(rec.and_then(|r| r.city.as_ref()))),
        GeoProjection::Region => Cleaned::Area(area_info(rec.and_then(|r| r.subdivisions.first()))),
        _ => Cleaned::Area(area_info(rec.and_then(|r| r.country.as_ref()))),
    }
}

pub fn project_isp(rec: Option<&IspRecord>, projection: GeoProjection) -> Cleaned {
    match projection {
        GeoProjection::Asn => Cleaned::Int(rec.and_then(|r| r.autonomous_system_number).map_or(0, i64::from)),
        _ => Cleaned::Text(rec.and_then(|r| r.isp.clone()).unwrap_or_default()),
    }
}

pub fn project_connection_type(rec: Option<&ConnectionTypeRecord>) -> Cleaned {
    Cleaned::Text(rec.and_then(|r| r.connection_type.clone()).unwrap_or_default())
}

/// What a projection degrades to when no record is available.
pub fn empty_projection(projection: GeoProjection) -> Cleaned {
    match projection {
        GeoProjection::City | GeoProjection::Region | GeoProjection::Country => project_city(None, projection),
        GeoProjection::Isp | GeoProjection::Asn => project_isp(None, projection),
        GeoProjection::ConnectionType => project_connection_type(None),
    }
}

/// Per-worker geo state: the shared lookup handle plus one memo slot per
/// database. Not for concurrent use; give each worker its own enricher.
pub struct GeoEnricher {
    db: Arc<dyn GeoLookup>,
    city: LookupSlot<CityRecord>,
    isp: LookupSlot<IspRecord>,
    connection: LookupSlot<ConnectionTypeRecord>,
}

impl GeoEnricher {
    pub fn new(db: Arc<dyn GeoLookup>) -> Self {
        Self {
            db,
            city: LookupSlot::default(),
            isp: LookupSlot::default(),
            connection: LookupSlot::default(),
        }
    }

    /// `ip` must already be validated.
    pub fn project(&mut self, ip: &str, projection: GeoProjection) -> Cleaned {
        let db = &self.db;
        match projection {
            GeoProjection::City | GeoProjection::Region | GeoProjection::Country => {
                project_city(self.city.get_or_lookup(ip, |ip| db.city(ip)), projection)
            }
            GeoProjection::Isp | GeoProjection::Asn => {
                project_isp(self.isp.get_or_lookup(ip, |ip| db.isp(ip)), projection)
            }
            GeoProjection::ConnectionType => {
                project_connection_type(self.connection.get_or_lookup(ip, |ip| db.connection_type(ip)))
            }
        }
    }

    /// Total lookups issued against the underlying databases.
    pub fn lookups(&self) -> u64 {
        self.city.lookups() + self.isp.lookups() + self.connection.lookups()
    }
}

impl std::fmt::Debug for GeoEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoEnricher")
            .field("city", &self.city)
            .field("isp", &self.isp)
            .field("connection", &self.connection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::testing::{fixture, CountingGeo};
    use std::sync::atomic::Ordering;

    #[test]
    fn test_slot_memoizes_last_ip_only() {
        let mut slot: LookupSlot<u32> = LookupSlot::default();
        let mut calls = 0;
        assert_eq!(slot.get_or_lookup("a", |_| { calls += 1; Some(1) }), Some(&1));
        assert_eq!(slot.get_or_lookup("a", |_| { calls += 1; Some(2) }), Some(&1));
        assert_eq!(slot.get_or_lookup("b", |_| { calls += 1; None }), None);
        assert_eq!(slot.get_or_lookup("b", |_| { calls += 1; Some(3) }), None);
        assert_eq!(calls, 2);
        assert_eq!(slot.last_ip(), Some("b"));
        assert_eq!(slot.lookups(), 2);
    }

    #[test]
    fn test_projections_share_one_lookup_per_database() {
        let geo = Arc::new(CountingGeo::new(fixture()));
        let mut enricher = GeoEnricher::new(geo.clone());

        assert_eq!(
            enricher.project("1.2.3.4", GeoProjection::City),
            Cleaned::City(CityInfo { id: Some(1), title: Some("Kazan".into()), title_ru: Some("Казань".into()) })
        );
        assert_eq!(
            enricher.project("1.2.3.4", GeoProjection::Region),
            Cleaned::Area(AreaInfo { id: Some(2), iso_code: Some("TA".into()), title: Some("Tatarstan".into()), title_ru: None })
        );
        let Cleaned::Area(country) = enricher.project("1.2.3.4", GeoProjection::Country) else {
            panic!("expected area");
        };
        assert_eq!(country.iso_code.as_deref(), Some("RU"));
        assert_eq!(geo.city_calls.load(Ordering::SeqCst), 1);

        assert_eq!(enricher.project("1.2.3.4", GeoProjection::Isp), Cleaned::Text("Tattelecom".into()));
        assert_eq!(enricher.project("1.2.3.4", GeoProjection::Asn), Cleaned::Int(28840));
        assert_eq!(geo.isp_calls.load(Ordering::SeqCst), 1);

        assert_eq!(enricher.project("1.2.3.4", GeoProjection::ConnectionType), Cleaned::Text("Cable/DSL".into()));
        assert_eq!(enricher.lookups(), 3);
    }

    #[test]
    fn test_new_ip_evicts_and_misses_degrade() {
        let geo = Arc::new(CountingGeo::new(fixture()));
        let mut enricher = GeoEnricher::new(geo.clone());

        enricher.project("1.2.3.4", GeoProjection::Country);
        assert_eq!(enricher.project("9.9.9.9", GeoProjection::Country), Cleaned::Area(AreaInfo::default()));
        assert_eq!(enricher.project("9.9.9.9", GeoProjection::City), Cleaned::City(CityInfo::default()));
        enricher.project("1.2.3.4", GeoProjection::Country);
        assert_eq!(geo.city_calls.load(Ordering::SeqCst), 3);

        // record present but without the projected attributes
        assert_eq!(enricher.project("5.6.7.8", GeoProjection::Isp), Cleaned::Text(String::new()));
        assert_eq!(enricher.project("5.6.7.8", GeoProjection::Asn), Cleaned::Int(0));
        assert_eq!(enricher.project("5.6.7.8", GeoProjection::ConnectionType), Cleaned::Text(String::new()));
    }

    #[test]
    fn test_empty_projection_defaults() {
        assert_eq!(empty_projection(GeoProjection::Asn), Cleaned::Int(0));
        assert_eq!(empty_projection(GeoProjection::Isp), Cleaned::Text(String::new()));
        assert_eq!(empty_projection(GeoProjection::Region), Cleaned::Area(AreaInfo::default()));
    }
}
