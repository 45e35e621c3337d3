//! The administrative hierarchy: City Corporation -> Zone -> Ward.
//!
//! All writes validate chain consistency before they land. Any mismatch fails
//! closed with `InvalidGeography` — the tree never auto-corrects.

use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use cleancare_common::{CityCorporation, CleanCareError, GeoStatus, Ward, Zone};

/// Immutable-once-built view of the geography. Mutations go through
/// [`crate::GeoCache`], which swaps in a rebuilt snapshot so concurrent
/// readers never observe a half-applied write.
#[derive(Debug, Clone, Default)]
pub struct GeoTree {
    city_corporations: HashMap<String, CityCorporation>,
    zones: HashMap<Uuid, Zone>,
    wards: HashMap<Uuid, Ward>,

    zones_by_city: HashMap<String, BTreeSet<Uuid>>,
    wards_by_zone: HashMap<Uuid, BTreeSet<Uuid>>,
}

impl GeoTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn city_corporation(&self, code: &str) -> Option<&CityCorporation> {
        self.city_corporations.get(code)
    }

    pub fn zone(&self, id: Uuid) -> Option<&Zone> {
        self.zones.get(&id)
    }

    pub fn ward(&self, id: Uuid) -> Option<&Ward> {
        self.wards.get(&id)
    }

    /// All zone ids currently under a city corporation. Reflects the current
    /// tree — a city-level scope grows the moment a zone is added here.
    pub fn zones_under(&self, city_corporation_code: &str) -> BTreeSet<Uuid> {
        self.zones_by_city
            .get(city_corporation_code)
            .cloned()
            .unwrap_or_default()
    }

    /// All ward ids currently under a zone.
    pub fn wards_under(&self, zone_id: Uuid) -> BTreeSet<Uuid> {
        self.wards_by_zone.get(&zone_id).cloned().unwrap_or_default()
    }

    /// Confirm that `ward_id` belongs to `zone_id`, that `zone_id` belongs to
    /// `city_corporation_code`, and that the ward number falls inside the
    /// corporation's declared range.
    pub fn validate_chain(
        &self,
        ward_id: Uuid,
        zone_id: Uuid,
        city_corporation_code: &str,
    ) -> Result<(), CleanCareError> {
        let ward = self.wards.get(&ward_id).ok_or_else(|| {
            CleanCareError::InvalidGeography(format!("unknown ward {ward_id}"))
        })?;

        if ward.zone_id != zone_id {
            return Err(CleanCareError::InvalidGeography(format!(
                "ward {ward_id} belongs to zone {}, not zone {zone_id}",
                ward.zone_id
            )));
        }

        let zone = self.zones.get(&zone_id).ok_or_else(|| {
            CleanCareError::InvalidGeography(format!("unknown zone {zone_id}"))
        })?;

        if zone.city_corporation_code != city_corporation_code {
            return Err(CleanCareError::InvalidGeography(format!(
                "zone {zone_id} belongs to city corporation {}, not {city_corporation_code}",
                zone.city_corporation_code
            )));
        }

        let corp = self
            .city_corporations
            .get(city_corporation_code)
            .ok_or_else(|| {
                CleanCareError::InvalidGeography(format!(
                    "unknown city corporation {city_corporation_code}"
                ))
            })?;

        if ward.ward_number < corp.min_ward || ward.ward_number > corp.max_ward {
            return Err(CleanCareError::InvalidGeography(format!(
                "ward number {} outside {city_corporation_code} range {}-{}",
                ward.ward_number, corp.min_ward, corp.max_ward
            )));
        }

        Ok(())
    }

    pub fn upsert_city_corporation(
        &mut self,
        corp: CityCorporation,
    ) -> Result<(), CleanCareError> {
        if corp.code.trim().is_empty() {
            return Err(CleanCareError::Validation(
                "city corporation code must not be empty".to_string(),
            ));
        }
        if corp.min_ward > corp.max_ward {
            return Err(CleanCareError::Validation(format!(
                "city corporation {}: min_ward {} exceeds max_ward {}",
                corp.code, corp.min_ward, corp.max_ward
            )));
        }

        self.zones_by_city.entry(corp.code.clone()).or_default();
        self.city_corporations.insert(corp.code.clone(), corp);
        Ok(())
    }

    pub fn upsert_zone(&mut self, zone: Zone) -> Result<(), CleanCareError> {
        if !self
            .city_corporations
            .contains_key(&zone.city_corporation_code)
        {
            return Err(CleanCareError::InvalidGeography(format!(
                "zone {} references unknown city corporation {}",
                zone.id, zone.city_corporation_code
            )));
        }

        // Zone number is unique per city corporation, not globally.
        let clash = self
            .zones_by_city
            .get(&zone.city_corporation_code)
            .into_iter()
            .flatten()
            .any(|id| {
                *id != zone.id
                    && self
                        .zones
                        .get(id)
                        .is_some_and(|z| z.zone_number == zone.zone_number)
            });
        if clash {
            return Err(CleanCareError::InvalidGeography(format!(
                "zone number {} already exists under {}",
                zone.zone_number, zone.city_corporation_code
            )));
        }

        // Re-home the index entry if the zone moved between corporations.
        if let Some(prev) = self.zones.get(&zone.id) {
            if prev.city_corporation_code != zone.city_corporation_code {
                if let Some(ids) = self.zones_by_city.get_mut(&prev.city_corporation_code) {
                    ids.remove(&zone.id);
                }
            }
        }

        self.zones_by_city
            .entry(zone.city_corporation_code.clone())
            .or_default()
            .insert(zone.id);
        self.wards_by_zone.entry(zone.id).or_default();
        self.zones.insert(zone.id, zone);
        Ok(())
    }

    pub fn upsert_ward(&mut self, ward: Ward) -> Result<(), CleanCareError> {
        let zone = self.zones.get(&ward.zone_id).ok_or_else(|| {
            CleanCareError::InvalidGeography(format!(
                "ward {} references unknown zone {}",
                ward.id, ward.zone_id
            ))
        })?;

        let corp = self
            .city_corporations
            .get(&zone.city_corporation_code)
            .ok_or_else(|| {
                CleanCareError::ReferentialIntegrity(format!(
                    "zone {} references missing city corporation {}",
                    zone.id, zone.city_corporation_code
                ))
            })?;

        if ward.ward_number < corp.min_ward || ward.ward_number > corp.max_ward {
            return Err(CleanCareError::InvalidGeography(format!(
                "ward number {} outside {} range {}-{}",
                ward.ward_number, corp.code, corp.min_ward, corp.max_ward
            )));
        }

        // Ward number is unique per zone.
        let clash = self
            .wards_by_zone
            .get(&ward.zone_id)
            .into_iter()
            .flatten()
            .any(|id| {
                *id != ward.id
                    && self
                        .wards
                        .get(id)
                        .is_some_and(|w| w.ward_number == ward.ward_number)
            });
        if clash {
            return Err(CleanCareError::InvalidGeography(format!(
                "ward number {} already exists under zone {}",
                ward.ward_number, ward.zone_id
            )));
        }

        if let Some(prev) = self.wards.get(&ward.id) {
            if prev.zone_id != ward.zone_id {
                if let Some(ids) = self.wards_by_zone.get_mut(&prev.zone_id) {
                    ids.remove(&ward.id);
                }
            }
        }

        self.wards_by_zone
            .entry(ward.zone_id)
            .or_default()
            .insert(ward.id);
        self.wards.insert(ward.id, ward);
        Ok(())
    }

    /// Iterate active zones (for admin listings).
    pub fn active_zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values().filter(|z| z.status == GeoStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleancare_common::GeoStatus;

    fn corp(code: &str, min: u32, max: u32) -> CityCorporation {
        CityCorporation {
            code: code.to_string(),
            name: format!("{code} City Corporation"),
            min_ward: min,
            max_ward: max,
            status: GeoStatus::Active,
        }
    }

    fn zone(id: Uuid, number: u32, code: &str) -> Zone {
        Zone {
            id,
            zone_number: number,
            city_corporation_code: code.to_string(),
            officer_name: None,
            officer_contact: None,
            status: GeoStatus::Active,
        }
    }

    fn ward(id: Uuid, number: u32, zone_id: Uuid) -> Ward {
        Ward {
            id,
            ward_number: number,
            zone_id,
            inspector_name: None,
            inspector_contact: None,
            status: GeoStatus::Active,
        }
    }

    fn small_tree() -> (GeoTree, Uuid, Uuid) {
        let mut tree = GeoTree::new();
        tree.upsert_city_corporation(corp("DSCC", 1, 75)).unwrap();
        let z = Uuid::new_v4();
        let w = Uuid::new_v4();
        tree.upsert_zone(zone(z, 1, "DSCC")).unwrap();
        tree.upsert_ward(ward(w, 14, z)).unwrap();
        (tree, z, w)
    }

    #[test]
    fn validate_chain_accepts_consistent_chain() {
        let (tree, z, w) = small_tree();
        assert!(tree.validate_chain(w, z, "DSCC").is_ok());
    }

    #[test]
    fn validate_chain_rejects_wrong_zone() {
        let (mut tree, _z, w) = small_tree();
        let other = Uuid::new_v4();
        tree.upsert_zone(zone(other, 2, "DSCC")).unwrap();
        let err = tree.validate_chain(w, other, "DSCC").unwrap_err();
        assert!(err.is_invalid_geography());
    }

    #[test]
    fn validate_chain_rejects_zone_of_other_corporation() {
        let (mut tree, _z, _w) = small_tree();
        tree.upsert_city_corporation(corp("DNCC", 1, 54)).unwrap();
        let dncc_zone = Uuid::new_v4();
        let dncc_ward = Uuid::new_v4();
        tree.upsert_zone(zone(dncc_zone, 1, "DNCC")).unwrap();
        tree.upsert_ward(ward(dncc_ward, 5, dncc_zone)).unwrap();

        // Ward exists and matches its zone, but the chain names the wrong corporation.
        let err = tree.validate_chain(dncc_ward, dncc_zone, "DSCC").unwrap_err();
        assert!(err.is_invalid_geography());
    }

    #[test]
    fn validate_chain_rejects_unknown_ward() {
        let (tree, z, _w) = small_tree();
        let err = tree.validate_chain(Uuid::new_v4(), z, "DSCC").unwrap_err();
        assert!(err.is_invalid_geography());
    }

    #[test]
    fn ward_number_must_fall_in_declared_range() {
        let (mut tree, z, _w) = small_tree();
        let out_of_range = ward(Uuid::new_v4(), 76, z);
        let err = tree.upsert_ward(out_of_range).unwrap_err();
        assert!(err.is_invalid_geography());
    }

    #[test]
    fn zone_number_unique_per_corporation_not_globally() {
        let (mut tree, _z, _w) = small_tree();

        // Same number under a different corporation is fine.
        tree.upsert_city_corporation(corp("DNCC", 1, 54)).unwrap();
        tree.upsert_zone(zone(Uuid::new_v4(), 1, "DNCC")).unwrap();

        // Same number under the same corporation is rejected.
        let err = tree.upsert_zone(zone(Uuid::new_v4(), 1, "DSCC")).unwrap_err();
        assert!(err.is_invalid_geography());
    }

    #[test]
    fn zones_under_reflects_current_tree() {
        let (mut tree, z, _w) = small_tree();
        assert_eq!(tree.zones_under("DSCC"), BTreeSet::from([z]));

        let z2 = Uuid::new_v4();
        tree.upsert_zone(zone(z2, 2, "DSCC")).unwrap();
        assert_eq!(tree.zones_under("DSCC"), BTreeSet::from([z, z2]));
    }

    #[test]
    fn upsert_zone_rejects_unknown_corporation() {
        let mut tree = GeoTree::new();
        let err = tree.upsert_zone(zone(Uuid::new_v4(), 1, "NOPE")).unwrap_err();
        assert!(err.is_invalid_geography());
    }

    #[test]
    fn corporation_with_inverted_range_is_rejected() {
        let mut tree = GeoTree::new();
        let err = tree.upsert_city_corporation(corp("DSCC", 10, 5)).unwrap_err();
        assert!(matches!(err, CleanCareError::Validation(_)));
    }
}
