//! Rule-based Geofence Classifier: pure bounding-box containment test
//! against the current Zone Index snapshot. No detector state, no I/O,
//! just a plain function the Assessment Engine can call inline without
//! a soft deadline.

use crate::models::{GeofenceVerdict, Zone};

pub fn classify(lat: f64, lon: f64, restricted: &[Zone], safe: &[Zone]) -> GeofenceVerdict {
    if let Some(zone) = restricted.iter().find(|z| z.bounding_box().contains(lat, lon)) {
        return GeofenceVerdict {
            in_restricted: true,
            in_safe: false,
            zone_name: Some(zone.name.clone()),
            danger_level: Some(zone.rating),
            safety_rating: None,
        };
    }
    if let Some(zone) = safe.iter().find(|z| z.bounding_box().contains(lat, lon)) {
        return GeofenceVerdict {
            in_restricted: false,
            in_safe: true,
            zone_name: Some(zone.name.clone()),
            danger_level: None,
            safety_rating: Some(zone.rating),
        };
    }
    GeofenceVerdict::unknown()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ZoneKind;

    fn square(name: &str, kind: ZoneKind, rating: u8) -> Zone {
        Zone {
            id: 1,
            name: name.into(),
            polygon: vec![(77.20, 28.60), (77.25, 28.60), (77.25, 28.65), (77.20, 28.65)],
            kind,
            rating,
            is_active: true,
        }
    }

    #[test]
    fn restricted_zone_takes_priority_over_safe_zone() {
        let restricted = vec![square("border", ZoneKind::Restricted, 9)];
        let safe = vec![square("border", ZoneKind::Safe, 7)];
        let verdict = classify(28.62, 77.22, &restricted, &safe);
        assert!(verdict.in_restricted);
        assert_eq!(verdict.danger_level, Some(9));
    }

    #[test]
    fn outside_all_zones_is_unknown() {
        let verdict = classify(0.0, 0.0, &[], &[]);
        assert!(!verdict.in_restricted && !verdict.in_safe);
    }
}
