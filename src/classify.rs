use crate::data::tags::Tags;

/// Decides whether a closed way describes an area or a closed line.
///
/// Only consulted for ways whose first and last node are the same.
pub trait AreaClassifier {
    fn is_area(&self, tags: &Tags) -> bool;
}

impl<F> AreaClassifier for F
where
    F: Fn(&Tags) -> bool,
{
    fn is_area(&self, tags: &Tags) -> bool {
        self(tags)
    }
}

/// Keys whose presence makes a closed way an area, whatever the value.
const AREA_KEYS: [&str; 12] = [
    "building",
    "landuse",
    "leisure",
    "amenity",
    "place",
    "boundary",
    "building:part",
    "area:highway",
    "shop",
    "tourism",
    "aeroway",
    "historic",
];

/// `natural` values drawn as lines even when closed.
const LINEAR_NATURAL: [&str; 5] = ["coastline", "cliff", "ridge", "arete", "tree_row"];

/// Keys that are areas only for specific values.
const AREA_VALUES: [(&str, &[&str]); 6] = [
    ("waterway", &["riverbank", "dock", "boatyard", "dam"]),
    ("highway", &["pedestrian", "rest_area", "services", "platform"]),
    ("railway", &["platform", "station"]),
    ("man_made", &["pier", "bridge", "wastewater_plant", "works"]),
    ("power", &["plant", "substation", "generator"]),
    ("barrier", &["city_wall"]),
];

/// Area rules following the usual OSM tagging conventions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAreaClassifier;

impl AreaClassifier for DefaultAreaClassifier {
    fn is_area(&self, tags: &Tags) -> bool {
        if tags.has_kv_pair("area", "no") {
            return false;
        }
        if tags.has_kv_pair("area", "yes") {
            return true;
        }
        if AREA_KEYS.iter().any(|key| tags.contains_key(key)) {
            return true;
        }
        if let Some(natural) = tags.get("natural") {
            return !LINEAR_NATURAL.contains(&natural);
        }
        if tags.contains_key("water") {
            return true;
        }
        AREA_VALUES
            .iter()
            .any(|(key, values)| values.iter().any(|value| tags.has_kv_pair(key, value)))
    }
}
