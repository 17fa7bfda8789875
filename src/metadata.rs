//! The readable metadata tree shared by the reader, the writer and the scanner.
//!
//! A [`MetadataTree`] maps a fixed set of [`Group`]s to ordered field maps. It
//! serializes to the same JSON shape that presets and custom write requests use:
//!
//! ```json
//! {
//!   "0th":  { "Make": "SONY", "XResolution": [72, 1] },
//!   "Exif": { "LensModel": "FE 24-70mm F2.8 GM II" },
//!   "PNG Info": { "parameters": "Steps: 20, Sampler: Euler" }
//! }
//! ```

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A metadata group. The set is closed: anything else in JSON input is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Group {
    /// IFD0 — primary image tags.
    Zeroth,
    /// Exif sub-IFD.
    Exif,
    /// GPS sub-IFD.
    Gps,
    /// IFD1 — thumbnail tags.
    First,
    /// PNG tEXt / zTXt / iTXt entries.
    PngInfo,
    /// XMP packet, as a nested tree.
    Xmp,
}

impl Group {
    pub const ALL: [Group; 6] = [
        Group::Zeroth,
        Group::Exif,
        Group::Gps,
        Group::First,
        Group::PngInfo,
        Group::Xmp,
    ];

    /// The IFD groups carried inside an EXIF blob.
    pub const IFDS: [Group; 4] = [Group::Zeroth, Group::Exif, Group::Gps, Group::First];

    pub fn name(self) -> &'static str {
        match self {
            Group::Zeroth => "0th",
            Group::Exif => "Exif",
            Group::Gps => "GPS",
            Group::First => "1st",
            Group::PngInfo => "PNG Info",
            Group::Xmp => "XMP",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.name() == name)
    }

    pub fn is_ifd(self) -> bool {
        Self::IFDS.contains(&self)
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A readable metadata value.
///
/// Rationals are represented as `[num, den]` lists (or lists of those), the same
/// shape presets use. `Tree` only appears below the XMP group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<MetaValue>),
    Tree(BTreeMap<String, MetaValue>),
}

impl MetaValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetaValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Depth-first walk over every string below this value.
    ///
    /// `path` is the location of `self`; children extend it with their key (trees)
    /// or index (lists). The walk stops as soon as `visit` returns `Some`.
    pub fn find_text<T>(
        &self,
        path: &mut Vec<String>,
        visit: &mut impl FnMut(&[String], &str) -> Option<T>,
    ) -> Option<T> {
        match self {
            MetaValue::Text(s) => visit(path, s),
            MetaValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    path.push(i.to_string());
                    let found = item.find_text(path, visit);
                    path.pop();
                    if found.is_some() {
                        return found;
                    }
                }
                None
            }
            MetaValue::Tree(map) => {
                for (key, item) in map {
                    path.push(key.clone());
                    let found = item.find_text(path, visit);
                    path.pop();
                    if found.is_some() {
                        return found;
                    }
                }
                None
            }
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self {
        MetaValue::Int(i)
    }
}

/// Field name → value, ordered by name.
pub type Fields = BTreeMap<String, MetaValue>;

/// Group → fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTree {
    groups: BTreeMap<Group, Fields>,
}

impl MetadataTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(|f| f.is_empty())
    }

    pub fn group(&self, group: Group) -> Option<&Fields> {
        self.groups.get(&group)
    }

    pub fn group_mut(&mut self, group: Group) -> &mut Fields {
        self.groups.entry(group).or_default()
    }

    pub fn get(&self, group: Group, name: &str) -> Option<&MetaValue> {
        self.groups.get(&group)?.get(name)
    }

    pub fn get_text(&self, group: Group, name: &str) -> Option<&str> {
        self.get(group, name).and_then(MetaValue::as_text)
    }

    pub fn insert(&mut self, group: Group, name: impl Into<String>, value: impl Into<MetaValue>) {
        self.group_mut(group).insert(name.into(), value.into());
    }

    pub fn remove(&mut self, group: Group, name: &str) -> Option<MetaValue> {
        self.groups.get_mut(&group)?.remove(name)
    }

    /// Replace a whole group. An empty map removes the group.
    pub fn set_group(&mut self, group: Group, fields: Fields) {
        if fields.is_empty() {
            self.groups.remove(&group);
        } else {
            self.groups.insert(group, fields);
        }
    }

    /// Merge every group of `other` into `self`, field by field.
    pub fn merge(&mut self, other: MetadataTree) {
        for (group, fields) in other.groups {
            self.group_mut(group).extend(fields);
        }
    }

    /// Non-empty groups in canonical order.
    pub fn groups(&self) -> impl Iterator<Item = (Group, &Fields)> {
        self.groups
            .iter()
            .filter(|(_, f)| !f.is_empty())
            .map(|(g, f)| (*g, f))
    }

    /// Drop groups that ended up with no fields.
    pub fn prune(&mut self) {
        self.groups.retain(|_, f| !f.is_empty());
    }
}

impl Serialize for MetadataTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let groups: Vec<_> = self.groups().collect();
        let mut map = serializer.serialize_map(Some(groups.len()))?;
        for (group, fields) in groups {
            map.serialize_entry(group.name(), fields)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MetadataTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: BTreeMap<String, Option<Fields>> = BTreeMap::deserialize(deserializer)?;
        let mut tree = MetadataTree::new();
        for (name, fields) in raw {
            match Group::from_name(&name) {
                Some(group) => tree.set_group(group, fields.unwrap_or_default()),
                None => log::warn!("Ignoring unknown metadata group `{name}`"),
            }
        }
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_names_round_trip() {
        for group in Group::ALL {
            assert_eq!(Group::from_name(group.name()), Some(group));
        }
        assert_eq!(Group::from_name("Interop"), None);
    }

    #[test]
    fn deserialize_preset_shape() {
        let json = r#"{
            "0th": {"Make": "SONY", "XResolution": [72, 1]},
            "Exif": {"LensSpecification": [[24, 1], [70, 1], [28, 10], [28, 10]]},
            "GPS": {},
            "thumbnail": null
        }"#;
        let tree: MetadataTree = serde_json::from_str(json).unwrap();
        assert_eq!(tree.get_text(Group::Zeroth, "Make"), Some("SONY"));
        assert_eq!(
            tree.get(Group::Zeroth, "XResolution"),
            Some(&MetaValue::List(vec![MetaValue::Int(72), MetaValue::Int(1)]))
        );
        assert!(tree.group(Group::Gps).is_none());
        assert_eq!(tree.groups().count(), 2);
    }

    #[test]
    fn deserialize_scalars() {
        let json = r#"{"0th": {"a": null, "b": true, "c": -3, "d": 1.5, "e": "x"}}"#;
        let tree: MetadataTree = serde_json::from_str(json).unwrap();
        let fields = tree.group(Group::Zeroth).unwrap();
        assert_eq!(fields["a"], MetaValue::Null);
        assert_eq!(fields["b"], MetaValue::Bool(true));
        assert_eq!(fields["c"], MetaValue::Int(-3));
        assert_eq!(fields["d"], MetaValue::Float(1.5));
        assert_eq!(fields["e"], MetaValue::Text("x".into()));
    }

    #[test]
    fn serialize_skips_empty_groups() {
        let mut tree = MetadataTree::new();
        tree.group_mut(Group::Gps);
        tree.insert(Group::PngInfo, "parameters", "Steps: 20");
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"PNG Info": {"parameters": "Steps: 20"}})
        );
    }

    #[test]
    fn find_text_depth_first() {
        let json = r#"{"a": {"b": ["x", {"c": "needle"}]}, "z": "needle too"}"#;
        let value: MetaValue = serde_json::from_str(json).unwrap();
        let mut path = Vec::new();
        let found = value.find_text(&mut path, &mut |p, s| {
            s.contains("needle").then(|| p.join("/"))
        });
        assert_eq!(found.as_deref(), Some("a/b/1/c"));
        assert!(path.is_empty());
    }
}
