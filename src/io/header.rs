use ahash::AHashMap;

use crate::osm::BoundingBox;

/// File-level metadata collected from the root element and any `bounds`
/// elements. Cheap to clone; the parser hands a copy to the header promise.
#[derive(Debug, Clone, Default)]
pub struct Header {
    options: AHashMap<String, String>,
    boxes: Vec<BoundingBox>,
    has_multiple_object_versions: bool,
}

impl Header {
    pub fn new() -> Header {
        Header::default()
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.options.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn add_box(&mut self, bbox: BoundingBox) {
        self.boxes.push(bbox);
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    /// True for OsmChange streams, which may carry several versions of the
    /// same object.
    pub fn has_multiple_object_versions(&self) -> bool {
        self.has_multiple_object_versions
    }

    pub fn set_has_multiple_object_versions(&mut self, value: bool) {
        self.has_multiple_object_versions = value;
    }
}
