use serde::{Deserialize, Serialize};

/// One bounding box produced by the detector, in pixels of the original image.
///
/// `class_id` serializes as `class` to match the detection response format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    pub confidence: f32,
    #[serde(rename = "class")]
    pub class_id: u32,
    pub name: String,
}

impl Detection {
    /// Compares the detection name against the normal class, ignoring case.
    /// `normal_class` must already be lowercase.
    pub fn is_normal_class(&self, normal_class: &str) -> bool {
        self.name.to_lowercase() == normal_class
    }
}

/// True when any detection differs from the normal class.
pub fn has_anomalies(detections: &[Detection], normal_class: &str) -> bool {
    detections.iter().any(|d| !d.is_normal_class(normal_class))
}
