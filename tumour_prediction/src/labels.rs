use serde::Serialize;
use std::fmt;

/// Classes the model was trained on, in output-vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TumourClass {
    Glioma,
    Meningioma,
    #[serde(rename = "No Tumor")]
    NoTumor,
    Pituitary,
}

pub const LABELS: [TumourClass; 4] = [
    TumourClass::Glioma,
    TumourClass::Meningioma,
    TumourClass::NoTumor,
    TumourClass::Pituitary,
];

impl TumourClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TumourClass::Glioma => "Glioma",
            TumourClass::Meningioma => "Meningioma",
            TumourClass::NoTumor => "No Tumor",
            TumourClass::Pituitary => "Pituitary",
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        LABELS.get(index).copied()
    }
}

impl fmt::Display for TumourClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
