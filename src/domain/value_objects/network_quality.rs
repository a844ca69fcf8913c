use serde::{Deserialize, Serialize};

/// Coarse link quality derived from probe latency. `Unusable` means the link
/// is nominally up but not worth attempting sync over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkQuality {
    Good,
    Fair,
    Poor,
    Unusable,
}

impl NetworkQuality {
    pub fn from_latency(latency_ms: u64, good_ms: u64, fair_ms: u64, poor_ms: u64) -> Self {
        if latency_ms <= good_ms {
            NetworkQuality::Good
        } else if latency_ms <= fair_ms {
            NetworkQuality::Fair
        } else if latency_ms <= poor_ms {
            NetworkQuality::Poor
        } else {
            NetworkQuality::Unusable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkQuality::Good => "good",
            NetworkQuality::Fair => "fair",
            NetworkQuality::Poor => "poor",
            NetworkQuality::Unusable => "unusable",
        }
    }

    pub fn is_usable(&self) -> bool {
        !matches!(self, NetworkQuality::Unusable)
    }
}
