//! Priceable material enumeration
//!
//! Rates are quoted per material; product weights reference the material they
//! are priced against. Wire form is lowercase ("gold", "silver").

use serde::{Deserialize, Serialize};
use std::fmt;

/// Material a rate is quoted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Material {
    Gold,
    Silver,
}

impl Material {
    /// Parse a wire-form material string into a Material.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gold" => Some(Material::Gold),
            "silver" => Some(Material::Silver),
            _ => None,
        }
    }

    /// Wire-form string for this material.
    pub fn as_str(&self) -> &'static str {
        match self {
            Material::Gold => "gold",
            Material::Silver => "silver",
        }
    }

    /// All known materials.
    pub fn all() -> [Material; 2] {
        [Material::Gold, Material::Silver]
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
