//! Owning unit (residential property/unit) model

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::record::RemoteId;
use super::serde_helpers;
use crate::util::numeric_aware_cmp;

/// A residential unit that parking entries are billed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwningUnit {
    pub id: RemoteId,
    /// Owner display name
    #[serde(rename = "nombre", default, deserialize_with = "serde_helpers::optional_text")]
    pub owner_name: Option<String>,
    /// Property group, e.g. `Casa` or `Depto`
    #[serde(rename = "propiedad", default, deserialize_with = "serde_helpers::optional_text")]
    pub property: Option<String>,
    /// Unit label within the property, e.g. `12`
    #[serde(
        rename = "unidad_asignada",
        default,
        deserialize_with = "serde_helpers::optional_text"
    )]
    pub unit: Option<String>,
}

impl OwningUnit {
    /// Exact match on property and unit label. Units missing either value
    /// never match.
    pub fn matches(&self, property: &str, unit: &str) -> bool {
        self.property.as_deref() == Some(property) && self.unit.as_deref() == Some(unit)
    }

    /// `"{property} {unit}"`, e.g. `Casa 12`
    pub fn label(&self) -> String {
        format!(
            "{} {}",
            self.property.as_deref().unwrap_or("Sin propiedad"),
            self.unit.as_deref().unwrap_or("Sin unidad")
        )
    }

    /// Display fields embedded in listing rows
    pub fn summary(&self) -> UnitSummary {
        UnitSummary {
            owner_name: self.owner_name.clone(),
            property: self.property.clone(),
            unit: self.unit.clone(),
        }
    }
}

/// Find the unit selected by property and unit label
pub fn resolve_unit<'a>(units: &'a [OwningUnit], property: &str, unit: &str) -> Option<&'a OwningUnit> {
    let property = property.trim();
    let unit = unit.trim();
    units.iter().find(|candidate| candidate.matches(property, unit))
}

/// Sort by property, then by unit label with numeric-aware ordering
pub fn sort_units(units: &mut [OwningUnit]) {
    units.sort_by(|left, right| {
        compare_optional(left.property.as_deref(), right.property.as_deref())
            .then_with(|| compare_optional(left.unit.as_deref(), right.unit.as_deref()))
    });
}

/// Distinct property names, sorted
pub fn properties(units: &[OwningUnit]) -> Vec<String> {
    let mut names = units
        .iter()
        .filter_map(|unit| unit.property.clone())
        .collect::<Vec<_>>();
    names.sort();
    names.dedup();
    names
}

fn compare_optional(left: Option<&str>, right: Option<&str>) -> Ordering {
    match (left, right) {
        (Some(l), Some(r)) => numeric_aware_cmp(l, r),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Owning-unit display fields joined onto a record (`copropietarios`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSummary {
    #[serde(rename = "nombre", default, deserialize_with = "serde_helpers::optional_text")]
    pub owner_name: Option<String>,
    #[serde(rename = "propiedad", default, deserialize_with = "serde_helpers::optional_text")]
    pub property: Option<String>,
    #[serde(
        rename = "unidad_asignada",
        default,
        deserialize_with = "serde_helpers::optional_text"
    )]
    pub unit: Option<String>,
}
