//! Field normalization: untyped model output → [`NormalizedRecord`].
//!
//! This is the only place raw model JSON is inspected. Scalars survive only
//! as non-blank strings; lists survive only as their non-blank string
//! elements. Everything else (numbers, objects, `null`, missing keys) reads as
//! absent. Lookup names are whitespace-collapsed and deduplicated by
//! [`name_key`], so "Acme  Corp" and "ACME CORP" resolve to one dictionary row.

use serde_json::Value;

use crate::llm::RawExtraction;
use crate::models::{Lookup, FIELD_PROJECT_ID, FIELD_PROJECT_NAME, FIELD_PROJECT_STATUS};

/// Typed, validated fields ready for reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub project_status: Option<String>,
    pub sponsor: Option<String>,
    pub responsible_party: Option<String>,
    pub route_of_admin: Option<String>,
    pub deliverables: Vec<String>,
    pub therapeutic_areas: Vec<String>,
    pub ingredient_categories: Vec<String>,
    pub ingredients: Vec<String>,
    pub demographics: Vec<String>,
}

impl NormalizedRecord {
    /// Name for a single-valued relation, if supplied.
    pub fn single(&self, lookup: Lookup) -> Option<&str> {
        match lookup {
            Lookup::Sponsor => self.sponsor.as_deref(),
            Lookup::ResponsibleParty => self.responsible_party.as_deref(),
            Lookup::RouteOfAdmin => self.route_of_admin.as_deref(),
            _ => None,
        }
    }

    /// Names for a multi-valued relation; empty means "not supplied".
    pub fn many(&self, lookup: Lookup) -> &[String] {
        match lookup {
            Lookup::Deliverable => &self.deliverables,
            Lookup::TherapeuticArea => &self.therapeutic_areas,
            Lookup::IngredientCategory => &self.ingredient_categories,
            Lookup::Ingredient => &self.ingredients,
            Lookup::Demographics => &self.demographics,
            _ => &[],
        }
    }

    fn many_mut(&mut self, lookup: Lookup) -> Option<&mut Vec<String>> {
        match lookup {
            Lookup::Deliverable => Some(&mut self.deliverables),
            Lookup::TherapeuticArea => Some(&mut self.therapeutic_areas),
            Lookup::IngredientCategory => Some(&mut self.ingredient_categories),
            Lookup::Ingredient => Some(&mut self.ingredients),
            Lookup::Demographics => Some(&mut self.demographics),
            _ => None,
        }
    }

    fn single_mut(&mut self, lookup: Lookup) -> Option<&mut Option<String>> {
        match lookup {
            Lookup::Sponsor => Some(&mut self.sponsor),
            Lookup::ResponsibleParty => Some(&mut self.responsible_party),
            Lookup::RouteOfAdmin => Some(&mut self.route_of_admin),
            _ => None,
        }
    }
}

pub fn normalize(raw: &RawExtraction) -> NormalizedRecord {
    let mut record = NormalizedRecord {
        project_id: scalar(raw.get(FIELD_PROJECT_ID)),
        project_name: scalar(raw.get(FIELD_PROJECT_NAME)),
        project_status: scalar(raw.get(FIELD_PROJECT_STATUS)),
        ..Default::default()
    };

    for lookup in Lookup::SINGLE {
        if let Some(slot) = record.single_mut(lookup) {
            *slot = raw.get(lookup.field_key()).and_then(lookup_name);
        }
    }
    for lookup in Lookup::MULTI {
        if let Some(slot) = record.many_mut(lookup) {
            *slot = name_list(raw.get(lookup.field_key()));
        }
    }

    record
}

/// Collapse whitespace runs to single spaces and trim. `None` if blank.
pub fn normalize_name(name: &str) -> Option<String> {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Uniqueness key for lookup names.
pub fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn scalar(value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn lookup_name(value: &Value) -> Option<String> {
    normalize_name(value.as_str()?)
}

fn name_list(value: Option<&Value>) -> Vec<String> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut seen = std::collections::HashSet::new();
    items
        .iter()
        .filter_map(lookup_name)
        .filter(|name| seen.insert(name_key(name)))
        .collect()
}
