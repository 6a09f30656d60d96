//! Core data types shared by the extraction and reconciliation pipeline.
//!
//! A [`Project`] is the primary record, keyed by its externally supplied
//! `project_id`. Every other entity is a [`Lookup`] dictionary row: a shared,
//! name-keyed value referenced by many projects either through a column on
//! `projects` or through a join table.

use serde::Serialize;

/// The shared name dictionaries a project can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    Sponsor,
    Deliverable,
    TherapeuticArea,
    IngredientCategory,
    Ingredient,
    ResponsibleParty,
    RouteOfAdmin,
    Demographics,
}

/// How a lookup kind hangs off a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// Many-to-one: a nullable foreign-key column on `projects`.
    Column(&'static str),
    /// Many-to-many: a `(project_id, lookup_id)` join table.
    JoinTable(&'static str),
}

impl Lookup {
    pub const ALL: [Lookup; 8] = [
        Lookup::Sponsor,
        Lookup::Deliverable,
        Lookup::TherapeuticArea,
        Lookup::IngredientCategory,
        Lookup::Ingredient,
        Lookup::ResponsibleParty,
        Lookup::RouteOfAdmin,
        Lookup::Demographics,
    ];

    /// Single-valued relations, in the order they are applied.
    pub const SINGLE: [Lookup; 3] = [
        Lookup::Sponsor,
        Lookup::ResponsibleParty,
        Lookup::RouteOfAdmin,
    ];

    /// Multi-valued relations, in the order they are applied.
    pub const MULTI: [Lookup; 5] = [
        Lookup::Deliverable,
        Lookup::TherapeuticArea,
        Lookup::IngredientCategory,
        Lookup::Ingredient,
        Lookup::Demographics,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Lookup::Sponsor => "sponsors",
            Lookup::Deliverable => "deliverables",
            Lookup::TherapeuticArea => "therapeutic_areas",
            Lookup::IngredientCategory => "ingredient_categories",
            Lookup::Ingredient => "ingredients",
            Lookup::ResponsibleParty => "responsible_parties",
            Lookup::RouteOfAdmin => "routes_of_admin",
            Lookup::Demographics => "demographics",
        }
    }

    pub fn link(&self) -> Link {
        match self {
            Lookup::Sponsor => Link::Column("sponsor_id"),
            Lookup::ResponsibleParty => Link::Column("responsible_party_id"),
            Lookup::RouteOfAdmin => Link::Column("route_of_admin_id"),
            Lookup::Deliverable => Link::JoinTable("project_deliverables"),
            Lookup::TherapeuticArea => Link::JoinTable("project_therapeutic_areas"),
            Lookup::IngredientCategory => Link::JoinTable("project_ingredient_categories"),
            Lookup::Ingredient => Link::JoinTable("project_ingredients"),
            Lookup::Demographics => Link::JoinTable("project_demographics"),
        }
    }

    /// Key of this relation in the model's extraction JSON.
    pub fn field_key(&self) -> &'static str {
        match self {
            Lookup::Sponsor => "sponsor_name",
            Lookup::Deliverable => "deliverables",
            Lookup::TherapeuticArea => "therapeutic_areas",
            Lookup::IngredientCategory => "ingredient_categories",
            Lookup::Ingredient => "ingredients",
            Lookup::ResponsibleParty => "responsible_party",
            Lookup::RouteOfAdmin => "route_of_admin",
            Lookup::Demographics => "demographics",
        }
    }

    /// Human-readable label used in CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Lookup::Sponsor => "sponsor",
            Lookup::Deliverable => "deliverables",
            Lookup::TherapeuticArea => "therapeutic areas",
            Lookup::IngredientCategory => "ingredient categories",
            Lookup::Ingredient => "ingredients",
            Lookup::ResponsibleParty => "responsible party",
            Lookup::RouteOfAdmin => "route of admin",
            Lookup::Demographics => "demographics",
        }
    }
}

pub const FIELD_PROJECT_ID: &str = "project_id";
pub const FIELD_PROJECT_NAME: &str = "project_name";
pub const FIELD_PROJECT_STATUS: &str = "project_status";

/// Every key the extraction prompt asks the model for, in prompt order.
pub const EXTRACTION_KEYS: [&str; 11] = [
    FIELD_PROJECT_ID,
    FIELD_PROJECT_NAME,
    "sponsor_name",
    "deliverables",
    FIELD_PROJECT_STATUS,
    "therapeutic_areas",
    "ingredient_categories",
    "ingredients",
    "responsible_party",
    "route_of_admin",
    "demographics",
];

/// Whether an existing project may be overwritten by a later document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    SkipExisting,
    Overwrite,
}

impl UpdatePolicy {
    pub fn from_flag(update: bool) -> Self {
        if update {
            UpdatePolicy::Overwrite
        } else {
            UpdatePolicy::SkipExisting
        }
    }
}

/// Why a document produced no project write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingIdentifier,
    Exists { project_id: String },
    NoText,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingIdentifier => write!(f, "missing identifier"),
            SkipReason::Exists { project_id } => {
                write!(f, "exists, update not requested ({})", project_id)
            }
            SkipReason::NoText => write!(f, "no extractable text"),
        }
    }
}

/// Result of reconciling one normalized record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Created { project_id: String },
    Updated { project_id: String },
    Skipped(SkipReason),
}

/// A stored project with its relations resolved to display names.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Project {
    pub project_id: String,
    pub project_name: String,
    pub project_status: Option<String>,
    pub sponsor: Option<String>,
    pub responsible_party: Option<String>,
    pub route_of_admin: Option<String>,
    pub deliverables: Vec<String>,
    pub therapeutic_areas: Vec<String>,
    pub ingredient_categories: Vec<String>,
    pub ingredients: Vec<String>,
    pub demographics: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Project {
    pub fn single(&self, lookup: Lookup) -> Option<&str> {
        match lookup {
            Lookup::Sponsor => self.sponsor.as_deref(),
            Lookup::ResponsibleParty => self.responsible_party.as_deref(),
            Lookup::RouteOfAdmin => self.route_of_admin.as_deref(),
            _ => None,
        }
    }

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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_and_multi_partition_all() {
        let mut seen: Vec<Lookup> = Lookup::SINGLE.iter().chain(&Lookup::MULTI).copied().collect();
        seen.sort_by_key(|l| l.table());
        let mut all = Lookup::ALL.to_vec();
        all.sort_by_key(|l| l.table());
        assert_eq!(seen, all);

        for l in Lookup::SINGLE {
            assert!(matches!(l.link(), Link::Column(_)));
        }
        for l in Lookup::MULTI {
            assert!(matches!(l.link(), Link::JoinTable(_)));
        }
    }

    #[test]
    fn every_relation_key_is_requested() {
        for l in Lookup::ALL {
            assert!(EXTRACTION_KEYS.contains(&l.field_key()), "{:?}", l);
        }
    }
}
