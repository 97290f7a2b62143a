//! Filterable fields of the CRM entities.
//!
//! Each entity declares its fields once. The builder asks the registry which
//! operators a field offers and which input widget its values need.

use crate::model::{FieldType, FilterCondition, FilterGroup, Operator};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Operators offered for each field type, in menu order
pub fn operators_for(field_type: FieldType) -> &'static [Operator] {
    match field_type {
        FieldType::String => &[
            Operator::Equals,
            Operator::Contains,
            Operator::StartsWith,
            Operator::EndsWith,
            Operator::In,
        ],
        FieldType::Number | FieldType::Date => &[
            Operator::Equals,
            Operator::GreaterThan,
            Operator::LessThan,
            Operator::Between,
        ],
        FieldType::Boolean => &[Operator::Equals],
    }
}

/// Static description of one filterable attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterField {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Closed set of values; the builder renders a select instead of a text box
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Narrows the operators of a string field; other types always offer
    /// every operator of their type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operators: Option<Vec<Operator>>,
}

impl FilterField {
    pub fn new(id: impl Into<String>, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            field_type,
            options: None,
            operators: None,
        }
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = Some(options.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_operators(mut self, operators: &[Operator]) -> Self {
        self.operators = Some(operators.to_vec());
        self
    }

    /// Operators offered for this field, in menu order
    pub fn offered_operators(&self) -> Vec<Operator> {
        let narrowing = match self.field_type {
            FieldType::String => self.operators.as_deref(),
            _ => None,
        };
        operators_for(self.field_type)
            .iter()
            .copied()
            .filter(|op| narrowing.map_or(true, |allowed| allowed.contains(op)))
            .collect()
    }

    pub fn offers(&self, operator: Operator) -> bool {
        self.offered_operators().contains(&operator)
    }

    /// First offered operator, selected when the user picks this field
    pub fn default_operator(&self) -> Option<Operator> {
        self.offered_operators().first().copied()
    }

    /// Free-text string fields take part in the list view's search box
    pub fn is_searchable(&self) -> bool {
        self.field_type == FieldType::String && self.options.is_none() && self.offers(Operator::Contains)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("field `{0}` is declared more than once")]
    DuplicateField(String),
    #[error("field `{0}` has an empty id")]
    EmptyId(String),
    #[error("field `{field}` narrows to operators its {field_type} type never offers")]
    NoOperators { field: String, field_type: FieldType },
}

/// The CRM entities that have a filterable list view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Contacts,
    Customers,
    Subscriptions,
}

impl Entity {
    pub const ALL: [Entity; 3] = [Entity::Contacts, Entity::Customers, Entity::Subscriptions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Customers => "customers",
            Self::Subscriptions => "subscriptions",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }

    /// Built-in field declarations
    pub fn fields(&self) -> Vec<FilterField> {
        use FieldType::{Boolean, Date, Number};

        match self {
            Self::Contacts => vec![
                FilterField::new("firstName", "First name", FieldType::String),
                FilterField::new("lastName", "Last name", FieldType::String),
                FilterField::new("email", "Email", FieldType::String),
                FilterField::new("phone", "Phone", FieldType::String),
                FilterField::new("source", "Source", FieldType::String)
                    .with_options(&["WEBSITE", "REFERRAL", "TOURNAMENT", "SOCIAL"]),
                FilterField::new("status", "Status", FieldType::String)
                    .with_options(&["NEW", "CONTACTED", "TRIAL_BOOKED", "CONVERTED", "LOST"]),
                FilterField::new("childAge", "Child age", Number),
                FilterField::new("trialLessonDone", "Trial lesson done", Boolean),
                FilterField::new("createdAt", "Created", Date),
            ],
            Self::Customers => vec![
                FilterField::new("firstName", "First name", FieldType::String),
                FilterField::new("lastName", "Last name", FieldType::String),
                FilterField::new("email", "Email", FieldType::String),
                FilterField::new("city", "City", FieldType::String),
                FilterField::new("level", "Level", FieldType::String)
                    .with_options(&["BEGINNER", "INTERMEDIATE", "ADVANCED", "TOURNAMENT"]),
                FilterField::new("rating", "Rating", Number),
                FilterField::new("isActive", "Active", Boolean),
                FilterField::new("joinedAt", "Joined", Date),
            ],
            Self::Subscriptions => vec![
                FilterField::new("plan", "Plan", FieldType::String)
                    .with_options(&["MONTHLY", "QUARTERLY", "ANNUAL"]),
                FilterField::new("status", "Status", FieldType::String)
                    .with_options(&["ACTIVE", "PAUSED", "CANCELLED", "EXPIRED"]),
                FilterField::new("customerEmail", "Customer email", FieldType::String)
                    .with_operators(&[Operator::Equals, Operator::Contains]),
                FilterField::new("price", "Price", Number),
                FilterField::new("lessonsPerWeek", "Lessons per week", Number),
                FilterField::new("autoRenew", "Auto renew", Boolean),
                FilterField::new("startDate", "Start date", Date),
                FilterField::new("endDate", "End date", Date),
            ],
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only table of an entity's filterable fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRegistry {
    fields: Vec<FilterField>,
}

impl FieldRegistry {
    pub fn new(fields: Vec<FilterField>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for field in &fields {
            if field.id.trim().is_empty() {
                return Err(RegistryError::EmptyId(field.name.clone()));
            }
            if !seen.insert(field.id.as_str()) {
                return Err(RegistryError::DuplicateField(field.id.clone()));
            }
            if field.offered_operators().is_empty() {
                return Err(RegistryError::NoOperators {
                    field: field.id.clone(),
                    field_type: field.field_type,
                });
            }
        }
        Ok(Self { fields })
    }

    pub fn for_entity(entity: Entity) -> Self {
        Self {
            fields: entity.fields(),
        }
    }

    pub fn field(&self, id: &str) -> Option<&FilterField> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn fields(&self) -> &[FilterField] {
        &self.fields
    }

    /// Copy of `group` with each value read as its field's type stores it.
    /// Conditions on fields this registry does not know keep their values.
    pub fn coerce_values(&self, group: &FilterGroup) -> FilterGroup {
        let conditions = group
            .conditions
            .iter()
            .map(|condition| match (self.field(&condition.field_id), &condition.value) {
                (Some(field), Some(value)) => FilterCondition {
                    value: Some(value.clone().for_field_type(field.field_type)),
                    ..condition.clone()
                },
                _ => condition.clone(),
            })
            .collect();
        FilterGroup {
            logic: group.logic,
            conditions,
            groups: group.groups.iter().map(|g| Arc::new(self.coerce_values(g))).collect(),
        }
    }

    /// OR group of case-insensitive `contains` over every searchable field.
    /// A blank term yields the empty group.
    pub fn search_group(&self, term: &str) -> FilterGroup {
        let term = term.trim();
        if term.is_empty() {
            return FilterGroup::or();
        }
        self.fields
            .iter()
            .filter(|f| f.is_searchable())
            .fold(FilterGroup::or(), |group, field| {
                group.with_condition(FilterCondition::new(field.id.clone(), Operator::Contains, term))
            })
    }
}
