//! Filter builder: the state machine behind the list view's filter panel.
//!
//! The builder owns one live `Arc<FilterGroup>`. Every transition produces a new
//! tree with `Arc::make_mut` along the edited path, so subtrees the edit did not
//! touch stay shared with the previous tree, and snapshots handed out earlier
//! never change. After each successful transition the change listener receives
//! the full new tree.

use crate::model::{ConditionValue, FieldType, FilterCondition, FilterGroup, Logic, Operator, Scalar};
use crate::registry::{FieldRegistry, FilterField};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Position of a group: indices into nested `groups`, root is empty
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GroupPath(Vec<usize>);

impl GroupPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn condition(&self, index: usize) -> ConditionPath {
        ConditionPath {
            group: self.clone(),
            index,
        }
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Parent path and this group's index in it; `None` for the root
    pub fn parent(&self) -> Option<(GroupPath, usize)> {
        let (last, rest) = self.0.split_last()?;
        Some((GroupPath(rest.to_vec()), *last))
    }
}

impl fmt::Display for GroupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("root");
        }
        let segments: Vec<String> = self.0.iter().map(|i| format!("g{}", i)).collect();
        f.write_str(&segments.join("."))
    }
}

/// Position of a condition inside a group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionPath {
    pub group: GroupPath,
    pub index: usize,
}

impl fmt::Display for ConditionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_root() {
            write!(f, "c{}", self.index)
        } else {
            write!(f, "{}.c{}", self.group, self.index)
        }
    }
}

/// How many values a widget collects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    Single,
    Multiple,
    Range,
}

/// Value input rendered for a `(field type, operator)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputWidget {
    TextInput,
    Select(Vec<String>),
    MultiSelect(Vec<String>),
    TagInput,
    NumberInput,
    NumberRange,
    DatePicker,
    DateRangePicker,
    Checkbox,
}

impl InputWidget {
    pub fn shape(&self) -> InputShape {
        match self {
            Self::MultiSelect(_) | Self::TagInput => InputShape::Multiple,
            Self::NumberRange | Self::DateRangePicker => InputShape::Range,
            _ => InputShape::Single,
        }
    }

    /// Whether `value` has the shape this widget produces
    pub fn accepts(&self, value: &ConditionValue) -> bool {
        let is_number = |s: &Scalar| matches!(s, Scalar::Number(_));
        let one_of = |options: &[String], s: &Scalar| s.as_text().is_some_and(|t| options.iter().any(|o| o == t));

        match (self, value) {
            (Self::TextInput, ConditionValue::Scalar(s)) => s.as_text().is_some(),
            (Self::Select(options), ConditionValue::Scalar(s)) => one_of(options, s),
            (Self::MultiSelect(options), ConditionValue::Scalar(s)) => one_of(options, s),
            (Self::MultiSelect(options), ConditionValue::List(items)) => items.iter().all(|s| one_of(options, s)),
            (Self::TagInput, ConditionValue::Scalar(s)) => s.as_text().is_some(),
            (Self::TagInput, ConditionValue::List(items)) => items.iter().all(|s| s.as_text().is_some()),
            (Self::NumberInput, ConditionValue::Scalar(s)) => is_number(s),
            (Self::NumberRange, ConditionValue::Range(r)) => {
                r.min.iter().chain(r.max.iter()).all(is_number)
            }
            (Self::DatePicker, ConditionValue::Scalar(Scalar::Date(_))) => true,
            (Self::DateRangePicker, ConditionValue::DateRange(_)) => true,
            (Self::Checkbox, ConditionValue::Scalar(Scalar::Bool(_))) => true,
            _ => false,
        }
    }
}

impl fmt::Display for InputWidget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TextInput => f.write_str("text"),
            Self::Select(options) => write!(f, "select [{}]", options.join(", ")),
            Self::MultiSelect(options) => write!(f, "multi-select [{}]", options.join(", ")),
            Self::TagInput => f.write_str("tag list"),
            Self::NumberInput => f.write_str("number"),
            Self::NumberRange => f.write_str("number range"),
            Self::DatePicker => f.write_str("date"),
            Self::DateRangePicker => f.write_str("date range"),
            Self::Checkbox => f.write_str("checkbox"),
        }
    }
}

/// Widget for entering the value of `field` under `operator`; `None` if the
/// field does not offer the operator.
pub fn input_widget(field: &FilterField, operator: Operator) -> Option<InputWidget> {
    if !field.offers(operator) {
        return None;
    }

    let widget = match (field.field_type, operator) {
        (FieldType::Boolean, _) => InputWidget::Checkbox,
        (FieldType::String, Operator::In) => match &field.options {
            Some(options) => InputWidget::MultiSelect(options.clone()),
            None => InputWidget::TagInput,
        },
        (FieldType::String, Operator::Equals) => match &field.options {
            Some(options) => InputWidget::Select(options.clone()),
            None => InputWidget::TextInput,
        },
        (FieldType::String, _) => InputWidget::TextInput,
        (FieldType::Number, Operator::Between) => InputWidget::NumberRange,
        (FieldType::Number, _) => InputWidget::NumberInput,
        (FieldType::Date, Operator::Between) => InputWidget::DateRangePicker,
        (FieldType::Date, _) => InputWidget::DatePicker,
    };
    Some(widget)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuilderError {
    #[error("no group at {0}")]
    NoSuchGroup(GroupPath),
    #[error("no condition at {0}")]
    NoSuchCondition(ConditionPath),
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("condition {0} has no field selected")]
    NoField(ConditionPath),
    #[error("condition {0} has no operator selected")]
    NoOperator(ConditionPath),
    #[error("field `{field}` does not offer operator `{operator}`")]
    OperatorNotOffered { field: String, operator: Operator },
    #[error("value for {path} must fit the {widget} input")]
    ValueShape { path: ConditionPath, widget: InputWidget },
    #[error("the root group cannot be removed")]
    RemoveRoot,
}

/// Receives the full tree after every transition
pub type ChangeListener = Box<dyn FnMut(&Arc<FilterGroup>)>;

pub struct FilterBuilder {
    registry: FieldRegistry,
    current: Arc<FilterGroup>,
    on_change: Option<ChangeListener>,
}

impl fmt::Debug for FilterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterBuilder")
            .field("fields", &self.registry.fields().len())
            .field("current", &self.current)
            .field("listening", &self.on_change.is_some())
            .finish()
    }
}

impl FilterBuilder {
    /// Builder starting from the empty AND group
    pub fn new(registry: FieldRegistry) -> Self {
        Self::with_initial(registry, FilterGroup::and())
    }

    pub fn with_initial(registry: FieldRegistry, initial: FilterGroup) -> Self {
        Self {
            registry,
            current: Arc::new(initial),
            on_change: None,
        }
    }

    pub fn on_change(mut self, listener: impl FnMut(&Arc<FilterGroup>) + 'static) -> Self {
        self.on_change = Some(Box::new(listener));
        self
    }

    /// Snapshot of the live tree
    pub fn filter(&self) -> &Arc<FilterGroup> {
        &self.current
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn group(&self, at: &GroupPath) -> Result<&FilterGroup, BuilderError> {
        let mut group: &FilterGroup = &self.current;
        for &i in at.indices() {
            group = group.groups.get(i).ok_or_else(|| BuilderError::NoSuchGroup(at.clone()))?;
        }
        Ok(group)
    }

    pub fn condition(&self, at: &ConditionPath) -> Result<&FilterCondition, BuilderError> {
        self.group(&at.group)?
            .conditions
            .get(at.index)
            .ok_or_else(|| BuilderError::NoSuchCondition(at.clone()))
    }

    /// Widget for the condition's current field and operator, if both are set
    pub fn widget_for(&self, at: &ConditionPath) -> Result<Option<InputWidget>, BuilderError> {
        let condition = self.condition(at)?;
        let widget = match (self.registry.field(&condition.field_id), condition.operator) {
            (Some(field), Some(operator)) => input_widget(field, operator),
            _ => None,
        };
        Ok(widget)
    }

    /// Append a blank condition to the group at `at`
    pub fn add_condition(&mut self, at: &GroupPath) -> Result<ConditionPath, BuilderError> {
        let index = self.update(at, |group| {
            group.conditions.push(FilterCondition::blank());
            Ok(group.conditions.len() - 1)
        })?;
        Ok(at.condition(index))
    }

    /// Select a field: the operator resets to the field's first operator and the value clears
    pub fn change_field(&mut self, at: &ConditionPath, field_id: &str) -> Result<(), BuilderError> {
        let field = self
            .registry
            .field(field_id)
            .ok_or_else(|| BuilderError::UnknownField(field_id.to_string()))?;
        let field_id = field.id.clone();
        let operator = field.default_operator();

        self.update_condition(at, |condition| {
            condition.field_id = field_id;
            condition.operator = operator;
            condition.value = None;
            Ok(())
        })
    }

    /// Select an operator; the value clears when the input shape changes or
    /// the new widget cannot hold it
    pub fn change_operator(&mut self, at: &ConditionPath, operator: Operator) -> Result<(), BuilderError> {
        let condition = self.condition(at)?;
        let field = self.selected_field(at, condition)?;
        let Some(next_widget) = input_widget(field, operator) else {
            return Err(BuilderError::OperatorNotOffered {
                field: field.id.clone(),
                operator,
            });
        };
        let previous_widget = condition.operator.and_then(|op| input_widget(field, op));
        let keep_value = match (&condition.value, previous_widget) {
            (Some(value), Some(previous)) => previous.shape() == next_widget.shape() && next_widget.accepts(value),
            _ => false,
        };

        self.update_condition(at, |condition| {
            condition.operator = Some(operator);
            if !keep_value {
                condition.value = None;
            }
            Ok(())
        })
    }

    /// Enter a value; `None` clears it. The value is read as the field's type
    /// and must then fit the current widget.
    pub fn change_value(&mut self, at: &ConditionPath, value: Option<ConditionValue>) -> Result<(), BuilderError> {
        let value = match value {
            Some(value) => {
                let condition = self.condition(at)?;
                let field = self.selected_field(at, condition)?;
                let operator = condition
                    .operator
                    .ok_or_else(|| BuilderError::NoOperator(at.clone()))?;
                let widget = input_widget(field, operator).ok_or_else(|| BuilderError::OperatorNotOffered {
                    field: field.id.clone(),
                    operator,
                })?;
                let value = value.for_field_type(field.field_type);
                if !widget.accepts(&value) {
                    return Err(BuilderError::ValueShape {
                        path: at.clone(),
                        widget,
                    });
                }
                Some(value)
            }
            None => None,
        };

        self.update_condition(at, |condition| {
            condition.value = value;
            Ok(())
        })
    }

    pub fn remove_condition(&mut self, at: &ConditionPath) -> Result<FilterCondition, BuilderError> {
        self.update(&at.group, |group| {
            if at.index >= group.conditions.len() {
                return Err(BuilderError::NoSuchCondition(at.clone()));
            }
            Ok(group.conditions.remove(at.index))
        })
    }

    /// Append an empty nested group to the group at `parent`
    pub fn add_group(&mut self, parent: &GroupPath, logic: Logic) -> Result<GroupPath, BuilderError> {
        let index = self.update(parent, |group| {
            group.groups.push(Arc::new(FilterGroup::new(logic)));
            Ok(group.groups.len() - 1)
        })?;
        Ok(parent.child(index))
    }

    pub fn remove_group(&mut self, at: &GroupPath) -> Result<FilterGroup, BuilderError> {
        let (parent, index) = at.parent().ok_or(BuilderError::RemoveRoot)?;
        self.update(&parent, |group| {
            if index >= group.groups.len() {
                return Err(BuilderError::NoSuchGroup(at.clone()));
            }
            Ok(Arc::unwrap_or_clone(group.groups.remove(index)))
        })
    }

    pub fn set_logic(&mut self, at: &GroupPath, logic: Logic) -> Result<(), BuilderError> {
        self.update(at, |group| {
            group.logic = logic;
            Ok(())
        })
    }

    /// Back to the empty AND group
    pub fn reset(&mut self) {
        self.commit(Arc::new(FilterGroup::and()));
    }

    /// Swap in a whole tree, e.g. a saved filter
    pub fn replace(&mut self, group: FilterGroup) {
        self.commit(Arc::new(group));
    }

    /// Go back to a tree previously taken from [`FilterBuilder::filter`]
    pub fn restore(&mut self, snapshot: Arc<FilterGroup>) {
        if !Arc::ptr_eq(&snapshot, &self.current) {
            self.commit(snapshot);
        }
    }

    fn selected_field<'a>(
        &'a self,
        at: &ConditionPath,
        condition: &FilterCondition,
    ) -> Result<&'a FilterField, BuilderError> {
        if condition.field_id.is_empty() {
            return Err(BuilderError::NoField(at.clone()));
        }
        self.registry
            .field(&condition.field_id)
            .ok_or_else(|| BuilderError::UnknownField(condition.field_id.clone()))
    }

    fn update_condition(
        &mut self,
        at: &ConditionPath,
        edit: impl FnOnce(&mut FilterCondition) -> Result<(), BuilderError>,
    ) -> Result<(), BuilderError> {
        self.update(&at.group, |group| {
            let condition = group
                .conditions
                .get_mut(at.index)
                .ok_or_else(|| BuilderError::NoSuchCondition(at.clone()))?;
            edit(condition)
        })
    }

    /// Apply `edit` to the group at `at` in a copy of the tree and commit the copy.
    /// On error the live tree is left as it was.
    fn update<R>(
        &mut self,
        at: &GroupPath,
        edit: impl FnOnce(&mut FilterGroup) -> Result<R, BuilderError>,
    ) -> Result<R, BuilderError> {
        let mut next = Arc::clone(&self.current);
        let group = group_mut(Arc::make_mut(&mut next), at.indices())
            .ok_or_else(|| BuilderError::NoSuchGroup(at.clone()))?;
        let result = edit(group)?;
        self.commit(next);
        Ok(result)
    }

    fn commit(&mut self, next: Arc<FilterGroup>) {
        self.current = next;
        debug!(conditions = self.current.condition_count(), "filter changed");
        if let Some(listener) = self.on_change.as_mut() {
            listener(&self.current);
        }
    }
}

fn group_mut<'a>(group: &'a mut FilterGroup, path: &[usize]) -> Option<&'a mut FilterGroup> {
    match path.split_first() {
        None => Some(group),
        Some((&first, rest)) => {
            let child = group.groups.get_mut(first)?;
            group_mut(Arc::make_mut(child), rest)
        }
    }
}
