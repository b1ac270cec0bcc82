//! Prepare pipeline
//!
//! An action passes through an ordered list of [`PrepareStage`]s before it
//! is executed. Each stage takes the [`PreparedAction`] produced by the
//! previous one and returns a new one, or an error that aborts the whole
//! action. Stages run one at a time in registration order:
//!
//! ```text
//! Idle ──▶ permission ──▶ resolve ──▶ validate ──▶ user stages… ──▶ Complete
//! ```
//!
//! Stages see the caller, the entity definition and the custom-field
//! snapshot through [`PrepareContext`]. The context has no storage handle:
//! preparing an action never issues a query.

use crate::api::resolver::{self, Resolved, Target, ValueTransform};
use crate::core::action::{ActionDescription, Operand, Operation, Operator, OrderDirection};
use crate::core::auth::AuthContext;
use crate::core::error::{ApiError, ApiResult, ValidationError};
use crate::core::field::FieldValue;
use crate::core::schema::{EntityDefinition, SchemaSnapshot};
use std::collections::HashSet;
use std::sync::Arc;

/// What a stage can see besides the action itself
#[derive(Debug, Clone, Copy)]
pub struct PrepareContext<'a> {
    pub auth: &'a AuthContext,
    pub definition: &'a EntityDefinition,
    pub schema: &'a SchemaSnapshot,
}

/// A value to write, with its resolved target
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub key: String,
    pub target: Target,
    pub value: FieldValue,
}

/// A filter with its resolved target and parsed operator
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub key: String,
    pub target: Target,
    pub operator: Operator,
    pub operand: Operand,
}

/// A sort key with its resolved target
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub key: String,
    pub target: Target,
    pub direction: OrderDirection,
}

/// An action description together with its typed references
///
/// Values are never mutated in place: every `with_*` method consumes the
/// action and returns the extended one.
#[derive(Debug, Clone)]
pub struct PreparedAction {
    description: ActionDescription,
    values: Vec<Assignment>,
    selects: Vec<Resolved>,
    wheres: Vec<Filter>,
    order_by: Vec<Sort>,
}

impl PreparedAction {
    pub fn new(description: ActionDescription) -> Self {
        Self {
            description,
            values: Vec::new(),
            selects: Vec::new(),
            wheres: Vec::new(),
            order_by: Vec::new(),
        }
    }

    /// The description as the caller built it
    pub fn description(&self) -> &ActionDescription {
        &self.description
    }

    pub fn entity(&self) -> &str {
        &self.description.entity
    }

    pub fn operation(&self) -> Operation {
        self.description.operation
    }

    pub fn values(&self) -> &[Assignment] {
        &self.values
    }

    pub fn selects(&self) -> &[Resolved] {
        &self.selects
    }

    pub fn wheres(&self) -> &[Filter] {
        &self.wheres
    }

    pub fn order_by(&self) -> &[Sort] {
        &self.order_by
    }

    pub fn limit(&self) -> Option<usize> {
        self.description.limit
    }

    pub fn offset(&self) -> usize {
        self.description.offset
    }

    /// Distinct custom groups referenced anywhere, in first-use order
    pub fn group_ids(&self) -> Vec<i64> {
        let targets = self
            .values
            .iter()
            .map(|a| &a.target)
            .chain(self.selects.iter().map(|s| &s.target))
            .chain(self.wheres.iter().map(|w| &w.target))
            .chain(self.order_by.iter().map(|o| &o.target));
        let mut seen = HashSet::new();
        targets
            .filter_map(Target::group_id)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Add a value to write; a later value for the same path replaces the earlier one
    ///
    /// The value is checked as it is added: readonly columns and option
    /// attributes are refused, the value is coerced to the target's data
    /// type and option-backed fields only accept values from their list.
    pub fn with_value(
        mut self,
        path: &str,
        value: FieldValue,
        ctx: &PrepareContext<'_>,
    ) -> ApiResult<Self> {
        let resolved = resolver::resolve_one(path, ctx.definition, ctx.schema)?;
        if let Target::Custom(custom) = &resolved.target
            && custom.transform != ValueTransform::Raw
        {
            return Err(ValidationError::ReadOnly {
                path: path.to_string(),
            }
            .into());
        }
        let assignment = validate_assignment(Assignment {
            key: resolved.key,
            target: resolved.target,
            value,
        })?;
        self.values.retain(|a| a.key != assignment.key);
        self.values.push(assignment);
        Ok(self)
    }

    /// Add a selected path; wildcards expand, duplicates are dropped
    pub fn with_select(mut self, path: &str, ctx: &PrepareContext<'_>) -> ApiResult<Self> {
        for resolved in resolver::resolve(path, ctx.definition, ctx.schema)? {
            ensure_stored(path, &resolved.target)?;
            if !self.selects.iter().any(|s| s.key == resolved.key) {
                self.selects.push(resolved);
            }
        }
        Ok(self)
    }

    /// Add a filter; the operand is coerced to the target's data type
    pub fn with_where(
        mut self,
        path: &str,
        operator: &str,
        operand: Operand,
        ctx: &PrepareContext<'_>,
    ) -> ApiResult<Self> {
        let resolved = resolver::resolve_one(path, ctx.definition, ctx.schema)?;
        ensure_stored(path, &resolved.target)?;
        let operator: Operator =
            operator
                .parse()
                .map_err(|operator| ValidationError::UnknownOperator {
                    path: path.to_string(),
                    operator,
                })?;
        let invalid = |message: String| ValidationError::InvalidOperand {
            path: path.to_string(),
            operator: operator.to_string(),
            message,
        };
        operator.check_operand(&operand).map_err(invalid)?;

        let operand = match operator {
            Operator::Like | Operator::NotLike => operand,
            _ => {
                let data_type = resolved.target.data_type();
                operand.try_map(|v| data_type.coerce(v)).map_err(invalid)?
            }
        };
        self.wheres.push(Filter {
            key: resolved.key,
            target: resolved.target,
            operator,
            operand,
        });
        Ok(self)
    }

    /// Add a sort key
    pub fn with_order_by(
        mut self,
        path: &str,
        direction: OrderDirection,
        ctx: &PrepareContext<'_>,
    ) -> ApiResult<Self> {
        let resolved = resolver::resolve_one(path, ctx.definition, ctx.schema)?;
        ensure_stored(path, &resolved.target)?;
        if let Target::Custom(custom) = &resolved.target
            && custom.transform != ValueTransform::Raw
        {
            let attribute = path.rsplit('.').next().unwrap_or(path);
            return Err(ApiError::unsupported(
                path,
                attribute,
                "sorting by option attributes",
            ));
        }
        self.order_by.push(Sort {
            key: resolved.key,
            target: resolved.target,
            direction,
        });
        Ok(self)
    }
}

fn ensure_stored(path: &str, target: &Target) -> ApiResult<()> {
    match target {
        Target::Column(column) if !column.stored => Err(ValidationError::InvalidValue {
            path: path.to_string(),
            message: "write-only field cannot be read".to_string(),
        }
        .into()),
        _ => Ok(()),
    }
}

/// One step of action preparation
pub trait PrepareStage: Send + Sync {
    /// Name reported when the stage rejects an action
    fn name(&self) -> &str;

    fn prepare(
        &self,
        action: PreparedAction,
        ctx: &PrepareContext<'_>,
    ) -> ApiResult<PreparedAction>;
}

/// Stage backed by a closure
pub struct FnStage<F> {
    name: String,
    f: F,
}

impl<F> PrepareStage for FnStage<F>
where
    F: Fn(PreparedAction, &PrepareContext<'_>) -> ApiResult<PreparedAction> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(
        &self,
        action: PreparedAction,
        ctx: &PrepareContext<'_>,
    ) -> ApiResult<PreparedAction> {
        (self.f)(action, ctx)
    }
}

/// Build a stage from a closure
///
/// # Example
///
/// ```rust,ignore
/// let stage = stage_fn("audit", |action, _ctx| {
///     tracing::info!(entity = action.entity(), "preparing");
///     Ok(action)
/// });
/// ```
pub fn stage_fn<F>(name: impl Into<String>, f: F) -> FnStage<F>
where
    F: Fn(PreparedAction, &PrepareContext<'_>) -> ApiResult<PreparedAction> + Send + Sync,
{
    FnStage {
        name: name.into(),
        f,
    }
}

/// Checks the caller against the entity's policy for the operation
///
/// Skipped entirely when the action does not check permissions.
pub struct PermissionStage;

impl PrepareStage for PermissionStage {
    fn name(&self) -> &str {
        "permission"
    }

    fn prepare(
        &self,
        action: PreparedAction,
        ctx: &PrepareContext<'_>,
    ) -> ApiResult<PreparedAction> {
        if !action.description.check_permissions {
            return Ok(action);
        }
        let permissions = &ctx.definition.permissions;
        let policy = match action.operation() {
            Operation::Get => &permissions.get,
            Operation::Create => &permissions.create,
            Operation::Update => &permissions.update,
        };
        if !policy.check(ctx.auth) {
            tracing::debug!(
                entity = %ctx.definition.name,
                action = action.operation().as_str(),
                "permission denied"
            );
            return Err(ApiError::PermissionDenied {
                entity: ctx.definition.name.clone(),
                action: action.operation().to_string(),
            });
        }
        Ok(action)
    }
}

/// Turns every path of the description into a typed reference
pub struct ResolveFieldsStage;

impl PrepareStage for ResolveFieldsStage {
    fn name(&self) -> &str {
        "resolve"
    }

    fn prepare(
        &self,
        action: PreparedAction,
        ctx: &PrepareContext<'_>,
    ) -> ApiResult<PreparedAction> {
        let description = action.description.clone();
        let mut action = action;

        for (path, value) in &description.values {
            action = action.with_value(path, value.clone(), ctx)?;
        }
        if description.operation == Operation::Get && description.selects.is_empty() {
            action = action.with_select("*", ctx)?;
        }
        for path in &description.selects {
            action = action.with_select(path, ctx)?;
        }
        for clause in &description.wheres {
            action = action.with_where(&clause.path, &clause.operator, clause.operand.clone(), ctx)?;
        }
        for clause in &description.order_by {
            let direction = clause.direction.parse::<OrderDirection>().map_err(|d| {
                ValidationError::InvalidValue {
                    path: clause.path.clone(),
                    message: format!("'{}' is not a sort direction", d),
                }
            })?;
            action = action.with_order_by(&clause.path, direction, ctx)?;
        }
        Ok(action)
    }
}

/// Checks the clauses an operation allows, fills in create defaults and
/// enforces required columns
///
/// Individual values are validated by [`PreparedAction::with_value`], so
/// values added by later stages get the same checks.
pub struct ValidateValuesStage;

impl PrepareStage for ValidateValuesStage {
    fn name(&self) -> &str {
        "validate"
    }

    fn prepare(
        &self,
        mut action: PreparedAction,
        ctx: &PrepareContext<'_>,
    ) -> ApiResult<PreparedAction> {
        let operation = action.operation();
        match operation {
            Operation::Get => {
                if let Some(value) = action.values.first() {
                    return Err(ValidationError::InvalidValue {
                        path: value.key.clone(),
                        message: "get does not write values".to_string(),
                    }
                    .into());
                }
                return Ok(action);
            }
            Operation::Create => {
                if let Some(clause) = action.wheres.first() {
                    return Err(ValidationError::InvalidValue {
                        path: clause.key.clone(),
                        message: "create does not filter".to_string(),
                    }
                    .into());
                }
            }
            Operation::Update => {
                if action.wheres.is_empty() {
                    return Err(ValidationError::MissingClause {
                        entity: ctx.definition.name.clone(),
                        action: operation.to_string(),
                        clause: "at least one where clause".to_string(),
                    }
                    .into());
                }
            }
        }

        for column in &ctx.definition.columns {
            let assigned = action
                .values
                .iter()
                .find(|a| a.key == column.name)
                .map(|a| a.value.is_null());
            let missing = assigned.unwrap_or(true);
            if operation == Operation::Create && assigned.is_none() {
                if let Some(default) = &column.default {
                    action.values.push(Assignment {
                        key: column.name.clone(),
                        target: Target::Column(column.clone()),
                        value: default.clone(),
                    });
                    continue;
                }
            }
            let required_missing = match operation {
                Operation::Create => missing,
                _ => assigned.is_some() && missing,
            };
            if column.required && required_missing {
                return Err(ValidationError::MissingRequired {
                    path: column.name.clone(),
                }
                .into());
            }
        }
        Ok(action)
    }
}

fn validate_assignment(assignment: Assignment) -> ApiResult<Assignment> {
    let Assignment { key, target, value } = assignment;
    let value = match &target {
        // Input-only columns are interpreted by the entity itself
        Target::Column(column) if !column.stored => value,
        Target::Column(column) => {
            if column.readonly {
                return Err(ValidationError::ReadOnly { path: key }.into());
            }
            coerce(&key, &target, value)?
        }
        Target::Custom(custom) => {
            let value = coerce(&key, &target, value)?;
            if !value.is_null() && !custom.options.is_empty() && custom.option(&value).is_none() {
                return Err(ValidationError::InvalidOption {
                    path: key,
                    value: value.to_text().unwrap_or_default(),
                }
                .into());
            }
            value
        }
    };
    Ok(Assignment { key, target, value })
}

fn coerce(path: &str, target: &Target, value: FieldValue) -> ApiResult<FieldValue> {
    target.data_type().coerce(value).map_err(|message| {
        ValidationError::InvalidValue {
            path: path.to_string(),
            message,
        }
        .into()
    })
}

/// Ordered list of prepare stages
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn PrepareStage>>,
}

impl Pipeline {
    /// Pipeline with the built-in stages: permission, resolve, validate
    pub fn new() -> Self {
        Self {
            stages: vec![
                Arc::new(PermissionStage),
                Arc::new(ResolveFieldsStage),
                Arc::new(ValidateValuesStage),
            ],
        }
    }

    /// Append a stage; it runs after every stage registered before it
    pub fn register(&mut self, stage: Arc<dyn PrepareStage>) {
        self.stages.push(stage);
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order
    pub fn run(
        &self,
        description: ActionDescription,
        ctx: &PrepareContext<'_>,
    ) -> ApiResult<PreparedAction> {
        let mut action = PreparedAction::new(description);
        for stage in &self.stages {
            tracing::trace!(stage = stage.name(), entity = %ctx.definition.name, "prepare stage");
            action = stage.prepare(action, ctx).map_err(|e| {
                tracing::debug!(stage = stage.name(), error = %e, "prepare stage failed");
                e
            })?;
        }
        Ok(action)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
