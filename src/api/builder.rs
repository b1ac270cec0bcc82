//! Fluent action builder

use crate::api::{Api, ResultSet};
use crate::core::action::{ActionDescription, Operand};
use crate::core::error::ApiResult;
use crate::core::field::FieldValue;

/// Builds one action and runs it
///
/// # Example
///
/// ```rust,ignore
/// let result = Contact::get(&api)
///     .add_select("display_name")
///     .add_select("MyContactFields.FavColor.label")
///     .add_where("MyContactFields.FavColor", "=", "r")
///     .set_check_permissions(false)
///     .execute()
///     .await?;
/// ```
#[derive(Clone)]
#[must_use = "an action does nothing until it is executed"]
pub struct ActionBuilder {
    api: Api,
    description: ActionDescription,
}

impl ActionBuilder {
    pub(crate) fn new(api: Api, description: ActionDescription) -> Self {
        Self { api, description }
    }

    /// Value to write, by column name or `Group.Field`
    pub fn add_value(mut self, path: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.description = self.description.with_value(path, value);
        self
    }

    /// Path to return; `*` and `Group.*` select every column or field
    pub fn add_select(mut self, path: impl Into<String>) -> Self {
        self.description = self.description.with_select(path);
        self
    }

    /// Filter; operators are `=`, `!=`, `<`, `<=`, `>`, `>=`, `LIKE`,
    /// `NOT LIKE`, `IN`, `NOT IN`, `IS NULL` and `IS NOT NULL`
    pub fn add_where(
        mut self,
        path: impl Into<String>,
        operator: impl Into<String>,
        operand: impl Into<Operand>,
    ) -> Self {
        self.description = self.description.with_where(path, operator, operand);
        self
    }

    /// Sort key, `ASC` or `DESC`
    pub fn add_order_by(mut self, path: impl Into<String>, direction: impl Into<String>) -> Self {
        self.description = self.description.with_order_by(path, direction);
        self
    }

    pub fn set_limit(mut self, limit: usize) -> Self {
        self.description = self.description.with_limit(limit);
        self
    }

    pub fn set_offset(mut self, offset: usize) -> Self {
        self.description = self.description.with_offset(offset);
        self
    }

    /// Whether the caller's permissions are checked; `false` bypasses them
    pub fn set_check_permissions(mut self, check: bool) -> Self {
        self.description = self.description.with_check_permissions(check);
        self
    }

    /// The action built so far
    pub fn description(&self) -> &ActionDescription {
        &self.description
    }

    /// Prepare and run the action
    pub async fn execute(self) -> ApiResult<ResultSet> {
        self.api.execute(self.description).await
    }
}
