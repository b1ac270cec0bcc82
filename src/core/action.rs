//! Action descriptions
//!
//! An [`ActionDescription`] is the immutable, unresolved form of a requested
//! operation. Field paths and operators stay as strings here; they are parsed
//! and resolved against the schema during preparation.

use crate::core::error::ValidationError;
use crate::core::field::FieldValue;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The operation an action performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Get,
    Update,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Get => "get",
            Operation::Update => "update",
        }
    }

    /// Whether this operation writes values
    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Create | Operation::Update)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a where clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }

    /// Check that an operand has the shape this operator needs
    pub fn check_operand(&self, operand: &Operand) -> Result<(), String> {
        match (self, operand) {
            (Operator::IsNull | Operator::IsNotNull, Operand::None) => Ok(()),
            (Operator::IsNull | Operator::IsNotNull, _) => {
                Err("takes no operand".to_string())
            }
            (Operator::In | Operator::NotIn, Operand::List(_)) => Ok(()),
            (Operator::In | Operator::NotIn, _) => Err("expects a list".to_string()),
            (Operator::Like | Operator::NotLike, Operand::Single(FieldValue::String(_))) => {
                Ok(())
            }
            (Operator::Like | Operator::NotLike, _) => Err("expects a text pattern".to_string()),
            (_, Operand::Single(FieldValue::Null)) => {
                Err("cannot compare with NULL, use IS NULL".to_string())
            }
            (_, Operand::Single(FieldValue::Map(_))) => Err("cannot compare with a map".to_string()),
            (_, Operand::Single(_)) => Ok(()),
            (_, _) => Err("expects a single value".to_string()),
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        match normalized.as_str() {
            "=" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::NotEq),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            "LIKE" => Ok(Operator::Like),
            "NOT LIKE" => Ok(Operator::NotLike),
            "IN" => Ok(Operator::In),
            "NOT IN" => Ok(Operator::NotIn),
            "IS NULL" => Ok(Operator::IsNull),
            "IS NOT NULL" => Ok(Operator::IsNotNull),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a where clause
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Operand {
    None,
    Single(FieldValue),
    List(Vec<FieldValue>),
}

impl Operand {
    /// Apply a fallible transform to every value of the operand
    pub fn try_map<E>(
        self,
        mut f: impl FnMut(FieldValue) -> Result<FieldValue, E>,
    ) -> Result<Operand, E> {
        Ok(match self {
            Operand::None => Operand::None,
            Operand::Single(v) => Operand::Single(f(v)?),
            Operand::List(vs) => Operand::List(vs.into_iter().map(f).collect::<Result<_, _>>()?),
        })
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Single(v) => write!(f, "{}", v),
            Operand::List(vs) => {
                let items: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
                write!(f, "({})", items.join(", "))
            }
        }
    }
}

impl From<()> for Operand {
    fn from(_: ()) -> Self {
        Operand::None
    }
}

impl From<FieldValue> for Operand {
    fn from(value: FieldValue) -> Self {
        Operand::Single(value)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Single(value.into())
    }
}

impl From<String> for Operand {
    fn from(value: String) -> Self {
        Operand::Single(value.into())
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Single(value.into())
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Operand::Single(value.into())
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for Operand {
    fn from(values: Vec<T>) -> Self {
        Operand::List(values.into_iter().map(Into::into).collect())
    }
}

/// Sort direction of an order-by clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for OrderDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ASC" => Ok(OrderDirection::Asc),
            "DESC" => Ok(OrderDirection::Desc),
            _ => Err(s.to_string()),
        }
    }
}

/// Unparsed where clause
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhereClause {
    pub path: String,
    pub operator: String,
    pub operand: Operand,
}

/// Unparsed order-by clause
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderClause {
    pub path: String,
    pub direction: String,
}

/// Immutable description of a requested action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionDescription {
    pub entity: String,
    pub operation: Operation,
    pub values: Vec<(String, FieldValue)>,
    pub selects: Vec<String>,
    pub wheres: Vec<WhereClause>,
    pub order_by: Vec<OrderClause>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub check_permissions: bool,
}

impl ActionDescription {
    /// Start a description with no clauses
    pub fn new(entity: impl Into<String>, operation: Operation) -> Self {
        Self {
            entity: entity.into(),
            operation,
            values: Vec::new(),
            selects: Vec::new(),
            wheres: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: 0,
            check_permissions: true,
        }
    }

    pub fn with_value(mut self, path: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.push((path.into(), value.into()));
        self
    }

    pub fn with_select(mut self, path: impl Into<String>) -> Self {
        self.selects.push(path.into());
        self
    }

    pub fn with_where(
        mut self,
        path: impl Into<String>,
        operator: impl Into<String>,
        operand: impl Into<Operand>,
    ) -> Self {
        self.wheres.push(WhereClause {
            path: path.into(),
            operator: operator.into(),
            operand: operand.into(),
        });
        self
    }

    pub fn with_order_by(mut self, path: impl Into<String>, direction: impl Into<String>) -> Self {
        self.order_by.push(OrderClause {
            path: path.into(),
            direction: direction.into(),
        });
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_check_permissions(mut self, check: bool) -> Self {
        self.check_permissions = check;
        self
    }

    /// Every field path mentioned by the description, in clause order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.values
            .iter()
            .map(|(p, _)| p.as_str())
            .chain(self.selects.iter().map(String::as_str))
            .chain(self.wheres.iter().map(|w| w.path.as_str()))
            .chain(self.order_by.iter().map(|o| o.path.as_str()))
    }

    /// Parse every path and operator without consulting the schema.
    ///
    /// Runs before any query so malformed input never reaches storage.
    pub fn check_syntax(&self) -> Result<(), ValidationError> {
        for path in self.paths() {
            crate::core::path::FieldPath::parse(path)?;
        }
        for clause in &self.wheres {
            let operator: Operator =
                clause
                    .operator
                    .parse()
                    .map_err(|op| ValidationError::UnknownOperator {
                        path: clause.path.clone(),
                        operator: op,
                    })?;
            operator
                .check_operand(&clause.operand)
                .map_err(|message| ValidationError::InvalidOperand {
                    path: clause.path.clone(),
                    operator: operator.to_string(),
                    message,
                })?;
        }
        for clause in &self.order_by {
            clause
                .direction
                .parse::<OrderDirection>()
                .map_err(|d| ValidationError::InvalidValue {
                    path: clause.path.clone(),
                    message: format!("'{}' is not a sort direction", d),
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_parsing() {
        assert_eq!("=".parse::<Operator>(), Ok(Operator::Eq));
        assert_eq!("<>".parse::<Operator>(), Ok(Operator::NotEq));
        assert_eq!("is  not null".parse::<Operator>(), Ok(Operator::IsNotNull));
        assert_eq!("like".parse::<Operator>(), Ok(Operator::Like));
        assert_eq!("~=".parse::<Operator>(), Err("~=".to_string()));
    }

    #[test]
    fn test_operand_shapes() {
        assert!(Operator::IsNull.check_operand(&Operand::None).is_ok());
        assert!(Operator::IsNull.check_operand(&"x".into()).is_err());
        assert!(Operator::In.check_operand(&vec!["a", "b"].into()).is_ok());
        assert!(Operator::In.check_operand(&"a".into()).is_err());
        assert!(Operator::Like.check_operand(&"a%".into()).is_ok());
        assert!(Operator::Like.check_operand(&5i64.into()).is_err());
        assert!(Operator::Eq.check_operand(&FieldValue::Null.into()).is_err());
        assert!(Operator::Eq.check_operand(&Operand::None).is_err());
    }

    #[test]
    fn test_description_is_built_by_value() {
        let base = ActionDescription::new("Contact", Operation::Get);
        let extended = base.clone().with_select("display_name").with_limit(1);
        assert!(base.selects.is_empty());
        assert_eq!(extended.selects, vec!["display_name".to_string()]);
        assert_eq!(extended.limit, Some(1));
        assert!(extended.check_permissions);
    }

    #[test]
    fn test_paths_in_clause_order() {
        let description = ActionDescription::new("Contact", Operation::Update)
            .with_value("first_name", "A")
            .with_select("id")
            .with_where("G.F", "=", "x")
            .with_order_by("last_name", "DESC");
        let paths: Vec<&str> = description.paths().collect();
        assert_eq!(paths, vec!["first_name", "id", "G.F", "last_name"]);
    }

    #[test]
    fn test_check_syntax() {
        let ok = ActionDescription::new("Contact", Operation::Get)
            .with_select("G.F.label")
            .with_where("G.F", "IN", vec!["a", "b"]);
        assert!(ok.check_syntax().is_ok());

        let bad_path = ActionDescription::new("Contact", Operation::Get).with_select("G..F");
        assert!(matches!(
            bad_path.check_syntax(),
            Err(ValidationError::MalformedPath { .. })
        ));

        let bad_op = ActionDescription::new("Contact", Operation::Get).with_where("id", "=~", 1i64);
        assert!(matches!(
            bad_op.check_syntax(),
            Err(ValidationError::UnknownOperator { .. })
        ));

        let bad_dir = ActionDescription::new("Contact", Operation::Get).with_order_by("id", "UP");
        assert!(matches!(
            bad_dir.check_syntax(),
            Err(ValidationError::InvalidValue { .. })
        ));
    }
}
