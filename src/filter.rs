//! Scalar filter expressions for vector search.
//!
//! Callers pass a JSON structured-query expression:
//!
//! ```json
//! {"type": "operator", "operator": "and", "arguments": [
//!     {"type": "comparator", "comparator": "gte", "attribute": "year", "value": 2020},
//!     {"type": "comparator", "comparator": "in", "attribute": "lang", "value": ["en", "de"]}
//! ]}
//! ```
//!
//! The expression is type-checked once at task init, against the index scalar
//! schema when the index has one, and shipped to every region as an
//! [`EncodedFilter`].

use crate::error::{Result, ShardlineError};
use crate::index::ScalarSchema;
use crate::types::{ScalarField, ScalarFieldType};
use serde::{Deserialize, Serialize};

const MAX_FILTER_DEPTH: usize = 10;
const MAX_FILTER_CLAUSES: usize = 1000;
const ENCODING_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

impl Comparator {
    fn takes_list(&self) -> bool {
        matches!(self, Comparator::In | Comparator::Nin)
    }

    fn is_ordering(&self) -> bool {
        matches!(
            self,
            Comparator::Gt | Comparator::Gte | Comparator::Lt | Comparator::Lte
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

/// Untyped expression as written by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterExpr {
    Comparator {
        comparator: Comparator,
        attribute: String,
        value: serde_json::Value,
    },
    Operator {
        operator: LogicalOperator,
        arguments: Vec<FilterExpr>,
    },
}

/// Type-checked expression as shipped to stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypedExpr {
    Compare {
        attribute: String,
        field_type: ScalarFieldType,
        comparator: Comparator,
        values: Vec<ScalarField>,
    },
    And(Vec<TypedExpr>),
    Or(Vec<TypedExpr>),
    Not(Box<TypedExpr>),
}

/// Filter payload attached to a search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedFilter {
    pub version: u32,
    /// Whether attribute types came from the index schema or were inferred.
    pub schema_checked: bool,
    pub expression: TypedExpr,
}

impl FilterExpr {
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ShardlineError::InvalidArgument(format!("invalid filter expression: {}", e)))
    }

    fn count_clauses(&self) -> usize {
        match self {
            FilterExpr::Comparator { .. } => 1,
            FilterExpr::Operator { arguments, .. } => {
                arguments.iter().map(|a| a.count_clauses()).sum::<usize>() + 1
            }
        }
    }

    /// Type-check and encode. With a schema, every attribute must be a schema
    /// column and literals must match the column type; without one, types are
    /// inferred from the literals.
    pub fn encode(&self, schema: Option<&ScalarSchema>) -> Result<EncodedFilter> {
        let clauses = self.count_clauses();
        if clauses > MAX_FILTER_CLAUSES {
            return Err(ShardlineError::InvalidArgument(format!(
                "filter has {} clauses, exceeds maximum {}",
                clauses, MAX_FILTER_CLAUSES
            )));
        }
        Ok(EncodedFilter {
            version: ENCODING_VERSION,
            schema_checked: schema.is_some(),
            expression: self.to_typed(schema, 0)?,
        })
    }

    fn to_typed(&self, schema: Option<&ScalarSchema>, depth: usize) -> Result<TypedExpr> {
        if depth > MAX_FILTER_DEPTH {
            return Err(ShardlineError::InvalidArgument(format!(
                "filter nesting exceeds maximum depth {}",
                MAX_FILTER_DEPTH
            )));
        }
        match self {
            FilterExpr::Comparator {
                comparator,
                attribute,
                value,
            } => typed_comparison(*comparator, attribute, value, schema),
            FilterExpr::Operator {
                operator,
                arguments,
            } => {
                let mut typed = arguments
                    .iter()
                    .map(|a| a.to_typed(schema, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                match operator {
                    LogicalOperator::Not => {
                        if typed.len() != 1 {
                            return Err(ShardlineError::InvalidArgument(format!(
                                "`not` takes exactly one argument, got {}",
                                typed.len()
                            )));
                        }
                        Ok(TypedExpr::Not(Box::new(typed.remove(0))))
                    }
                    LogicalOperator::And | LogicalOperator::Or if typed.is_empty() => {
                        Err(ShardlineError::InvalidArgument(format!(
                            "`{:?}` needs at least one argument",
                            operator
                        )))
                    }
                    LogicalOperator::And => Ok(TypedExpr::And(typed)),
                    LogicalOperator::Or => Ok(TypedExpr::Or(typed)),
                }
            }
        }
    }
}

fn typed_comparison(
    comparator: Comparator,
    attribute: &str,
    value: &serde_json::Value,
    schema: Option<&ScalarSchema>,
) -> Result<TypedExpr> {
    if attribute.is_empty() {
        return Err(ShardlineError::InvalidArgument(
            "filter attribute must not be empty".into(),
        ));
    }

    let literals: Vec<&serde_json::Value> = match (comparator.takes_list(), value) {
        (true, serde_json::Value::Array(items)) if !items.is_empty() => items.iter().collect(),
        (true, _) => {
            return Err(ShardlineError::InvalidArgument(format!(
                "`{:?}` on `{}` needs a non-empty list",
                comparator, attribute
            )))
        }
        (false, serde_json::Value::Array(_)) => {
            return Err(ShardlineError::InvalidArgument(format!(
                "`{:?}` on `{}` takes a single value",
                comparator, attribute
            )))
        }
        (false, v) => vec![v],
    };

    let field_type = match schema {
        Some(schema) => {
            schema
                .column(attribute)
                .ok_or_else(|| {
                    ShardlineError::InvalidArgument(format!(
                        "filter attribute `{}` is not in the scalar schema",
                        attribute
                    ))
                })?
                .field_type
        }
        None => infer_type(attribute, literals[0])?,
    };

    if comparator.is_ordering() && field_type == ScalarFieldType::Bool {
        return Err(ShardlineError::InvalidArgument(format!(
            "`{:?}` is not defined for bool attribute `{}`",
            comparator, attribute
        )));
    }

    let values = literals
        .into_iter()
        .map(|v| convert_literal(attribute, field_type, v))
        .collect::<Result<Vec<_>>>()?;

    Ok(TypedExpr::Compare {
        attribute: attribute.to_string(),
        field_type,
        comparator,
        values,
    })
}

fn infer_type(attribute: &str, value: &serde_json::Value) -> Result<ScalarFieldType> {
    match value {
        serde_json::Value::Bool(_) => Ok(ScalarFieldType::Bool),
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Ok(ScalarFieldType::Int64),
        serde_json::Value::Number(_) => Ok(ScalarFieldType::Double),
        serde_json::Value::String(_) => Ok(ScalarFieldType::String),
        other => Err(ShardlineError::InvalidArgument(format!(
            "unsupported literal {} for `{}`",
            other, attribute
        ))),
    }
}

fn convert_literal(
    attribute: &str,
    field_type: ScalarFieldType,
    value: &serde_json::Value,
) -> Result<ScalarField> {
    let converted = match field_type {
        ScalarFieldType::Bool => value.as_bool().map(ScalarField::Bool),
        ScalarFieldType::Int64 => value.as_i64().map(ScalarField::Int64),
        ScalarFieldType::Double => value.as_f64().map(ScalarField::Double),
        ScalarFieldType::String => value.as_str().map(|s| ScalarField::String(s.to_string())),
    };
    converted.ok_or_else(|| ShardlineError::InvalidArgument(format!(
        "literal {} does not match type {:?} of `{}`",
        value, field_type, attribute
    )))
}
