//! Verifier queries
//!
//! A [`Query`] is what a verifier asks for in JSON terms: a credential type,
//! a field and a predicate. Resolved against a [`SchemaRegistry`] it becomes
//! a [`CircuitQuery`]: schema hash, slot index, operator code and up to 64
//! operand values, which is what the query proof commits to.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::claim::schema::{SchemaHash, SchemaRegistry, SlotIndex};
use crate::crypto::hash::{hash_elems, MAX_HASH_INPUTS};
use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;
use crate::types::identifier::Identifier;

/// Operand slots available in a query proof
pub const MAX_QUERY_VALUES: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Noop = 0,
    Eq = 1,
    Lt = 2,
    Gt = 3,
    In = 4,
    Nin = 5,
    Ne = 6,
}

impl Operator {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => Operator::Noop,
            1 => Operator::Eq,
            2 => Operator::Lt,
            3 => Operator::Gt,
            4 => Operator::In,
            5 => Operator::Nin,
            6 => Operator::Ne,
            other => {
                return Err(IdentityError::invalid_query(format!(
                    "unknown operator code {}",
                    other
                )))
            }
        })
    }

    /// JSON name of the operator, e.g. `$lt`. `Noop` has none.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Operator::Noop => None,
            Operator::Eq => Some("$eq"),
            Operator::Lt => Some("$lt"),
            Operator::Gt => Some("$gt"),
            Operator::In => Some("$in"),
            Operator::Nin => Some("$nin"),
            Operator::Ne => Some("$ne"),
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "$eq" => Ok(Operator::Eq),
            "$lt" => Ok(Operator::Lt),
            "$gt" => Ok(Operator::Gt),
            "$in" => Ok(Operator::In),
            "$nin" => Ok(Operator::Nin),
            "$ne" => Ok(Operator::Ne),
            other => Err(IdentityError::invalid_query(format!(
                "unknown operator {}",
                other
            ))),
        }
    }

    fn operand_bounds(self) -> (usize, usize) {
        match self {
            Operator::Noop => (0, 0),
            Operator::Eq | Operator::Lt | Operator::Gt | Operator::Ne => (1, 1),
            Operator::In | Operator::Nin => (1, MAX_QUERY_VALUES),
        }
    }

    /// Evaluate `value <op> operands`.
    pub fn evaluate(self, value: &FieldElement, operands: &[FieldElement]) -> bool {
        match (self, operands.first()) {
            (Operator::Noop, _) => true,
            (Operator::Eq, Some(operand)) => value == operand,
            (Operator::Lt, Some(operand)) => value < operand,
            (Operator::Gt, Some(operand)) => value > operand,
            (Operator::Ne, Some(operand)) => value != operand,
            (Operator::In, _) => operands.contains(value),
            (Operator::Nin, _) => !operands.contains(value),
            (_, None) => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or("$noop"))
    }
}

/// Issuers whose credentials a verifier accepts
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum AllowedIssuers {
    #[default]
    Any,
    List(Vec<Identifier>),
}

impl AllowedIssuers {
    pub fn allows(&self, issuer: &Identifier) -> bool {
        match self {
            AllowedIssuers::Any => true,
            AllowedIssuers::List(issuers) => issuers.contains(issuer),
        }
    }
}

/// Query over one field of one credential type
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QueryJson", into = "QueryJson")]
pub struct Query {
    allowed_issuers: AllowedIssuers,
    context: String,
    credential_type: String,
    field: String,
    operator: Operator,
    operands: Vec<FieldElement>,
}

impl Query {
    pub fn new(
        context: impl Into<String>,
        credential_type: impl Into<String>,
        field: impl Into<String>,
        operator: Operator,
        operands: Vec<FieldElement>,
    ) -> Result<Self> {
        let query = Query {
            allowed_issuers: AllowedIssuers::Any,
            context: context.into(),
            credential_type: credential_type.into(),
            field: field.into(),
            operator,
            operands,
        };
        query.validate()?;
        Ok(query)
    }

    pub fn with_allowed_issuers(mut self, allowed_issuers: AllowedIssuers) -> Self {
        self.allowed_issuers = allowed_issuers;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.context.is_empty() || self.credential_type.is_empty() {
            return Err(IdentityError::invalid_query(
                "context and credential type are required",
            ));
        }
        if self.field.is_empty() {
            return Err(IdentityError::invalid_query("query field is required"));
        }
        let (min, max) = self.operator.operand_bounds();
        if self.operands.len() < min || self.operands.len() > max {
            return Err(IdentityError::invalid_query(format!(
                "{} takes {} to {} operands, got {}",
                self.operator,
                min,
                max,
                self.operands.len()
            )));
        }
        Ok(())
    }

    pub fn allowed_issuers(&self) -> &AllowedIssuers {
        &self.allowed_issuers
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn credential_type(&self) -> &str {
        &self.credential_type
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn operands(&self) -> &[FieldElement] {
        &self.operands
    }

    /// Resolve field names into the slot-level query a proof commits to.
    pub fn resolve(&self, schemas: &SchemaRegistry) -> Result<CircuitQuery> {
        let schema = schemas.resolve(&self.context, &self.credential_type)?;
        Ok(CircuitQuery {
            schema: schema.hash,
            slot_index: schema.slot_of(&self.field)?,
            operator: self.operator,
            values: self.operands.clone(),
        })
    }
}

/// Slot-level query
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitQuery {
    pub schema: SchemaHash,
    pub slot_index: SlotIndex,
    #[serde(with = "operator_code")]
    pub operator: Operator,
    pub values: Vec<FieldElement>,
}

impl CircuitQuery {
    /// Operand values padded with zeros to [`MAX_QUERY_VALUES`].
    pub fn padded_values(&self) -> Result<Vec<FieldElement>> {
        if self.values.len() > MAX_QUERY_VALUES {
            return Err(IdentityError::invalid_query(format!(
                "at most {} values per query, got {}",
                MAX_QUERY_VALUES,
                self.values.len()
            )));
        }
        let mut values = self.values.clone();
        values.resize(MAX_QUERY_VALUES, FieldElement::ZERO);
        Ok(values)
    }

    /// Hash of the padded values, in chunks of sixteen.
    pub fn values_hash(&self) -> Result<FieldElement> {
        let chunk_hashes = self
            .padded_values()?
            .chunks(MAX_HASH_INPUTS)
            .map(hash_elems)
            .collect::<Result<Vec<_>>>()?;
        hash_elems(&chunk_hashes)
    }

    /// `H(schema, slot, operator, values_hash)`, the query commitment in public signals.
    pub fn hash(&self) -> Result<FieldElement> {
        hash_elems(&[
            self.schema.to_field_element(),
            FieldElement::from(u64::from(self.slot_index.as_u8())),
            FieldElement::from(u64::from(self.operator.code())),
            self.values_hash()?,
        ])
    }

    pub fn matches(&self, value: &FieldElement) -> bool {
        self.operator.evaluate(value, &self.values)
    }
}

mod operator_code {
    use super::Operator;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(operator: &Operator, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(operator.code())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Operator, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Operator::from_code(code).map_err(serde::de::Error::custom)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum OperandJson {
    Many(Vec<FieldElement>),
    One(FieldElement),
}

/// Wire form: `{"allowedIssuers": [..], "context": .., "type": .., "credentialSubject": {field: {"$op": value}}}`
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryJson {
    #[serde(default = "any_issuer")]
    allowed_issuers: Vec<String>,
    context: String,
    #[serde(rename = "type")]
    credential_type: String,
    credential_subject: BTreeMap<String, BTreeMap<String, OperandJson>>,
}

fn any_issuer() -> Vec<String> {
    vec!["*".to_string()]
}

impl From<Query> for QueryJson {
    fn from(query: Query) -> Self {
        let allowed_issuers = match query.allowed_issuers {
            AllowedIssuers::Any => any_issuer(),
            AllowedIssuers::List(ids) => ids.iter().map(|id| id.to_string()).collect(),
        };
        let mut predicate = BTreeMap::new();
        if let Some(name) = query.operator.name() {
            let operand = match query.operator {
                Operator::In | Operator::Nin => OperandJson::Many(query.operands),
                _ => OperandJson::One(query.operands.first().copied().unwrap_or_default()),
            };
            predicate.insert(name.to_string(), operand);
        }
        let mut credential_subject = BTreeMap::new();
        credential_subject.insert(query.field, predicate);
        QueryJson {
            allowed_issuers,
            context: query.context,
            credential_type: query.credential_type,
            credential_subject,
        }
    }
}

impl TryFrom<QueryJson> for Query {
    type Error = IdentityError;

    fn try_from(json: QueryJson) -> Result<Self> {
        let allowed_issuers = if json.allowed_issuers.iter().any(|issuer| issuer == "*") {
            AllowedIssuers::Any
        } else {
            AllowedIssuers::List(
                json.allowed_issuers
                    .iter()
                    .map(|issuer| issuer.parse())
                    .collect::<Result<Vec<Identifier>>>()?,
            )
        };

        let mut subjects = json.credential_subject.into_iter();
        let (field, predicate) = match (subjects.next(), subjects.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(IdentityError::invalid_query(
                    "credentialSubject must name exactly one field",
                ))
            }
        };

        let mut predicates = predicate.into_iter();
        let (operator, operands) = match (predicates.next(), predicates.next()) {
            (None, _) => (Operator::Noop, Vec::new()),
            (Some((name, operand)), None) => {
                let operands = match operand {
                    OperandJson::One(value) => vec![value],
                    OperandJson::Many(values) => values,
                };
                (Operator::from_name(&name)?, operands)
            }
            _ => {
                return Err(IdentityError::invalid_query(
                    "a field takes exactly one operator",
                ))
            }
        };

        Ok(Query::new(json.context, json.credential_type, field, operator, operands)?
            .with_allowed_issuers(allowed_issuers))
    }
}
