use serde::{Deserialize, Serialize};

const COUNT_COLUMN_ALIAS: &str = "count";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableName {
    pub pure_name: String,
    #[serde(default)]
    pub schema_name: Option<String>,
}

impl TableName {
    #[must_use]
    pub fn new(pure_name: impl Into<String>) -> Self {
        Self {
            pure_name: pure_name.into(),
            schema_name: None,
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = Some(schema_name.into());
        self
    }

    /// Schema name when it should qualify the table, `None` for blank schemas.
    #[must_use]
    pub fn qualifying_schema(&self) -> Option<&str> {
        self.schema_name
            .as_deref()
            .filter(|schema| !schema.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyRef {
    pub ref_table: TableName,
    pub ref_column: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl Aggregate {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnReference {
    /// Column name or nested document path such as `address.city`.
    pub name: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub foreign_key: Option<ForeignKeyRef>,
    #[serde(default)]
    pub aggregate: Option<Aggregate>,
    #[serde(default)]
    pub alias: Option<String>,
}

impl ColumnReference {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
            foreign_key: None,
            aggregate: None,
            alias: None,
        }
    }

    #[must_use]
    pub fn count_all() -> Self {
        Self {
            aggregate: Some(Aggregate::Count),
            alias: Some(COUNT_COLUMN_ALIAS.to_string()),
            ..Self::new("*")
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.name == "*"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "like",
            Self::NotLike => "not like",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::IsNull => "is null",
            Self::IsNotNull => "is not null",
        }
    }

    #[must_use]
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            Self::Like | Self::NotLike | Self::In | Self::NotIn | Self::IsNull | Self::IsNotNull
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&serde_json::Value> for SqlValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(flag) => Self::Bool(*flag),
            serde_json::Value::Number(number) => number
                .as_i64()
                .map(Self::Int)
                .or_else(|| number.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            serde_json::Value::String(text) => Self::Text(text.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FilterOperand {
    None,
    Value(SqlValue),
    List(Vec<SqlValue>),
    SubQuery(Box<Select>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub column: ColumnReference,
    pub operator: FilterOperator,
    pub operand: FilterOperand,
}

impl FilterPredicate {
    #[must_use]
    pub fn new(column: ColumnReference, operator: FilterOperator, operand: FilterOperand) -> Self {
        Self {
            column,
            operator,
            operand,
        }
    }

    #[must_use]
    pub fn equals(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::new(
            ColumnReference::new(column),
            FilterOperator::Eq,
            FilterOperand::Value(value.into()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: ColumnReference,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub offset: u64,
    pub limit: u64,
}

impl RangeSpec {
    /// Returns `None` for a zero limit, which cannot express a page.
    #[must_use]
    pub fn new(offset: u64, limit: u64) -> Option<Self> {
        (limit > 0).then_some(Self { offset, limit })
    }
}

/// Engine-neutral description of a single-table SELECT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Select {
    pub from: TableName,
    #[serde(default)]
    pub columns: Vec<ColumnReference>,
    #[serde(default)]
    pub filters: Vec<FilterPredicate>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub range: Option<RangeSpec>,
}

impl Select {
    #[must_use]
    pub fn from_table(from: TableName) -> Self {
        Self {
            from,
            columns: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            range: None,
        }
    }

    #[must_use]
    pub fn column(mut self, column: ColumnReference) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn filter(mut self, predicate: FilterPredicate) -> Self {
        self.filters.push(predicate);
        self
    }

    #[must_use]
    pub fn order(mut self, column: ColumnReference, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy { column, direction });
        self
    }

    #[must_use]
    pub fn range(mut self, offset: u64, limit: u64) -> Self {
        self.range = RangeSpec::new(offset, limit);
        self
    }

    /// Same query restricted to one page of rows.
    #[must_use]
    pub fn page_query(&self, offset: u64, limit: u64) -> Self {
        self.clone().range(offset, limit)
    }

    /// Row count over the same filters, without ordering or range.
    #[must_use]
    pub fn count_query(&self) -> Self {
        Self {
            from: self.from.clone(),
            columns: vec![ColumnReference::count_all()],
            filters: self.filters.clone(),
            order_by: Vec::new(),
            range: None,
        }
    }
}

/// Input accepted at the translation boundary.
///
/// Finished SQL, either bare or wrapped in an object carrying `sql`, passes
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectRequest {
    Sql(String),
    Wrapped { sql: String },
    Model(Select),
}

impl From<Select> for SelectRequest {
    fn from(select: Select) -> Self {
        Self::Model(select)
    }
}
