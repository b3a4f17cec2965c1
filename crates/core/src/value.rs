//! Minimal result model: values, rows, and query results
//!
//! Rich type conversion is a collaborator concern (the codec layer decodes
//! column bytes); this layer only needs enough structure to hand results to
//! callers and to write meaningful tests.

/// A single column value in a result row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Integer value
    Int(i64),
    /// Text value
    Text(String),
}

impl Value {
    /// Return the value as an `i64` if it is an integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Return the value as a `&str` if it is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True if the value is SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// One row of a query result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Create a row from column values
    pub fn new(values: Vec<Value>) -> Self {
        Row { values }
    }

    /// Get a column value by position
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Number of columns in the row
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the row has no columns
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The complete outcome of one successfully executed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    /// Result rows, in the order the backend produced them
    pub rows: Vec<Row>,
    /// Number of rows affected by a write command
    pub rows_affected: u64,
}

impl QueryResult {
    /// An empty result (acknowledgment with no rows, nothing affected)
    pub fn empty() -> Self {
        QueryResult {
            rows: Vec::new(),
            rows_affected: 0,
        }
    }

    /// A result carrying rows
    pub fn with_rows(rows: Vec<Row>) -> Self {
        QueryResult {
            rows,
            rows_affected: 0,
        }
    }

    /// A write acknowledgment affecting `n` rows
    pub fn updated(n: u64) -> Self {
        QueryResult {
            rows: Vec::new(),
            rows_affected: n,
        }
    }

    /// Number of result rows
    pub fn size(&self) -> usize {
        self.rows.len()
    }
}
