//! Encoded query strings for the table API (`sysparm_query`).
//!
//! Conditions are chained with `^`; ordering clauses are appended the same way.

#[derive(Debug, Default, Clone)]
pub struct EncodedQuery {
    clauses: Vec<String>,
}

impl EncodedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl AsRef<str>) -> Self {
        self.clauses.push(format!("{field}={}", value.as_ref()));
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.clauses.push(format!("ORDERBY{field}"));
        self
    }

    pub fn order_by_desc(mut self, field: &str) -> Self {
        self.clauses.push(format!("ORDERBYDESC{field}"));
        self
    }

    pub fn build(&self) -> String {
        self.clauses.join("^")
    }
}
