use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterData, FilterOrderInfo, FilterWhereOptions, SqlResult};

/// Builds a parameterized SELECT whose single `row` column is a JSON object
/// of the selected columns.
pub struct Filter {
    table_name: String,
    select_columns: Vec<String>,
    where_data: Option<Value>,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<i64>,
    offset: Option<i64>,
    options: FilterWhereOptions,
}

impl Filter {
    pub fn new(table_name: impl Into<String>) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        Self::validate_table_name(&table_name)?;
        Ok(Self {
            table_name,
            select_columns: vec![],
            where_data: None,
            order_data: vec![],
            limit: None,
            offset: None,
            options: FilterWhereOptions::default(),
        })
    }

    pub fn with_options(mut self, options: FilterWhereOptions) -> Self {
        self.options = options;
        self
    }

    /// Applies a query. `all_columns` is the full column list, used when the
    /// query does not name an explicit selection.
    pub fn assign(&mut self, data: FilterData, all_columns: &[&str]) -> Result<&mut Self, FilterError> {
        let columns = match data.select {
            Some(select) => select,
            None => all_columns
                .iter()
                .filter(|c| !data.omit.iter().any(|o| o == *c))
                .map(|c| c.to_string())
                .collect(),
        };
        self.select(columns)?;
        if let Some(where_clause) = data.where_clause { self.where_clause(where_clause)?; }
        if let Some(order) = data.order { self.order(order)?; }
        if let Some(limit) = data.limit { self.limit(limit, data.offset)?; }
        Ok(self)
    }

    pub fn select(&mut self, columns: Vec<String>) -> Result<&mut Self, FilterError> {
        Self::validate_select_columns(&columns)?;
        self.select_columns = columns;
        Ok(self)
    }

    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = Some(conditions);
        Ok(self)
    }

    pub fn order(&mut self, order_spec: Value) -> Result<&mut Self, FilterError> {
        let order_info = FilterOrder::validate_and_parse(&order_spec)?;
        self.order_data = order_info;
        Ok(self)
    }

    pub fn limit(&mut self, limit: i64, offset: Option<i64>) -> Result<&mut Self, FilterError> {
        if limit < 0 { return Err(FilterError::InvalidLimit("Limit must be non-negative".to_string())); }
        if let Some(off) = offset { if off < 0 { return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string())); } }
        self.limit = Some(limit);
        self.offset = offset;
        Ok(self)
    }

    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let select_clause = self.build_select_clause();
        let (where_clause, params) = self.where_parts()?;
        let order_clause = FilterOrder::generate(&self.order_data)?;
        let limit_clause = self.build_limit_clause();

        let query = [
            format!("SELECT {} AS row", select_clause),
            format!("FROM \"{}\"", self.table_name),
            format!("WHERE {}", where_clause),
            order_clause,
            limit_clause,
        ].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");

        Ok(SqlResult { query, params })
    }

    pub fn to_where_sql(&self) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = self.where_parts()?;
        Ok(SqlResult { query: where_clause, params })
    }

    fn where_parts(&self) -> Result<(String, Vec<Value>), FilterError> {
        match self.where_data {
            Some(ref where_data) => FilterWhere::generate(where_data, 0, &self.options),
            None => Ok(("1=1".to_string(), vec![])),
        }
    }

    fn validate_table_name(name: &str) -> Result<(), FilterError> {
        if !Self::is_identifier(name) {
            return Err(FilterError::InvalidTableName(format!("Invalid table name format: {}", name)));
        }
        Ok(())
    }

    fn validate_select_columns(columns: &[String]) -> Result<(), FilterError> {
        if columns.is_empty() {
            return Err(FilterError::InvalidColumn("At least one column must be selected".to_string()));
        }
        for column in columns {
            if !Self::is_identifier(column) {
                return Err(FilterError::InvalidColumn(format!("Invalid column name format: {}", column)));
            }
        }
        Ok(())
    }

    pub(crate) fn is_identifier(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    }

    fn build_select_clause(&self) -> String {
        let pairs = self
            .select_columns
            .iter()
            .map(|c| format!("'{}', \"{}\"", c, c))
            .collect::<Vec<_>>()
            .join(", ");
        format!("json_build_object({})", pairs)
    }

    fn build_limit_clause(&self) -> String {
        match (self.limit, self.offset) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_full_select() {
        let mut filter = Filter::new("products").unwrap();
        filter
            .assign(
                FilterData {
                    select: Some(vec!["id".into(), "name".into()]),
                    where_clause: Some(json!({"category": "door"})),
                    order: Some(json!(["price desc"])),
                    limit: Some(5),
                    offset: Some(5),
                    ..Default::default()
                },
                &["id", "name", "price"],
            )
            .unwrap();
        let sql = filter.to_sql().unwrap();
        assert_eq!(
            sql.query,
            "SELECT json_build_object('id', \"id\", 'name', \"name\") AS row FROM \"products\" \
             WHERE \"category\" = $1 ORDER BY \"price\" DESC LIMIT 5 OFFSET 5"
        );
        assert_eq!(sql.params, vec![json!("door")]);
    }

    #[test]
    fn omits_columns_when_no_selection() {
        let mut filter = Filter::new("reviews").unwrap();
        filter
            .assign(
                FilterData { omit: vec!["revision".into()], ..Default::default() },
                &["id", "rating", "revision"],
            )
            .unwrap();
        let sql = filter.to_sql().unwrap();
        assert!(sql.query.starts_with("SELECT json_build_object('id', \"id\", 'rating', \"rating\") AS row"));
        assert!(sql.query.contains("WHERE 1=1"));
    }

    #[test]
    fn rejects_bad_identifiers() {
        assert!(Filter::new("users; drop").is_err());
        let mut filter = Filter::new("users").unwrap();
        assert!(filter.select(vec!["name\"".into()]).is_err());
    }
}
