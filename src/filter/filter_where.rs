use serde_json::Value;

use super::types::{FilterOp, FilterWhereInfo, FilterWhereOptions};
use super::error::FilterError;

pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    pub fn generate(where_data: &Value, starting_param_index: usize, options: &FilterWhereOptions) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        filter_where.build(where_data, options)
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    /// Flattens `{ field: value }` and `{ field: { $op: value } }` into one
    /// condition per field/operator pair.
    pub fn parse(where_data: &Value) -> Result<Vec<FilterWhereInfo>, FilterError> {
        let mut conditions = vec![];
        match where_data {
            Value::Null => {}
            Value::Object(obj) => {
                for (field, value) in obj {
                    if field.starts_with('$') {
                        return Err(FilterError::UnsupportedOperator(field.clone()));
                    }
                    if let Value::Object(ops) = value {
                        for (op_key, op_val) in ops {
                            let operator = FilterOp::from_key(op_key)
                                .ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                            conditions.push(FilterWhereInfo { column: field.clone(), operator, data: op_val.clone() });
                        }
                    } else {
                        // Implicit equality: { field: value }
                        conditions.push(FilterWhereInfo { column: field.clone(), operator: FilterOp::Eq, data: value.clone() });
                    }
                }
            }
            _ => return Err(FilterError::InvalidWhereClause("Unsupported WHERE format".to_string())),
        }
        Ok(conditions)
    }

    fn build(&mut self, where_data: &Value, options: &FilterWhereOptions) -> Result<(String, Vec<Value>), FilterError> {
        let conditions = Self::parse(where_data)?;
        let mut sql_conditions = vec![];
        for condition in &conditions {
            sql_conditions.push(self.build_sql_condition(condition, options));
        }
        let where_clause = if sql_conditions.is_empty() { "1=1".to_string() } else { sql_conditions.join(" AND ") };
        Ok((where_clause, self.param_values.clone()))
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo, options: &FilterWhereOptions) -> String {
        let quoted_column = format!("\"{}\"", condition.column);
        let cast = options.casts.get(&condition.column).copied();
        match condition.operator {
            FilterOp::Eq => {
                if condition.data.is_null() { format!("{} IS NULL", quoted_column) }
                else { format!("{} = {}", quoted_column, self.param(condition.data.clone(), cast)) }
            }
            FilterOp::Gt => format!("{} > {}", quoted_column, self.param(condition.data.clone(), cast)),
            FilterOp::Gte => format!("{} >= {}", quoted_column, self.param(condition.data.clone(), cast)),
            FilterOp::Lt => format!("{} < {}", quoted_column, self.param(condition.data.clone(), cast)),
            FilterOp::Lte => format!("{} <= {}", quoted_column, self.param(condition.data.clone(), cast)),
            FilterOp::In => {
                if let Value::Array(values) = &condition.data {
                    if values.is_empty() { return "1=0".to_string(); }
                    let params: Vec<String> = values.iter().map(|v| self.param(v.clone(), cast)).collect();
                    format!("{} IN ({})", quoted_column, params.join(", "))
                } else {
                    format!("{} = {}", quoted_column, self.param(condition.data.clone(), cast))
                }
            }
        }
    }

    fn param(&mut self, value: Value, cast: Option<&'static str>) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        match cast {
            Some(sql_type) => format!("${}::{}", self.param_index, sql_type),
            None => format!("${}", self.param_index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_casted_conditions() {
        let mut options = FilterWhereOptions::default();
        options.casts.insert("price".to_string(), "double precision");
        let (sql, params) = FilterWhere::generate(
            &json!({"category": "door", "price": {"$gte": 10}}),
            0,
            &options,
        )
        .unwrap();
        assert_eq!(sql, "\"category\" = $1 AND \"price\" >= $2::double precision");
        assert_eq!(params, vec![json!("door"), json!(10)]);
    }

    #[test]
    fn expands_in_lists() {
        let (sql, params) = FilterWhere::generate(
            &json!({"category": {"$in": ["door", "net"]}}),
            0,
            &FilterWhereOptions::default(),
        )
        .unwrap();
        assert_eq!(sql, "\"category\" IN ($1, $2)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn empty_in_matches_nothing() {
        let (sql, _) = FilterWhere::generate(&json!({"category": {"$in": []}}), 0, &FilterWhereOptions::default()).unwrap();
        assert_eq!(sql, "1=0");
    }

    #[test]
    fn rejects_unknown_operators() {
        let err = FilterWhere::parse(&json!({"price": {"$regex": "1"}})).unwrap_err();
        assert!(matches!(err, FilterError::UnsupportedOperator(op) if op == "$regex"));
        assert!(FilterWhere::parse(&json!({"$or": []})).is_err());
    }
}
