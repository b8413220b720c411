//! Turns a raw URL query string into a [`FilterData`].
//!
//! `?category=door&price[gte]=10&sort=-price&page=2&limit=5&fields=name,price`
//! becomes a where clause of `{category: "door", price: {$gte: "10"}}`, an
//! order of `price desc`, a page window of offset 5 / limit 5 and a selection
//! of `id, name, price`. Values stay strings here; the collection schema casts
//! them.

use serde_json::{Map, Value};

use super::types::FilterData;
use crate::config::FilterConfig;

pub type QueryMap = Map<String, Value>;

const RESERVED: [&str; 4] = ["page", "sort", "limit", "fields"];
const OPERATORS: [&str; 4] = ["gte", "gt", "lte", "lt"];

/// Parses `a=1&b[gte]=2&c=x&c=y` into `{a: "1", b: {gte: "2"}, c: ["x", "y"]}`.
pub fn parse_query(raw: &str) -> QueryMap {
    let mut map = QueryMap::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        let path = split_brackets(&key);
        if path.is_empty() {
            continue;
        }
        insert_path(&mut map, path, Value::String(value.into_owned()));
    }
    map
}

fn insert_path(target: &mut QueryMap, mut path: Vec<String>, value: Value) {
    let key = path.remove(0);
    if path.is_empty() {
        insert_repeated(target, key, value);
        return;
    }
    let entry = target.entry(key).or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(inner) = entry {
        insert_path(inner, path, value);
    }
}

fn split_brackets(key: &str) -> Vec<String> {
    let mut parts = vec![];
    let (head, mut rest) = match key.find('[') {
        Some(i) => (&key[..i], &key[i..]),
        None => (key, ""),
    };
    if head.is_empty() {
        return parts;
    }
    parts.push(head.to_string());
    while let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(end) => {
                parts.push(stripped[..end].to_string());
                rest = &stripped[end + 1..];
            }
            None => break,
        }
    }
    parts
}

fn insert_repeated(target: &mut QueryMap, key: String, value: Value) {
    match target.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, value]);
        }
        None => {
            target.insert(key, value);
        }
    }
}

/// Chainable query builder. Each step reads the original query and fills in
/// one part of the resulting [`FilterData`].
pub struct FilterApi<'a> {
    query: QueryMap,
    config: &'a FilterConfig,
    data: FilterData,
}

impl<'a> FilterApi<'a> {
    pub fn new(query: QueryMap, config: &'a FilterConfig) -> Self {
        Self {
            query,
            config,
            data: FilterData::default(),
        }
    }

    pub fn from_raw(raw: Option<&str>, config: &'a FilterConfig) -> Self {
        Self::new(raw.map(parse_query).unwrap_or_default(), config)
    }

    pub fn filter(mut self) -> Self {
        let mut where_clause = Map::new();
        for (key, value) in &self.query {
            if RESERVED.contains(&key.as_str()) {
                continue;
            }
            let condition = match value {
                Value::Object(ops) => Value::Object(
                    ops.iter()
                        .map(|(op, v)| {
                            let op = if OPERATORS.contains(&op.as_str()) { format!("${}", op) } else { op.clone() };
                            (op, v.clone())
                        })
                        .collect(),
                ),
                Value::Array(values) => {
                    let mut ops = Map::new();
                    ops.insert("$in".to_string(), Value::Array(values.clone()));
                    Value::Object(ops)
                }
                other => other.clone(),
            };
            where_clause.insert(key.clone(), condition);
        }
        self.data.where_clause = Some(Value::Object(where_clause));
        self
    }

    pub fn sort(mut self) -> Self {
        let fields = self.list_param("sort");
        let order: Vec<Value> = if fields.is_empty() {
            vec![Value::String("createdAt desc".to_string())]
        } else {
            fields
                .into_iter()
                .map(|f| match f.strip_prefix('-') {
                    Some(name) => Value::String(format!("{} desc", name)),
                    None => Value::String(format!("{} asc", f)),
                })
                .collect()
        };
        self.data.order = Some(Value::Array(order));
        self
    }

    pub fn project(mut self) -> Self {
        let fields = self.list_param("fields");
        if fields.is_empty() {
            self.data.select = None;
            self.data.omit = vec!["revision".to_string()];
        } else {
            let mut select = vec!["id".to_string()];
            for f in fields {
                if !select.contains(&f) {
                    select.push(f);
                }
            }
            self.data.select = Some(select);
            self.data.omit = vec![];
        }
        self
    }

    pub fn paginate(mut self) -> Self {
        let page = self.positive_param("page").unwrap_or(1);
        let mut limit = self
            .positive_param("limit")
            .unwrap_or_else(|| i64::from(self.config.default_limit.max(1)));
        if let Some(max) = self.config.max_limit {
            limit = limit.min(i64::from(max.max(1)));
        }
        self.data.limit = Some(limit);
        self.data.offset = Some((page - 1).saturating_mul(limit));
        self
    }

    pub fn into_data(self) -> FilterData {
        self.data
    }

    fn list_param(&self, key: &str) -> Vec<String> {
        let joined = match self.query.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(","),
            _ => String::new(),
        };
        joined
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Absent, non-numeric, zero and negative values all read as `None`.
    fn positive_param(&self, key: &str) -> Option<i64> {
        self.query
            .get(key)
            .and_then(Value::as_str)
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|n| *n > 0)
    }
}
