use std::collections::HashMap;
use std::str::FromStr;

use sea_orm::{
    ColumnTrait, EntityTrait, IdenStatic, Iterable, Order, QueryFilter, QueryOrder, QuerySelect,
    Select, Value,
};

use crate::error::{AppError, AppResult};

/// Page size applied when a request paginates without an explicit `limit`.
pub const DEFAULT_PAGE_LIMIT: u64 = 100;

/// Control keys that drive the pipeline stages instead of filtering.
const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Splits `price[gte]` into the field name and comparison operator. A bare
/// key is an equality filter.
fn parse_filter_key(key: &str) -> AppResult<(&str, FilterOp)> {
    match key.split_once('[') {
        None => Ok((key, FilterOp::Eq)),
        Some((field, rest)) => {
            let op = rest.strip_suffix(']').ok_or_else(|| {
                AppError::BadRequest(format!("Malformed filter parameter: {key}"))
            })?;
            let op = match op {
                "gt" => FilterOp::Gt,
                "gte" => FilterOp::Gte,
                "lt" => FilterOp::Lt,
                "lte" => FilterOp::Lte,
                other => {
                    return Err(AppError::BadRequest(format!(
                        "Unsupported filter operator: {other}"
                    )));
                }
            };
            Ok((field, op))
        }
    }
}

/// Best-effort scalar typing for filter values arriving as strings.
fn coerce_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return n.into();
    }
    if let Ok(f) = raw.parse::<f64>() {
        return f.into();
    }
    if let Ok(b) = raw.parse::<bool>() {
        return b.into();
    }
    raw.to_owned().into()
}

fn column_of<E: EntityTrait>(name: &str) -> AppResult<E::Column> {
    E::Column::from_str(name).map_err(|_| AppError::BadRequest(format!("Unknown field: {name}")))
}

/// Translates a flat query-string map into a fully composed `Select` in a
/// fixed stage order: filter, sort, field selection, pagination. Purely a
/// query transformation; execution stays with the caller.
pub struct ApiFeatures<E: EntityTrait> {
    query: Select<E>,
    params: HashMap<String, String>,
    hidden: &'static [&'static str],
}

impl<E: EntityTrait> ApiFeatures<E> {
    pub fn new(query: Select<E>, params: HashMap<String, String>) -> Self {
        Self {
            query,
            params,
            hidden: &[],
        }
    }

    /// Columns that never appear in a projection, requested or not.
    pub fn hidden(mut self, fields: &'static [&'static str]) -> Self {
        self.hidden = fields;
        self
    }

    pub fn filter(mut self) -> AppResult<Self> {
        let mut entries: Vec<(String, String)> = self
            .params
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        entries.sort();

        for (key, raw) in entries {
            let (field, op) = parse_filter_key(&key)?;
            let column = column_of::<E>(field)?;
            let value = coerce_value(&raw);
            let expr = match op {
                FilterOp::Eq => column.eq(value),
                FilterOp::Gt => column.gt(value),
                FilterOp::Gte => column.gte(value),
                FilterOp::Lt => column.lt(value),
                FilterOp::Lte => column.lte(value),
            };
            self.query = self.query.filter(expr);
        }

        Ok(self)
    }

    pub fn sort(mut self) -> AppResult<Self> {
        match self.params.get("sort").cloned() {
            Some(sort) => {
                for part in sort.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    let (name, order) = match part.strip_prefix('-') {
                        Some(name) => (name, Order::Desc),
                        None => (part, Order::Asc),
                    };
                    let column = column_of::<E>(name)?;
                    self.query = self.query.order_by(column, order);
                }
            }
            None => {
                // Newest documents first when no explicit sort is requested.
                if let Ok(column) = E::Column::from_str("created_at") {
                    self.query = self.query.order_by(column, Order::Desc);
                }
            }
        }

        Ok(self)
    }

    pub fn limit_fields(mut self) -> AppResult<Self> {
        match self.params.get("fields").cloned() {
            Some(fields) => {
                let mut columns = Vec::new();
                for name in fields.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    if self.hidden.contains(&name) {
                        continue;
                    }
                    columns.push(column_of::<E>(name)?);
                }
                if columns.is_empty() {
                    return Err(AppError::BadRequest(
                        "No selectable fields requested".to_string(),
                    ));
                }
                self.query = self.query.select_only().columns(columns);
            }
            None => {
                if !self.hidden.is_empty() {
                    let columns: Vec<E::Column> = E::Column::iter()
                        .filter(|column| !self.hidden.contains(&column.as_str()))
                        .collect();
                    self.query = self.query.select_only().columns(columns);
                }
            }
        }

        Ok(self)
    }

    pub fn paginate(mut self) -> AppResult<Self> {
        let page = self.parse_positive("page")?;
        let limit = self.parse_positive("limit")?;

        if page.is_none() && limit.is_none() {
            return Ok(self);
        }

        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        let skip = (page - 1).saturating_mul(limit);

        self.query = self.query.offset(skip).limit(limit);
        Ok(self)
    }

    fn parse_positive(&self, key: &str) -> AppResult<Option<u64>> {
        match self.params.get(key) {
            None => Ok(None),
            Some(raw) => match raw.parse::<u64>() {
                Ok(value) if value >= 1 => Ok(Some(value)),
                _ => Err(AppError::BadRequest(format!(
                    "{key} must be a positive integer"
                ))),
            },
        }
    }

    /// Runs all four stages in their fixed order.
    pub fn apply(self) -> AppResult<Select<E>> {
        Ok(self.filter()?.sort()?.limit_fields()?.paginate()?.into_query())
    }

    pub fn into_query(self) -> Select<E> {
        self.query
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{DbBackend, QueryTrait};

    use super::*;
    use crate::entities::{tour, user};

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn tour_sql(pairs: &[(&str, &str)]) -> String {
        ApiFeatures::new(tour::Entity::find(), params(pairs))
            .apply()
            .unwrap()
            .build(DbBackend::Postgres)
            .to_string()
    }

    #[test]
    fn equality_and_comparison_filters() {
        let sql = tour_sql(&[("duration", "5"), ("price[gte]", "100")]);
        assert!(sql.contains(r#""tour"."duration" = 5"#), "{sql}");
        assert!(sql.contains(r#""tour"."price" >= 100"#), "{sql}");
    }

    #[test]
    fn gt_is_recognized_alongside_gte() {
        let sql = tour_sql(&[("price[gt]", "50")]);
        assert!(sql.contains(r#""tour"."price" > 50"#), "{sql}");
    }

    #[test]
    fn lt_and_lte_filters() {
        let sql = tour_sql(&[("price[lt]", "2000"), ("duration[lte]", "10")]);
        assert!(sql.contains(r#""tour"."price" < 2000"#), "{sql}");
        assert!(sql.contains(r#""tour"."duration" <= 10"#), "{sql}");
    }

    #[test]
    fn string_values_pass_through_as_equality() {
        let sql = tour_sql(&[("difficulty", "easy")]);
        assert!(sql.contains(r#""tour"."difficulty" = 'easy'"#), "{sql}");
    }

    #[test]
    fn unknown_field_is_rejected() {
        let result = ApiFeatures::new(tour::Entity::find(), params(&[("bogus", "1")])).apply();
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let result =
            ApiFeatures::new(tour::Entity::find(), params(&[("price[within]", "1")])).apply();
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn reserved_keys_are_not_treated_as_filters() {
        // Would fail with an unknown-field error if any control key leaked
        // into the filter stage.
        let sql = tour_sql(&[
            ("page", "1"),
            ("limit", "5"),
            ("sort", "price"),
            ("fields", "name,price"),
            ("duration", "7"),
        ]);
        assert!(sql.contains(r#""tour"."duration" = 7"#), "{sql}");
    }

    #[test]
    fn multi_key_sort_applies_left_to_right() {
        let sql = tour_sql(&[("sort", "-price,ratings_average")]);
        assert!(
            sql.contains(r#"ORDER BY "tour"."price" DESC, "tour"."ratings_average" ASC"#),
            "{sql}"
        );
    }

    #[test]
    fn default_sort_is_newest_first() {
        let sql = tour_sql(&[]);
        assert!(sql.contains(r#"ORDER BY "tour"."created_at" DESC"#), "{sql}");
    }

    #[test]
    fn field_selection_projects_allow_list() {
        let sql = tour_sql(&[("fields", "name,price")]);
        assert!(
            sql.starts_with(r#"SELECT "tour"."name", "tour"."price" FROM "tour""#),
            "{sql}"
        );
    }

    #[test]
    fn pagination_computes_offset_from_page() {
        let sql = tour_sql(&[("page", "2"), ("limit", "10")]);
        assert!(sql.contains("LIMIT 10 OFFSET 10"), "{sql}");
    }

    #[test]
    fn page_without_limit_uses_default_page_size() {
        let sql = tour_sql(&[("page", "3")]);
        assert!(sql.contains("LIMIT 100 OFFSET 200"), "{sql}");
    }

    #[test]
    fn absent_pagination_returns_full_set() {
        let sql = tour_sql(&[]);
        assert!(!sql.contains("LIMIT"), "{sql}");
        assert!(!sql.contains("OFFSET"), "{sql}");
    }

    #[test]
    fn zero_or_garbage_pagination_is_rejected() {
        for pairs in [
            [("page", "0")].as_slice(),
            [("limit", "0")].as_slice(),
            [("page", "abc")].as_slice(),
            [("limit", "-3")].as_slice(),
        ] {
            let result = ApiFeatures::new(tour::Entity::find(), params(pairs)).apply();
            assert!(matches!(result, Err(AppError::BadRequest(_))), "{pairs:?}");
        }
    }

    #[test]
    fn hidden_fields_are_excluded_by_default() {
        let sql = ApiFeatures::new(user::Entity::find(), params(&[]))
            .hidden(&["password_hash"])
            .apply()
            .unwrap()
            .build(DbBackend::Postgres)
            .to_string();
        assert!(!sql.contains("password_hash"), "{sql}");
        assert!(sql.contains(r#""user"."email""#), "{sql}");
    }

    #[test]
    fn hidden_fields_cannot_be_requested_explicitly() {
        let sql = ApiFeatures::new(user::Entity::find(), params(&[("fields", "password_hash,email")]))
            .hidden(&["password_hash"])
            .apply()
            .unwrap()
            .build(DbBackend::Postgres)
            .to_string();
        assert!(!sql.contains("password_hash"), "{sql}");
        assert!(sql.contains(r#""user"."email""#), "{sql}");
    }

    #[test]
    fn coercion_prefers_integers_then_floats_then_bools() {
        assert_eq!(coerce_value("42"), Value::from(42i64));
        assert_eq!(coerce_value("4.5"), Value::from(4.5f64));
        assert_eq!(coerce_value("true"), Value::from(true));
        assert_eq!(coerce_value("easy"), Value::from("easy".to_string()));
    }
}
