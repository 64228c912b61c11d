use std::collections::BTreeMap;

use regex::Regex;

use super::Value;

pub type Row = Vec<Value>;

/// Field values keyed by field name or storage column name.
pub type FieldMap = BTreeMap<String, Value>;

lazy_static::lazy_static! {
    static ref LOWER_UPPER: Regex = Regex::new(r"([a-z0-9])([A-Z])").expect("static regex");
    static ref ACRONYM_WORD: Regex = Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("static regex");
}

/// `CreateDate` -> `create_date`, `HTTPServer` -> `http_server`.
pub fn snake_case(name: &str) -> String {
    let step = ACRONYM_WORD.replace_all(name, "${1}_${2}");
    let step = LOWER_UPPER.replace_all(&step, "${1}_${2}");
    step.replace(['.', '-', ' '], "_").to_lowercase()
}

/// Build a [`FieldMap`] from `key => value` pairs.
#[macro_export]
macro_rules! field_map {
    () => { $crate::core::FieldMap::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::core::FieldMap::new();
        $( map.insert(($key).to_string(), $crate::core::Value::from($value)); )+
        map
    }};
}
