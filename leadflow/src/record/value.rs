use chrono::NaiveDate;
use serde::ser::{Serialize, SerializeSeq, Serializer};

/// A cell value. `Empty` renders as `""`, never `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldValue {
    /// No value.
    #[default]
    Empty,
    /// Integer.
    Int(i64),
    /// Fractional number.
    Float(f64),
    /// Text.
    Text(String),
    /// Calendar date in tenant-local time.
    Date(NaiveDate),
    /// Several text values.
    List(Vec<String>),
}

impl FieldValue {
    /// `1` when set, empty otherwise.
    #[must_use]
    pub const fn flag(set: bool) -> Self {
        if set {
            Self::Int(1)
        } else {
            Self::Empty
        }
    }

    /// A number, collapsed to `Int` when integral and to `Empty` when zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn number(value: f64) -> Self {
        if value == 0.0 || !value.is_finite() {
            Self::Empty
        } else if value.fract() == 0.0 && value.abs() < 9.0e15 {
            Self::Int(value as i64)
        } else {
            Self::Float(value)
        }
    }

    /// A count, empty when zero.
    #[must_use]
    pub fn count(value: u64) -> Self {
        if value == 0 {
            Self::Empty
        } else {
            Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
        }
    }

    /// Returns true for `Empty` and for empty text or lists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Text form as a spreadsheet would show it.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::List(items) => items.join(", "),
        }
    }

    /// The date, if this is one.
    #[must_use]
    pub const fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// The integer, if this is one.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_str(""),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::flag(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Text(value)
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_empty_as_string() {
        let values = vec![
            FieldValue::Empty,
            FieldValue::Int(3),
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
            FieldValue::List(vec!["381641234567".to_string()]),
        ];
        assert_eq!(
            serde_json::to_string(&values).unwrap(),
            r#"["",3,"2024-01-02",["381641234567"]]"#
        );
    }

    #[test]
    fn test_number_normalisation() {
        assert_eq!(FieldValue::number(0.0), FieldValue::Empty);
        assert_eq!(FieldValue::number(600.0), FieldValue::Int(600));
        assert_eq!(FieldValue::number(612.5), FieldValue::Float(612.5));
        assert_eq!(FieldValue::count(0), FieldValue::Empty);
        assert_eq!(FieldValue::count(4), FieldValue::Int(4));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(FieldValue::from(true), FieldValue::Int(1));
        assert_eq!(FieldValue::from(false), FieldValue::Empty);
        assert_eq!(FieldValue::from(""), FieldValue::Empty);
        assert_eq!(FieldValue::from(None::<i64>), FieldValue::Empty);
        assert_eq!(FieldValue::from(Some(5_i64)).as_int(), Some(5));
        assert!(FieldValue::Text(String::new()).is_empty());
    }
}
