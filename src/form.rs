//! Urlencoded/multipart form fields, checked against a fixed field list
//! before anything else looks at them.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Required, may be empty.
    String,
    /// Present means `true`, whatever the value.
    Boolean,
}

pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Boolean(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormError {
    Missing(&'static str),
}

impl FormError {
    pub fn message(self) -> &'static str {
        match self {
            Self::Missing(_) => "Please fill in every field.",
        }
    }
}

/// Parsed fields, in schema order.
#[derive(Debug)]
pub struct Fields(Vec<(&'static str, Value)>);

pub fn parse(schema: &[Field], raw: &HashMap<String, String>) -> Result<Fields, FormError> {
    schema
        .iter()
        .map(|field| {
            let raw = raw.get(field.name);

            let value = match field.kind {
                FieldKind::Boolean => Value::Boolean(raw.is_some()),
                FieldKind::String => {
                    Value::String(raw.ok_or(FormError::Missing(field.name))?.clone())
                }
            };

            Ok((field.name, value))
        })
        .collect::<Result<_, _>>()
        .map(Fields)
}

impl Fields {
    fn take(&mut self, name: &str) -> Option<Value> {
        let i = self.0.iter().position(|(n, _)| *n == name)?;
        Some(self.0.remove(i).1)
    }

    pub fn string(&mut self, name: &'static str) -> Result<String, FormError> {
        match self.take(name) {
            Some(Value::String(s)) => Ok(s),
            _ => Err(FormError::Missing(name)),
        }
    }

    pub fn boolean(&mut self, name: &'static str) -> bool {
        matches!(self.take(name), Some(Value::Boolean(true)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SCHEMA: &[Field] = &[
        Field {
            name: "name",
            kind: FieldKind::String,
        },
        Field {
            name: "version",
            kind: FieldKind::String,
        },
        Field {
            name: "flag",
            kind: FieldKind::Boolean,
        },
    ];

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn typed_fields() {
        let fields = parse(SCHEMA, &raw(&[("flag", ""), ("version", "1.0.0"), ("name", "x")])).unwrap();

        assert_eq!(
            fields.0,
            vec![
                ("name", Value::String("x".into())),
                ("version", Value::String("1.0.0".into())),
                ("flag", Value::Boolean(true)),
            ]
        );
    }

    #[test]
    fn absent_boolean_is_false() {
        let mut fields = parse(SCHEMA, &raw(&[("name", ""), ("version", "1")])).unwrap();

        assert!(!fields.boolean("flag"));
        assert_eq!(fields.string("name").unwrap(), "");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let fields = parse(SCHEMA, &raw(&[("name", "x"), ("version", "1"), ("extra", "y")])).unwrap();
        assert_eq!(fields.0.len(), 3);
    }

    #[test]
    fn missing_field() {
        assert_eq!(
            parse(SCHEMA, &raw(&[("version", "1")])).unwrap_err(),
            FormError::Missing("name")
        );

        let mut fields = parse(SCHEMA, &raw(&[("name", "x"), ("version", "1")])).unwrap();
        fields.string("name").unwrap();
        assert_eq!(fields.string("name").unwrap_err(), FormError::Missing("name"));
    }
}
