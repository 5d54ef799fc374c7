use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Banner shown on the page after a redirect, carried in the `msg` query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Info,
    Warning,
    Error,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl Message {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            text: text.into(),
        }
    }

    /// `location?msg=<json>`, percent-encoded.
    pub fn redirect_url(&self, location: &str) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("{location}?msg={}", urlencoding::encode(&json))
    }
}

/// Accepts a single `{type, text}` object, an array of them, or anything
/// else which is shown as a warning. Objects without both keys are dropped.
pub fn parse(msg: &str) -> Vec<Message> {
    let from_object = |value: &Value| -> Option<Message> {
        let kind = serde_json::from_value(value.get("type")?.clone()).ok()?;
        let text = match value.get("text")? {
            Value::String(s) => s.clone(),
            Value::Null => return None,
            other => other.to_string(),
        };
        Some(Message { kind, text })
    };

    match serde_json::from_str::<Value>(msg) {
        Ok(Value::Array(values)) => values.iter().filter_map(from_object).collect(),
        Ok(value @ Value::Object(_)) => from_object(&value).into_iter().collect(),
        Ok(Value::String(s)) => vec![Message::warning(s)],
        _ => vec![Message::warning(msg)],
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single() {
        assert_eq!(
            parse(r#"{"type":"info","text":"Modpack Meta Updated!"}"#),
            vec![Message::info("Modpack Meta Updated!")]
        );
    }

    #[test]
    fn many() {
        assert_eq!(
            parse(r#"[{"type":"error","text":"a"},{"text":"no type"},{"type":"warning","text":3}]"#),
            vec![Message::error("a"), Message::warning("3")]
        );
    }

    #[test]
    fn bare_text_is_a_warning() {
        assert_eq!(parse("hello there"), vec![Message::warning("hello there")]);
        assert_eq!(parse(r#""quoted""#), vec![Message::warning("quoted")]);
    }

    #[test]
    fn unknown_kind_is_dropped() {
        assert_eq!(parse(r#"{"type":"shout","text":"x"}"#), vec![]);
    }

    #[test]
    fn redirect() {
        let msg = Message::warning("Version must be greater than previous version.");
        let url = msg.redirect_url("/admin/modpack");

        let (path, query) = url.split_once("?msg=").unwrap();
        assert_eq!(path, "/admin/modpack");
        assert!(!query.contains(' '));
        assert!(!query.contains('"'));

        let decoded = urlencoding::decode(query).unwrap();
        assert_eq!(parse(&decoded), vec![msg]);
    }
}
