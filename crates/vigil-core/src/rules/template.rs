//! `{field}` placeholder templates for issue text.
//!
//! `{{` and `}}` produce literal braces. A lone `}` is kept as-is.

use crate::domain::RawResult;

use super::error::RuleEvaluationError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse `source`; the error is a human-readable reason.
    pub fn parse(source: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for n in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err("unterminated placeholder".to_string());
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err("empty placeholder".to_string());
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name.to_string()));
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Field names referenced by placeholders, in order of appearance.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute every placeholder from `raw`. A missing field is an error.
    pub fn render(&self, raw: &RawResult) -> Result<String, RuleEvaluationError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value =
                        raw.lookup(name)
                            .ok_or_else(|| RuleEvaluationError::MissingField {
                                field: name.clone(),
                            })?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CheckId, FieldMap, FieldValue};
    use chrono::Utc;

    fn raw(fields: FieldMap) -> RawResult {
        let now = Utc::now();
        RawResult::completed(CheckId::from("disk"), now, now, fields, None)
    }

    #[test]
    fn renders_fields_and_envelope() {
        let t = Template::parse("{mount} at {used_pct}% on {_check_id}").unwrap();
        let r = raw(FieldMap::from([
            ("mount".into(), FieldValue::from("/var")),
            ("used_pct".into(), FieldValue::Int(97)),
        ]));
        assert_eq!(t.render(&r).unwrap(), "/var at 97% on disk");
        assert_eq!(
            t.fields().collect::<Vec<_>>(),
            vec!["mount", "used_pct", "_check_id"]
        );
    }

    #[test]
    fn escaped_braces_are_literal() {
        let t = Template::parse("{{literal}} }").unwrap();
        assert_eq!(t.fields().count(), 0);
        assert_eq!(t.render(&raw(FieldMap::new())).unwrap(), "{literal} }");
    }

    #[test]
    fn parse_rejects_unterminated_and_empty() {
        assert_eq!(
            Template::parse("value {oops").unwrap_err(),
            "unterminated placeholder"
        );
        assert_eq!(Template::parse("{ }").unwrap_err(), "empty placeholder");
    }

    #[test]
    fn render_missing_field_is_error() {
        let t = Template::parse("{absent}").unwrap();
        let err = t.render(&raw(FieldMap::new())).unwrap_err();
        assert_eq!(
            err,
            RuleEvaluationError::MissingField {
                field: "absent".into()
            }
        );
    }
}
