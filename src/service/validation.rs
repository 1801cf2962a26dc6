//! Payload validation from collection field rules.

use crate::config::{FieldConfig, FieldType, ResolvedCollection};
use crate::error::{AppError, Violation};
use crate::store::{Document, Filter, RecordStore};
use serde_json::Value;
use uuid::Uuid;

pub struct RecordValidator;

impl RecordValidator {
    /// Schema checks only (required, type, allowed values); never touches a store.
    /// Returns the normalized record: declared fields only, integers normalized.
    pub fn check(collection: &ResolvedCollection, body: &Document) -> Result<Document, Vec<Violation>> {
        let (doc, violations) = normalize(collection, body);
        if violations.is_empty() {
            Ok(doc)
        } else {
            Err(violations)
        }
    }

    /// Schema checks plus uniqueness against the store, excluding the record being updated.
    /// Only reads from the store. Every violated field is reported.
    pub async fn validate(
        store: &dyn RecordStore,
        collection: &ResolvedCollection,
        body: &Document,
        exclude: Option<Uuid>,
    ) -> Result<Document, AppError> {
        let (doc, mut violations) = normalize(collection, body);
        for field in collection.unique_fields() {
            let Some(value) = doc.get(&field.name) else {
                continue;
            };
            let filter = Filter::new(field.name.clone(), value.clone());
            if store.exists(&collection.name, &filter, exclude).await? {
                violations.push(Violation::DuplicateValue {
                    field: field.name.clone(),
                });
            }
        }
        if violations.is_empty() {
            return Ok(doc);
        }
        violations.sort_by_key(|v| collection.fields.iter().position(|f| f.name == v.field()));
        Err(AppError::from_violations(violations))
    }

    /// Parse a raw path or query value into an equality filter on `field_name`.
    /// Values outside an enumerated field's allowed set are rejected rather than matching nothing.
    pub fn parse_filter(collection: &ResolvedCollection, field_name: &str, raw: &str) -> Result<Filter, AppError> {
        let field = collection
            .field(field_name)
            .ok_or_else(|| AppError::BadRequest(format!("unknown filter field '{}'", field_name)))?;
        let invalid = || AppError::BadRequest(format!("invalid {} '{}': expected {}", field.name, raw, field.type_));
        let value = match field.type_ {
            FieldType::Text => {
                if let Some(allowed) = &field.allowed {
                    if !allowed.iter().any(|a| a == raw) {
                        return Err(AppError::BadRequest(format!(
                            "invalid {} '{}': expected one of {}",
                            field.name,
                            raw,
                            allowed.join(", ")
                        )));
                    }
                }
                Value::String(raw.to_string())
            }
            FieldType::Integer => Value::from(raw.parse::<i64>().map_err(|_| invalid())?),
            FieldType::Number => match raw.parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => raw
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(invalid)?,
            },
            FieldType::Boolean => Value::Bool(raw.parse::<bool>().map_err(|_| invalid())?),
        };
        Ok(Filter::new(field.name.clone(), value))
    }
}

fn normalize(collection: &ResolvedCollection, body: &Document) -> (Document, Vec<Violation>) {
    let mut doc = Document::new();
    let mut violations = Vec::new();
    for field in &collection.fields {
        match normalize_field(field, body.get(&field.name)) {
            Ok(Some(value)) => {
                doc.insert(field.name.clone(), value);
            }
            Ok(None) => {}
            Err(v) => violations.push(v),
        }
    }
    (doc, violations)
}

/// `Ok(None)` means the optional field is absent.
fn normalize_field(field: &FieldConfig, value: Option<&Value>) -> Result<Option<Value>, Violation> {
    let value = match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if field.required && s.trim().is_empty() => None,
        Some(v) => Some(v),
    };
    let Some(value) = value else {
        return if field.required {
            Err(Violation::MissingField {
                field: field.name.clone(),
            })
        } else {
            Ok(None)
        };
    };

    let mismatch = || Violation::TypeMismatch {
        field: field.name.clone(),
        expected: field.type_,
    };
    let normalized = match field.type_ {
        FieldType::Text => {
            let s = value.as_str().ok_or_else(mismatch)?;
            if let Some(allowed) = &field.allowed {
                if !allowed.iter().any(|a| a == s) {
                    return Err(Violation::InvalidEnum {
                        field: field.name.clone(),
                        allowed: allowed.clone(),
                    });
                }
            }
            value.clone()
        }
        FieldType::Integer => Value::from(as_integer(value).ok_or_else(mismatch)?),
        FieldType::Number if value.is_number() => value.clone(),
        FieldType::Boolean if value.is_boolean() => value.clone(),
        FieldType::Number | FieldType::Boolean => return Err(mismatch()),
    };
    Ok(Some(normalized))
}

/// Integers, or floats with no fractional part within i64 range.
fn as_integer(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin, resolve};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn collection(path: &str) -> ResolvedCollection {
        let model = resolve(&builtin().unwrap()).unwrap();
        model.collection_by_path(path).unwrap().clone()
    }

    fn doc(v: Value) -> Document {
        v.as_object().unwrap().clone()
    }

    fn valid_person() -> Document {
        doc(json!({
            "name": "A",
            "work": "chef",
            "mobile": "1",
            "email": "a@x.com",
            "address": "addr",
            "salary": 100
        }))
    }

    #[test]
    fn accepts_valid_person_and_drops_undeclared_fields() {
        let mut body = valid_person();
        body.insert("nickname".into(), json!("Ace"));
        body.insert("id".into(), json!("client-chosen"));
        let out = RecordValidator::check(&collection("person"), &body).unwrap();
        assert_eq!(out, valid_person());
    }

    #[test]
    fn reports_every_violated_field_in_declaration_order() {
        let body = doc(json!({
            "name": "",
            "age": "thirty",
            "work": "janitor",
            "salary": "lots"
        }));
        let violations = RecordValidator::check(&collection("person"), &body).unwrap_err();
        assert_eq!(
            violations,
            vec![
                Violation::MissingField { field: "name".into() },
                Violation::TypeMismatch {
                    field: "age".into(),
                    expected: FieldType::Integer
                },
                Violation::InvalidEnum {
                    field: "work".into(),
                    allowed: vec!["chef".into(), "waiter".into(), "manager".into()]
                },
                Violation::MissingField { field: "mobile".into() },
                Violation::MissingField { field: "email".into() },
                Violation::MissingField { field: "address".into() },
                Violation::TypeMismatch {
                    field: "salary".into(),
                    expected: FieldType::Number
                },
            ]
        );
    }

    #[test]
    fn null_required_field_is_missing() {
        let mut body = valid_person();
        body.insert("email".into(), Value::Null);
        let violations = RecordValidator::check(&collection("person"), &body).unwrap_err();
        assert_eq!(violations, vec![Violation::MissingField { field: "email".into() }]);
    }

    #[test]
    fn integer_accepts_whole_floats_only() {
        let c = collection("person");
        let mut body = valid_person();
        body.insert("age".into(), json!(30.0));
        let out = RecordValidator::check(&c, &body).unwrap();
        assert_eq!(out["age"], json!(30));

        body.insert("age".into(), json!(30.5));
        assert!(RecordValidator::check(&c, &body).is_err());
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let body = doc(json!({ "name": "Soup", "category": "starter", "description": "hot" }));
        let out = RecordValidator::check(&collection("menu"), &body).unwrap();
        assert!(!out.contains_key("price"));
    }

    #[test]
    fn enum_value_with_space() {
        let body = doc(json!({ "name": "Steak", "category": "main course", "description": "rare", "price": 21.5 }));
        assert!(RecordValidator::check(&collection("menu"), &body).is_ok());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        let c = collection("person");
        let existing = store.insert(&c, valid_person()).await.unwrap();

        let err = RecordValidator::validate(&store, &c, &valid_person(), None).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));
        assert_eq!(
            err.violations().unwrap(),
            &[Violation::DuplicateValue { field: "email".into() }]
        );

        // the record being updated does not collide with itself
        RecordValidator::validate(&store, &c, &valid_person(), Some(existing.id)).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_alongside_schema_violation_is_invalid() {
        let store = MemoryStore::new();
        let c = collection("person");
        store.insert(&c, valid_person()).await.unwrap();

        let mut body = valid_person();
        body.remove("name");
        let err = RecordValidator::validate(&store, &c, &body, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let fields: Vec<_> = err.violations().unwrap().iter().map(Violation::field).collect();
        assert_eq!(fields, vec!["name", "email"]);
    }

    #[test]
    fn parse_filter_values() {
        let person = collection("person");
        let f = RecordValidator::parse_filter(&person, "work", "chef").unwrap();
        assert_eq!(f, Filter::new("work", json!("chef")));
        assert!(matches!(
            RecordValidator::parse_filter(&person, "work", "unknown"),
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(
            RecordValidator::parse_filter(&person, "age", "41").unwrap().value,
            json!(41)
        );
        assert!(RecordValidator::parse_filter(&person, "age", "old").is_err());
        assert_eq!(
            RecordValidator::parse_filter(&person, "salary", "99.5").unwrap().value,
            json!(99.5)
        );
        assert!(RecordValidator::parse_filter(&person, "height", "2").is_err());
    }
}
