use super::{PersistError, Transform};
use serde_json::{Map, Value};

/// Keeps only the named dotted paths of a JSON object. Applied on write so
/// nothing else is stored, and on read so a tampered or legacy blob cannot
/// smuggle extra fields back into state.
#[derive(Clone, Debug)]
pub struct Whitelist {
    paths: Vec<Vec<String>>,
}

impl Whitelist {
    #[must_use]
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|path| path.as_ref().split('.').map(str::to_string).collect())
                .filter(|segments: &Vec<String>| segments.iter().all(|s| !s.is_empty()))
                .collect(),
        }
    }

    /// Copies the whitelisted paths of `value` into a fresh object.
    #[must_use]
    pub fn filter(&self, value: &Value) -> Value {
        let mut out = Map::new();
        for path in &self.paths {
            if let Some(found) = lookup(value, path) {
                insert(&mut out, path, found.clone());
            }
        }
        Value::Object(out)
    }
}

impl Transform for Whitelist {
    fn forward(&self, value: Value) -> Result<Value, PersistError> {
        Ok(self.filter(&value))
    }

    fn reverse(&self, value: Value) -> Result<Value, PersistError> {
        Ok(self.filter(&value))
    }
}

fn lookup<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

fn insert(out: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = out;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.clone(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn auth() -> Whitelist {
        Whitelist::new(super::super::AUTH_WHITELIST)
    }

    #[test]
    fn keeps_only_named_paths() {
        let state = json!({
            "is_authenticated": true,
            "loading": true,
            "error": "boom",
            "password": "hunter2",
            "user": {
                "id": "u1",
                "name": "Ada",
                "email": "ada@example.com",
                "role": "admin",
                "is_verified": true,
                "last_login": "2026-10-01T10:00:00Z",
                "password_hash": "$argon2id$...",
                "token": "abc"
            }
        });

        let filtered = auth().filter(&state);
        assert_eq!(
            filtered,
            json!({
                "is_authenticated": true,
                "user": {
                    "id": "u1",
                    "name": "Ada",
                    "email": "ada@example.com",
                    "role": "admin",
                    "is_verified": true,
                    "last_login": "2026-10-01T10:00:00Z"
                }
            })
        );
    }

    #[test]
    fn missing_or_null_parents_are_skipped() {
        let filtered = auth().filter(&json!({"is_authenticated": false, "user": null}));
        assert_eq!(filtered, json!({"is_authenticated": false}));

        let filtered = auth().filter(&json!("not an object"));
        assert_eq!(filtered, json!({}));
    }

    #[test]
    fn empty_segments_are_ignored() {
        let whitelist = Whitelist::new(["a..b", "", "c"]);
        assert_eq!(
            whitelist.filter(&json!({"a": {"b": 1}, "c": 2})),
            json!({"c": 2})
        );
    }
}
