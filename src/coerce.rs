use std::collections::HashMap;

use serde_json::Value as JsonValue;
use tracing::error;
use uuid::Uuid;

use crate::datatype::Datum;
use crate::error::{DynaqueryError, Result};

/// A conversion applied to every parameter carrying a given name.
pub type CoercionRule = fn(name: &str, value: Datum) -> Result<Datum>;

/// Converts loosely typed request parameters into the values bound to a query.
///
/// Values pass through unchanged unless a rule is registered for the parameter
/// name. The default registry knows exactly one rule: `id` holding text is parsed
/// as a UUID.
#[derive(Clone)]
pub struct Coercer {
    rules: HashMap<String, CoercionRule>,
}

impl Default for Coercer {
    fn default() -> Self {
        let mut coercer = Self::empty();
        coercer.register("id", uuid_rule);
        coercer
    }
}

impl Coercer {
    pub fn empty() -> Self {
        Self { rules: HashMap::new() }
    }

    pub fn register(&mut self, name: &str, rule: CoercionRule) -> &mut Self {
        self.rules.insert(name.to_owned(), rule);
        self
    }

    pub fn coerce(&self, name: &str, raw: &JsonValue) -> Result<Datum> {
        let value = Datum::from_json(raw);
        match self.rules.get(name) {
            Some(rule) => rule(name, value),
            None => Ok(value),
        }
    }

    /// Coerces a whole parameter map, keeping its order.
    pub fn coerce_all<'a, I>(&self, params: I) -> Result<Vec<(String, Datum)>>
    where
        I: IntoIterator<Item = (&'a String, &'a JsonValue)>,
    {
        params
            .into_iter()
            .map(|(name, raw)| Ok((name.clone(), self.coerce(name, raw)?)))
            .collect()
    }
}

impl std::fmt::Debug for Coercer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.rules.keys().collect();
        names.sort();
        f.debug_struct("Coercer").field("rules", &names).finish()
    }
}

/// Text is parsed as a UUID; anything else is left alone.
pub fn uuid_rule(name: &str, value: Datum) -> Result<Datum> {
    match value {
        Datum::Text(text) => match Uuid::parse_str(&text) {
            Ok(id) => Ok(Datum::Uuid(id)),
            Err(e) => {
                error!(parameter = name, value = %text, error = %e, "failed to convert parameter to UUID");
                Err(DynaqueryError::InvalidParameterFormat {
                    name: name.to_owned(),
                    value: text,
                })
            }
        },
        other => Ok(other),
    }
}
