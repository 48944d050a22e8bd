//! Named, context-scoped pieces of query text.
//!
//! A fragment is one of three kinds: a [`FragmentKind::Base`] holding a full
//! statement, a [`FragmentKind::Filter`] holding a clause appended after it, or a
//! [`FragmentKind::Order`] holding a trailing ordering clause. The engine never
//! parses fragment text; it only ever concatenates it, which is why the text is
//! wrapped in [`RawQueryText`] rather than passed around as a plain `String`.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DynaqueryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Base,
    Filter,
    Order,
}

impl FragmentKind {
    pub const ALL: [FragmentKind; 3] = [FragmentKind::Base, FragmentKind::Filter, FragmentKind::Order];

    /// Table holding fragments of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            FragmentKind::Base => "QueryBase",
            FragmentKind::Filter => "QueryFilter",
            FragmentKind::Order => "QueryOrder",
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FragmentKind::Base => "Base",
            FragmentKind::Filter => "Filter",
            FragmentKind::Order => "Order",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for FragmentKind {
    type Err = DynaqueryError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "base" | "bases" => Ok(FragmentKind::Base),
            "filter" | "filters" => Ok(FragmentKind::Filter),
            "order" | "orders" => Ok(FragmentKind::Order),
            _ => Err(DynaqueryError::NotFound {
                what: "Fragment kind",
                id: s.to_owned(),
            }),
        }
    }
}

/// Opaque query text as authored by whoever may edit fragments.
///
/// Never validated, quoted or escaped by the engine. Keeping it in its own type
/// means it cannot be mixed up with bound parameter values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawQueryText(String);

impl RawQueryText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RawQueryText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RawQueryText {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RawQueryText {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFragment {
    pub id: Uuid,
    pub kind: FragmentKind,
    pub name_unique: String,
    pub context: String,
    pub text: RawQueryText,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Client-writable part of a fragment. Identifiers and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentDraft {
    pub name_unique: String,
    pub context: String,
    pub text: RawQueryText,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl FragmentDraft {
    pub fn new(name_unique: &str, context: &str, text: &str) -> Self {
        Self {
            name_unique: name_unique.to_owned(),
            context: context.to_owned(),
            text: RawQueryText::new(text),
            description: None,
            active: None,
        }
    }
    pub fn described(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }
    pub fn inactive(mut self) -> Self {
        self.active = Some(false);
        self
    }
}

/// Name and description of a fragment, the only parts exposed on the read path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentSummary {
    pub name_unique: String,
    pub description: Option<String>,
}

impl From<&QueryFragment> for FragmentSummary {
    fn from(f: &QueryFragment) -> Self {
        Self {
            name_unique: f.name_unique.clone(),
            description: f.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableFragments {
    pub context: String,
    pub filters: Vec<FragmentSummary>,
    pub orders: Vec<FragmentSummary>,
}

/// Lookup and storage of fragments.
///
/// Name lookups only ever see active fragments; `find_by_id` and `list` see all of them.
pub trait FragmentStore: Send + Sync {
    fn find_active_by_name(&self, kind: FragmentKind, name: &str) -> Result<Option<QueryFragment>>;
    fn find_active_by_context(&self, kind: FragmentKind, context: &str) -> Result<Vec<QueryFragment>>;
    fn find_by_id(&self, kind: FragmentKind, id: Uuid) -> Result<Option<QueryFragment>>;
    fn list(&self, kind: FragmentKind) -> Result<Vec<QueryFragment>>;
    /// Inserts when `id` is `None`, otherwise updates the fragment with that id.
    fn save(&self, kind: FragmentKind, id: Option<Uuid>, draft: &FragmentDraft) -> Result<QueryFragment>;
    fn delete(&self, kind: FragmentKind, id: Uuid) -> Result<bool>;

    /// Resolves a name or fails with `FragmentNotFound`.
    fn require_active(&self, kind: FragmentKind, name: &str) -> Result<QueryFragment> {
        self.find_active_by_name(kind, name)?
            .ok_or_else(|| DynaqueryError::FragmentNotFound {
                kind,
                name: name.to_owned(),
            })
    }
}
