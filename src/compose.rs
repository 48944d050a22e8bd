//! Assembly of query text out of stored fragments.
//!
//! Composition is plain concatenation: the base text, then every filter text in
//! the order the caller named them, then the order text, joined by single spaces.
//! Nothing is reordered, deduplicated, quoted or validated here; whether the
//! result is a valid statement is settled when it is executed.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::error::{DynaqueryError, Result};
use crate::fragment::{FragmentKind, FragmentStore, QueryFragment, RawQueryText};

lazy_static! {
    // first selection clause, up to the first FROM following it
    static ref SELECTION: Regex = Regex::new(r"(?is)\bSELECT\s+(.+?)\s+FROM\b").unwrap();
}

/// Joins base, filter and order texts with single spaces, in that order.
pub fn join<'a, F, O>(base: &RawQueryText, filters: F, orders: O) -> RawQueryText
where
    F: IntoIterator<Item = &'a RawQueryText>,
    O: IntoIterator<Item = &'a RawQueryText>,
{
    let mut text = String::from(base.as_str());
    for part in filters.into_iter().chain(orders) {
        text.push(' ');
        text.push_str(part.as_str());
    }
    RawQueryText::new(text)
}

/// Rewrites the first `SELECT <projection> FROM` into `SELECT COUNT(<target>) FROM`.
///
/// A projection that is a single bare identifier (an alias such as `c`) is
/// counted as itself, anything else (`*`, `c.*`, column lists, expressions) as
/// `COUNT(*)`. Text without a selection clause passes through unchanged.
/// SQLite has no alias projection, so the `COUNT(c)` form fails when it is run.
pub fn to_count_form(text: &RawQueryText) -> RawQueryText {
    let source = text.as_str();
    let Some(captures) = SELECTION.captures(source) else {
        debug!(query = %source, "no selection clause, count text left unchanged");
        return text.clone();
    };
    let whole = captures.get(0).map(|m| m.range()).unwrap_or(0..0);
    let projection = captures.get(1).map(|m| m.as_str()).unwrap_or("");
    RawQueryText::new(format!(
        "{}SELECT COUNT({}) FROM{}",
        &source[..whole.start],
        count_target(projection),
        &source[whole.end..]
    ))
}

fn count_target(projection: &str) -> &str {
    let projection = projection.trim();
    if is_identifier(projection) {
        projection
    } else {
        "*"
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Fragments resolved for one request. Lives only as long as the request does.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub base: QueryFragment,
    pub filters: Vec<QueryFragment>,
    pub order: Option<QueryFragment>,
}

impl Composition {
    /// Base, filters in request order, then the order fragment.
    pub fn text(&self) -> RawQueryText {
        join(
            &self.base.text,
            self.filters.iter().map(|f| &f.text),
            self.order.iter().map(|o| &o.text),
        )
    }
    /// Count form of the base followed by the same filters. Order fragments are never part of it.
    pub fn count_text(&self) -> RawQueryText {
        join(
            &to_count_form(&self.base.text),
            self.filters.iter().map(|f| &f.text),
            std::iter::empty(),
        )
    }
}

/// Resolves fragment names against a store, optionally restricted to one context.
pub struct Composer<'s> {
    store: &'s dyn FragmentStore,
    context: Option<&'s str>,
}

impl<'s> Composer<'s> {
    pub fn new(store: &'s dyn FragmentStore) -> Self {
        Self { store, context: None }
    }
    /// Fragments of any other context are treated as not found.
    pub fn scoped(store: &'s dyn FragmentStore, context: &'s str) -> Self {
        Self {
            store,
            context: Some(context),
        }
    }

    fn resolve_one(&self, kind: FragmentKind, name: &str) -> Result<QueryFragment> {
        let fragment = self.store.require_active(kind, name)?;
        match self.context {
            Some(context) if fragment.context != context => Err(DynaqueryError::FragmentNotFound {
                kind,
                name: name.to_owned(),
            }),
            _ => Ok(fragment),
        }
    }

    /// Looks up every named fragment. A blank order name means no ordering.
    pub fn resolve<S: AsRef<str>>(
        &self,
        base_name: &str,
        filter_names: &[S],
        order_name: Option<&str>,
    ) -> Result<Composition> {
        let base = self.resolve_one(FragmentKind::Base, base_name)?;
        let filters = filter_names
            .iter()
            .map(|name| self.resolve_one(FragmentKind::Filter, name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let order = match order_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Some(self.resolve_one(FragmentKind::Order, name)?),
            None => None,
        };
        Ok(Composition { base, filters, order })
    }

    pub fn compose<S: AsRef<str>>(
        &self,
        base_name: &str,
        filter_names: &[S],
        order_name: Option<&str>,
    ) -> Result<RawQueryText> {
        Ok(self.resolve(base_name, filter_names, order_name)?.text())
    }
}
