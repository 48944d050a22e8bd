//! Management of stored fragments and indicator rules.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::{DynaqueryError, Result};
use crate::fragment::{FragmentDraft, FragmentKind, FragmentStore, QueryFragment};
use crate::preview::{PreviewRequest, PreviewResult, Previewer};
use crate::rule::{IndicatorRule, RuleDraft, RuleStore};

pub struct ConfigService {
    fragments: Arc<dyn FragmentStore>,
    rules: Arc<dyn RuleStore>,
    previewer: Previewer,
}

impl ConfigService {
    pub fn new(fragments: Arc<dyn FragmentStore>, rules: Arc<dyn RuleStore>, previewer: Previewer) -> Self {
        Self {
            fragments,
            rules,
            previewer,
        }
    }

    // ------------- Fragments -------------

    pub fn list_fragments(&self, kind: FragmentKind) -> Result<Vec<QueryFragment>> {
        self.fragments.list(kind)
    }

    pub fn get_fragment(&self, kind: FragmentKind, id: Uuid) -> Result<QueryFragment> {
        self.fragments
            .find_by_id(kind, id)?
            .ok_or_else(|| not_found(fragment_label(kind), id))
    }

    pub fn create_fragment(&self, kind: FragmentKind, draft: &FragmentDraft) -> Result<QueryFragment> {
        let fragment = self.fragments.save(kind, None, draft)?;
        info!(%kind, name = %fragment.name_unique, id = %fragment.id, "created fragment");
        Ok(fragment)
    }

    pub fn update_fragment(&self, kind: FragmentKind, id: Uuid, draft: &FragmentDraft) -> Result<QueryFragment> {
        let fragment = self.fragments.save(kind, Some(id), draft)?;
        info!(%kind, name = %fragment.name_unique, %id, "updated fragment");
        Ok(fragment)
    }

    pub fn delete_fragment(&self, kind: FragmentKind, id: Uuid) -> Result<()> {
        if !self.fragments.delete(kind, id)? {
            return Err(not_found(fragment_label(kind), id));
        }
        info!(%kind, %id, "deleted fragment");
        Ok(())
    }

    // ------------- Rules -------------

    /// Every rule, ascending by display order.
    pub fn list_rules(&self) -> Result<Vec<IndicatorRule>> {
        self.rules.list()
    }

    pub fn list_rules_by_context(&self, context: &str) -> Result<Vec<IndicatorRule>> {
        self.rules.find_by_context(context)
    }

    pub fn list_active_rules(&self) -> Result<Vec<IndicatorRule>> {
        self.rules.find_active()
    }

    pub fn list_active_rules_by_context(&self, context: &str) -> Result<Vec<IndicatorRule>> {
        self.rules.find_active_by_context(context)
    }

    pub fn get_rule(&self, id: Uuid) -> Result<IndicatorRule> {
        self.rules
            .find_by_id(id)?
            .ok_or_else(|| not_found("indicator rule", id))
    }

    pub fn create_rule(&self, draft: &RuleDraft) -> Result<IndicatorRule> {
        let rule = self.rules.save(None, draft)?;
        info!(key = %rule.rule_key, context = %rule.context, "created indicator rule");
        Ok(rule)
    }

    pub fn update_rule(&self, id: Uuid, draft: &RuleDraft) -> Result<IndicatorRule> {
        let rule = self.rules.save(Some(id), draft)?;
        info!(key = %rule.rule_key, %id, "updated indicator rule");
        Ok(rule)
    }

    pub fn delete_rule(&self, id: Uuid) -> Result<()> {
        if !self.rules.delete(id)? {
            return Err(not_found("indicator rule", id));
        }
        info!(%id, "deleted indicator rule");
        Ok(())
    }

    pub fn preview(&self, request: &PreviewRequest) -> PreviewResult {
        self.previewer.preview(request)
    }
}

fn fragment_label(kind: FragmentKind) -> &'static str {
    match kind {
        FragmentKind::Base => "base query",
        FragmentKind::Filter => "filter",
        FragmentKind::Order => "order",
    }
}

fn not_found(what: &'static str, id: Uuid) -> DynaqueryError {
    DynaqueryError::NotFound {
        what,
        id: id.to_string(),
    }
}
