use super::{
    require_cursor, PipelineError, Predicate, QueryCursor, SearchFilter, CATEGORY_PRIORITY,
    CLASS_PRIORITY,
};
use crate::host::HostModel;
use crate::registry::normalize_name;

#[derive(Debug, Clone)]
pub struct ClassFilter {
    class_name: String,
}

impl ClassFilter {
    pub fn new(class_name: &str) -> Self {
        Self {
            class_name: class_name.trim().to_string(),
        }
    }
}

impl SearchFilter for ClassFilter {
    fn name(&self) -> &'static str {
        "class"
    }

    fn priority(&self) -> i32 {
        CLASS_PRIORITY
    }

    fn apply(
        &self,
        _model: &dyn HostModel,
        cursor: Option<QueryCursor>,
    ) -> Result<QueryCursor, PipelineError> {
        Ok(require_cursor(self, cursor)?.narrow(Predicate::Class(self.class_name.clone())))
    }
}

fn category_stem(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let base = lower.strip_prefix("ost_").unwrap_or(&lower);
    normalize_name(base)
}

/// Matches loosely written category names against the host's list:
/// exact name first, then with the `OST_` prefix added or stripped, then
/// singular/plural variants (`Wall` for `OST_Walls`).
pub fn resolve_category(raw: &str, categories: &[String]) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(exact) = categories
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(raw))
    {
        return Some(exact.clone());
    }

    let wanted = category_stem(raw);
    if let Some(prefixed) = categories
        .iter()
        .find(|candidate| category_stem(candidate) == wanted)
    {
        return Some(prefixed.clone());
    }

    categories
        .iter()
        .find(|candidate| {
            let stem = category_stem(candidate);
            stem == format!("{wanted}s") || wanted == format!("{stem}s")
        })
        .cloned()
}

#[derive(Debug, Clone)]
pub struct CategoryFilter {
    category: String,
}

impl CategoryFilter {
    pub fn new(category: &str) -> Self {
        Self {
            category: category.trim().to_string(),
        }
    }
}

impl SearchFilter for CategoryFilter {
    fn name(&self) -> &'static str {
        "category"
    }

    fn priority(&self) -> i32 {
        CATEGORY_PRIORITY
    }

    fn apply(
        &self,
        model: &dyn HostModel,
        cursor: Option<QueryCursor>,
    ) -> Result<QueryCursor, PipelineError> {
        let cursor = require_cursor(self, cursor)?;
        let resolved = resolve_category(&self.category, &model.categories())
            .ok_or_else(|| PipelineError::UnknownCategory(self.category.clone()))?;
        Ok(cursor.narrow(Predicate::Category(resolved)))
    }
}
