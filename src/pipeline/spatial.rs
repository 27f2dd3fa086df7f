use super::{require_cursor, PipelineError, Predicate, QueryCursor, SearchFilter, LEVEL_PRIORITY};
use crate::host::{ElementRecord, EntityHandle, HostModel, PropertyValue};

pub const LEVEL_CATEGORY: &str = "OST_Levels";
pub const ELEVATION_PROPERTY: &str = "Elevation";

fn is_level(record: &ElementRecord) -> bool {
    record.class_name.eq_ignore_ascii_case("Level")
        || record.category.eq_ignore_ascii_case(LEVEL_CATEGORY)
}

/// Elevation in feet, zero when the level carries none.
pub fn level_elevation(record: &ElementRecord) -> f64 {
    match record.properties.get(ELEVATION_PROPERTY) {
        Some(PropertyValue::Length(feet)) => *feet,
        Some(PropertyValue::Integer(value)) => *value as f64,
        _ => 0.0,
    }
}

/// Every level of the document, lowest first.
pub fn levels(model: &dyn HostModel) -> Vec<ElementRecord> {
    let mut levels = model
        .element_handles()
        .into_iter()
        .filter_map(|handle| model.element(handle))
        .filter(is_level)
        .collect::<Vec<_>>();
    levels.sort_by(|a, b| level_elevation(a).total_cmp(&level_elevation(b)));
    levels
}

/// Accepts a level handle or a level name (case-insensitive).
pub fn resolve_level(model: &dyn HostModel, raw: &str) -> Option<EntityHandle> {
    let raw = raw.trim();
    if let Some(handle) = EntityHandle::parse(raw) {
        return model
            .element(handle)
            .filter(is_level)
            .map(|record| record.handle);
    }
    levels(model)
        .into_iter()
        .find(|record| record.name.eq_ignore_ascii_case(raw))
        .map(|record| record.handle)
}

#[derive(Debug, Clone)]
pub struct LevelFilter {
    level: String,
}

impl LevelFilter {
    pub fn new(level: &str) -> Self {
        Self {
            level: level.trim().to_string(),
        }
    }
}

impl SearchFilter for LevelFilter {
    fn name(&self) -> &'static str {
        "level"
    }

    fn priority(&self) -> i32 {
        LEVEL_PRIORITY
    }

    fn apply(
        &self,
        model: &dyn HostModel,
        cursor: Option<QueryCursor>,
    ) -> Result<QueryCursor, PipelineError> {
        let cursor = require_cursor(self, cursor)?;
        let level = resolve_level(model, &self.level)
            .ok_or_else(|| PipelineError::UnknownLevel(self.level.clone()))?;
        Ok(cursor.narrow(Predicate::Level(level)))
    }
}
