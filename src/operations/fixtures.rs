use super::ExecutionContext;
use crate::config::EngineSettings;
use crate::host::{ElementRecord, InMemoryModel, PropertyValue};
use crate::reports::{Audience, ReportBus};
use crate::session::SessionStore;

/// Four walls on level 100, two floors and four doors on level 200.
pub(crate) fn sample_model() -> InMemoryModel {
    let mut model = InMemoryModel::new("sample")
        .with_element(
            ElementRecord::new(100, "OST_Levels", "Level")
                .named("Level 1")
                .with_property("Elevation", PropertyValue::Length(0.0)),
        )
        .with_element(
            ElementRecord::new(200, "OST_Levels", "Level")
                .named("Level 2")
                .with_property("Elevation", PropertyValue::Length(10.0)),
        );
    for handle in 1..=4 {
        model = model.with_element(
            ElementRecord::new(handle, "OST_Walls", "Wall")
                .named(&format!("Wall {handle}"))
                .on_level(100)
                .with_property("Mark", PropertyValue::Text(format!("W{handle}"))),
        );
    }
    for handle in 5..=6 {
        model = model.with_element(ElementRecord::new(handle, "OST_Floors", "Floor").on_level(200));
    }
    for handle in 7..=10 {
        model = model.with_element(
            ElementRecord::new(handle, "OST_Doors", "FamilyInstance").on_level(200),
        );
    }
    model.with_active_view(&[1, 2, 7]).with_selection(&[3])
}

pub(crate) struct Harness {
    pub model: InMemoryModel,
    pub session: SessionStore,
    pub reports: ReportBus,
    pub settings: EngineSettings,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_model(sample_model())
    }

    pub fn with_model(model: InMemoryModel) -> Self {
        let settings = EngineSettings::default();
        Self {
            model,
            session: SessionStore::new(&settings.session),
            reports: ReportBus::default(),
            settings,
        }
    }

    pub fn ctx(&mut self) -> ExecutionContext<'_> {
        ExecutionContext::new(
            &mut self.model,
            &mut self.session,
            &self.reports,
            &self.settings,
        )
    }

    pub fn texts(&self, audience: Audience) -> Vec<String> {
        self.reports
            .snapshot()
            .into_iter()
            .filter(|report| report.audience == audience)
            .map(|report| report.text)
            .collect()
    }

    pub fn count(&self, key: &str) -> Option<usize> {
        self.session.lookup(key).map(|set| set.len())
    }
}
