use cadpilot::config::EngineSettings;
use cadpilot::engine::Engine;
use cadpilot::host::{
    ElementRecord, EntityHandle, HostError, HostModel, InMemoryModel, PropertyValue, Vector3,
};
use cadpilot::reports::Audience;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Delegates to an in-memory model and counts transactions.
struct CountingHost {
    inner: InMemoryModel,
    begun: Arc<AtomicUsize>,
}

impl HostModel for CountingHost {
    fn document_name(&self) -> &str {
        self.inner.document_name()
    }

    fn element_handles(&self) -> Vec<EntityHandle> {
        self.inner.element_handles()
    }

    fn active_view_handles(&self) -> Vec<EntityHandle> {
        self.inner.active_view_handles()
    }

    fn element(&self, handle: EntityHandle) -> Option<ElementRecord> {
        self.inner.element(handle)
    }

    fn categories(&self) -> Vec<String> {
        self.inner.categories()
    }

    fn current_selection(&self) -> Vec<EntityHandle> {
        self.inner.current_selection()
    }

    fn set_selection(&mut self, handles: &[EntityHandle]) {
        self.inner.set_selection(handles);
    }

    fn translate(&mut self, handle: EntityHandle, offset: Vector3) -> Result<(), HostError> {
        self.inner.translate(handle, offset)
    }

    fn set_property(
        &mut self,
        handle: EntityHandle,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), HostError> {
        self.inner.set_property(handle, name, value)
    }

    fn delete(&mut self, handle: EntityHandle) -> Result<(), HostError> {
        self.inner.delete(handle)
    }

    fn begin_transaction(&mut self, name: &str) -> Result<(), HostError> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        self.inner.begin_transaction(name)
    }

    fn commit_transaction(&mut self) -> Result<(), HostError> {
        self.inner.commit_transaction()
    }

    fn rollback_transaction(&mut self) {
        self.inner.rollback_transaction();
    }
}

fn start() -> (Engine, Arc<AtomicUsize>) {
    let mut model = InMemoryModel::new("annex");
    for handle in 1..=3 {
        model = model.with_element(
            ElementRecord::new(handle, "OST_Walls", "Wall")
                .with_property("Comments", PropertyValue::Text(String::new())),
        );
    }
    model = model.with_element(ElementRecord::new(4, "OST_Roofs", "FootPrintRoof"));
    let begun = Arc::new(AtomicUsize::new(0));
    let host = CountingHost {
        inner: model,
        begun: Arc::clone(&begun),
    };
    let engine = Engine::start(Box::new(host), EngineSettings::default()).expect("start");
    (engine, begun)
}

fn reports_of(engine: &Engine, audience: Audience) -> Vec<String> {
    engine
        .drain_reports()
        .into_iter()
        .filter(|report| report.audience == audience)
        .map(|report| report.text)
        .collect()
}

#[test]
fn denied_fragments_open_no_transaction() {
    let (engine, begun) = start();
    let outcome = engine
        .run_plan_value(&json!({"actions": [{
            "action": "DynamicCodeAction",
            "code": "let walls = where(ids, \"category\", \"OST_Walls\");\nSystem.Net.WebClient();",
        }]}))
        .expect("run")
        .wait()
        .expect("batch");
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(begun.load(Ordering::SeqCst), 0);
    let errors = reports_of(&engine, Audience::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Security Error: `System.Net` is not allowed (line 2)"), "{}", errors[0]);
}

#[test]
fn compile_errors_open_no_transaction() {
    let (engine, begun) = start();
    engine
        .run_plan_value(&json!({"actions": [{
            "action": "dynamic_code",
            "code": "let n = count(ids;",
        }]}))
        .expect("run")
        .wait()
        .expect("batch");
    assert_eq!(begun.load(Ordering::SeqCst), 0);
    let errors = reports_of(&engine, Audience::Error);
    assert!(errors[0].contains("Compilation Failed:\n[agent_fragment:1:"), "{}", errors[0]);
}

#[test]
fn fragments_chain_with_earlier_queries() {
    let (engine, begun) = start();
    engine
        .run_plan_value(&json!({"actions": [
            {"action": "CreateGlobalQuery"},
            {"action": "ByCategoryQuery", "categoryName": "OST_Walls", "search_ai_name": "$q1"},
            {"action": "DynamicCodeAction", "target_ai_name": "$q1", "assign_ai_name": "$f1",
             "code": "```\\nfor h in $q1 {\\n  set(h, \\\"Comments\\\", \\\"checked\\\");\\n}\\nreport(\\\"tagged\\\", count($q1));\\n```"},
        ]}))
        .expect("run")
        .wait()
        .expect("batch");
    assert_eq!(begun.load(Ordering::SeqCst), 1);
    assert_eq!(engine.session_summary().expect("summary")["$f1"], 3);
    let comment = engine
        .with_host(|state| {
            state
                .model
                .element(EntityHandle::new(2))
                .and_then(|record| record.properties.get("Comments").cloned())
        })
        .expect("inspect");
    assert_eq!(comment, Some(PropertyValue::Text("checked".to_string())));
    let agent = reports_of(&engine, Audience::Agent);
    assert!(agent.contains(&"[dynamic_code] (Target: '$q1', Assign: '$f1'): tagged 3".to_string()));
}

#[test]
fn runaway_operator_chains_fail_to_compile() {
    let (engine, begun) = start();
    let code = format!("report({}1);", "-".repeat(5000));
    let outcome = engine
        .run_plan_value(&json!({"actions": [
            {"action": "dynamic_code", "code": code},
            {"action": "CreateGlobalQuery", "search_ai_name": "$q1"},
        ]}))
        .expect("run")
        .wait()
        .expect("batch");
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(begun.load(Ordering::SeqCst), 0);
    let errors = reports_of(&engine, Audience::Error);
    assert!(errors[0].contains("nests deeper than 256 levels"), "{}", errors[0]);
    assert_eq!(engine.session_summary().expect("worker alive")["$q1"], 4);
}

#[test]
fn runtime_errors_roll_the_whole_fragment_back() {
    let (engine, begun) = start();
    engine
        .run_plan_value(&json!({"actions": [{
            "action": "dynamic_code",
            "target": "1",
            "code": "move(ids, 0, 0, 3000mm);\nlet roof = first(where(ids, \"category\", \"OST_Roofs\"));\nmove(roof, 1m);",
        }]}))
        .expect("run")
        .wait()
        .expect("batch");
    assert_eq!(begun.load(Ordering::SeqCst), 1);
    let z = engine
        .with_host(|state| state.model.element(EntityHandle::new(1)).map(|record| record.location.z))
        .expect("inspect");
    assert_eq!(z, Some(0.0));
    let errors = reports_of(&engine, Audience::Error);
    assert!(errors[0].contains("[Dynamic Error]"), "{}", errors[0]);
    assert!(errors[0].contains("at line 2") || errors[0].contains("at line 3"), "{}", errors[0]);
}

#[test]
fn disabled_sandbox_refuses_fragments() {
    let mut settings = EngineSettings::default();
    settings.sandbox.enabled = false;
    let engine = Engine::start(Box::new(InMemoryModel::new("off")), settings).expect("start");
    engine
        .run_plan_value(&json!({"actions": [{"action": "dynamic_code", "code": "report(1);"}]}))
        .expect("run")
        .wait()
        .expect("batch");
    let errors = reports_of(&engine, Audience::Error);
    assert_eq!(
        errors,
        vec!["Step 1 (dynamic_code) failed: dynamic code is disabled by configuration".to_string()]
    );
}
