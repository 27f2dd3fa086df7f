use super::{ExecutionContext, Operation, OperationError, ASSIGN_PARAM, TARGET_PARAM};
use crate::mapping::BoundParams;
use crate::registry::{OperationKind, ParamDescriptor, ParamKind};
use crate::sandbox::{self, Bindings, Limits};
use crate::session::KeyKind;

pub(crate) const DYNAMIC_CODE_PARAMS: &[ParamDescriptor] = &[
    ParamDescriptor {
        key: "code",
        aliases: &["source", "script", "csharp_code", "fragment"],
        kind: ParamKind::Text,
        required: true,
        description: "Script fragment. `ids` holds the target's elements; builtins: count, len, first, list, except, where, category, class, name, param, move, set, delete, select, store, report.",
    },
    TARGET_PARAM,
    ASSIGN_PARAM,
];

#[derive(Debug)]
pub struct DynamicCode {
    code: Option<String>,
    target: Option<String>,
    assign: Option<String>,
}

impl DynamicCode {
    pub fn create(params: &BoundParams) -> Box<dyn Operation> {
        Box::new(Self {
            code: params.text("code").map(str::to_string),
            target: params.owned_text("target"),
            assign: params.owned_text("assign"),
        })
    }
}

impl Operation for DynamicCode {
    fn name(&self) -> &'static str {
        "dynamic_code"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Action
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperationError> {
        let code = self
            .code
            .as_deref()
            .ok_or(OperationError::MissingParam("code"))?;
        let script = sandbox::prepare(code, self.target.as_deref(), &ctx.settings.sandbox)?;
        let ids = ctx.resolve_target(self.target.as_deref())?;
        let bindings = Bindings {
            ids: ids.handles().to_vec(),
            target: self.target.clone().unwrap_or_default(),
            assign: self.assign.clone().unwrap_or_default(),
            document: ctx.model.document_name().to_string(),
        };

        let outcome = sandbox::run_in_transaction(
            &script,
            bindings,
            &mut *ctx.model,
            ctx.settings.units.default_unit,
            Limits::from_settings(&ctx.settings.sandbox),
        )?;

        for (key, set) in outcome.stores {
            ctx.session.store(key, set);
        }
        let touched = outcome.touched.len();
        let assigned = match self.assign.as_deref() {
            Some(assign) => {
                let key = ctx.session.key_or_generate(Some(assign), KeyKind::Created)?;
                let label = key.to_string();
                ctx.session.store(key, outcome.touched);
                Some(label)
            }
            None => None,
        };
        for line in &outcome.output {
            ctx.agent(self.name(), self.target.as_deref(), assigned.as_deref(), line);
        }
        ctx.agent(
            self.name(),
            self.target.as_deref(),
            assigned.as_deref(),
            &format!(
                "Script finished in {} steps; {touched} elements changed.",
                outcome.steps
            ),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{EntityHandle, HostModel};
    use crate::mapping::FieldValue;
    use crate::operations::fixtures::Harness;
    use crate::reports::Audience;
    use crate::sandbox::SandboxError;
    use crate::session::ResultSet;
    use crate::shared::ids::SessionKey;

    fn text(value: &str) -> FieldValue {
        FieldValue::Text(value.to_string())
    }

    fn run(harness: &mut Harness, params: BoundParams) -> Result<(), OperationError> {
        let mut operation = DynamicCode::create(&params);
        let mut ctx = harness.ctx();
        operation.execute(&mut ctx)
    }

    fn seed(harness: &mut Harness, key: &str, handles: &[i64]) {
        harness.session.store(
            SessionKey::parse(key).expect("key"),
            handles.iter().copied().map(EntityHandle::new).collect::<ResultSet>(),
        );
    }

    #[test]
    fn fragments_run_against_the_target_in_one_transaction() {
        let mut harness = Harness::new();
        seed(&mut harness, "$q1", &[1, 2]);
        run(
            &mut harness,
            BoundParams::default()
                .with("code", text("move($q1, 0, 0, 3000mm);\nreport(\"raised\", count($q1));"))
                .with("target", text("$q1"))
                .with("assign", text("$f1")),
        )
        .expect("run");

        assert_eq!(harness.model.committed_transactions(), ["AI Dynamic Action"]);
        assert_eq!(harness.count("$f1"), Some(2));
        let agent = harness.texts(Audience::Agent);
        assert_eq!(agent[0], "[dynamic_code] (Target: '$q1', Assign: '$f1'): raised 2");
    }

    #[test]
    fn denied_fragments_never_open_a_transaction() {
        let mut harness = Harness::new();
        let err = run(
            &mut harness,
            BoundParams::default().with("code", text("System.IO.File.Delete(\"x\");")),
        )
        .expect_err("denied");
        assert!(matches!(err, OperationError::Sandbox(SandboxError::Denied { .. })));
        assert_eq!(harness.model.transactions_started(), 0);
    }

    #[test]
    fn runtime_failures_roll_back_earlier_moves() {
        let mut harness = Harness::new();
        let err = run(
            &mut harness,
            BoundParams::default()
                .with("code", text("move(ids, 100mm);\nreport(name(999));"))
                .with("target", text("1")),
        )
        .expect_err("runtime");
        assert!(err.to_string().starts_with("[Dynamic Error] UnknownElement at line 2"));
        let wall = harness.model.element(EntityHandle::new(1)).expect("wall");
        assert_eq!(wall.location, crate::host::Vector3::default());
        assert!(harness.model.committed_transactions().is_empty());
    }

    #[test]
    fn stored_results_land_in_the_session() {
        let mut harness = Harness::new();
        run(
            &mut harness,
            BoundParams::default().with(
                "code",
                text("store(\"$q_doors\", where(list(7, 8, 1), \"category\", \"OST_Doors\"));"),
            ),
        )
        .expect("run");
        assert_eq!(harness.count("$q_doors"), Some(2));
    }
}
