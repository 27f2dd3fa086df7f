use crate::mapping::{MappingIssue, ParameterMapper};
use crate::operations::Operation;
use crate::registry::{OperationDescriptor, TypeRegistry};
use serde_json::Value;

pub struct BuiltOperation {
    pub descriptor: &'static OperationDescriptor,
    pub operation: Box<dyn Operation>,
    pub issues: Vec<MappingIssue>,
}

impl std::fmt::Debug for BuiltOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltOperation")
            .field("descriptor", &self.descriptor.name)
            .field("issues", &self.issues)
            .finish()
    }
}

/// Registry lookup plus parameter binding. Building never touches the
/// host; execution is left to the bridge.
#[derive(Debug, Clone, Copy)]
pub struct OperationBuilder {
    registry: &'static TypeRegistry,
    mapper: ParameterMapper,
}

impl OperationBuilder {
    pub fn new(registry: &'static TypeRegistry, mapper: ParameterMapper) -> Self {
        Self { registry, mapper }
    }

    pub fn registry(&self) -> &'static TypeRegistry {
        self.registry
    }

    /// `None` when no operation answers to `name`.
    pub fn create(&self, name: &str, payload: &Value) -> Option<BuiltOperation> {
        let descriptor = self.registry.resolve(name)?;
        let params = self.mapper.map_operation(descriptor, payload);
        let issues = params.issues().to_vec();
        Some(BuiltOperation {
            descriptor,
            operation: descriptor.instantiate(&params),
            issues,
        })
    }
}
