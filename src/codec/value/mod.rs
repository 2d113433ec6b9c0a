//! Кодек значений: примитивы, строки, массивы, `Nullable`, перечисления и
//! составные типы, описанные в [`TypeRegistry`].

pub mod decode;
pub mod encode;
pub mod format;
pub mod registry;
pub mod surrogate;
pub mod types;

use std::{fmt, sync::Arc};

pub use decode::read_value;
pub use encode::write_value;
pub use format::{deserialize_from, deserialize_value, serialize_into, serialize_value};
pub use registry::{
    CompositeDescriptor, CompositeKind, MemberDescriptor, MemberKind, TypeRegistry,
};
pub use surrogate::{Surrogate, SurrogateTable};
pub use types::{CompositeValue, Value, ValueType};

use crate::config::CodecLimits;

/// Всё, что нужно кодеку значений помимо самого значения: реестр составных
/// типов, необязательный суррогат и ограничения на чтение.
#[derive(Clone, Default)]
pub struct ValueContext {
    registry: Arc<TypeRegistry>,
    surrogate: Option<Arc<dyn Surrogate>>,
    limits: CodecLimits,
}

impl ValueContext {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            surrogate: None,
            limits: CodecLimits::default(),
        }
    }

    pub fn with_surrogate(
        mut self,
        surrogate: Arc<dyn Surrogate>,
    ) -> Self {
        self.surrogate = Some(surrogate);
        self
    }

    pub fn with_limits(
        mut self,
        limits: CodecLimits,
    ) -> Self {
        self.limits = limits;
        self
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn surrogate(&self) -> Option<&dyn Surrogate> {
        self.surrogate.as_deref()
    }

    pub fn limits(&self) -> &CodecLimits {
        &self.limits
    }
}

impl fmt::Debug for ValueContext {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ValueContext")
            .field("registry", &self.registry)
            .field("surrogate", &self.surrogate.is_some())
            .field("limits", &self.limits)
            .finish()
    }
}
