//! Схема сущностей: то, что кодек записей получает извне.
//!
//! Протокол знает о схеме только через [`Schema`]: по имени типа получить
//! описание сущности, по номеру: поле или связь.

pub mod entity;
pub mod model;
pub mod state;

use std::{collections::HashMap, sync::Arc};

pub use entity::{
    EntityType, EntityTypeBuilder, FieldDescriptor, FieldSpec, RelationDescriptor, ValueGenerated,
};
pub use model::{EntityDocument, FieldDocument, GeneratedDocument, Model, SchemaDocument};
pub use state::RecordState;

/// Поиск типа сущности по имени.
///
/// Схема считается неизменной на время сессии чтения.
pub trait Schema {
    fn entity_type(
        &self,
        name: &str,
    ) -> Option<Arc<EntityType>>;
}

impl Schema for HashMap<String, Arc<EntityType>> {
    fn entity_type(
        &self,
        name: &str,
    ) -> Option<Arc<EntityType>> {
        self.get(name).cloned()
    }
}

impl<S: Schema + ?Sized> Schema for Arc<S> {
    fn entity_type(
        &self,
        name: &str,
    ) -> Option<Arc<EntityType>> {
        (**self).entity_type(name)
    }
}
