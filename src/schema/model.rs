use std::{collections::HashMap, fs, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};
use trackwire_error::{bail, ResultExt, StatusCode, TrackwireResult, WireError};

use super::{
    entity::{EntityType, FieldSpec, ValueGenerated},
    Schema,
};
use crate::codec::{CompositeDescriptor, TypeRegistry, ValueContext, ValueType};

/// Готовая реализация [`Schema`]: набор типов сущностей и реестр составных
/// типов, на которые ссылаются их поля.
#[derive(Debug, Clone, Default)]
pub struct Model {
    registry: Arc<TypeRegistry>,
    entities: HashMap<String, Arc<EntityType>>,
}

/// JSON-описание модели.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub composites: Vec<CompositeDescriptor>,
    #[serde(default)]
    pub entities: Vec<EntityDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDocument {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDocument>,
    #[serde(default)]
    pub relations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDocument {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub key: bool,
    #[serde(default)]
    pub concurrency_token: bool,
    #[serde(default)]
    pub generated: GeneratedDocument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratedDocument {
    #[default]
    Never,
    OnAdd,
    OnUpdate,
    OnAddOrUpdate,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl From<GeneratedDocument> for ValueGenerated {
    fn from(doc: GeneratedDocument) -> Self {
        match doc {
            GeneratedDocument::Never => ValueGenerated::empty(),
            GeneratedDocument::OnAdd => ValueGenerated::ON_ADD,
            GeneratedDocument::OnUpdate => ValueGenerated::ON_UPDATE,
            GeneratedDocument::OnAddOrUpdate => ValueGenerated::ON_ADD_OR_UPDATE,
        }
    }
}

impl EntityDocument {
    fn into_entity_type(self) -> EntityType {
        let builder = self
            .fields
            .into_iter()
            .fold(EntityType::builder(self.name), |builder, field| {
                let mut spec = FieldSpec::new(field.name, field.value_type)
                    .generated(field.generated.into());
                if field.key {
                    spec = spec.key();
                }
                if field.concurrency_token {
                    spec = spec.concurrency_token();
                }
                builder.with_field(spec)
            });
        self.relations
            .into_iter()
            .fold(builder, |builder, relation| builder.relation(relation))
            .build()
    }
}

impl Model {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            entities: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Контекст кодека значений с реестром этой модели.
    pub fn value_context(&self) -> ValueContext {
        ValueContext::new(self.registry.clone())
    }

    /// Добавляет тип сущности. Составные типы полей должны быть уже
    /// зарегистрированы.
    pub fn add_entity(
        &mut self,
        entity: EntityType,
    ) -> TrackwireResult<Arc<EntityType>> {
        if self.entities.contains_key(entity.name()) {
            bail!(
                StatusCode::InvalidArgs,
                "entity type `{}` is already defined",
                entity.name()
            );
        }
        for field in entity.fields() {
            self.check_type(&field.value_type)
                .with_context(|| format!("field `{}.{}`", entity.name(), field.name))?;
        }
        let entity = Arc::new(entity);
        self.entities
            .insert(entity.name().to_owned(), entity.clone());
        Ok(entity)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &Arc<EntityType>> {
        self.entities.values()
    }

    pub fn from_document(doc: SchemaDocument) -> TrackwireResult<Self> {
        let mut registry = TypeRegistry::new();
        for composite in doc.composites {
            registry.register(composite)?;
        }
        let mut model = Self::new(Arc::new(registry));
        for entity in doc.entities {
            model.add_entity(entity.into_entity_type())?;
        }
        Ok(model)
    }

    pub fn from_json(json: &str) -> TrackwireResult<Self> {
        let doc: SchemaDocument = serde_json::from_str(json).map_err(|e| {
            trackwire_error::GenericError::new(StatusCode::InvalidArgs, format!("invalid schema document: {e}"))
        })?;
        Self::from_document(doc)
    }

    pub fn from_path(path: impl AsRef<Path>) -> TrackwireResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading schema {}", path.display()))?;
        Self::from_json(&json)
    }

    fn check_type(
        &self,
        ty: &ValueType,
    ) -> TrackwireResult<()> {
        match ty {
            ValueType::Array(inner) | ValueType::Nullable(inner) => self.check_type(inner),
            ValueType::Enum { name, repr } if !repr.is_integer() => Err(WireError::construction(
                name,
                "enum underlying type must be an integer",
            )
            .into()),
            ValueType::Composite(name) => self.registry.layout(name).map(drop),
            _ => Ok(()),
        }
    }
}

impl Schema for Model {
    fn entity_type(
        &self,
        name: &str,
    ) -> Option<Arc<EntityType>> {
        self.entities.get(name).cloned()
    }
}
