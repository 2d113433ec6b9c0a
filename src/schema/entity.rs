use std::{collections::HashMap, sync::Arc};

use crate::codec::ValueType;

bitflags::bitflags! {
    /// Когда значение поля генерируется хранилищем.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ValueGenerated: u8 {
        const ON_ADD = 1 << 0;
        const ON_UPDATE = 1 << 1;
        const ON_ADD_OR_UPDATE = Self::ON_ADD.bits() | Self::ON_UPDATE.bits();
    }
}

/// Поле сущности со стабильным порядковым номером.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub index: usize,
    pub value_type: ValueType,
    pub is_key: bool,
    pub is_concurrency_token: bool,
    pub value_generated: ValueGenerated,
}

/// Навигация (связь) сущности.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub name: String,
    pub index: usize,
}

/// Тип сущности: поля и связи, упорядоченные по номерам.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    name: String,
    fields: Vec<Arc<FieldDescriptor>>,
    relations: Vec<Arc<RelationDescriptor>>,
    field_names: HashMap<String, usize>,
    relation_names: HashMap<String, usize>,
}

/// Описание поля до присвоения номера.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub value_type: ValueType,
    pub is_key: bool,
    pub is_concurrency_token: bool,
    pub value_generated: ValueGenerated,
}

#[derive(Debug, Clone)]
pub struct EntityTypeBuilder {
    name: String,
    fields: Vec<FieldSpec>,
    relations: Vec<String>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl FieldSpec {
    pub fn new(
        name: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        Self {
            name: name.into(),
            value_type,
            is_key: false,
            is_concurrency_token: false,
            value_generated: ValueGenerated::empty(),
        }
    }

    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    pub fn concurrency_token(mut self) -> Self {
        self.is_concurrency_token = true;
        self
    }

    pub fn generated(
        mut self,
        when: ValueGenerated,
    ) -> Self {
        self.value_generated = when;
        self
    }
}

impl EntityTypeBuilder {
    pub fn key(
        self,
        name: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        self.with_field(FieldSpec::new(name, value_type).key())
    }

    pub fn field(
        self,
        name: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        self.with_field(FieldSpec::new(name, value_type))
    }

    pub fn with_field(
        mut self,
        spec: FieldSpec,
    ) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn relation(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.relations.push(name.into());
        self
    }

    /// Присваивает номера: ключевые поля в порядке объявления, затем
    /// остальные по имени; связи по имени.
    pub fn build(self) -> EntityType {
        let (mut keys, mut rest): (Vec<FieldSpec>, Vec<FieldSpec>) =
            self.fields.into_iter().partition(|f| f.is_key);
        rest.sort_by(|a, b| a.name.cmp(&b.name));
        keys.append(&mut rest);

        let fields: Vec<Arc<FieldDescriptor>> = keys
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                Arc::new(FieldDescriptor {
                    name: spec.name,
                    index,
                    value_type: spec.value_type,
                    is_key: spec.is_key,
                    is_concurrency_token: spec.is_concurrency_token,
                    value_generated: spec.value_generated,
                })
            })
            .collect();

        let mut relation_names = self.relations;
        relation_names.sort();
        relation_names.dedup();
        let relations: Vec<Arc<RelationDescriptor>> = relation_names
            .into_iter()
            .enumerate()
            .map(|(index, name)| Arc::new(RelationDescriptor { name, index }))
            .collect();

        EntityType {
            field_names: fields
                .iter()
                .map(|f| (f.name.clone(), f.index))
                .collect(),
            relation_names: relations
                .iter()
                .map(|r| (r.name.clone(), r.index))
                .collect(),
            name: self.name,
            fields,
            relations,
        }
    }
}

impl EntityType {
    pub fn builder(name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder {
            name: name.into(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Arc<FieldDescriptor>] {
        &self.fields
    }

    pub fn relations(&self) -> &[Arc<RelationDescriptor>] {
        &self.relations
    }

    pub fn field(
        &self,
        ordinal: usize,
    ) -> Option<&Arc<FieldDescriptor>> {
        self.fields.get(ordinal)
    }

    pub fn field_by_name(
        &self,
        name: &str,
    ) -> Option<&Arc<FieldDescriptor>> {
        self.field_names
            .get(name)
            .and_then(|&i| self.fields.get(i))
    }

    pub fn relation(
        &self,
        ordinal: usize,
    ) -> Option<&Arc<RelationDescriptor>> {
        self.relations.get(ordinal)
    }

    pub fn relation_by_name(
        &self,
        name: &str,
    ) -> Option<&Arc<RelationDescriptor>> {
        self.relation_names
            .get(name)
            .and_then(|&i| self.relations.get(i))
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &Arc<FieldDescriptor>> {
        self.fields.iter().filter(|f| f.is_key)
    }

    /// Ширина битовой маски связей в байтах.
    pub fn relation_bitmap_len(&self) -> usize {
        self.relations.len().div_ceil(8)
    }
}
