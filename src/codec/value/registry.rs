//! Таблица дескрипторов составных типов.
//!
//! Вместо обхода полей во время выполнения каждый составной тип описывается
//! заранее: имя, вид (класс или структура), базовый тип и упорядоченный
//! список членов. Порядок членов на проводе: сначала собственные поля типа,
//! затем поля каждого предка, от ближайшего к дальнему. Члены, помеченные
//! как несериализуемые или имеющие тип делегата, пропускаются.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use trackwire_error::{bail, StatusCode, TrackwireResult, WireError};

use super::types::ValueType;

/// Вид составного типа.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeKind {
    /// Ссылочный тип: перед телом пишется флаг присутствия.
    #[default]
    Class,
    /// Тип-значение: флага присутствия нет, `null` невозможен.
    Struct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    #[default]
    Data,
    NonSerialized,
    Delegate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDescriptor {
    pub name: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub kind: MemberKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeDescriptor {
    pub name: String,
    #[serde(default)]
    pub kind: CompositeKind,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberDescriptor>,
    /// `false` для типов, экземпляр которых нельзя создать при чтении
    /// (нет пути конструирования без аргументов).
    #[serde(default = "default_constructible")]
    pub constructible: bool,
}

fn default_constructible() -> bool {
    true
}

/// Реестр составных типов с кэшем разрешённых раскладок.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<CompositeDescriptor>>,
    layouts: RwLock<HashMap<String, Arc<[MemberDescriptor]>>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl MemberDescriptor {
    pub fn is_serialized(&self) -> bool {
        self.kind == MemberKind::Data
    }
}

impl CompositeDescriptor {
    pub fn class(name: impl Into<String>) -> Self {
        Self::new(name, CompositeKind::Class)
    }

    pub fn structure(name: impl Into<String>) -> Self {
        Self::new(name, CompositeKind::Struct)
    }

    fn new(
        name: impl Into<String>,
        kind: CompositeKind,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            base: None,
            members: Vec::new(),
            constructible: true,
        }
    }

    pub fn field(
        self,
        name: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        self.member(name, value_type, MemberKind::Data)
    }

    pub fn non_serialized(
        self,
        name: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        self.member(name, value_type, MemberKind::NonSerialized)
    }

    pub fn delegate(
        self,
        name: impl Into<String>,
    ) -> Self {
        self.member(name, ValueType::U64, MemberKind::Delegate)
    }

    pub fn extends(
        mut self,
        base: impl Into<String>,
    ) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Помечает тип как неконструируемый при чтении.
    pub fn opaque(mut self) -> Self {
        self.constructible = false;
        self
    }

    fn member(
        mut self,
        name: impl Into<String>,
        value_type: ValueType,
        kind: MemberKind,
    ) -> Self {
        self.members.push(MemberDescriptor {
            name: name.into(),
            value_type,
            kind,
        });
        self
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Регистрирует тип. Повторная регистрация того же имени: ошибка.
    pub fn register(
        &mut self,
        descriptor: CompositeDescriptor,
    ) -> TrackwireResult<()> {
        if self.types.contains_key(&descriptor.name) {
            bail!(
                StatusCode::InvalidArgs,
                "composite type `{}` is already registered",
                descriptor.name
            );
        }
        if descriptor.kind == CompositeKind::Struct && descriptor.base.is_some() {
            bail!(
                StatusCode::InvalidArgs,
                "struct `{}` cannot have a base type",
                descriptor.name
            );
        }
        self.layouts.write().clear();
        self.types
            .insert(descriptor.name.clone(), Arc::new(descriptor));
        Ok(())
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.types.contains_key(name)
    }

    /// Дескриптор по имени; неизвестный тип нельзя ни прочитать, ни записать.
    pub fn get(
        &self,
        name: &str,
    ) -> TrackwireResult<Arc<CompositeDescriptor>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| WireError::construction(name, "no descriptor registered").into())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &CompositeDescriptor> {
        self.types.values().map(AsRef::as_ref)
    }

    /// Упорядоченный список сериализуемых членов типа с учётом предков.
    pub fn layout(
        &self,
        name: &str,
    ) -> TrackwireResult<Arc<[MemberDescriptor]>> {
        if let Some(cached) = self.layouts.read().get(name) {
            return Ok(cached.clone());
        }

        let mut members = Vec::new();
        let mut current = Some(name.to_owned());
        let mut visited: Vec<String> = Vec::new();

        while let Some(type_name) = current {
            if visited.contains(&type_name) {
                return Err(WireError::construction(
                    name,
                    format!("inheritance cycle through `{type_name}`"),
                )
                .into());
            }
            let descriptor = self.types.get(&type_name).ok_or_else(|| {
                WireError::construction(name, format!("missing base type `{type_name}`"))
            })?;
            members.extend(
                descriptor
                    .members
                    .iter()
                    .filter(|m| m.is_serialized())
                    .cloned(),
            );
            current = descriptor.base.clone();
            visited.push(type_name);
        }

        let layout: Arc<[MemberDescriptor]> = members.into();
        self.layouts
            .write()
            .insert(name.to_owned(), layout.clone());
        Ok(layout)
    }
}
