// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory file model
//!
//! Instances live in an append-only arena owned by [`FileModel`]. Lookups by
//! id and by type go through index maps; tree-mode links are arena indices.

use std::ops::Index;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{NotFoundError, ValidationError, ValidationErrorKind};
use crate::header::HeaderSection;
use crate::mvd::MvdInfo;
use crate::value::{EntityHandle, Value};

/// One `TYPE(args)` group of an instance
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntityPart {
    /// Upper-cased type name
    pub type_name: String,
    pub attributes: Vec<Value>,
}

/// A `#id = TYPE(args);` record
///
/// Complex instances (`#id = (A(..) B(..));`) have several parts in textual
/// order, simple ones exactly one.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntityInstance {
    pub id: u32,
    pub parts: SmallVec<[EntityPart; 1]>,
    /// Byte offset of the `#id` token
    pub offset: usize,
}

impl EntityInstance {
    pub(crate) fn new(id: u32, parts: SmallVec<[EntityPart; 1]>, offset: usize) -> Self {
        Self { id, parts, offset }
    }

    /// Type of the first part
    #[inline]
    pub fn type_name(&self) -> &str {
        self.parts.first().map(|p| p.type_name.as_str()).unwrap_or("")
    }

    #[inline]
    pub fn is_complex(&self) -> bool {
        self.parts.len() > 1
    }

    /// Attributes of the first part
    #[inline]
    pub fn attributes(&self) -> &[Value] {
        self.parts
            .first()
            .map(|p| p.attributes.as_slice())
            .unwrap_or(&[])
    }

    /// Attribute by position, in textual order
    #[inline]
    pub fn attribute(&self, index: usize) -> Option<&Value> {
        self.attributes().get(index)
    }

    /// Part by type name (case-insensitive)
    pub fn part(&self, type_name: &str) -> Option<&EntityPart> {
        self.parts
            .iter()
            .find(|p| p.type_name.eq_ignore_ascii_case(type_name))
    }
}

impl Index<usize> for EntityInstance {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.attributes()[index]
    }
}

/// Parsed STEP file
#[derive(Debug, Clone, Default)]
pub struct FileModel {
    header: Option<HeaderSection>,
    instances: Vec<EntityInstance>,
    ids: FxHashMap<u32, usize>,
    /// Upper-cased type name -> arena indices in file order
    types: FxHashMap<String, Vec<usize>>,
    tree: bool,
}

impl FileModel {
    pub(crate) fn new(header: Option<HeaderSection>) -> Self {
        Self {
            header,
            ..Self::default()
        }
    }

    /// Add an instance. On a duplicate id returns the offset of the first definition.
    pub(crate) fn insert(&mut self, instance: EntityInstance) -> Result<(), usize> {
        if let Some(&existing) = self.ids.get(&instance.id) {
            return Err(self.instances[existing].offset);
        }
        let index = self.instances.len();
        self.ids.insert(instance.id, index);
        for part in &instance.parts {
            let bucket = self.types.entry(part.type_name.clone()).or_default();
            // A complex instance may list the same type twice
            if bucket.last() != Some(&index) {
                bucket.push(index);
            }
        }
        self.instances.push(instance);
        Ok(())
    }

    /// Replace every reference with an arena link.
    /// Fails on the first id that was never defined, in file order.
    pub(crate) fn resolve_references(&mut self) -> Result<(), ValidationError> {
        let ids = &self.ids;
        for instance in &mut self.instances {
            let (owner, offset) = (instance.id, instance.offset);
            for part in instance.parts.iter_mut() {
                for value in part.attributes.iter_mut() {
                    value.for_each_reference_mut(&mut |v: &mut Value| -> Result<(), ValidationError> {
                        let Value::Reference(target) = *v else {
                            return Ok(());
                        };
                        let index = ids.get(&target).copied().ok_or_else(|| {
                            ValidationError::new(
                                ValidationErrorKind::UnresolvedReference,
                                offset,
                                format!("#{} references undefined instance #{}", owner, target),
                            )
                        })?;
                        *v = Value::Resolved(EntityHandle::new(target, index));
                        Ok(())
                    })?;
                }
            }
        }
        self.tree = true;
        Ok(())
    }

    /// Header section, `None` when header decoding was switched off
    #[inline]
    pub fn header(&self) -> Option<&HeaderSection> {
        self.header.as_ref()
    }

    /// MVD annotations from the header description
    #[inline]
    pub fn mvd(&self) -> Option<&MvdInfo> {
        self.header.as_ref().and_then(|h| h.mvd.as_ref())
    }

    /// True if references were resolved into links
    #[inline]
    pub fn is_tree(&self) -> bool {
        self.tree
    }

    /// Instance by id
    pub fn by_id(&self, id: u32) -> Result<&EntityInstance, NotFoundError> {
        self.get(id).ok_or(NotFoundError { id })
    }

    /// Instance by id, `None` if absent
    #[inline]
    pub fn get(&self, id: u32) -> Option<&EntityInstance> {
        self.ids.get(&id).map(|&index| &self.instances[index])
    }

    /// Instances of a type (case-insensitive), in file order
    pub fn by_type(&self, type_name: &str) -> Vec<&EntityInstance> {
        let key = type_name.to_ascii_uppercase();
        self.types
            .get(&key)
            .map(|indices| indices.iter().map(|&i| &self.instances[i]).collect())
            .unwrap_or_default()
    }

    /// Follow a reference value to its instance
    ///
    /// Resolved links are O(1) arena accesses; plain references go through
    /// the id map.
    pub fn resolve(&self, value: &Value) -> Option<&EntityInstance> {
        match value {
            Value::Resolved(handle) => self.instances.get(handle.index()),
            Value::Reference(id) => self.get(*id),
            _ => None,
        }
    }

    /// All instances in file order
    pub fn iter(&self) -> impl Iterator<Item = &EntityInstance> {
        self.instances.iter()
    }

    /// Instance count per type name
    pub fn types(&self) -> impl Iterator<Item = (&str, usize)> {
        self.types.iter().map(|(name, v)| (name.as_str(), v.len()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl Index<u32> for FileModel {
    type Output = EntityInstance;

    fn index(&self, id: u32) -> &EntityInstance {
        match self.get(id) {
            Some(instance) => instance,
            None => panic!("no instance #{}", id),
        }
    }
}
