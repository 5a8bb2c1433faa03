// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Argument values of entity instances

/// Link to an instance in the [`FileModel`](crate::FileModel) arena.
/// Only produced in tree mode, after every id is known to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntityHandle {
    id: u32,
    #[cfg_attr(feature = "serde", serde(skip))]
    index: usize,
}

impl EntityHandle {
    pub(crate) fn new(id: u32, index: usize) -> Self {
        Self { id, index }
    }

    /// Id of the referenced instance
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

/// STEP argument value
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "value", rename_all = "snake_case"))]
pub enum Value {
    /// String value (escapes already decoded)
    String(String),
    /// Real value
    Real(f64),
    /// Integer value
    Integer(i64),
    /// .T. / .F.
    Boolean(bool),
    /// Any other enumeration, without dots (.U. stays an enum)
    Enum(String),
    /// Binary literal as hex digits
    Binary(String),
    /// Unresolved reference: #123 (flat mode)
    Reference(u32),
    /// Resolved reference (tree mode)
    Resolved(EntityHandle),
    /// Omitted value: $
    Omitted,
    /// Derived value: *
    Derived,
    /// Aggregate: (1, 2, 3)
    List(Vec<Value>),
    /// Typed parameter: IFCLABEL('x'), IFCBOOLEAN(.T.)
    Typed(String, Box<Value>),
}

impl Value {
    /// Get as string
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as real, integers widen
    #[inline]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as enum value (without the dots)
    #[inline]
    pub fn as_enum(&self) -> Option<&str> {
        match self {
            Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Referenced id, whether resolved or not
    #[inline]
    pub fn as_reference(&self) -> Option<u32> {
        match self {
            Value::Reference(id) => Some(*id),
            Value::Resolved(handle) => Some(handle.id()),
            _ => None,
        }
    }

    /// Inner value of a typed parameter together with its type name
    #[inline]
    pub fn as_typed(&self) -> Option<(&str, &Value)> {
        match self {
            Value::Typed(name, inner) => Some((name, inner)),
            _ => None,
        }
    }

    #[inline]
    pub fn is_omitted(&self) -> bool {
        matches!(self, Value::Omitted)
    }

    #[inline]
    pub fn is_derived(&self) -> bool {
        matches!(self, Value::Derived)
    }

    /// Visit every reference in this value, depth first
    pub(crate) fn for_each_reference_mut<E>(
        &mut self,
        f: &mut impl FnMut(&mut Value) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            Value::Reference(_) => f(self),
            Value::List(items) => items
                .iter_mut()
                .try_for_each(|item| item.for_each_reference_mut(f)),
            Value::Typed(_, inner) => inner.for_each_reference_mut(f),
            _ => Ok(()),
        }
    }

    /// Same value with resolved links turned back into plain references
    pub fn unresolved(&self) -> Value {
        match self {
            Value::Resolved(handle) => Value::Reference(handle.id()),
            Value::List(items) => Value::List(items.iter().map(Value::unresolved).collect()),
            Value::Typed(name, inner) => Value::Typed(name.clone(), Box::new(inner.unresolved())),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(Value::String("a".into()).as_str(), Some("a"));
        assert_eq!(Value::Integer(3).as_real(), Some(3.0));
        assert_eq!(Value::Real(3.5).as_integer(), None);
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert_eq!(Value::Enum("ELEMENT".into()).as_enum(), Some("ELEMENT"));
        assert!(Value::Omitted.is_omitted());
        assert!(!Value::Derived.is_omitted());
        assert!(Value::Derived.is_derived());
    }

    #[test]
    fn test_reference_accessor_covers_links() {
        assert_eq!(Value::Reference(7).as_reference(), Some(7));
        assert_eq!(Value::Resolved(EntityHandle::new(7, 0)).as_reference(), Some(7));
        assert_eq!(Value::Integer(7).as_reference(), None);
    }

    #[test]
    fn test_for_each_reference_mut_reaches_nested_values() {
        let mut value = Value::List(vec![
            Value::Reference(1),
            Value::Typed("IFCX".into(), Box::new(Value::Reference(2))),
            Value::List(vec![Value::Integer(0), Value::Reference(3)]),
        ]);

        let mut seen = Vec::new();
        value
            .for_each_reference_mut(&mut |v| {
                seen.push(v.as_reference().unwrap());
                *v = Value::Omitted;
                Ok::<_, ()>(())
            })
            .unwrap();

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(value.as_list().unwrap()[0], Value::Omitted);
    }

    #[test]
    fn test_unresolved() {
        let value = Value::List(vec![Value::Resolved(EntityHandle::new(5, 2)), Value::Real(1.0)]);
        assert_eq!(
            value.unresolved(),
            Value::List(vec![Value::Reference(5), Value::Real(1.0)])
        );
    }
}
