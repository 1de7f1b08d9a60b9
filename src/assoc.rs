//! Associative arrays keyed by tuples of values.
//!
//! Keys hash by type tag plus tag-specific state; iteration order is
//! whatever the hash map yields, deterministic while a given map is
//! unmodified within one run, and not promised across runs.

use std::collections::hash_map;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::errors::CalcError;
use crate::value::Value;

/// A tuple of key values. Construction validates that every component
/// supports stable hashing; random states, open maps and error values
/// do not.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyTuple(Vec<Value>);

impl KeyTuple {
    pub fn new(keys: Vec<Value>) -> Result<Self, CalcError> {
        for k in &keys {
            check_hashable(k)?;
        }
        Ok(KeyTuple(keys))
    }

    pub fn parts(&self) -> &[Value] {
        &self.0
    }
}

fn check_hashable(v: &Value) -> Result<(), CalcError> {
    match v {
        Value::Rand(_) | Value::Err(_) | Value::Map(_) => {
            Err(CalcError::NotHashable(v.type_name()))
        }
        Value::List(l) => {
            for e in l.iter() {
                check_hashable(e)?;
            }
            Ok(())
        }
        Value::Mat(m) => {
            for e in m.iter() {
                check_hashable(e)?;
            }
            Ok(())
        }
        Value::Obj(o) => {
            for e in &o.fields {
                check_hashable(e)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn hash_value<H: Hasher>(v: &Value, state: &mut H) {
    match v {
        Value::Null => 0u8.hash(state),
        Value::Num(q) => {
            1u8.hash(state);
            q.numer().hash(state);
            q.denom().hash(state);
        }
        Value::Cplx(c) => {
            2u8.hash(state);
            c.re.numer().hash(state);
            c.re.denom().hash(state);
            c.im.numer().hash(state);
            c.im.denom().hash(state);
        }
        Value::Str(s) => {
            3u8.hash(state);
            s.hash(state);
        }
        Value::Block(b) => {
            4u8.hash(state);
            b.hash(state);
        }
        Value::List(l) => {
            5u8.hash(state);
            l.len().hash(state);
            for e in l.iter() {
                hash_value(e, state);
            }
        }
        Value::Mat(m) => {
            6u8.hash(state);
            m.bounds().hash(state);
            for e in m.iter() {
                hash_value(e, state);
            }
        }
        Value::Obj(o) => {
            7u8.hash(state);
            o.type_id.hash(state);
            for e in &o.fields {
                hash_value(e, state);
            }
        }
        Value::File(fid) => {
            8u8.hash(state);
            fid.hash(state);
        }
        // rejected at construction; keep the hash total anyway
        Value::Map(_) => 9u8.hash(state),
        Value::Rand(_) => 10u8.hash(state),
        Value::Err(e) => {
            11u8.hash(state);
            e.code.hash(state);
        }
    }
}

impl Hash for KeyTuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for v in &self.0 {
            hash_value(v, state);
        }
    }
}

impl Eq for KeyTuple {}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Assoc {
    map: HashMap<KeyTuple, Value>,
}

impl Assoc {
    pub fn new() -> Self {
        Assoc::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, k: &KeyTuple) -> Option<&Value> {
        self.map.get(k)
    }

    pub fn insert(&mut self, k: KeyTuple, v: Value) {
        self.map.insert(k, v);
    }

    pub fn remove(&mut self, k: &KeyTuple) -> Option<Value> {
        self.map.remove(k)
    }

    pub fn iter(&self) -> hash_map::Iter<'_, KeyTuple, Value> {
        self.map.iter()
    }

    /// First key whose stored value equals `needle`.
    pub fn search(&self, needle: &Value) -> Option<&KeyTuple> {
        self.map.iter().find(|(_, v)| *v == needle).map(|(k, _)| k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(i: i64) -> Value {
        Value::from_i64(i)
    }

    fn key(vals: Vec<Value>) -> KeyTuple {
        KeyTuple::new(vals).unwrap()
    }

    #[test]
    fn insert_get_remove() {
        let mut a = Assoc::new();
        a.insert(key(vec![n(1)]), n(10));
        a.insert(key(vec![n(1), n(2)]), n(20));
        assert_eq!(a.get(&key(vec![n(1)])), Some(&n(10)));
        assert_eq!(a.get(&key(vec![n(1), n(2)])), Some(&n(20)));
        assert_eq!(a.get(&key(vec![n(2)])), None);
        assert_eq!(a.remove(&key(vec![n(1)])), Some(n(10)));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn equal_rationals_collide() {
        // 2/4 reduces to 1/2, so the keys are the same
        let mut a = Assoc::new();
        a.insert(key(vec![Value::from_ratio(1, 2)]), n(1));
        a.insert(key(vec![Value::from_ratio(2, 4)]), n(2));
        assert_eq!(a.len(), 1);
        assert_eq!(a.get(&key(vec![Value::from_ratio(1, 2)])), Some(&n(2)));
    }

    #[test]
    fn string_keys() {
        let mut a = Assoc::new();
        a.insert(key(vec![Value::str_from("alpha")]), n(1));
        assert_eq!(a.get(&key(vec![Value::str_from("alpha")])), Some(&n(1)));
        assert_eq!(a.get(&key(vec![Value::str_from("beta")])), None);
    }

    #[test]
    fn unhashable_keys_rejected() {
        let r = KeyTuple::new(vec![Value::Err(crate::value::ErrValue {
            code: 101,
            msg: None,
        })]);
        assert!(r.is_err());
    }
}
