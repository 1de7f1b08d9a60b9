//! The list container: an ordered sequence with cheap access at both
//! ends. Lists have value semantics at the language level; the `Rc`
//! wrapper around them is copy-on-write.

use std::collections::VecDeque;

use crate::errors::CalcError;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct List {
    elems: VecDeque<Value>,
}

impl List {
    pub fn new() -> Self {
        List::default()
    }

    pub fn from_vec(v: Vec<Value>) -> Self {
        List {
            elems: v.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Value> {
        self.elems.get(i)
    }

    pub fn set(&mut self, i: usize, v: Value) -> Result<(), CalcError> {
        match self.elems.get_mut(i) {
            Some(slot) => {
                *slot = v;
                Ok(())
            }
            None => Err(CalcError::IndexBounds),
        }
    }

    pub fn push_front(&mut self, v: Value) {
        self.elems.push_front(v);
    }

    pub fn push_back(&mut self, v: Value) {
        self.elems.push_back(v);
    }

    pub fn pop_front(&mut self) -> Option<Value> {
        self.elems.pop_front()
    }

    pub fn pop_back(&mut self) -> Option<Value> {
        self.elems.pop_back()
    }

    pub fn insert(&mut self, i: usize, v: Value) -> Result<(), CalcError> {
        if i > self.elems.len() {
            return Err(CalcError::IndexBounds);
        }
        self.elems.insert(i, v);
        Ok(())
    }

    pub fn remove(&mut self, i: usize) -> Result<Value, CalcError> {
        self.elems.remove(i).ok_or(CalcError::IndexBounds)
    }

    /// First position holding a value equal to `needle`.
    pub fn search(&self, needle: &Value) -> Option<usize> {
        self.elems.iter().position(|e| e == needle)
    }

    /// Last position holding a value equal to `needle`.
    pub fn rsearch(&self, needle: &Value) -> Option<usize> {
        self.elems.iter().rposition(|e| e == needle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.elems.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(i: i64) -> Value {
        Value::from_i64(i)
    }

    #[test]
    fn push_pop_both_ends() {
        let mut l = List::new();
        l.push_back(n(2));
        l.push_front(n(1));
        l.push_back(n(3));
        assert_eq!(l.len(), 3);
        assert_eq!(l.get(0), Some(&n(1)));
        assert_eq!(l.pop_front(), Some(n(1)));
        assert_eq!(l.pop_back(), Some(n(3)));
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn insert_remove_bounds() {
        let mut l = List::from_vec(vec![n(1), n(3)]);
        l.insert(1, n(2)).unwrap();
        assert_eq!(l.get(1), Some(&n(2)));
        assert!(l.insert(5, n(9)).is_err());
        assert_eq!(l.remove(0).unwrap(), n(1));
        assert!(l.remove(5).is_err());
    }

    #[test]
    fn search_finds_first_and_last() {
        let l = List::from_vec(vec![n(5), n(7), n(5)]);
        assert_eq!(l.search(&n(5)), Some(0));
        assert_eq!(l.rsearch(&n(5)), Some(2));
        assert_eq!(l.search(&n(9)), None);
    }
}
