use std::cell::{RefCell, RefMut};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::iter::Peekable;
use std::ops::Bound;
use std::rc::Rc;

use super::value::Value;
use crate::runtime::runtime_error::ExecError;

/// Separator joining the components of a multi-dimensional index
/// (`a[i, j]` is stored under `"i\x1cj"`).
pub const ARRAY_DIM_SEP: &str = "\x1c";

type Entries = BTreeMap<String, Value>;

/// Associative array of the macro language.
///
/// Keys are ordered byte-lexicographically. The handle is shared: cloning an
/// `Array` aliases the same container, so mutation through one clone is
/// visible through every other. Use [`Array::shallow_copy`] to get a
/// container of its own.
#[derive(Clone, Default)]
pub struct Array(Rc<RefCell<Entries>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_entries(entries: Entries) -> Self {
        Self(Rc::new(RefCell::new(entries)))
    }

    fn entries_mut(&self, on_busy: ExecError) -> Result<RefMut<'_, Entries>, ExecError> {
        self.0.try_borrow_mut().map_err(|_| on_busy)
    }

    /// Insert or overwrite `key`.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Result<(), ExecError> {
        self.entries_mut(ExecError::ArrayInsertionFailure)?
            .insert(key.into(), value);
        Ok(())
    }

    /// Remove `key`; absent keys are ignored.
    pub fn delete(&self, key: &str) -> Result<(), ExecError> {
        self.entries_mut(ExecError::ArrayDeletionFailure)?.remove(key);
        Ok(())
    }

    pub fn delete_all(&self) -> Result<(), ExecError> {
        self.entries_mut(ExecError::ArrayDeletionFailure)?.clear();
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Snapshot of the entries in key order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// New container with the same top-level bindings. Nested arrays are
    /// not copied; both containers refer to the same nested values.
    pub fn shallow_copy(&self) -> Array {
        Array::from_entries(self.0.borrow().clone())
    }

    /// True if both handles refer to the same container.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn iterate_first(&self) -> ArrayIter {
        let cursor = self.0.borrow().keys().next().cloned();
        ArrayIter {
            array: self.clone(),
            cursor,
        }
    }

    // Set algebra. Each operator walks both key sequences in order, like a
    // sorted-merge join, and fails if either operand is being modified.

    /// Every key of either side; the right-hand value wins on a shared key.
    pub fn union(&self, right: &Array) -> Result<Array, ExecError> {
        self.merge(right, |side| match side {
            Side::Left(v) | Side::Right(v) | Side::Both(_, v) => Some(v),
        })
    }

    /// Keys of `self` that are absent from `right`.
    pub fn difference(&self, right: &Array) -> Result<Array, ExecError> {
        self.merge(right, |side| match side {
            Side::Left(v) => Some(v),
            Side::Right(_) | Side::Both(..) => None,
        })
    }

    /// Keys present on both sides, with the right-hand values.
    pub fn intersection(&self, right: &Array) -> Result<Array, ExecError> {
        self.merge(right, |side| match side {
            Side::Both(_, v) => Some(v),
            Side::Left(_) | Side::Right(_) => None,
        })
    }

    fn merge<F>(&self, right: &Array, mut pick: F) -> Result<Array, ExecError>
    where
        F: FnMut(Side<'_>) -> Option<&Value>,
    {
        let left_entries = self
            .0
            .try_borrow()
            .map_err(|_| ExecError::ArrayInsertionFailure)?;
        let right_entries = right
            .0
            .try_borrow()
            .map_err(|_| ExecError::ArrayInsertionFailure)?;
        let mut out = Entries::new();

        let mut left_iter = left_entries.iter().peekable();
        let mut right_iter = right_entries.iter().peekable();

        while let Some((key, side)) = next_merged(&mut left_iter, &mut right_iter) {
            if let Some(value) = pick(side) {
                out.insert(key.clone(), value.clone());
            }
        }

        Ok(Array::from_entries(out))
    }
}

enum Side<'a> {
    Left(&'a Value),
    Right(&'a Value),
    Both(&'a Value, &'a Value),
}

fn next_merged<'a, L, R>(
    left: &mut Peekable<L>,
    right: &mut Peekable<R>,
) -> Option<(&'a String, Side<'a>)>
where
    L: Iterator<Item = (&'a String, &'a Value)>,
    R: Iterator<Item = (&'a String, &'a Value)>,
{
    let order = match (left.peek(), right.peek()) {
        (None, None) => return None,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some((lk, _)), Some((rk, _))) => lk.as_bytes().cmp(rk.as_bytes()),
    };

    match order {
        Ordering::Less => left.next().map(|(k, v)| (k, Side::Left(v))),
        Ordering::Greater => right.next().map(|(k, v)| (k, Side::Right(v))),
        Ordering::Equal => {
            let (key, lv) = left.next()?;
            let (_, rv) = right.next()?;
            Some((key, Side::Both(lv, rv)))
        }
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0.borrow() == *other.0.borrow()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

/// Cursor over an [`Array`] that survives mutation of the container.
///
/// The cursor names the key it will yield next. Entries other than that one
/// may be inserted or deleted freely while iterating; deleting the targeted
/// entry makes the next step fail with [`ExecError::IteratorInvalidated`].
#[derive(Clone, Debug)]
pub struct ArrayIter {
    array: Array,
    cursor: Option<String>,
}

impl ArrayIter {
    pub fn array(&self) -> &Array {
        &self.array
    }

    /// Key that the next step will yield, `None` once exhausted.
    pub fn current_key(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Yield the targeted key and move to its successor.
    pub fn iterate_next(&mut self) -> Result<Option<String>, ExecError> {
        let Some(key) = self.cursor.take() else {
            return Ok(None);
        };

        let entries = self.array.0.borrow();
        if !entries.contains_key(&key) {
            self.cursor = Some(key.clone());
            return Err(ExecError::IteratorInvalidated { key });
        }

        self.cursor = entries
            .range::<str, _>((Bound::Excluded(key.as_str()), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.clone());

        Ok(Some(key))
    }
}

impl PartialEq for ArrayIter {
    fn eq(&self, other: &Self) -> bool {
        self.array.ptr_eq(&other.array) && self.cursor == other.cursor
    }
}
