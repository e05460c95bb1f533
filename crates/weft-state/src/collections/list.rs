#![forbid(unsafe_code)]

//! Array-like store over `Vec<T>`.

use std::rc::Rc;

use super::{Collection, CollectionStore, Entry, OpCategory, OperationTable, op};
use crate::error::{StateError, StateResult};

const LIST_ENTRIES: &[Entry] = &[
    op("len", OpCategory::Read),
    op("is_empty", OpCategory::Read),
    op("get", OpCategory::Read),
    op("first", OpCategory::Read),
    op("last", OpCategory::Read),
    op("contains", OpCategory::Read),
    op("position", OpCategory::Read),
    op("to_vec", OpCategory::Read),
    op("with", OpCategory::Read),
    op("push", OpCategory::CopyMutate),
    op("pop", OpCategory::CopyMutate),
    op("insert", OpCategory::CopyMutate),
    op("remove", OpCategory::CopyMutate),
    op("set", OpCategory::CopyMutate),
    op("swap", OpCategory::CopyMutate),
    op("clear", OpCategory::CopyMutate),
    op("truncate", OpCategory::CopyMutate),
    op("extend", OpCategory::CopyMutate),
    op("retain", OpCategory::CopyMutate),
    op("reverse", OpCategory::CopyMutate),
    op("sort_by", OpCategory::CopyMutate),
    op("map", OpCategory::ReduceMutate),
    op("filter", OpCategory::ReduceMutate),
    op("concat", OpCategory::ReduceMutate),
    op("sorted", OpCategory::ReduceMutate),
];

static LIST_OPERATIONS: OperationTable = OperationTable::from_static("list", LIST_ENTRIES);

impl<T: Clone + PartialEq + 'static> Collection for Vec<T> {
    fn operations() -> &'static OperationTable {
        &LIST_OPERATIONS
    }
}

/// Reactive list.
pub type ListStore<T> = CollectionStore<Vec<T>>;

fn out_of_range(operation: &str, index: usize, len: usize) -> StateError {
    StateError::invalid(operation, format!("index {index} out of range for length {len}"))
}

impl<T: Clone + PartialEq + 'static> CollectionStore<Vec<T>> {
    // -- read ---------------------------------------------------------------

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read("len", Vec::len)
    }

    /// True when the list has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read("is_empty", Vec::is_empty)
    }

    /// A copy of element `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.read("get", |v| v.get(index).cloned())
    }

    /// A copy of the first element.
    #[must_use]
    pub fn first(&self) -> Option<T> {
        self.read("first", |v| v.first().cloned())
    }

    /// A copy of the last element.
    #[must_use]
    pub fn last(&self) -> Option<T> {
        self.read("last", |v| v.last().cloned())
    }

    /// Whether `item` is present.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.read("contains", |v| v.contains(item))
    }

    /// Index of the first element equal to `item`.
    #[must_use]
    pub fn position(&self, item: &T) -> Option<usize> {
        self.read("position", |v| v.iter().position(|x| x == item))
    }

    /// A copy of the whole list.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.read("to_vec", Vec::clone)
    }

    /// Borrow the elements, e.g. to iterate.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        self.read("with", |v| f(v.as_slice()))
    }

    // -- copy-mutate --------------------------------------------------------

    /// Append `item`. Returns the new snapshot.
    pub fn push(&self, item: T) -> Rc<Vec<T>> {
        self.copy_mutate("push", |v| v.push(item));
        self.snapshot()
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        self.copy_mutate("pop", Vec::pop)
    }

    /// Insert `item` at `index`, shifting later elements.
    ///
    /// # Errors
    ///
    /// `InvalidMutation` when `index > len`.
    pub fn insert(&self, index: usize, item: T) -> StateResult<()> {
        let len = self.len();
        if index > len {
            return Err(out_of_range("insert", index, len));
        }
        self.copy_mutate("insert", |v| v.insert(index, item));
        Ok(())
    }

    /// Remove and return element `index`.
    ///
    /// # Errors
    ///
    /// `InvalidMutation` when `index >= len`.
    pub fn remove(&self, index: usize) -> StateResult<T> {
        let len = self.len();
        if index >= len {
            return Err(out_of_range("remove", index, len));
        }
        Ok(self.copy_mutate("remove", |v| v.remove(index)))
    }

    /// Overwrite element `index`, returning the previous value.
    ///
    /// # Errors
    ///
    /// `InvalidMutation` when `index >= len`.
    pub fn set(&self, index: usize, item: T) -> StateResult<T> {
        let len = self.len();
        if index >= len {
            return Err(out_of_range("set", index, len));
        }
        Ok(self.copy_mutate("set", |v| std::mem::replace(&mut v[index], item)))
    }

    /// Swap elements `a` and `b`.
    ///
    /// # Errors
    ///
    /// `InvalidMutation` when either index is out of range.
    pub fn swap(&self, a: usize, b: usize) -> StateResult<()> {
        let len = self.len();
        if let Some(bad) = [a, b].into_iter().find(|&i| i >= len) {
            return Err(out_of_range("swap", bad, len));
        }
        self.copy_mutate("swap", |v| v.swap(a, b));
        Ok(())
    }

    /// Remove every element.
    pub fn clear(&self) {
        self.copy_mutate("clear", Vec::clear);
    }

    /// Keep the first `len` elements.
    pub fn truncate(&self, len: usize) {
        self.copy_mutate("truncate", |v| v.truncate(len));
    }

    /// Append every item of `items`.
    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        self.copy_mutate("extend", |v| v.extend(items));
    }

    /// Keep elements for which `keep` returns true.
    pub fn retain(&self, keep: impl FnMut(&T) -> bool) {
        self.copy_mutate("retain", |v| v.retain(keep));
    }

    /// Reverse element order.
    pub fn reverse(&self) {
        self.copy_mutate("reverse", |v| v.reverse());
    }

    /// Stable sort by `compare`.
    pub fn sort_by(&self, compare: impl FnMut(&T, &T) -> std::cmp::Ordering) {
        self.copy_mutate("sort_by", |v| v.sort_by(compare));
    }

    // -- reduce-mutate ------------------------------------------------------

    /// Replace each element with `f(element)`.
    pub fn map(&self, f: impl Fn(&T) -> T) {
        self.reduce_mutate("map", |v| v.iter().map(f).collect());
    }

    /// Keep copies of the elements matching `keep`.
    pub fn filter(&self, keep: impl Fn(&T) -> bool) {
        self.reduce_mutate("filter", |v| v.iter().filter(|&x| keep(x)).cloned().collect());
    }

    /// Append copies of `items`.
    pub fn concat(&self, items: &[T]) {
        self.reduce_mutate("concat", |v| [v.as_slice(), items].concat());
    }
}

impl<T: Clone + Ord + 'static> CollectionStore<Vec<T>> {
    /// Sorted copy of the elements.
    pub fn sorted(&self) {
        self.reduce_mutate("sorted", |v| {
            let mut next = v.clone();
            next.sort();
            next
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeSet;
    use crate::context::StateContext;
    use crate::reactive::{Binding, Content, Producer};

    fn list(ctx: &StateContext) -> ListStore<i32> {
        ListStore::new(ctx, vec![3, 1, 2])
    }

    #[test]
    fn table_covers_every_operation() {
        for name in ["len", "get", "contains", "position", "to_vec", "with"] {
            assert_eq!(ListStore::<i32>::category_of(name), Some(OpCategory::Read));
        }
        for name in ["push", "pop", "insert", "remove", "set", "clear", "sort_by"] {
            assert_eq!(
                ListStore::<i32>::category_of(name),
                Some(OpCategory::CopyMutate)
            );
        }
        for name in ["map", "filter", "concat", "sorted"] {
            assert_eq!(
                ListStore::<i32>::category_of(name),
                Some(OpCategory::ReduceMutate)
            );
        }
        assert_eq!(ListStore::<i32>::operations().kind(), "list");
    }

    #[test]
    fn reads_do_not_mutate() {
        let ctx = StateContext::headless();
        let l = list(&ctx);
        let before = l.snapshot();
        assert_eq!(l.len(), 3);
        assert_eq!(l.get(0), Some(3));
        assert_eq!(l.first(), Some(3));
        assert_eq!(l.last(), Some(2));
        assert!(l.contains(&1));
        assert_eq!(l.position(&2), Some(2));
        assert_eq!(l.with(|s| s.iter().sum::<i32>()), 6);
        assert!(Rc::ptr_eq(&before, &l.snapshot()));
        assert_eq!(l.version(), 0);
    }

    #[test]
    fn copy_mutations_replace_the_snapshot() {
        let ctx = StateContext::headless();
        let l = list(&ctx);
        let before = l.snapshot();

        let after = l.push(4);
        assert_eq!(*before, vec![3, 1, 2]);
        assert_eq!(*after, vec![3, 1, 2, 4]);
        assert_eq!(l.pop(), Some(4));
        l.insert(0, 9).unwrap();
        assert_eq!(l.remove(1).unwrap(), 3);
        assert_eq!(l.set(0, 8).unwrap(), 9);
        l.swap(0, 2).unwrap();
        assert_eq!(l.to_vec(), vec![2, 1, 8]);

        l.sort_by(|a, b| a.cmp(b));
        assert_eq!(l.to_vec(), vec![1, 2, 8]);
        l.reverse();
        l.retain(|x| *x != 2);
        l.extend([5, 6]);
        l.truncate(3);
        assert_eq!(l.to_vec(), vec![8, 1, 5]);
        assert!(l.store().last_changes().is_whole());

        l.clear();
        assert!(l.is_empty());
        assert_eq!(l.pop(), None);
    }

    #[test]
    fn out_of_range_is_invalid_mutation() {
        let ctx = StateContext::headless();
        let l = list(&ctx);
        let v = l.version();
        assert!(matches!(l.insert(4, 0), Err(StateError::InvalidMutation { .. })));
        assert!(matches!(l.remove(3), Err(StateError::InvalidMutation { .. })));
        assert!(matches!(l.set(7, 0), Err(StateError::InvalidMutation { .. })));
        assert_eq!(
            l.swap(0, 5).unwrap_err().to_string(),
            "invalid mutation 'swap': index 5 out of range for length 3"
        );
        assert_eq!(l.version(), v);
    }

    #[test]
    fn reduce_mutations() {
        let ctx = StateContext::headless();
        let l = list(&ctx);
        l.map(|x| x * 10);
        assert_eq!(l.to_vec(), vec![30, 10, 20]);
        l.filter(|x| *x > 10);
        assert_eq!(l.to_vec(), vec![30, 20]);
        l.concat(&[5]);
        l.sorted();
        assert_eq!(l.to_vec(), vec![5, 20, 30]);
        assert_eq!(l.version(), 4);
    }

    #[test]
    fn named_dispatch_checks_the_table() {
        let ctx = StateContext::headless();
        let l = list(&ctx);
        assert_eq!(l.read_op("len", |v| v.len()).unwrap(), 3);
        l.copy_mutate_op("push", |v| v.push(7)).unwrap();
        l.reduce_mutate_op("filter", |v| v.iter().copied().filter(|x| *x > 2).collect())
            .unwrap();
        assert_eq!(l.to_vec(), vec![3, 7]);

        assert!(matches!(
            l.copy_mutate_op("len", |_| ()),
            Err(StateError::InvalidMutation { .. })
        ));
        assert!(matches!(
            l.read_op("frobnicate", |_| ()),
            Err(StateError::UnknownOperation { .. })
        ));
    }

    #[test]
    fn transaction_notifies_once() {
        let ctx = StateContext::headless();
        let l = list(&ctx);
        let b = Binding::new(&ctx, l.clone(), Producer::value_only(|v: &Vec<i32>| v.len()));

        l.transaction(|l| {
            l.push(1);
            l.push(2);
            l.pop();
            assert_eq!(l.len(), 4);
            Ok::<_, StateError>(())
        })
        .unwrap();
        assert_eq!(b.evaluations(), 2);
        assert_eq!(b.content(), Content::Rendered(4));
        assert_eq!(l.store().last_changes(), ChangeSet::Whole);
    }

    #[test]
    fn no_op_mutation_does_not_notify() {
        let ctx = StateContext::headless();
        let l = list(&ctx);
        let b = Binding::new(&ctx, l.clone(), Producer::no_args(|| ()));
        l.retain(|_| true);
        l.truncate(10);
        assert_eq!(b.evaluations(), 1);
    }
}
