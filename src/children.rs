//! Ordered child collection - a generic commit-style, event-filtered,
//! indexable sequence.
//!
//! Every tree node holds its children in a `ChildList`. Mutating primitives
//! run cancelable *filters* against pre-mutation state; if any registered
//! filter rejects, the operation aborts with its failure sentinel and
//! nothing mutates. On success the backing sequence mutates and
//! non-cancelable *notices* fire with the affected index, observing
//! post-mutation state. No operation partially mutates on rejection.
//!
//! The component engine uses the crate-internal staged variants to
//! interpose document projection between mutation and notice emission.

use crate::error::{Error, Result};

// =============================================================================
// Events
// =============================================================================

/// Cancelable filter channels, run before mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Any input-side mutation (push, unshift, replace, map).
    Input,
    InputPush,
    InputUnshift,
    /// Any output-side mutation (pop, shift, remove, clear).
    Output,
    OutputPop,
    OutputShift,
}

/// Non-cancelable notices, fired after mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Insert,
    InsertPush,
    InsertUnshift,
    Remove,
    RemovePop,
    RemoveShift,
    Change,
}

/// Arguments handed to a filter handler. `old`/`new` are the pre-mutation
/// occupant and the incoming value, where each applies.
pub struct FilterArgs<'a, T> {
    pub index: usize,
    pub old: Option<&'a T>,
    pub new: Option<&'a T>,
}

/// Arguments handed to a notice handler.
pub struct NoticeArgs<'a, T> {
    pub index: usize,
    pub old: Option<&'a T>,
    pub new: Option<&'a T>,
}

/// Handle for removing a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookId(usize);

type FilterFn<T> = Box<dyn Fn(&FilterArgs<'_, T>) -> bool>;
type NoticeFn<T> = Box<dyn Fn(&NoticeArgs<'_, T>)>;

struct Hooks<T> {
    next_id: usize,
    filters: Vec<(HookId, Filter, FilterFn<T>)>,
    notices: Vec<(HookId, Notice, NoticeFn<T>)>,
}

impl<T> Hooks<T> {
    fn new() -> Self {
        Hooks {
            next_id: 0,
            filters: Vec::new(),
            notices: Vec::new(),
        }
    }
}

// =============================================================================
// ChildList
// =============================================================================

/// Internal tag for which insert primitive ran, so the right
/// operation-specific notices fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InsertOp {
    Push,
    Unshift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoveOp {
    Pop,
    Shift,
    At,
}

pub struct ChildList<T> {
    items: Vec<T>,
    hooks: Hooks<T>,
}

impl<T> ChildList<T> {
    pub fn new() -> Self {
        ChildList {
            items: Vec::new(),
            hooks: Hooks::new(),
        }
    }

    // =========================================================================
    // Hook registration
    // =========================================================================

    pub fn on_filter<F>(&mut self, kind: Filter, handler: F) -> HookId
    where
        F: Fn(&FilterArgs<'_, T>) -> bool + 'static,
    {
        let id = HookId(self.hooks.next_id);
        self.hooks.next_id += 1;
        self.hooks.filters.push((id, kind, Box::new(handler)));
        id
    }

    pub fn on_notice<F>(&mut self, kind: Notice, handler: F) -> HookId
    where
        F: Fn(&NoticeArgs<'_, T>) + 'static,
    {
        let id = HookId(self.hooks.next_id);
        self.hooks.next_id += 1;
        self.hooks.notices.push((id, kind, Box::new(handler)));
        id
    }

    /// Remove a handler by id. Unknown ids are a no-op.
    pub fn off(&mut self, id: HookId) {
        self.hooks.filters.retain(|(hid, _, _)| *hid != id);
        self.hooks.notices.retain(|(hid, _, _)| *hid != id);
    }

    fn admit(&self, kind: Filter, args: &FilterArgs<'_, T>) -> bool {
        self.hooks
            .filters
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .all(|(_, _, f)| f(args))
    }

    fn notify(&self, kind: Notice, args: &NoticeArgs<'_, T>) {
        for (_, k, f) in &self.hooks.notices {
            if *k == kind {
                f(args);
            }
        }
    }

    // =========================================================================
    // Staged primitives (mutation without notices)
    // =========================================================================

    /// Run input filters and append. Returns the insertion index, or `None`
    /// on rejection. Callers must follow up with [`notify_inserted`].
    pub(crate) fn stage_push(&mut self, item: T) -> Option<usize> {
        let index = self.items.len();
        let args = FilterArgs { index, old: None, new: Some(&item) };
        if !self.admit(Filter::Input, &args) || !self.admit(Filter::InputPush, &args) {
            return None;
        }
        self.items.push(item);
        Some(index)
    }

    /// Run input filters and prepend. Returns index 0, or `None` on
    /// rejection.
    pub(crate) fn stage_unshift(&mut self, item: T) -> Option<usize> {
        let args = FilterArgs { index: 0, old: None, new: Some(&item) };
        if !self.admit(Filter::Input, &args) || !self.admit(Filter::InputUnshift, &args) {
            return None;
        }
        self.items.insert(0, item);
        Some(0)
    }

    /// Run output filters and remove the entry at `index` (already bounds
    /// checked by the caller). Returns the removed item, or `None` on
    /// rejection.
    pub(crate) fn stage_remove(&mut self, index: usize, op: RemoveOp) -> Option<T> {
        let args = FilterArgs { index, old: Some(&self.items[index]), new: None };
        if !self.admit(Filter::Output, &args) {
            return None;
        }
        let specific = match op {
            RemoveOp::Pop => Some(Filter::OutputPop),
            RemoveOp::Shift => Some(Filter::OutputShift),
            RemoveOp::At => None,
        };
        if let Some(kind) = specific {
            if !self.admit(kind, &args) {
                return None;
            }
        }
        Some(self.items.remove(index))
    }

    pub(crate) fn notify_inserted(&self, index: usize, op: InsertOp) {
        let args = NoticeArgs { index, old: None, new: self.items.get(index) };
        match op {
            InsertOp::Push => self.notify(Notice::InsertPush, &args),
            InsertOp::Unshift => self.notify(Notice::InsertUnshift, &args),
        }
        self.notify(Notice::Insert, &args);
    }

    pub(crate) fn notify_removed(&self, index: usize, op: RemoveOp) {
        let args = NoticeArgs { index, old: None, new: None };
        match op {
            RemoveOp::Pop => self.notify(Notice::RemovePop, &args),
            RemoveOp::Shift => self.notify(Notice::RemoveShift, &args),
            RemoveOp::At => {}
        }
        self.notify(Notice::Remove, &args);
    }

    // =========================================================================
    // Commit-style primitives
    // =========================================================================

    /// Append an item. Returns `false` if a filter rejected it.
    pub fn push(&mut self, item: T) -> bool {
        match self.stage_push(item) {
            Some(index) => {
                self.notify_inserted(index, InsertOp::Push);
                true
            }
            None => false,
        }
    }

    /// Remove and return the last item. `None` when empty or rejected.
    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let index = self.items.len() - 1;
        let item = self.stage_remove(index, RemoveOp::Pop)?;
        self.notify_removed(index, RemoveOp::Pop);
        Some(item)
    }

    /// Prepend an item. Returns `false` if a filter rejected it.
    pub fn unshift(&mut self, item: T) -> bool {
        match self.stage_unshift(item) {
            Some(index) => {
                self.notify_inserted(index, InsertOp::Unshift);
                true
            }
            None => false,
        }
    }

    /// Remove and return the first item. `None` when empty or rejected.
    pub fn shift(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let item = self.stage_remove(0, RemoveOp::Shift)?;
        self.notify_removed(0, RemoveOp::Shift);
        Some(item)
    }

    /// Remove the entry at `index`. `Ok(None)` signals filter rejection.
    pub fn remove_at(&mut self, index: usize) -> Result<Option<T>> {
        if index >= self.items.len() {
            return Err(Error::IndexOutOfBounds { index, len: self.items.len() });
        }
        match self.stage_remove(index, RemoveOp::At) {
            Some(item) => {
                self.notify_removed(index, RemoveOp::At);
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    /// Remove the first entry matching the predicate.
    pub fn remove_matching<F>(&mut self, pred: F) -> Option<T>
    where
        F: Fn(usize, &T) -> bool,
    {
        let index = self
            .items
            .iter()
            .enumerate()
            .position(|(i, item)| pred(i, item))?;
        let item = self.stage_remove(index, RemoveOp::At)?;
        self.notify_removed(index, RemoveOp::At);
        Some(item)
    }

    /// Remove every entry matching the predicate. All output filters run
    /// against pre-mutation state; one rejection aborts the whole batch.
    pub fn remove_all_matching<F>(&mut self, pred: F) -> Option<Vec<T>>
    where
        F: Fn(usize, &T) -> bool,
    {
        let marks: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(i, item)| pred(*i, item))
            .map(|(i, _)| i)
            .collect();
        if marks.is_empty() {
            return Some(Vec::new());
        }
        for &index in &marks {
            let args = FilterArgs { index, old: Some(&self.items[index]), new: None };
            if !self.admit(Filter::Output, &args) {
                return None;
            }
        }
        let mut removed = Vec::with_capacity(marks.len());
        for &index in marks.iter().rev() {
            removed.push(self.items.remove(index));
            self.notify_removed(index, RemoveOp::At);
        }
        removed.reverse();
        Some(removed)
    }

    /// Replace the entry at `index`. `Ok(false)` signals filter rejection.
    pub fn replace_at(&mut self, index: usize, value: T) -> Result<bool> {
        if index >= self.items.len() {
            return Err(Error::IndexOutOfBounds { index, len: self.items.len() });
        }
        let args = FilterArgs { index, old: Some(&self.items[index]), new: Some(&value) };
        if !self.admit(Filter::Input, &args) {
            return Ok(false);
        }
        let old = std::mem::replace(&mut self.items[index], value);
        let notice = NoticeArgs { index, old: Some(&old), new: Some(&self.items[index]) };
        self.notify(Notice::Change, &notice);
        Ok(true)
    }

    /// Commit-style map: compute every replacement, run every input filter,
    /// then commit all of them. One rejection aborts with no mutation.
    pub fn map_transform<F>(&mut self, map: F) -> bool
    where
        F: Fn(usize, &T) -> T,
    {
        let replacements: Vec<T> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| map(i, item))
            .collect();
        for (index, value) in replacements.iter().enumerate() {
            let args = FilterArgs { index, old: Some(&self.items[index]), new: Some(value) };
            if !self.admit(Filter::Input, &args) {
                return false;
            }
        }
        for (index, value) in replacements.into_iter().enumerate() {
            let old = std::mem::replace(&mut self.items[index], value);
            let notice = NoticeArgs { index, old: Some(&old), new: Some(&self.items[index]) };
            self.notify(Notice::Change, &notice);
        }
        true
    }

    /// Remove everything. All output filters run first; one rejection
    /// aborts with no mutation. Items drain front to back.
    pub fn clear(&mut self) -> Option<Vec<T>> {
        for (index, item) in self.items.iter().enumerate() {
            let args = FilterArgs { index, old: Some(item), new: None };
            if !self.admit(Filter::Output, &args) {
                return None;
            }
        }
        let mut removed = Vec::with_capacity(self.items.len());
        while !self.items.is_empty() {
            removed.push(self.items.remove(0));
            self.notify_removed(0, RemoveOp::At);
        }
        Some(removed)
    }

    /// Take every item, bypassing filters and notices. Disposal path only;
    /// teardown is not cancelable.
    pub(crate) fn drain_all(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    // =========================================================================
    // Access
    // =========================================================================

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&T> {
        self.items.get(index).ok_or(Error::IndexOutOfBounds {
            index,
            len: self.items.len(),
        })
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn peek_first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn peek_last(&self) -> Option<&T> {
        self.items.last()
    }

    /// First index at or after `start` matching the predicate.
    pub fn find_index<F>(&self, start: usize, pred: F) -> Option<usize>
    where
        F: Fn(usize, &T) -> bool,
    {
        self.items
            .iter()
            .enumerate()
            .skip(start)
            .find(|(i, item)| pred(*i, item))
            .map(|(i, _)| i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> Default for ChildList<T> {
    fn default() -> Self {
        ChildList::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_push_pop_order() {
        let mut list: ChildList<i32> = ChildList::new();
        assert!(list.push(1));
        assert!(list.push(2));
        assert!(list.unshift(0));
        assert_eq!(list.count(), 3);
        assert_eq!(*list.get(0).unwrap(), 0);
        assert_eq!(list.pop(), Some(2));
        assert_eq!(list.shift(), Some(0));
        assert_eq!(list.count(), 1);
    }

    #[test]
    fn test_input_filter_rejection_is_atomic() {
        let mut list: ChildList<i32> = ChildList::new();
        let inserted = Rc::new(RefCell::new(Vec::new()));
        let log = inserted.clone();
        list.on_notice(Notice::Insert, move |args| {
            log.borrow_mut().push(args.index);
        });
        list.on_filter(Filter::InputPush, |args| *args.new.unwrap() != 13);

        assert!(list.push(1));
        assert!(!list.push(13));
        assert_eq!(list.count(), 1);
        assert_eq!(*inserted.borrow(), vec![0]);
    }

    #[test]
    fn test_output_filter_blocks_removal() {
        let mut list: ChildList<i32> = ChildList::new();
        list.push(1);
        list.push(2);
        list.on_filter(Filter::Output, |args| *args.old.unwrap() != 1);

        assert_eq!(list.pop(), Some(2));
        assert_eq!(list.pop(), None);
        assert_eq!(list.count(), 1);
        assert_eq!(list.clear(), None);
        assert_eq!(list.count(), 1);
    }

    #[test]
    fn test_remove_at_bounds() {
        let mut list: ChildList<i32> = ChildList::new();
        list.push(5);
        assert!(matches!(
            list.remove_at(3),
            Err(Error::IndexOutOfBounds { index: 3, len: 1 })
        ));
        assert_eq!(list.remove_at(0).unwrap(), Some(5));
        assert_eq!(list.count(), 0);
    }

    #[test]
    fn test_remove_at_removes_single_entry() {
        let mut list: ChildList<i32> = ChildList::new();
        list.push(1);
        list.push(2);
        list.push(3);
        assert_eq!(list.remove_at(1).unwrap(), Some(2));
        assert_eq!(list.count(), 2);
        assert_eq!(*list.get(1).unwrap(), 3);
    }

    #[test]
    fn test_remove_all_matching_atomic() {
        let mut list: ChildList<i32> = ChildList::new();
        for n in [1, 2, 3, 2, 4] {
            list.push(n);
        }
        let removed = list.remove_all_matching(|_, v| *v == 2).unwrap();
        assert_eq!(removed, vec![2, 2]);
        assert_eq!(list.count(), 3);

        list.on_filter(Filter::Output, |_| false);
        assert_eq!(list.remove_all_matching(|_, v| *v == 3), None);
        assert_eq!(list.count(), 3);
    }

    #[test]
    fn test_map_transform_commit() {
        let mut list: ChildList<i32> = ChildList::new();
        list.push(1);
        list.push(2);
        let changes = Rc::new(RefCell::new(0));
        let seen = changes.clone();
        list.on_notice(Notice::Change, move |_| {
            *seen.borrow_mut() += 1;
        });
        assert!(list.map_transform(|_, v| v * 10));
        assert_eq!(*list.get(0).unwrap(), 10);
        assert_eq!(*list.get(1).unwrap(), 20);
        assert_eq!(*changes.borrow(), 2);
    }

    #[test]
    fn test_map_transform_rejection_keeps_all() {
        let mut list: ChildList<i32> = ChildList::new();
        list.push(1);
        list.push(2);
        list.on_filter(Filter::Input, |args| *args.new.unwrap() < 15);
        assert!(!list.map_transform(|_, v| v * 10));
        assert_eq!(*list.get(0).unwrap(), 1);
        assert_eq!(*list.get(1).unwrap(), 2);
    }

    #[test]
    fn test_off_removes_handler() {
        let mut list: ChildList<i32> = ChildList::new();
        let id = list.on_filter(Filter::Input, |_| false);
        assert!(!list.push(1));
        list.off(id);
        assert!(list.push(1));
    }

    #[test]
    fn test_replace_at_change_notice() {
        let mut list: ChildList<i32> = ChildList::new();
        list.push(7);
        let seen = Rc::new(RefCell::new((0, 0)));
        let sink = seen.clone();
        list.on_notice(Notice::Change, move |args| {
            *sink.borrow_mut() = (*args.old.unwrap(), *args.new.unwrap());
        });
        assert!(list.replace_at(0, 9).unwrap());
        assert_eq!(*seen.borrow(), (7, 9));
    }

    #[test]
    fn test_find_index() {
        let mut list: ChildList<i32> = ChildList::new();
        for n in [10, 20, 30, 20] {
            list.push(n);
        }
        assert_eq!(list.find_index(0, |_, v| *v == 20), Some(1));
        assert_eq!(list.find_index(2, |_, v| *v == 20), Some(3));
        assert_eq!(list.find_index(0, |_, v| *v == 99), None);
    }
}
