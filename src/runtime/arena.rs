use std::fmt::Debug;

use crate::program::{Body, Operation};

/// The `Arena` owns every body and operation of a program and hands out
/// indices into them. Allocation is done using [`Arena::alloc`] and
/// [`Arena::alloc_operations`], and values are read back with [`Arena::get`].
///
/// Nothing in the arena changes once the program is built, so it is shared
/// read-only by every concurrent invocation.
#[derive(Default, Debug)]
pub struct Arena {
    bodies: Vec<Body>,
    operations: Vec<Operation>,
}

impl Arena {
    pub fn get<T: Indexable + ?Sized>(&self, index: Index<T>) -> &T {
        T::get(self, index)
    }
    pub fn alloc<T: Indexable>(&mut self, data: T) -> Index<T> {
        T::alloc(self, data)
    }
    /// Operations of one body are stored contiguously.
    pub fn alloc_operations(&mut self, data: Vec<Operation>) -> Index<[Operation]> {
        let start = self.operations.len();
        let len = data.len();
        self.operations.extend(data);
        Index((start, len))
    }
}

pub struct Index<T: Indexable + ?Sized>(T::Store);

/// The `Indexable` trait is implemented by all types that are contained by an `Arena`.
/// Its [`Indexable::Store`] is what is needed to find a value again: an offset for
/// sized values, and an offset/length pair for slices.
pub trait Indexable {
    type Store: Copy;
    fn get(store: &Arena, index: Index<Self>) -> &Self;
    fn alloc(store: &mut Arena, data: Self) -> Index<Self>
    where
        Self: Sized;
}

impl Indexable for Body {
    type Store = usize;
    fn get(store: &Arena, index: Index<Self>) -> &Self {
        &store.bodies[index.0]
    }
    fn alloc(store: &mut Arena, data: Self) -> Index<Self> {
        store.bodies.push(data);
        Index(store.bodies.len() - 1)
    }
}

impl Indexable for [Operation] {
    type Store = (usize, usize);
    fn get(store: &Arena, index: Index<Self>) -> &Self {
        &store.operations[index.0 .0..index.0 .0 + index.0 .1]
    }
}

impl<T: Indexable + ?Sized> Clone for Index<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: Indexable + ?Sized> Copy for Index<T> {}
impl<T: Indexable + ?Sized> PartialEq for Index<T>
where
    T::Store: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl<T: Indexable + ?Sized> Eq for Index<T> where T::Store: Eq {}
impl<T: Indexable + ?Sized> Debug for Index<T>
where
    T::Store: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
