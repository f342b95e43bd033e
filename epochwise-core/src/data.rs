//! Data source contract: a source hands out one fresh iterator per epoch.

use std::ops::Range;

/// Something that can be iterated once per epoch.
///
/// The loop driver calls [`DataSource::iter`] exactly once at the start of
/// every epoch and consumes the iterator sequentially. Exhaustion (`None`)
/// is the normal end-of-epoch signal.
pub trait DataSource {
    type Batch;
    type Iter<'a>: Iterator<Item = Self::Batch>
    where
        Self: 'a;

    fn iter(&self) -> Self::Iter<'_>;
}

impl<T: Clone> DataSource for Vec<T> {
    type Batch = T;
    type Iter<'a>
        = std::iter::Cloned<std::slice::Iter<'a, T>>
    where
        Self: 'a;

    fn iter(&self) -> Self::Iter<'_> {
        self.as_slice().iter().cloned()
    }
}

impl<T: Clone> DataSource for [T] {
    type Batch = T;
    type Iter<'a>
        = std::iter::Cloned<std::slice::Iter<'a, T>>
    where
        Self: 'a;

    fn iter(&self) -> Self::Iter<'_> {
        <[T]>::iter(self).cloned()
    }
}

impl<A> DataSource for Range<A>
where
    Range<A>: Iterator<Item = A> + Clone,
{
    type Batch = A;
    type Iter<'a>
        = Range<A>
    where
        Self: 'a;

    fn iter(&self) -> Self::Iter<'_> {
        self.clone()
    }
}

/// Data source backed by a closure that builds a new iterable every epoch.
pub struct FromFn<F>(F);

/// Wrap a closure as a [`DataSource`]. The closure runs once per epoch.
pub fn from_fn<F, I>(f: F) -> FromFn<F>
where
    F: Fn() -> I,
    I: IntoIterator,
{
    FromFn(f)
}

impl<F, I> DataSource for FromFn<F>
where
    F: Fn() -> I,
    I: IntoIterator,
{
    type Batch = I::Item;
    type Iter<'a>
        = I::IntoIter
    where
        Self: 'a;

    fn iter(&self) -> Self::Iter<'_> {
        (self.0)().into_iter()
    }
}
