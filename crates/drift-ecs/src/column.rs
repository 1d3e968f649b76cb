//! Type-erased, fixed-capacity component columns.
//!
//! A [`ComponentStore`](crate::store::ComponentStore) keeps one column per
//! component type. Columns are held as `Box<dyn ErasedColumn>` so a store can
//! push defaults and swap-remove rows without knowing the concrete types; the
//! typed view is recovered with [`ErasedColumn::as_any`] and a downcast to
//! [`TypedColumn<T>`].

use std::any::Any;

use crate::component::Component;
use crate::EcsError;

/// Operations a store needs on a column without knowing its element type.
pub trait ErasedColumn: Send + Sync {
    /// Number of live elements.
    fn len(&self) -> usize;

    /// Whether the column holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed number of elements the column may hold.
    fn capacity(&self) -> usize;

    /// Append the element type's default value.
    fn push_default(&mut self) -> Result<(), EcsError>;

    /// Append a boxed value. Fails if the box holds a different type.
    fn push_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), EcsError>;

    /// Move the last element into `row` and shrink by one. Removing the last
    /// row is a plain pop.
    fn swap_remove(&mut self, row: usize);

    /// Drop every element past `len`.
    fn truncate(&mut self, len: usize);

    /// `std::any::type_name` of the element type, for diagnostics.
    fn element_type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A densely packed, fixed-capacity array of one component type.
#[derive(Debug)]
pub struct TypedColumn<T> {
    data: Vec<T>,
    capacity: usize,
}

impl<T: Component> TypedColumn<T> {
    /// Pre-allocate room for `capacity` elements. The column never grows.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value.
    pub fn push(&mut self, value: T) -> Result<(), EcsError> {
        if self.data.len() >= self.capacity {
            return Err(EcsError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.data.push(value);
        Ok(())
    }

    /// Live elements as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Live elements as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    fn unbox(value: Box<dyn Any + Send>) -> Result<T, EcsError> {
        value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| EcsError::ComponentTypeMismatch {
                expected: std::any::type_name::<T>(),
            })
    }
}

impl<T: Component> ErasedColumn for TypedColumn<T> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn push_default(&mut self) -> Result<(), EcsError> {
        self.push(T::default())
    }

    fn push_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), EcsError> {
        let value = Self::unbox(value)?;
        self.push(value)
    }

    fn swap_remove(&mut self, row: usize) {
        self.data.swap_remove(row);
    }

    fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    fn element_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
