use super::{ConfigError, ExecInvariantViolation};

use ndarray::{Array1, ArrayView1, ArrayViewMut1};

/// Adapter trait for reading contiguous 1D input.
pub trait Read1D<T> {
    /// Borrow the underlying input as a contiguous slice.
    fn read_slice(&self) -> Result<&[T], ConfigError>;
}

/// Adapter trait for writing contiguous 1D output of a fixed length.
pub trait Write1D<T> {
    /// Borrow the underlying output as a mutable contiguous slice.
    fn write_slice_mut(&mut self) -> Result<&mut [T], ConfigError>;
}

/// Adapter trait for outputs the callee must populate from scratch.
///
/// The container has to be empty on entry; a populated container is
/// rejected with [`ExecInvariantViolation::UnexpectedNonNull`] so the
/// caller never loses data it still owns.
pub trait Fresh1D<T> {
    /// Check the container is empty without touching it.
    fn ensure_fresh(&self, arg: &'static str) -> Result<(), ExecInvariantViolation>;

    /// Allocate `len` elements set to `fill` and borrow them mutably.
    fn fill_fresh(
        &mut self,
        arg: &'static str,
        len: usize,
        fill: T,
    ) -> Result<&mut [T], ExecInvariantViolation>;
}

/// Reserve exactly `len` elements, reporting failure as a config error.
pub(crate) fn try_alloc<T: Clone>(
    arg: &'static str,
    len: usize,
    fill: T,
) -> Result<Vec<T>, ConfigError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| ConfigError::AllocationFailure { arg, elements: len })?;
    buf.resize(len, fill);
    Ok(buf)
}

impl<T> Read1D<T> for [T] {
    fn read_slice(&self) -> Result<&[T], ConfigError> {
        Ok(self)
    }
}

impl<T> Write1D<T> for [T] {
    fn write_slice_mut(&mut self) -> Result<&mut [T], ConfigError> {
        Ok(self)
    }
}

impl<T, const N: usize> Read1D<T> for [T; N] {
    fn read_slice(&self) -> Result<&[T], ConfigError> {
        Ok(self)
    }
}

impl<T, const N: usize> Write1D<T> for [T; N] {
    fn write_slice_mut(&mut self) -> Result<&mut [T], ConfigError> {
        Ok(self)
    }
}

impl<T> Read1D<T> for Vec<T> {
    fn read_slice(&self) -> Result<&[T], ConfigError> {
        Ok(self.as_slice())
    }
}

impl<T> Write1D<T> for Vec<T> {
    fn write_slice_mut(&mut self) -> Result<&mut [T], ConfigError> {
        Ok(self.as_mut_slice())
    }
}

impl<T> Read1D<T> for Array1<T> {
    fn read_slice(&self) -> Result<&[T], ConfigError> {
        self.as_slice()
            .ok_or(ConfigError::NonContiguous { arg: "array" })
    }
}

impl<T> Write1D<T> for Array1<T> {
    fn write_slice_mut(&mut self) -> Result<&mut [T], ConfigError> {
        self.as_slice_mut()
            .ok_or(ConfigError::NonContiguous { arg: "array" })
    }
}

impl<'a, T> Read1D<T> for ArrayView1<'a, T> {
    fn read_slice(&self) -> Result<&[T], ConfigError> {
        self.as_slice()
            .ok_or(ConfigError::NonContiguous { arg: "array_view" })
    }
}

impl<'a, T> Write1D<T> for ArrayViewMut1<'a, T> {
    fn write_slice_mut(&mut self) -> Result<&mut [T], ConfigError> {
        self.as_slice_mut().ok_or(ConfigError::NonContiguous {
            arg: "array_view_mut",
        })
    }
}

impl<T: Clone> Fresh1D<T> for Vec<T> {
    fn ensure_fresh(&self, arg: &'static str) -> Result<(), ExecInvariantViolation> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ExecInvariantViolation::UnexpectedNonNull { arg })
        }
    }

    fn fill_fresh(
        &mut self,
        arg: &'static str,
        len: usize,
        fill: T,
    ) -> Result<&mut [T], ExecInvariantViolation> {
        self.ensure_fresh(arg)?;
        *self = try_alloc(arg, len, fill)?;
        Ok(self.as_mut_slice())
    }
}

impl<T: Clone> Fresh1D<T> for Option<Vec<T>> {
    fn ensure_fresh(&self, arg: &'static str) -> Result<(), ExecInvariantViolation> {
        match self {
            None => Ok(()),
            Some(_) => Err(ExecInvariantViolation::UnexpectedNonNull { arg }),
        }
    }

    fn fill_fresh(
        &mut self,
        arg: &'static str,
        len: usize,
        fill: T,
    ) -> Result<&mut [T], ExecInvariantViolation> {
        self.ensure_fresh(arg)?;
        let buf = try_alloc(arg, len, fill)?;
        Ok(self.insert(buf).as_mut_slice())
    }
}
