//! Constants.
//!
//! The constant pool defined here deduplicates large constants (e.g. SIMD
//! literals) referenced from instructions; the machine backends later place
//! the pooled bytes into emitted constant islands.

use crate::entity::PrimaryMap;
use crate::fx::FxHashMap;
use crate::ir::Constant;
use core::fmt;
use core::iter::FromIterator;
use core::slice::Iter;

/// This type describes the actual constant data.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ConstantData(Vec<u8>);

impl FromIterator<u8> for ConstantData {
    fn from_iter<T: IntoIterator<Item = u8>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<u8>> for ConstantData {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<&[u8]> for ConstantData {
    fn from(v: &[u8]) -> Self {
        Self(v.to_vec())
    }
}

impl From<u128> for ConstantData {
    fn from(v: u128) -> Self {
        Self(v.to_le_bytes().to_vec())
    }
}

impl ConstantData {
    /// Return the number of bytes in the constant.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the constant contains any bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return the data as a slice.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Iterate over the constant's bytes.
    pub fn iter(&self) -> Iter<u8> {
        self.0.iter()
    }

    /// Add new bytes to the constant data.
    pub fn append(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        let mut to_add = bytes.into();
        self.0.append(&mut to_add);
        self
    }

    /// Expand the size of the constant data to `expected_size` number of
    /// bytes by adding zeroes in the high-order byte slots.
    pub fn expand_to(mut self, expected_size: usize) -> Self {
        assert!(
            self.len() <= expected_size,
            "constant data is already {} bytes",
            self.len()
        );
        self.0.resize(expected_size, 0);
        self
    }
}

impl fmt::Display for ConstantData {
    /// Print the constant data in hexadecimal format, e.g. 0x000102.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.is_empty() {
            write!(f, "0x")?;
            for b in self.0.iter().rev() {
                write!(f, "{:02x}", b)?;
            }
        }
        Ok(())
    }
}

/// Maintains the mapping between a constant handle (i.e. `Constant`) and
/// its constant data (i.e. `ConstantData`).
#[derive(Clone, Default)]
pub struct ConstantPool {
    /// This mapping maintains the insertion order as long as Constants are
    /// created with sequentially increasing integers.
    handles_to_values: PrimaryMap<Constant, ConstantData>,

    /// Exists to avoid inserting duplicate values.
    values_to_handles: FxHashMap<ConstantData, Constant>,
}

impl ConstantPool {
    /// Create a new constant pool instance.
    pub fn new() -> Self {
        Default::default()
    }

    /// Empty the constant pool of all data.
    pub fn clear(&mut self) {
        self.handles_to_values.clear();
        self.values_to_handles.clear();
    }

    /// Insert constant data into the pool, returning a handle for later
    /// referencing; when constant data is inserted that is a duplicate of
    /// previous constant data, the existing handle will be returned.
    pub fn insert(&mut self, constant_value: ConstantData) -> Constant {
        if let Some(cst) = self.values_to_handles.get(&constant_value) {
            return *cst;
        }
        let constant_handle = self.handles_to_values.push(constant_value.clone());
        self.values_to_handles
            .insert(constant_value, constant_handle);
        constant_handle
    }

    /// Retrieve the constant data given a handle.
    pub fn get(&self, constant_handle: Constant) -> &ConstantData {
        assert!(self.handles_to_values.is_valid(constant_handle));
        &self.handles_to_values[constant_handle]
    }

    /// Iterate over the constants in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Constant, &ConstantData)> {
        self.handles_to_values.iter()
    }

    /// Return the number of constants in the pool.
    pub fn len(&self) -> usize {
        self.handles_to_values.len()
    }

    /// Return the combined size of all of the constant values in the pool.
    pub fn byte_size(&self) -> usize {
        self.handles_to_values.values().map(|c| c.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut pool = ConstantPool::new();
        let data: ConstantData = vec![1u8, 2, 3, 4].into();
        let handle = pool.insert(data.clone());
        assert_eq!(pool.get(handle), &data);
    }

    #[test]
    fn deduplication() {
        let mut pool = ConstantPool::new();
        let a = pool.insert(vec![7u8; 16].into());
        let b = pool.insert(vec![9u8; 16].into());
        let c = pool.insert(vec![7u8; 16].into());
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.byte_size(), 32);
    }

    #[test]
    fn display() {
        let data: ConstantData = vec![0x01u8, 0x02, 0x03].into();
        assert_eq!(data.to_string(), "0x030201");
        let expanded = data.expand_to(4);
        assert_eq!(expanded.to_string(), "0x00030201");
    }
}
