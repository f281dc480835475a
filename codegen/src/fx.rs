//! Fast, deterministic hash containers.
//!
//! The compiler must produce identical output for identical input, so all
//! hash containers use the FxHash function with a fixed seed rather than
//! std's randomly-keyed SipHash.

use core::hash::BuildHasherDefault;
use rustc_hash::FxHasher;
use std::collections::{HashMap, HashSet};

/// A HashMap using the deterministic Fx hash function.
pub type FxHashMap<K, V> = HashMap<K, V, BuildHasherDefault<FxHasher>>;

/// A HashSet using the deterministic Fx hash function.
pub type FxHashSet<V> = HashSet<V, BuildHasherDefault<FxHasher>>;
