// kestrel-vm - Interned strings
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Interned, immutable strings.
//!
//! # Interning
//!
//! Every Kestrel string is interned through a process-wide table, so two
//! strings with the same bytes share one underlying allocation. This gives:
//!
//! - **O(1) equality**: comparing strings is a pointer comparison
//! - **O(1) hashing**: the FNV-1a hash is computed once, at creation
//! - **Memory efficiency**: identical strings share storage
//!
//! The VM relies on this: its equality opcode compares string values by
//! identity, which is sound only because byte-equal strings are canonical.
//!
//! # Memory behaviour
//!
//! Interned strings are never deallocated. The table holds strong references
//! (`Arc`) to every string created during the program's lifetime, so memory
//! grows monotonically with distinct string contents. Scripts that
//! concatenate many unique strings will accumulate them; typical programs
//! use a bounded set of literals and identifiers.
//!
//! # Thread safety
//!
//! The table is protected by a `Mutex`, so creation is thread-safe and
//! involves lock acquisition. Lookup and comparison after creation are
//! lock-free.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, OnceLock};

const FNV_OFFSET_BASIS: u32 = 2166136261;
const FNV_PRIME: u32 = 16777619;

/// FNV-1a over a byte slice.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// An interned, immutable string.
///
/// Two `IStr`s with the same bytes share the same underlying storage;
/// equality and hashing go through the canonical instance.
#[derive(Clone)]
pub struct IStr {
    inner: Arc<StrInner>,
}

struct StrInner {
    /// FNV-1a hash of the bytes, computed at creation.
    hash: u32,
    text: Box<str>,
}

static STRING_INTERNER: OnceLock<Mutex<HashMap<String, Arc<StrInner>>>> = OnceLock::new();

fn interner() -> &'static Mutex<HashMap<String, Arc<StrInner>>> {
    STRING_INTERNER.get_or_init(|| Mutex::new(HashMap::new()))
}

impl IStr {
    /// Intern a borrowed string, copying it if no canonical instance exists.
    pub fn intern(text: &str) -> IStr {
        let mut table = interner()
            .lock()
            .expect("string interner mutex poisoned: another thread panicked while interning");
        if let Some(existing) = table.get(text) {
            return IStr {
                inner: Arc::clone(existing),
            };
        }
        let inner = Arc::new(StrInner {
            hash: fnv1a(text.as_bytes()),
            text: Box::from(text),
        });
        table.insert(text.to_string(), Arc::clone(&inner));
        IStr { inner }
    }

    /// Intern an owned buffer, dropping it when a canonical instance
    /// already exists. Used for computed strings such as concatenations.
    pub fn intern_owned(text: String) -> IStr {
        let mut table = interner()
            .lock()
            .expect("string interner mutex poisoned: another thread panicked while interning");
        if let Some(existing) = table.get(text.as_str()) {
            return IStr {
                inner: Arc::clone(existing),
            };
        }
        let inner = Arc::new(StrInner {
            hash: fnv1a(text.as_bytes()),
            text: text.as_str().into(),
        });
        table.insert(text, Arc::clone(&inner));
        IStr { inner }
    }

    /// The string contents.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.inner.text
    }

    /// Byte length of the string.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.text.len()
    }

    /// Whether the string is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.text.is_empty()
    }

    /// The stored FNV-1a hash of the bytes.
    #[must_use]
    pub fn hash_value(&self) -> u32 {
        self.inner.hash
    }
}

impl fmt::Display for IStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.text)
    }
}

impl fmt::Debug for IStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IStr({:?})", &*self.inner.text)
    }
}

impl PartialEq for IStr {
    fn eq(&self, other: &Self) -> bool {
        // Due to interning, pointer comparison is sufficient
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for IStr {}

impl Hash for IStr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.inner.hash);
    }
}

// ============================================================================
// Tests
// ============================================================================
