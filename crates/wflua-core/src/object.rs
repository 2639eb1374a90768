//! Object identity.

use std::ffi::c_void;
use std::fmt;

/// Identity of a compositor object.
///
/// This is the object's address, valid as an identifier for as long as the
/// compositor keeps the object alive. The bridge never dereferences it; it is
/// only compared, hashed and handed back to the host.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);

impl ObjectId {
    /// Wrap a raw object pointer. Returns `None` for null.
    pub fn from_ptr<T>(ptr: *const T) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self(ptr as usize))
        }
    }

    /// The raw address, for handing back across the C ABI.
    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    /// Get the raw address.
    pub fn addr(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({:#x})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Convert an optional object into a (possibly null) raw pointer.
pub fn opt_ptr<T>(object: Option<ObjectId>) -> *mut T {
    object.map_or(std::ptr::null_mut(), |o| o.as_ptr().cast())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_none() {
        assert_eq!(ObjectId::from_ptr(std::ptr::null::<u8>()), None);
    }

    #[test]
    fn test_pointer_roundtrip_keeps_address() {
        let value = 7u32;
        let id = ObjectId::from_ptr(&value as *const u32).unwrap();
        assert_eq!(id.as_ptr() as usize, &value as *const u32 as usize);
        assert_eq!(format!("{id:?}"), format!("ObjectId({:#x})", id.addr()));
    }

    #[test]
    fn test_opt_ptr() {
        assert!(opt_ptr::<u8>(None).is_null());
        assert_eq!(opt_ptr::<u8>(Some(ObjectId(0x40))) as usize, 0x40);
    }
}
