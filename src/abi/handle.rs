//! Opaque native handles.
//!
//! A handle is an address the foreign side gave us or expects back. This
//! layer compares and copies handles but never dereferences them.

use std::fmt;
use std::num::NonZeroU64;

use super::MarshalError;

/// Width of a pointer or handle on the supported targets.
pub const POINTER_SIZE: usize = 8;

/// An opaque native address. Zero is [`NativeHandle::NULL`], the valid
/// "absent" value. An uninitialized handle slot is `Option::<NativeHandle>::None`.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NativeHandle(u64);

impl NativeHandle {
    pub const NULL: Self = Self(0);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The address, or [`MarshalError::NullHandle`] for the null handle.
    ///
    /// Callers that are about to hand the address to something that will
    /// dereference it go through here.
    pub fn resolve(self) -> Result<NonZeroU64, MarshalError> {
        NonZeroU64::new(self.0).ok_or(MarshalError::NullHandle)
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("NativeHandle(NULL)")
        } else {
            write!(f, "NativeHandle({:#x})", self.0)
        }
    }
}

impl fmt::Pointer for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for NativeHandle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<NativeHandle> for u64 {
    fn from(handle: NativeHandle) -> Self {
        handle.0
    }
}

/// Declare a typed handle that converts to and from [`NativeHandle`].
///
/// ```ignore
/// native_marshal::define_handle!(
///     /// A logical device.
///     Device
/// );
/// let device = Device::NULL;
/// ```
#[macro_export]
macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::abi::NativeHandle);

        impl $name {
            pub const NULL: Self = Self($crate::abi::NativeHandle::NULL);

            pub const fn from_raw(raw: u64) -> Self {
                Self($crate::abi::NativeHandle::from_raw(raw))
            }

            pub const fn as_raw(self) -> u64 {
                self.0.as_raw()
            }

            pub const fn is_null(self) -> bool {
                self.0.is_null()
            }
        }

        impl From<$crate::abi::NativeHandle> for $name {
            fn from(handle: $crate::abi::NativeHandle) -> Self {
                Self(handle)
            }
        }

        impl From<$name> for $crate::abi::NativeHandle {
            fn from(handle: $name) -> Self {
                handle.0
            }
        }

        impl From<$name> for $crate::abi::Value {
            fn from(handle: $name) -> Self {
                $crate::abi::Value::Handle(handle.0)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::define_handle!(
        /// Test handle.
        Fence
    );

    #[test]
    fn test_null_is_distinguishable() {
        let uninit: Option<NativeHandle> = None;
        let null = Some(NativeHandle::NULL);
        assert_ne!(uninit, null);
        assert!(NativeHandle::NULL.is_null());
        assert!(matches!(NativeHandle::NULL.resolve(), Err(MarshalError::NullHandle)));
    }

    #[test]
    fn test_equality_is_address_equality() -> Result<(), MarshalError> {
        let a = NativeHandle::from_raw(0xdead_beef);
        assert_eq!(a, NativeHandle::from(0xdead_beef));
        assert_eq!(a.resolve()?.get(), 0xdead_beef);
        assert_eq!(format!("{:?}", a), "NativeHandle(0xdeadbeef)");
        Ok(())
    }

    #[test]
    fn test_typed_handle() {
        let fence = Fence::from_raw(7);
        let raw: NativeHandle = fence.into();
        assert_eq!(raw.as_raw(), 7);
        assert_eq!(Fence::from(raw), fence);
        assert!(Fence::NULL.is_null());
    }
}
