//! Pinned memory for data referenced by pointer fields.

use std::collections::BTreeMap;

use super::MarshalError;
use super::buffer::zeroed;
use crate::logging::trace;

/// One heap block. A boxed slice never moves, so its address stays valid for
/// the life of the arena no matter how the block map is rebalanced.
struct Block {
    data: Box<[u8]>,
}

/// Owner of every buffer a pending native call can see through a pointer.
///
/// Strings, byte blobs and arrays referenced from a structure are copied into
/// blocks owned by the arena, and the structure receives the blocks' real
/// addresses. The arena must outlive the native call; dropping it releases
/// everything at once, on every exit path.
///
/// Addresses can be mapped back to the owned bytes, which is how pointer
/// fields of out-parameters are decoded without dereferencing raw pointers.
#[derive(Default)]
pub struct ScopedArena {
    /// Blocks keyed by their start address.
    blocks: BTreeMap<u64, Block>,
    allocated: usize,
}

impl ScopedArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `size` zeroed bytes aligned to `align` and return the address.
    ///
    /// Zero-sized requests still get a distinct non-null address.
    pub fn alloc(&mut self, size: usize, align: usize) -> Result<u64, MarshalError> {
        let align = align.max(1);
        let total = size
            .max(1)
            .checked_add(align - 1)
            .ok_or(MarshalError::AllocationFailed { size })?;
        let mut data = zeroed(total)?.into_boxed_slice();

        // Foreign code turns this address back into a pointer.
        let base = data.as_mut_ptr().expose_provenance();
        let start = base.next_multiple_of(align);
        let address = start as u64;

        trace!(address, size, align, "arena allocation");
        self.allocated += total;
        self.blocks.insert(base as u64, Block { data });
        Ok(address)
    }

    /// Allocate a block holding a copy of `bytes`.
    pub fn alloc_bytes(&mut self, bytes: &[u8], align: usize) -> Result<u64, MarshalError> {
        let address = self.alloc(bytes.len(), align)?;
        self.write(address, bytes)?;
        Ok(address)
    }

    /// Allocate a NUL-terminated copy of `text`.
    pub fn alloc_cstring(&mut self, text: &str) -> Result<u64, MarshalError> {
        let address = self.alloc(text.len().saturating_add(1), 1)?;
        self.write(address, text.as_bytes())?;
        Ok(address)
    }

    /// The block containing `address`, with the offset of `address` inside it.
    fn locate(&self, address: u64) -> Option<(&Block, usize)> {
        let (base, block) = self.blocks.range(..=address).next_back()?;
        let offset = usize::try_from(address - base).ok()?;
        (offset < block.data.len()).then_some((block, offset))
    }

    fn locate_mut(&mut self, address: u64) -> Option<(&mut Block, usize)> {
        let (base, block) = self.blocks.range_mut(..=address).next_back()?;
        let offset = usize::try_from(address - *base).ok()?;
        (offset < block.data.len()).then_some((block, offset))
    }

    /// Whether `address` points into memory this arena owns.
    pub fn owns(&self, address: u64) -> bool {
        self.locate(address).is_some()
    }

    /// Borrow `len` owned bytes at `address`.
    pub fn read(&self, address: u64, len: usize) -> Result<&[u8], MarshalError> {
        self.locate(address)
            .and_then(|(block, offset)| block.data.get(offset..offset.checked_add(len)?))
            .ok_or(MarshalError::InvalidPointer { address, len })
    }

    /// Borrow the NUL-terminated string at `address`, without the terminator.
    pub fn read_cstr(&self, address: u64) -> Result<&[u8], MarshalError> {
        let (block, offset) = self
            .locate(address)
            .ok_or(MarshalError::InvalidPointer { address, len: 0 })?;
        let tail = block
            .data
            .get(offset..)
            .ok_or(MarshalError::InvalidPointer { address, len: 0 })?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(MarshalError::InvalidPointer {
                address,
                len: tail.len(),
            })?;
        Ok(tail.get(..end).unwrap_or_default())
    }

    /// Copy `bytes` into owned memory at `address`.
    ///
    /// This is how a simulated native callee fills an out-buffer.
    pub fn write(&mut self, address: u64, bytes: &[u8]) -> Result<(), MarshalError> {
        let len = bytes.len();
        let (block, offset) = self
            .locate_mut(address)
            .ok_or(MarshalError::InvalidPointer { address, len })?;
        let end = offset
            .checked_add(len)
            .ok_or(MarshalError::InvalidPointer { address, len })?;
        block
            .data
            .get_mut(offset..end)
            .ok_or(MarshalError::InvalidPointer { address, len })?
            .copy_from_slice(bytes);
        Ok(())
    }

    /// Number of live blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Bytes reserved, alignment slack included.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Release every block. Addresses handed out before are dead afterwards.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.allocated = 0;
    }
}

impl std::fmt::Debug for ScopedArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedArena")
            .field("blocks", &self.blocks.len())
            .field("allocated", &self.allocated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_and_roundtrip() -> Result<(), MarshalError> {
        let mut arena = ScopedArena::new();
        let a = arena.alloc_bytes(&[1, 2, 3], 1)?;
        let b = arena.alloc(16, 8)?;
        assert_eq!(b % 8, 0);
        arena.write(b + 8, &7u64.to_ne_bytes())?;
        assert_eq!(arena.read(a, 3)?, &[1, 2, 3]);
        assert_eq!(arena.read(b + 8, 8)?, &7u64.to_ne_bytes());
        assert_eq!(arena.len(), 2);
        Ok(())
    }

    #[test]
    fn test_cstring() -> Result<(), MarshalError> {
        let mut arena = ScopedArena::new();
        let address = arena.alloc_cstring("VK_LAYER_KHRONOS_validation")?;
        assert_eq!(arena.read_cstr(address)?, b"VK_LAYER_KHRONOS_validation");
        Ok(())
    }

    #[test]
    fn test_addresses_stay_stable() -> Result<(), MarshalError> {
        let mut arena = ScopedArena::new();
        let first = arena.alloc_bytes(b"pinned", 1)?;
        for i in 0..64u8 {
            arena.alloc_bytes(&[i; 32], 4)?;
        }
        assert_eq!(arena.read(first, 6)?, b"pinned");
        Ok(())
    }

    #[test]
    fn test_foreign_addresses_are_rejected() -> Result<(), MarshalError> {
        let mut arena = ScopedArena::new();
        let address = arena.alloc(4, 4)?;
        assert!(!arena.owns(0x10));
        assert!(arena.read(address, 64).is_err());
        assert!(matches!(
            arena.write(0x10, &[1]),
            Err(MarshalError::InvalidPointer { .. })
        ));
        arena.clear();
        assert!(!arena.owns(address));
        Ok(())
    }

    #[test]
    fn test_zero_sized_allocations_are_distinct() -> Result<(), MarshalError> {
        let mut arena = ScopedArena::new();
        let a = arena.alloc(0, 1)?;
        let b = arena.alloc(0, 1)?;
        assert_ne!(a, 0);
        assert_ne!(a, b);
        assert_eq!(arena.read(a, 0)?, &[] as &[u8]);
        Ok(())
    }

    #[test]
    fn test_overflowing_lengths_are_errors() -> Result<(), MarshalError> {
        let mut arena = ScopedArena::new();
        let address = arena.alloc(16, 8)?;
        assert!(matches!(
            arena.read(address + 8, usize::MAX),
            Err(MarshalError::InvalidPointer { .. })
        ));
        assert!(matches!(
            arena.alloc(usize::MAX, 8),
            Err(MarshalError::AllocationFailed { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_allocated_counts_alignment_slack() -> Result<(), MarshalError> {
        let mut arena = ScopedArena::new();
        arena.alloc(16, 8)?;
        arena.alloc(0, 1)?;
        assert_eq!(arena.allocated(), 16 + 7 + 1);
        arena.clear();
        assert_eq!(arena.allocated(), 0);
        assert!(arena.is_empty());
        Ok(())
    }

    #[test]
    fn test_addresses_are_dereferenceable() -> Result<(), MarshalError> {
        let mut arena = ScopedArena::new();
        let address = arena.alloc_bytes(&0x0102_0304u32.to_ne_bytes(), 4)?;
        let pointer = std::ptr::with_exposed_provenance::<u32>(address as usize);
        // SAFETY: the block is owned by `arena`, 4-byte aligned and initialized.
        let value = unsafe { pointer.read() };
        assert_eq!(value, 0x0102_0304);
        Ok(())
    }
}
