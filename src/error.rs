use thiserror::Error;

/// Why an allocator could not be brought up. No state is retained on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("base address is null")]
    NullBase,

    #[error("region of {size} bytes is smaller than one {min_size}-byte granule")]
    TooSmall { size: usize, min_size: usize },

    #[error("granule size {0} is not a power of two")]
    MinSize(usize),

    #[error("base address {base:#x} is not aligned to {align} bytes")]
    Misaligned { base: usize, align: usize },

    #[error("region of {size} bytes at {base:#x} runs past the end of the address space")]
    Overflow { base: usize, size: usize },

    #[error("tree depth {depth} does not fit 32-bit node ids")]
    TooLarge { depth: usize },

    #[error("backing allocator could not supply {bytes} bytes for the {what}")]
    Backing { what: &'static str, bytes: usize },

    #[error("allocator is already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("request of {size} bytes exceeds the largest block ({max_size} bytes)")]
    TooLarge { size: usize, max_size: usize },

    #[error("no free block for {size} bytes")]
    OutOfMemory { size: usize },

    #[error("alignment of {align} bytes cannot be honoured from this region")]
    Alignment { align: usize },
}

/// Rejected frees. Detection is best effort: an address that was freed and
/// then handed out again cannot be told apart from a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FreeError {
    #[error("address {addr:#x} is outside the managed region")]
    OutOfRange { addr: usize },

    #[error("address {addr:#x} is not granule aligned")]
    Misaligned { addr: usize },

    #[error("address {addr:#x} is not the start of a live block")]
    NotAllocated { addr: usize },
}
