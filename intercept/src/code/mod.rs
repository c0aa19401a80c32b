pub mod cache;
pub mod mem;

pub use cache::flush_instructions;
pub use mem::{alloc_executable, copy_in, copy_out, free_executable, raw_copy, unprotect};
