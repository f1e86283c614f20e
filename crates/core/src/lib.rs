//! HVML Core: shared primitives for the interpreter
//!
//! The leaf crate of the workspace. Everything here is usable without the
//! variant system or the interpreter proper:
//!
//! - `errors`: numeric error codes, the per-thread last-error slot, and the
//!   process-wide message-segment registry
//! - `buffer`: a growable UTF-8 buffer with O(1) character count
//! - `atom`: process-wide string interning with integer identity
//! - `wildcard`: `*`/`?` glob matching for event sub-types

pub mod atom;
pub mod buffer;
pub mod errors;
pub mod wildcard;

pub use atom::{Atom, AtomBucket};
pub use buffer::CharBuffer;
pub use errors::{ErrorCode, ErrorSegment};
pub use wildcard::wildcard_match;
