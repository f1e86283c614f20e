//! Error codes and the per-thread last-error slot
//!
//! Every fallible call in the interpreter reports failure twice: through its
//! return value and through a per-thread last-error slot. Callers that pass a
//! `silently` flag suppress the slot write, never the return.
//!
//! Error codes are plain integers assigned in disjoint ranges per subsystem
//! (generic 0..=23, variant 100+, stream 200+, eJSON 1100+, HVML 1200+, and
//! so on). Human-readable messages live in *segments* registered once at
//! startup; `message_for` binary-searches the registered segments.

use std::cell::Cell;
use std::sync::{Mutex, OnceLock};

/// A numeric error code. `OK` (0) never occupies the last-error slot.
pub type ErrorCode = i32;

// Generic error codes.
pub const OK: ErrorCode = 0;
pub const BAD_SYSTEM_CALL: ErrorCode = 1;
pub const BAD_STDC_CALL: ErrorCode = 2;
pub const OUT_OF_MEMORY: ErrorCode = 3;
pub const INVALID_VALUE: ErrorCode = 4;
pub const DUPLICATED: ErrorCode = 5;
pub const NOT_IMPLEMENTED: ErrorCode = 6;
pub const NO_INSTANCE: ErrorCode = 7;
pub const TOO_LARGE_ENTITY: ErrorCode = 8;
pub const BAD_ENCODING: ErrorCode = 9;
pub const NOT_SUPPORTED: ErrorCode = 10;
pub const OUTPUT: ErrorCode = 11;
pub const TOO_SMALL_BUFF: ErrorCode = 12;
pub const NULL_OBJECT: ErrorCode = 13;
pub const TOO_SMALL_SIZE: ErrorCode = 14;
pub const INCOMPLETE_OBJECT: ErrorCode = 15;
pub const NO_FREE_SLOT: ErrorCode = 16;
pub const NOT_EXISTS: ErrorCode = 17;
pub const WRONG_ARGS: ErrorCode = 18;
pub const WRONG_STAGE: ErrorCode = 19;
pub const UNEXPECTED_RESULT: ErrorCode = 20;
pub const UNEXPECTED_DATA: ErrorCode = 21;
pub const OVERFLOW: ErrorCode = 22;
pub const UNKNOWN: ErrorCode = 23;

// First code of each subsystem range.
pub const FIRST_VARIANT: ErrorCode = 100;
pub const FIRST_STREAM: ErrorCode = 200;
pub const FIRST_EJSON: ErrorCode = 1100;
pub const FIRST_HVML: ErrorCode = 1200;
pub const FIRST_HTML: ErrorCode = 1300;
pub const FIRST_XGML: ErrorCode = 1400;
pub const FIRST_XML: ErrorCode = 1500;
pub const FIRST_VDOM: ErrorCode = 2100;
pub const FIRST_EDOM: ErrorCode = 2200;
pub const FIRST_VCM: ErrorCode = 2300;
pub const FIRST_EXECUTOR: ErrorCode = 2400;

// Variant subsystem.
pub const WRONG_DATA_TYPE: ErrorCode = FIRST_VARIANT;
pub const STRING_NOT_UTF8: ErrorCode = FIRST_VARIANT + 1;
pub const INVALID_OPERAND: ErrorCode = FIRST_VARIANT + 2;

// eJSON subsystem (embedded-expression states of the tokenizer).
pub const EJSON_UNEXPECTED_CHARACTER: ErrorCode = FIRST_EJSON;
pub const EJSON_UNEXPECTED_NULL_CHARACTER: ErrorCode = FIRST_EJSON + 1;
pub const EJSON_UNEXPECTED_NUMBER_EXPONENT: ErrorCode = FIRST_EJSON + 2;
pub const EJSON_UNEXPECTED_NUMBER_FRACTION: ErrorCode = FIRST_EJSON + 3;
pub const EJSON_UNEXPECTED_NUMBER_INTEGER: ErrorCode = FIRST_EJSON + 4;
pub const EJSON_UNEXPECTED_NUMBER: ErrorCode = FIRST_EJSON + 5;
pub const EJSON_UNEXPECTED_RIGHT_BRACE: ErrorCode = FIRST_EJSON + 6;
pub const EJSON_UNEXPECTED_RIGHT_BRACKET: ErrorCode = FIRST_EJSON + 7;
pub const EJSON_UNEXPECTED_KEY_NAME: ErrorCode = FIRST_EJSON + 8;
pub const EJSON_UNEXPECTED_COMMA: ErrorCode = FIRST_EJSON + 9;
pub const EJSON_UNEXPECTED_KEYWORD: ErrorCode = FIRST_EJSON + 10;
pub const EJSON_UNEXPECTED_EOF: ErrorCode = FIRST_EJSON + 11;
pub const EJSON_BAD_NUMBER: ErrorCode = FIRST_EJSON + 12;
pub const EJSON_BAD_STRING_ESCAPE: ErrorCode = FIRST_EJSON + 13;
pub const EJSON_BAD_VARIABLE_NAME: ErrorCode = FIRST_EJSON + 14;
pub const EJSON_MAX_DEPTH_EXCEEDED: ErrorCode = FIRST_EJSON + 15;

// HVML tokenizer subsystem.
pub const HVML_UNEXPECTED_NULL_CHARACTER: ErrorCode = FIRST_HVML;
pub const HVML_EOF_BEFORE_TAG_NAME: ErrorCode = FIRST_HVML + 1;
pub const HVML_MISSING_END_TAG_NAME: ErrorCode = FIRST_HVML + 2;
pub const HVML_INVALID_FIRST_CHARACTER_OF_TAG_NAME: ErrorCode = FIRST_HVML + 3;
pub const HVML_EOF_IN_TAG: ErrorCode = FIRST_HVML + 4;
pub const HVML_UNEXPECTED_EQUALS_SIGN_BEFORE_ATTRIBUTE_NAME: ErrorCode = FIRST_HVML + 5;
pub const HVML_UNEXPECTED_CHARACTER_IN_ATTRIBUTE_NAME: ErrorCode = FIRST_HVML + 6;
pub const HVML_UNEXPECTED_CHARACTER_IN_UNQUOTED_ATTRIBUTE_VALUE: ErrorCode = FIRST_HVML + 7;
pub const HVML_MISSING_WHITESPACE_BETWEEN_ATTRIBUTES: ErrorCode = FIRST_HVML + 8;
pub const HVML_UNEXPECTED_SOLIDUS_IN_TAG: ErrorCode = FIRST_HVML + 9;
pub const HVML_INCORRECTLY_OPENED_COMMENT: ErrorCode = FIRST_HVML + 10;
pub const HVML_ABRUPT_CLOSING_OF_EMPTY_COMMENT: ErrorCode = FIRST_HVML + 11;
pub const HVML_EOF_IN_COMMENT: ErrorCode = FIRST_HVML + 12;
pub const HVML_NESTED_COMMENT: ErrorCode = FIRST_HVML + 13;
pub const HVML_INCORRECTLY_CLOSED_COMMENT: ErrorCode = FIRST_HVML + 14;
pub const HVML_EOF_IN_DOCTYPE: ErrorCode = FIRST_HVML + 15;
pub const HVML_MISSING_WHITESPACE_BEFORE_DOCTYPE_NAME: ErrorCode = FIRST_HVML + 16;
pub const HVML_MISSING_DOCTYPE_NAME: ErrorCode = FIRST_HVML + 17;
pub const HVML_INVALID_CHARACTER_SEQUENCE_AFTER_DOCTYPE_NAME: ErrorCode = FIRST_HVML + 18;
pub const HVML_MISSING_QUOTE_BEFORE_DOCTYPE_PUBLIC_ID: ErrorCode = FIRST_HVML + 19;
pub const HVML_ABRUPT_DOCTYPE_PUBLIC_ID: ErrorCode = FIRST_HVML + 20;
pub const HVML_MISSING_QUOTE_BEFORE_DOCTYPE_SYSTEM_ID: ErrorCode = FIRST_HVML + 21;
pub const HVML_MISSING_DOCTYPE_SYSTEM_ID: ErrorCode = FIRST_HVML + 22;
pub const HVML_ABRUPT_DOCTYPE_SYSTEM_ID: ErrorCode = FIRST_HVML + 23;
pub const HVML_UNEXPECTED_CHARACTER_AFTER_DOCTYPE_SYSTEM_ID: ErrorCode = FIRST_HVML + 24;
pub const HVML_UNKNOWN_NAMED_CHARACTER_REFERENCE: ErrorCode = FIRST_HVML + 25;
pub const HVML_ABSENCE_OF_DIGITS_IN_NUMERIC_CHARACTER_REFERENCE: ErrorCode = FIRST_HVML + 26;
pub const HVML_MISSING_SEMICOLON_AFTER_CHARACTER_REFERENCE: ErrorCode = FIRST_HVML + 27;
pub const HVML_CHARACTER_REFERENCE_OUTSIDE_UNICODE_RANGE: ErrorCode = FIRST_HVML + 28;
pub const HVML_SURROGATE_CHARACTER_REFERENCE: ErrorCode = FIRST_HVML + 29;
pub const HVML_NONCHARACTER_CHARACTER_REFERENCE: ErrorCode = FIRST_HVML + 30;
pub const HVML_NULL_CHARACTER_REFERENCE: ErrorCode = FIRST_HVML + 31;
pub const HVML_CONTROL_CHARACTER_REFERENCE: ErrorCode = FIRST_HVML + 32;
pub const HVML_MISSING_ATTRIBUTE_VALUE: ErrorCode = FIRST_HVML + 33;
pub const HVML_UNEXPECTED_CHARACTER: ErrorCode = FIRST_HVML + 34;
pub const HVML_INVALID_UTF8_CHARACTER: ErrorCode = FIRST_HVML + 35;

// VCM subsystem.
pub const VCM_VARIABLE_NOT_FOUND: ErrorCode = FIRST_VCM;
pub const VCM_NOT_CALLABLE: ErrorCode = FIRST_VCM + 1;
pub const VCM_NO_SCOPE: ErrorCode = FIRST_VCM + 2;

thread_local! {
    /// The last error code reported on this thread; `OK` means none pending.
    static LAST_ERROR: Cell<ErrorCode> = const { Cell::new(OK) };
}

/// Write the last-error slot for this thread.
pub fn set_last_error(code: ErrorCode) {
    LAST_ERROR.with(|e| e.set(code));
}

/// Write the last-error slot unless the caller asked for silence.
pub fn set_last_error_silently(code: ErrorCode, silently: bool) {
    if !silently {
        set_last_error(code);
    }
}

/// Read the last-error slot without clearing it.
pub fn last_error() -> ErrorCode {
    LAST_ERROR.with(|e| e.get())
}

/// Read and clear the last-error slot.
pub fn take_last_error() -> ErrorCode {
    LAST_ERROR.with(|e| e.replace(OK))
}

/// Clear any pending error.
pub fn clear_last_error() {
    LAST_ERROR.with(|e| e.set(OK));
}

/// A registered block of error messages covering a contiguous code range.
///
/// `messages[i]` describes code `first + i`; `last` must equal
/// `first + messages.len() - 1`.
#[derive(Debug, Clone, Copy)]
pub struct ErrorSegment {
    pub first: ErrorCode,
    pub last: ErrorCode,
    pub messages: &'static [&'static str],
}

static SEGMENTS: OnceLock<Mutex<Vec<ErrorSegment>>> = OnceLock::new();

fn segments() -> &'static Mutex<Vec<ErrorSegment>> {
    SEGMENTS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Register a message segment. Segments are append-only and live for the
/// rest of the process; registering a range that overlaps an existing
/// segment fails with `DUPLICATED`.
pub fn register_error_messages(seg: ErrorSegment) -> Result<(), ErrorCode> {
    if seg.first > seg.last || seg.last - seg.first + 1 != seg.messages.len() as i32 {
        set_last_error(INVALID_VALUE);
        return Err(INVALID_VALUE);
    }

    let mut segs = segments().lock().expect("error segment registry poisoned");
    let pos = segs.partition_point(|s| s.first < seg.first);
    let overlaps_prev = pos > 0 && segs[pos - 1].last >= seg.first;
    let overlaps_next = pos < segs.len() && segs[pos].first <= seg.last;
    if overlaps_prev || overlaps_next {
        set_last_error(DUPLICATED);
        return Err(DUPLICATED);
    }
    segs.insert(pos, seg);
    tracing::debug!(
        first = seg.first,
        last = seg.last,
        "error message segment registered"
    );
    Ok(())
}

/// Look up the message for a code among the registered segments.
pub fn message_for(code: ErrorCode) -> Option<&'static str> {
    let segs = segments().lock().expect("error segment registry poisoned");
    let pos = segs.partition_point(|s| s.last < code);
    let seg = segs.get(pos)?;
    if code < seg.first {
        return None;
    }
    Some(seg.messages[(code - seg.first) as usize])
}

static GENERIC_MESSAGES: &[&str] = &[
    "Ok",
    "Bad system call",
    "Bad STDC call",
    "Out of memory",
    "Invalid value",
    "Duplicated",
    "Not implemented",
    "No instance",
    "Too large entity",
    "Bad encoding",
    "Not supported",
    "Output failure",
    "Too small buffer",
    "Null object",
    "Too small size",
    "Incomplete object",
    "No free slot",
    "Not exists",
    "Wrong arguments",
    "Wrong stage",
    "Unexpected result",
    "Unexpected data",
    "Overflow",
    "Unknown",
];

use std::sync::Once;

static GENERIC_INIT: Once = Once::new();

/// Register the generic message segment. Idempotent; every subsystem init
/// calls through here before registering its own segment.
pub fn init_generic_messages() {
    GENERIC_INIT.call_once(|| {
        register_error_messages(ErrorSegment {
            first: OK,
            last: UNKNOWN,
            messages: GENERIC_MESSAGES,
        })
        .expect("generic error segment must register first");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_slot_roundtrip() {
        clear_last_error();
        assert_eq!(last_error(), OK);
        set_last_error(NOT_EXISTS);
        assert_eq!(last_error(), NOT_EXISTS);
        assert_eq!(take_last_error(), NOT_EXISTS);
        assert_eq!(last_error(), OK);
    }

    #[test]
    fn test_silent_suppresses_write() {
        clear_last_error();
        set_last_error_silently(INVALID_VALUE, true);
        assert_eq!(last_error(), OK);
        set_last_error_silently(INVALID_VALUE, false);
        assert_eq!(last_error(), INVALID_VALUE);
        clear_last_error();
    }

    #[test]
    fn test_slot_is_per_thread() {
        clear_last_error();
        set_last_error(OVERFLOW);
        let other = std::thread::spawn(last_error).join().unwrap();
        assert_eq!(other, OK);
        assert_eq!(last_error(), OVERFLOW);
        clear_last_error();
    }

    #[test]
    #[serial]
    fn test_message_lookup() {
        init_generic_messages();
        assert_eq!(message_for(OK), Some("Ok"));
        assert_eq!(message_for(NOT_EXISTS), Some("Not exists"));
        assert_eq!(message_for(UNKNOWN), Some("Unknown"));
        assert_eq!(message_for(99), None);
    }

    #[test]
    #[serial]
    fn test_overlapping_segment_rejected() {
        init_generic_messages();
        static MSGS: &[&str] = &["dup"];
        let r = register_error_messages(ErrorSegment {
            first: UNKNOWN,
            last: UNKNOWN,
            messages: MSGS,
        });
        assert_eq!(r, Err(DUPLICATED));
    }

    #[test]
    fn test_malformed_segment_rejected() {
        static MSGS: &[&str] = &["a", "b"];
        let r = register_error_messages(ErrorSegment {
            first: 9000,
            last: 9000,
            messages: MSGS,
        });
        assert_eq!(r, Err(INVALID_VALUE));
    }
}
