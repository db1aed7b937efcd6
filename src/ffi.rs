//! FFI bindings for Synheart Screen
//!
//! C-compatible functions for driving a screening session from a UI layer.
//! All strings are null-terminated UTF-8. Returned strings are allocated by
//! this library and must be released with `screen_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::bank::QuestionBank;
use crate::config::ScreenConfig;
use crate::encoder::ReportEncoder;
use crate::error::ScreenError;
use crate::pipeline::replay_to_report_json;
use crate::session::{ScreeningSession, SessionEvent};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Serialize a value, or record the error and return NULL
fn json_to_cstr<T: Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&ScreenError::EncodingError(e.to_string()).to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to a screening session
pub struct ScreenSessionHandle {
    session: ScreeningSession,
    encoder: ReportEncoder,
}

/// Start a new screening session.
///
/// # Arguments
/// * `config_json` - Configuration JSON, or NULL for defaults
/// * `seed` - Shuffle seed; a negative value seeds from system entropy
/// * `started_at_ms` - Session start time, used as the first question's presentation time
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Returns a pointer that must be freed with `screen_session_free`.
/// - Returns NULL on error; call `screen_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn screen_session_new(
    config_json: *const c_char,
    seed: i64,
    started_at_ms: i64,
) -> *mut ScreenSessionHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        ScreenConfig::default()
    } else {
        let parsed = cstr_to_string(config_json)
            .ok_or_else(|| ScreenError::ParseError("Invalid config string pointer".to_string()))
            .and_then(|json| ScreenConfig::from_json(&json));
        match parsed {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let rng = if seed < 0 {
        StdRng::from_entropy()
    } else {
        StdRng::seed_from_u64(seed as u64)
    };

    match ScreeningSession::with_bank(config, QuestionBank::standard(), rng, started_at_ms) {
        Ok(session) => Box::into_raw(Box::new(ScreenSessionHandle {
            session,
            encoder: ReportEncoder::new(),
        })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a session.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `screen_session_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn screen_session_free(handle: *mut ScreenSessionHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Apply one JSON-encoded session event.
///
/// Returns the answer outcome as JSON for `answer` events and the string
/// `null` for sample events.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `screen_session_new`.
/// - `event_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `screen_free_string`.
/// - Returns NULL on error; call `screen_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn screen_session_apply_event(
    handle: *mut ScreenSessionHandle,
    event_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session handle");
        return ptr::null_mut();
    }
    let handle = &mut *handle;

    let event_str = match cstr_to_string(event_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid event string pointer");
            return ptr::null_mut();
        }
    };

    let event: SessionEvent = match serde_json::from_str(&event_str) {
        Ok(event) => event,
        Err(e) => {
            set_last_error(&ScreenError::ParseError(e.to_string()).to_string());
            return ptr::null_mut();
        }
    };

    match handle.session.apply(&event) {
        Ok(outcome) => json_to_cstr(&outcome),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Get the presented question as JSON, or `null` when none is presented.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `screen_session_new`.
/// - Returns a newly allocated string that must be freed with `screen_free_string`.
#[no_mangle]
pub unsafe extern "C" fn screen_session_current_question(
    handle: *const ScreenSessionHandle,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session handle");
        return ptr::null_mut();
    }
    json_to_cstr(&(*handle).session.current_question())
}

/// Get the live snapshot as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `screen_session_new`.
/// - Returns a newly allocated string that must be freed with `screen_free_string`.
#[no_mangle]
pub unsafe extern "C" fn screen_session_snapshot(handle: *const ScreenSessionHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session handle");
        return ptr::null_mut();
    }
    json_to_cstr(&(*handle).session.snapshot())
}

/// Get the encoded report payload of a completed session.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `screen_session_new`.
/// - Returns a newly allocated string that must be freed with `screen_free_string`.
/// - Returns NULL while the session is running or after cancellation.
#[no_mangle]
pub unsafe extern "C" fn screen_session_report(handle: *const ScreenSessionHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session handle");
        return ptr::null_mut();
    }
    let handle = &*handle;

    match handle
        .session
        .report()
        .and_then(|report| handle.encoder.encode_to_json(report))
    {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Tear the session down at any phase. Idempotent.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `screen_session_new`.
/// - Returns 0 on success, -1 on a NULL handle.
#[no_mangle]
pub unsafe extern "C" fn screen_session_teardown(handle: *mut ScreenSessionHandle) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session handle");
        return -1;
    }
    (*handle).session.teardown();
    0
}

// ============================================================================
// Stateless API
// ============================================================================

/// Replay a recorded event stream (JSON array or NDJSON) into a report payload.
///
/// # Safety
/// - `events_json` must be a valid null-terminated C string.
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `screen_free_string`.
/// - Returns NULL on error; call `screen_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn screen_replay_to_report(
    events_json: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let events = match cstr_to_string(events_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid events string pointer");
            return ptr::null_mut();
        }
    };
    let config = cstr_to_string(config_json);

    match replay_to_report_json(&events, config.as_deref()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a string returned by Screen functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Screen function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn screen_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Screen function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn screen_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn screen_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::recorded_events;
    use crate::types::{Question, QuestionKind};

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        screen_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_session_lifecycle() {
        unsafe {
            let handle = screen_session_new(ptr::null(), 42, 0);
            assert!(!handle.is_null());

            let mut t = 0;
            loop {
                let question_json = take_string(screen_session_current_question(handle));
                let question: Option<Question> = serde_json::from_str(&question_json).unwrap();
                let Some(question) = question else { break };

                t += 1000;
                let answer = match &question.kind {
                    QuestionKind::Verbal { word } => word.clone(),
                    _ => question.correct.clone().unwrap_or_default(),
                };
                let event = serde_json::json!({
                    "type": "answer",
                    "question_id": question.id,
                    "selected_answer": answer,
                    "timestamp_ms": t,
                });
                let event = CString::new(event.to_string()).unwrap();
                let outcome = take_string(screen_session_apply_event(handle, event.as_ptr()));
                assert!(outcome.contains("\"correct\":true"));
            }

            let snapshot = take_string(screen_session_snapshot(handle));
            assert!(snapshot.contains("\"phase\":\"complete\""));

            let report = take_string(screen_session_report(handle));
            assert!(report.contains("screen.report.v1"));

            assert_eq!(screen_session_teardown(handle), 0);
            // Completed sessions keep their report after teardown
            take_string(screen_session_report(handle));

            screen_session_free(handle);
        }
    }

    #[test]
    fn test_ffi_sample_event_returns_null_json() {
        unsafe {
            let handle = screen_session_new(ptr::null(), 1, 0);
            let event = CString::new(r#"{"type":"pointer","x":1,"y":2,"timestamp_ms":5}"#).unwrap();
            assert_eq!(take_string(screen_session_apply_event(handle, event.as_ptr())), "null");
            screen_session_free(handle);
        }
    }

    #[test]
    fn test_ffi_rejected_answer_sets_error() {
        unsafe {
            let handle = screen_session_new(ptr::null(), 1, 0);
            let event = CString::new(
                r#"{"type":"answer","question_id":"nope","selected_answer":"b","timestamp_ms":5}"#,
            )
            .unwrap();
            assert!(screen_session_apply_event(handle, event.as_ptr()).is_null());
            let error = CStr::from_ptr(screen_last_error()).to_str().unwrap();
            assert!(error.contains("nope"));

            assert_eq!(screen_session_teardown(handle), 0);
            assert!(screen_session_report(handle).is_null());
            screen_session_free(handle);
        }
    }

    #[test]
    fn test_ffi_invalid_config() {
        unsafe {
            let config = CString::new(r#"{"session":{"max_tries":0}}"#).unwrap();
            assert!(screen_session_new(config.as_ptr(), 1, 0).is_null());
            assert!(!screen_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_replay_to_report() {
        unsafe {
            let events = serde_json::to_string(&recorded_events(9)).unwrap();
            let events = CString::new(events).unwrap();
            let report = take_string(screen_replay_to_report(events.as_ptr(), ptr::null()));
            assert!(report.contains("\"total_questions\": 6"));

            let garbage = CString::new("not json").unwrap();
            assert!(screen_replay_to_report(garbage.as_ptr(), ptr::null()).is_null());
            assert!(!screen_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = CStr::from_ptr(screen_version()).to_str().unwrap();
            assert!(!version.is_empty());
        }
    }
}
