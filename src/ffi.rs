//! FFI bindings for Synheart Proctor
//!
//! This module provides C-compatible functions for driving a proctoring session
//! from other languages. All functions use C strings (null-terminated); strings
//! returned by the library are newly allocated and must be freed by the caller
//! using `proctor_free_string`.
//!
//! Status-returning functions use `0` for success and `-1` for failure, with
//! the message available from `proctor_last_error`. `proctor_session_submit`
//! and `proctor_session_timer_expired` return `1` when the call moved the
//! session to Submitted and `0` when it was already submitted.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

use crate::config::ProctorConfig;
use crate::error::ProctorError;
use crate::quiz::{parse_questions, QuestionSet, QuizEngine};
use crate::session::SessionController;
use crate::types::{PerceptionSignal, QuestionSource};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
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

/// Map a unit result to a status code
fn status(result: Result<(), ProctorError>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Map a transition result to a status code
fn transition_status(result: Result<bool, ProctorError>) -> c_int {
    match result {
        Ok(true) => 1,
        Ok(false) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Map a JSON-producing result to an owned C string
fn json_result(result: Result<String, ProctorError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Session lifecycle
// ============================================================================

/// Opaque handle to a proctoring session
pub struct ProctorSessionHandle {
    controller: SessionController,
}

unsafe fn session_ref<'a>(session: *mut ProctorSessionHandle) -> Option<&'a SessionController> {
    if session.is_null() {
        set_last_error("Null session pointer");
        return None;
    }
    Some(&(*session).controller)
}

fn build_session(
    config_json: Option<String>,
    questions: Option<String>,
) -> Result<SessionController, ProctorError> {
    let config = match config_json {
        Some(json) => ProctorConfig::from_json(&json)?,
        None => ProctorConfig::default(),
    };
    let set = match questions {
        Some(text) => QuestionSet {
            questions: parse_questions(&text)?,
            source: QuestionSource::Supplied,
        },
        None => QuestionSet::fallback(),
    };
    SessionController::new(config, QuizEngine::from_set(set)?)
}

/// Create a new session in the Setup phase.
///
/// # Safety
/// - `config_json` may be NULL for the default configuration, otherwise it must
///   be a valid null-terminated JSON configuration.
/// - `questions` may be NULL for the embedded question set, otherwise it must
///   be a valid null-terminated string of questions (JSON or numbered text).
/// - Returns a pointer that must be freed with `proctor_session_free`.
/// - Returns NULL on error; call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_new(
    config_json: *const c_char,
    questions: *const c_char,
) -> *mut ProctorSessionHandle {
    clear_last_error();

    let config_json = if config_json.is_null() {
        None
    } else {
        match cstr_to_string(config_json) {
            Some(s) => Some(s),
            None => {
                set_last_error("Invalid config string");
                return ptr::null_mut();
            }
        }
    };

    let questions = if questions.is_null() {
        None
    } else {
        match cstr_to_string(questions) {
            Some(s) => Some(s),
            None => {
                set_last_error("Invalid questions string");
                return ptr::null_mut();
            }
        }
    };

    match build_session(config_json, questions) {
        Ok(controller) => Box::into_raw(Box::new(ProctorSessionHandle { controller })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_free(session: *mut ProctorSessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Start monitoring.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_start(session: *mut ProctorSessionHandle) -> c_int {
    clear_last_error();
    match session_ref(session) {
        Some(controller) => status(controller.start()),
        None => -1,
    }
}

// ============================================================================
// Ingest
// ============================================================================

/// Ingest one perception signal encoded as JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - `signal_json` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_ingest_signal(
    session: *mut ProctorSessionHandle,
    signal_json: *const c_char,
) -> c_int {
    clear_last_error();
    let Some(controller) = session_ref(session) else {
        return -1;
    };
    let Some(json) = cstr_to_string(signal_json) else {
        set_last_error("Invalid signal string pointer");
        return -1;
    };

    let result = serde_json::from_str::<PerceptionSignal>(&json)
        .map_err(ProctorError::from)
        .and_then(|signal| controller.ingest_signal(&signal));
    status(result)
}

/// Count a frame whose perception call failed or timed out.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_dropped_frame(session: *mut ProctorSessionHandle) -> c_int {
    clear_last_error();
    match session_ref(session) {
        Some(controller) => {
            controller.record_dropped_frame();
            0
        }
        None => -1,
    }
}

/// Report that the test window lost focus.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_focus_lost(session: *mut ProctorSessionHandle) -> c_int {
    clear_last_error();
    match session_ref(session) {
        Some(controller) => status(controller.ingest_focus_loss()),
        None => -1,
    }
}

/// Report that the test window regained focus.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_focus_gained(session: *mut ProctorSessionHandle) -> c_int {
    clear_last_error();
    match session_ref(session) {
        Some(controller) => status(controller.ingest_focus_gain()),
        None => -1,
    }
}

// ============================================================================
// Quiz
// ============================================================================

/// Get the session's questions as a JSON array.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - Returns a newly allocated string that must be freed with `proctor_free_string`.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_questions(session: *mut ProctorSessionHandle) -> *mut c_char {
    clear_last_error();
    let Some(controller) = session_ref(session) else {
        return ptr::null_mut();
    };
    json_result(serde_json::to_string(&controller.questions()).map_err(ProctorError::from))
}

/// Record an answer. A negative `selected_index` clears the answer.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - `question_id` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_answer(
    session: *mut ProctorSessionHandle,
    question_id: *const c_char,
    selected_index: c_int,
) -> c_int {
    clear_last_error();
    let Some(controller) = session_ref(session) else {
        return -1;
    };
    let Some(question_id) = cstr_to_string(question_id) else {
        set_last_error("Invalid question_id string pointer");
        return -1;
    };
    let selected = usize::try_from(selected_index).ok();
    status(controller.answer(&question_id, selected))
}

// ============================================================================
// Submission and reporting
// ============================================================================

/// Submit the session manually.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_submit(session: *mut ProctorSessionHandle) -> c_int {
    clear_last_error();
    match session_ref(session) {
        Some(controller) => transition_status(controller.submit()),
        None => -1,
    }
}

/// Notify the session that its timer expired.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_timer_expired(session: *mut ProctorSessionHandle) -> c_int {
    clear_last_error();
    match session_ref(session) {
        Some(controller) => transition_status(controller.timer_expired()),
        None => -1,
    }
}

/// Generate (once) and return the session report as JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - Returns a newly allocated string that must be freed with `proctor_free_string`.
/// - Returns NULL on error (e.g. the session is not submitted yet).
#[no_mangle]
pub unsafe extern "C" fn proctor_session_report(session: *mut ProctorSessionHandle) -> *mut c_char {
    clear_last_error();
    let Some(controller) = session_ref(session) else {
        return ptr::null_mut();
    };
    json_result(
        controller
            .generate_report()
            .and_then(|report| serde_json::to_string(&report).map_err(ProctorError::from)),
    )
}

/// Get live session metrics as JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - Returns a newly allocated string that must be freed with `proctor_free_string`.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_snapshot(session: *mut ProctorSessionHandle) -> *mut c_char {
    clear_last_error();
    let Some(controller) = session_ref(session) else {
        return ptr::null_mut();
    };
    json_result(serde_json::to_string(&controller.snapshot()).map_err(ProctorError::from))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by a Proctor function.
///
/// # Safety
/// - `s` must be a pointer returned by a Proctor function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn proctor_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Proctor function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn proctor_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Proctor library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn proctor_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::ffi::CString;

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        proctor_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_session_lifecycle() {
        unsafe {
            let session = proctor_session_new(ptr::null(), ptr::null());
            assert!(!session.is_null());
            assert_eq!(proctor_session_start(session), 0);

            let signal = PerceptionSignal::with_faces(Utc::now(), 1);
            let json = CString::new(serde_json::to_string(&signal).unwrap()).unwrap();
            assert_eq!(proctor_session_ingest_signal(session, json.as_ptr()), 0);
            assert_eq!(proctor_session_focus_lost(session), 0);
            assert_eq!(proctor_session_focus_gained(session), 0);

            let q1 = CString::new("q1").unwrap();
            assert_eq!(proctor_session_answer(session, q1.as_ptr(), 1), 0);

            let snapshot: serde_json::Value =
                serde_json::from_str(&take_string(proctor_session_snapshot(session))).unwrap();
            assert_eq!(snapshot["phase"], "monitoring");
            assert_eq!(snapshot["tab_switch_count"], 1);

            assert_eq!(proctor_session_submit(session), 1);
            assert_eq!(proctor_session_timer_expired(session), 0);

            let report: serde_json::Value =
                serde_json::from_str(&take_string(proctor_session_report(session))).unwrap();
            assert_eq!(report["quiz_score"], 1);
            assert_eq!(report["quiz_total"], 5);
            assert_eq!(report["submission_trigger"], "manual");

            proctor_session_free(session);
        }
    }

    #[test]
    fn test_ffi_supplied_questions() {
        unsafe {
            let questions = CString::new(
                "1. 2 + 2 = ?\nA) 3\nB) 4\nC) 5\nD) 22\nAnswer: B\n",
            )
            .unwrap();
            let session = proctor_session_new(ptr::null(), questions.as_ptr());
            assert!(!session.is_null());

            let listed: serde_json::Value =
                serde_json::from_str(&take_string(proctor_session_questions(session))).unwrap();
            assert_eq!(listed.as_array().map(|a| a.len()), Some(1));
            assert_eq!(listed[0]["correct_index"], 1);

            proctor_session_free(session);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let config = CString::new("{\"session\":{\"duration_limit_secs\":0}}").unwrap();
            let session = proctor_session_new(config.as_ptr(), ptr::null());
            assert!(session.is_null());
            let error = CStr::from_ptr(proctor_last_error()).to_str().unwrap();
            assert!(error.contains("Configuration"));

            let config =
                CString::new("{\"session\":{\"duration_limit_secs\":10000000000000000}}")
                    .unwrap();
            assert!(proctor_session_new(config.as_ptr(), ptr::null()).is_null());
            let error = CStr::from_ptr(proctor_last_error()).to_str().unwrap();
            assert!(error.contains("duration_limit_secs"));

            let session = proctor_session_new(ptr::null(), ptr::null());
            // Report before submission is a phase error
            assert!(proctor_session_report(session).is_null());
            assert!(!proctor_last_error().is_null());
            assert_eq!(proctor_session_submit(session), -1);
            proctor_session_free(session);

            assert_eq!(proctor_session_start(ptr::null_mut()), -1);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = proctor_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
