//! C ABI for linking loranode-core as a static library into a C MAC host.

use std::os::raw::c_int;
use std::slice;

use crate::command;
use crate::record;

/// ABI version of the exported functions.
pub const ABI_VERSION: u8 = 1;

/// Returns the ABI version. Also keeps the staticlib linkable.
#[no_mangle]
pub extern "C" fn loranode_core_version() -> u8 {
    ABI_VERSION
}

/// Validate a decrypted command (not NUL-terminated). Returns 1 if accepted, 0 if rejected,
/// -1 if ptr is null or the bytes are not UTF-8.
#[no_mangle]
pub extern "C" fn loranode_validate_command(ptr: *const u8, len: usize) -> c_int {
    if ptr.is_null() {
        return -1;
    }
    let bytes = unsafe { slice::from_raw_parts(ptr, len) };
    match std::str::from_utf8(bytes) {
        Ok(s) => c_int::from(command::validate(s)),
        Err(_) => -1,
    }
}

/// Decode a counter record into `out_uplink`/`out_downlink`. Returns 0 on success, -1 on null
/// pointers, -2 if the record is corrupt (outputs untouched).
#[no_mangle]
pub extern "C" fn loranode_decode_counters(
    ptr: *const u8,
    len: usize,
    out_uplink: *mut u32,
    out_downlink: *mut u32,
) -> c_int {
    if ptr.is_null() || out_uplink.is_null() || out_downlink.is_null() {
        return -1;
    }
    let bytes = unsafe { slice::from_raw_parts(ptr, len) };
    let Ok(text) = std::str::from_utf8(bytes) else {
        return -2;
    };
    match record::decode_counters(text) {
        Ok((up, down)) => {
            unsafe {
                *out_uplink = up;
                *out_downlink = down;
            }
            0
        }
        Err(_) => -2,
    }
}
