use std::ffi::CStr;
use std::io;

// The node's host name, or "unknown-host" if it can't be obtained.
pub fn get() -> String {
    match primitive_get() {
        Ok(hn) => hn,
        Err(e) => {
            log::debug!("gethostname failed: {e}");
            "unknown-host".to_string()
        }
    }
}

fn primitive_get() -> io::Result<String> {
    // POSIX limits host names to HOST_NAME_MAX bytes, which is 64 on Linux.  The buffer leaves room
    // for the terminator, which gethostname() omits if the name was truncated.
    let mut buffer: [libc::c_char; 256] = [0; 256];
    let result = unsafe { libc::gethostname(buffer.as_mut_ptr(), buffer.len() - 1) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { CStr::from_ptr(buffer.as_ptr()) }
        .to_string_lossy()
        .into_owned())
}
