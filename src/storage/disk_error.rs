use std::io;

// Linux errno values.
const EIO: i32 = 5;
const EROFS: i32 = 30;

/// is_disk_error tells whether an extent store failure means the underlying disk is broken, as
/// opposed to a logical failure such as a missing extent.
pub fn is_disk_error(err: &io::Error) -> bool {
    if let Some(code) = err.raw_os_error() {
        if code == EIO || code == EROFS {
            return true;
        }
    }

    let message = err.to_string().to_lowercase();
    message.contains("input/output error") || message.contains("read-only file system")
}
