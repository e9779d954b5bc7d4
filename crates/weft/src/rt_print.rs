//! Formatted output safe from a realtime context.
//!
//! Formats into a fixed stack buffer and emits it with a single `write(2)`:
//! no allocation and no stdio lock, so a realtime worker cannot be stalled by
//! a logger on another thread.

use std::fmt::{self, Write as _};

const BUFFER_SIZE: usize = 512;

struct StackWriter {
    buffer: [u8; BUFFER_SIZE],
    len: usize,
}

impl fmt::Write for StackWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // Output beyond the buffer is truncated, never reallocated.
        let available = self.buffer.len() - self.len;
        let take = s.len().min(available);
        self.buffer[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

/// Write formatted output to stderr with a single syscall.
///
/// Output longer than the internal buffer is truncated. Prefer the
/// [`rt_println!`](crate::rt_println) macro.
pub fn rt_print(args: fmt::Arguments<'_>) {
    let mut writer = StackWriter {
        buffer: [0; BUFFER_SIZE],
        len: 0,
    };
    let _ = writer.write_fmt(args);
    if writer.len == 0 {
        return;
    }
    // SAFETY: the buffer holds `len` initialized bytes.
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            writer.buffer.as_ptr().cast(),
            writer.len,
        );
    }
}

/// Print a line to stderr from a realtime context.
///
/// # Example
///
/// ```
/// weft::rt_println!("xrun after {} periods", 128);
/// ```
#[macro_export]
macro_rules! rt_println {
    () => {
        $crate::rt_print(::core::format_args!("\n"))
    };
    ($($arg:tt)*) => {
        $crate::rt_print(::core::format_args!(
            "{}\n",
            ::core::format_args!($($arg)*)
        ))
    };
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;

    use super::*;

    #[test]
    fn test_formatting_fills_the_buffer() {
        let mut writer = StackWriter {
            buffer: [0; BUFFER_SIZE],
            len: 0,
        };
        write!(writer, "period {} of {}", 7, 64).expect("formatting");
        assert_eq!(&writer.buffer[..writer.len], b"period 7 of 64");
    }

    #[test]
    fn test_overflow_truncates() {
        let mut writer = StackWriter {
            buffer: [0; BUFFER_SIZE],
            len: 0,
        };
        let long = "x".repeat(2 * BUFFER_SIZE);
        write!(writer, "{long}").expect("formatting");
        assert_eq!(writer.len, BUFFER_SIZE);
    }

    #[test]
    fn test_macro_accepts_formatting() {
        crate::rt_println!("worker {} finished", 3);
        crate::rt_println!();
    }
}
