use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Line-granular output shared by both roles.
///
/// The lock is held for exactly one rendered line, so a receiver line and a
/// processor line never interleave.
pub struct Console {
    out: Mutex<Box<dyn Write + Send>>,
}

impl Console {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Writes `line` followed by a newline and flushes.
    pub fn write_line(&self, line: fmt::Arguments<'_>) -> io::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_fmt(line)?;
        out.write_all(b"\n")?;
        out.flush()
    }
}
