//! The highlighting protocol consumed by the textual printer: `PrettyWrite`
//! marks each run of output with what it is (keyword, value reference,
//! constant, comment) so an external terminal front-end can colorize it
//! without re-lexing the line-oriented text form. That front-end is out
//! of scope for this crate; this module is the interface it would use.

use std::io::{self, Write};

pub trait PrettyWrite {
    fn keyword(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()>;
    fn value(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()>;
    fn constant(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()>;
    fn comment(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()>;
    fn plain(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()>;
}

/// No-op: writes every run as-is. What `write`/`write_with_info` use.
pub struct Plain;

impl PrettyWrite for Plain {
    fn keyword(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()> {
        write!(w, "{}", s)
    }
    fn value(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()> {
        write!(w, "{}", s)
    }
    fn constant(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()> {
        write!(w, "{}", s)
    }
    fn comment(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()> {
        write!(w, "{}", s)
    }
    fn plain(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()> {
        write!(w, "{}", s)
    }
}

/// Wraps each run in an ANSI SGR pair: magenta keywords, cyan value
/// references, yellow constants, dim comments.
pub struct AnsiHighlight;

impl AnsiHighlight {
    fn wrap(w: &mut dyn Write, code: &str, s: &str) -> io::Result<()> {
        write!(w, "\x1b[{}m{}\x1b[0m", code, s)
    }
}

impl PrettyWrite for AnsiHighlight {
    fn keyword(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()> {
        Self::wrap(w, "35", s)
    }
    fn value(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()> {
        Self::wrap(w, "36", s)
    }
    fn constant(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()> {
        Self::wrap(w, "33", s)
    }
    fn comment(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()> {
        Self::wrap(w, "2", s)
    }
    fn plain(&mut self, w: &mut dyn Write, s: &str) -> io::Result<()> {
        write!(w, "{}", s)
    }
}
