//! Pretty-printable reports for compiler errors.
//!
//! [`Report`] pairs an [`Error`] with the context's stored sources and
//! renders an annotated snippet via ariadne. Alternate formatting
//! (`{:#}`) is identical; colors are controlled by ariadne's auto-color
//! detection on the output stream.

use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

use ariadne::{Label, ReportKind};

use crate::context::Context;
use crate::diagnostics::{Error, FileId};

/// A diagnostic report over the context's sources.
pub struct Report<'a> {
    ctx: &'a Context,
    error: &'a Error,
}

impl Context {
    /// Build a printable report for an error produced by this context.
    pub fn report<'a>(&'a self, error: &'a Error) -> Report<'a> {
        Report { ctx: self, error }
    }
}

impl Report<'_> {
    /// Write the rendered report, with colors when the writer is a
    /// terminal.
    pub fn write(&self, w: impl std::io::Write) -> std::io::Result<()> {
        let (file, range) = match self.error.location {
            Some(loc) => (loc.file, loc.offset as usize..loc.end as usize),
            None => (FileId::NONE, 0..0),
        };
        let mut builder: ariadne::ReportBuilder<'_, (FileId, Range<usize>)> =
            ariadne::Report::build(ReportKind::Error, file, range.start)
                .with_message(self.error.to_string());
        if range.end > range.start {
            builder = builder.with_label(
                Label::new((file, range)).with_message(self.error.data.vecode()),
            );
        }
        if let Some(path) = &self.error.path {
            builder = builder.with_note(format!("path: {path}"));
        }
        builder.finish().write(Cache(self.ctx), w)
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Adaptor<'a, 'b> {
            f: &'a mut fmt::Formatter<'b>,
        }
        impl std::io::Write for Adaptor<'_, '_> {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                let s = std::str::from_utf8(buf).map_err(|_| std::io::ErrorKind::Other)?;
                self.f.write_str(s).map_err(|_| std::io::ErrorKind::Other)?;
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        self.write(Adaptor { f }).map_err(|_| fmt::Error)
    }
}

struct Cache<'a>(&'a Context);

impl ariadne::Cache<FileId> for Cache<'_> {
    type Storage = String;

    fn fetch(
        &mut self,
        file: &FileId,
    ) -> Result<&ariadne::Source, Box<dyn fmt::Debug + '_>> {
        struct NotFound(FileId);
        impl fmt::Debug for NotFound {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "source file not found: {:?}", self.0)
            }
        }
        if let Some(source) = self.0.sources.get(file.0 as usize) {
            Ok(source.ariadne())
        } else if *file == FileId::NONE {
            static EMPTY: OnceLock<ariadne::Source> = OnceLock::new();
            Ok(EMPTY.get_or_init(|| ariadne::Source::from(String::new())))
        } else {
            Err(Box::new(NotFound(*file)))
        }
    }

    fn display<'a>(&self, file: &'a FileId) -> Option<Box<dyn fmt::Display + 'a>> {
        if *file == FileId::NONE {
            return Some(Box::new("(no source)"));
        }
        let name = self.0.sources.get(file.0 as usize)?.name.clone();
        Some(Box::new(name))
    }
}
