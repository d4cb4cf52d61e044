//! The diagnostic stream: stderr, or the file named by `-o`.

use std::{
    fmt,
    fs::File,
    io::{self, LineWriter, Write},
    path::{Path, PathBuf},
};

use crate::Error;

const BANNER_RULE: &str = "===============================================";

/// Where banner and diagnostics go
pub enum DiagnosticStream {
    /// The default stream, usually stderr
    Default(Box<dyn Write + Send>),
    /// A file opened from `-o`
    File {
        /// The path the file was opened at
        path: PathBuf,
        /// The open file
        writer: LineWriter<File>,
    },
}

impl fmt::Debug for DiagnosticStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default(_) => f.write_str("DiagnosticStream::Default"),
            Self::File { path, .. } => f
                .debug_struct("DiagnosticStream::File")
                .field("path", path)
                .finish_non_exhaustive(),
        }
    }
}

impl DiagnosticStream {
    /// Open `path` if given, stderr otherwise.
    pub fn open(path: Option<&Path>) -> Result<Self, Error> {
        Self::open_or(path, Box::new(io::stderr()))
    }

    /// Open `path` if given, `default` otherwise.
    ///
    /// The file is created (or truncated) right away, so a bad path fails
    /// here and not on the first write.
    pub fn open_or(path: Option<&Path>, default: Box<dyn Write + Send>) -> Result<Self, Error> {
        match path {
            None => Ok(Self::Default(default)),
            Some(path) => {
                let file = File::create(path).map_err(|err| Error::file_at(err, path))?;
                Ok(Self::File {
                    path: path.into(),
                    writer: LineWriter::new(file),
                })
            }
        }
    }

    /// The file path, if the stream was redirected
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Default(_) => None,
            Self::File { path, .. } => Some(path),
        }
    }
}

impl Write for DiagnosticStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Default(writer) => writer.write(buf),
            Self::File { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Default(writer) => writer.flush(),
            Self::File { writer, .. } => writer.flush(),
        }
    }
}

/// Write the startup banner.
///
/// `results` names the file analysis results land in, if one was configured.
pub fn write_banner<W>(out: &mut W, results: Option<&Path>) -> io::Result<()>
where
    W: Write + ?Sized,
{
    writeln!(out, "{BANNER_RULE}")?;
    writeln!(out, "This application is instrumented by bbtrace")?;
    if let Some(results) = results {
        writeln!(out, "See file {} for analysis results", results.display())?;
    }
    writeln!(out, "{BANNER_RULE}")?;
    out.flush()
}
