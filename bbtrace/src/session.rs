//! Startup of a tracing session: open the diagnostic stream, register with the
//! host, print the banner.

use std::{
    io::{self, Write},
    sync::Arc,
};

use log::{debug, info};

use crate::{
    host::{InstrumentationHost, TraceCallback, TraceInstrumentation},
    options::TraceOptions,
    output::{write_banner, DiagnosticStream},
    reporter::AddressFilter,
    Error,
};

/// A registered tracing session.
///
/// Owns the diagnostic stream; dropping the session flushes and closes it.
#[derive(Debug)]
pub struct Session {
    options: TraceOptions,
    diagnostics: DiagnosticStream,
    instrumented: bool,
}

impl Session {
    /// Start a session reporting blocks to stdout, with diagnostics on stderr or `-o`.
    pub fn start<H>(options: TraceOptions, host: &mut H) -> Result<Self, Error>
    where
        H: InstrumentationHost + ?Sized,
    {
        Self::start_with(options, host, io::stdout(), Box::new(io::stderr()))
    }

    /// Start a session with explicit sinks.
    ///
    /// `reporter_sink` receives the `BB:` lines. `default_diagnostics` receives
    /// the banner unless `-o` redirects it.
    pub fn start_with<H, W>(
        options: TraceOptions,
        host: &mut H,
        reporter_sink: W,
        default_diagnostics: Box<dyn Write + Send>,
    ) -> Result<Self, Error>
    where
        H: InstrumentationHost + ?Sized,
        W: Write + Send + 'static,
    {
        let mut diagnostics =
            DiagnosticStream::open_or(options.output_file(), default_diagnostics)?;

        let instrumented = options.log_enabled();
        if instrumented {
            let filter = AddressFilter::new(options.threshold());
            let callback: Arc<dyn TraceCallback> =
                Arc::new(TraceInstrumentation::new(filter, reporter_sink));
            host.add_trace_instrumentation(callback)?;
            debug!(
                "trace instrumentation registered, threshold {:#x}",
                options.threshold()
            );
        } else {
            debug!("block logging disabled, nothing registered");
        }

        write_banner(&mut diagnostics, options.output_file())
            .map_err(|err| match options.output_file() {
                Some(path) => Error::file_at(err, path),
                None => Error::file(err),
            })?;
        info!("session registered: {options:?}");

        Ok(Self {
            options,
            diagnostics,
            instrumented,
        })
    }

    /// Hand the process over to `host`.
    pub fn run<H>(&mut self, host: &mut H) -> Result<(), Error>
    where
        H: InstrumentationHost + ?Sized,
    {
        debug!("starting program");
        host.start_program()
    }

    /// The options this session was started with
    #[must_use]
    pub fn options(&self) -> &TraceOptions {
        &self.options
    }

    /// Was trace instrumentation registered?
    #[must_use]
    pub fn instrumented(&self) -> bool {
        self.instrumented
    }

    /// End the session, flushing the diagnostic stream.
    pub fn finish(mut self) -> Result<(), Error> {
        self.diagnostics.flush()?;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.diagnostics.flush();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        io::{self, Write},
        sync::{Arc, Mutex},
    };

    use super::Session;
    use crate::{
        host::{InstrumentationHost, SimulatedHost},
        options::TraceOptions,
        walker::CodeUnit,
        Error,
    };

    /// A cloneable in-memory sink
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    type Started = (Result<Session, Error>, SimulatedHost, SharedBuf, SharedBuf);

    fn start(options: TraceOptions) -> Started {
        let mut host = SimulatedHost::new();
        let report = SharedBuf::default();
        let diag = SharedBuf::default();
        let session =
            Session::start_with(options, &mut host, report.clone(), Box::new(diag.clone()));
        (session, host, report, diag)
    }

    #[test]
    fn default_session_registers_and_prints_banner() {
        let (session, mut host, report, diag) = start(TraceOptions::default());
        let mut session = session.unwrap();
        assert!(session.instrumented());
        assert_eq!(host.registered(), 1);
        assert!(diag.contents().contains("instrumented by bbtrace"));

        session.run(&mut host).unwrap();
        assert!(host.started());
        host.execute(&CodeUnit::from_addresses([0x1000, 0x2000, 0x3000]));
        assert_eq!(report.contents(), "BB: 0x1000\nBB: 0x2000\nBB: 0x3000\n");
    }

    #[test]
    fn log_off_registers_nothing() {
        let (session, mut host, report, diag) = start(TraceOptions::default().with_log(false));
        let session = session.unwrap();
        assert!(!session.instrumented());
        assert_eq!(host.registered(), 0);
        for _ in 0..10 {
            host.execute(&CodeUnit::from_addresses([0x1000, 0x2000]));
        }
        assert_eq!(report.contents(), "");
        assert!(diag.contents().contains("instrumented by bbtrace"));
    }

    #[test]
    fn output_file_receives_the_banner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.txt");
        let (session, mut host, report, diag) =
            start(TraceOptions::default().with_output_file(&path));
        let session = session.unwrap();

        host.execute(&CodeUnit::from_addresses([0x4000]));
        session.finish().unwrap();

        let banner = fs::read_to_string(&path).unwrap();
        assert!(banner.contains("instrumented by bbtrace"));
        assert!(banner.contains(&format!("See file {} for analysis results", path.display())));
        assert_eq!(diag.contents(), "");
        // Report lines stay on the reporter sink.
        assert_eq!(report.contents(), "BB: 0x4000\n");
        assert!(!banner.contains("BB:"));
    }

    #[test]
    fn unopenable_output_aborts_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no").join("such").join("dir.txt");
        let (session, host, _report, diag) =
            start(TraceOptions::default().with_output_file(&path));
        assert!(matches!(session, Err(Error::File(..))));
        assert_eq!(host.registered(), 0);
        assert_eq!(diag.contents(), "");
    }

    #[test]
    fn threshold_knob_reaches_the_reporter() {
        let (session, mut host, report, _diag) =
            start(TraceOptions::default().with_threshold(0x2000));
        let _session = session.unwrap();
        host.execute(&CodeUnit::from_addresses([0x1000, 0x2000, 0x3000]));
        assert_eq!(report.contents(), "BB: 0x1000\n");
    }

    #[test]
    fn empty_output_path_keeps_the_default_stream() {
        let (session, _host, _report, diag) = start(TraceOptions::default().with_output_file(""));
        let session = session.unwrap();
        assert_eq!(session.options().output_file(), None);
        let banner = diag.contents();
        assert!(banner.contains("instrumented by bbtrace"));
        assert!(!banner.contains("See file"));
    }

    #[test]
    fn host_refusal_is_propagated() {
        let mut host = SimulatedHost::new();
        host.start_program().unwrap();
        let result = Session::start_with(
            TraceOptions::default(),
            &mut host,
            Vec::new(),
            Box::new(Vec::new()),
        );
        assert!(matches!(result, Err(Error::IllegalState(_))));
    }
}
