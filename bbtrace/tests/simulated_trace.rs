//! Knobs to report lines, with a simulated host standing in for the engine.

use std::{
    fs,
    io::{self, Write},
    sync::{Arc, Mutex},
    thread,
};

use bbtrace::{
    CodeUnit, Error, InstrumentationHost, Session, SimulatedHost, TraceCallback,
    TraceInstrumentation, TraceOptions,
};

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Run {
    host: SimulatedHost,
    session: Session,
    report: Capture,
    diagnostics: Capture,
}

fn launch(args: &[&str]) -> Result<Run, Error> {
    let options = TraceOptions::try_parse_knobs(args.iter().copied())?;
    let mut host = SimulatedHost::new();
    let report = Capture::default();
    let diagnostics = Capture::default();
    let mut session = Session::start_with(
        options,
        &mut host,
        report.clone(),
        Box::new(diagnostics.clone()),
    )?;
    session.run(&mut host)?;
    Ok(Run {
        host,
        session,
        report,
        diagnostics,
    })
}

#[test]
fn synthetic_unit_reports_every_block() {
    let mut run = launch(&["bbtrace"]).unwrap();
    run.host
        .execute(&CodeUnit::from_addresses([0x1000, 0x2000, 0x3000]));
    assert_eq!(run.report.text(), "BB: 0x1000\nBB: 0x2000\nBB: 0x3000\n");
}

#[test]
fn library_blocks_are_filtered_out() {
    let mut run = launch(&["bbtrace"]).unwrap();
    run.host.execute(&CodeUnit::from_addresses([
        0x5555_5555_5000,
        0x7fff_f7fc_3000,
        0x7f00_0000_0000,
        0x5555_5555_5040,
    ]));
    assert_eq!(
        run.report.text(),
        "BB: 0x555555555000\nBB: 0x555555555040\n"
    );
}

#[test]
fn log_zero_never_reports() {
    let mut run = launch(&["bbtrace", "-log", "0"]).unwrap();
    assert_eq!(run.host.registered(), 0);
    for i in 0..100_u64 {
        run.host.execute(&CodeUnit::from_addresses([0x1000 + i * 0x10]));
    }
    assert!(!run.report.text().contains("BB:"));
}

#[test]
fn output_file_takes_the_banner_but_not_the_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.txt");
    let path_arg = path.to_str().unwrap();

    let mut run = launch(&["bbtrace", "-o", path_arg]).unwrap();
    run.host.execute(&CodeUnit::from_addresses([0x1000]));
    run.session.finish().unwrap();

    let file = fs::read_to_string(&path).unwrap();
    assert!(file.contains("This application is instrumented by bbtrace"));
    assert!(file.contains("for analysis results"));
    assert!(!file.contains("BB:"));
    assert_eq!(run.diagnostics.text(), "");
    assert_eq!(run.report.text(), "BB: 0x1000\n");
}

#[test]
fn invalid_arguments_yield_usage_and_no_blocks() {
    let err = launch(&["bbtrace", "-frobnicate"]).err().unwrap();
    assert!(matches!(err, Error::IllegalArgument(_)));
    let usage = TraceOptions::usage();
    assert!(usage.contains("-o <PATH>"));
    assert!(usage.contains("--log <0|1>"));
}

#[test]
fn unwritable_output_is_a_startup_failure() {
    let dir = tempfile::tempdir().unwrap();
    // A directory cannot be opened as the output file.
    let err = launch(&["bbtrace", "-o", dir.path().to_str().unwrap()])
        .err()
        .unwrap();
    assert!(matches!(err, Error::File(..)), "{err}");
}

#[test]
fn concurrent_threads_produce_whole_lines() {
    const THREADS: u64 = 6;
    const PER_THREAD: u64 = 500;

    let report = Capture::default();
    let instrumentation: Arc<dyn TraceCallback> = Arc::new(TraceInstrumentation::new(
        bbtrace::AddressFilter::default(),
        report.clone(),
    ));
    let mut host = SimulatedHost::new();
    host.add_trace_instrumentation(Arc::clone(&instrumentation))
        .unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let callback = Arc::clone(&instrumentation);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    callback.on_block_entered(0x1_0000 * (t + 1) + i);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let text = report.text();
    assert!(text.ends_with('\n'));
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len() as u64, THREADS * PER_THREAD);
    assert!(lines
        .iter()
        .all(|line| line.starts_with("BB: 0x") && line.len() > "BB: 0x".len()));
}
