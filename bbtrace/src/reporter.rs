//! The runtime half of the tool: one call per executed basic block.

use std::{
    fmt,
    io::Write,
    sync::{Mutex, PoisonError},
};

/// Default reporting threshold.
///
/// On `x86_64` Linux shared libraries, the vdso and the stack are mapped
/// from here upwards, while the main executable lives below it.
pub const DEFAULT_ADDRESS_THRESHOLD: u64 = 0x7f00_0000_0000;

/// Literal prefix of every report line
pub const LINE_PREFIX: &str = "BB: ";

/// `"BB: 0x"` + 16 hex digits + `'\n'`
const LINE_CAPACITY: usize = 32;

/// Decides which block addresses are worth reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressFilter {
    threshold: u64,
}

impl Default for AddressFilter {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS_THRESHOLD)
    }
}

impl AddressFilter {
    /// Drop every address at or above `threshold`
    #[must_use]
    pub const fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    /// The configured threshold
    #[must_use]
    #[inline]
    pub const fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Should a block starting at `address` be reported?
    #[must_use]
    #[inline]
    pub const fn allows(&self, address: u64) -> bool {
        address < self.threshold
    }
}

/// Formats qualifying block addresses into a sink, one line each.
///
/// The sink sits behind a mutex: the host may call [`AddressReporter::on_block_entered`]
/// from any target thread, and each line is written whole under the lock.
pub struct AddressReporter<W> {
    filter: AddressFilter,
    sink: Mutex<W>,
}

impl<W> fmt::Debug for AddressReporter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressReporter")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl<W> AddressReporter<W>
where
    W: Write,
{
    /// Create a reporter writing into `sink`
    #[must_use]
    pub fn new(filter: AddressFilter, sink: W) -> Self {
        Self {
            filter,
            sink: Mutex::new(sink),
        }
    }

    /// Report that the block starting at `address` is about to execute.
    ///
    /// Never panics and never allocates. Write errors are dropped.
    #[inline]
    pub fn on_block_entered(&self, address: u64) {
        if !self.filter.allows(address) {
            return;
        }
        let mut buf = [0_u8; LINE_CAPACITY];
        let len = format_line(&mut buf, address);
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = sink.write_all(&buf[..len]);
    }

    /// Consume the reporter, returning the sink
    pub fn into_sink(self) -> W {
        self.sink.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write `BB: 0x<hex>\n` into `buf`, returning the number of bytes used.
#[inline]
fn format_line(buf: &mut [u8; LINE_CAPACITY], address: u64) -> usize {
    let mut cursor = &mut buf[..];
    // 23 bytes at most, the buffer cannot run out.
    let _ = writeln!(cursor, "{LINE_PREFIX}{address:#x}");
    LINE_CAPACITY - cursor.len()
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::{format_line, AddressFilter, AddressReporter, DEFAULT_ADDRESS_THRESHOLD};

    fn report(addresses: &[u64]) -> String {
        let reporter = AddressReporter::new(AddressFilter::default(), Vec::new());
        for &address in addresses {
            reporter.on_block_entered(address);
        }
        String::from_utf8(reporter.into_sink()).unwrap()
    }

    #[test]
    fn lines_are_lowercase_and_unpadded() {
        assert_eq!(report(&[0x1000]), "BB: 0x1000\n");
        assert_eq!(report(&[0xdead_beef]), "BB: 0xdeadbeef\n");
        assert_eq!(report(&[0]), "BB: 0x0\n");
        assert_eq!(report(&[0x5555_5555_4abc]), "BB: 0x555555554abc\n");
    }

    #[test]
    fn addresses_at_or_above_the_threshold_are_dropped() {
        assert_eq!(report(&[DEFAULT_ADDRESS_THRESHOLD]), "");
        assert_eq!(report(&[DEFAULT_ADDRESS_THRESHOLD + 1, u64::MAX]), "");
        assert_eq!(
            report(&[DEFAULT_ADDRESS_THRESHOLD - 1]),
            "BB: 0x7effffffffff\n"
        );
    }

    #[test]
    fn every_qualifying_call_is_one_line() {
        let addresses: Vec<u64> = (0..1000_u64)
            .map(|i| i.wrapping_mul(0x9e37_79b9_7f4a_7c15) % (2 * DEFAULT_ADDRESS_THRESHOLD))
            .collect();
        let output = report(&addresses);
        let expected: Vec<String> = addresses
            .iter()
            .filter(|&&a| a < DEFAULT_ADDRESS_THRESHOLD)
            .map(|a| format!("BB: 0x{a:x}"))
            .collect();
        assert_eq!(output.lines().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn custom_threshold_is_honoured() {
        let reporter = AddressReporter::new(AddressFilter::new(0x2000), Vec::new());
        reporter.on_block_entered(0x1fff);
        reporter.on_block_entered(0x2000);
        assert_eq!(reporter.into_sink(), b"BB: 0x1fff\n");
    }

    #[test]
    fn widest_address_fits_the_line_buffer() {
        let mut buf = [0_u8; 32];
        let len = format_line(&mut buf, u64::MAX);
        assert_eq!(&buf[..len], b"BB: 0xffffffffffffffff\n");
    }

    #[test]
    fn concurrent_reports_never_interleave() {
        const THREADS: u64 = 8;
        const PER_THREAD: u64 = 2000;

        let reporter = Arc::new(AddressReporter::new(AddressFilter::default(), Vec::new()));
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let reporter = Arc::clone(&reporter);
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        reporter.on_block_entered(0x40_0000 + t * 0x10_0000 + i * 4);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let output = String::from_utf8(Arc::try_unwrap(reporter).unwrap().into_sink()).unwrap();
        let mut lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len() as u64, THREADS * PER_THREAD);
        for line in &lines {
            let hex = line.strip_prefix("BB: 0x").unwrap();
            assert!(u64::from_str_radix(hex, 16).is_ok(), "corrupted line {line:?}");
        }
        lines.sort_unstable();
        lines.dedup();
        assert_eq!(lines.len() as u64, THREADS * PER_THREAD);
    }
}
