//! Producer/consumer conversion of a source into JSON-ready families.
//!
//! Acquisition runs on its own thread and publishes decoded families into a bounded queue. The
//! calling thread drains the queue and converts each family as it arrives, so memory stays bounded
//! by the queue for the decoded form. The producer's outcome is reported through its join handle.
use std::fs::File;
use std::io::{self, BufReader};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error};
use tokio::runtime;

use crate::common::Error;
use crate::decode::{text, Sink};
use crate::family::Family;
use crate::fetch::Fetcher;
use crate::proto::MetricFamily;
use crate::source::Source;

/// Number of decoded families the queue holds before the producer blocks.
pub const QUEUE_CAPACITY: usize = 1024;

const ACQUISITION_THREAD_NAME: &str = "prom2json-acquire";

/// Reads and decodes one source.
#[derive(Clone, Debug)]
pub struct Acquisition {
    source: Source,
    timeout: Option<Duration>,
}

impl Acquisition {
    /// Creates an acquisition for `source` without a timeout.
    pub fn new(source: Source) -> Self {
        Self { source, timeout: None }
    }

    /// Bounds the whole HTTP exchange of a URL source. Ignored for other sources.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reads the source and publishes every decoded family into `sink`, in decode order.
    ///
    /// ## Errors
    ///
    /// Fails if the source cannot be opened or fetched, or its content cannot be decoded.
    pub fn run<S>(&self, sink: &mut S) -> Result<(), Error>
    where
        S: Sink + ?Sized,
    {
        debug!("reading metrics from {}", self.source);
        match &self.source {
            Source::File { path } => {
                let file = File::open(path)
                    .map_err(|source| Error::Open { path: path.clone(), source })?;
                text::decode(BufReader::new(file), sink)?;
            }
            Source::Stdin => {
                text::decode(io::stdin().lock(), sink)?;
            }
            Source::Url { address, tls } => {
                let fetcher = Fetcher::new(tls, self.timeout)?;
                let runtime = runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(Error::Runtime)?;
                let payload = runtime.block_on(fetcher.fetch(address))?;
                debug!("fetched {} bytes from {address}", payload.body.len());
                payload.format.decode(payload.body, sink)?;
            }
        }
        Ok(())
    }
}

/// Runs `acquisition` on a producer thread and collects the converted families in order.
///
/// ## Errors
///
/// Returns the producer's error, if any. Families received before the failure are discarded.
pub fn convert(acquisition: Acquisition) -> Result<Vec<Family>, Error> {
    run_with(move |sink| acquisition.run(sink))
}

/// Runs `produce` on a dedicated thread feeding a bounded queue, and drains the queue on the
/// calling thread.
///
/// The producer's sender is dropped when `produce` returns or unwinds, which ends the drain.
pub fn run_with<F>(produce: F) -> Result<Vec<Family>, Error>
where
    F: FnOnce(&mut Sender<MetricFamily>) -> Result<(), Error> + Send + 'static,
{
    let (mut tx, rx) = bounded(QUEUE_CAPACITY);
    let producer = thread::Builder::new()
        .name(ACQUISITION_THREAD_NAME.to_string())
        .spawn(move || produce(&mut tx))
        .map_err(Error::Spawn)?;

    let families = assemble(&rx);

    match producer.join() {
        Ok(Ok(())) => {
            debug!("converted {} metric families", families.len());
            Ok(families)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            error!("acquisition thread panicked");
            Err(Error::AcquisitionPanicked)
        }
    }
}

/// Converts families from `rx` until every sender is gone.
pub fn assemble(rx: &Receiver<MetricFamily>) -> Vec<Family> {
    rx.iter().map(Family::from).collect()
}
