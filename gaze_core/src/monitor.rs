//! Background current sampling.
//!
//! Spawns a thread that reads the sensor at a fixed cadence and appends to the
//! shared `SampleBuffer`. A failed read is recorded as a zero sample so the
//! time series keeps its cadence.
//!
//! Each `CurrentMonitor` owns exactly one thread, joined on `stop()` or drop.
use crate::cancel::CancelToken;
use crate::hw_error::map_hw_error;
use crate::sample_buffer::{Sample, SampleBuffer};
use gaze_traits::CurrentSensor;
use gaze_traits::clock::Clock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sensor handle that can be shared between the monitor thread and the
/// calibrator, which needs a direct read after every sweep step.
pub struct SharedSensor<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SharedSensor<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: CurrentSensor> SharedSensor<S> {
    pub fn new(sensor: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sensor)),
        }
    }
}

impl<S: CurrentSensor> CurrentSensor for SharedSensor<S> {
    fn init(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut s = self.inner.lock().map_err(|_| "sensor mutex poisoned")?;
        s.init()
    }

    fn read_current(&mut self) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        let mut s = self.inner.lock().map_err(|_| "sensor mutex poisoned")?;
        s.read_current()
    }
}

pub struct CurrentMonitor {
    samples: SampleBuffer,
    failures: Arc<AtomicU64>,
    period: Duration,
    /// Local stop flag, independent of the rig-wide token.
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl CurrentMonitor {
    /// Start sampling `sensor` at `hz` into `samples` until `running` is
    /// cancelled or the monitor is stopped.
    pub fn spawn<S, C>(
        mut sensor: S,
        samples: SampleBuffer,
        hz: u32,
        clock: C,
        running: CancelToken,
    ) -> Self
    where
        S: CurrentSensor + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let failures = Arc::new(AtomicU64::new(0));
        let failures_clone = failures.clone();
        let period = Duration::from_micros(crate::util::period_us(hz));
        let writer = samples.clone();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) || running.is_cancelled() {
                    tracing::debug!("current monitor received shutdown signal");
                    break;
                }

                let amps = match sensor.read_current() {
                    Ok(v) => v,
                    Err(e) => {
                        let n = failures_clone.fetch_add(1, Ordering::Relaxed) + 1;
                        let err = map_hw_error(e.as_ref());
                        tracing::warn!(error = %err, failures = n, "current read failed; recording 0");
                        0.0
                    }
                };
                writer.push(Sample {
                    at: clock.now(),
                    amps,
                });

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::trace!("current monitor thread exiting cleanly");
        });

        Self {
            samples,
            failures,
            period,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples.latest()
    }

    pub fn samples(&self) -> &SampleBuffer {
        &self.samples
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Reads that failed and were recorded as zero.
    pub fn read_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Signal and join the sampling thread.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // The thread exits after its current read/sleep, i.e. within one period.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("current monitor joined"),
                Err(e) => tracing::warn!(?e, "current monitor thread panicked during shutdown"),
            }
        }
    }
}

impl Drop for CurrentMonitor {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
