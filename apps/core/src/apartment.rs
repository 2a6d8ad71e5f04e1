use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use crate::error::IconError;
use crate::logging;
use crate::shell::ShellProvider;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApartmentError {
    WorkerUnavailable,
    WorkerPanicked(String),
    SpawnFailed(String),
}

impl std::fmt::Display for ApartmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WorkerUnavailable => write!(f, "apartment worker is not running"),
            Self::WorkerPanicked(message) => write!(f, "apartment work panicked: {message}"),
            Self::SpawnFailed(error) => write!(f, "failed to start apartment worker: {error}"),
        }
    }
}

impl std::error::Error for ApartmentError {}

/// The one execution context the shell icon API may be called from.
pub trait Apartment: Send + Sync {
    /// Hands a job to the apartment. The job runs exactly once unless this
    /// returns an error.
    fn dispatch(&self, job: Job) -> Result<(), ApartmentError>;

    fn shutdown(&self) {}
}

/// Runs `work` inside `apartment` and blocks until it has produced a value.
pub fn run_affine<T, F>(apartment: &dyn Apartment, work: F) -> Result<T, ApartmentError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = channel();
    apartment.dispatch(Box::new(move || {
        let outcome = catch_unwind(AssertUnwindSafe(work)).map_err(|payload| panic_message(&*payload));
        let _ = tx.send(outcome);
    }))?;

    match rx.recv() {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(message)) => {
            logging::error(&format!("apartment work panicked: {message}"));
            Err(ApartmentError::WorkerPanicked(message))
        }
        Err(_) => Err(ApartmentError::WorkerUnavailable),
    }
}

/// Same as [`run_affine`] for shell calls, folding executor failures into
/// an unexpected [`IconError`] for `path`.
pub fn run_shell_call<T, F>(apartment: &dyn Apartment, path: &Path, work: F) -> Result<T, IconError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, IconError> + Send + 'static,
{
    run_affine(apartment, work).map_err(|error| IconError::unexpected(path, error.to_string()))?
}

#[derive(Clone)]
pub struct AffineShell {
    shell: Arc<dyn ShellProvider>,
    apartment: Arc<dyn Apartment>,
}

impl AffineShell {
    pub fn new(shell: Arc<dyn ShellProvider>, apartment: Arc<dyn Apartment>) -> Self {
        Self { shell, apartment }
    }

    /// Runs one shell call on the apartment; `path` names the failure if
    /// the apartment itself is gone.
    pub fn call<T, F>(&self, path: &Path, work: F) -> Result<T, IconError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ShellProvider) -> Result<T, IconError> + Send + 'static,
    {
        let shell = Arc::clone(&self.shell);
        run_shell_call(self.apartment.as_ref(), path, move || work(shell.as_ref()))
    }

    pub fn apartment(&self) -> &dyn Apartment {
        self.apartment.as_ref()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic payload unavailable".to_string())
}

/// A single dedicated worker thread with a FIFO inbox. On Windows the
/// worker enters a single-threaded COM apartment before taking jobs.
pub struct StaApartment {
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl StaApartment {
    pub fn spawn(name: &str) -> Result<Self, ApartmentError> {
        let (tx, rx) = channel::<Job>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(rx))
            .map_err(|e| ApartmentError::SpawnFailed(e.to_string()))?;

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            worker_id: handle.thread().id(),
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn worker_id(&self) -> ThreadId {
        self.worker_id
    }
}

impl Apartment for StaApartment {
    fn dispatch(&self, job: Job) -> Result<(), ApartmentError> {
        // Work submitted from the worker itself would wait on its own inbox.
        if thread::current().id() == self.worker_id {
            job();
            return Ok(());
        }

        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Err(ApartmentError::WorkerUnavailable);
        };
        sender
            .send(job)
            .map_err(|_| ApartmentError::WorkerUnavailable)
    }

    fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if thread::current().id() != self.worker_id && handle.join().is_err() {
                logging::error("apartment worker exited with a panic");
            }
        }
    }
}

impl Drop for StaApartment {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx: Receiver<Job>) {
    let _apartment = ComApartmentGuard::enter();
    logging::info("apartment worker started");
    while let Ok(job) = rx.recv() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            logging::error("apartment job panicked outside run_affine");
        }
    }
    logging::info("apartment worker stopped");
}

#[cfg(target_os = "windows")]
struct ComApartmentGuard {
    initialized: bool,
}

#[cfg(target_os = "windows")]
impl ComApartmentGuard {
    fn enter() -> Self {
        use windows_sys::Win32::System::Com::{
            CoInitializeEx, COINIT_APARTMENTTHREADED, COINIT_DISABLE_OLE1DDE,
        };

        let hr = unsafe {
            CoInitializeEx(
                std::ptr::null(),
                COINIT_APARTMENTTHREADED | COINIT_DISABLE_OLE1DDE,
            )
        };
        if hr < 0 {
            logging::error(&format!(
                "CoInitializeEx failed on apartment worker: 0x{:08X}",
                hr as u32
            ));
        }
        Self {
            initialized: hr >= 0,
        }
    }
}

#[cfg(target_os = "windows")]
impl Drop for ComApartmentGuard {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                windows_sys::Win32::System::Com::CoUninitialize();
            }
        }
    }
}

#[cfg(not(target_os = "windows"))]
struct ComApartmentGuard;

#[cfg(not(target_os = "windows"))]
impl ComApartmentGuard {
    fn enter() -> Self {
        Self
    }
}

/// Runs every job on the calling thread. Stand-in for tests and for
/// single-threaded hosts that already own the apartment.
#[derive(Debug, Default)]
pub struct InlineApartment;

impl Apartment for InlineApartment {
    fn dispatch(&self, job: Job) -> Result<(), ApartmentError> {
        job();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_apartment_runs_on_caller_thread() {
        let caller = thread::current().id();
        let ran_on = run_affine(&InlineApartment, || thread::current().id()).unwrap();
        assert_eq!(ran_on, caller);
    }

    #[test]
    fn panic_message_reads_string_payloads() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bad icon"));
        assert_eq!(panic_message(&*payload), "bad icon");
    }
}
