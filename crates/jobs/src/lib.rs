use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::{sync::Arc, thread, time::Duration};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

mod frame;
mod queue;
mod timer;
mod token;

pub use frame::{FrameRequest, FrameScheduler};
pub use queue::EventQueue;
pub use timer::Debouncer;
pub use token::SessionToken;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("worker stopped")]
    Stopped,
}

pub type Work<T> = Box<dyn FnOnce() -> Result<T, String> + Send>;

pub struct JobSpec<T> {
    pub label: String,
    pub work: Work<T>,
}

impl<T> JobSpec<T> {
    pub fn new(label: impl Into<String>, work: impl FnOnce() -> Result<T, String> + Send + 'static) -> Self {
        Self { label: label.into(), work: Box::new(work) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus<T> {
    Pending,
    Running,
    Done(T),
    Failed(String),
    Canceled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent<T> {
    pub id: String,
    pub label: String,
    pub status: JobStatus<T>,
}

type Queued<T> = (String, JobSpec<T>);

pub struct JobsHandle<T> {
    tx_submit: Sender<Queued<T>>,
    tx_cancel: Sender<String>,
    pub rx_events: Receiver<JobEvent<T>>,
}

impl<T> Clone for JobsHandle<T> {
    fn clone(&self) -> Self {
        Self { tx_submit: self.tx_submit.clone(), tx_cancel: self.tx_cancel.clone(), rx_events: self.rx_events.clone() }
    }
}

/// Background workers for work that must not run on the dispatcher: the dispatcher
/// submits a job and later drains its completion from `rx_events`.
pub struct JobsRuntime<T> {
    queue: Arc<Mutex<VecDeque<Queued<T>>>>,
    tx_events: Sender<JobEvent<T>>,
    canceled: Arc<Mutex<HashSet<String>>>,
    shutdown: Arc<AtomicBool>,
}

impl<T: Send + 'static> JobsRuntime<T> {
    pub fn start(num_workers: usize) -> JobsHandle<T> {
        let (tx_submit, rx_submit) = unbounded::<Queued<T>>();
        let (tx_cancel, rx_cancel) = unbounded::<String>();
        let (tx_events, rx_events) = unbounded::<JobEvent<T>>();

        let runtime = JobsRuntime {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            tx_events,
            canceled: Arc::new(Mutex::new(HashSet::new())),
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        runtime.spawn_workers(num_workers.max(1));

        // Feeder thread
        {
            let q = runtime.queue.clone();
            let canceled = runtime.canceled.clone();
            let tx_e = runtime.tx_events.clone();
            let shutdown = runtime.shutdown.clone();
            thread::spawn(move || {
                loop {
                    crossbeam_channel::select! {
                        recv(rx_submit) -> msg => {
                            if let Ok((id, spec)) = msg {
                                if canceled.lock().contains(&id) {
                                    let _ = tx_e.send(JobEvent { id, label: spec.label, status: JobStatus::Canceled });
                                    continue;
                                }
                                let label = spec.label.clone();
                                q.lock().push_back((id.clone(), spec));
                                let _ = tx_e.send(JobEvent { id, label, status: JobStatus::Pending });
                            }
                            else { break; }
                        }
                        recv(rx_cancel) -> msg => {
                            if let Ok(id) = msg { canceled.lock().insert(id); }
                            else { break; }
                        }
                        default(Duration::from_millis(10)) => {}
                    }
                }
                shutdown.store(true, Ordering::SeqCst);
            });
        }

        JobsHandle { tx_submit, tx_cancel, rx_events }
    }

    fn spawn_workers(&self, n: usize) {
        for _ in 0..n {
            let q = self.queue.clone();
            let tx_e = self.tx_events.clone();
            let canceled = self.canceled.clone();
            let shutdown = self.shutdown.clone();
            thread::spawn(move || loop {
                let job_opt = {
                    let mut ql = q.lock();
                    let mut found: Option<Queued<T>> = None;
                    while let Some((id, spec)) = ql.pop_front() {
                        if canceled.lock().contains(&id) {
                            let _ = tx_e.send(JobEvent { id, label: spec.label, status: JobStatus::Canceled });
                            continue;
                        }
                        found = Some((id, spec));
                        break;
                    }
                    found
                };
                if let Some((id, spec)) = job_opt {
                    let _ = tx_e.send(JobEvent { id: id.clone(), label: spec.label.clone(), status: JobStatus::Running });
                    let result = (spec.work)();
                    // A job canceled mid-flight still ran; its result is withheld.
                    let status = if canceled.lock().contains(&id) {
                        JobStatus::Canceled
                    } else {
                        match result {
                            Ok(v) => JobStatus::Done(v),
                            Err(e) => JobStatus::Failed(e),
                        }
                    };
                    debug!(job = %id, label = %spec.label, "job finished");
                    let _ = tx_e.send(JobEvent { id, label: spec.label, status });
                } else if shutdown.load(Ordering::SeqCst) {
                    break;
                } else {
                    thread::sleep(Duration::from_millis(10));
                }
            });
        }
    }
}

impl<T> JobsHandle<T> {
    pub fn enqueue(&self, spec: JobSpec<T>) -> Result<String, JobError> {
        let id = Uuid::new_v4().to_string();
        self.tx_submit.send((id.clone(), spec)).map_err(|_| JobError::Stopped)?;
        Ok(id)
    }

    pub fn cancel_job(&self, job_id: &str) {
        let _ = self.tx_cancel.send(job_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn wait_for<T>(h: &JobsHandle<T>, id: &str) -> JobStatus<T> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Ok(ev) = h.rx_events.recv_timeout(Duration::from_millis(50)) {
                if ev.id == id && !matches!(ev.status, JobStatus::Pending | JobStatus::Running) {
                    return ev.status;
                }
            }
        }
        panic!("job {id} did not finish");
    }

    #[test]
    fn runs_work_and_reports_result() {
        let h = JobsRuntime::<u32>::start(2);
        let ok = h.enqueue(JobSpec::new("ok", || Ok(7))).unwrap();
        assert_eq!(wait_for(&h, &ok), JobStatus::Done(7));
        let bad = h.enqueue(JobSpec::new("bad", || Err("boom".to_string()))).unwrap();
        assert_eq!(wait_for(&h, &bad), JobStatus::Failed("boom".into()));
    }

    #[test]
    fn single_worker_runs_jobs_in_submission_order() {
        let h = JobsRuntime::<usize>::start(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let ids: Vec<String> = (0..4)
            .map(|n| {
                let order = order.clone();
                h.enqueue(JobSpec::new(format!("job{n}"), move || { order.lock().push(n); Ok(n) })).unwrap()
            })
            .collect();
        for (n, id) in ids.iter().enumerate() {
            assert_eq!(wait_for(&h, id), JobStatus::Done(n));
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn canceled_job_reports_canceled() {
        let h = JobsRuntime::<()>::start(1);
        let slow = h.enqueue(JobSpec::new("slow", || { thread::sleep(Duration::from_millis(200)); Ok(()) })).unwrap();
        h.cancel_job(&slow);
        assert_eq!(wait_for(&h, &slow), JobStatus::Canceled);
    }
}
