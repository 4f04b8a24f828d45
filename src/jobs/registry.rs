//! Live job registry
//!
//! Tracks the jobs this process knows about: a watch channel publishing each
//! job's latest state, its cancellation token, whether this process runs it
//! or follows another process that does, and an index from URL to the single
//! non-terminal job for it.
//!
//! Finished jobs are dropped once nobody is watching them; their final state
//! stays in the repository.

use super::AnalysisJob;
use std::collections::HashMap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub(crate) struct JobHandle {
    pub state: watch::Sender<AnalysisJob>,
    pub cancel: CancellationToken,
    /// `false` while another process holds the job's lease
    pub owned: bool,
}

impl JobHandle {
    fn is_settled(&self) -> bool {
        self.state.borrow().is_terminal() && self.state.receiver_count() == 0
    }
}

#[derive(Default)]
pub(crate) struct JobRegistry {
    jobs: HashMap<Uuid, JobHandle>,
    active_by_url: HashMap<String, Uuid>,
}

impl JobRegistry {
    /// Start tracking a job; returns its cancellation token
    pub fn register(
        &mut self,
        job: AnalysisJob,
        parent: &CancellationToken,
        owned: bool,
    ) -> CancellationToken {
        self.jobs.retain(|_, handle| !handle.is_settled());

        let cancel = parent.child_token();
        if !job.is_terminal() {
            self.active_by_url.insert(job.target_url.clone(), job.id);
        }
        let (state, _) = watch::channel(job.clone());
        self.jobs.insert(
            job.id,
            JobHandle {
                state,
                cancel: cancel.clone(),
                owned,
            },
        );
        cancel
    }

    pub fn active_for(&self, url: &str) -> Option<Uuid> {
        self.active_by_url.get(url).copied()
    }

    pub fn get(&self, id: &Uuid) -> Option<&JobHandle> {
        self.jobs.get(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.jobs.contains_key(id)
    }

    pub fn set_owned(&mut self, id: &Uuid, owned: bool) {
        if let Some(handle) = self.jobs.get_mut(id) {
            handle.owned = owned;
        }
    }

    /// Publish a new state; terminal jobs leave the URL index, and leave the
    /// registry too when nobody is subscribed
    pub fn publish(&mut self, job: AnalysisJob) {
        let id = job.id;
        if job.is_terminal() && self.active_by_url.get(&job.target_url) == Some(&id) {
            self.active_by_url.remove(&job.target_url);
        }
        let Some(handle) = self.jobs.get(&id) else {
            return;
        };
        handle.state.send_replace(job);
        if handle.is_settled() {
            self.jobs.remove(&id);
        }
    }

    /// Stop tracking a job without a final state; subscribers see the channel close
    pub fn forget(&mut self, id: &Uuid) {
        if let Some(handle) = self.jobs.remove(id) {
            let url = handle.state.borrow().target_url.clone();
            if self.active_by_url.get(&url) == Some(id) {
                self.active_by_url.remove(&url);
            }
        }
    }

    pub fn subscribe(&self, id: &Uuid) -> Option<watch::Receiver<AnalysisJob>> {
        self.jobs.get(id).map(|h| h.state.subscribe())
    }

    pub fn snapshot(&self, id: &Uuid) -> Option<AnalysisJob> {
        self.jobs.get(id).map(|h| h.state.borrow().clone())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_url_index_follows_terminal_state() {
        let mut registry = JobRegistry::default();
        let root = CancellationToken::new();
        let mut job = AnalysisJob::new("https://a.test/post", vec![]);
        registry.register(job.clone(), &root, true);
        let watcher = registry.subscribe(&job.id).unwrap();

        assert_eq!(registry.active_for("https://a.test/post"), Some(job.id));
        assert!(registry.contains(&job.id));

        job.fail(ErrorKind::Cancelled, "cancelled").unwrap();
        registry.publish(job.clone());
        assert_eq!(registry.active_for("https://a.test/post"), None);
        assert_eq!(registry.snapshot(&job.id).unwrap().stage, job.stage);
        assert_eq!(watcher.borrow().stage, job.stage);
    }

    #[test]
    fn test_finished_jobs_are_dropped() {
        let mut registry = JobRegistry::default();
        let root = CancellationToken::new();

        // Nobody watching: gone as soon as it finishes
        let mut unwatched = AnalysisJob::new("https://a.test/one", vec![]);
        registry.register(unwatched.clone(), &root, true);
        unwatched.fail(ErrorKind::FetchFailed, "HTTP 404").unwrap();
        registry.publish(unwatched.clone());
        assert!(!registry.contains(&unwatched.id));

        // Watched: kept until the watcher goes away, then swept on the next registration
        let mut watched = AnalysisJob::new("https://a.test/two", vec![]);
        registry.register(watched.clone(), &root, true);
        let watcher = registry.subscribe(&watched.id).unwrap();
        watched.fail(ErrorKind::FetchFailed, "HTTP 404").unwrap();
        registry.publish(watched.clone());
        assert!(registry.contains(&watched.id));

        drop(watcher);
        let next = AnalysisJob::new("https://a.test/three", vec![]);
        registry.register(next.clone(), &root, true);
        assert!(!registry.contains(&watched.id));
        assert_eq!(registry.len(), 1);

        for i in 0..100 {
            let mut job = AnalysisJob::new(format!("https://a.test/{}", i), vec![]);
            registry.register(job.clone(), &root, true);
            job.fail(ErrorKind::Cancelled, "cancelled").unwrap();
            registry.publish(job);
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_forget_closes_channel() {
        let mut registry = JobRegistry::default();
        let root = CancellationToken::new();
        let job = AnalysisJob::new("https://a.test/post", vec![]);
        registry.register(job.clone(), &root, false);
        let watcher = registry.subscribe(&job.id).unwrap();

        registry.forget(&job.id);
        assert!(watcher.has_changed().is_err());
        assert_eq!(registry.active_for("https://a.test/post"), None);
    }

    #[test]
    fn test_parent_cancellation_reaches_jobs() {
        let mut registry = JobRegistry::default();
        let root = CancellationToken::new();
        let job = AnalysisJob::new("https://a.test/post", vec![]);
        let token = registry.register(job.clone(), &root, true);

        root.cancel();
        assert!(token.is_cancelled());
        assert!(registry.get(&job.id).unwrap().cancel.is_cancelled());
    }
}
