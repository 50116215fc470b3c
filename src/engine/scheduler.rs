use crate::segments::{
    should_hide_for_width, CachePolicy, CachedSegment, Environment, Execution, Outcome,
    ProviderRegistry, Segment,
};
use crate::template::SegmentData;
use crate::utils::{CacheStore, ProcessTracker};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// A background completion for a segment that was rendered as pending.
/// `execution` is `None` when the provider panicked.
#[derive(Debug)]
pub struct PendingUpdate {
    pub block: usize,
    pub index: usize,
    pub execution: Option<Execution>,
}

#[derive(Debug)]
struct Completion {
    index: usize,
    outcome: Outcome,
}

/// Everything a segment task needs, detached from the segment itself so the
/// dispatcher stays the only owner of render state.
struct Job {
    block: usize,
    index: usize,
    name: String,
    segment_type: String,
    options: Map<String, Value>,
    timeout: Option<Duration>,
    cache_policy: Option<CachePolicy>,
    min_width: usize,
    max_width: usize,
}

impl Job {
    fn new(block: usize, index: usize, segment: &Segment) -> Self {
        Self {
            block,
            index,
            name: segment.name().to_string(),
            segment_type: segment.config.segment_type.clone(),
            options: segment.config.properties.clone(),
            timeout: segment.timeout(),
            cache_policy: segment.cache_policy(),
            min_width: segment.config.min_width,
            max_width: segment.config.max_width,
        }
    }
}

/// Runs every segment of a block concurrently and hands them back in
/// configuration order once their needs are met.
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<ProviderRegistry>,
    env: Arc<Environment>,
    cache: CacheStore,
    data: SegmentData,
    updates: Option<mpsc::Sender<PendingUpdate>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        env: Arc<Environment>,
        cache: CacheStore,
        data: SegmentData,
    ) -> Self {
        Self {
            registry,
            env,
            cache,
            data,
            updates: None,
            tasks: Arc::default(),
        }
    }

    /// Route background completions of timed out segments to `updates`
    /// instead of only caching them.
    pub fn set_updates(&mut self, updates: Option<mpsc::Sender<PendingUpdate>>) {
        self.updates = updates;
    }

    pub fn is_streaming(&self) -> bool {
        self.updates.is_some()
    }

    pub fn data(&self) -> &SegmentData {
        &self.data
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Execute `segments`, rendering each one and passing it to `on_ready` in
    /// configuration order. A segment is rendered once every name in its needs
    /// is in `executed`; segments whose needs never arrive are flushed in
    /// order after all tasks reported.
    pub async fn run<F>(
        &self,
        block: usize,
        segments: &mut [Segment],
        executed: &mut HashSet<String>,
        globals: &Map<String, Value>,
        pending_text: &str,
        mut on_ready: F,
    ) where
        F: FnMut(usize, &Segment),
    {
        let count = segments.len();
        if count == 0 {
            return;
        }

        let (tx, mut rx) = mpsc::channel::<Completion>(count);

        {
            let mut tasks = self.tasks.lock().await;
            tasks.retain(|task| !task.is_finished());

            for (index, segment) in segments.iter().enumerate() {
                let job = Job::new(block, index, segment);
                tasks.push(tokio::spawn(self.clone().execute(job, tx.clone())));
            }
        }
        drop(tx);

        let mut done = vec![false; count];
        let mut received = 0;
        let mut current = 0;

        while received < count {
            let Some(completion) = rx.recv().await else {
                break;
            };
            received += 1;

            let segment = &mut segments[completion.index];
            segment.apply(completion.outcome);
            if segment.enabled {
                self.data.insert(segment.name(), segment.record.clone());
            }

            done[completion.index] = true;
            executed.insert(segment.name().to_string());

            while current < count && done[current] && can_render(&segments[current], executed) {
                self.render(&mut segments[current], globals, pending_text);
                on_ready(current, &segments[current]);
                current += 1;
            }
        }

        for index in current..count {
            if !done[index] {
                warn!(segment = %segments[index].name(), "segment task vanished");
                segments[index].disable();
            } else {
                debug!(segment = %segments[index].name(), needs = ?segments[index].needs(), "rendering with unmet needs");
            }

            self.render(&mut segments[index], globals, pending_text);
            on_ready(index, &segments[index]);
        }
    }

    /// Wait until `limit` for segment tasks still running after their render,
    /// which is how timed out segments get their late results cached.
    /// Returns the number of tasks left running.
    pub async fn drain(&self, limit: Duration) -> usize {
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        let deadline = tokio::time::Instant::now() + limit;
        let mut abandoned = 0;

        for task in tasks {
            if task.is_finished() {
                continue;
            }

            if tokio::time::timeout_at(deadline, task).await.is_err() {
                abandoned += 1;
            }
        }

        if abandoned > 0 {
            debug!(abandoned, "background segments still running");
        }

        abandoned
    }

    /// Render one segment and write its cache entry when one is owed.
    pub fn render(&self, segment: &mut Segment, globals: &Map<String, Value>, pending_text: &str) {
        segment.render(globals, &self.data, pending_text);

        if let Some((key, cached, ttl)) = segment.take_unsaved() {
            self.store(key, &cached, ttl);
        }
    }

    fn store(&self, key: String, cached: &CachedSegment, ttl: Duration) {
        match serde_json::to_value(cached) {
            Ok(value) => {
                trace!(key = %key, "caching segment");
                self.cache.set(key, value, ttl);
            }
            Err(err) => debug!(key = %key, error = %err, "failed to serialize segment"),
        }
    }

    fn restore(&self, key: &str) -> Option<CachedSegment> {
        let value = self.cache.get(key)?;
        match serde_json::from_value(value) {
            Ok(cached) => Some(cached),
            Err(err) => {
                debug!(key = %key, error = %err, "discarding unreadable cache entry");
                self.cache.remove(key);
                None
            }
        }
    }

    async fn execute(self, job: Job, tx: mpsc::Sender<Completion>) {
        let index = job.index;
        let started = Instant::now();

        let report = |outcome: Outcome| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(Completion { index, outcome }).await;
            }
        };

        let Some(mut provider) = self.registry.create(&job.segment_type) else {
            warn!(segment = %job.name, segment_type = %job.segment_type, "unknown segment type");
            report(Outcome::Disabled).await;
            return;
        };

        if should_hide_for_width(self.env.flags.terminal_width, job.min_width, job.max_width) {
            report(Outcome::Disabled).await;
            return;
        }

        provider.init(&job.options, &self.env);

        let cache_key = job
            .cache_policy
            .map(|policy| Segment::scope_key(&job.name, policy.strategy, provider.cache_key(), &self.env));

        let mut refreshing = false;
        if let (Some(key), false) = (&cache_key, self.env.flags.force) {
            if let Some(cached) = self.restore(key) {
                debug!(segment = %job.name, "restored from cache");
                let streaming = self.is_streaming();
                report(Outcome::Restored {
                    cached,
                    cache_key: key.clone(),
                    refreshing: streaming,
                })
                .await;

                if !streaming {
                    return;
                }
                refreshing = true;
            }
        }

        let tracker = ProcessTracker::new();

        let mut handle: JoinHandle<Execution> = tokio::spawn(tracker.clone().scope(async move {
            let started = Instant::now();
            let enabled = provider.enabled().await;

            Execution {
                enabled,
                record: provider.record(),
                template: provider.template().to_string(),
                cache_key,
                duration: started.elapsed(),
            }
        }));

        if !refreshing {
            let result = match job.timeout {
                Some(timeout) => match tokio::time::timeout(timeout, &mut handle).await {
                    Ok(result) => Some(result),
                    Err(_) => {
                        debug!(segment = %job.name, timeout_ms = timeout.as_millis() as u64, "segment timed out");
                        tracker.terminate();
                        report(Outcome::Pending {
                            elapsed: started.elapsed(),
                        })
                        .await;
                        None
                    }
                },
                None => Some((&mut handle).await),
            };

            if let Some(result) = result {
                let outcome = match result {
                    Ok(execution) => {
                        trace!(segment = %job.name, duration_ms = execution.duration.as_millis() as u64, enabled = execution.enabled, "segment executed");
                        Outcome::Executed(execution)
                    }
                    Err(err) => {
                        warn!(segment = %job.name, error = %err, "segment provider failed");
                        Outcome::Disabled
                    }
                };
                report(outcome).await;
                return;
            }
        }

        // The dispatcher has its answer; drop our handle on its queue before
        // waiting on the background work.
        drop(report);
        drop(tx);

        let execution = match handle.await {
            Ok(execution) => Some(execution),
            Err(err) => {
                warn!(segment = %job.name, error = %err, "background segment failed");
                None
            }
        };

        self.finish_background(job, execution).await;
    }

    async fn finish_background(&self, job: Job, execution: Option<Execution>) {
        if let Some(updates) = &self.updates {
            let update = PendingUpdate {
                block: job.block,
                index: job.index,
                execution,
            };
            if updates.send(update).await.is_err() {
                trace!(segment = %job.name, "streaming already finished");
            }
            return;
        }

        // Nobody renders this result now; keep it for the next prompt.
        let Some(execution) = execution else {
            return;
        };

        if !execution.enabled {
            return;
        }

        if let (Some(policy), Some(key)) = (job.cache_policy, execution.cache_key.clone()) {
            debug!(segment = %job.name, "caching background completion");
            self.store(key, &execution.cached(), policy.ttl);
        }
    }
}

fn can_render(segment: &Segment, executed: &HashSet<String>) -> bool {
    segment.needs().iter().all(|need| executed.contains(need))
}
