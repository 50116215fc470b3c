use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use shell_powerline::config::SegmentConfig;
use shell_powerline::engine::Scheduler;
use shell_powerline::segments::{Environment, Flags, Provider, ProviderRegistry, Segment};
use shell_powerline::template::SegmentData;
use shell_powerline::terminal::Shell;
use shell_powerline::utils::CacheStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Sleeps for `delay` milliseconds, then exposes `value`.
#[derive(Default)]
struct Sleepy {
    delay: u64,
    value: String,
}

#[async_trait]
impl Provider for Sleepy {
    fn init(&mut self, options: &Map<String, Value>, _env: &Environment) {
        self.delay = options.get("delay").and_then(Value::as_u64).unwrap_or(0);
        self.value = options
            .get("value")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
    }

    async fn enabled(&mut self) -> bool {
        tokio::time::sleep(Duration::from_millis(self.delay)).await;
        true
    }

    fn template(&self) -> &str {
        "{{ .Value }}"
    }

    fn record(&self) -> Value {
        json!({ "Value": self.value })
    }
}

fn scheduler() -> Scheduler {
    let mut registry = ProviderRegistry::builtin();
    registry.register("sleepy", || Box::new(Sleepy::default()));

    let env = Environment::new(std::env::temp_dir(), Shell::Generic, Flags::default());
    Scheduler::new(
        Arc::new(registry),
        Arc::new(env),
        CacheStore::in_memory(),
        SegmentData::new(),
    )
}

fn sleepy(name: &str, delay: u64, template: Option<&str>) -> Segment {
    let config: SegmentConfig = serde_json::from_value(json!({
        "type": "sleepy",
        "alias": name,
        "template": template,
        "properties": { "delay": delay, "value": name.to_lowercase() }
    }))
    .unwrap();
    Segment::new(config)
}

async fn run(segments: &mut [Segment]) -> Vec<(usize, String)> {
    let scheduler = scheduler();
    let mut executed = HashSet::new();
    let mut order = Vec::new();

    scheduler
        .run(0, segments, &mut executed, &Map::new(), "...", |index, segment| {
            order.push((index, segment.text.clone()));
        })
        .await;

    order
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn segments_come_out_in_configuration_order(delays in prop::collection::vec(0u64..15, 1..6)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();

        let mut segments: Vec<Segment> = delays
            .iter()
            .enumerate()
            .map(|(index, delay)| sleepy(&format!("S{}", index), *delay, None))
            .collect();

        let order = runtime.block_on(run(&mut segments));

        let indices: Vec<usize> = order.iter().map(|(index, _)| *index).collect();
        prop_assert_eq!(indices, (0..delays.len()).collect::<Vec<_>>());

        for (index, text) in order {
            prop_assert_eq!(text, format!("s{}", index));
        }
    }

    #[test]
    fn dependents_always_see_their_needs(head_delay in 0u64..10, tail_delay in 0u64..20) {
        let runtime = tokio::runtime::Runtime::new().unwrap();

        let mut segments = vec![
            sleepy("Head", head_delay, Some("{{ .Value }}+{{ .Segments.Tail.Value }}")),
            sleepy("Middle", 0, None),
            sleepy("Tail", tail_delay, None),
        ];

        let order = runtime.block_on(run(&mut segments));

        prop_assert_eq!(order[0].clone(), (0, "head+tail".to_string()));
        prop_assert_eq!(order.len(), 3);
    }
}

#[tokio::test]
async fn test_need_on_absent_segment_is_flushed_in_order() {
    let mut segments = vec![
        sleepy("First", 0, Some("{{ .Value }}{{ .Segments.Nowhere.Value }}")),
        sleepy("Second", 10, None),
    ];

    let order = run(&mut segments).await;

    assert_eq!(
        order,
        vec![(0, "first".to_string()), (1, "second".to_string())]
    );
}

#[tokio::test]
async fn test_timeout_shows_placeholder_and_caches_late_result() {
    let cache = CacheStore::in_memory();
    let mut registry = ProviderRegistry::builtin();
    registry.register("sleepy", || Box::new(Sleepy::default()));
    let registry = Arc::new(registry);
    let env = Arc::new(
        Environment::new(std::env::temp_dir(), Shell::Generic, Flags::default()).with_session_id("t"),
    );

    let slow = || {
        let config: SegmentConfig = serde_json::from_value(json!({
            "type": "sleepy",
            "alias": "Slow",
            "timeout": 50,
            "cache": { "strategy": "session", "duration": "1m" },
            "properties": { "delay": 200, "value": "slow" }
        }))
        .unwrap();
        vec![Segment::new(config)]
    };

    let scheduler = Scheduler::new(
        Arc::clone(&registry),
        Arc::clone(&env),
        cache.clone(),
        SegmentData::new(),
    );
    let mut segments = slow();
    let started = std::time::Instant::now();
    let mut executed = HashSet::new();
    let mut texts = Vec::new();
    scheduler
        .run(0, &mut segments, &mut executed, &Map::new(), "...", |_, segment| {
            texts.push(segment.text.clone())
        })
        .await;

    assert!(started.elapsed() < Duration::from_millis(190));
    assert_eq!(texts, vec!["...".to_string()]);
    assert!(segments[0].pending);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(cache.get("segment_cache_Slow_t").is_some());

    let scheduler = Scheduler::new(registry, env, cache, SegmentData::new());
    let mut segments = slow();
    let started = std::time::Instant::now();
    let mut executed = HashSet::new();
    let mut texts = Vec::new();
    scheduler
        .run(0, &mut segments, &mut executed, &Map::new(), "...", |_, segment| {
            texts.push(segment.text.clone())
        })
        .await;

    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(texts, vec!["slow".to_string()]);
    assert!(segments[0].restored);
}

fn timed_out(alias: &str, delay: u64) -> Vec<Segment> {
    let config: SegmentConfig = serde_json::from_value(json!({
        "type": "sleepy",
        "alias": alias,
        "timeout": 20,
        "cache": { "strategy": "session", "duration": "1m" },
        "properties": { "delay": delay, "value": alias.to_lowercase() }
    }))
    .unwrap();
    vec![Segment::new(config)]
}

#[tokio::test]
async fn test_drain_waits_for_late_result_to_be_cached() {
    let cache = CacheStore::in_memory();
    let mut registry = ProviderRegistry::builtin();
    registry.register("sleepy", || Box::new(Sleepy::default()));
    let env = Environment::new(std::env::temp_dir(), Shell::Generic, Flags::default()).with_session_id("drain");
    let scheduler = Scheduler::new(Arc::new(registry), Arc::new(env), cache.clone(), SegmentData::new());

    let mut segments = timed_out("Late", 100);
    scheduler
        .run(0, &mut segments, &mut HashSet::new(), &Map::new(), "...", |_, _| {})
        .await;

    assert!(segments[0].pending);
    assert!(cache.get("segment_cache_Late_drain").is_none());

    assert_eq!(scheduler.drain(Duration::from_secs(2)).await, 0);
    assert!(cache.get("segment_cache_Late_drain").is_some());
}

#[tokio::test]
async fn test_drain_gives_up_after_limit() {
    let scheduler = scheduler();

    let mut segments = timed_out("Stuck", 1_000);
    scheduler
        .run(0, &mut segments, &mut HashSet::new(), &Map::new(), "...", |_, _| {})
        .await;

    let started = std::time::Instant::now();
    assert_eq!(scheduler.drain(Duration::from_millis(30)).await, 1);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[cfg(target_os = "linux")]
fn process_alive(pid: &str) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/status", pid)) {
        Ok(status) => !status
            .lines()
            .any(|line| line.starts_with("State:") && line.contains('Z')),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_kills_command_processes() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("sleep.pid");
    let command = format!("sleep 5 & echo $! > '{}'; wait; echo x", pid_file.display());

    let (tx, mut updates) = tokio::sync::mpsc::channel(1);
    let mut scheduler = scheduler();
    scheduler.set_updates(Some(tx));

    let config: SegmentConfig = serde_json::from_value(json!({
        "type": "command",
        "alias": "Sleeper",
        "timeout": 150,
        "properties": { "command": command }
    }))
    .unwrap();
    let mut segments = vec![Segment::new(config)];

    let started = std::time::Instant::now();
    let mut texts = Vec::new();
    scheduler
        .run(0, &mut segments, &mut HashSet::new(), &Map::new(), "...", |_, segment| {
            texts.push(segment.text.clone())
        })
        .await;

    assert_eq!(texts, vec!["...".to_string()]);
    assert!(segments[0].pending);

    let update = tokio::time::timeout(Duration::from_secs(3), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!update.execution.unwrap().enabled);

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    let mut alive = process_alive(pid.trim());
    for _ in 0..50 {
        if !alive {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        alive = process_alive(pid.trim());
    }
    assert!(!alive, "sleep {} outlived its segment", pid.trim());
}
