//! Plugin Scheduler - 반복/일회성 백그라운드 작업
//!
//! 1초 tick 드라이버가 테이블을 훑고, 실행 시각이 된 작업마다 별도 tokio 태스크를
//! 띄운다. 작업 본문은 테이블 락 밖에서 실행되며 panic 은 작업 에러로 기록된다.

use anvil_foundation::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 드라이버 tick 간격
pub const TICK: Duration = Duration::from_secs(1);

/// 작업 본문
pub type TaskBody = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

// ============================================================================
// Task 모델
// ============================================================================

struct ScheduledTask {
    name: String,
    interval: Duration,
    next_run: Instant,
    last_run: Option<Instant>,
    body: TaskBody,
    run_count: u64,
    error_count: u64,
    last_error: Option<String>,
    enabled: bool,
    one_time: bool,
    running: bool,
}

impl ScheduledTask {
    fn is_due(&self, now: Instant) -> bool {
        self.enabled && !self.running && self.next_run <= now
    }

    fn snapshot(&self) -> TaskInfo {
        TaskInfo {
            name: self.name.clone(),
            interval: self.interval,
            next_run: self.next_run,
            last_run: self.last_run,
            run_count: self.run_count,
            error_count: self.error_count,
            last_error: self.last_error.clone(),
            enabled: self.enabled,
            one_time: self.one_time,
            running: self.running,
        }
    }
}

/// 작업 상태 스냅샷
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: String,
    pub interval: Duration,
    pub next_run: Instant,
    pub last_run: Option<Instant>,
    pub run_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub enabled: bool,
    pub one_time: bool,
    pub running: bool,
}

/// 스케줄러 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub total: usize,
    pub enabled: usize,
    pub running: usize,
    pub total_runs: u64,
    pub total_errors: u64,
}

type TaskTable = Arc<RwLock<HashMap<String, ScheduledTask>>>;

// ============================================================================
// PluginScheduler
// ============================================================================

/// 스케줄러
pub struct PluginScheduler {
    tasks: TaskTable,
    tick: Duration,
    driver: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl PluginScheduler {
    pub fn new() -> Self {
        Self::with_tick(TICK)
    }

    pub fn with_tick(tick: Duration) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            tick,
            driver: Mutex::new(None),
        }
    }

    // ========================================================================
    // 등록
    // ========================================================================

    /// `delay` 후 한 번 실행
    pub async fn schedule_once<F, Fut>(&self, name: &str, delay: Duration, f: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.insert(name, delay, true, into_body(f)).await
    }

    /// `interval` 마다 실행 (첫 실행은 `interval` 후)
    pub async fn schedule_repeating<F, Fut>(
        &self,
        name: &str,
        interval: Duration,
        f: F,
    ) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(Error::Validation(format!(
                "task {}: interval must be positive",
                name
            )));
        }
        self.insert(name, interval, false, into_body(f)).await
    }

    async fn insert(&self, name: &str, interval: Duration, one_time: bool, body: TaskBody) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(name) {
            return Err(Error::AlreadyExists(format!("task {}", name)));
        }
        tasks.insert(
            name.to_string(),
            ScheduledTask {
                name: name.to_string(),
                interval,
                next_run: Instant::now() + interval,
                last_run: None,
                body,
                run_count: 0,
                error_count: 0,
                last_error: None,
                enabled: true,
                one_time,
                running: false,
            },
        );
        debug!(
            "Scheduled task {} ({}, every {:?})",
            name,
            if one_time { "once" } else { "repeating" },
            interval
        );
        Ok(())
    }

    // ========================================================================
    // 조작
    // ========================================================================

    /// 활성화 (반복 작업은 다음 실행 시각을 지금 + interval 로 재설정)
    pub async fn enable(&self, name: &str) -> Result<()> {
        self.with_task(name, |task| {
            task.enabled = true;
            if !task.one_time {
                task.next_run = Instant::now() + task.interval;
            }
        })
        .await
    }

    pub async fn disable(&self, name: &str) -> Result<()> {
        self.with_task(name, |task| task.enabled = false).await
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        self.tasks
            .write()
            .await
            .remove(name)
            .map(|_| debug!("Removed task {}", name))
            .ok_or_else(|| Error::NotFound(format!("task {}", name)))
    }

    /// 일정과 무관하게 즉시 실행하고 결과를 기다림
    pub async fn run_now(&self, name: &str) -> Result<()> {
        let body = {
            let mut tasks = self.tasks.write().await;
            let task = tasks
                .get_mut(name)
                .ok_or_else(|| Error::NotFound(format!("task {}", name)))?;
            if task.running {
                return Err(Error::invalid_state(name, "running", "run_now"));
            }
            task.running = true;
            Arc::clone(&task.body)
        };

        match execute(Arc::clone(&self.tasks), name.to_string(), body).await {
            None => Ok(()),
            Some(message) => Err(Error::component(name, message)),
        }
    }

    async fn with_task(&self, name: &str, f: impl FnOnce(&mut ScheduledTask)) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("task {}", name)))?;
        f(task);
        Ok(())
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub async fn get(&self, name: &str) -> Result<TaskInfo> {
        self.tasks
            .read()
            .await
            .get(name)
            .map(ScheduledTask::snapshot)
            .ok_or_else(|| Error::NotFound(format!("task {}", name)))
    }

    /// 이름순 목록
    pub async fn list(&self) -> Vec<TaskInfo> {
        let mut list: Vec<_> = self
            .tasks
            .read()
            .await
            .values()
            .map(ScheduledTask::snapshot)
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    pub async fn stats(&self) -> SchedulerStats {
        let tasks = self.tasks.read().await;
        tasks.values().fold(
            SchedulerStats {
                total: tasks.len(),
                ..Default::default()
            },
            |mut stats, task| {
                stats.enabled += task.enabled as usize;
                stats.running += task.running as usize;
                stats.total_runs += task.run_count;
                stats.total_errors += task.error_count;
                stats
            },
        )
    }

    // ========================================================================
    // 드라이버
    // ========================================================================

    pub async fn is_running(&self) -> bool {
        self.driver.lock().await.is_some()
    }

    /// 드라이버 시작 (이미 실행 중이면 no-op)
    pub async fn start(&self) {
        let mut driver = self.driver.lock().await;
        if driver.is_some() {
            debug!("Scheduler already running");
            return;
        }

        let token = CancellationToken::new();
        let tasks = Arc::clone(&self.tasks);
        let tick = self.tick;
        let cancel = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => dispatch_due(&tasks).await,
                }
            }
            debug!("Scheduler driver stopped");
        });

        *driver = Some((token, handle));
        info!("Scheduler started (tick {:?})", tick);
    }

    /// 드라이버 정지 (실행 중인 작업 본문은 끝까지 실행됨)
    pub async fn stop(&self) {
        let Some((token, handle)) = self.driver.lock().await.take() else {
            return;
        };
        token.cancel();
        if let Err(e) = handle.await {
            warn!("Scheduler driver ended abnormally: {}", e);
        }
        info!("Scheduler stopped");
    }
}

impl Default for PluginScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PluginScheduler {
    fn drop(&mut self) {
        if let Some((token, _)) = self.driver.get_mut().take() {
            token.cancel();
        }
    }
}

fn into_body<F, Fut>(f: F) -> TaskBody
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// 실행 시각이 된 작업을 각각 별도 태스크로 실행
async fn dispatch_due(tasks: &TaskTable) {
    let due: Vec<(String, TaskBody)> = {
        let mut table = tasks.write().await;
        let now = Instant::now();
        table
            .values_mut()
            .filter(|task| task.is_due(now))
            .map(|task| {
                task.running = true;
                (task.name.clone(), Arc::clone(&task.body))
            })
            .collect()
    };

    for (name, body) in due {
        let tasks = Arc::clone(tasks);
        tokio::spawn(async move {
            execute(tasks, name, body).await;
        });
    }
}

/// 본문 실행 후 기록 갱신. 실패 메시지를 반환.
async fn execute(tasks: TaskTable, name: String, body: TaskBody) -> Option<String> {
    let outcome = tokio::spawn(body()).await;
    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(e) if e.is_panic() => Some(format!("task panicked: {}", e)),
        Err(e) => Some(format!("task aborted: {}", e)),
    };

    let mut table = tasks.write().await;
    if let Some(task) = table.get_mut(&name) {
        let now = Instant::now();
        task.running = false;
        task.run_count += 1;
        task.last_run = Some(now);
        if let Some(message) = &error {
            task.error_count += 1;
            task.last_error = Some(message.clone());
            warn!("Task {} failed: {}", name, message);
        }
        if task.one_time {
            task.enabled = false;
        } else {
            task.next_run = now + task.interval;
        }
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_task(
        counter: &Arc<AtomicUsize>,
    ) -> impl Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_task_runs() {
        let scheduler = PluginScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .schedule_repeating("tick", Duration::from_secs(2), counter_task(&counter))
            .await
            .unwrap();

        scheduler.start().await;
        tokio::time::sleep(Duration::from_secs(7)).await;
        scheduler.stop().await;

        let info = scheduler.get("tick").await.unwrap();
        assert!(info.run_count >= 2, "run_count = {}", info.run_count);
        assert!(info.next_run > info.last_run.unwrap());
        assert_eq!(counter.load(Ordering::SeqCst) as u64, info.run_count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_disables_itself() {
        let scheduler = PluginScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .schedule_once("once", Duration::from_secs(1), counter_task(&counter))
            .await
            .unwrap();

        scheduler.start().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        scheduler.stop().await;

        let info = scheduler.get("once").await.unwrap();
        assert_eq!(info.run_count, 1);
        assert!(!info.enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_task_does_not_block_others() {
        let scheduler = PluginScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .schedule_repeating("slow", Duration::from_secs(1), || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<(), Error>(())
            })
            .await
            .unwrap();
        scheduler
            .schedule_repeating("fast", Duration::from_secs(1), counter_task(&counter))
            .await
            .unwrap();

        scheduler.start().await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        let slow = scheduler.get("slow").await.unwrap();
        assert!(slow.running);
        assert_eq!(slow.run_count, 0);
        assert!(scheduler.get("fast").await.unwrap().run_count >= 3);
        assert_eq!(scheduler.stats().await.running, 1);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_panic_recorded_as_error() {
        let scheduler = PluginScheduler::new();
        scheduler
            .schedule_repeating("boom", Duration::from_secs(60), || async {
                if true {
                    panic!("exploded");
                }
                Ok::<(), Error>(())
            })
            .await
            .unwrap();

        let err = scheduler.run_now("boom").await.unwrap_err();
        assert!(err.to_string().contains("panicked"));

        let info = scheduler.get("boom").await.unwrap();
        assert_eq!(info.run_count, 1);
        assert_eq!(info.error_count, 1);
        assert!(!info.running);
    }

    #[tokio::test]
    async fn test_error_counts_and_stats() {
        let scheduler = PluginScheduler::new();
        scheduler
            .schedule_repeating("fails", Duration::from_secs(60), || async {
                Err::<(), Error>(Error::Internal("nope".into()))
            })
            .await
            .unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .schedule_repeating("ok", Duration::from_secs(60), counter_task(&counter))
            .await
            .unwrap();

        assert!(scheduler.run_now("fails").await.is_err());
        scheduler.run_now("ok").await.unwrap();
        scheduler.disable("ok").await.unwrap();

        let stats = scheduler.stats().await;
        assert_eq!(
            stats,
            SchedulerStats {
                total: 2,
                enabled: 1,
                running: 0,
                total_runs: 2,
                total_errors: 1,
            }
        );
        let info = scheduler.get("fails").await.unwrap();
        assert!(info.last_error.unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_name_errors() {
        let scheduler = PluginScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .schedule_once("job", Duration::from_secs(1), counter_task(&counter))
            .await
            .unwrap();

        assert!(matches!(
            scheduler
                .schedule_repeating("job", Duration::from_secs(1), counter_task(&counter))
                .await,
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(scheduler.enable("ghost").await, Err(Error::NotFound(_))));
        assert!(matches!(scheduler.disable("ghost").await, Err(Error::NotFound(_))));
        assert!(matches!(scheduler.remove("ghost").await, Err(Error::NotFound(_))));
        scheduler.remove("job").await.unwrap();
        assert!(scheduler.list().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_resets_next_run() {
        let scheduler = PluginScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .schedule_repeating("job", Duration::from_secs(10), counter_task(&counter))
            .await
            .unwrap();
        let before = scheduler.get("job").await.unwrap().next_run;

        tokio::time::advance(Duration::from_secs(4)).await;
        scheduler.disable("job").await.unwrap();
        scheduler.enable("job").await.unwrap();

        let after = scheduler.get("job").await.unwrap().next_run;
        assert_eq!(after - before, Duration::from_secs(4));
    }
}
