//! One tick: retrain stale models, then run the due prediction pipelines in
//! dependency order and publish what they produce.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::board::ForecastSink;
use super::scheduler::{RetrainPolicy, ScheduleEntry, TaskStatus};
use super::settings::SettingsSource;
use super::stages::{ForecastStage, StageContext, Trainable};
use crate::domain::time::prediction_window;
use crate::domain::{ForecastKind, ForecastSeries};
use crate::error::{ForecastError, ForecastResult};

pub const DEFAULT_DAYS_FORWARD: u32 = 7;
pub const DEFAULT_DAYS_BACK: u32 = 0;

struct Pipeline {
    schedule: ScheduleEntry,
    stage: Arc<dyn ForecastStage>,
    status: TaskStatus,
}

struct Training {
    model: Arc<dyn Trainable>,
    status: TaskStatus,
}

/// What a tick did, for the driver's log line.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub trained: Vec<&'static str>,
    pub training_failed: Vec<&'static str>,
    pub updated: Vec<ForecastKind>,
    pub failed: Vec<ForecastKind>,
    pub skipped: Vec<ForecastKind>,
}

pub struct Coordinator {
    tz: Tz,
    settings: Arc<dyn SettingsSource>,
    sink: Arc<dyn ForecastSink>,
    policy: RetrainPolicy,
    days_back: u32,
    days_forward: u32,
    trainables: Vec<Training>,
    pipelines: Vec<Pipeline>,
    published: BTreeMap<ForecastKind, Arc<ForecastSeries>>,
}

impl Coordinator {
    pub fn new(tz: Tz, settings: Arc<dyn SettingsSource>, sink: Arc<dyn ForecastSink>) -> Self {
        Self {
            tz,
            settings,
            sink,
            policy: RetrainPolicy::default(),
            days_back: DEFAULT_DAYS_BACK,
            days_forward: DEFAULT_DAYS_FORWARD,
            trainables: Vec::new(),
            pipelines: Vec::new(),
            published: BTreeMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetrainPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_window(mut self, days_back: u32, days_forward: u32) -> Self {
        self.days_back = days_back;
        self.days_forward = days_forward;
        self
    }

    pub fn with_trainable(mut self, model: Arc<dyn Trainable>) -> Self {
        self.trainables.push(Training {
            model,
            status: TaskStatus::default(),
        });
        self
    }

    /// Pipelines run in the order they are added.
    pub fn with_stage(mut self, stage: Arc<dyn ForecastStage>, interval: chrono::Duration) -> Self {
        self.pipelines.push(Pipeline {
            schedule: ScheduleEntry::new(stage.kind(), interval),
            stage,
            status: TaskStatus::default(),
        });
        self
    }

    pub fn published(&self, kind: ForecastKind) -> Option<Arc<ForecastSeries>> {
        self.published.get(&kind).cloned()
    }

    /// True once every pipeline has produced a result at least once.
    pub fn is_bootstrapped(&self) -> bool {
        self.published.len() == self.pipelines.len()
    }

    /// Runs one tick. Returns `NotReady` when a pipeline fails before every
    /// pipeline has produced a result; later stages of that tick are skipped.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> ForecastResult<TickReport> {
        let local = now.with_timezone(&self.tz);
        let mut report = TickReport::default();

        self.train_stale(now, &mut report).await;

        let settings = self.settings.resolve().await.map_err(|e| {
            warn!(error = %e, "could not resolve settings for this tick");
            e.to_string()
        });
        let window = prediction_window(local, self.days_back, self.days_forward);

        for i in 0..self.pipelines.len() {
            let kind = self.pipelines[i].schedule.kind;
            if !self.pipelines[i].schedule.is_due(now) {
                report.skipped.push(kind);
                continue;
            }

            let stage = self.pipelines[i].stage.clone();
            let started = Instant::now();
            let outcome = {
                let ctx = StageContext::new(local, window, self.days_forward, &settings, &self.published);
                stage.run(&ctx).await
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(series) => {
                    let series = Arc::new(series);
                    info!(%kind, points = series.len(), elapsed_ms, "forecast updated");
                    self.published.insert(kind, series.clone());
                    self.sink.publish(kind, series);

                    let pipeline = &mut self.pipelines[i];
                    pipeline.schedule.mark_run(now);
                    pipeline.status.record_success(now);
                    self.sink.record_status(&task_name("predict", kind), &pipeline.status);
                    report.updated.push(kind);
                }
                Err(e) => {
                    let pipeline = &mut self.pipelines[i];
                    pipeline.status.record_failure(now, e.to_string());
                    self.sink.record_status(&task_name("predict", kind), &pipeline.status);
                    self.sink.report_failure(kind, &e.to_string());

                    if !self.is_bootstrapped() {
                        warn!(%kind, error = %e, elapsed_ms, "forecast failed before every forecast was produced");
                        return Err(ForecastError::NotReady {
                            kind,
                            source: Box::new(e),
                        });
                    }
                    warn!(%kind, error = %e, elapsed_ms, "forecast update failed, keeping previous result");
                    report.failed.push(kind);
                }
            }
        }

        Ok(report)
    }

    async fn train_stale(&mut self, now: DateTime<Utc>, report: &mut TickReport) {
        let (start, end) = self.policy.history_window(now);
        for training in &mut self.trainables {
            let name = training.model.name();
            if !self.policy.is_due(training.model.last_trained(), now) {
                continue;
            }

            info!(model = name, %start, %end, "training model");
            let started = Instant::now();
            match training.model.train(start, end).await {
                Ok(models) => {
                    info!(model = name, models, elapsed_ms = started.elapsed().as_millis() as u64, "training finished");
                    training.status.record_success(now);
                    report.trained.push(name);
                }
                Err(e) => {
                    warn!(model = name, error = %e, "training failed");
                    training.status.record_failure(now, e.to_string());
                    report.training_failed.push(name);
                }
            }
            self.sink.record_status(&format!("train_{name}"), &training.status);
        }
    }
}

fn task_name(prefix: &str, kind: ForecastKind) -> String {
    format!("{prefix}_{kind}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::board::MockForecastSink;
    use crate::controller::settings::TickSettings;
    use crate::domain::{ChannelNames, ForecastPoint};
    use crate::forecast::test_support::settings;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use chrono_tz::Europe::Prague;
    use parking_lot::Mutex;

    /// Fails while `fail` is set, otherwise returns a one-point series.
    struct ScriptedStage {
        kind: ForecastKind,
        fail: Mutex<bool>,
        runs: Mutex<usize>,
    }

    impl ScriptedStage {
        fn new(kind: ForecastKind, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail: Mutex::new(fail),
                runs: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ForecastStage for ScriptedStage {
        fn kind(&self) -> ForecastKind {
            self.kind
        }

        async fn run(&self, ctx: &StageContext<'_>) -> ForecastResult<ForecastSeries> {
            *self.runs.lock() += 1;
            if *self.fail.lock() {
                return Err(ForecastError::UpstreamUnavailable(format!("{} source down", self.kind)));
            }
            for upstream in self.kind.upstream() {
                ctx.upstream(*upstream)?;
            }
            Ok(ForecastSeries::new(
                vec![ForecastPoint::single(ctx.now.fixed_offset(), 1.0)],
                ChannelNames::SOLAR,
                Utc::now(),
            ))
        }
    }

    struct ScriptedModel {
        last: Mutex<Option<DateTime<Utc>>>,
        trains: Mutex<usize>,
    }

    #[async_trait]
    impl Trainable for ScriptedModel {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn last_trained(&self) -> Option<DateTime<Utc>> {
            *self.last.lock()
        }

        async fn train(&self, _start: DateTime<Utc>, end: DateTime<Utc>) -> ForecastResult<usize> {
            *self.trains.lock() += 1;
            *self.last.lock() = Some(end + Duration::hours(1));
            Ok(1)
        }
    }

    fn t0() -> DateTime<Utc> {
        Prague.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap().with_timezone(&Utc)
    }

    fn tick_settings() -> Arc<TickSettings> {
        Arc::new(TickSettings {
            settings: settings(),
            battery_capacity_pct: 50.0,
        })
    }

    fn relaxed_sink() -> MockForecastSink {
        let mut sink = MockForecastSink::new();
        sink.expect_publish().returning(|_, _| ());
        sink.expect_report_failure().returning(|_, _| ());
        sink.expect_record_status().returning(|_, _| ());
        sink
    }

    fn coordinator(stages: &[Arc<ScriptedStage>], sink: MockForecastSink) -> Coordinator {
        stages.iter().fold(
            Coordinator::new(Prague, tick_settings(), Arc::new(sink)),
            |c, s| {
                let interval = match s.kind {
                    ForecastKind::Solar | ForecastKind::Consumption => Duration::minutes(15),
                    ForecastKind::Battery | ForecastKind::Grid => Duration::minutes(1),
                };
                c.with_stage(s.clone(), interval)
            },
        )
    }

    fn all_stages(grid_fails: bool) -> Vec<Arc<ScriptedStage>> {
        vec![
            ScriptedStage::new(ForecastKind::Solar, false),
            ScriptedStage::new(ForecastKind::Consumption, false),
            ScriptedStage::new(ForecastKind::Battery, false),
            ScriptedStage::new(ForecastKind::Grid, grid_fails),
        ]
    }

    #[tokio::test]
    async fn test_first_tick_publishes_in_dependency_order() {
        let mut sink = MockForecastSink::new();
        let mut seq = mockall::Sequence::new();
        for kind in ForecastKind::ALL {
            sink.expect_publish()
                .withf(move |k, _| *k == kind)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _| ());
        }
        sink.expect_record_status().returning(|_, _| ());

        let mut coordinator = coordinator(&all_stages(false), sink);
        let report = coordinator.tick(t0()).await.unwrap();
        assert_eq!(report.updated, ForecastKind::ALL.to_vec());
        assert!(coordinator.is_bootstrapped());
    }

    #[tokio::test]
    async fn test_bootstrap_failure_is_not_ready() {
        let mut coordinator = coordinator(&all_stages(true), relaxed_sink());
        let err = coordinator.tick(t0()).await.unwrap_err();
        assert!(matches!(err, ForecastError::NotReady { kind: ForecastKind::Grid, .. }), "{err}");
        assert!(!coordinator.is_bootstrapped());
        assert!(coordinator.published(ForecastKind::Battery).is_some());
    }

    #[tokio::test]
    async fn test_not_ready_skips_remaining_stages() {
        let stages = vec![
            ScriptedStage::new(ForecastKind::Solar, true),
            ScriptedStage::new(ForecastKind::Consumption, false),
        ];
        let mut coordinator = coordinator(&stages, relaxed_sink());
        assert!(coordinator.tick(t0()).await.unwrap_err().is_not_ready());
        assert_eq!(*stages[1].runs.lock(), 0);
    }

    #[tokio::test]
    async fn test_steady_state_failure_keeps_previous_result() {
        let stages = all_stages(false);
        let mut sink = MockForecastSink::new();
        sink.expect_publish().times(4 + 3).returning(|_, _| ());
        sink.expect_report_failure()
            .withf(|k, e| *k == ForecastKind::Solar && e.contains("source down"))
            .times(1)
            .returning(|_, _| ());
        sink.expect_record_status().returning(|_, _| ());
        let mut coordinator = coordinator(&stages, sink);
        coordinator.tick(t0()).await.unwrap();
        let first_solar = coordinator.published(ForecastKind::Solar).unwrap();

        *stages[0].fail.lock() = true;
        let report = coordinator.tick(t0() + Duration::minutes(15)).await.unwrap();
        assert_eq!(report.failed, vec![ForecastKind::Solar]);
        assert_eq!(
            report.updated,
            vec![ForecastKind::Consumption, ForecastKind::Battery, ForecastKind::Grid]
        );
        assert!(Arc::ptr_eq(&first_solar, &coordinator.published(ForecastKind::Solar).unwrap()));
    }

    #[tokio::test]
    async fn test_pipelines_wait_for_their_interval() {
        let stages = all_stages(false);
        let mut coordinator = coordinator(&stages, relaxed_sink());
        coordinator.tick(t0()).await.unwrap();

        let report = coordinator.tick(t0() + Duration::minutes(1)).await.unwrap();
        assert_eq!(report.skipped, vec![ForecastKind::Solar, ForecastKind::Consumption]);
        assert_eq!(report.updated, vec![ForecastKind::Battery, ForecastKind::Grid]);
        assert_eq!(*stages[0].runs.lock(), 1);
        assert_eq!(*stages[2].runs.lock(), 2);
    }

    #[tokio::test]
    async fn test_stale_models_retrained_once_per_interval() {
        let model = Arc::new(ScriptedModel {
            last: Mutex::new(None),
            trains: Mutex::new(0),
        });
        let mut sink = MockForecastSink::new();
        sink.expect_record_status()
            .withf(|task, status| task == "train_scripted" && status.last_error.is_none())
            .times(2)
            .returning(|_, _| ());
        let mut coordinator = Coordinator::new(Prague, tick_settings(), Arc::new(sink)).with_trainable(model.clone());

        let report = coordinator.tick(t0()).await.unwrap();
        assert_eq!(report.trained, vec!["scripted"]);
        coordinator.tick(t0() + Duration::hours(12)).await.unwrap();
        assert_eq!(*model.trains.lock(), 1);
        coordinator.tick(t0() + Duration::hours(25)).await.unwrap();
        assert_eq!(*model.trains.lock(), 2);
    }
}
