//! End-to-end tests of the engine through the public API.

use mediaflow::backends::{Backend, BackendError};
use mediaflow::events::{names, CollectingEventSink};
use mediaflow::host::PluginStates;
use mediaflow::prelude::*;
use mediaflow::testing::{EchoBackend, HangingBackend, RecordingStage, ScriptedBackend, SpyStage};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Harness {
    engine: PipelineEngine,
    stages: StageRegistry,
    backends: BackendRegistry,
    disposers: DisposerSet,
}

impl Harness {
    fn new(channels: Vec<Channel>, config: EngineConfig) -> Self {
        Self::with_plugins(channels, config, Arc::new(PluginStates::new()))
    }

    fn with_plugins(
        channels: Vec<Channel>,
        config: EngineConfig,
        plugins: Arc<PluginStates>,
    ) -> Self {
        let config = Arc::new(config);
        let backends = BackendRegistry::new();
        let stages = StageRegistry::new();
        let invoker = BackendInvocationService::new(backends.clone(), HostHandle::default())
            .with_plugin_status(plugins.clone());

        let mut disposers = DisposerSet::new();
        disposers.push(
            stages
                .register(RequestStage::new(invoker, config.invocation.clone()).into_definition())
                .unwrap(),
        );

        let engine = PipelineEngine::builder(
            stages.clone(),
            Arc::new(InMemoryChannels::with_channels(channels)),
        )
        .config(config)
        .plugins(plugins)
        .build();

        Self {
            engine,
            stages,
            backends,
            disposers,
        }
    }

    fn backend(&mut self, backend: Arc<dyn Backend>) {
        self.disposers.push(self.backends.register(backend).unwrap());
    }

    fn stage(&mut self, definition: StageDefinition) {
        self.disposers.push(self.stages.register(definition).unwrap());
    }
}

#[tokio::test]
async fn echo_round_trip() {
    let mut h = Harness::new(vec![Channel::new("1", "main", "echo")], EngineConfig::new());
    h.backend(Arc::new(EchoBackend::new("echo")));

    let result = h
        .engine
        .execute(GenerationRequest::new("main", "a watercolor fox"))
        .await;

    assert!(result.success, "{:?}", result.error);
    let output = result.output.unwrap();
    assert_eq!(output[0].content.as_deref(), Some("a watercolor fox"));
    assert!(result.error.is_none());
}

#[tokio::test]
async fn missing_channel_invokes_no_stage() {
    let mut h = Harness::new(vec![Channel::new("1", "main", "echo")], EngineConfig::new());
    let echo = Arc::new(EchoBackend::new("echo"));
    h.backend(echo.clone());
    let spies: Vec<Arc<SpyStage>> = Phase::ALL
        .iter()
        .map(|phase| {
            let spy = Arc::new(SpyStage::new());
            h.stage(StageDefinition::from_arc(format!("spy-{phase}"), *phase, spy.clone()));
            spy
        })
        .collect();

    let result = h.engine.execute(GenerationRequest::new("missing", "p")).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("not found"));
    assert!(spies.iter().all(|spy| spy.calls() == 0));
    assert_eq!(echo.calls(), 0);
}

#[tokio::test]
async fn stages_wrap_the_backend_call() {
    let mut h = Harness::new(vec![Channel::new("1", "main", "echo")], EngineConfig::new());
    h.backend(Arc::new(EchoBackend::new("echo")));
    let trail = Arc::new(Mutex::new(Vec::new()));
    h.stage(StageDefinition::new(
        "record",
        Phase::Finalize,
        RecordingStage::new("record", trail.clone()),
    ));
    h.stage(StageDefinition::new(
        "auth",
        Phase::Prepare,
        RecordingStage::new("auth", trail.clone()),
    ));
    h.stage(StageDefinition::new(
        "cache",
        Phase::PostRequest,
        FnStage::new(|ctx: &mut RequestContext| {
            if let Some(output) = ctx.output.as_mut() {
                for artifact in output.iter_mut() {
                    artifact.url = Some("cache://1".to_string());
                }
            }
            Ok(RunStatus::Continue)
        }),
    ));

    let result = h.engine.execute(GenerationRequest::new("main", "p")).await;

    assert_eq!(
        h.stages.graph().names(),
        vec!["auth", "request", "cache", "record"]
    );
    assert_eq!(
        *trail.lock(),
        vec!["auth:in", "record:in", "record:out", "auth:out"]
    );
    assert_eq!(result.output.unwrap()[0].url.as_deref(), Some("cache://1"));
}

#[tokio::test]
async fn stop_prevents_backend_call() {
    let mut h = Harness::new(vec![Channel::new("1", "main", "echo")], EngineConfig::new());
    let echo = Arc::new(EchoBackend::new("echo"));
    h.backend(echo.clone());
    h.stage(StageDefinition::new(
        "cached",
        Phase::Prepare,
        FnStage::new(|ctx: &mut RequestContext| {
            ctx.output = Some(vec![Artifact::text("from cache")]);
            Ok(RunStatus::Stop)
        }),
    ));

    let result = h.engine.execute(GenerationRequest::new("main", "p")).await;

    assert!(result.success);
    assert_eq!(result.output.unwrap()[0].content.as_deref(), Some("from cache"));
    assert_eq!(echo.calls(), 0);
}

#[tokio::test]
async fn disabling_a_stage_per_channel_removes_only_its_effect() {
    let mut h = Harness::new(
        vec![
            Channel::new("1", "plain", "echo"),
            Channel::new("2", "raw", "echo").with_override("preset", json!({"enabled": false})),
        ],
        EngineConfig::new(),
    );
    h.backend(Arc::new(EchoBackend::new("echo")));
    let trail = Arc::new(Mutex::new(Vec::new()));
    for phase in Phase::ALL {
        let label = format!("rec-{phase}");
        h.stage(StageDefinition::new(
            label.clone(),
            phase,
            RecordingStage::new(label, trail.clone()),
        ));
    }
    h.stage(StageDefinition::new(
        "preset",
        Phase::Prepare,
        FnStage::new(|ctx: &mut RequestContext| {
            ctx.prompt.push_str(", masterpiece");
            Ok(RunStatus::Continue)
        }),
    ));

    let with_preset = h.engine.execute(GenerationRequest::new("plain", "a cat")).await;
    let with_trail = std::mem::take(&mut *trail.lock());
    let without = h.engine.execute(GenerationRequest::new("raw", "a cat")).await;
    let without_trail = std::mem::take(&mut *trail.lock());

    assert_eq!(
        with_preset.output.unwrap()[0].content.as_deref(),
        Some("a cat, masterpiece")
    );
    assert_eq!(without.output.unwrap()[0].content.as_deref(), Some("a cat"));
    assert_eq!(with_trail, without_trail);
    assert_eq!(with_trail.len(), 2 * Phase::ALL.len());
}

#[tokio::test]
async fn disabled_plugin_removes_its_stages() {
    let plugins = Arc::new(PluginStates::new());
    let mut h = Harness::with_plugins(
        vec![Channel::new("1", "main", "echo")],
        EngineConfig::new(),
        plugins.clone(),
    );
    h.backend(Arc::new(EchoBackend::new("echo")));
    let spy = Arc::new(SpyStage::new());
    h.stage(StageDefinition::from_arc("audit", Phase::Finalize, spy.clone()).with_plugin("audit"));

    plugins.set("audit", false);
    let result = h.engine.execute(GenerationRequest::new("main", "p")).await;

    assert!(result.success);
    assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn retries_bounded_by_configuration() {
    let mut h = Harness::new(
        vec![Channel::new("1", "main", "flaky")],
        EngineConfig::new().with_retries(2),
    );
    let flaky = Arc::new(ScriptedBackend::always_failing(
        "flaky",
        BackendError::new("connect ECONNRESET"),
    ));
    h.backend(flaky.clone());

    let result = h.engine.execute(GenerationRequest::new("main", "p")).await;

    assert!(!result.success);
    assert_eq!(flaky.calls(), 3);
    assert_eq!(result.error_code, Some(ErrorKind::NetworkError.code()));
}

#[tokio::test]
async fn config_invalid_is_not_retried() {
    let mut h = Harness::new(
        vec![Channel::new("1", "main", "strict")],
        EngineConfig::new().with_retries(4),
    );
    let strict = Arc::new(ScriptedBackend::always_failing(
        "strict",
        BackendError::classified(ErrorKind::ConfigInvalid, "model is required"),
    ));
    h.backend(strict.clone());

    let result = h.engine.execute(GenerationRequest::new("main", "p")).await;

    assert_eq!(strict.calls(), 1);
    assert_eq!(result.error.as_deref(), Some("model is required"));
    assert_eq!(result.error_code, Some(3));
}

#[tokio::test]
async fn request_log_is_redacted() {
    let mut h = Harness::new(
        vec![Channel::new("1", "main", "echo").with_config(json!({
            "apiKey": "sk-live-123",
            "model": "x",
            "apiUrl": "https://api.example.com/v1/generate?key=sk-live-123",
        }))],
        EngineConfig::new(),
    );
    h.backend(Arc::new(EchoBackend::new("echo")));
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    h.stage(StageDefinition::new(
        "task",
        Phase::Finalize,
        FnStage::new(move |ctx: &mut RequestContext| {
            *sink.lock() = ctx.request_log.clone();
            Ok(RunStatus::Continue)
        }),
    ));

    let result = h.engine.execute(GenerationRequest::new("main", "p")).await;
    assert!(result.success);

    let log = seen.lock().clone().unwrap();
    let generic = log.as_generic().unwrap();
    assert_eq!(Value::Object(generic.parameters.clone()), json!({"model": "x"}));
    assert_eq!(
        generic.endpoint.as_deref(),
        Some("https://api.example.com/v1/generate")
    );
    assert!(!log.to_value().to_string().contains("sk-live-123"));
}

#[tokio::test]
async fn hanging_backend_times_out() {
    let mut h = Harness::new(
        vec![Channel::new("1", "main", "hang")],
        EngineConfig::new().with_timeout_ms(50),
    );
    h.backend(Arc::new(HangingBackend::new("hang")));

    let started = Instant::now();
    let result = h.engine.execute(GenerationRequest::new("main", "p")).await;
    let elapsed = started.elapsed();

    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorKind::Timeout.code()));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
}

#[tokio::test]
async fn stage_config_overrides_timeout() {
    let mut h = Harness::new(
        vec![Channel::new("1", "main", "hang")],
        EngineConfig::new().with_stage(
            "request",
            StageSettings::with_config(json!({"timeout_ms": 20})),
        ),
    );
    h.backend(Arc::new(HangingBackend::new("hang")));

    let result = h.engine.execute(GenerationRequest::new("main", "p")).await;

    assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
    assert!(result.error.unwrap().contains("20ms"));
}

#[tokio::test]
async fn prepare_complete_delivers_hints() {
    let mut h = Harness::new(vec![Channel::new("1", "main", "echo")], EngineConfig::new());
    h.backend(Arc::new(EchoBackend::new("echo")));
    h.stage(StageDefinition::new(
        "queue",
        Phase::PreRequest,
        FnStage::new(|ctx: &mut RequestContext| {
            ctx.hints.insert("position".to_string(), json!(4));
            Ok(RunStatus::Continue)
        }),
    ));
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();

    let result = h
        .engine
        .execute(
            GenerationRequest::new("main", "p")
                .on_prepare_complete(move |hints| sink.lock().push(hints.clone())),
        )
        .await;

    assert!(result.success);
    let delivered = delivered.lock();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].get("position"), Some(&json!(4)));
    assert_eq!(result.hints.get("position"), Some(&json!(4)));
}

#[tokio::test]
async fn unknown_connector_is_not_found() {
    let h = Harness::new(vec![Channel::new("1", "main", "dalle")], EngineConfig::new());

    let result = h.engine.execute(GenerationRequest::new("main", "p")).await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::NotFound));
    assert_eq!(result.error_code, Some(2));
    assert!(result.error.unwrap().contains("not found"));
}

#[tokio::test]
async fn concurrent_requests_do_not_cross_contaminate() {
    let mut h = Harness::new(
        vec![
            Channel::new("1", "left", "echo").with_config(json!({"model": "left-model"})),
            Channel::new("2", "right", "echo").with_config(json!({"model": "right-model"})),
        ],
        EngineConfig::new(),
    );
    h.backend(Arc::new(EchoBackend::new("echo")));
    h.stage(StageDefinition::new(
        "tag",
        Phase::Prepare,
        FnStage::new(|ctx: &mut RequestContext| {
            let channel = ctx.channel().map(|c| c.name.clone()).unwrap_or_default();
            ctx.prompt = format!("{} @{channel}", ctx.prompt);
            Ok(RunStatus::Continue)
        }),
    ));
    let engine = Arc::new(h.engine.clone());

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let engine = engine.clone();
            let channel = if i % 2 == 0 { "left" } else { "right" };
            tokio::spawn(async move {
                let result = engine
                    .execute(GenerationRequest::new(channel, format!("req-{i}")))
                    .await;
                (i, channel, result)
            })
        })
        .collect();

    for handle in handles {
        let (i, channel, result) = handle.await.unwrap();
        let artifact = &result.output.unwrap()[0];
        assert_eq!(
            artifact.content.as_deref(),
            Some(format!("req-{i} @{channel}").as_str())
        );
        assert_eq!(artifact.metadata["config"]["model"], format!("{channel}-model"));
    }
}

#[tokio::test]
async fn disposing_a_stage_removes_it_from_later_requests() {
    let mut h = Harness::new(vec![Channel::new("1", "main", "echo")], EngineConfig::new());
    h.backend(Arc::new(EchoBackend::new("echo")));
    let spy = Arc::new(SpyStage::new());
    let disposer = h
        .stages
        .register(StageDefinition::from_arc("spy", Phase::Prepare, spy.clone()))
        .unwrap();

    h.engine.execute(GenerationRequest::new("main", "p")).await;
    disposer.dispose();
    h.engine.execute(GenerationRequest::new("main", "p")).await;

    assert_eq!(spy.calls(), 1);
    assert_eq!(h.stages.graph().names(), vec!["request"]);
}

#[tokio::test]
async fn lifecycle_events_are_emitted() {
    let backends = BackendRegistry::new();
    let _echo = backends.register(Arc::new(EchoBackend::new("echo"))).unwrap();
    let stages = StageRegistry::new();
    let _request = stages
        .register(
            RequestStage::new(
                BackendInvocationService::new(backends, HostHandle::default()),
                InvocationSettings::default(),
            )
            .into_definition(),
        )
        .unwrap();
    let events = Arc::new(CollectingEventSink::new());
    let engine = PipelineEngine::builder(
        stages,
        Arc::new(InMemoryChannels::with_channels([Channel::new("1", "main", "echo")])),
    )
    .events(events.clone())
    .build();

    let result = engine.execute(GenerationRequest::new("main", "p")).await;

    assert!(result.success);
    assert_eq!(
        events.names(),
        vec![
            names::PIPELINE_STARTED,
            names::STAGE_STARTED,
            names::STAGE_COMPLETED,
            names::PIPELINE_COMPLETED,
        ]
    );
    let started = events.events_of_type(names::PIPELINE_STARTED);
    let (_, data) = &started[0];
    assert_eq!(
        data.as_ref().unwrap()["request_id"],
        result.request_id.to_string()
    );
}
