use heartlens_signals::{
    BackgroundMonitor, FixedModel, ModelError, ModelStatus, QualityConfig, QualityLabel,
    QualityModel,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn fixed_loader(
    model: FixedModel,
) -> impl Fn() -> Result<Box<dyn QualityModel>, ModelError> + Send + 'static {
    move || Ok(Box::new(model.clone()) as Box<dyn QualityModel>)
}

#[test]
fn below_threshold_is_not_submitted() {
    let mut monitor =
        BackgroundMonitor::spawn(QualityConfig::default(), fixed_loader(FixedModel::new([0.1, 0.7, 0.2])))
            .unwrap();
    for n in 1..100 {
        assert!(monitor.on_buffer_grew(&vec![0.5; n]).is_none());
    }
    assert_eq!(monitor.latest().label_str(), "--");
}

#[test]
fn publishes_verdict_for_latest_request() {
    let mut monitor =
        BackgroundMonitor::spawn(QualityConfig::default(), fixed_loader(FixedModel::new([0.1, 0.7, 0.2])))
            .unwrap();
    let handle = monitor.handle();

    let id = monitor.on_buffer_grew(&vec![0.25; 100]).unwrap();
    assert!(monitor.wait_for(id, WAIT));

    assert_eq!(monitor.model_status(), ModelStatus::Ready);
    assert_eq!(handle.verdict().label, Some(QualityLabel::Acceptable));
    assert_eq!(handle.request_id(), id);
    assert_eq!(handle.snapshot().label, "acceptable");
    assert_eq!(monitor.assessments(), 1);
}

#[test]
fn redundant_triggers_are_coalesced() {
    let model = FixedModel::new([0.2, 0.2, 0.6]).with_delay(Duration::from_millis(100));
    let calls = model.call_counter();
    let mut monitor = BackgroundMonitor::spawn(QualityConfig::default(), fixed_loader(model)).unwrap();

    let mut window = vec![0.1f32; 99];
    let mut last = 0;
    for i in 0..10 {
        window.push(i as f32 * 0.01);
        last = monitor.on_buffer_grew(&window).unwrap();
    }
    assert!(monitor.wait_for(last, WAIT));

    let handle = monitor.handle();
    assert_eq!(handle.request_id(), last);
    assert_eq!(handle.verdict().label, Some(QualityLabel::Excellent));

    let calls = calls.load(Ordering::SeqCst) as u64;
    assert!(calls < 10, "expected coalescing, saw {} model calls", calls);
    assert_eq!(calls + monitor.dropped(), 10);
}

#[test]
fn failed_load_reports_unknown_until_reload() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let loader_attempts = Arc::clone(&attempts);
    let loader = move || {
        if loader_attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(ModelError::Shape("truncated model".to_string()))
        } else {
            Ok(Box::new(FixedModel::new([0.8, 0.1, 0.1])) as Box<dyn QualityModel>)
        }
    };
    let mut monitor = BackgroundMonitor::spawn(QualityConfig::default(), loader).unwrap();

    let id = monitor.on_buffer_grew(&vec![0.5; 120]).unwrap();
    assert!(monitor.wait_for(id, WAIT));
    assert!(matches!(monitor.model_status(), ModelStatus::Failed(_)));
    assert!(!monitor.latest().is_known());
    assert_eq!(monitor.assessments(), 0);

    monitor.reload_model();
    let id = monitor.on_buffer_grew(&vec![0.5; 121]).unwrap();
    assert!(monitor.wait_for(id, WAIT));
    assert_eq!(monitor.model_status(), ModelStatus::Ready);
    assert_eq!(monitor.latest().label, Some(QualityLabel::Bad));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn inference_failure_is_swallowed() {
    let mut monitor =
        BackgroundMonitor::spawn(QualityConfig::default(), fixed_loader(FixedModel::failing())).unwrap();
    let id = monitor.on_buffer_grew(&vec![0.5; 100]).unwrap();
    assert!(monitor.wait_for(id, WAIT));
    assert_eq!(monitor.failures(), 1);
    assert!(!monitor.latest().is_known());

    // The loop keeps accepting work after a failure
    assert!(monitor.on_buffer_grew(&vec![0.5; 101]).is_some());
}

#[test]
fn verdict_after_shutdown_is_discarded() {
    let model = FixedModel::new([0.1, 0.1, 0.8]).with_delay(Duration::from_millis(200));
    let mut monitor = BackgroundMonitor::spawn(QualityConfig::default(), fixed_loader(model)).unwrap();
    let handle = monitor.handle();

    monitor.on_buffer_grew(&vec![0.5; 100]).unwrap();
    let last = monitor.shutdown();

    assert!(!last.is_known());
    assert!(!handle.verdict().is_known());
    assert_eq!(handle.request_id(), 0);
}

#[test]
fn shrunk_window_clears_verdict() {
    let mut monitor =
        BackgroundMonitor::spawn(QualityConfig::default(), fixed_loader(FixedModel::new([0.1, 0.7, 0.2])))
            .unwrap();
    let handle = monitor.handle();

    let id = monitor.on_buffer_grew(&vec![0.5; 120]).unwrap();
    assert!(monitor.wait_for(id, WAIT));
    assert_eq!(monitor.latest().label, Some(QualityLabel::Acceptable));

    assert!(monitor.on_buffer_grew(&vec![0.5; 10]).is_none());
    assert_eq!(monitor.latest().label_str(), "--");
    assert_eq!(handle.request_id(), id + 1);

    // Further short windows do not issue more resets
    assert!(monitor.on_buffer_grew(&vec![0.5; 11]).is_none());
    assert_eq!(handle.request_id(), id + 1);

    let id = monitor.on_buffer_grew(&vec![0.5; 100]).unwrap();
    assert!(monitor.wait_for(id, WAIT));
    assert_eq!(monitor.latest().label, Some(QualityLabel::Acceptable));
}

#[test]
fn in_flight_verdict_does_not_survive_reset() {
    let model = FixedModel::new([0.1, 0.1, 0.8]).with_delay(Duration::from_millis(100));
    let mut monitor = BackgroundMonitor::spawn(QualityConfig::default(), fixed_loader(model)).unwrap();

    let id = monitor.on_buffer_grew(&vec![0.5; 100]).unwrap();
    monitor.on_buffer_grew(&vec![0.5; 5]);
    assert!(monitor.wait_for(id, WAIT));

    // Let the older assessment finish on the worker
    let deadline = Instant::now() + WAIT;
    while monitor.assessments() == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(monitor.assessments(), 1);
    assert!(!monitor.latest().is_known());
    assert_eq!(monitor.handle().request_id(), id + 1);
}
