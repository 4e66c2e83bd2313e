//! Routes log records emitted inside a task span into that task's output buffer.
use std::fmt::{self, Write};

use farm_core::capture::{self, TASK_ID_FIELD, TASK_SPAN_NAME};
use farm_model::OutputEntry;
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
    span::{Attributes, Id},
};
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

/// Tracing layer feeding [`farm_core::OutputBuffer`]s.
///
/// A span named `farm_task` with a `task_id` field marks the task; every event in its scope,
/// on any thread the span is entered on, is appended to the buffer registered for that id.
#[derive(Debug, Default, Clone, Copy)]
pub struct CaptureLayer;

struct CaptureKey(String);

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != TASK_SPAN_NAME {
            return;
        }
        let mut visitor = TaskIdVisitor(None);
        attrs.record(&mut visitor);
        if let (Some(task_id), Some(span)) = (visitor.0, ctx.span(id)) {
            span.extensions_mut().insert(CaptureKey(task_id));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(scope) = ctx.event_scope(event) else {
            return;
        };
        for span in scope {
            let ext = span.extensions();
            let Some(key) = ext.get::<CaptureKey>() else {
                continue;
            };
            if let Some(buffer) = capture::lookup(&key.0) {
                let mut visitor = MessageVisitor::default();
                event.record(&mut visitor);
                buffer.push(OutputEntry::log_record(
                    event.metadata().level().as_str(),
                    visitor.text,
                ));
            }
            return;
        }
    }
}

struct TaskIdVisitor(Option<String>);

impl Visit for TaskIdVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == TASK_ID_FIELD {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == TASK_ID_FIELD {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    text: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let fields = std::mem::take(&mut self.text);
            let _ = write!(self.text, "{value:?}{fields}");
        } else {
            let _ = write!(self.text, " {}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            let fields = std::mem::take(&mut self.text);
            self.text = format!("{value}{fields}");
        } else {
            let _ = write!(self.text, " {}={}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use farm_core::{
        AckError, Acker, Call, CallableRegistry, FarmConfig, JobRequest, OutputBuffer,
        registry::CallResult,
    };
    use farm_exec::{Incoming, Task, TaskEnv};
    use serde_json::Value;
    use tracing::{info, info_span, warn};
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[test]
    fn events_inside_the_task_span_are_captured() {
        let subscriber = tracing_subscriber::registry().with(CaptureLayer);
        tracing::subscriber::with_default(subscriber, || {
            let buffer = OutputBuffer::new(8);
            let _reg = capture::register("cap_1", buffer.clone());

            info!("outside");
            let span = info_span!("farm_task", task_id = %"cap_1");
            span.in_scope(|| {
                warn!(rows = 3, "loaded");
                info_span!("inner").in_scope(|| info!("nested"));
            });

            let lines: Vec<String> = buffer.entries().iter().map(ToString::to_string).collect();
            assert_eq!(lines, ["[log:WARN] loaded rows=3", "[log:INFO] nested"]);
        });
    }

    #[test]
    fn spans_entered_on_other_threads_are_captured() {
        let subscriber = Arc::new(tracing_subscriber::registry().with(CaptureLayer));
        let buffer = OutputBuffer::new(8);
        let _reg = capture::register("cap_2", buffer.clone());

        let span = tracing::subscriber::with_default(subscriber.clone(), || {
            info_span!("farm_task", task_id = %"cap_2")
        });
        std::thread::spawn(move || {
            tracing::subscriber::with_default(subscriber, || span.in_scope(|| info!("from thread")));
        })
        .join()
        .unwrap();

        assert_eq!(buffer.text(), "[log:INFO] from thread");
    }

    #[derive(Default)]
    struct NullAcker(AtomicUsize);

    #[async_trait]
    impl Acker for NullAcker {
        async fn ack(&self) -> Result<(), AckError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn noisy(call: Call) -> CallResult {
        let tag: String = call.arg(0)?;
        for i in 0..4 {
            info!(step = i, "{tag}");
            tokio::task::yield_now().await;
        }
        Ok(Value::Null)
    }

    #[test]
    fn concurrent_tasks_capture_only_their_own_logs() {
        let subscriber = tracing_subscriber::registry().with(CaptureLayer);
        let _guard = tracing::subscriber::set_default(subscriber);

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let registry = CallableRegistry::new();
            registry.register_async("obs::noisy", noisy).unwrap();
            let env = TaskEnv::new(registry, &FarmConfig::default());

            let mk = |id: &str, tag: &str| {
                let enc = env
                    .codec
                    .encode(&JobRequest::new("obs::noisy").arg(tag))
                    .unwrap();
                Task::intake(
                    &env,
                    Incoming {
                        task_id: id.to_string(),
                        body: enc.body,
                        headers: enc.headers,
                        acker: Arc::new(NullAcker::default()),
                    },
                )
            };

            let (a, b) = tokio::join!(mk("obs_1", "left").run(), mk("obs_2", "right").run());

            assert_eq!(a.output.len(), 4);
            assert_eq!(b.output.len(), 4);
            assert!(a.output.iter().all(|e| e.text.starts_with("left")));
            assert!(b.output.iter().all(|e| e.text.starts_with("right")));
        });
    }
}
