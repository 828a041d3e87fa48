use std::cell::RefCell;
use std::sync::Arc;

/// Long-running engine passes that report progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    FloodFill,
    Otsu,
    Labeling,
    GrowCut,
    Interpolation,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::FloodFill => "flood fill",
            Operation::Otsu => "otsu",
            Operation::Labeling => "labeling",
            Operation::GrowCut => "grow-cut",
            Operation::Interpolation => "slice interpolation",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    Start { operation: Operation },
    Advance { operation: Operation, fraction: f32 },
    Finish { operation: Operation },
}

pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

#[derive(Default)]
struct ProgressContext {
    sink: Option<ProgressSink>,
    operation: Option<Operation>,
}

thread_local! {
    static CONTEXT: RefCell<ProgressContext> = RefCell::new(ProgressContext::default());
}

/// Restores the previous context and emits `Finish` when dropped.
pub struct ProgressGuard {
    prev: ProgressContext,
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        let prev = std::mem::take(&mut self.prev);
        CONTEXT.with(|ctx| {
            let finished = std::mem::replace(&mut *ctx.borrow_mut(), prev);
            if let (Some(operation), Some(sink)) = (finished.operation, finished.sink) {
                (sink)(ProgressEvent::Finish { operation });
            }
        });
    }
}

/// Installs `sink` for the current thread and emits `Start`.
pub fn set_progress_context(operation: Operation, sink: Option<ProgressSink>) -> ProgressGuard {
    if let Some(sink) = sink.as_ref() {
        (sink)(ProgressEvent::Start { operation });
    }
    let prev = CONTEXT.with(|ctx| {
        std::mem::replace(
            &mut *ctx.borrow_mut(),
            ProgressContext {
                sink,
                operation: Some(operation),
            },
        )
    });
    ProgressGuard { prev }
}

pub fn report_progress(fraction: f32) {
    let fraction = fraction.clamp(0.0, 1.0);
    CONTEXT.with(|ctx| {
        let ctx = ctx.borrow();
        if let (Some(operation), Some(sink)) = (ctx.operation, ctx.sink.as_ref()) {
            (sink)(ProgressEvent::Advance {
                operation,
                fraction,
            });
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn guard_brackets_events_and_restores_context() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        let sink: ProgressSink = Arc::new(move |event| {
            sink_events.lock().unwrap().push(event);
        });
        {
            let _guard = set_progress_context(Operation::GrowCut, Some(sink));
            report_progress(0.5);
            report_progress(3.0);
        }
        report_progress(0.75);
        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                ProgressEvent::Start {
                    operation: Operation::GrowCut
                },
                ProgressEvent::Advance {
                    operation: Operation::GrowCut,
                    fraction: 0.5
                },
                ProgressEvent::Advance {
                    operation: Operation::GrowCut,
                    fraction: 1.0
                },
                ProgressEvent::Finish {
                    operation: Operation::GrowCut
                },
            ]
        );
    }
}
