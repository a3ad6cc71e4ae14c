#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,

    ReactionStart { index: usize, key: String },
    ReactionFinish { key: String, anomalous: bool },
    ReactionFailed { key: String, reason: String },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reporter_without_callback_ignores_events() {
        ProgressReporter::new().report(Progress::TaskIncrement);
    }

    #[test]
    fn reporter_forwards_events_in_order() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::ReactionStart { key, .. } = event {
                seen.lock().unwrap().push(key);
            }
        }));
        reporter.report(Progress::ReactionStart {
            index: 0,
            key: "a".into(),
        });
        reporter.report(Progress::TaskIncrement);
        reporter.report(Progress::ReactionStart {
            index: 1,
            key: "b".into(),
        });
        drop(reporter);
        assert_eq!(seen.into_inner().unwrap(), vec!["a", "b"]);
    }
}
