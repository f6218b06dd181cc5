use serde::{Deserialize, Serialize};

/// One progress notification emitted by a backend inference server while
/// generating an image.
///
/// The backend's own event shapes are heterogeneous (a bare status frame,
/// a step tick, a queue-depth report, a completion marker); this tagged
/// variant is the single type the progress relay pattern-matches on, so the
/// dispatch loop and its tests never see the backend's wire format directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum ProgressEvent {
    Started,
    Tick {
        percent: f64,
        step: i64,
        max: i64,
        node: String,
    },
    QueueDepth {
        n: i64,
    },
    Completed,
}
