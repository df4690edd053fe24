use crate::graph::Node;

/// Sink for the operations executed by tensor ops.
///
/// A recording implementation keeps every [`Node`] so that a backward pass can
/// replay them in reverse. A non-recording one lets ops skip storing their
/// outputs altogether.
pub trait Recorder {
    fn record(&mut self, node: Node);
    fn is_recording(&self) -> bool {
        true
    }
}
