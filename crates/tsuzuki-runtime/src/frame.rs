//! Cross-frame handshake transport.
//!
//! An embedded player frame asks the top-level page what is playing; the
//! top-level tracker answers with what it composed for itself. Delivery is not
//! guaranteed in either direction.

use tsuzuki_core::messages::FrameMessage;

/// Where a frame message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTarget {
    /// The window that embeds this one.
    Parent,
    /// The window whose message is being answered.
    Source,
}

/// Posts handshake messages on behalf of the tracker.
pub trait FrameBridge {
    fn post(&self, target: FrameTarget, message: &FrameMessage);
}

/// Bridge for hosts without frames; drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFrames;

impl FrameBridge for NoFrames {
    fn post(&self, target: FrameTarget, _message: &FrameMessage) {
        tracing::trace!(?target, "No frame bridge, message dropped");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// Remembers every posted message.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingBridge {
        pub(crate) sent: Rc<RefCell<Vec<(FrameTarget, FrameMessage)>>>,
    }

    impl FrameBridge for RecordingBridge {
        fn post(&self, target: FrameTarget, message: &FrameMessage) {
            self.sent.borrow_mut().push((target, message.clone()));
        }
    }
}
