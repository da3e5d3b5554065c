//! Events that can occur while a reply streams

/// Events that trigger entry state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryEvent {
    /// The collaborator accepted the request and started streaming
    StreamOpened,
    /// A fragment was merged into the entry text
    Fragment,
    /// The stream ended normally
    StreamClosed,
    /// The request or the stream failed
    StreamFailed,
}
