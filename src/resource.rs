// ResourceArc wrapper for the streaming parser
//
// This allows the streaming parser state to persist across NIF calls.

use crate::strategy::StreamingParser;
use parking_lot::Mutex;
use rustler::ResourceArc;

/// Wrapper for StreamingParser that can be stored in a ResourceArc
pub struct StreamingParserResource {
    pub inner: Mutex<StreamingParser>,
}

#[rustler::resource_impl]
impl rustler::Resource for StreamingParserResource {}

// Required by rustler for NIF return values; access goes through the mutex.
impl std::panic::RefUnwindSafe for StreamingParserResource {}

impl StreamingParserResource {
    pub fn new(parser: StreamingParser) -> Self {
        StreamingParserResource {
            inner: Mutex::new(parser),
        }
    }
}

impl Default for StreamingParserResource {
    fn default() -> Self {
        Self::new(StreamingParser::new())
    }
}

/// Type alias for the ResourceArc
pub type StreamingParserRef = ResourceArc<StreamingParserResource>;
