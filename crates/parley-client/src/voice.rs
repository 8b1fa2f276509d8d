//! Voice playback abstraction.

/// Consumes voice frames arriving from a room.
///
/// The client core only routes voice data; what "playing" means (audio
/// device, file, test buffer) is the embedder's business. Frames arrive
/// in order per connection; the sink decides its own buffering.
pub trait VoiceSink: Send + Sync + 'static {
    /// Queues one voice frame from `from` in `room` for playback.
    fn enqueue(&self, room: &str, from: &str, data: Vec<u8>);
}

/// Discards all voice frames. The default for headless clients.
pub struct NullVoiceSink;

impl VoiceSink for NullVoiceSink {
    fn enqueue(&self, _room: &str, _from: &str, _data: Vec<u8>) {}
}
