/// Fixed-capacity ring of samples.
///
/// The write index always points at the slot the next sample goes into.
/// Reads are expressed as a distance into the past, so callers never do
/// their own (possibly negative) modulo arithmetic.
pub struct RingBuffer {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl RingBuffer {
    /// Allocates once; the capacity never changes afterwards.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            write_pos: 0,
        }
    }

    /// Index the next `push` will write to.
    #[inline]
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos += 1;
        if self.write_pos == self.buffer.len() {
            self.write_pos = 0;
        }
    }

    /// Sample written `delay` pushes ago; `read_back(0)` is the most recent one.
    /// Delays beyond the capacity wrap around.
    #[inline]
    pub fn read_back(&self, delay: usize) -> f32 {
        self.buffer[self.index_back(delay)]
    }

    #[inline]
    fn index_back(&self, delay: usize) -> usize {
        let len = self.buffer.len();
        let delay = delay % len;
        // newest sample sits one slot behind write_pos
        (self.write_pos + len - 1 - delay) % len
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}
