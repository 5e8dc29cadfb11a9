//! Console output batching for the primary slot.

/// Accumulates console output until it would overflow or something else is delivered.
#[derive(Debug)]
pub(crate) struct OutputBuffer {
    text: String,
    capacity: usize,
}

impl OutputBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            text: String::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Appends `text`, returning the chunks that must be written out now, in order.
    pub(crate) fn push(&mut self, text: &str) -> Vec<String> {
        let mut flushed = Vec::new();
        if self.text.len() + text.len() > self.capacity {
            flushed.extend(self.take());
        }
        if text.len() > self.capacity {
            flushed.push(text.to_string());
        } else {
            self.text.push_str(text);
        }
        flushed
    }

    pub(crate) fn take(&mut self) -> Option<String> {
        (!self.text.is_empty()).then(|| std::mem::take(&mut self.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_writes_coalesce() {
        let mut out = OutputBuffer::new(16);
        assert!(out.push("a").is_empty());
        assert!(out.push("b\n").is_empty());
        assert_eq!(out.take().as_deref(), Some("ab\n"));
        assert!(out.take().is_none());
    }

    #[test]
    fn overflow_flushes_before_appending() {
        let mut out = OutputBuffer::new(4);
        out.push("abc");
        assert_eq!(out.push("de"), ["abc"]);
        assert_eq!(out.take().as_deref(), Some("de"));
    }

    #[test]
    fn oversized_text_is_its_own_chunk() {
        let mut out = OutputBuffer::new(4);
        out.push("ab");
        assert_eq!(out.push("0123456789"), ["ab", "0123456789"]);
        assert!(out.is_empty());
    }
}
