use crate::error::EngineError;

/// Splits raw text into overlapping fixed-size windows.
///
/// Window boundaries prefer a paragraph break, then a line break, then a
/// sentence break within the back half of the window before falling back to
/// a hard character cut. Splitting is deterministic: the same input always
/// yields the same sequence.
#[derive(Clone)]
pub struct TextChunker {
    size: usize,
    overlap: usize,
}

impl TextChunker {
    /// `overlap < size` is a construction-time invariant, checked once at
    /// startup rather than per call.
    pub fn new(size: usize, overlap: usize) -> Result<Self, EngineError> {
        if size == 0 {
            return Err(EngineError::Config("chunk size must be positive".into()));
        }
        if overlap >= size {
            return Err(EngineError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        if total == 0 {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let hard_end = (start + self.size).min(total);
            let end = if hard_end < total {
                self.natural_break(&chars, start, hard_end)
            } else {
                hard_end
            };
            chunks.push(chars[start..end].iter().collect());
            if hard_end == total {
                break;
            }
            // The next window starts `overlap` characters before wherever
            // this chunk actually ended, so no text falls between windows.
            start = end.saturating_sub(self.overlap).max(start + 1);
        }

        chunks
    }

    /// Looks backward from the hard cut for a natural boundary, but never
    /// past the midpoint of the window (a tiny chunk is worse than a hard
    /// cut). Returns the index one past the boundary, or the hard cut.
    fn natural_break(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let floor = start + self.size / 2;

        for pattern in [&['\n', '\n'][..], &['\n'][..], &['.', ' '][..]] {
            let mut pos = hard_end;
            while pos > floor + pattern.len() {
                let candidate = pos - pattern.len();
                if chars[candidate..pos] == *pattern {
                    return pos;
                }
                pos -= 1;
            }
        }

        hard_end
    }
}
