//! Growable UTF-8 character buffer
//!
//! The tokenizer accumulates lexemes in these buffers. The invariant that
//! matters: `size_in_chars` always equals the number of Unicode scalar
//! values held, independent of the byte length, and both are O(1) to read.
//! Head/tail deletion walks UTF-8 boundaries, so those cost O(k) in the
//! number of characters removed.

/// A growable, always-valid UTF-8 buffer that tracks its character count.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CharBuffer {
    data: String,
    nr_chars: usize,
}

impl CharBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a string slice, counting its characters once.
    pub fn append_str(&mut self, s: &str) {
        self.data.push_str(s);
        self.nr_chars += s.chars().count();
    }

    /// Append one code point, encoded as 1..=4 UTF-8 bytes.
    pub fn append_char(&mut self, ch: char) {
        self.data.push(ch);
        self.nr_chars += 1;
    }

    /// Append a sequence of code points.
    pub fn append_chars(&mut self, chs: &[char]) {
        for &ch in chs {
            self.append_char(ch);
        }
    }

    /// Append the whole contents of another buffer.
    pub fn append_another(&mut self, other: &CharBuffer) {
        self.data.push_str(&other.data);
        self.nr_chars += other.nr_chars;
    }

    /// Delete up to `n` characters from the head.
    pub fn delete_head_chars(&mut self, n: usize) {
        if n >= self.nr_chars {
            self.reset();
            return;
        }
        let byte_idx = self
            .data
            .char_indices()
            .nth(n)
            .map(|(i, _)| i)
            .unwrap_or(self.data.len());
        self.data.drain(..byte_idx);
        self.nr_chars -= n;
    }

    /// Delete up to `n` characters from the tail, walking UTF-8 boundaries
    /// backward.
    pub fn delete_tail_chars(&mut self, n: usize) {
        if n >= self.nr_chars {
            self.reset();
            return;
        }
        for _ in 0..n {
            self.data.pop();
        }
        self.nr_chars -= n;
    }

    /// Does the buffer end with the given bytes?
    pub fn end_with(&self, suffix: &str) -> bool {
        self.data.ends_with(suffix)
    }

    /// Byte-wise equality with a string.
    pub fn equal_to(&self, other: &str) -> bool {
        self.data == other
    }

    /// The last character, if any.
    pub fn last_char(&self) -> Option<char> {
        self.data.chars().next_back()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn size_in_chars(&self) -> usize {
        self.nr_chars
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Empty the buffer, keeping its allocation.
    pub fn reset(&mut self) {
        self.data.clear();
        self.nr_chars = 0;
    }

    /// Consume the buffer, yielding its contents.
    pub fn take_string(&mut self) -> String {
        self.nr_chars = 0;
        std::mem::take(&mut self.data)
    }

    /// Is the content an (optionally signed) decimal integer?
    pub fn is_int(&self) -> bool {
        let s = self.data.strip_prefix(['+', '-']).unwrap_or(&self.data);
        !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
    }

    /// Is the content a JSON-style number (integer, fraction, exponent)?
    pub fn is_number(&self) -> bool {
        let s = self.data.strip_prefix(['+', '-']).unwrap_or(&self.data);
        if s.is_empty() {
            return false;
        }
        let (int_part, rest) = match s.find(['.', 'e', 'E']) {
            Some(i) => (&s[..i], &s[i..]),
            None => (s, ""),
        };
        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        let rest = match rest.strip_prefix('.') {
            Some(r) => {
                let frac_len = r.bytes().take_while(|b| b.is_ascii_digit()).count();
                if frac_len == 0 {
                    return false;
                }
                &r[frac_len..]
            }
            None => rest,
        };
        match rest.strip_prefix(['e', 'E']) {
            Some(exp) => {
                let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
                !exp.is_empty() && exp.bytes().all(|b| b.is_ascii_digit())
            }
            None => rest.is_empty(),
        }
    }

    /// Is every character whitespace? (Empty counts as whitespace.)
    pub fn is_whitespace(&self) -> bool {
        self.data.chars().all(char::is_whitespace)
    }
}

impl std::fmt::Display for CharBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_char_counts_scalars() {
        let mut buf = CharBuffer::new();
        buf.append_char('a');
        buf.append_char('é');
        buf.append_char('中');
        buf.append_char('𝄞');
        assert_eq!(buf.size_in_chars(), 4);
        assert_eq!(buf.size_in_bytes(), 1 + 2 + 3 + 4);
        assert_eq!(buf.as_str(), "aé中𝄞");
    }

    #[test]
    fn test_delete_tail_respects_boundaries() {
        let mut buf = CharBuffer::new();
        buf.append_str("aé中𝄞");
        buf.delete_tail_chars(2);
        assert_eq!(buf.as_str(), "aé");
        assert_eq!(buf.size_in_chars(), 2);
        // Remaining prefix must still be valid UTF-8 (as_str would panic
        // in debug if not, but check the bytes explicitly).
        assert!(std::str::from_utf8(buf.as_str().as_bytes()).is_ok());
    }

    #[test]
    fn test_delete_head() {
        let mut buf = CharBuffer::new();
        buf.append_str("中文abc");
        buf.delete_head_chars(2);
        assert_eq!(buf.as_str(), "abc");
        buf.delete_head_chars(10);
        assert!(buf.is_empty());
        assert_eq!(buf.size_in_chars(), 0);
    }

    #[test]
    fn test_end_with_and_equal_to() {
        let mut buf = CharBuffer::new();
        buf.append_str("--!>");
        assert!(buf.end_with("!>"));
        assert!(buf.equal_to("--!>"));
        assert!(!buf.equal_to("--"));
    }

    #[test]
    fn test_last_char() {
        let mut buf = CharBuffer::new();
        assert_eq!(buf.last_char(), None);
        buf.append_str("ab中");
        assert_eq!(buf.last_char(), Some('中'));
    }

    #[test]
    fn test_is_int() {
        let mut buf = CharBuffer::new();
        buf.append_str("-42");
        assert!(buf.is_int());
        buf.reset();
        buf.append_str("4.2");
        assert!(!buf.is_int());
        buf.reset();
        buf.append_str("+");
        assert!(!buf.is_int());
    }

    #[test]
    fn test_is_number() {
        for ok in ["0", "-1", "3.25", "1e9", "2.5E-3", "+7"] {
            let mut buf = CharBuffer::new();
            buf.append_str(ok);
            assert!(buf.is_number(), "{ok} should parse as a number");
        }
        for bad in ["", ".", "1.", "e9", "1e", "1.2.3", "abc"] {
            let mut buf = CharBuffer::new();
            buf.append_str(bad);
            assert!(!buf.is_number(), "{bad} should not parse as a number");
        }
    }

    #[test]
    fn test_is_whitespace() {
        let mut buf = CharBuffer::new();
        assert!(buf.is_whitespace());
        buf.append_str(" \t\n");
        assert!(buf.is_whitespace());
        buf.append_char('x');
        assert!(!buf.is_whitespace());
    }

    #[test]
    fn test_reset_and_take() {
        let mut buf = CharBuffer::new();
        buf.append_str("hello");
        let s = buf.take_string();
        assert_eq!(s, "hello");
        assert!(buf.is_empty());
        assert_eq!(buf.size_in_chars(), 0);
    }
}
