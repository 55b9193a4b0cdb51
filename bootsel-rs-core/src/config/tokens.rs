//! Provides [`TokenFile`], a line and token reader for configuration files.
//!
//! Configuration files may arrive from firmware vendors or users in a handful of
//! encodings, so the reader sniffs the first bytes of the buffer before decoding:
//!
//! * `FF FE` is a UTF-16 little endian byte order mark, skipped before decoding.
//! * `EF BB BF` is a UTF-8 byte order mark, also skipped.
//! * A zero byte at offsets 1 and 3 is taken as BOM-less UTF-16 little endian,
//!   since ASCII-heavy UTF-16 text has every other byte zero.
//! * Anything else is decoded byte for byte as ISO-8859-1, which also passes
//!   plain ASCII and (best effort) UTF-8 through usably.
//!
//! Tokenization splits lines at whitespace, `=` and `,` so that `loader=\foo` and
//! `loader \foo` read the same. Double quotes group a multi-word token, `#` starts
//! a comment, and forward slashes in unquoted tokens are flipped to backslashes so
//! Unix-style paths work where UEFI expects DOS-style ones.

use alloc::{string::String, vec::Vec};

/// The character encodings recognized by [`TokenFile`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    /// One byte per character, passed through unchanged.
    Latin1,

    /// UTF-8, decoded best effort with ISO-8859-1 as the fallback.
    Utf8,

    /// UTF-16 little endian.
    Utf16Le,
}

/// A configuration file decoded into characters, read line by line.
pub struct TokenFile {
    /// The decoded content of the file.
    chars: Vec<char>,

    /// The cursor into `chars` where the next line starts.
    pos: usize,
}

impl TokenFile {
    /// Decodes a raw file buffer into a [`TokenFile`].
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(buf: &[u8]) -> Self {
        let (encoding, offset) = detect_encoding(buf);
        let buf = &buf[offset..];
        let chars = match encoding {
            Encoding::Utf16Le => {
                let units = buf.chunks_exact(2).map(|x| u16::from_le_bytes([x[0], x[1]]));
                char::decode_utf16(units)
                    .map(|x| x.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect()
            }
            Encoding::Utf8 => match str::from_utf8(buf) {
                Ok(str) => str.chars().collect(),
                Err(_) => buf.iter().map(|&x| char::from(x)).collect(),
            },
            Encoding::Latin1 => buf.iter().map(|&x| char::from(x)).collect(),
        };
        Self { chars, pos: 0 }
    }

    /// Returns the next line of the file, without its line ending.
    ///
    /// The run of carriage returns and line feeds terminating the line is consumed
    /// whole, so a `\r\n` pair counts as a single line break. Returns [`None`] once
    /// the end of the file is reached.
    pub fn read_line(&mut self) -> Option<String> {
        if self.pos >= self.chars.len() {
            return None;
        }

        let start = self.pos;
        while self.pos < self.chars.len() && !matches!(self.chars[self.pos], '\r' | '\n') {
            self.pos += 1;
        }
        let line = self.chars[start..self.pos].iter().collect();
        while self.pos < self.chars.len() && matches!(self.chars[self.pos], '\r' | '\n') {
            self.pos += 1;
        }
        Some(line)
    }

    /// Returns the tokens of the next line that has any.
    ///
    /// Lines that are empty, all separators, or comments are skipped. Returns
    /// [`None`] once the end of the file is reached without finding a token.
    pub fn read_token_line(&mut self) -> Option<Vec<String>> {
        let mut is_quoted = false;
        loop {
            let line = self.read_line()?;
            let tokens = tokenize(&line, &mut is_quoted);
            if !tokens.is_empty() {
                return Some(tokens);
            }
        }
    }
}

/// Sniffs the encoding of a buffer, returning it along with the bytes to skip.
fn detect_encoding(buf: &[u8]) -> (Encoding, usize) {
    if buf.len() >= 4 {
        if buf[0] == 0xFF && buf[1] == 0xFE {
            return (Encoding::Utf16Le, 2);
        }
        if buf[0] == 0xEF && buf[1] == 0xBB && buf[2] == 0xBF {
            return (Encoding::Utf8, 3);
        }
        if buf[1] == 0 && buf[3] == 0 {
            return (Encoding::Utf16Le, 0);
        }
    }
    (Encoding::Latin1, 0)
}

/// Tests if a character separates tokens when outside quotes.
const fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '\t' | '=' | ',')
}

/// Splits one line into tokens.
///
/// The quoting state is shared with the caller so that an unbalanced quote
/// carries into following lines, matching how the stanza format has always
/// been parsed.
fn tokenize(line: &str, is_quoted: &mut bool) -> Vec<String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = line.chars().collect();
    let mut p = 0;

    loop {
        while p < chars.len() && is_separator(chars[p]) && !*is_quoted {
            p += 1;
        }
        if p >= chars.len() || chars[p] == '\0' || chars[p] == '#' {
            break;
        }

        if chars[p] == '"' {
            *is_quoted = !*is_quoted;
            p += 1;
        }

        let mut token = String::new();
        while p < chars.len()
            && chars[p] != '\0'
            && chars[p] != '"'
            && (!(is_separator(chars[p]) || chars[p] == '#') || *is_quoted)
        {
            if chars[p] == '/' && !*is_quoted {
                token.push('\\');
            } else {
                token.push(chars[p]);
            }
            p += 1;
        }
        if p < chars.len() && chars[p] == '"' {
            *is_quoted = !*is_quoted;
        }
        let finished = p >= chars.len() || chars[p] == '\0' || chars[p] == '#';
        p += 1;

        tokens.push(token);
        if finished {
            break;
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{string::ToString, vec};

    fn tokens(content: &[u8]) -> Vec<Vec<String>> {
        let mut file = TokenFile::new(content);
        let mut out = Vec::new();
        while let Some(line) = file.read_token_line() {
            out.push(line);
        }
        out
    }

    #[test]
    fn test_utf8_bom_skipped() {
        let mut content = vec![0xEF, 0xBB, 0xBF];
        content.extend_from_slice(b"timeout 20\n");
        let lines = tokens(&content);
        assert_eq!(lines, vec![vec!["timeout".to_string(), "20".to_string()]]);
    }

    #[test]
    fn test_utf16_bom_skipped() {
        let mut content = vec![0xFF, 0xFE];
        for unit in "timeout 20\n".encode_utf16() {
            content.extend_from_slice(&unit.to_le_bytes());
        }
        let lines = tokens(&content);
        assert_eq!(lines, vec![vec!["timeout".to_string(), "20".to_string()]]);
    }

    #[test]
    fn test_bomless_utf16_heuristic() {
        let mut content = Vec::new();
        for unit in "textonly\n".encode_utf16() {
            content.extend_from_slice(&unit.to_le_bytes());
        }
        let lines = tokens(&content);
        assert_eq!(lines, vec![vec!["textonly".to_string()]]);
    }

    #[test]
    fn test_quoted_token_keeps_spaces_and_slashes() {
        let lines = tokens(b"loader=\\EFI\\boot\\x.efi, options=\"a b c\"\n");
        assert_eq!(
            lines,
            vec![vec![
                "loader".to_string(),
                "\\EFI\\boot\\x.efi".to_string(),
                "options".to_string(),
                "a b c".to_string(),
            ]]
        );
    }

    #[test]
    fn test_slash_flipped_outside_quotes_only() {
        let lines = tokens(b"loader /EFI/boot/grub.efi \"/keep/me\"\n");
        assert_eq!(
            lines,
            vec![vec![
                "loader".to_string(),
                "\\EFI\\boot\\grub.efi".to_string(),
                "/keep/me".to_string(),
            ]]
        );
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let lines = tokens(b"# a comment\n\n   \ntimeout 5 # trailing\n");
        assert_eq!(lines, vec![vec!["timeout".to_string(), "5".to_string()]]);
    }

    #[test]
    fn test_read_line_consumes_crlf_runs() {
        let mut file = TokenFile::new(b"one\r\n\r\ntwo\n");
        assert_eq!(file.read_line(), Some("one".to_string()));
        assert_eq!(file.read_line(), Some("two".to_string()));
        assert_eq!(file.read_line(), None);
    }
}
