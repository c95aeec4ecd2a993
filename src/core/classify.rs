// Byte classification tables
//
// A Dialect describes the CSV flavour (delimiter, quote, line terminators,
// whitespace trimming). A Classifier is derived from it once and is then
// shared read-only by every scan that uses the same dialect.

use crate::error::DialectError;

/// Significance of a byte with respect to CSV parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseFlag {
    /// No special meaning
    #[default]
    NotSpecial,
    /// Opens or closes a quoted region
    Quote,
    /// Ends a field
    Delimiter,
    /// Ends a row
    Newline,
}

/// Parse flag for every byte value, indexed by the byte itself.
pub type ParseFlagMap = [ParseFlag; 256];

/// Trim eligibility for every byte value, indexed by the byte itself.
pub type WhitespaceMap = [bool; 256];

/// Which field edges get whitespace trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trim {
    #[default]
    None,
    Leading,
    Trailing,
    Both,
}

impl Trim {
    #[inline]
    pub fn leading(self) -> bool {
        matches!(self, Trim::Leading | Trim::Both)
    }

    #[inline]
    pub fn trailing(self) -> bool {
        matches!(self, Trim::Trailing | Trim::Both)
    }
}

/// CSV dialect description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    /// `None` disables quoting entirely
    pub quote: Option<u8>,
    /// Every byte in this set terminates a row
    pub newlines: Vec<u8>,
    pub trim: Trim,
    /// Bytes removed at field edges when `trim` is enabled
    pub trim_bytes: Vec<u8>,
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect {
            delimiter: b',',
            quote: Some(b'"'),
            newlines: b"\r\n".to_vec(),
            trim: Trim::None,
            trim_bytes: b" \t".to_vec(),
        }
    }
}

impl Dialect {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote(mut self, quote: u8) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn without_quote(mut self) -> Self {
        self.quote = None;
        self
    }

    pub fn with_newlines(mut self, newlines: &[u8]) -> Self {
        self.newlines = newlines.to_vec();
        self
    }

    pub fn with_trim(mut self, trim: Trim) -> Self {
        self.trim = trim;
        self
    }

    pub fn with_trim_bytes(mut self, bytes: &[u8]) -> Self {
        self.trim_bytes = bytes.to_vec();
        self
    }

    /// Check that no byte plays two structural roles.
    pub fn validate(&self) -> Result<(), DialectError> {
        if self.newlines.is_empty() {
            return Err(DialectError::NoNewline);
        }
        if self.quote == Some(self.delimiter) {
            return Err(DialectError::Overlap {
                byte: self.delimiter,
                first: "delimiter",
                second: "quote",
            });
        }
        for &nl in &self.newlines {
            if nl == self.delimiter {
                return Err(DialectError::Overlap {
                    byte: nl,
                    first: "newline",
                    second: "delimiter",
                });
            }
            if self.quote == Some(nl) {
                return Err(DialectError::Overlap {
                    byte: nl,
                    first: "newline",
                    second: "quote",
                });
            }
        }
        if self.trim != Trim::None {
            for &ws in &self.trim_bytes {
                let role = if ws == self.delimiter {
                    Some("delimiter")
                } else if self.quote == Some(ws) {
                    Some("quote")
                } else if self.newlines.contains(&ws) {
                    Some("newline")
                } else {
                    None
                };
                if let Some(role) = role {
                    return Err(DialectError::Overlap {
                        byte: ws,
                        first: "trim",
                        second: role,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Lookup tables derived from a [`Dialect`].
#[derive(Debug, Clone)]
pub struct Classifier {
    parse_flags: ParseFlagMap,
    ws_flags: WhitespaceMap,
    trim: Trim,
    quote: Option<u8>,
}

impl Classifier {
    /// Build both tables. Every byte gets a classification; when a dialect
    /// assigns one byte several roles, newline wins over delimiter, which wins
    /// over quote. Structural bytes are never trimmed.
    pub fn new(dialect: &Dialect) -> Self {
        let mut parse_flags = [ParseFlag::NotSpecial; 256];
        if let Some(q) = dialect.quote {
            parse_flags[q as usize] = ParseFlag::Quote;
        }
        parse_flags[dialect.delimiter as usize] = ParseFlag::Delimiter;
        for &nl in &dialect.newlines {
            parse_flags[nl as usize] = ParseFlag::Newline;
        }

        let mut ws_flags = [false; 256];
        if dialect.trim != Trim::None {
            for &ws in &dialect.trim_bytes {
                ws_flags[ws as usize] = parse_flags[ws as usize] == ParseFlag::NotSpecial;
            }
        }

        // Quote byte as seen by the scanner, after structural precedence
        let quote = dialect
            .quote
            .filter(|&q| parse_flags[q as usize] == ParseFlag::Quote);

        Classifier {
            parse_flags,
            ws_flags,
            trim: dialect.trim,
            quote,
        }
    }

    #[inline(always)]
    pub fn parse_flag(&self, byte: u8) -> ParseFlag {
        self.parse_flags[byte as usize]
    }

    #[inline(always)]
    pub fn is_whitespace(&self, byte: u8) -> bool {
        self.ws_flags[byte as usize]
    }

    #[inline]
    pub fn trim_leading(&self) -> bool {
        self.trim.leading()
    }

    #[inline]
    pub fn trim_trailing(&self) -> bool {
        self.trim.trailing()
    }

    #[inline]
    pub fn quote(&self) -> Option<u8> {
        self.quote
    }

    pub fn parse_flags(&self) -> &ParseFlagMap {
        &self.parse_flags
    }

    pub fn ws_flags(&self) -> &WhitespaceMap {
        &self.ws_flags
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&Dialect::default())
    }
}
