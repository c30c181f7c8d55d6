//! IBIS passenger-information telegrams
//!
//! IBIS runs at 1200 baud, 7 data bits, even parity, 2 stop bits. A telegram
//! is ASCII content followed by CR (0x0D) and a parity byte: 0x7F XOR'd with
//! CR and every content byte. Telegrams are fire-and-forget; panels on the
//! IBIS bus do not acknowledge.

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Telegram terminator
pub const CR: u8 = 0x0D;

/// Parity start value, 0x7F ^ CR
pub const PARITY_SEED: u8 = 0x7F ^ CR;

/// Characters per DS021t text block
pub const DS021T_BLOCK_LEN: usize = 16;

/// VDV hex digits: 0-9 then `:;<=>?` for 10-15
const VDV_HEX: &[u8; 16] = b"0123456789:;<=>?";

/// German characters and the 7-bit codes IBIS displays use for them
const SPECIAL_CHARACTERS: [(char, char); 7] = [
    ('ä', '{'),
    ('ö', '|'),
    ('ü', '}'),
    ('ß', '~'),
    ('Ä', '['),
    ('Ö', '\\'),
    ('Ü', ']'),
];

/// Replace umlauts and sharp s with their IBIS character codes
pub fn substitute_special_characters(text: &str) -> String {
    text.chars()
        .map(|c| {
            SPECIAL_CHARACTERS
                .iter()
                .find(|(from, _)| *from == c)
                .map_or(c, |(_, to)| *to)
        })
        .collect()
}

/// XOR parity over telegram content, CR included via the seed
pub fn parity(content: &[u8]) -> u8 {
    content.iter().fold(PARITY_SEED, |acc, &b| acc ^ b)
}

/// VDV hex rendering of a byte; the high digit is omitted when zero
pub fn vdv_hex(value: u8) -> String {
    let high = (value >> 4) as usize;
    let low = (value & 0x0F) as usize;
    let mut out = String::with_capacity(2);
    if high > 0 {
        out.push(VDV_HEX[high] as char);
    }
    out.push(VDV_HEX[low] as char);
    out
}

/// Zero-pad to at least `digits`; wider numbers are sent as they are
fn padded(value: u16, digits: usize) -> String {
    format!("{:0width$}", value, width = digits)
}

/// One IBIS telegram, content without terminator and parity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telegram {
    content: String,
}

impl Telegram {
    /// Line number, `l` + at least 3 digits
    pub fn line(line: u16) -> Self {
        Self::raw(format!("l{}", padded(line, 3)))
    }

    /// Destination code, `z` + at least 3 digits
    pub fn destination(destination: u16) -> Self {
        Self::raw(format!("z{}", padded(destination, 3)))
    }

    /// Display cycle, `xC` + number
    pub fn cycle(cycle: u8) -> Self {
        Self::raw(format!("xC{}", cycle))
    }

    /// Clock time, `u` + `HHmm`
    pub fn time(hhmm: &str) -> Result<Self> {
        if hhmm.len() != 4 || !hhmm.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid_telegram(format!(
                "Time {:?} is not HHmm",
                hhmm
            )));
        }
        Ok(Self::raw(format!("u{}", hhmm)))
    }

    /// Free text, `v` + text
    pub fn text(text: &str) -> Self {
        Self::raw(format!("v{}", text))
    }

    /// Menu / complex text, `zM ` + text
    pub fn complex_text(text: &str) -> Self {
        Self::raw(format!("zM {}", text))
    }

    /// Announcer symbol, `lE0` + number
    pub fn symbol(number: &str) -> Self {
        Self::raw(format!("lE0{}", number))
    }

    /// DS021t multi-block text for the display at `address`
    ///
    /// The block count is taken from the text as given. The text then gets
    /// an extra newline when it contains one past its first character, is
    /// terminated by two newlines, and is space-padded to a whole block.
    pub fn ds021t(address: &str, text: &str) -> Result<Self> {
        let blocks = u8::try_from(text.chars().count().div_ceil(DS021T_BLOCK_LEN))
            .map_err(|_| Error::invalid_telegram("DS021t text exceeds 255 blocks"))?;

        let mut body = text.to_string();
        if body.find('\n').is_some_and(|i| i > 0) {
            body.push('\n');
        }
        body.push_str("\n\n");

        let remainder = body.chars().count() % DS021T_BLOCK_LEN;
        if remainder > 0 {
            body.extend(std::iter::repeat(' ').take(DS021T_BLOCK_LEN - remainder));
        }

        Ok(Self::raw(format!(
            "aA{}{}A0{}",
            address,
            vdv_hex(blocks),
            body
        )))
    }

    /// Telegram with arbitrary content
    pub fn raw(content: impl Into<String>) -> Self {
        Telegram {
            content: content.into(),
        }
    }

    /// Content before terminator and parity
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Wire bytes: substituted content, CR, parity
    ///
    /// Characters that remain outside 7-bit ASCII after substitution
    /// cannot be sent.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let content = substitute_special_characters(&self.content);
        if let Some(c) = content.chars().find(|c| !c.is_ascii()) {
            return Err(Error::invalid_telegram(format!(
                "Character {:?} cannot be sent on a 7-bit bus",
                c
            )));
        }

        let mut bytes = content.into_bytes();
        let parity = parity(&bytes);
        bytes.push(CR);
        bytes.push(parity);
        Ok(bytes)
    }

    /// Encode and write to an IBIS channel
    pub fn write_to<T: Transport>(&self, transport: &mut T) -> Result<()> {
        transport.write_frame(&self.encode()?)?;
        Ok(())
    }
}
