use crate::error::{Error, Result};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;

/// Decodes raw XML bytes into a string.
///
/// A byte order mark wins. Otherwise UTF-16 is recognized from the bytes of
/// `<?`, and ASCII-compatible input is decoded with the encoding named in its
/// XML declaration, defaulting to UTF-8.
pub(crate) fn decode(bytes: &[u8]) -> Result<Cow<str>> {
    let (encoding, bom_len) = sniff_encoding(bytes)?;
    let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
    if had_errors {
        return Err(Error::CannotDecode);
    }
    Ok(text)
}

fn sniff_encoding(bytes: &[u8]) -> Result<(&'static Encoding, usize)> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return Ok((encoding, bom_len));
    }
    let encoding = match bytes {
        [0x00, 0x3c, 0x00, 0x3f, ..] => UTF_16BE,
        [0x3c, 0x00, 0x3f, 0x00, ..] => UTF_16LE,
        [0x3c, 0x3f, ..] => declared_encoding(bytes)?.unwrap_or(UTF_8),
        _ => UTF_8,
    };
    Ok((encoding, 0))
}

// Reads the encoding named in the XML declaration at the start of `bytes`.
fn declared_encoding(bytes: &[u8]) -> Result<Option<&'static Encoding>> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::with_capacity(64);
    let label = match reader.read_event(&mut buf)? {
        Event::Decl(ev) => match ev.encoding() {
            Some(label) => label?.into_owned(),
            None => return Ok(None),
        },
        _ => return Ok(None),
    };
    let encoding = Encoding::for_label(&label).ok_or(Error::CannotDecode)?;
    // A declaration read as ASCII cannot be UTF-16 encoded text.
    if encoding == UTF_16LE || encoding == UTF_16BE {
        Ok(Some(UTF_8))
    } else {
        Ok(Some(encoding))
    }
}
