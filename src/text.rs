//! Byte and character utilities shared by the parsers
//!
//! Everything here works on raw byte slices. Parsing never assumes the input
//! is valid UTF-8: the character classes used by the emphasis rules decode
//! on demand, and an undecodable neighbour counts as whitespace, the same as
//! the start or end of the text.

use crate::entities;
use crate::error::ConversionError;
use crate::mem::{MVec, Mem, VecExt};

/// Tab stops are every 4 columns
pub const TAB_STOP: usize = 4;

/// Encoding of U+FFFD REPLACEMENT CHARACTER
pub const REPLACEMENT: &[u8] = "\u{FFFD}".as_bytes();

pub(crate) fn is_space_or_tab(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

pub(crate) fn is_line_end(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

/// ASCII whitespace in the CommonMark sense (includes vertical tab)
pub(crate) fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\x0B' | b'\x0C' | b'\r')
}

pub(crate) fn is_ascii_punct(b: u8) -> bool {
    b.is_ascii_punctuation()
}

/// Copy the input into an allocator-owned buffer
///
/// U+0000 always becomes U+FFFD. With `validate`, every maximal invalid
/// UTF-8 subsequence becomes U+FFFD as well; otherwise other bytes pass
/// through untouched.
pub fn sanitize_input<'a>(
    mem: Mem<'a>,
    input: &[u8],
    validate: bool,
) -> Result<MVec<'a, u8>, ConversionError> {
    let mut out = mem.vec();
    out.try_reserve(input.len())?;

    if validate {
        for chunk in input.utf8_chunks() {
            push_without_nul(&mut out, chunk.valid().as_bytes())?;
            if !chunk.invalid().is_empty() {
                out.try_extend_from_slice(REPLACEMENT)?;
            }
        }
    } else {
        push_without_nul(&mut out, input)?;
    }

    Ok(out)
}

fn push_without_nul(out: &mut MVec<'_, u8>, bytes: &[u8]) -> Result<(), ConversionError> {
    let mut rest = bytes;
    while let Some(nul) = rest.iter().position(|&b| b == 0) {
        out.try_extend_from_slice(&rest[..nul])?;
        out.try_extend_from_slice(REPLACEMENT)?;
        rest = &rest[nul + 1..];
    }
    out.try_extend_from_slice(rest)
}

fn utf8_width(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 1,
    }
}

/// Decode the character starting at `pos`, `None` at the end or on bad UTF-8
pub(crate) fn char_at(s: &[u8], pos: usize) -> Option<char> {
    let lead = *s.get(pos)?;
    let end = (pos + utf8_width(lead)).min(s.len());
    std::str::from_utf8(&s[pos..end]).ok()?.chars().next()
}

/// Decode the character ending right before `pos`
pub(crate) fn char_before(s: &[u8], pos: usize) -> Option<char> {
    if pos == 0 || pos > s.len() {
        return None;
    }
    let mut start = pos - 1;
    while start > 0 && pos - start < 4 && s[start] & 0xC0 == 0x80 {
        start -= 1;
    }
    std::str::from_utf8(&s[start..pos]).ok()?.chars().next_back()
}

/// Unicode whitespace: Zs plus tab, line feed, form feed, carriage return
pub(crate) fn is_unicode_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0C' | '\r')
        || matches!(
            c,
            '\u{00A0}' | '\u{1680}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}'
        )
}

/// Unicode punctuation and symbols (P and S general categories)
///
/// ASCII is exact; beyond ASCII the check covers the punctuation and
/// symbol blocks that occur in practice.
pub(crate) fn is_unicode_punctuation(c: char) -> bool {
    if c.is_ascii() {
        return c.is_ascii_punctuation();
    }
    matches!(c,
        '\u{00A1}'..='\u{00A9}'
        | '\u{00AB}'..='\u{00AC}'
        | '\u{00AE}'..='\u{00B1}'
        | '\u{00B4}'
        | '\u{00B6}'..='\u{00B8}'
        | '\u{00BB}'
        | '\u{00BF}'
        | '\u{00D7}'
        | '\u{00F7}'
        | '\u{037E}'
        | '\u{0387}'
        | '\u{055A}'..='\u{055F}'
        | '\u{0589}'..='\u{058A}'
        | '\u{05BE}'
        | '\u{05C0}'
        | '\u{05C3}'
        | '\u{05C6}'
        | '\u{05F3}'..='\u{05F4}'
        | '\u{0609}'..='\u{060D}'
        | '\u{061B}'
        | '\u{061D}'..='\u{061F}'
        | '\u{066A}'..='\u{066D}'
        | '\u{06D4}'
        | '\u{0964}'..='\u{0965}'
        | '\u{0970}'
        | '\u{0E4F}'
        | '\u{0E5A}'..='\u{0E5B}'
        | '\u{2010}'..='\u{2027}'
        | '\u{2030}'..='\u{205E}'
        | '\u{207A}'..='\u{207E}'
        | '\u{208A}'..='\u{208E}'
        | '\u{20A0}'..='\u{20C0}'
        | '\u{2100}'..='\u{2101}'
        | '\u{2103}'..='\u{2106}'
        | '\u{2108}'..='\u{2109}'
        | '\u{2116}'..='\u{2118}'
        | '\u{211E}'..='\u{2123}'
        | '\u{2125}'
        | '\u{2127}'
        | '\u{2129}'
        | '\u{212E}'
        | '\u{2140}'..='\u{2144}'
        | '\u{214A}'..='\u{214D}'
        | '\u{214F}'
        | '\u{2190}'..='\u{2426}'
        | '\u{2440}'..='\u{244A}'
        | '\u{249C}'..='\u{24E9}'
        | '\u{2500}'..='\u{2775}'
        | '\u{2794}'..='\u{2B73}'
        | '\u{2B76}'..='\u{2BFF}'
        | '\u{2E00}'..='\u{2E5D}'
        | '\u{3001}'..='\u{3004}'
        | '\u{3008}'..='\u{3020}'
        | '\u{3030}'
        | '\u{303D}'
        | '\u{30A0}'
        | '\u{30FB}'
        | '\u{FD3E}'..='\u{FD3F}'
        | '\u{FE10}'..='\u{FE19}'
        | '\u{FE30}'..='\u{FE52}'
        | '\u{FE54}'..='\u{FE66}'
        | '\u{FE68}'..='\u{FE6B}'
        | '\u{FF01}'..='\u{FF0F}'
        | '\u{FF1A}'..='\u{FF20}'
        | '\u{FF3B}'..='\u{FF40}'
        | '\u{FF5B}'..='\u{FF65}'
        | '\u{FFE0}'..='\u{FFEE}'
        | '\u{1F000}'..='\u{1FAFF}'
    )
}

/// Append the UTF-8 encoding of `c`
pub(crate) fn push_char(out: &mut MVec<'_, u8>, c: char) -> Result<(), ConversionError> {
    let mut buf = [0u8; 4];
    out.try_extend_from_slice(c.encode_utf8(&mut buf).as_bytes())
}

/// Strip ASCII whitespace from both ends
pub(crate) fn trim(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|&b| !is_space(b)).unwrap_or(s.len());
    let end = s.iter().rposition(|&b| !is_space(b)).map_or(start, |i| i + 1);
    &s[start..end]
}

/// Strip ASCII whitespace from the end
pub(crate) fn rtrim(s: &[u8]) -> &[u8] {
    let end = s.iter().rposition(|&b| !is_space(b)).map_or(0, |i| i + 1);
    &s[..end]
}

/// Whether the slice holds only spaces, tabs and line endings
pub(crate) fn is_blank(s: &[u8]) -> bool {
    s.iter().all(|&b| is_space_or_tab(b) || is_line_end(b))
}

/// Append `src`, resolving backslash escapes and entity references
pub(crate) fn unescape_into(src: &[u8], out: &mut MVec<'_, u8>) -> Result<(), ConversionError> {
    let mut i = 0;
    let mut run = 0;

    while i < src.len() {
        match src[i] {
            b'\\' if i + 1 < src.len() && is_ascii_punct(src[i + 1]) => {
                out.try_extend_from_slice(&src[run..i])?;
                out.try_push(src[i + 1])?;
                i += 2;
                run = i;
            }
            b'&' => match entities::decode(&src[i + 1..]) {
                Some((consumed, decoded)) => {
                    out.try_extend_from_slice(&src[run..i])?;
                    decoded.push_to(out)?;
                    i += 1 + consumed;
                    run = i;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }

    out.try_extend_from_slice(&src[run..])
}

/// Append `src`, resolving entity references only
pub(crate) fn decode_entities_into(
    src: &[u8],
    out: &mut MVec<'_, u8>,
) -> Result<(), ConversionError> {
    let mut i = 0;
    let mut run = 0;

    while let Some(offset) = src[i..].iter().position(|&b| b == b'&') {
        let amp = i + offset;
        match entities::decode(&src[amp + 1..]) {
            Some((consumed, decoded)) => {
                out.try_extend_from_slice(&src[run..amp])?;
                decoded.push_to(out)?;
                i = amp + 1 + consumed;
                run = i;
            }
            None => i = amp + 1,
        }
    }

    out.try_extend_from_slice(&src[run..])
}

/// Normalize a link label for matching
///
/// Unicode case fold (lowercase then uppercase, so `ß` and `SS` meet),
/// surrounding whitespace trimmed, internal whitespace runs collapsed to one
/// space. Undecodable bytes are copied unchanged.
pub(crate) fn normalize_label(label: &[u8], out: &mut MVec<'_, u8>) -> Result<(), ConversionError> {
    let label = trim(label);
    let mut pending_space = false;

    for chunk in label.utf8_chunks() {
        for c in chunk.valid().chars() {
            if is_unicode_whitespace(c) {
                pending_space = true;
                continue;
            }
            if pending_space {
                out.try_push(b' ')?;
                pending_space = false;
            }
            for lower in c.to_lowercase() {
                for folded in lower.to_uppercase() {
                    push_char(out, folded)?;
                }
            }
        }
        if !chunk.invalid().is_empty() {
            if pending_space {
                out.try_push(b' ')?;
                pending_space = false;
            }
            out.try_extend_from_slice(chunk.invalid())?;
        }
    }

    Ok(())
}
