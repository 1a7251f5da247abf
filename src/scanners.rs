//! Token recognizers for block starts and inline constructs
//!
//! Pure functions over byte slices. Positions are absolute offsets into the
//! slice; lengths returned are counted from the position passed in. Block
//! scanners run on a single line that always ends in `\n`.

use crate::text::{is_line_end, is_space, is_space_or_tab};

/// Longest URI scheme accepted in an autolink
const MAX_SCHEME_LENGTH: usize = 32;

static BLOCK_TAG_NAMES: &[&[u8]] = &[
    b"address",
    b"article",
    b"aside",
    b"base",
    b"basefont",
    b"blockquote",
    b"body",
    b"caption",
    b"center",
    b"col",
    b"colgroup",
    b"dd",
    b"details",
    b"dialog",
    b"dir",
    b"div",
    b"dl",
    b"dt",
    b"fieldset",
    b"figcaption",
    b"figure",
    b"footer",
    b"form",
    b"frame",
    b"frameset",
    b"h1",
    b"h2",
    b"h3",
    b"h4",
    b"h5",
    b"h6",
    b"head",
    b"header",
    b"hr",
    b"html",
    b"iframe",
    b"legend",
    b"li",
    b"link",
    b"main",
    b"menu",
    b"menuitem",
    b"nav",
    b"noframes",
    b"ol",
    b"optgroup",
    b"option",
    b"p",
    b"param",
    b"search",
    b"section",
    b"summary",
    b"table",
    b"tbody",
    b"td",
    b"tfoot",
    b"th",
    b"thead",
    b"title",
    b"tr",
    b"track",
    b"ul",
];

static VERBATIM_TAG_NAMES: &[&[u8]] = &[b"script", b"pre", b"style", b"textarea"];

fn at(s: &[u8], pos: usize) -> u8 {
    s.get(pos).copied().unwrap_or(0)
}

fn starts_with_ignore_case(s: &[u8], pos: usize, prefix: &[u8]) -> bool {
    s.len() >= pos + prefix.len() && s[pos..pos + prefix.len()].eq_ignore_ascii_case(prefix)
}

fn contains(s: &[u8], needle: &[u8]) -> Option<usize> {
    s.windows(needle.len()).position(|w| w == needle)
}

fn skip_while(s: &[u8], mut pos: usize, pred: impl Fn(u8) -> bool) -> usize {
    while pos < s.len() && pred(s[pos]) {
        pos += 1;
    }
    pos
}

/// Thematic break at `pos`: `Ok(length)` or `Err(position to skip to)`
///
/// The error position lets the caller avoid rescanning the same run when
/// nested containers try again at a later offset.
pub(crate) fn thematic_break(s: &[u8], pos: usize) -> Result<usize, usize> {
    let c = at(s, pos);
    if !matches!(c, b'*' | b'_' | b'-') {
        return Err(pos);
    }

    let mut count = 1;
    let mut i = pos + 1;
    while i < s.len() {
        let next = s[i];
        if next == c {
            count += 1;
        } else if !is_space_or_tab(next) {
            break;
        }
        i += 1;
    }

    if count >= 3 && (i >= s.len() || is_line_end(s[i])) {
        Ok(i - pos)
    } else {
        Err(i)
    }
}

/// `#` run of 1 to 6 followed by whitespace or the end of the line
///
/// Returns `(level, length)` where the length covers the run and the spaces
/// after it.
pub(crate) fn atx_heading_start(s: &[u8], pos: usize) -> Option<(u8, usize)> {
    let run_end = skip_while(s, pos, |b| b == b'#');
    let level = run_end - pos;
    if level == 0 || level > 6 {
        return None;
    }
    let next = at(s, run_end);
    if !(is_space_or_tab(next) || is_line_end(next) || next == 0) {
        return None;
    }
    let end = skip_while(s, run_end, is_space_or_tab);
    Some((level as u8, end - pos))
}

/// Opening code fence, returns the length of the fence run
pub(crate) fn open_code_fence(s: &[u8], pos: usize) -> Option<usize> {
    let c = at(s, pos);
    if c != b'`' && c != b'~' {
        return None;
    }
    let run_end = skip_while(s, pos, |b| b == c);
    if run_end - pos < 3 {
        return None;
    }
    if c == b'`' {
        let line_end = skip_while(s, run_end, |b| !is_line_end(b));
        if s[run_end..line_end].contains(&b'`') {
            return None;
        }
    }
    Some(run_end - pos)
}

/// Closing code fence, returns the length of the fence run
pub(crate) fn close_code_fence(s: &[u8], pos: usize) -> Option<usize> {
    let c = at(s, pos);
    if c != b'`' && c != b'~' {
        return None;
    }
    let run_end = skip_while(s, pos, |b| b == c);
    if run_end - pos < 3 {
        return None;
    }
    let after = skip_while(s, run_end, is_space_or_tab);
    if after < s.len() && !is_line_end(s[after]) {
        return None;
    }
    Some(run_end - pos)
}

/// `=` (level 1) or `-` (level 2) underline with optional trailing spaces
pub(crate) fn setext_heading_line(s: &[u8], pos: usize) -> Option<u8> {
    let c = at(s, pos);
    let level = match c {
        b'=' => 1,
        b'-' => 2,
        _ => return None,
    };
    let run_end = skip_while(s, pos, |b| b == c);
    let after = skip_while(s, run_end, is_space_or_tab);
    if after < s.len() && !is_line_end(s[after]) {
        return None;
    }
    Some(level)
}

fn tag_name_end(s: &[u8], pos: usize) -> Option<usize> {
    if !at(s, pos).is_ascii_alphabetic() {
        return None;
    }
    Some(skip_while(s, pos + 1, |b| b.is_ascii_alphanumeric() || b == b'-'))
}

fn is_tag_boundary(b: u8) -> bool {
    is_space_or_tab(b) || is_line_end(b) || b == b'>' || b == 0
}

/// HTML block start conditions 1 to 6
pub(crate) fn html_block_start(s: &[u8], pos: usize) -> Option<u8> {
    if at(s, pos) != b'<' {
        return None;
    }
    let rest = pos + 1;

    if starts_with_ignore_case(s, rest, b"![CDATA[") {
        return Some(5);
    }
    if starts_with_ignore_case(s, rest, b"!--") {
        return Some(2);
    }
    if at(s, rest) == b'?' {
        return Some(3);
    }
    if at(s, rest) == b'!' && at(s, rest + 1).is_ascii_alphabetic() {
        return Some(4);
    }

    for name in VERBATIM_TAG_NAMES {
        if starts_with_ignore_case(s, rest, name) && is_tag_boundary(at(s, rest + name.len())) {
            return Some(1);
        }
    }

    let name_start = if at(s, rest) == b'/' { rest + 1 } else { rest };
    let name_end = tag_name_end(s, name_start)?;
    let name = &s[name_start..name_end];
    if BLOCK_TAG_NAMES.iter().any(|tag| tag.eq_ignore_ascii_case(name)) {
        let next = at(s, name_end);
        if is_tag_boundary(next) || (next == b'/' && at(s, name_end + 1) == b'>') {
            return Some(6);
        }
    }

    None
}

/// HTML block start condition 7: a lone complete open or closing tag
pub(crate) fn html_block_start_7(s: &[u8], pos: usize) -> Option<u8> {
    if at(s, pos) != b'<' {
        return None;
    }
    let rest = pos + 1;
    let (name_start, end) = if at(s, rest) == b'/' {
        (rest + 1, closing_tag(s, rest + 1)?)
    } else {
        (rest, open_tag(s, rest)?)
    };

    let name_end = tag_name_end(s, name_start)?;
    let name = &s[name_start..name_end];
    if VERBATIM_TAG_NAMES
        .iter()
        .any(|tag| tag.eq_ignore_ascii_case(name))
    {
        return None;
    }

    let after = skip_while(s, end, is_space_or_tab);
    if after < s.len() && !is_line_end(s[after]) {
        return None;
    }
    Some(7)
}

/// Whether `line` satisfies the end condition of an HTML block
pub(crate) fn html_block_end(kind: u8, line: &[u8]) -> bool {
    match kind {
        1 => VERBATIM_TAG_NAMES.iter().any(|name| {
            line.windows(name.len() + 3).any(|w| {
                w[0] == b'<'
                    && w[1] == b'/'
                    && w[2..2 + name.len()].eq_ignore_ascii_case(name)
                    && w[w.len() - 1] == b'>'
            })
        }),
        2 => contains(line, b"-->").is_some(),
        3 => contains(line, b"?>").is_some(),
        4 => line.contains(&b'>'),
        5 => contains(line, b"]]>").is_some(),
        _ => false,
    }
}

fn attribute_value_end(s: &[u8], pos: usize) -> Option<usize> {
    match at(s, pos) {
        q @ (b'"' | b'\'') => {
            let close = s[pos + 1..].iter().position(|&b| b == q)?;
            Some(pos + 1 + close + 1)
        }
        _ => {
            let end = skip_while(s, pos, |b| {
                !is_space(b) && !matches!(b, b'"' | b'\'' | b'=' | b'<' | b'>' | b'`')
            });
            (end > pos).then_some(end)
        }
    }
}

/// Open tag starting at the tag name, returns the position after `>`
fn open_tag(s: &[u8], pos: usize) -> Option<usize> {
    let mut i = tag_name_end(s, pos)?;

    loop {
        let ws_end = skip_while(s, i, is_space);
        let c = at(s, ws_end);
        if ws_end > i && (c.is_ascii_alphabetic() || c == b'_' || c == b':') {
            // attribute name
            let mut j = skip_while(s, ws_end + 1, |b| {
                b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b':' | b'-')
            });
            let eq = skip_while(s, j, is_space);
            if at(s, eq) == b'=' {
                let value = skip_while(s, eq + 1, is_space);
                j = attribute_value_end(s, value)?;
            }
            i = j;
            continue;
        }

        return match c {
            b'>' => Some(ws_end + 1),
            b'/' if at(s, ws_end + 1) == b'>' => Some(ws_end + 2),
            _ => None,
        };
    }
}

/// Closing tag starting at the tag name (after `</`)
fn closing_tag(s: &[u8], pos: usize) -> Option<usize> {
    let name_end = tag_name_end(s, pos)?;
    let end = skip_while(s, name_end, is_space);
    (at(s, end) == b'>').then_some(end + 1)
}

/// Inline raw HTML starting right after `<`
///
/// Returns the length up to and including the final `>`.
pub(crate) fn html_tag(s: &[u8], pos: usize) -> Option<usize> {
    let end = match at(s, pos) {
        b'/' => closing_tag(s, pos + 1)?,
        b'?' => {
            let close = contains(&s[pos + 1..], b"?>")?;
            pos + 1 + close + 2
        }
        b'!' if s[pos..].starts_with(b"!--") => {
            let body = pos + 3;
            if s[body..].starts_with(b">") {
                body + 1
            } else if s[body..].starts_with(b"->") {
                body + 2
            } else {
                let close = contains(&s[body..], b"-->")?;
                body + close + 3
            }
        }
        b'!' if s[pos..].starts_with(b"![CDATA[") => {
            let body = pos + 8;
            let close = contains(&s[body..], b"]]>")?;
            body + close + 3
        }
        b'!' if at(s, pos + 1).is_ascii_alphabetic() => {
            let close = s[pos + 2..].iter().position(|&b| b == b'>')?;
            pos + 2 + close + 1
        }
        _ => open_tag(s, pos)?,
    };
    Some(end - pos)
}

/// URI autolink body starting right after `<`, length including `>`
pub(crate) fn autolink_uri(s: &[u8], pos: usize) -> Option<usize> {
    if !at(s, pos).is_ascii_alphabetic() {
        return None;
    }
    let scheme_end = skip_while(s, pos + 1, |b| {
        b.is_ascii_alphanumeric() || matches!(b, b'+' | b'.' | b'-')
    });
    let scheme_len = scheme_end - pos;
    if !(2..=MAX_SCHEME_LENGTH).contains(&scheme_len) || at(s, scheme_end) != b':' {
        return None;
    }
    let end = skip_while(s, scheme_end + 1, |b| b > b' ' && b != b'<' && b != b'>');
    (at(s, end) == b'>').then_some(end + 1 - pos)
}

fn is_email_local(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b".!#$%&'*+/=?^_`{|}~-".contains(&b)
}

/// Email autolink body starting right after `<`, length including `>`
pub(crate) fn autolink_email(s: &[u8], pos: usize) -> Option<usize> {
    let at_sign = skip_while(s, pos, is_email_local);
    if at_sign == pos || at(s, at_sign) != b'@' {
        return None;
    }

    let mut i = at_sign + 1;
    loop {
        if !at(s, i).is_ascii_alphanumeric() {
            return None;
        }
        let label_end = skip_while(s, i, |b| b.is_ascii_alphanumeric() || b == b'-');
        if label_end - i > 63 || s[label_end - 1] == b'-' {
            return None;
        }
        match at(s, label_end) {
            b'.' => i = label_end + 1,
            b'>' => return Some(label_end + 1 - pos),
            _ => return None,
        }
    }
}

/// Link title in `"…"`, `'…'` or `(…)`, length including delimiters
pub(crate) fn link_title(s: &[u8], pos: usize) -> Option<usize> {
    let close = match at(s, pos) {
        b'"' => b'"',
        b'\'' => b'\'',
        b'(' => b')',
        _ => return None,
    };
    let open = s[pos];

    let mut i = pos + 1;
    while i < s.len() {
        match s[i] {
            b'\\' if i + 1 < s.len() => i += 2,
            b if b == close => return Some(i + 1 - pos),
            b if open == b'(' && b == b'(' => return None,
            _ => i += 1,
        }
    }
    None
}

/// Number of whitespace bytes (including line endings) at `pos`
pub(crate) fn spacechars(s: &[u8], pos: usize) -> usize {
    skip_while(s, pos, is_space) - pos
}
