//! PDF object parser.
//!
//! Turns raw bytes into [`Object`] values. This is the tokenizing side of the
//! [`crate::reader::PdfReader`]; it understands the complete object syntax
//! (numbers, strings, names, arrays, dictionaries, references, streams and
//! `N G obj ... endobj` envelopes) but nothing about document structure.
//!
//! Whitespace (space, \t, \r, \n, \0, \f) and comments (% to EOL) are skipped
//! between tokens.

use crate::object::{Dictionary, Object, ObjectRef};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, one_of},
    combinator::{opt, recognize},
    sequence::{pair, tuple},
};

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

fn fail<T>(input: &[u8], kind: nom::error::ErrorKind) -> IResult<&[u8], T> {
    Err(nom::Err::Error(nom::error::Error::new(input, kind)))
}

/// Skip whitespace and comments.
pub fn skip_ws(mut input: &[u8]) -> IResult<&[u8], ()> {
    loop {
        let (rest, _) = take_while(is_whitespace)(input)?;
        input = rest;
        if input.first() == Some(&b'%') {
            let (rest, _) = take_while(|b| b != b'\n' && b != b'\r')(input)?;
            input = rest;
        } else {
            return Ok((input, ()));
        }
    }
}

fn unsigned_int(input: &[u8]) -> IResult<&[u8], u64> {
    let (rest, digits) = digit1(input)?;
    match std::str::from_utf8(digits).ok().and_then(|s| s.parse().ok()) {
        Some(n) => Ok((rest, n)),
        None => fail(input, nom::error::ErrorKind::Digit),
    }
}

fn parse_number(input: &[u8]) -> IResult<&[u8], Object> {
    let (rest, text) = recognize(pair(
        opt(one_of("+-")),
        alt((
            recognize(tuple((digit1, opt(pair(char('.'), digit0))))),
            recognize(pair(char('.'), digit1)),
        )),
    ))(input)?;
    let text = std::str::from_utf8(text).unwrap_or("0");
    if text.contains('.') {
        Ok((rest, Object::Real(text.parse().unwrap_or(0.0))))
    } else {
        match text.parse::<i64>() {
            Ok(i) => Ok((rest, Object::Integer(i))),
            Err(_) => Ok((rest, Object::Real(text.parse().unwrap_or(0.0)))),
        }
    }
}

/// Decode the body of a literal string, handling escapes and balanced
/// parentheses. `input` starts just after the opening parenthesis.
fn parse_literal_body(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        match b {
            b'\\' => {
                i += 1;
                let Some(&esc) = input.get(i) else { break };
                match esc {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'(' | b')' | b'\\' => out.push(esc),
                    b'\r' => {
                        if input.get(i + 1) == Some(&b'\n') {
                            i += 1;
                        }
                    },
                    b'\n' => {},
                    b'0'..=b'7' => {
                        let mut value = (esc - b'0') as u32;
                        let mut digits = 1;
                        while digits < 3 {
                            match input.get(i + 1) {
                                Some(&d @ b'0'..=b'7') => {
                                    value = value * 8 + (d - b'0') as u32;
                                    i += 1;
                                    digits += 1;
                                },
                                _ => break,
                            }
                        }
                        out.push((value & 0xFF) as u8);
                    },
                    other => out.push(other),
                }
            },
            b'(' => {
                depth += 1;
                out.push(b);
            },
            b')' => {
                if depth == 0 {
                    return Ok((&input[i + 1..], out));
                }
                depth -= 1;
                out.push(b);
            },
            _ => out.push(b),
        }
        i += 1;
    }
    fail(input, nom::error::ErrorKind::Eof)
}

fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Object> {
    let (rest, _) = char('(')(input)?;
    let (rest, bytes) = parse_literal_body(rest)?;
    Ok((rest, Object::String(bytes)))
}

/// Decode hex digits into bytes, ignoring whitespace. An odd trailing digit
/// is padded with 0.
pub fn decode_hex(hex: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = hex
        .iter()
        .filter_map(|&b| (b as char).to_digit(16).map(|d| d as u8))
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Object> {
    let (rest, _) = char('<')(input)?;
    let (rest, body) = take_while(|b| b != b'>')(rest)?;
    let (rest, _) = char('>')(rest)?;
    Ok((rest, Object::String(decode_hex(body))))
}

fn parse_name(input: &[u8]) -> IResult<&[u8], String> {
    let (rest, _) = char('/')(input)?;
    let (rest, raw) = take_while(is_regular)(rest)?;
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hex = &raw[i + 1..i + 3];
            if let Ok(v) = u8::from_str_radix(&String::from_utf8_lossy(hex), 16) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    Ok((rest, String::from_utf8_lossy(&out).into_owned()))
}

fn parse_array(input: &[u8]) -> IResult<&[u8], Object> {
    let (mut rest, _) = char('[')(input)?;
    let mut items = Vec::new();
    loop {
        let (r, _) = skip_ws(rest)?;
        if let Some(r) = r.strip_prefix(b"]") {
            return Ok((r, Object::Array(items)));
        }
        let (r, item) = parse_object(r)?;
        items.push(item);
        rest = r;
    }
}

fn parse_dictionary(input: &[u8]) -> IResult<&[u8], Object> {
    let (mut rest, _) = tag("<<")(input)?;
    let mut dict = Dictionary::new();
    loop {
        let (r, _) = skip_ws(rest)?;
        if let Some(r) = r.strip_prefix(b">>") {
            return Ok((r, Object::Dictionary(dict)));
        }
        let (r, key) = parse_name(r)?;
        let (r, _) = skip_ws(r)?;
        let (r, value) = parse_object(r)?;
        // A null value is equivalent to the key being absent.
        if !value.is_null() {
            dict.insert(key, value);
        }
        rest = r;
    }
}

fn parse_keyword(input: &[u8]) -> IResult<&[u8], Object> {
    let (rest, word) = take_while1(is_regular)(input)?;
    match word {
        b"true" => Ok((rest, Object::Boolean(true))),
        b"false" => Ok((rest, Object::Boolean(false))),
        b"null" => Ok((rest, Object::Null)),
        _ => fail(input, nom::error::ErrorKind::Tag),
    }
}

/// Try to read `G R` after an already-parsed object number.
fn reference_tail(input: &[u8]) -> Option<(&[u8], u16)> {
    let (rest, _) = skip_ws(input).ok()?;
    let (rest, gen) = unsigned_int(rest).ok()?;
    let (rest, _) = skip_ws(rest).ok()?;
    let rest = rest.strip_prefix(b"R")?;
    if rest.first().is_some_and(|&b| is_regular(b)) {
        return None;
    }
    Some((rest, u16::try_from(gen).ok()?))
}

/// Parse a single direct object (streams are handled by
/// [`parse_indirect_object`]).
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (input, _) = skip_ws(input)?;
    match input.first() {
        Some(b'/') => {
            let (rest, name) = parse_name(input)?;
            Ok((rest, Object::Name(name)))
        },
        Some(b'(') => parse_literal_string(input),
        Some(b'[') => parse_array(input),
        Some(b'<') if input.get(1) == Some(&b'<') => parse_dictionary(input),
        Some(b'<') => parse_hex_string(input),
        Some(b'0'..=b'9') => {
            let (rest, number) = parse_number(input)?;
            if let Object::Integer(id) = number {
                if let (Ok(id), Some((after, gen))) = (u32::try_from(id), reference_tail(rest)) {
                    return Ok((after, Object::Reference(ObjectRef::new(id, gen))));
                }
            }
            Ok((rest, number))
        },
        Some(b'+' | b'-' | b'.') => parse_number(input),
        Some(_) => parse_keyword(input),
        None => fail(input, nom::error::ErrorKind::Eof),
    }
}

/// Find the byte position of the `endstream` keyword, trimming the EOL that
/// precedes it.
fn find_endstream(input: &[u8]) -> Option<(usize, usize)> {
    let pos = input.windows(9).position(|w| w == b"endstream")?;
    let mut data_end = pos;
    if data_end > 0 && input[data_end - 1] == b'\n' {
        data_end -= 1;
    }
    if data_end > 0 && input[data_end - 1] == b'\r' {
        data_end -= 1;
    }
    Some((data_end, pos + 9))
}

fn parse_stream_body<'a>(input: &'a [u8], length: Option<usize>) -> IResult<&'a [u8], &'a [u8]> {
    let input = if let Some(r) = input.strip_prefix(b"\r\n") {
        r
    } else if let Some(r) = input.strip_prefix(b"\n") {
        r
    } else if let Some(r) = input.strip_prefix(b"\r") {
        log::warn!("Stream keyword followed by CR alone");
        r
    } else {
        input
    };

    if let Some(len) = length.filter(|&len| len <= input.len()) {
        let (data, rest) = input.split_at(len);
        if let Ok((after, _)) = skip_ws(rest) {
            if let Some(after) = after.strip_prefix(b"endstream") {
                return Ok((after, data));
            }
        }
        log::warn!("Stream /Length {} does not reach endstream, scanning instead", len);
    }

    match find_endstream(input) {
        Some((data_end, after)) => Ok((&input[after..], &input[..data_end])),
        None => fail(input, nom::error::ErrorKind::Eof),
    }
}

/// Parse an `N G obj ... endobj` envelope.
///
/// `resolve_length` is consulted when a stream's `/Length` is an indirect
/// reference; returning `None` falls back to scanning for `endstream`.
pub fn parse_indirect_object<'a>(
    input: &'a [u8],
    resolve_length: &dyn Fn(ObjectRef) -> Option<usize>,
) -> IResult<&'a [u8], (ObjectRef, Object)> {
    let (rest, _) = skip_ws(input)?;
    let (rest, id) = unsigned_int(rest)?;
    let (rest, _) = skip_ws(rest)?;
    let (rest, gen) = unsigned_int(rest)?;
    let (rest, _) = skip_ws(rest)?;
    let (rest, _) = tag("obj")(rest)?;
    let (rest, object) = parse_object(rest)?;
    let Ok(id) = u32::try_from(id) else {
        return fail(input, nom::error::ErrorKind::Digit);
    };
    let obj_ref = ObjectRef::new(id, gen as u16);

    let (after_ws, _) = skip_ws(rest)?;
    let (rest, object) = match (object, after_ws.strip_prefix(b"stream")) {
        (Object::Dictionary(dict), Some(body)) => {
            let length = match dict.get("Length") {
                Some(Object::Integer(n)) => usize::try_from(*n).ok(),
                Some(Object::Reference(r)) => resolve_length(*r),
                _ => None,
            };
            let (rest, data) = parse_stream_body(body, length)?;
            (rest, Object::stream(dict, bytes::Bytes::copy_from_slice(data)))
        },
        (object, _) => (rest, object),
    };

    let (rest, _) = skip_ws(rest)?;
    let rest = rest.strip_prefix(b"endobj").unwrap_or(rest);
    Ok((rest, (obj_ref, object)))
}
