//! The textual debugger patch: a partial machine state applied in one step between ticks.
//!
//! ```text
//! PC=0x10; SR{3:5,4:1} GR{0:{4:7}} DDRAM{0:0x41} MEMORY[0x20,0xABCD]
//! ```
//!
//! Malformed entries and pairs are skipped one at a time; the rest of the patch still applies.

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{alpha1, char, digit1, hex_digit1, multispace0, one_of},
    combinator::{eof, map, map_res, peek, value},
    error::{Error, ErrorKind},
    sequence::{delimited, preceded, separated_pair, terminated},
    IResult, InputTake,
};
use nom_locate::LocatedSpan;

use crate::plat::{check_gr, check_sr};

use super::{
    display::{CELL_COUNT, DCTRL_COUNT},
    EmuError,
};

pub type Span<'a> = LocatedSpan<&'a str>;

/// A parsed debugger patch. Every field is optional; empty lists leave that part of the
/// machine untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePatch {
    pub pc: Option<u16>,
    pub la: Option<u8>,
    pub sa: Option<u16>,
    pub cb: Option<u8>,
    pub ab: Option<u8>,
    pub cf: Option<bool>,
    pub zf: Option<bool>,
    /// `(index, value)`
    pub sr: Vec<(u8, u8)>,
    /// `(bank, index, value)`
    pub gr: Vec<(u8, u8, u8)>,
    pub ddram: Vec<(u8, u8)>,
    /// Cells 48..64 overlap the display control registers and write to them.
    pub daram: Vec<(u8, u8)>,
    pub dctrl: Vec<(u8, u8)>,
    /// `(byte address, word)` written big-endian into the combined memory map.
    pub memory: Vec<(usize, u16)>,
}

enum Form<'a> {
    Scalar(u32),
    Block(Span<'a>),
    Memory(u32, u32),
}

impl StatePatch {
    /// Parses the textual patch form. Never fails: rejected entries are logged and returned
    /// alongside whatever parsed cleanly.
    pub fn parse(text: &str) -> (Self, Vec<EmuError>) {
        let mut parser = PatchParser::default();
        let patch = parser.patch(Span::new(text));
        (patch, parser.rejected)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn number(inp: Span) -> IResult<Span, u32> {
    alt((
        map_res(preceded(tag_no_case("0x"), hex_digit1), |x: Span| {
            u32::from_str_radix(x.fragment(), 16)
        }),
        map_res(digit1, |x: Span| x.fragment().parse::<u32>()),
    ))(inp)
}

/// Parses a whole string as a decimal or `0x` hex number.
pub fn parse_number(text: &str) -> Option<u32> {
    terminated(number, eof)(Span::new(text.trim()))
        .ok()
        .map(|(_, n)| n)
}

fn padded_number(inp: Span) -> IResult<Span, u32> {
    delimited(multispace0, number, multispace0)(inp)
}

fn pair(inp: Span) -> IResult<Span, (u32, u32)> {
    separated_pair(
        terminated(number, multispace0),
        char(':'),
        preceded(multispace0, number),
    )(inp)
}

/// An entry or pair has to end at a separator or at the end of its block.
fn boundary(inp: Span) -> IResult<Span, ()> {
    peek(alt((value((), one_of(" \t\r\n;,")), value((), eof))))(inp)
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == ';' || c == ','
}

fn skip_separators(inp: Span) -> Span {
    let n = inp
        .fragment()
        .find(|c: char| !is_separator(c))
        .unwrap_or(inp.fragment().len());
    inp.take_split(n).0
}

/// Splits off the body of a `{...}` block, braces balanced.
fn braced(inp: Span) -> IResult<Span, Span> {
    let (rest, _) = char('{')(inp)?;
    let mut depth = 0usize;
    for (i, c) in rest.fragment().char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => {
                let (rest, body) = rest.take_split(i);
                let (rest, _) = char('}')(rest)?;
                return Ok((rest, body));
            }
            '}' => depth -= 1,
            _ => {}
        }
    }
    Err(nom::Err::Error(Error::new(inp, ErrorKind::Char)))
}

fn entry(inp: Span) -> IResult<Span, (Span, Form)> {
    let (rest, key) = alpha1(inp)?;
    let (rest, form) = alt((
        map(
            preceded(delimited(multispace0, char('='), multispace0), number),
            Form::Scalar,
        ),
        map(braced, Form::Block),
        map(
            delimited(
                char('['),
                separated_pair(padded_number, char(','), padded_number),
                char(']'),
            ),
            |(addr, v)| Form::Memory(addr, v),
        ),
    ))(rest)?;
    let (rest, _) = boundary(rest)?;
    Ok((rest, (key, form)))
}

/// Advances past a malformed entry: up to the next separator outside any brackets.
fn skip_malformed<'a>(inp: Span<'a>, stops: &[char]) -> (Span<'a>, Span<'a>) {
    let mut depth = 0i32;
    let mut end = inp.fragment().len();
    for (i, c) in inp.fragment().char_indices() {
        match c {
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            c if depth <= 0 && (c.is_whitespace() || stops.contains(&c)) => {
                end = i;
                break;
            }
            _ => {}
        }
    }
    inp.take_split(end)
}

#[derive(Default)]
struct PatchParser {
    rejected: Vec<EmuError>,
}

impl PatchParser {
    fn reject(&mut self, err: EmuError) {
        log::warn!("skipping patch entry: {err}");
        self.rejected.push(err);
    }

    fn malformed(&mut self, at: Span, fragment: &str) {
        self.reject(EmuError::MalformedPatch {
            column: at.get_utf8_column(),
            fragment: fragment.to_string(),
        });
    }

    /// Parses every item of a block body, skipping the ones `item` rejects.
    fn items<'a, T>(
        &mut self,
        body: Span<'a>,
        mut item: impl FnMut(Span<'a>) -> IResult<Span<'a>, T>,
    ) -> Vec<(Span<'a>, T)> {
        let mut out = Vec::new();
        let mut inp = skip_separators(body);
        while !inp.fragment().is_empty() {
            match item(inp).and_then(|(rest, t)| boundary(rest).map(|_| (rest, t))) {
                Ok((rest, t)) => {
                    out.push((inp, t));
                    inp = rest;
                }
                Err(_) => {
                    let (rest, bad) = skip_malformed(inp, &[',']);
                    self.malformed(inp, bad.fragment());
                    inp = rest;
                }
            }
            inp = skip_separators(inp);
        }
        out
    }

    /// `index:value` pairs with `index < limit`.
    fn bounded_pairs(&mut self, body: Span, limit: usize) -> Vec<(u8, u8)> {
        let mut out = Vec::new();
        for (at, (index, v)) in self.items(body, pair) {
            if index as usize >= limit {
                self.malformed(at, &format!("{index}:{v}"));
                continue;
            }
            out.push((index as u8, v as u8));
        }
        out
    }

    fn special_registers(&mut self, body: Span) -> Vec<(u8, u8)> {
        let mut out = Vec::new();
        for (_, (index, v)) in self.items(body, pair) {
            match check_sr(index) {
                Ok(index) => out.push((index as u8, v as u8)),
                Err(e) => self.reject(e.into()),
            }
        }
        out
    }

    fn general_registers(&mut self, body: Span) -> Vec<(u8, u8, u8)> {
        let banks = self.items(body, |inp| {
            separated_pair(padded_number, char(':'), preceded(multispace0, braced))(inp)
        });
        let mut out = Vec::new();
        for (_, (bank, inner)) in banks {
            for (_, (index, v)) in self.items(inner, pair) {
                match check_gr(bank, index) {
                    Ok((bank, index)) => out.push((bank as u8, index as u8, v as u8)),
                    Err(e) => self.reject(e.into()),
                }
            }
        }
        out
    }

    fn patch(&mut self, inp: Span) -> StatePatch {
        let mut patch = StatePatch::default();
        let mut inp = skip_separators(inp);
        while !inp.fragment().is_empty() {
            let (rest, (key, form)) = match entry(inp) {
                Ok(parsed) => parsed,
                Err(_) => {
                    let (rest, bad) = skip_malformed(inp, &[';', ',']);
                    self.malformed(inp, bad.fragment());
                    inp = skip_separators(rest);
                    continue;
                }
            };

            let name = key.fragment().to_ascii_uppercase();
            match (name.as_str(), form) {
                ("PC", Form::Scalar(v)) => patch.pc = Some(v as u16),
                ("LA", Form::Scalar(v)) => patch.la = Some(v as u8),
                ("SA", Form::Scalar(v)) => patch.sa = Some(v as u16),
                ("CB", Form::Scalar(v)) => patch.cb = Some(v as u8),
                ("AB", Form::Scalar(v)) => patch.ab = Some(v as u8),
                ("CF", Form::Scalar(v)) => patch.cf = Some(v != 0),
                ("ZF", Form::Scalar(v)) => patch.zf = Some(v != 0),
                ("SR", Form::Block(body)) => {
                    let regs = self.special_registers(body);
                    patch.sr.extend(regs);
                }
                ("GR", Form::Block(body)) => {
                    let regs = self.general_registers(body);
                    patch.gr.extend(regs);
                }
                ("DDRAM", Form::Block(body)) => {
                    let cells = self.bounded_pairs(body, CELL_COUNT);
                    patch.ddram.extend(cells);
                }
                ("DARAM", Form::Block(body)) => {
                    // 48 and up write through to the control registers
                    let cells = self.bounded_pairs(body, CELL_COUNT);
                    patch.daram.extend(cells);
                }
                ("DCTRL", Form::Block(body)) => {
                    let regs = self.bounded_pairs(body, DCTRL_COUNT);
                    patch.dctrl.extend(regs);
                }
                ("MEMORY", Form::Memory(addr, v)) => patch.memory.push((addr as usize, v as u16)),
                (
                    "PC" | "LA" | "SA" | "CB" | "AB" | "CF" | "ZF" | "SR" | "GR" | "DDRAM"
                    | "DARAM" | "DCTRL" | "MEMORY",
                    _,
                ) => {
                    let len = rest.location_offset() - inp.location_offset();
                    self.malformed(inp, &inp.fragment()[..len]);
                }
                _ => log::debug!("ignoring unknown patch key {name}"),
            }
            inp = skip_separators(rest);
        }
        patch
    }
}
