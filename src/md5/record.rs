//! The parse/serialize capability shared by every record type

use chumsky::prelude::*;

use super::error::Md5Error;
use super::lexical::{whitespace, ParserError};

/// A record that can be read from and written back to MD5 text.
///
/// `parse` accepts surrounding whitespace but rejects trailing input. `serialize`
/// produces the canonical layout without a leading indent; containers add the tab.
pub trait Md5Record: Sized {
    fn parse(text: &str) -> Result<Self, Md5Error>;

    fn serialize(&self) -> String;
}

/// Run `parser` over the whole of `text`, mapping failures to [`Md5Error::Syntax`]
pub(crate) fn parse_complete<O, P>(parser: P, text: &str) -> Result<O, Md5Error>
where
    P: Parser<char, O, Error = ParserError>,
{
    whitespace()
        .ignore_then(parser)
        .then_ignore(whitespace())
        .then_ignore(end())
        .parse(text)
        .map_err(|errors| Md5Error::from_parse_errors(text, errors))
}
