//! Lexical helpers shared by the mesh and animation grammars
//!
//! Every helper here is a prefix parser: it consumes what it recognizes and leaves the
//! rest of the input alone. Whole-record parsing (which insists on consuming everything)
//! lives in [`super::record`].
//!
//! The formatting half of this module is [`format_number`], the single canonical way any
//! float field reaches the output text.

use chumsky::prelude::*;
use std::fmt;
use std::str::FromStr;

/// Type alias for parser error
pub(crate) type ParserError = Simple<char>;

/// Zero or more whitespace characters (newlines included)
pub(crate) fn whitespace() -> impl Parser<char, (), Error = ParserError> + Clone {
    filter(|c: &char| c.is_whitespace()).repeated().ignored()
}

/// At least one whitespace character
pub(crate) fn required_whitespace() -> impl Parser<char, (), Error = ParserError> + Clone {
    filter(|c: &char| c.is_whitespace())
        .ignore_then(whitespace())
        .labelled("whitespace")
}

/// Spaces and tabs only; never crosses a line break
pub(crate) fn inline_whitespace() -> impl Parser<char, (), Error = ParserError> + Clone {
    one_of(" \t").repeated().ignored()
}

fn quoted(min_len: usize) -> impl Parser<char, String, Error = ParserError> + Clone {
    just('"')
        .ignore_then(
            none_of("\\\"")
                .repeated()
                .at_least(min_len)
                .collect::<String>(),
        )
        .then_ignore(just('"'))
        .labelled("quoted string")
}

/// `"` + one or more chars that are neither `\` nor `"` + `"`
pub(crate) fn quoted_string() -> impl Parser<char, String, Error = ParserError> + Clone {
    quoted(1)
}

/// Like [`quoted_string`] but also accepts `""`
pub(crate) fn quoted_text() -> impl Parser<char, String, Error = ParserError> + Clone {
    quoted(0)
}

/// `(`, optional whitespace, `p`, optional whitespace, `)`
pub(crate) fn paren_group<O, P>(p: P) -> impl Parser<char, O, Error = ParserError> + Clone
where
    P: Parser<char, O, Error = ParserError> + Clone,
{
    just('(')
        .ignore_then(whitespace())
        .ignore_then(p)
        .then_ignore(whitespace())
        .then_ignore(just(')'))
}

/// The `key value` idiom: literal key, required whitespace, then `p`
pub(crate) fn key_value<O, P>(
    key: &'static str,
    p: P,
) -> impl Parser<char, O, Error = ParserError> + Clone
where
    P: Parser<char, O, Error = ParserError> + Clone,
{
    just(key)
        .ignore_then(required_whitespace())
        .ignore_then(p)
        .labelled(key)
}

/// Brace-delimited section with optional whitespace around every delimiter
pub(crate) fn block<O, P>(p: P) -> impl Parser<char, O, Error = ParserError> + Clone
where
    P: Parser<char, O, Error = ParserError> + Clone,
{
    whitespace()
        .ignore_then(just('{'))
        .ignore_then(whitespace())
        .ignore_then(p)
        .then_ignore(whitespace())
        .then_ignore(just('}'))
        .then_ignore(whitespace())
}

fn digits() -> impl Parser<char, String, Error = ParserError> + Clone {
    filter(|c: &char| c.is_ascii_digit())
        .repeated()
        .at_least(1)
        .collect::<String>()
        .labelled("digits")
}

fn parse_text<T>(text: String, span: std::ops::Range<usize>) -> Result<T, ParserError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    text.parse::<T>()
        .map_err(|e| Simple::custom(span, format!("invalid number {:?}: {}", text, e)))
}

/// Like `parse_text::<f64>`, but an overflow to infinity is a failure
fn parse_float(text: String, span: std::ops::Range<usize>) -> Result<f64, ParserError> {
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(_) => Err(Simple::custom(span, format!("number {:?} is out of range", text))),
        Err(e) => Err(Simple::custom(span, format!("invalid number {:?}: {}", text, e))),
    }
}

fn negative_integer_text() -> impl Parser<char, String, Error = ParserError> + Clone {
    just('-').ignore_then(digits()).map(|d| format!("-{}", d))
}

// Negative first: the positive rule alone would accept the digits after a stripped sign.
fn integer_text() -> impl Parser<char, String, Error = ParserError> + Clone {
    negative_integer_text().or(digits())
}

/// Digits only, converted to any integer type (counts, indices, version)
pub(crate) fn unsigned<T>() -> impl Parser<char, T, Error = ParserError> + Clone
where
    T: FromStr,
    T::Err: fmt::Display,
{
    digits().try_map(parse_text::<T>)
}

/// Optional `-` followed by digits
pub(crate) fn integer<T>() -> impl Parser<char, T, Error = ParserError> + Clone
where
    T: FromStr,
    T::Err: fmt::Display,
{
    integer_text().try_map(parse_text::<T>).labelled("integer")
}

/// Optional `-`, digits, `.`, digits
pub(crate) fn decimal() -> impl Parser<char, f64, Error = ParserError> + Clone {
    just('-')
        .or_not()
        .then(digits())
        .then_ignore(just('.'))
        .then(digits())
        .map(|((sign, whole), fraction)| {
            let sign = if sign.is_some() { "-" } else { "" };
            format!("{}{}.{}", sign, whole, fraction)
        })
        .try_map(parse_float)
}

/// Decimal if possible, otherwise an integer read as a float
pub(crate) fn number() -> impl Parser<char, f64, Error = ParserError> + Clone {
    decimal()
        .or(integer_text().try_map(parse_float))
        .labelled("number")
}

/// `( x y )`
pub(crate) fn vec2() -> impl Parser<char, [f64; 2], Error = ParserError> + Clone {
    paren_group(
        number()
            .then_ignore(required_whitespace())
            .then(number())
            .map(|(u, v)| [u, v]),
    )
}

/// `( x y z )`
pub(crate) fn vec3() -> impl Parser<char, [f64; 3], Error = ParserError> + Clone {
    paren_group(
        number()
            .then_ignore(required_whitespace())
            .then(number())
            .then_ignore(required_whitespace())
            .then(number())
            .map(|((x, y), z)| [x, y, z]),
    )
}

/// Optional `//` comment running to the end of the line.
///
/// The text after `//` is kept verbatim, leading spaces included, so `// origin`
/// yields `" origin"`. Without `//` only inline whitespace is consumed and the comment
/// is empty.
pub(crate) fn trailing_comment() -> impl Parser<char, String, Error = ParserError> + Clone {
    inline_whitespace()
        .ignore_then(
            just("//")
                .ignore_then(
                    filter(|c: &char| *c != '\n' && *c != '\r')
                        .repeated()
                        .collect::<String>(),
                )
                .or_not(),
        )
        .map(Option::unwrap_or_default)
}

/// Canonical text for a float field.
///
/// Rounds to 10 fractional digits, then drops trailing zeros (and the point itself when
/// nothing is left after it). Negative zero prints as `0`.
pub fn format_number(value: f64) -> String {
    let text = format!("{:.10}", value);
    let trimmed = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text.as_str()
    };
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn format_vec2(v: &[f64; 2]) -> String {
    format!("( {} {} )", format_number(v[0]), format_number(v[1]))
}

pub(crate) fn format_vec3(v: &[f64; 3]) -> String {
    format!(
        "( {} {} {} )",
        format_number(v[0]),
        format_number(v[1]),
        format_number(v[2])
    )
}

/// Emit `lines` one per row, each behind a single tab
pub(crate) fn push_indented(out: &mut String, lines: impl IntoIterator<Item = String>) {
    for line in lines {
        out.push('\t');
        out.push_str(&line);
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_quoted_string() {
        assert_eq!(quoted_string().parse("\"origin\"").unwrap(), "origin");
        assert_eq!(
            quoted_string().parse("\"models/monsters/imp\" rest").unwrap(),
            "models/monsters/imp"
        );
    }

    #[test]
    fn test_quoted_string_requires_closing_quote() {
        assert!(quoted_string().parse("\"origin").is_err());
    }

    #[test]
    fn test_quoted_string_rejects_empty_and_backslash() {
        assert!(quoted_string().parse("\"\"").is_err());
        assert!(quoted_string().parse("\"a\\b\"").is_err());
        assert_eq!(quoted_text().parse("\"\"").unwrap(), "");
    }

    #[test]
    fn test_required_whitespace() {
        assert!(required_whitespace().parse(" \t\n").is_ok());
        assert!(required_whitespace().parse("x").is_err());
        assert!(whitespace().parse("x").is_ok());
    }

    #[test]
    fn test_positive_integer() {
        assert_eq!(unsigned::<usize>().parse("12345").unwrap(), 12345);
        // prefix parser: stops at the '.'
        assert_eq!(unsigned::<usize>().parse("3.14").unwrap(), 3);
        assert!(unsigned::<usize>().parse("-86").is_err());
    }

    #[test]
    fn test_negative_integer() {
        assert_eq!(integer::<i32>().parse("-10").unwrap(), -10);
        assert_eq!(integer::<i32>().parse("-51.1").unwrap(), -51);
        assert_eq!(integer::<i32>().parse("22").unwrap(), 22);
        assert!(integer::<i32>().parse("-").is_err());
    }

    #[test]
    fn test_integer_out_of_range_is_a_syntax_failure() {
        assert!(unsigned::<u8>().parse("300").is_err());
    }

    #[rstest]
    #[case("4.25", 4.25)]
    #[case("-5.36", -5.36)]
    #[case("-0.705", -0.705)]
    #[case("10.05x", 10.05)]
    fn test_decimal(#[case] input: &str, #[case] expected: f64) {
        assert_eq!(decimal().parse(input).unwrap(), expected);
    }

    #[test]
    fn test_decimal_requires_point() {
        assert!(decimal().parse("-4").is_err());
    }

    #[rstest]
    #[case("0", 0.0)]
    #[case("-1", -1.0)]
    #[case("242.2109", 242.2109)]
    #[case("-0.0326106442", -0.0326106442)]
    fn test_number(#[case] input: &str, #[case] expected: f64) {
        assert_eq!(number().parse(input).unwrap(), expected);
    }

    #[test]
    fn test_number_overflowing_to_infinity_is_rejected() {
        let huge = format!("1{}", "0".repeat(400));
        assert!(number().parse(huge.as_str()).is_err());
        assert!(number().parse(format!("-{}.5", huge).as_str()).is_err());
    }

    #[test]
    fn test_vec3() {
        assert_eq!(
            vec3().parse("( -0.4375 242.2109 0.5078 )").unwrap(),
            [-0.4375, 242.2109, 0.5078]
        );
        assert_eq!(vec3().parse("(0\t0 1)").unwrap(), [0.0, 0.0, 1.0]);
        assert!(vec3().parse("( 0 0 )").is_err());
    }

    #[test]
    fn test_vec2() {
        assert_eq!(
            vec2().parse("( 0.574369 0.525882 )").unwrap(),
            [0.574369, 0.525882]
        );
    }

    #[test]
    fn test_key_value() {
        let parser = key_value("numJoints", unsigned::<usize>());
        assert_eq!(parser.parse("numJoints 33").unwrap(), 33);
        assert!(parser.parse("numJoints33").is_err());
    }

    #[test]
    fn test_block() {
        let parser = block(unsigned::<usize>());
        assert_eq!(parser.parse(" {\n\t7\n}\n").unwrap(), 7);
        assert!(parser.parse("{ 7").is_err());
    }

    #[test]
    fn test_trailing_comment_keeps_leading_space() {
        assert_eq!(trailing_comment().parse("// comment").unwrap(), " comment");
        assert_eq!(trailing_comment().parse("\t//  ( Tx Ty )").unwrap(), "  ( Tx Ty )");
    }

    #[test]
    fn test_trailing_comment_empty_forms() {
        assert_eq!(trailing_comment().parse("//").unwrap(), "");
        assert_eq!(trailing_comment().parse("\t").unwrap(), "");
        assert_eq!(trailing_comment().parse("").unwrap(), "");
    }

    #[test]
    fn test_trailing_comment_stops_at_line_end() {
        assert_eq!(trailing_comment().parse("// a\r\nnext").unwrap(), " a");
        assert_eq!(trailing_comment().parse("// a\nnext").unwrap(), " a");
    }

    #[rstest]
    #[case(5.0, "5")]
    #[case(3.14159265358979, "3.1415926536")]
    #[case(-0.705, "-0.705")]
    #[case(0.0, "0")]
    #[case(-0.0, "0")]
    #[case(-0.00000000001, "0")]
    #[case(-190.9219, "-190.9219")]
    #[case(0.7071067811865476, "0.7071067812")]
    #[case(1e-10, "0.0000000001")]
    #[case(1234567.0, "1234567")]
    fn test_format_number(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(format_number(value), expected);
    }

    #[test]
    fn test_push_indented() {
        let mut out = String::from("joints {\n");
        push_indented(&mut out, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(out, "joints {\n\ta\n\tb\n");
    }

    #[test]
    fn test_format_vectors() {
        assert_eq!(format_vec3(&[0.0, -1.5, 2.0]), "( 0 -1.5 2 )");
        assert_eq!(format_vec2(&[0.25, 1.0]), "( 0.25 1 )");
    }
}
