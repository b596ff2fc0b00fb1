//! `string.format`
//!
//! A `%s` argument with a `__tostring` metamethod is converted by calling
//! back into the script; the conversion may suspend, so the formatter keeps
//! its position in the format string, the output built so far and the
//! remaining arguments in [`FormatState`].

use crate::args::Args;
use std::iter::Peekable;
use std::rc::Rc;
use std::str::CharIndices;
use tide_engine::{
    dispatch, restore, CallFrame, CallResult, ExecutionContext, Function, SavedState, ScriptError,
    Value, Window,
};

const NAME: &str = "format";

/// Width and precision are limited to two digits
const MAX_FIELD: usize = 100;

/// `string.format(fmt, ...)`
#[derive(Debug, Default)]
pub struct Format;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Flags {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alt: bool,
}

/// One parsed conversion specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Spec {
    flags: Flags,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
}

/// Where a suspended format call stopped
#[derive(Debug)]
pub struct FormatState {
    format: Rc<str>,
    out: String,
    args: Args,
    pos: usize,
    pending: Option<Spec>,
}

impl FormatState {
    /// Output accumulated so far
    pub fn output(&self) -> &str {
        &self.out
    }

    /// Byte offset in the format string to continue from
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Append the `__tostring` result found in `window[0]` using the pending spec
    fn collect(&mut self, ctx: &ExecutionContext, window: Window) -> Result<(), ScriptError> {
        let Some(spec) = self.pending.take() else {
            return Ok(());
        };
        match window.arg(&ctx.stack, 0).to_str_coerced() {
            Some(s) => {
                spec.push_str(&s, &mut self.out);
                Ok(())
            }
            None => Err(ScriptError::new("'__tostring' must return a string")),
        }
    }
}

/// Up to two decimal digits of width or precision
fn field(chars: &mut Peekable<CharIndices<'_>>) -> Result<Option<usize>, ScriptError> {
    let mut value: Option<usize> = None;
    while let Some(&(_, c)) = chars.peek() {
        let Some(d) = c.to_digit(10) else { break };
        let v = value.unwrap_or(0) * 10 + d as usize;
        if v >= MAX_FIELD {
            return Err(ScriptError::new("illegal format (width or precision too long)"));
        }
        value = Some(v);
        chars.next();
    }
    Ok(value)
}

fn invalid_option(c: Option<char>) -> ScriptError {
    match c {
        Some(c) => ScriptError::new(format!("invalid option '%{}' to 'format'", c)),
        None => ScriptError::new("invalid option '%' to 'format'"),
    }
}

impl Spec {
    /// Parse the text following a `%`; returns the spec and its length in bytes
    fn parse(text: &str) -> Result<(Spec, usize), ScriptError> {
        let mut chars = text.char_indices().peekable();
        let mut flags = Flags::default();

        while let Some(&(_, c)) = chars.peek() {
            let flag = match c {
                '-' => &mut flags.left,
                '+' => &mut flags.plus,
                ' ' => &mut flags.space,
                '0' => &mut flags.zero,
                '#' => &mut flags.alt,
                _ => break,
            };
            if *flag {
                return Err(ScriptError::new("illegal format (repeated flags)"));
            }
            *flag = true;
            chars.next();
        }

        let width = field(&mut chars)?;
        let precision = match chars.peek() {
            Some(&(_, '.')) => {
                chars.next();
                Some(field(&mut chars)?.unwrap_or(0))
            }
            _ => None,
        };

        match chars.next() {
            Some((i, conversion)) => Ok((
                Spec {
                    flags,
                    width,
                    precision,
                    conversion,
                },
                i + conversion.len_utf8(),
            )),
            None => Err(invalid_option(None)),
        }
    }

    fn sign(&self, negative: bool) -> &'static str {
        if negative {
            "-"
        } else if self.flags.plus {
            "+"
        } else if self.flags.space {
            " "
        } else {
            ""
        }
    }

    /// Pad `body` to the field width. `prefix` (sign, radix marker) stays in
    /// front of any zero padding.
    fn push_padded(&self, prefix: &str, body: &str, zero_ok: bool, out: &mut String) {
        let len = prefix.chars().count() + body.chars().count();
        let fill = self.width.unwrap_or(0).saturating_sub(len);
        if self.flags.left {
            out.push_str(prefix);
            out.push_str(body);
            out.extend(std::iter::repeat(' ').take(fill));
        } else if self.flags.zero && zero_ok {
            out.push_str(prefix);
            out.extend(std::iter::repeat('0').take(fill));
            out.push_str(body);
        } else {
            out.extend(std::iter::repeat(' ').take(fill));
            out.push_str(prefix);
            out.push_str(body);
        }
    }

    /// `%s` body: precision truncates
    fn push_str(&self, s: &str, out: &mut String) {
        let body: String = match self.precision {
            Some(p) => s.chars().take(p).collect(),
            None => s.to_string(),
        };
        self.push_padded("", &body, false, out);
    }

    /// Apply the minimum digit count from the precision
    fn digits(&self, digits: String) -> String {
        match self.precision {
            Some(0) if digits == "0" => String::new(),
            Some(p) if digits.len() < p => format!("{}{}", "0".repeat(p - digits.len()), digits),
            _ => digits,
        }
    }

    fn push_int(&self, value: i64, out: &mut String) {
        let sign = self.sign(value < 0);
        let digits = self.digits(value.unsigned_abs().to_string());
        self.push_padded(sign, &digits, self.precision.is_none(), out);
    }

    fn push_radix(&self, value: i64, out: &mut String) {
        let bits = value as u64;
        let (digits, prefix) = match self.conversion {
            'o' => (format!("{:o}", bits), "0"),
            'x' => (format!("{:x}", bits), "0x"),
            'X' => (format!("{:X}", bits), "0X"),
            _ => (bits.to_string(), ""),
        };
        let prefix = if self.flags.alt && value != 0 { prefix } else { "" };
        self.push_padded(prefix, &self.digits(digits), self.precision.is_none(), out);
    }

    fn push_float(&self, value: f64, out: &mut String) {
        let upper = self.conversion.is_ascii_uppercase();
        let sign = self.sign(value.is_sign_negative() && !value.is_nan());
        if !value.is_finite() {
            let body = if value.is_nan() { "nan" } else { "inf" };
            let body = if upper { body.to_uppercase() } else { body.to_string() };
            self.push_padded(sign, &body, false, out);
            return;
        }

        let magnitude = value.abs();
        let precision = self.precision.unwrap_or(6);
        let body = match self.conversion.to_ascii_lowercase() {
            'f' => fixed(magnitude, precision, self.flags.alt),
            'e' => exponential(magnitude, precision, self.flags.alt),
            _ => general(magnitude, precision, self.flags.alt),
        };
        let body = if upper { body.to_uppercase() } else { body };
        self.push_padded(sign, &body, true, out);
    }
}

fn fixed(x: f64, precision: usize, alt: bool) -> String {
    let mut s = format!("{:.*}", precision, x);
    if alt && precision == 0 {
        s.push('.');
    }
    s
}

/// C-style exponent notation: at least two exponent digits, always signed
fn exponential(x: f64, precision: usize, alt: bool) -> String {
    let s = format!("{:.*e}", precision, x);
    let (mantissa, exp) = s.split_once('e').unwrap_or((&s, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let dot = if alt && precision == 0 { "." } else { "" };
    format!(
        "{}{}e{}{:02}",
        mantissa,
        dot,
        if exp < 0 { '-' } else { '+' },
        exp.abs()
    )
}

/// `%g`: shortest of fixed and exponent form for the given significant digits
fn general(x: f64, precision: usize, alt: bool) -> String {
    let p = precision.max(1);
    let probe = format!("{:.*e}", p - 1, x);
    let exp: i32 = probe
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);

    let s = if exp >= -4 && (exp as i64) < p as i64 {
        fixed(x, (p as i64 - 1 - exp as i64) as usize, alt)
    } else {
        exponential(x, p - 1, alt)
    };
    if alt {
        return s;
    }

    // strip trailing zeros from the fractional part
    let (number, exponent) = match s.find('e') {
        Some(i) => s.split_at(i),
        None => (s.as_str(), ""),
    };
    let number = if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    };
    format!("{}{}", number, exponent)
}

/// `%q`: a literal that reads back as the same value
fn quoted(args: &mut Args, out: &mut String) -> Result<(), ScriptError> {
    match args.next_any()? {
        Value::Str(s) => {
            out.push('"');
            let mut chars = s.chars().peekable();
            while let Some(c) = chars.next() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\0' => match chars.peek() {
                        Some(d) if d.is_ascii_digit() => out.push_str("\\000"),
                        _ => out.push_str("\\0"),
                    },
                    c if c.is_control() => match chars.peek() {
                        Some(d) if d.is_ascii_digit() => out.push_str(&format!("\\{:03}", c as u32)),
                        _ => out.push_str(&format!("\\{}", c as u32)),
                    },
                    c => out.push(c),
                }
            }
            out.push('"');
        }
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) if f.is_nan() => out.push_str("(0/0)"),
        Value::Float(f) if f.is_infinite() => {
            out.push_str(if f > 0.0 { "1e9999" } else { "-1e9999" })
        }
        Value::Float(f) => out.push_str(&format!("{:?}", f)),
        v @ (Value::Nil | Value::Bool(_)) => out.push_str(&v.to_string()),
        _ => return Err(args.bad_argument("value has no literal form")),
    }
    Ok(())
}

impl Format {
    fn run(&self, ctx: &mut ExecutionContext, frame: &CallFrame, mut st: FormatState) -> CallResult {
        let format = st.format.clone();

        while st.pos < format.len() {
            let rest = &format[st.pos..];
            let Some(offset) = rest.find('%') else {
                st.out.push_str(rest);
                st.pos = format.len();
                break;
            };
            st.out.push_str(&rest[..offset]);
            st.pos += offset + 1;

            if format[st.pos..].starts_with('%') {
                st.out.push('%');
                st.pos += 1;
                continue;
            }

            if !st.args.has_next() {
                return Err(st.args.bad_argument_at(st.args.position(), "no value").into());
            }
            let (spec, len) = Spec::parse(&format[st.pos..])?;
            st.pos += len;

            match spec.conversion {
                'd' | 'i' => {
                    let value = st.args.next_int()?;
                    spec.push_int(value, &mut st.out);
                }
                'u' | 'o' | 'x' | 'X' => {
                    let value = st.args.next_int()?;
                    spec.push_radix(value, &mut st.out);
                }
                'c' => {
                    let code = st.args.next_int()?;
                    let c = u32::try_from(code)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| st.args.bad_argument("value out of range"))?;
                    spec.push_padded("", &c.to_string(), false, &mut st.out);
                }
                'e' | 'E' | 'f' | 'F' | 'g' | 'G' => {
                    let value = st.args.next_float()?;
                    spec.push_float(value, &mut st.out);
                }
                'q' => quoted(&mut st.args, &mut st.out)?,
                's' => {
                    let value = st.args.next_any()?;
                    if let Some(s) = value.to_str_coerced() {
                        spec.push_str(&s, &mut st.out);
                        continue;
                    }
                    st.pending = Some(spec);
                    match dispatch::tostring(ctx, &value, frame.base) {
                        Ok(()) => st.collect(ctx, frame.base)?,
                        Err(raise) => return Err(raise.resolve(frame, st)),
                    }
                }
                other => return Err(invalid_option(Some(other)).into()),
            }
        }

        frame.base.ret(&mut ctx.stack, &[Value::from(st.out)])?;
        Ok(())
    }
}

impl Function for Format {
    fn name(&self) -> &str {
        NAME
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        let mut args = Args::from_frame(NAME, ctx, frame);
        let format = args.next_string()?;
        let state = FormatState {
            format,
            out: String::new(),
            args,
            pos: 0,
            pending: None,
        };
        self.run(ctx, frame, state)
    }

    fn resume(&self, ctx: &mut ExecutionContext, frame: &CallFrame, state: SavedState) -> CallResult {
        let mut state: FormatState = restore(state, frame)?;
        state.collect(ctx, frame.base)?;
        self.run(ctx, frame, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(text: &str) -> Spec {
        Spec::parse(text).unwrap().0
    }

    fn float(text: &str, value: f64) -> String {
        let mut out = String::new();
        spec(text).push_float(value, &mut out);
        out
    }

    #[test]
    fn test_parse_flags_width_precision() {
        let (s, len) = Spec::parse("-08.3fabc").unwrap();
        assert_eq!(len, 6);
        assert!(s.flags.left && s.flags.zero);
        assert_eq!(s.width, Some(8));
        assert_eq!(s.precision, Some(3));
        assert_eq!(s.conversion, 'f');
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Spec::parse("--d").unwrap_err().message(),
            "illegal format (repeated flags)"
        );
        assert_eq!(
            Spec::parse("100d").unwrap_err().message(),
            "illegal format (width or precision too long)"
        );
        assert_eq!(
            Spec::parse("5.").unwrap_err().message(),
            "invalid option '%' to 'format'"
        );
    }

    #[test]
    fn test_integers() {
        let mut out = String::new();
        spec("5d").push_int(-42, &mut out);
        spec("-5d").push_int(7, &mut out);
        spec("+.3d").push_int(7, &mut out);
        spec("05d").push_int(-42, &mut out);
        assert_eq!(out, "  -427    +007-0042");

        let mut out = String::new();
        spec("#x").push_radix(255, &mut out);
        spec("X").push_radix(-1, &mut out);
        spec("#o").push_radix(8, &mut out);
        assert_eq!(out, "0xffFFFFFFFFFFFFFFFF010");
    }

    #[test]
    fn test_floats() {
        assert_eq!(float("f", 3.14159), "3.141590");
        assert_eq!(float(".2f", 2.005), "2.00");
        assert_eq!(float("e", 1234.5), "1.234500e+03");
        assert_eq!(float(".1E", 0.00012), "1.2E-04");
        assert_eq!(float("g", 100000.0), "100000");
        assert_eq!(float("g", 1e20), "1e+20");
        assert_eq!(float("g", 0.0001), "0.0001");
        assert_eq!(float("G", 1.5e-7), "1.5E-07");
        assert_eq!(float("08.2f", -1.5), "-0001.50");
        assert_eq!(float("5f", f64::INFINITY), "  inf");
    }

    #[test]
    fn test_quoted_strings() {
        let mut out = String::new();
        let mut args = Args::new(NAME, vec![Value::str("a\"b\\\n\x01")]);
        quoted(&mut args, &mut out).unwrap();
        assert_eq!(out, "\"a\\\"b\\\\\\n\\1\"");
    }
}
